//! Database service for booking-service.

use crate::models::{
    AvailabilityOverride, Booking, BookingNotice, BookingScope, BookingStatus, Business, Coupon,
    CreateBusiness, CreateCoupon, CreateTour, FinancialSummary, ListBookingsFilter, NewBooking,
    NewUser, NoticeKind, Payment, PaymentMethod, PaymentStatus, RedemptionAction, ReferralStats,
    RetentionConfig, SeatHold, TicketRedemption, Tour, Transaction, UpdateTour,
    UpsertAvailabilityOverride, User,
};
use crate::services::codes;
use crate::services::discount::{DiscountLookup, PendingReferral};
use crate::services::error::ServiceError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::settlement::{RetentionRates, Settlement};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Insert attempts before giving up on a unique ticket code.
const CODE_ATTEMPTS: u32 = 3;

/// Bookings in these states no longer occupy seats.
const VOID_STATUSES: &str = "('cancelled', 'refunded')";

/// Payment details for one settlement event.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub booking_id: Uuid,
    pub tour_id: Uuid,
    pub payment_intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
}

/// Rows written by one settlement.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub payment: Payment,
    pub transaction: Transaction,
    pub booking: Booking,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn scope_params(scope: BookingScope) -> (&'static str, Option<Uuid>) {
    match scope {
        BookingScope::All => ("all", None),
        BookingScope::Business(id) => ("business", Some(id)),
        BookingScope::Seller(id) => ("seller", Some(id)),
        BookingScope::Customer(id) => ("customer", Some(id)),
    }
}

/// Seats taken on a tour date: party sizes of live bookings plus unexpired
/// holds. The excluded hold and booking belong to the caller.
async fn seats_taken_on(
    conn: &mut PgConnection,
    tour_id: Uuid,
    date: NaiveDate,
    now: DateTime<Utc>,
    exclude_hold: Option<Uuid>,
    exclude_booking: Option<Uuid>,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT
            (SELECT COALESCE(SUM(adults + children), 0)::BIGINT
             FROM bookings
             WHERE tour_id = $1 AND booking_date = $2
               AND status NOT IN {void}
               AND ($5::uuid IS NULL OR id <> $5))
          + (SELECT COALESCE(SUM(seats), 0)::BIGINT
             FROM seat_holds
             WHERE tour_id = $1 AND hold_date = $2 AND expires_at > $3
               AND ($4::uuid IS NULL OR id <> $4))
        "#,
        void = VOID_STATUSES
    );

    sqlx::query_scalar::<_, i64>(&sql)
        .bind(tour_id)
        .bind(date)
        .bind(now)
        .bind(exclude_hold)
        .bind(exclude_booking)
        .fetch_one(&mut *conn)
        .await
}

async fn lock_tour(conn: &mut PgConnection, tour_id: Uuid) -> Result<(), AppError> {
    let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM tours WHERE id = $1 FOR UPDATE")
        .bind(tour_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to lock tour"))?;

    locked.map(|_| ()).ok_or_else(|| ServiceError::TourNotFound.into())
}

async fn ensure_capacity(
    conn: &mut PgConnection,
    tour_id: Uuid,
    date: NaiveDate,
    capacity: i64,
    requested: i64,
    now: DateTime<Utc>,
    exclude_hold: Option<Uuid>,
) -> Result<(), AppError> {
    let taken = seats_taken_on(conn, tour_id, date, now, exclude_hold, None)
        .await
        .map_err(db_error("Failed to count seats"))?;
    let remaining = (capacity - taken).max(0);
    if requested > remaining {
        return Err(ServiceError::CapacityExceeded {
            requested,
            remaining,
        }
        .into());
    }
    Ok(())
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "booking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Business Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_business(&self, input: &CreateBusiness) -> Result<Business, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_business"])
            .start_timer();

        let business = sqlx::query_as::<_, Business>(
            r#"
            INSERT INTO businesses (id, name, contact_email)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.contact_email)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create business"))?;

        timer.observe_duration();

        info!(business_id = %business.id, "Business created");

        Ok(business)
    }

    #[instrument(skip(self))]
    pub async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_business"])
            .start_timer();

        let business = sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get business"))?;

        timer.observe_duration();

        Ok(business)
    }

    #[instrument(skip(self))]
    pub async fn list_businesses(&self) -> Result<Vec<Business>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_businesses"])
            .start_timer();

        let businesses = sqlx::query_as::<_, Business>("SELECT * FROM businesses ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list businesses"))?;

        timer.observe_duration();

        Ok(businesses)
    }

    // -------------------------------------------------------------------------
    // User Operations
    // -------------------------------------------------------------------------

    /// Create a user. A taken username is a conflict.
    #[instrument(skip(self, input), fields(username = %input.username, role = %input.role.as_str()))]
    pub async fn create_user(&self, input: &NewUser) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, business_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role.as_str())
        .bind(input.business_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Username '{}' already exists",
                    input.username
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        timer.observe_duration();

        info!(user_id = %user.id, "User created");

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get user"))?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_by_username"])
            .start_timer();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get user"))?;

        timer.observe_duration();

        Ok(user)
    }

    /// Give a user a referral code if they have none. `Ok(None)` when the
    /// user already owns one; a code taken by someone else is a conflict.
    #[instrument(skip(self))]
    pub async fn assign_referral_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["assign_referral_code"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET referral_code = $2
            WHERE id = $1 AND referral_code IS NULL
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Referral code already exists"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to assign referral code: {}", e)),
        })?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn referral_stats(&self, referrer_id: Uuid) -> Result<ReferralStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["referral_stats"])
            .start_timer();

        let stats = sqlx::query_as::<_, ReferralStats>(
            r#"
            SELECT
                COUNT(*) AS referral_count,
                COALESCE(SUM(reward_amount) FILTER (WHERE status = 'pending'), 0) AS pending_rewards,
                COALESCE(SUM(reward_amount) FILTER (WHERE status = 'paid'), 0) AS paid_rewards
            FROM referrals
            WHERE referrer_id = $1
            "#,
        )
        .bind(referrer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to load referral stats"))?;

        timer.observe_duration();

        Ok(stats)
    }

    // -------------------------------------------------------------------------
    // Tour Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_tour(&self, input: &CreateTour) -> Result<Tour, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tour"])
            .start_timer();

        let tour = sqlx::query_as::<_, Tour>(
            r#"
            INSERT INTO tours (id, business_id, seller_id, provider_id, name, description, location,
                               price, child_price, capacity, departure_time, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.business_id)
        .bind(input.seller_id)
        .bind(input.provider_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.location)
        .bind(input.price)
        .bind(input.child_price)
        .bind(input.capacity)
        .bind(input.departure_time)
        .bind(input.duration_minutes)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to create tour"))?;

        timer.observe_duration();

        info!(tour_id = %tour.id, "Tour created");

        Ok(tour)
    }

    #[instrument(skip(self))]
    pub async fn get_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tour"])
            .start_timer();

        let tour = sqlx::query_as::<_, Tour>("SELECT * FROM tours WHERE id = $1")
            .bind(tour_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get tour"))?;

        timer.observe_duration();

        Ok(tour)
    }

    #[instrument(skip(self))]
    pub async fn list_tours(
        &self,
        business_id: Option<Uuid>,
        active_only: bool,
    ) -> Result<Vec<Tour>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tours"])
            .start_timer();

        let tours = sqlx::query_as::<_, Tour>(
            r#"
            SELECT * FROM tours
            WHERE ($1::uuid IS NULL OR business_id = $1)
              AND ($2::bool = FALSE OR is_active = TRUE)
            ORDER BY name
            "#,
        )
        .bind(business_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list tours"))?;

        timer.observe_duration();

        Ok(tours)
    }

    /// Update tour fields; `None` fields are left unchanged.
    #[instrument(skip(self, input))]
    pub async fn update_tour(
        &self,
        tour_id: Uuid,
        input: &UpdateTour,
    ) -> Result<Option<Tour>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_tour"])
            .start_timer();

        let tour = sqlx::query_as::<_, Tour>(
            r#"
            UPDATE tours SET
                seller_id = COALESCE($2, seller_id),
                provider_id = COALESCE($3, provider_id),
                name = COALESCE($4, name),
                description = COALESCE($5, description),
                location = COALESCE($6, location),
                price = COALESCE($7, price),
                child_price = COALESCE($8, child_price),
                capacity = COALESCE($9, capacity),
                departure_time = COALESCE($10, departure_time),
                duration_minutes = COALESCE($11, duration_minutes),
                is_active = COALESCE($12, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(tour_id)
        .bind(input.seller_id)
        .bind(input.provider_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.location)
        .bind(input.price)
        .bind(input.child_price)
        .bind(input.capacity)
        .bind(input.departure_time)
        .bind(input.duration_minutes)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update tour"))?;

        timer.observe_duration();

        if let Some(ref t) = tour {
            info!(tour_id = %t.id, "Tour updated");
        }

        Ok(tour)
    }

    // -------------------------------------------------------------------------
    // Availability Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_availability_override(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_availability_override"])
            .start_timer();

        let found = sqlx::query_as::<_, AvailabilityOverride>(
            "SELECT * FROM availability_overrides WHERE tour_id = $1 AND override_date = $2",
        )
        .bind(tour_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get availability override"))?;

        timer.observe_duration();

        Ok(found)
    }

    #[instrument(skip(self))]
    pub async fn get_availability_override_by_id(
        &self,
        override_id: Uuid,
    ) -> Result<Option<AvailabilityOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_availability_override_by_id"])
            .start_timer();

        let found = sqlx::query_as::<_, AvailabilityOverride>(
            "SELECT * FROM availability_overrides WHERE id = $1",
        )
        .bind(override_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get availability override"))?;

        timer.observe_duration();

        Ok(found)
    }

    /// Overrides visible to a caller. `business_id` restricts to that
    /// business's tours.
    #[instrument(skip(self))]
    pub async fn list_availability_overrides(
        &self,
        tour_id: Option<Uuid>,
        business_id: Option<Uuid>,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilityOverride>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_availability_overrides"])
            .start_timer();

        let overrides = sqlx::query_as::<_, AvailabilityOverride>(
            r#"
            SELECT o.* FROM availability_overrides o
            JOIN tours t ON t.id = o.tour_id
            WHERE ($1::uuid IS NULL OR o.tour_id = $1)
              AND ($2::uuid IS NULL OR t.business_id = $2)
              AND ($3::date IS NULL OR o.override_date >= $3)
              AND ($4::date IS NULL OR o.override_date <= $4)
            ORDER BY o.override_date, o.tour_id
            "#,
        )
        .bind(tour_id)
        .bind(business_id)
        .bind(from_date)
        .bind(to_date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list availability overrides"))?;

        timer.observe_duration();

        Ok(overrides)
    }

    /// Create or replace the override for a tour date.
    #[instrument(skip(self, input), fields(tour_id = %input.tour_id, date = %input.override_date))]
    pub async fn upsert_availability_override(
        &self,
        input: &UpsertAvailabilityOverride,
    ) -> Result<AvailabilityOverride, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_availability_override"])
            .start_timer();

        let saved = sqlx::query_as::<_, AvailabilityOverride>(
            r#"
            INSERT INTO availability_overrides
                (id, tour_id, override_date, is_blocked, custom_capacity, reason, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tour_id, override_date) DO UPDATE SET
                is_blocked = EXCLUDED.is_blocked,
                custom_capacity = EXCLUDED.custom_capacity,
                reason = EXCLUDED.reason,
                created_by = EXCLUDED.created_by
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tour_id)
        .bind(input.override_date)
        .bind(input.is_blocked)
        .bind(input.custom_capacity)
        .bind(&input.reason)
        .bind(input.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to save availability override"))?;

        timer.observe_duration();

        info!(
            override_id = %saved.id,
            is_blocked = saved.is_blocked,
            "Availability override saved"
        );

        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn delete_availability_override(&self, override_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_availability_override"])
            .start_timer();

        let result = sqlx::query("DELETE FROM availability_overrides WHERE id = $1")
            .bind(override_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete availability override"))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    /// Bookings on a date that a block would displace: live, not completed
    /// and not already awaiting a reschedule answer.
    #[instrument(skip(self))]
    pub async fn find_bookings_displaced_by_block(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_bookings_displaced_by_block"])
            .start_timer();

        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE tour_id = $1 AND booking_date = $2
              AND status NOT IN ('pending_reschedule', 'completed', 'cancelled', 'refunded')
            ORDER BY created_at
            "#,
        )
        .bind(tour_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to find displaced bookings"))?;

        timer.observe_duration();

        Ok(bookings)
    }

    /// Seats taken on a tour date, optionally ignoring one hold and one
    /// booking.
    #[instrument(skip(self))]
    pub async fn seats_taken(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
        exclude_booking: Option<Uuid>,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["seats_taken"])
            .start_timer();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("Failed to acquire connection"))?;
        let taken = seats_taken_on(&mut conn, tour_id, date, now, None, exclude_booking)
            .await
            .map_err(db_error("Failed to count seats"))?;

        timer.observe_duration();

        Ok(taken)
    }

    #[instrument(skip(self))]
    pub async fn held_seats(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["held_seats"])
            .start_timer();

        let held = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(seats), 0)::BIGINT FROM seat_holds
            WHERE tour_id = $1 AND hold_date = $2 AND expires_at > $3
            "#,
        )
        .bind(tour_id)
        .bind(date)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to count held seats"))?;

        timer.observe_duration();

        Ok(held)
    }

    // -------------------------------------------------------------------------
    // Seat Hold Operations
    // -------------------------------------------------------------------------

    /// Place a hold if the date still has room.
    #[instrument(skip(self))]
    pub async fn create_seat_hold(
        &self,
        tour_id: Uuid,
        date: NaiveDate,
        seats: i32,
        capacity: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<SeatHold, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_seat_hold"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        lock_tour(&mut tx, tour_id).await?;
        ensure_capacity(&mut tx, tour_id, date, capacity, seats as i64, now, None).await?;

        let hold = sqlx::query_as::<_, SeatHold>(
            r#"
            INSERT INTO seat_holds (id, tour_id, hold_date, seats, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tour_id)
        .bind(date)
        .bind(seats)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to create seat hold"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(hold_id = %hold.id, seats = hold.seats, "Seat hold placed");

        Ok(hold)
    }

    #[instrument(skip(self))]
    pub async fn get_seat_hold(&self, hold_id: Uuid) -> Result<Option<SeatHold>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_seat_hold"])
            .start_timer();

        let hold = sqlx::query_as::<_, SeatHold>("SELECT * FROM seat_holds WHERE id = $1")
            .bind(hold_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get seat hold"))?;

        timer.observe_duration();

        Ok(hold)
    }

    #[instrument(skip(self))]
    pub async fn delete_expired_seat_holds(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_expired_seat_holds"])
            .start_timer();

        let result = sqlx::query("DELETE FROM seat_holds WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete expired seat holds"))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Booking Operations
    // -------------------------------------------------------------------------

    /// Insert a booking with fresh ticket codes.
    ///
    /// The tour row is locked while capacity is rechecked, so concurrent
    /// bookings for the same tour serialise here. A referral row and the
    /// consumed seat hold are written in the same transaction.
    #[instrument(skip(self, input, referral), fields(tour_id = %input.tour_id, date = %input.booking_date))]
    pub async fn create_booking(
        &self,
        input: &NewBooking,
        capacity: i64,
        seat_hold_id: Option<Uuid>,
        referral: Option<&PendingReferral>,
        now: DateTime<Utc>,
    ) -> Result<Booking, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_booking"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        lock_tour(&mut tx, input.tour_id).await?;
        let requested = (input.adults + input.children) as i64;
        ensure_capacity(
            &mut tx,
            input.tour_id,
            input.booking_date,
            capacity,
            requested,
            now,
            seat_hold_id,
        )
        .await?;

        let mut booking = None;
        for attempt in 1..=CODE_ATTEMPTS {
            // ON CONFLICT DO NOTHING keeps the transaction usable after a
            // ticket code collision.
            let inserted = sqlx::query_as::<_, Booking>(
                r#"
                INSERT INTO bookings (id, tour_id, user_id, customer_name, customer_email, customer_phone,
                                      booking_date, adults, children, gross_amount, total_amount,
                                      discount_source, coupon_code, status, qr_code, alphanumeric_code,
                                      reserved_until)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                ON CONFLICT DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(input.tour_id)
            .bind(input.user_id)
            .bind(&input.customer_name)
            .bind(&input.customer_email)
            .bind(&input.customer_phone)
            .bind(input.booking_date)
            .bind(input.adults)
            .bind(input.children)
            .bind(input.gross_amount)
            .bind(input.total_amount)
            .bind(input.discount_source.as_str())
            .bind(&input.coupon_code)
            .bind(input.status.as_str())
            .bind(codes::generate_qr_token())
            .bind(codes::generate_alphanumeric_code())
            .bind(input.reserved_until)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to create booking"))?;

            if inserted.is_some() {
                booking = inserted;
                break;
            }
            warn!(attempt = attempt, "Ticket code collision, retrying with fresh codes");
        }
        let booking = booking.ok_or(ServiceError::CodeAllocationExhausted)?;

        if let Some(referral) = referral {
            sqlx::query(
                r#"
                INSERT INTO referrals (id, referrer_id, booking_id, reward_amount, status)
                VALUES ($1, $2, $3, $4, 'pending')
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(referral.referrer_id)
            .bind(booking.id)
            .bind(referral.reward_amount)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to record referral"))?;
        }

        if let Some(hold_id) = seat_hold_id {
            sqlx::query("DELETE FROM seat_holds WHERE id = $1")
                .bind(hold_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to release seat hold"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(
            booking_id = %booking.id,
            status = %booking.status,
            total = %booking.total_amount,
            "Booking created"
        );

        Ok(booking)
    }

    #[instrument(skip(self))]
    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking"])
            .start_timer();

        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();

        Ok(booking)
    }

    #[instrument(skip(self, qr_code))]
    pub async fn get_booking_by_qr_code(&self, qr_code: &str) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking_by_qr_code"])
            .start_timer();

        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE qr_code = $1")
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();

        Ok(booking)
    }

    #[instrument(skip(self))]
    pub async fn get_booking_by_alphanumeric_code(
        &self,
        code: &str,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking_by_alphanumeric_code"])
            .start_timer();

        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE alphanumeric_code = $1")
                .bind(codes::normalize_code(code))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();

        Ok(booking)
    }

    /// Look a ticket up by either its QR token or its backup code.
    #[instrument(skip(self, code))]
    pub async fn get_booking_by_ticket_code(
        &self,
        code: &str,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking_by_ticket_code"])
            .start_timer();

        let trimmed = code.trim();
        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE qr_code = $1 OR alphanumeric_code = $2 LIMIT 1",
        )
        .bind(trimmed)
        .bind(codes::normalize_code(trimmed))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();

        Ok(booking)
    }

    #[instrument(skip(self, token))]
    pub async fn get_booking_by_reschedule_token(
        &self,
        token: &str,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking_by_reschedule_token"])
            .start_timer();

        let booking = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE reschedule_token = $1 AND status = 'pending_reschedule'",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to get booking"))?;

        timer.observe_duration();

        Ok(booking)
    }

    /// List bookings a caller may see, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list_bookings(
        &self,
        scope: BookingScope,
        filter: &ListBookingsFilter,
    ) -> Result<Vec<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bookings"])
            .start_timer();

        let (scope_kind, scope_id) = scope_params(scope);
        let bookings = sqlx::query_as::<_, Booking>(
            r#"
            SELECT b.* FROM bookings b
            JOIN tours t ON t.id = b.tour_id
            WHERE ($1 = 'all'
                   OR ($1 = 'business' AND t.business_id = $2)
                   OR ($1 = 'seller' AND t.seller_id = $2)
                   OR ($1 = 'customer' AND b.user_id = $2))
              AND ($3::text IS NULL OR b.status = $3)
              AND ($4::uuid IS NULL OR b.tour_id = $4)
              AND ($5::date IS NULL OR b.booking_date >= $5)
              AND ($6::date IS NULL OR b.booking_date <= $6)
            ORDER BY b.created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(scope_kind)
        .bind(scope_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.tour_id)
        .bind(filter.from_date)
        .bind(filter.to_date)
        .bind(filter.limit.clamp(1, 200))
        .bind(filter.offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list bookings"))?;

        timer.observe_duration();

        Ok(bookings)
    }

    /// Move a booking to `to` if it is currently in one of `from`.
    #[instrument(skip(self, from), fields(to = %to))]
    pub async fn transition_booking(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_booking"])
            .start_timer();

        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(&from)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to update booking status"))?;

        timer.observe_duration();

        Ok(booking)
    }

    /// Record a reschedule proposal. The prior status is kept so that
    /// resolution can restore it.
    #[instrument(skip(self, from, reason, token))]
    pub async fn propose_reschedule(
        &self,
        booking_id: Uuid,
        from: &[BookingStatus],
        proposed_date: NaiveDate,
        reason: Option<&str>,
        token: &str,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["propose_reschedule"])
            .start_timer();

        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                status_before_reschedule = status,
                status = 'pending_reschedule',
                proposed_date = $3,
                reschedule_reason = $4,
                reschedule_token = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(&from)
        .bind(proposed_date)
        .bind(reason)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to propose reschedule"))?;

        timer.observe_duration();

        Ok(booking)
    }

    /// Consume a reschedule token: move the booking to `new_date`, restore
    /// its prior status and clear the proposal. Reminder and review stamps
    /// are reset because they referred to the old date.
    ///
    /// The tour row is locked while the new date's capacity is rechecked,
    /// as in `create_booking`. `Ok(None)` when the token is unknown or spent.
    #[instrument(skip(self, token))]
    pub async fn resolve_reschedule(
        &self,
        token: &str,
        new_date: NaiveDate,
        capacity: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_reschedule"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let pending = sqlx::query_as::<_, Booking>(
            r#"
            SELECT * FROM bookings
            WHERE reschedule_token = $1 AND status = 'pending_reschedule'
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to load reschedule"))?;

        let Some(pending) = pending else {
            return Ok(None);
        };

        lock_tour(&mut tx, pending.tour_id).await?;
        let taken = seats_taken_on(&mut tx, pending.tour_id, new_date, now, None, Some(pending.id))
            .await
            .map_err(db_error("Failed to count seats"))?;
        let remaining = (capacity - taken).max(0);
        let requested = (pending.adults + pending.children) as i64;
        if requested > remaining {
            return Err(ServiceError::CapacityExceeded {
                requested,
                remaining,
            }
            .into());
        }

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                booking_date = $2,
                status = COALESCE(status_before_reschedule, 'confirmed'),
                status_before_reschedule = NULL,
                proposed_date = NULL,
                reschedule_reason = NULL,
                reschedule_token = NULL,
                reminder_sent_at = NULL,
                review_requested_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(pending.id)
        .bind(new_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to resolve reschedule"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(booking_id = %booking.id, date = %booking.booking_date, "Reschedule resolved");

        Ok(Some(booking))
    }

    /// Stamp the first check-in and append its audit row. `Ok(None)` when
    /// the booking was already checked in or is not a paid booking.
    #[instrument(skip(self))]
    pub async fn mark_checked_in(
        &self,
        booking_id: Uuid,
        staff_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_checked_in"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                checked_in = TRUE,
                checked_in_at = $2,
                status = CASE WHEN status = 'confirmed' THEN 'completed' ELSE status END,
                updated_at = $2
            WHERE id = $1 AND checked_in = FALSE AND status IN ('confirmed', 'completed')
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to check in booking"))?;

        let Some(booking) = booking else {
            return Ok(None);
        };

        insert_redemption(&mut tx, booking.id, staff_id, RedemptionAction::CheckIn, now).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        Ok(Some(booking))
    }

    /// Single-use redemption: complete the booking, stamp who redeemed it and
    /// append the audit row. `Ok(None)` when it was redeemed concurrently or
    /// is no longer redeemable.
    #[instrument(skip(self))]
    pub async fn mark_redeemed(
        &self,
        booking_id: Uuid,
        staff_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_redeemed"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                status = 'completed',
                redeemed_at = $3,
                redeemed_by = $2,
                checked_in = TRUE,
                checked_in_at = COALESCE(checked_in_at, $3),
                updated_at = $3
            WHERE id = $1 AND redeemed_at IS NULL AND status IN ('confirmed', 'completed')
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(staff_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to redeem booking"))?;

        let Some(booking) = booking else {
            return Ok(None);
        };

        insert_redemption(&mut tx, booking.id, staff_id, RedemptionAction::Redeem, now).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        Ok(Some(booking))
    }

    /// Booking and tour details for customer emails.
    #[instrument(skip(self))]
    pub async fn get_booking_notice(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<BookingNotice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_booking_notice"])
            .start_timer();

        let notice = sqlx::query_as::<_, BookingNotice>(&format!(
            "{} WHERE b.id = $1",
            NOTICE_SELECT
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load booking notice"))?;

        timer.observe_duration();

        Ok(notice)
    }

    // -------------------------------------------------------------------------
    // Payment and Settlement Operations
    // -------------------------------------------------------------------------

    /// Write the payment, its settlement ledger entry and the booking
    /// confirmation as one unit.
    ///
    /// Returns `Ok(None)` when a payment with the same intent id already
    /// exists, which makes repeated verification of one session harmless.
    /// A booking already settled under another intent is rejected.
    #[instrument(skip(self, record, settlement), fields(booking_id = %record.booking_id, method = %record.method.as_str()))]
    pub async fn record_settlement(
        &self,
        record: &PaymentRecord,
        settlement: &Settlement,
    ) -> Result<Option<SettlementRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_settlement"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Serialise settlements of one booking; a second payment under a
        // different intent must not reach the ledger.
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(record.booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to lock booking"))?;
        if locked.is_none() {
            return Err(ServiceError::BookingNotFound.into());
        }

        let settled_elsewhere: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payments
                WHERE booking_id = $1 AND status = 'succeeded' AND payment_intent_id <> $2
            )
            "#,
        )
        .bind(record.booking_id)
        .bind(&record.payment_intent_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to check existing payments"))?;

        if settled_elsewhere {
            warn!(
                booking_id = %record.booking_id,
                payment_intent_id = %record.payment_intent_id,
                "Booking already settled under another payment"
            );
            return Err(ServiceError::AlreadyPaid.into());
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (id, booking_id, payment_intent_id, amount, currency,
                                  payment_method, status, verified)
            VALUES ($1, $2, $3, $4, $5, $6, 'succeeded', TRUE)
            ON CONFLICT (payment_intent_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.booking_id)
        .bind(&record.payment_intent_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.method.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to record payment"))?;

        let Some(payment) = payment else {
            info!(
                payment_intent_id = %record.payment_intent_id,
                "Payment already recorded, skipping settlement"
            );
            return Ok(None);
        };

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (id, booking_id, tour_id, payment_id, payment_method,
                                      gross_amount, platform_fee, seller_commission, tax_amount,
                                      bank_commission, other_retentions, provider_payout)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.booking_id)
        .bind(record.tour_id)
        .bind(payment.id)
        .bind(record.method.as_str())
        .bind(settlement.gross_amount)
        .bind(settlement.platform_fee)
        .bind(settlement.seller_commission)
        .bind(settlement.tax_amount)
        .bind(settlement.bank_commission)
        .bind(settlement.other_retentions)
        .bind(settlement.provider_payout)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to record transaction"))?;

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET status = 'confirmed', reserved_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'pending_payment', 'confirmed')
            RETURNING *
            "#,
        )
        .bind(record.booking_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to confirm booking"))?;

        let Some(booking) = booking else {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1")
                    .bind(record.booking_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error("Failed to read booking status"))?;
            return Err(match current {
                Some(from) => ServiceError::InvalidTransition {
                    from,
                    to: BookingStatus::Confirmed.to_string(),
                },
                None => ServiceError::BookingNotFound,
            }
            .into());
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(
            payment_id = %payment.id,
            transaction_id = %transaction.id,
            gross = %transaction.gross_amount,
            payout = %transaction.provider_payout,
            "Settlement recorded"
        );

        Ok(Some(SettlementRecord {
            payment,
            transaction,
            booking,
        }))
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get payment"))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn get_payment_by_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment_by_intent"])
            .start_timer();

        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE payment_intent_id = $1")
                .bind(payment_intent_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to get payment"))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
        booking_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR booking_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(booking_id)
        .bind(limit.clamp(1, 200))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list payments"))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Mark a succeeded payment fully refunded and cancel its booking.
    /// `Ok(None)` when the payment is no longer in `succeeded`.
    #[instrument(skip(self))]
    pub async fn apply_refund(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<(Payment, Booking)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_refund"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET status = 'refunded', refunded_amount = amount, updated_at = NOW()
            WHERE id = $1 AND status = 'succeeded'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to mark payment refunded"))?;

        let Some(payment) = payment else {
            return Ok(None);
        };

        let booking = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment.booking_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to cancel booking"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit transaction"))?;

        timer.observe_duration();

        info!(
            payment_id = %payment.id,
            booking_id = %booking.id,
            refunded = %payment.refunded_amount,
            "Refund applied"
        );

        Ok(Some((payment, booking)))
    }

    // -------------------------------------------------------------------------
    // Retention Configuration
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_retention_config(&self) -> Result<Option<RetentionConfig>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_retention_config"])
            .start_timer();

        let config =
            sqlx::query_as::<_, RetentionConfig>("SELECT * FROM retention_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("Failed to load retention config"))?;

        timer.observe_duration();

        Ok(config)
    }

    #[instrument(skip(self, rates))]
    pub async fn upsert_retention_config(
        &self,
        rates: &RetentionRates,
    ) -> Result<RetentionConfig, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_retention_config"])
            .start_timer();

        let config = sqlx::query_as::<_, RetentionConfig>(
            r#"
            INSERT INTO retention_config (id, platform_fee_rate, seller_commission_rate, tax_rate,
                                          bank_commission_rate, other_retentions_rate, updated_at)
            VALUES (1, $1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                platform_fee_rate = EXCLUDED.platform_fee_rate,
                seller_commission_rate = EXCLUDED.seller_commission_rate,
                tax_rate = EXCLUDED.tax_rate,
                bank_commission_rate = EXCLUDED.bank_commission_rate,
                other_retentions_rate = EXCLUDED.other_retentions_rate,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(rates.platform_fee_rate)
        .bind(rates.seller_commission_rate)
        .bind(rates.tax_rate)
        .bind(rates.bank_commission_rate)
        .bind(rates.other_retentions_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to save retention config"))?;

        timer.observe_duration();

        info!("Retention configuration updated");

        Ok(config)
    }

    // -------------------------------------------------------------------------
    // Coupon Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_coupon(&self, input: &CreateCoupon) -> Result<Coupon, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_coupon"])
            .start_timer();

        let code = codes::normalize_code(&input.code);
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            INSERT INTO coupons (id, code, discount_type, discount_value, expiration_date,
                                 usage_limit, business_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(input.discount_type.as_str())
        .bind(input.discount_value)
        .bind(input.expiration_date)
        .bind(input.usage_limit)
        .bind(input.business_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Coupon '{}' already exists", code))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create coupon: {}", e)),
        })?;

        timer.observe_duration();

        info!(coupon_id = %coupon.id, "Coupon created");

        Ok(coupon)
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(&self, business_id: Option<Uuid>) -> Result<Vec<Coupon>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_coupons"])
            .start_timer();

        let coupons = sqlx::query_as::<_, Coupon>(
            r#"
            SELECT * FROM coupons
            WHERE ($1::uuid IS NULL OR business_id = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list coupons"))?;

        timer.observe_duration();

        Ok(coupons)
    }

    #[instrument(skip(self))]
    pub async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_coupon_by_code"])
            .start_timer();

        let coupon = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
            .bind(codes::normalize_code(code))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get coupon"))?;

        timer.observe_duration();

        Ok(coupon)
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    /// Ledger totals for a scope. `from` is inclusive, `to` exclusive.
    #[instrument(skip(self))]
    pub async fn financial_summary(
        &self,
        scope: BookingScope,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<FinancialSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["financial_summary"])
            .start_timer();

        let (scope_kind, scope_id) = scope_params(scope);
        let summary = sqlx::query_as::<_, FinancialSummary>(
            r#"
            WITH scoped AS (
                SELECT tx.*, b.user_id FROM transactions tx
                JOIN tours t ON t.id = tx.tour_id
                JOIN bookings b ON b.id = tx.booking_id
                WHERE ($1 = 'all'
                       OR ($1 = 'business' AND t.business_id = $2)
                       OR ($1 = 'seller' AND t.seller_id = $2)
                       OR ($1 = 'customer' AND b.user_id = $2))
                  AND ($3::timestamptz IS NULL OR tx.created_at >= $3)
                  AND ($4::timestamptz IS NULL OR tx.created_at < $4)
            )
            SELECT
                COUNT(*) AS transaction_count,
                COALESCE(SUM(s.gross_amount), 0) AS gross_total,
                COALESCE(SUM(s.platform_fee), 0) AS platform_fees,
                COALESCE(SUM(s.seller_commission), 0) AS seller_commissions,
                COALESCE(SUM(s.tax_amount), 0) AS taxes,
                COALESCE(SUM(s.bank_commission), 0) AS bank_commissions,
                COALESCE(SUM(s.other_retentions), 0) AS other_retentions,
                COALESCE(SUM(s.provider_payout), 0) AS provider_payouts,
                COALESCE((SELECT SUM(p.refunded_amount) FROM payments p
                          WHERE p.id IN (SELECT payment_id FROM scoped)), 0) AS refunded_total
            FROM scoped s
            "#,
        )
        .bind(scope_kind)
        .bind(scope_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to compute financial summary"))?;

        timer.observe_duration();

        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Scheduled Sweep Queries
    // -------------------------------------------------------------------------

    /// Confirmed bookings on `date` with an email and no reminder yet.
    #[instrument(skip(self))]
    pub async fn find_reminder_candidates(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<BookingNotice>, AppError> {
        self.find_notices(
            "find_reminder_candidates",
            r#"
            WHERE b.status = 'confirmed' AND b.booking_date = $1
              AND b.customer_email IS NOT NULL AND b.reminder_sent_at IS NULL
            "#,
            NoticeParam::Date(date),
        )
        .await
    }

    /// Bookings that took place on `date` and have not been asked for a
    /// review.
    #[instrument(skip(self))]
    pub async fn find_review_candidates(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<BookingNotice>, AppError> {
        self.find_notices(
            "find_review_candidates",
            r#"
            WHERE b.status IN ('confirmed', 'completed') AND b.booking_date = $1
              AND b.customer_email IS NOT NULL AND b.review_requested_at IS NULL
            "#,
            NoticeParam::Date(date),
        )
        .await
    }

    /// Unpaid bookings created before `created_before` with no recovery
    /// email yet.
    #[instrument(skip(self))]
    pub async fn find_cart_recovery_candidates(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<BookingNotice>, AppError> {
        self.find_notices(
            "find_cart_recovery_candidates",
            r#"
            WHERE b.status = 'pending' AND b.created_at < $1
              AND b.customer_email IS NOT NULL AND b.recovery_sent_at IS NULL
            "#,
            NoticeParam::Instant(created_before),
        )
        .await
    }

    async fn find_notices(
        &self,
        operation: &str,
        predicate: &str,
        param: NoticeParam,
    ) -> Result<Vec<BookingNotice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let sql = format!("{} {} ORDER BY b.created_at", NOTICE_SELECT, predicate);
        let query = sqlx::query_as::<_, BookingNotice>(&sql);
        let query = match param {
            NoticeParam::Date(date) => query.bind(date),
            NoticeParam::Instant(at) => query.bind(at),
        };
        let notices = query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to find sweep candidates"))?;

        timer.observe_duration();

        Ok(notices)
    }

    /// Record that a sweep email went out.
    #[instrument(skip(self))]
    pub async fn stamp_notice(
        &self,
        booking_id: Uuid,
        kind: NoticeKind,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["stamp_notice"])
            .start_timer();

        sqlx::query(&format!(
            "UPDATE bookings SET {} = $2 WHERE id = $1",
            kind.stamp_column()
        ))
        .bind(booking_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to stamp notice"))?;

        timer.observe_duration();

        Ok(())
    }
}

const NOTICE_SELECT: &str = r#"
    SELECT b.id AS booking_id, b.customer_name, b.customer_email, b.booking_date,
           b.adults, b.children, b.total_amount, b.qr_code, b.alphanumeric_code,
           t.name AS tour_name, t.location AS tour_location, t.departure_time
    FROM bookings b
    JOIN tours t ON t.id = b.tour_id
"#;

enum NoticeParam {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

async fn insert_redemption(
    conn: &mut PgConnection,
    booking_id: Uuid,
    staff_id: Uuid,
    action: RedemptionAction,
    at: DateTime<Utc>,
) -> Result<TicketRedemption, AppError> {
    let redemption = sqlx::query_as::<_, TicketRedemption>(
        r#"
        INSERT INTO ticket_redemptions (id, booking_id, redeemed_by, action, redeemed_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(booking_id)
    .bind(staff_id)
    .bind(action.as_str())
    .bind(at)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Failed to record ticket redemption"))?;

    info!(
        redemption_id = %redemption.id,
        booking_id = %booking_id,
        action = %redemption.action,
        "Ticket redemption recorded"
    );

    Ok(redemption)
}

#[async_trait]
impl DiscountLookup for Database {
    #[instrument(skip(self))]
    async fn claim_coupon(
        &self,
        code: &str,
        business_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_coupon"])
            .start_timer();

        // Conditional increment: two bookings cannot both take the last use.
        let coupon = sqlx::query_as::<_, Coupon>(
            r#"
            UPDATE coupons SET usage_count = usage_count + 1
            WHERE code = $1
              AND is_active = TRUE
              AND (expiration_date IS NULL OR expiration_date > $3)
              AND (usage_limit IS NULL OR usage_count < usage_limit)
              AND (business_id IS NULL OR business_id = $2)
            RETURNING *
            "#,
        )
        .bind(codes::normalize_code(code))
        .bind(business_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to claim coupon"))?;

        timer.observe_duration();

        Ok(coupon)
    }

    #[instrument(skip(self))]
    async fn release_coupon(&self, coupon_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE coupons SET usage_count = GREATEST(usage_count - 1, 0) WHERE id = $1")
            .bind(coupon_id)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to release coupon"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_referrer(&self, referral_code: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_referrer"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE referral_code = $1 AND is_active = TRUE",
        )
        .bind(codes::normalize_code(referral_code))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find referrer"))?;

        timer.observe_duration();

        Ok(user)
    }
}
