//! Scheduled sweep integration tests. Sweeps are driven directly with the
//! test clock instead of waiting on the scheduler.

mod common;

use booking_service::models::NoticeKind;
use booking_service::services::Clock;
use chrono::{Duration, NaiveDate};
use common::{tour_date, TestApp};
use serde_json::{json, Value};

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn reminder_goes_out_once_for_tomorrows_tour() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(10, "30.00").await;
    let tomorrow = NaiveDate::from_ymd_opt(2030, 6, 2).unwrap();

    let booking = app
        .book(tour_id, 2, json!({ "bookingDate": tomorrow }))
        .await;
    assert_eq!(booking.status(), 201);
    let booking: Value = booking.json().await.unwrap();
    let booking_id: uuid::Uuid = booking["id"].as_str().unwrap().parse().unwrap();
    app.pay_cash(&booking_id.to_string()).await;

    let now = app.clock.now();
    app.jobs.sweep_notices(NoticeKind::Reminder, now).await;
    app.jobs.sweep_notices(NoticeKind::Reminder, now).await;

    let reminders = app
        .email
        .sent()
        .into_iter()
        .filter(|m| m.kind == "reminder" && m.booking_id == booking_id)
        .count();
    assert_eq!(reminders, 1);

    let stamped: Value = app
        .get(&format!("/api/bookings/{}", booking_id), None)
        .await
        .json()
        .await
        .unwrap();
    assert!(stamped["reminderSentAt"].is_string());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn expired_seat_holds_are_released() {
    let app = TestApp::spawn().await;
    let tour_id = app.create_tour(2, "30.00").await;

    let hold = app
        .post(
            "/api/seat-holds",
            None,
            json!({ "tourId": tour_id, "date": tour_date(), "seats": 2 }),
        )
        .await;
    assert_eq!(hold.status(), 201);

    let path = format!("/api/tours/{}/availability?date={}", tour_id, tour_date());
    let held: Value = app.get(&path, None).await.json().await.unwrap();
    assert_eq!(held["held"], 2);
    assert_eq!(held["remaining"], 0);

    app.clock.advance(Duration::minutes(16));
    let released = app
        .jobs
        .release_expired_holds(app.clock.now())
        .await
        .unwrap();
    assert!(released >= 1);

    let freed: Value = app.get(&path, None).await.json().await.unwrap();
    assert_eq!(freed["held"], 0);
    assert_eq!(freed["remaining"], 2);
}
