//! Configuration module for booking-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub email: EmailConfig,
    pub scheduler: SchedulerConfig,
    pub booking: BookingRules,
    pub rate_limit: RateLimitConfig,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown ENVIRONMENT '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    pub expiry_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Empty disables the card gateway.
    pub stripe_secret_key: Secret<String>,
    pub stripe_api_base_url: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_user: String,
    pub smtp_password: Secret<String>,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Offset of the operator's local calendar day from UTC.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct BookingRules {
    pub seat_hold_minutes: i64,
    pub confirm_on_create: bool,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: Secret<String>,
}

impl BookingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_USERNAME").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin {
                    username,
                    password: Secret::new(password),
                })
            }
            _ => None,
        };

        let config = BookingConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some("booking-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            public_base_url: get_env("PUBLIC_BASE_URL", Some("http://localhost:3000"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "2", is_prod)?,
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env(
                    "JWT_SECRET",
                    Some("dev-only-insecure-jwt-secret"),
                    is_prod,
                )?),
                expiry_minutes: parse_env("JWT_EXPIRY_MINUTES", "720", is_prod)?,
            },
            payment: PaymentConfig {
                stripe_secret_key: Secret::new(get_env("STRIPE_SECRET_KEY", Some(""), is_prod)?),
                stripe_api_base_url: get_env(
                    "STRIPE_API_BASE_URL",
                    Some("https://api.stripe.com"),
                    false,
                )?
                .trim_end_matches('/')
                .to_string(),
                currency: get_env("PAYMENT_CURRENCY", Some("usd"), false)?.to_lowercase(),
            },
            email: EmailConfig {
                enabled: parse_env("EMAIL_ENABLED", "false", false)?,
                smtp_host: get_env("SMTP_HOST", Some("localhost"), false)?,
                smtp_user: get_env("SMTP_USER", Some(""), false)?,
                smtp_password: Secret::new(get_env("SMTP_PASSWORD", Some(""), false)?),
                from_address: get_env("SMTP_FROM", Some("BookerOS <no-reply@bookeros.local>"), false)?,
            },
            scheduler: SchedulerConfig {
                enabled: parse_env("SCHEDULER_ENABLED", "true", false)?,
                interval_seconds: parse_env("SCHEDULER_INTERVAL_SECONDS", "3600", false)?,
                utc_offset_minutes: parse_env("SCHEDULER_UTC_OFFSET_MINUTES", "0", false)?,
            },
            booking: BookingRules {
                seat_hold_minutes: parse_env("SEAT_HOLD_MINUTES", "15", false)?,
                confirm_on_create: parse_env("BOOKING_CONFIRM_ON_CREATE", "false", false)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", false)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", false)?,
            },
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.jwt.expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.scheduler.interval_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SCHEDULER_INTERVAL_SECONDS must be positive"
            )));
        }

        if self.booking.seat_hold_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SEAT_HOLD_MINUTES must be positive"
            )));
        }

        if !(-14 * 60..=14 * 60).contains(&self.scheduler.utc_offset_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SCHEDULER_UTC_OFFSET_MINUTES must be within +/-840"
            )));
        }

        if self.is_prod() && self.allowed_origins.iter().any(|o| o == "*") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("Development".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    #[serial]
    fn test_get_env_falls_back_in_dev() {
        env::remove_var("BOOKING_TEST_UNSET_KEY");
        assert_eq!(
            get_env("BOOKING_TEST_UNSET_KEY", Some("fallback"), false).unwrap(),
            "fallback"
        );
        assert!(get_env("BOOKING_TEST_UNSET_KEY", None, false).is_err());
    }

    #[test]
    #[serial]
    fn test_get_env_requires_value_in_prod() {
        env::remove_var("BOOKING_TEST_UNSET_KEY");
        assert!(get_env("BOOKING_TEST_UNSET_KEY", Some("fallback"), true).is_err());
    }

    #[test]
    #[serial]
    fn test_parse_env_reports_bad_values() {
        env::set_var("BOOKING_TEST_NUMBER", "fifteen");
        let result: Result<i64, _> = parse_env("BOOKING_TEST_NUMBER", "15", false);
        assert!(result.is_err());

        env::set_var("BOOKING_TEST_NUMBER", " 30 ");
        let value: i64 = parse_env("BOOKING_TEST_NUMBER", "15", false).unwrap();
        assert_eq!(value, 30);
        env::remove_var("BOOKING_TEST_NUMBER");
    }
}
