//! Configuration management for the CRM service

use anyhow::Context;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub store: StoreBackend,
    pub auth: AuthConfig,
    pub notifications: NotificationConfig,
    pub seed: SeedConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" | "inmemory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: u64,
    /// Static token accepted from trusted services (POS terminals, mobile backend)
    pub api_bearer_token: Option<String>,
    /// Restaurant the static token acts for when no X-Restaurant-Id header is sent
    pub service_restaurant_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub push_gateway_url: Option<String>,
    pub timeout_seconds: u64,
}

/// First restaurant and administrator, created on startup when both
/// credentials are set and the email is not registered yet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    pub restaurant_name: String,
    pub admin_email: Option<String>,
    #[serde(skip_serializing)]
    pub admin_password: Option<String>,
    pub admin_name: String,
}

impl SeedConfig {
    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    pub port: u16,
    /// IANA zone used for "today" / "this month" boundaries
    pub business_timezone: String,
    pub request_timeout_seconds: u64,
    /// Empty means any origin, without credentials
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn timezone(&self) -> Tz {
        self.business_timezone.parse().unwrap_or(chrono_tz::Europe::Istanbul)
    }
}

fn env_or<T>(key: &str, default: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {}: {} ({})", key, raw, e))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_opt("DATABASE_URL");
        let store = match env_opt("STORE_BACKEND") {
            Some(raw) => raw.parse().context("STORE_BACKEND")?,
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };

        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("STORE_BACKEND=postgres requires DATABASE_URL");
        }

        let business_timezone: String = env_or("BUSINESS_TIMEZONE", "Europe/Istanbul")?;
        business_timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid BUSINESS_TIMEZONE {}: {}", business_timezone, e))?;

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", "20")?,
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", "2")?,
                acquire_timeout_seconds: env_or("DATABASE_ACQUIRE_TIMEOUT_SECONDS", "30")?,
                idle_timeout_seconds: env_or("DATABASE_IDLE_TIMEOUT_SECONDS", "600")?,
                max_lifetime_seconds: env_or("DATABASE_MAX_LIFETIME_SECONDS", "1800")?,
                run_migrations: env_or("DATABASE_RUN_MIGRATIONS", "true")?,
            },
            store,
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .unwrap_or_else(|_| "aircrm-development-jwt-secret-change-me".to_string()),
                access_token_ttl_seconds: env_or("JWT_ACCESS_TOKEN_TTL_SECONDS", "28800")?,
                api_bearer_token: env_opt("API_BEARER_TOKEN"),
                service_restaurant_id: env_opt("SERVICE_RESTAURANT_ID")
                    .map(|raw| raw.parse::<uuid::Uuid>())
                    .transpose()
                    .context("SERVICE_RESTAURANT_ID")?,
            },
            notifications: NotificationConfig {
                push_gateway_url: env_opt("PUSH_GATEWAY_URL"),
                timeout_seconds: env_or("PUSH_GATEWAY_TIMEOUT_SECONDS", "10")?,
            },
            seed: SeedConfig {
                restaurant_name: env_or("SEED_RESTAURANT_NAME", "AirCRM Restaurant")?,
                admin_email: env_opt("SEED_ADMIN_EMAIL").map(|e| e.trim().to_lowercase()),
                admin_password: env_opt("SEED_ADMIN_PASSWORD"),
                admin_name: env_or("SEED_ADMIN_NAME", "Administrator")?,
            },
            app: AppConfig {
                environment: env_or("ENVIRONMENT", "development")?,
                log_level: env_or("RUST_LOG", "info")?,
                port: env_or("PORT", "8000")?,
                business_timezone,
                request_timeout_seconds: env_or("REQUEST_TIMEOUT_SECONDS", "30")?,
                cors_allowed_origins: env_opt("CORS_ALLOWED_ORIGINS")
                    .map(|raw| {
                        raw.split(',')
                            .map(|origin| origin.trim().to_string())
                            .filter(|origin| !origin.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_aliases() {
        assert_eq!("pg".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("Memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn unknown_timezone_falls_back_to_istanbul() {
        let app = AppConfig {
            environment: "test".into(),
            log_level: "info".into(),
            port: 8000,
            business_timezone: "Mars/Olympus".into(),
            request_timeout_seconds: 30,
            cors_allowed_origins: vec![],
        };
        assert_eq!(app.timezone(), chrono_tz::Europe::Istanbul);
    }

    #[test]
    fn seed_needs_both_credentials() {
        let mut seed = SeedConfig {
            admin_email: Some("admin@aircrm.com".into()),
            ..Default::default()
        };
        assert!(seed.admin_credentials().is_none());
        seed.admin_password = Some("admin123".into());
        assert_eq!(seed.admin_credentials(), Some(("admin@aircrm.com", "admin123")));
    }
}
