use anyhow::{bail, Context, Result};

use crate::matching::ProximityRadii;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub rust_log: String,
    pub radii: ProximityRadii,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let radii = ProximityRadii {
            near_meters: optional_env("NEAR_RADIUS_METERS", ProximityRadii::DEFAULT.near_meters)?,
            wide_meters: optional_env("WIDE_RADIUS_METERS", ProximityRadii::DEFAULT.wide_meters)?,
        };
        validate_radii(&radii)?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            db_max_connections: optional_env("DB_MAX_CONNECTIONS", 10)?,
            port: optional_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            radii,
        })
    }
}

/// Rejects radii that would break the near/wide calibration:
/// 200m must match near, 800m must not, 800m must match wide.
pub fn validate_radii(radii: &ProximityRadii) -> Result<()> {
    let ProximityRadii {
        near_meters,
        wide_meters,
    } = *radii;
    if !(near_meters > 200.0 && near_meters < 800.0) {
        bail!("NEAR_RADIUS_METERS must be between 200 and 800 (exclusive), got {near_meters}");
    }
    if wide_meters < 800.0 {
        bail!("WIDE_RADIUS_METERS must be at least 800, got {wide_meters}");
    }
    if near_meters >= wide_meters {
        bail!("NEAR_RADIUS_METERS ({near_meters}) must be smaller than WIDE_RADIUS_METERS ({wide_meters})");
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
