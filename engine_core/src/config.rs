/// config.rs — Ambient engine configuration, loaded from the environment
///
/// This is not a config/schema-generation surface (that lives, if
/// anywhere, in a downstream CLI). It is the ambient tuning knobs every
/// component needs: cache sizes, default indicator periods, decimal
/// rounding precision, and the session root.
/// Loading happens once at startup; every module borrows `&EngineConfig`.
use std::env;

use crate::error::{EngineError, ErrorCode, Result};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-symbol sliding-window cache capacity (C2). `0` disables the
    /// cache entirely.
    pub cache_max_size: usize,
    /// Decimal places used when rounding the maximum-buy-quantity helper
    /// (C7).
    pub quantity_precision: u32,
    /// Root directory under which session run folders are created (C10).
    pub data_root: std::path::PathBuf,
    /// Aggregation bucket width, in minutes, used when `range(..)` is
    /// called without an explicit interval override.
    pub default_bucket_minutes: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 512,
            quantity_precision: 8,
            data_root: std::path::PathBuf::from("./data"),
            default_bucket_minutes: 1,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables (after `.env`),
    /// falling back to documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // ignore missing .env

        let defaults = Self::default();
        Ok(Self {
            cache_max_size: parse_env("ENGINE_CACHE_MAX_SIZE", defaults.cache_max_size)?,
            quantity_precision: parse_env(
                "ENGINE_QUANTITY_PRECISION",
                defaults.quantity_precision,
            )?,
            data_root: env::var("ENGINE_DATA_ROOT")
                .map(std::path::PathBuf::from)
                .unwrap_or(defaults.data_root),
            default_bucket_minutes: parse_env(
                "ENGINE_DEFAULT_BUCKET_MINUTES",
                defaults.default_bucket_minutes,
            )?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v.parse::<T>().map_err(|e| EngineError::InvalidParameter {
            code: ErrorCode::InvalidParameter,
            message: format!("config key {key}: {e}"),
        }),
        Err(_) => Ok(default),
    }
}
