use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use crate::chat::OPENAI_CHAT_ENDPOINT;

const SECRETS_DIR: &str = "/run/secrets";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Unconfigured(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub admin_token: String,
    pub jwt_secret: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_endpoint: String,
    pub supabase_url: String,
    pub supabase_key: String,
    pub rate_limit_burst: u32,
    pub rate_limit_refill: Duration,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment. Secrets
    /// missing from the environment are looked up in `/run/secrets`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            info!("No .env file loaded ({e}), using process environment");
        }

        Self::from_lookup(lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rate_limit_burst: u32 = try_load(&lookup, "RATE_LIMIT_BURST", "60")?;
        if rate_limit_burst == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_BURST",
                reason: "must be at least 1".to_string(),
            });
        }

        let refill_secs: u64 = try_load(&lookup, "RATE_LIMIT_REFILL_SECS", "60")?;
        if refill_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT_REFILL_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "PORT", "10000")?,
            admin_token: read_secret(&lookup, "ADMIN_TOKEN")?,
            jwt_secret: read_secret(&lookup, "JWT_SECRET")?,
            openai_api_key: read_secret(&lookup, "OPENAI_API_KEY")?,
            openai_model: try_load(&lookup, "OPENAI_MODEL", "gpt-5")?,
            openai_endpoint: try_load(&lookup, "OPENAI_ENDPOINT", OPENAI_CHAT_ENDPOINT)?,
            supabase_url: read_secret(&lookup, "SUPABASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            supabase_key: read_secret(&lookup, "SUPABASE_KEY")?,
            rate_limit_burst,
            rate_limit_refill: Duration::from_secs(refill_secs),
        })
    }
}

fn lookup(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .or_else(|| read_to_string(format!("{SECRETS_DIR}/{key}")).ok())
}

fn present<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    present(lookup, key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

fn read_secret<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    present(lookup, key).ok_or_else(|| {
        warn!("{key} not found in environment or {SECRETS_DIR}");
        ConfigError::Unconfigured(key)
    })
}
