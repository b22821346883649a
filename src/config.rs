use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// ✅ Global Config stored in `OnceLock`
static CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud/pinning/pinFileToIPFS";
const DEFAULT_PINATA_GATEWAY_URL: &str = "https://gateway.pinata.cloud/ipfs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Config already initialized")]
    AlreadyInitialized,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub booking_log_path: PathBuf,
    pub rating_log_path: PathBuf,
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub pinata_api_url: String,
    pub pinata_gateway_url: String,
    pub pinata_jwt: Option<String>,
    pub admin_uids: Vec<String>,
    pub max_upload_bytes: usize,
    pub log_dir: PathBuf,
    pub feed_wait: Duration,
}

impl Config {
    /// ✅ Load environment variables and set defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env only once

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: parsed("BIND_ADDR", "127.0.0.1:3000")?,
            booking_log_path: PathBuf::from(
                env::var("BOOKING_LOG_PATH").unwrap_or_else(|_| "data/bookings.jsonl".to_string()),
            ),
            rating_log_path: PathBuf::from(
                env::var("RATING_LOG_PATH").unwrap_or_else(|_| "data/ratings.jsonl".to_string()),
            ),
            llm_api_url: env::var("LLM_API_URL").unwrap_or_else(|_| DEFAULT_LLM_API_URL.to_string()),
            llm_api_key: optional("LLM_API_KEY"),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            llm_timeout: Duration::from_secs(parsed("LLM_TIMEOUT_SECS", "30")?),
            pinata_api_url: env::var("PINATA_API_URL")
                .unwrap_or_else(|_| DEFAULT_PINATA_API_URL.to_string()),
            pinata_gateway_url: env::var("PINATA_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_PINATA_GATEWAY_URL.to_string()),
            pinata_jwt: optional("PINATA_JWT"),
            admin_uids: split_list(&env::var("ADMIN_UIDS").unwrap_or_default()),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", "10485760")?,
            log_dir: PathBuf::from(env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())),
            feed_wait: Duration::from_secs(parsed("FEED_WAIT_SECS", "25")?),
        })
    }

    /// ✅ Initialize the global config
    pub fn init() -> Result<Arc<Config>, ConfigError> {
        let config = Arc::new(Self::from_env()?);
        CONFIG
            .set(config.clone())
            .map_err(|_| ConfigError::AlreadyInitialized)?;
        Ok(config)
    }

    /// ✅ Safe access to Config
    pub fn get() -> Arc<Config> {
        CONFIG.get().expect("Config not initialized").clone()
    }

    pub fn is_bootstrap_admin(&self, uid: &str) -> bool {
        self.admin_uids.iter().any(|admin| admin == uid)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
