use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub redis_url: Option<String>,
    pub prefs_path: Option<String>,
    pub admin_uid: Option<String>,
    pub edit_window_seconds: i64,
    pub page_size: usize,
    pub max_message_chars: usize,
    pub max_name_chars: usize,
    pub preview_relay_url: Option<String>,
    pub preview_timeout_ms: u64,
    pub preview_cache_ttl_seconds: u64,
    pub geocoder_url: Option<String>,
    pub image_max_dimension: u32,
    pub image_max_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let store_backend: StoreBackend = env_or_parse("STORE_BACKEND", "postgres")?;
        let database_url = env_opt("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("missing required env var: DATABASE_URL"));
        }

        let page_size: usize = env_or_parse("PAGE_SIZE", "10")?;
        if page_size == 0 {
            return Err(anyhow!("invalid PAGE_SIZE: must be at least 1"));
        }

        Ok(Self {
            http_addr,
            store_backend,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "10")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            redis_url: env_opt("REDIS_URL"),
            prefs_path: Some(env_or("PREFS_PATH", "mural-prefs.json")).filter(|p| !p.is_empty()),
            admin_uid: env_opt("ADMIN_UID"),
            edit_window_seconds: env_or_parse("EDIT_WINDOW_SECONDS", "60")?,
            page_size,
            max_message_chars: env_or_parse("MAX_MESSAGE_CHARS", "500")?,
            max_name_chars: env_or_parse("MAX_NAME_CHARS", "15")?,
            preview_relay_url: Some(env_or(
                "PREVIEW_RELAY_URL",
                "https://api.allorigins.win/raw?url=",
            ))
            .filter(|url| !url.is_empty()),
            preview_timeout_ms: env_or_parse("PREVIEW_TIMEOUT_MS", "5000")?,
            preview_cache_ttl_seconds: env_or_parse("PREVIEW_CACHE_TTL_SECONDS", "86400")?,
            geocoder_url: Some(env_or(
                "GEOCODER_URL",
                "https://api.bigdatacloud.net/data/reverse-geocode-client",
            ))
            .filter(|url| !url.is_empty()),
            image_max_dimension: env_or_parse("IMAGE_MAX_DIMENSION", "800")?,
            image_max_bytes: env_or_parse("IMAGE_MAX_BYTES", "5242880")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
