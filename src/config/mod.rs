use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppMode {
    Gateway,
    Ads,
    City,
    Auth,
    Worker,
    /// Every service plus the gateway in one process.
    All,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "gateway" => Ok(Self::Gateway),
            "ads" => Ok(Self::Ads),
            "city" => Ok(Self::City),
            "auth" => Ok(Self::Auth),
            "worker" => Ok(Self::Worker),
            "all" => Ok(Self::All),
            other => Err(anyhow!("unknown APP_MODE: {}", other)),
        }
    }
}

impl AppMode {
    /// Modes that host the HTTP gateway.
    pub fn serves_http(self) -> bool {
        matches!(self, Self::Gateway | Self::All)
    }

    /// Modes that host at least one RPC service and therefore need storage.
    pub fn serves_backend(self) -> bool {
        matches!(self, Self::Ads | Self::City | Self::Auth | Self::All)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionBackend {
    Redis,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobBackend {
    S3,
    Memory,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app_mode: AppMode,
    pub http_addr: String,
    pub ads_rpc_addr: String,
    pub city_rpc_addr: String,
    pub auth_rpc_addr: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub session_backend: SessionBackend,
    pub redis_url: String,
    pub blob_backend: BlobBackend,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: String,
    pub csrf_secret: String,
    pub csrf_ttl_minutes: u64,
    pub session_ttl_hours: u64,
    pub cookie_secure: bool,
    pub request_timeout_ms: u64,
    pub upload_max_bytes: usize,
    pub priority_window_hours: u64,
    pub priority_sweep_seconds: u64,
    pub cors_allowed_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode: AppMode = env_or("APP_MODE", "gateway").parse()?;

        let storage_backend = match env_or("STORAGE_BACKEND", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => return Err(anyhow!("unknown STORAGE_BACKEND: {}", other)),
        };
        let session_backend = match env_or("SESSION_BACKEND", "redis").as_str() {
            "redis" => SessionBackend::Redis,
            "memory" => SessionBackend::Memory,
            other => return Err(anyhow!("unknown SESSION_BACKEND: {}", other)),
        };
        let blob_backend = match env_or("BLOB_BACKEND", "s3").as_str() {
            "s3" => BlobBackend::S3,
            "memory" => BlobBackend::Memory,
            other => return Err(anyhow!("unknown BLOB_BACKEND: {}", other)),
        };

        let database_url = match storage_backend {
            StorageBackend::Postgres if app_mode.serves_backend() => {
                Some(env_or_err("DATABASE_URL")?)
            }
            _ => std::env::var("DATABASE_URL").ok(),
        };
        let s3_endpoint = match blob_backend {
            BlobBackend::S3 if matches!(app_mode, AppMode::Ads | AppMode::All) => {
                Some(env_or_err("S3_ENDPOINT")?)
            }
            _ => std::env::var("S3_ENDPOINT").ok(),
        };

        let csrf_secret = if app_mode.serves_http() {
            let secret = env_or_err("CSRF_SECRET")?;
            if secret.len() < 32 {
                return Err(anyhow!("invalid CSRF_SECRET: expected at least 32 bytes"));
            }
            secret
        } else {
            std::env::var("CSRF_SECRET").unwrap_or_default()
        };

        Ok(Self {
            app_mode,
            http_addr,
            ads_rpc_addr: env_or("ADS_RPC_ADDR", "127.0.0.1:50051"),
            city_rpc_addr: env_or("CITY_RPC_ADDR", "127.0.0.1:50052"),
            auth_rpc_addr: env_or("AUTH_RPC_ADDR", "127.0.0.1:50053"),
            storage_backend,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            session_backend,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            blob_backend,
            s3_endpoint,
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_bucket: env_or("S3_BUCKET", "images"),
            csrf_secret,
            csrf_ttl_minutes: env_or_parse("CSRF_TTL_MINUTES", "60")?,
            session_ttl_hours: env_or_parse("SESSION_TTL_HOURS", "24")?,
            cookie_secure: env_or_parse("COOKIE_SECURE", "true")?,
            request_timeout_ms: env_or_parse("REQUEST_TIMEOUT_MS", "10000")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "10485760")?,
            priority_window_hours: env_or_parse("PRIORITY_WINDOW_HOURS", "24")?,
            priority_sweep_seconds: env_or_parse("PRIORITY_SWEEP_SECONDS", "600")?,
            cors_allowed_origin: std::env::var("CORS_ALLOWED_ORIGIN").ok(),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
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
