use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub ingest_server: ServerConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "ExportConfig::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "ExportConfig::default_cache_max_entries")]
    pub cache_max_entries: u64,
    #[serde(default = "ExportConfig::default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,
    #[serde(default = "ExportConfig::default_raw_rate_limit_per_hour")]
    pub raw_rate_limit_per_hour: u32,
    #[serde(default = "ExportConfig::default_max_raw_rows")]
    pub max_raw_rows: u32,
}

impl ExportConfig {
    const fn default_cache_ttl_secs() -> u64 {
        1800
    }

    const fn default_cache_max_entries() -> u64 {
        512
    }

    const fn default_rate_limit_per_hour() -> u32 {
        5
    }

    const fn default_raw_rate_limit_per_hour() -> u32 {
        2
    }

    const fn default_max_raw_rows() -> u32 {
        10_000
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./pollit.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(20);

        let idle_timeout_secs = std::env::var("DATABASE_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let acquire_timeout_secs = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;

        let ingest_host = std::env::var("INGEST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let ingest_port = std::env::var("INGEST_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()?;

        let cache_ttl_secs = std::env::var("EXPORT_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(ExportConfig::default_cache_ttl_secs);

        let cache_max_entries = std::env::var("EXPORT_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or_else(ExportConfig::default_cache_max_entries);

        let rate_limit_per_hour = std::env::var("EXPORT_RATE_LIMIT_PER_HOUR")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or_else(ExportConfig::default_rate_limit_per_hour);

        let raw_rate_limit_per_hour = std::env::var("EXPORT_RAW_RATE_LIMIT_PER_HOUR")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or_else(ExportConfig::default_raw_rate_limit_per_hour);

        let max_raw_rows = std::env::var("EXPORT_MAX_RAW_ROWS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or_else(ExportConfig::default_max_raw_rows);

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
                idle_timeout_secs,
                acquire_timeout_secs,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            ingest_server: ServerConfig {
                host: ingest_host,
                port: ingest_port,
            },
            export: ExportConfig {
                cache_ttl_secs,
                cache_max_entries,
                rate_limit_per_hour,
                raw_rate_limit_per_hour,
                max_raw_rows,
            },
        })
    }
}
