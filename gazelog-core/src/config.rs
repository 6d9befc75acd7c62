use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GazelogConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL. When empty, assembled from `DB_USER`/`DB_PASS`/`DB_HOST`/`DB_NAME`.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub connect_retries: usize,
    pub ensure_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            acquire_timeout_seconds: 5,
            connect_retries: 5,
            ensure_schema: true,
        }
    }
}

impl DatabaseConfig {
    pub fn resolve_url(&self) -> String {
        if !self.url.trim().is_empty() {
            return self.url.clone();
        }
        url_from_parts(
            &std::env::var("DB_USER").unwrap_or_default(),
            &std::env::var("DB_PASS").unwrap_or_default(),
            &std::env::var("DB_HOST").unwrap_or_default(),
            &std::env::var("DB_NAME").unwrap_or_default(),
        )
    }
}

fn url_from_parts(user: &str, password: &str, host: &str, db: &str) -> String {
    format!("postgresql://{}:{}@{}/{}", user, password, host, db)
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS. Empty disables the CORS layer.
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub max_samples: usize,
    /// Largest accepted upload body. Sized so `max_samples` fit as JSON.
    pub max_body_bytes: usize,
    pub timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_samples: 500_000,
            max_body_bytes: 64 * 1024 * 1024,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: u32,
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            timeout_ms: 10_000,
        }
    }
}

impl GazelogConfig {
    /// Load `path` (optional, any format the `config` crate knows) and overlay
    /// `GAZELOG__<SECTION>__<KEY>` environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("GAZELOG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}
