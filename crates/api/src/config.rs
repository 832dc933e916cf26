use anyhow::{Context, Result, bail};
use handoff::{DEFAULT_CHUNK_SIZE, DEFAULT_KEY_PREFIX, DEFAULT_MAX_ENTRY_BYTES, HandoffSettings};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub handoff: HandoffConfig,
    pub storage: StorageConfig,
    pub parser: ParserConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub ttl_secs: u64,
    pub chunk_size: usize,
    pub max_entry_bytes: usize,
    pub max_entries: usize,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: String,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub bearer_token: Option<String>,
    pub local_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: "0.0.0.0:3000".to_string(),
                max_upload_bytes: 200 * 1024 * 1024,
                log_format: LogFormat::Pretty,
            },
            handoff: HandoffConfig {
                ttl_secs: 600,
                chunk_size: DEFAULT_CHUNK_SIZE,
                max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
                max_entries: 10_000,
                key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Local,
                bucket: "obe-files".to_string(),
                endpoint: relay::GcsObjectStore::DEFAULT_ENDPOINT.to_string(),
                bearer_token: None,
                local_dir: "data/objects".to_string(),
            },
            parser: ParserConfig {
                url: "http://localhost:8080/parse_pdf".to_string(),
                // Large PDFs take minutes upstream
                request_timeout_secs: 540,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
        }
    }
}

impl AppConfig {
    /// Defaults, then `.env`, then process environment.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("HANDOFF_BIND_ADDR") {
            config.server.bind_addr = v;
        }
        if let Some(v) = get("HANDOFF_MAX_UPLOAD_BYTES") {
            config.server.max_upload_bytes = parse_var("HANDOFF_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("HANDOFF_LOG_FORMAT") {
            config.server.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => bail!("HANDOFF_LOG_FORMAT must be json or pretty, got {other}"),
            };
        }

        if let Some(v) = get("HANDOFF_TTL_SECS") {
            config.handoff.ttl_secs = parse_var("HANDOFF_TTL_SECS", &v)?;
        }
        if let Some(v) = get("HANDOFF_CHUNK_SIZE") {
            config.handoff.chunk_size = parse_var("HANDOFF_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("HANDOFF_MAX_ENTRY_BYTES") {
            config.handoff.max_entry_bytes = parse_var("HANDOFF_MAX_ENTRY_BYTES", &v)?;
        }
        if let Some(v) = get("HANDOFF_MAX_ENTRIES") {
            config.handoff.max_entries = parse_var("HANDOFF_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("HANDOFF_KEY_PREFIX") {
            config.handoff.key_prefix = v;
        }

        if let Some(v) = get("RELAY_STORAGE_BACKEND") {
            config.storage.backend = match v.to_ascii_lowercase().as_str() {
                "gcs" => StorageBackend::Gcs,
                "local" => StorageBackend::Local,
                other => bail!("RELAY_STORAGE_BACKEND must be gcs or local, got {other}"),
            };
        }
        if let Some(v) = get("RELAY_BUCKET") {
            config.storage.bucket = v;
        }
        if let Some(v) = get("RELAY_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        config.storage.bearer_token = get("RELAY_STORAGE_TOKEN");
        if let Some(v) = get("RELAY_LOCAL_DIR") {
            config.storage.local_dir = v;
        }

        if let Some(v) = get("RELAY_PARSE_URL") {
            config.parser.url = v;
        }
        if let Some(v) = get("RELAY_PARSE_TIMEOUT_SECS") {
            config.parser.request_timeout_secs = parse_var("RELAY_PARSE_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("RELAY_MAX_RETRIES") {
            config.retry.max_retries = parse_var("RELAY_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RELAY_INITIAL_BACKOFF_MS") {
            config.retry.initial_backoff_ms = parse_var("RELAY_INITIAL_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("RELAY_MAX_BACKOFF_MS") {
            config.retry.max_backoff_ms = parse_var("RELAY_MAX_BACKOFF_MS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let h = &self.handoff;
        if h.ttl_secs == 0 {
            bail!("handoff TTL must be positive");
        }
        if h.chunk_size == 0 || h.chunk_size > h.max_entry_bytes {
            bail!(
                "chunk size {} must be between 1 and the entry limit {}",
                h.chunk_size,
                h.max_entry_bytes
            );
        }
        if h.max_entries == 0 {
            bail!("cache must hold at least one entry");
        }
        if self.storage.bucket.is_empty() {
            bail!("storage bucket must be set");
        }
        Ok(())
    }

    pub fn handoff_settings(&self) -> HandoffSettings {
        HandoffSettings {
            ttl: Duration::from_secs(self.handoff.ttl_secs),
            chunk_size: self.handoff.chunk_size,
            key_prefix: self.handoff.key_prefix.clone(),
        }
    }

    pub fn retry_policy(&self) -> relay::RetryPolicy {
        relay::RetryPolicy::new(
            self.retry.max_retries,
            self.retry.initial_backoff_ms,
            self.retry.max_backoff_ms,
        )
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}
