//! Process configuration, read once from the environment at startup

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8501;
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llava";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration for the inference service connection
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the Ollama server, without trailing slash
    pub host: String,
    /// Multimodal model used for both text and image requests
    pub model: String,
    /// Whole-request timeout. `None` keeps the HTTP client's default.
    pub request_timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub llm: LlmConfig,
    /// Where upload scratch files are created
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub session_idle_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            llm: LlmConfig::default(),
            scratch_dir: std::env::temp_dir(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup; unset or empty
    /// variables fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let request_timeout = parse_var::<u64>(&get, "XRAY_REQUEST_TIMEOUT_SECS", "number of seconds")?
            .map(Duration::from_secs);

        Ok(Self {
            port: parse_var(&get, "XRAY_PORT", "port number")?.unwrap_or(defaults.port),
            llm: LlmConfig {
                host: get("OLLAMA_HOST")
                    .map_or(defaults.llm.host, |host| normalize_host(&host)),
                model: get("XRAY_MODEL").unwrap_or(defaults.llm.model),
                request_timeout,
            },
            scratch_dir: get("XRAY_SCRATCH_DIR").map_or(defaults.scratch_dir, PathBuf::from),
            max_upload_bytes: parse_var(&get, "XRAY_MAX_UPLOAD_BYTES", "byte count")?
                .unwrap_or(defaults.max_upload_bytes),
            session_idle_timeout: parse_var::<u64>(&get, "XRAY_SESSION_IDLE_SECS", "number of seconds")?
                .map_or(defaults.session_idle_timeout, Duration::from_secs),
        })
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(var)
        .map(|value| {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|_| ConfigError::Invalid {
                var,
                expected,
                value,
            })
        })
        .transpose()
}

/// Ollama accepts `OLLAMA_HOST=127.0.0.1:11434`; add a scheme when missing
/// and drop trailing slashes.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
