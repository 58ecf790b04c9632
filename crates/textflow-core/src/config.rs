use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TextflowError};

/// Top-level Textflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// Step processor backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// "gemini" calls the model directly; "backend" calls a step-processing service.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-call timeout for a single step.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

fn default_provider() -> String { "gemini".to_string() }
fn default_model_id() -> String { "gemini-2.5-flash".to_string() }
fn default_timeout_secs() -> u64 { 60 }
fn default_health_timeout_secs() -> u64 { 5 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Database file. Default: <workspace>/textflow.db
    #[serde(default)]
    pub database: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            database: None,
        }
    }
}

fn default_workspace() -> String { "~/.textflow".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1:3000".to_string() }
fn default_history_limit() -> usize { 5 }
fn default_max_history_limit() -> usize { 100 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = run summary and persistence, 2 = also per-step events.
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: None,
            level: default_log_level(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 1 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TextflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded)
            .map_err(|e| TextflowError::Config(e.to_string()))
    }

    /// Build a config from environment variables alone.
    ///
    /// `GEMINI_API_KEY` selects the direct Gemini processor; otherwise the
    /// step-processing backend at `TEXTFLOW_BACKEND_URL` is used.
    pub fn from_env() -> Self {
        let processor = match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.is_empty() => ProcessorConfig {
                provider: "gemini".to_string(),
                api_key: Some(key),
                ..Default::default()
            },
            _ => ProcessorConfig {
                provider: "backend".to_string(),
                base_url: Some(
                    std::env::var("TEXTFLOW_BACKEND_URL")
                        .unwrap_or_else(|_| "http://localhost:5000".to_string()),
                ),
                ..Default::default()
            },
        };

        Self {
            processor,
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            log: None,
        }
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.storage.workspace)
    }

    /// Resolve the database path.
    pub fn database_path(&self) -> PathBuf {
        match self.storage.database {
            Some(ref db) => expand_home(db),
            None => self.workspace_dir().join("textflow.db"),
        }
    }

    /// Resolve the run log directory, if run logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        Some(match log.log_dir {
            Some(ref dir) => expand_home(dir),
            None => self.workspace_dir().join("logs"),
        })
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
