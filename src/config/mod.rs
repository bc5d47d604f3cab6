//! Runtime configuration: file (TOML or JSON) first, then environment
//! overrides, then sanitizing.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "DEAL_ALERTS_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/deal_alerts.toml";

const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// REST root; deals are read from `{deals_base_url}/deals/public`.
    pub deals_base_url: String,
    pub poll_interval_ms: u64,
    /// Directory for the JSON key-value files.
    pub storage_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// Optional webhook that receives every new notification.
    pub notify_webhook_url: Option<String>,
    /// `host:port` for the Prometheus exporter; disabled when unset.
    pub metrics_addr: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            deals_base_url: "http://localhost:5000/api".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            storage_dir: PathBuf::from("state"),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            notify_webhook_url: None,
            metrics_addr: None,
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse a config file; `.json` is read as JSON, anything else as TOML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let cfg: AppConfig = if is_json {
            serde_json::from_str(&data).context("parse JSON config")?
        } else {
            toml::from_str(&data).context("parse TOML config")?
        };
        Ok(cfg.sanitized())
    }

    /// Resolve the config:
    /// 1) file at `$DEAL_ALERTS_CONFIG` (must exist if set)
    /// 2) `config/deal_alerts.toml` if present
    /// 3) built-in defaults
    ///
    /// and then apply env overrides.
    pub fn load() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    /// `DEALS_BASE_URL`, `POLL_INTERVAL_MS`, `STORAGE_DIR`,
    /// `REQUEST_TIMEOUT_SECS`, `NOTIFY_WEBHOOK_URL`, `METRICS_ADDR`.
    /// Unparsable numbers are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("DEALS_BASE_URL") {
            self.deals_base_url = v;
        }
        if let Some(v) = env_parse("POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
        if let Ok(v) = std::env::var("STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parse("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("NOTIFY_WEBHOOK_URL") {
            self.notify_webhook_url = Some(v);
        }
        if let Ok(v) = std::env::var("METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        self.deals_base_url = self.deals_base_url.trim().trim_end_matches('/').to_string();
        for opt in [&mut self.notify_webhook_url, &mut self.metrics_addr] {
            if opt.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *opt = None;
            }
        }
        self
    }
}

fn env_parse(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
