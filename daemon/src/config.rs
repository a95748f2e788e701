//! Service configuration with TOML file support.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then CLI
//! flags and `CREW_*` environment variables. Secrets are never read from
//! the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crew_payments::stripe::DEFAULT_API_BASE;
use crew_payments::CheckoutUrls;
use crew_types::{CoveragePolicy, LifecycleParams};
use crew_utils::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which payment gateway to talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Stripe,
    /// In-process gateway that records requests. Development only.
    #[default]
    Null,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stripe => f.write_str("stripe"),
            Self::Null => f.write_str("null"),
        }
    }
}

impl FromStr for GatewayKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "null" => Ok(Self::Null),
            other => Err(ConfigError::Invalid(format!("unknown gateway kind: {other}"))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// `{group_id}` is substituted.
    #[serde(default = "default_success_url")]
    pub success_url: String,

    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

impl GatewayConfig {
    pub fn urls(&self) -> CheckoutUrls {
        CheckoutUrls {
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::default(),
            api_base: default_api_base(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

/// Values that only ever come from flags or the environment.
#[derive(Clone, Default)]
pub struct Secrets {
    pub webhook_secret: Option<Zeroizing<String>>,
    pub gateway_api_key: Option<Zeroizing<String>>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = |s: &Option<Zeroizing<String>>| if s.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("webhook_secret", &shown(&self.webhook_secret))
            .field("gateway_api_key", &shown(&self.gateway_api_key))
            .finish()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// LMDB environment directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mib")]
    pub map_size_mib: usize,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,

    /// Hex SHA-256 digests of accepted operator bearer tokens.
    #[serde(default)]
    pub operator_token_digests: Vec<String>,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// TTL of the list-read cache; 0 disables it.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default)]
    pub lifecycle: LifecycleParams,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(skip)]
    pub secrets: Secrets,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./crew_data")
}

fn default_map_size_mib() -> usize {
    1024
}

fn default_listen_port() -> u16 {
    7080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_webhook_tolerance() -> u64 {
    crew_payments::webhook::DEFAULT_TOLERANCE_SECS
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_success_url() -> String {
    CheckoutUrls::default().success_url
}

fn default_cancel_url() -> String {
    CheckoutUrls::default().cancel_url
}

/// Flag and environment overrides, applied on top of the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub listen_port: Option<u16>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
    pub operator_token_digests: Vec<String>,
    pub sweep_interval_secs: Option<u64>,
    pub gateway: Option<GatewayKind>,
    pub coverage: Option<CoveragePolicy>,
    pub auto_reveal: bool,
    pub secrets: Secrets,
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ServiceConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(dir) = overrides.data_dir {
            self.data_dir = dir;
        }
        if let Some(port) = overrides.listen_port {
            self.listen_port = port;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if !overrides.operator_token_digests.is_empty() {
            self.operator_token_digests = overrides.operator_token_digests;
        }
        if let Some(secs) = overrides.sweep_interval_secs {
            self.sweep_interval_secs = secs;
        }
        if let Some(kind) = overrides.gateway {
            self.gateway.kind = kind;
        }
        if let Some(policy) = overrides.coverage {
            self.lifecycle.coverage = policy;
        }
        self.lifecycle.auto_reveal |= overrides.auto_reveal;
        if overrides.secrets.webhook_secret.is_some() {
            self.secrets.webhook_secret = overrides.secrets.webhook_secret;
        }
        if overrides.secrets.gateway_api_key.is_some() {
            self.secrets.gateway_api_key = overrides.secrets.gateway_api_key;
        }
    }

    /// Reject combinations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let params = &self.lifecycle;
        if params.min_group_size < 2 || params.min_group_size > params.max_group_size {
            return Err(ConfigError::Invalid(format!(
                "group size bounds {}..={} are not usable",
                params.min_group_size, params.max_group_size
            )));
        }
        if params.deposit_cents == 0 {
            return Err(ConfigError::Invalid("lifecycle.deposit_cents must be positive".to_string()));
        }
        if self.gateway.kind == GatewayKind::Stripe {
            if self.secrets.gateway_api_key.is_none() {
                return Err(ConfigError::Invalid(
                    "the stripe gateway needs CREW_GATEWAY_API_KEY".to_string(),
                ));
            }
            if self.secrets.webhook_secret.is_none() {
                return Err(ConfigError::Invalid(
                    "the stripe gateway needs CREW_WEBHOOK_SECRET".to_string(),
                ));
            }
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mib.saturating_mul(1024 * 1024)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size_mib: default_map_size_mib(),
            listen_port: default_listen_port(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            webhook_tolerance_secs: default_webhook_tolerance(),
            operator_token_digests: Vec::new(),
            sweep_interval_secs: default_sweep_interval(),
            cache_ttl_secs: default_cache_ttl(),
            lifecycle: LifecycleParams::default(),
            gateway: GatewayConfig::default(),
            secrets: Secrets::default(),
        }
    }
}
