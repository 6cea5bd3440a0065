//! Global configuration management for asrai-mcp
//!
//! Configuration is assembled from, in order of precedence:
//! - CLI flags and their environment variables (`ASRAI_*`, `PRIVATE_KEY`)
//! - A JSON config file or inline JSON string (`--config`)
//! - Built-in defaults
//!
//! Everything that is optional in the file has an accessor returning the
//! effective value, so callers never deal with the defaults themselves.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8402;
pub const DEFAULT_MAX_SPEND: f64 = 2.0;
pub const DEFAULT_API_URL: &str = "https://x402.asrai.me";
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_MAX_PAYMENT: f64 = 0.01;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

// ============================================================================
// Configuration Arguments
// ============================================================================

/// Common configuration arguments (shared by all subcommands)
#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Configuration file (JSON file path or JSON string).
    ///
    /// - A file path: --config asrai.json
    ///
    /// - Inline JSON: --config '{"port":9000,"max_spend":5.0}'
    ///
    #[arg(long = "config", short = 'c', env = "ASRAI_CONFIG", value_name = "file.json or {json}")]
    pub config: Option<String>,

    /// Address to bind the HTTP gateway to
    #[arg(long, env = "ASRAI_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short = 'p', env = "ASRAI_PORT")]
    pub port: Option<u16>,

    /// Per-session spend ceiling in USD
    #[arg(long, env = "ASRAI_MAX_SPEND", value_name = "USD")]
    pub max_spend: Option<f64>,

    /// Upstream Asrai API base URL
    #[arg(long, env = "ASRAI_API_URL", value_name = "http(s)://...")]
    pub api_url: Option<String>,

    /// Timeout for one paid request, in seconds
    #[arg(long, env = "ASRAI_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Largest single x402 payment the server will sign, in USD
    #[arg(long, env = "ASRAI_MAX_PAYMENT", value_name = "USD")]
    pub max_payment: Option<f64>,

    /// Evict idle /mcp sessions after this many seconds (0 disables)
    #[arg(long = "session-idle", env = "ASRAI_SESSION_IDLE", value_name = "SECONDS")]
    pub session_idle: Option<u64>,

    /// Default wallet key, used when a connection brings none (hex or @keyfile)
    #[arg(long, short = 'k', env = "PRIVATE_KEY", value_name = "0xKEY or @keyfile", hide_env_values = true)]
    pub key: Option<String>,

    // -------------------------------------------------------------------------
    // Logging/Tracing Options
    // -------------------------------------------------------------------------

    /// Enable verbose output (INFO level logging)
    ///
    /// Default is WARN level. Use -v for INFO, -d for DEBUG.
    ///
    #[arg(short = 'v', long, env = "ASRAI_VERBOSE")]
    pub verbose: bool,

    /// Enable debug output (DEBUG level logging)
    #[arg(short = 'd', long, env = "ASRAI_DEBUG", conflicts_with = "verbose")]
    pub debug: bool,

    /// Quiet mode - only show errors
    #[arg(short = 'q', long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Silent mode - suppress all terminal log output
    ///
    /// Log file output (if configured) is unaffected.
    ///
    #[arg(long, short = 's', conflicts_with_all = ["verbose", "debug", "quiet"])]
    pub silent: bool,

    /// Log output format
    #[arg(long, short = 'L', default_value = "pretty", value_enum, env = "ASRAI_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Write debug logs to file
    #[arg(long, short = 'l', env = "ASRAI_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

// ============================================================================
// Global Configuration
// ============================================================================

/// Global configuration structure (can be deserialized from JSON)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Bind address for the HTTP gateway
    pub host: Option<String>,

    /// Port for the HTTP gateway
    pub port: Option<u16>,

    /// Per-session spend ceiling in USD
    pub max_spend: Option<f64>,

    /// Upstream API base URL
    pub api_url: Option<String>,

    /// Timeout for one paid request, in seconds
    pub timeout_secs: Option<u64>,

    /// Largest single x402 payment, in USD
    pub max_payment: Option<f64>,

    /// Idle eviction for /mcp sessions, in seconds
    pub session_idle_secs: Option<u64>,

    /// Process-wide default wallet key
    #[serde(skip_serializing)]
    pub key: Option<String>,

    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load configuration from ConfigArgs, CLI values taking precedence
    pub fn from_args(args: &ConfigArgs) -> Result<Self> {
        let config = load_config(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        let max_spend = self.max_spend();
        if !(max_spend.is_finite() && max_spend > 0.0) {
            anyhow::bail!("max_spend must be a positive number, got {max_spend}");
        }
        let max_payment = self.max_payment();
        if !(max_payment.is_finite() && max_payment > 0.0) {
            anyhow::bail!("max_payment must be a positive number, got {max_payment}");
        }
        if self.timeout_secs() == 0 {
            anyhow::bail!("timeout must be at least one second");
        }
        url::Url::parse(self.api_url())
            .map_err(|e| anyhow::anyhow!("Invalid api_url '{}': {}", self.api_url(), e))?;
        Ok(())
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn max_spend(&self) -> f64 {
        self.max_spend.unwrap_or(DEFAULT_MAX_SPEND)
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs())
    }

    pub fn max_payment(&self) -> f64 {
        self.max_payment.unwrap_or(DEFAULT_MAX_PAYMENT)
    }

    /// `None` when idle eviction is disabled
    pub fn session_idle(&self) -> Option<Duration> {
        match self.session_idle_secs.unwrap_or(DEFAULT_SESSION_IDLE_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// The default key with surrounding whitespace removed, if any
    pub fn default_key(&self) -> Option<&str> {
        self.key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Initialize tracing/logging based on configuration
    ///
    /// Call this once early in main() before any logging calls.
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(crate::logging::TracingConfig {
            verbose: self.verbose,
            debug: self.debug,
            quiet: self.quiet,
            silent: self.silent,
            format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        });
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load JSON from either a file path or an inline JSON string
fn load_json_string(input: &str) -> Result<String> {
    if input.trim_start().starts_with('{') {
        return Ok(input.to_string());
    }
    let path = std::path::Path::new(input);
    if path.exists() {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path.display(), e))
    } else {
        // Not a file; let the JSON parser report what is wrong with it
        Ok(input.to_string())
    }
}

/// Resolve `@path` key references to the key stored in that file
fn load_key(key: &str) -> Result<String> {
    match key.strip_prefix('@') {
        Some(file_path) => Ok(std::fs::read_to_string(file_path)
            .map_err(|e| anyhow::anyhow!("Failed to read key from file '{}': {}", file_path, e))?
            .trim()
            .to_string()),
        None => Ok(key.to_string()),
    }
}

fn load_config(args: &ConfigArgs) -> Result<GlobalConfig> {
    let mut config = if let Some(input) = &args.config {
        let json_str = load_json_string(input)?;
        serde_json::from_str(&json_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config JSON: {}", e))?
    } else {
        GlobalConfig::default()
    };

    if let Some(host) = &args.host {
        config.host = Some(host.clone());
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(max_spend) = args.max_spend {
        config.max_spend = Some(max_spend);
    }
    if let Some(api_url) = &args.api_url {
        config.api_url = Some(api_url.clone());
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = Some(timeout);
    }
    if let Some(max_payment) = args.max_payment {
        config.max_payment = Some(max_payment);
    }
    if let Some(idle) = args.session_idle {
        config.session_idle_secs = Some(idle);
    }
    if let Some(key) = &args.key {
        config.key = Some(key.clone());
    }
    if let Some(key) = &config.key {
        config.key = Some(load_key(key)?);
    }

    if args.verbose {
        config.verbose = true;
    }
    if args.debug {
        config.debug = true;
    }
    if args.quiet {
        config.quiet = true;
    }
    if args.silent {
        config.silent = true;
    }
    // Always take log_format from CLI (it has a default value)
    config.log_format = args.log_format.clone();
    if let Some(log_file) = &args.log_file {
        config.log_file = Some(log_file.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GlobalConfig::from_args(&ConfigArgs::default()).unwrap();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 8402);
        assert_eq!(config.max_spend(), 2.0);
        assert_eq!(config.api_url(), "https://x402.asrai.me");
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
        assert_eq!(config.session_idle(), Some(Duration::from_secs(3600)));
        assert!(config.default_key().is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let args = ConfigArgs {
            config: Some(r#"{"port": 9000, "max_spend": 5.0, "host": "127.0.0.1"}"#.to_string()),
            port: Some(9100),
            ..Default::default()
        };
        let config = GlobalConfig::from_args(&args).unwrap();
        assert_eq!(config.port(), 9100);
        assert_eq!(config.max_spend(), 5.0);
        assert_eq!(config.host(), "127.0.0.1");
    }

    #[test]
    fn test_rejects_non_positive_ceiling() {
        for bad in [0.0, -1.0, f64::NAN] {
            let args = ConfigArgs {
                max_spend: Some(bad),
                ..Default::default()
            };
            assert!(GlobalConfig::from_args(&args).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_rejects_bad_api_url() {
        let args = ConfigArgs {
            api_url: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(GlobalConfig::from_args(&args).is_err());
    }

    #[test]
    fn test_idle_zero_disables() {
        let args = ConfigArgs {
            session_idle: Some(0),
            ..Default::default()
        };
        assert!(GlobalConfig::from_args(&args).unwrap().session_idle().is_none());
    }

    #[test]
    fn test_key_from_file() {
        let path = std::env::temp_dir().join(format!("asrai-key-{}", std::process::id()));
        std::fs::write(&path, "  0xabc\n").unwrap();
        let args = ConfigArgs {
            key: Some(format!("@{}", path.display())),
            ..Default::default()
        };
        let config = GlobalConfig::from_args(&args).unwrap();
        assert_eq!(config.default_key(), Some("0xabc"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_key_not_serialized() {
        let config = GlobalConfig {
            key: Some("0xsecret".to_string()),
            ..Default::default()
        };
        assert!(!serde_json::to_string(&config).unwrap().contains("secret"));
    }
}
