//! Application configuration for buildwatch.
//!
//! User config lives at `~/.buildwatch/buildwatch.toml`.
//! CLI flags override config file values, which override defaults.
//! The SMTP password is never stored in the file; the config names the
//! environment variable that holds it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BuildwatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "buildwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".buildwatch";

// ---------------------------------------------------------------------------
// Config structs (matching buildwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// `[project]` section: what to watch.
    #[serde(default)]
    pub project: ProjectConfig,

    /// `[service]` section: endpoints, limits, timeouts.
    #[serde(default)]
    pub service: ServiceConfig,

    /// `[window]` section: keyword trimming of the fetched log.
    #[serde(default)]
    pub window: WindowConfig,

    /// `[output]` section: persisted report location and format.
    #[serde(default)]
    pub output: OutputConfig,

    /// `[email]` section: notification addressing and SMTP relay.
    #[serde(default)]
    pub email: EmailConfig,
}

/// `[project]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// CI project name whose latest build is inspected.
    #[serde(default)]
    pub name: String,

    /// Service region used to derive default endpoints.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".into()
}

/// `[service]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// CI-build service endpoint. Empty means derive from the region.
    #[serde(default)]
    pub ci_endpoint: String,

    /// Log service endpoint. Empty means derive from the region.
    #[serde(default)]
    pub logs_endpoint: String,

    /// Upper bound on log events fetched in the single bounded request.
    #[serde(default = "default_log_limit")]
    pub log_limit: u32,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for the network-facing stages (log fetch,
    /// email send).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ci_endpoint: String::new(),
            logs_endpoint: String::new(),
            log_limit: default_log_limit(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_log_limit() -> u32 {
    10_000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

/// How to slice the fetched log around the first keyword occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowPolicy {
    /// `[k - before, k + after)`, clipped to sequence bounds.
    BeforeAfter,
    /// `[k - before, k]` inclusive of the keyword line, clipped at the start.
    BeforeOnly,
}

/// `[window]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Keyword marking the failure line. Empty disables trimming: the first
    /// `log_limit` events are returned verbatim.
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Lines kept before the keyword line.
    #[serde(default = "default_lines_around")]
    pub lines_before: u32,

    /// Lines kept after the keyword line (`before-after` policy only).
    #[serde(default = "default_lines_around")]
    pub lines_after: u32,

    /// Windowing policy.
    #[serde(default = "default_policy")]
    pub policy: WindowPolicy,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            lines_before: default_lines_around(),
            lines_after: default_lines_around(),
            policy: default_policy(),
        }
    }
}

fn default_keyword() -> String {
    "Reason: exit status 1".into()
}
fn default_lines_around() -> u32 {
    100
}
fn default_policy() -> WindowPolicy {
    WindowPolicy::BeforeAfter
}

/// On-disk format of the persisted log window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    /// Each line verbatim, newline-terminated.
    Plain,
    /// Minimal rich-text document with the failure marker highlighted.
    Rtf,
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output file path, truncated and rewritten each run.
    #[serde(default = "default_output_path")]
    pub path: String,

    /// Report format.
    #[serde(default = "default_format")]
    pub format: ReportFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: default_format(),
        }
    }
}

fn default_output_path() -> String {
    "build_logs.rtf".into()
}
fn default_format() -> ReportFormat {
    ReportFormat::Rtf
}

/// What the email body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyMode {
    /// Body is the raw joined log text; no attachment.
    Inline,
    /// Fixed body naming the project; the persisted report is attached.
    Attach,
}

/// `[email]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Sender address.
    #[serde(default)]
    pub sender: String,

    /// Recipient address.
    #[serde(default)]
    pub recipient: String,

    /// SMTP relay hostname.
    #[serde(default)]
    pub smtp_host: String,

    /// SMTP submission port (STARTTLS upgrade).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP auth username.
    #[serde(default)]
    pub smtp_username: String,

    /// Name of the env var holding the SMTP password (never store the
    /// password itself).
    #[serde(default = "default_smtp_password_env")]
    pub smtp_password_env: String,

    /// Body mode.
    #[serde(default = "default_body_mode")]
    pub body: BodyMode,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            recipient: String::new(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password_env: default_smtp_password_env(),
            body: default_body_mode(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_password_env() -> String {
    "BUILDWATCH_SMTP_PASSWORD".into()
}
fn default_body_mode() -> BodyMode {
    BodyMode::Attach
}

// ---------------------------------------------------------------------------
// Derived accessors
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Resolved CI-build service endpoint (explicit value or region default).
    pub fn ci_endpoint(&self) -> String {
        if self.service.ci_endpoint.is_empty() {
            format!("https://codebuild.{}.amazonaws.com", self.project.region)
        } else {
            self.service.ci_endpoint.clone()
        }
    }

    /// Resolved log service endpoint (explicit value or region default).
    pub fn logs_endpoint(&self) -> String {
        if self.service.logs_endpoint.is_empty() {
            format!("https://logs.{}.amazonaws.com", self.project.region)
        } else {
            self.service.logs_endpoint.clone()
        }
    }

    /// Read the SMTP password from the configured environment variable.
    pub fn smtp_password(&self) -> Result<String> {
        let var_name = &self.email.smtp_password_env;
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(BuildwatchError::config(format!(
                "SMTP password not found. Set the {var_name} environment variable."
            ))),
        }
    }

    /// Validate the fields every run needs before any service is called.
    pub fn validate_for_run(&self) -> Result<()> {
        if self.project.name.is_empty() {
            return Err(BuildwatchError::config(
                "project.name is not set; configure it or pass --project",
            ));
        }
        if self.service.log_limit == 0 {
            return Err(BuildwatchError::config("service.log_limit must be > 0"));
        }
        Ok(())
    }

    /// Validate the fields the notifier needs. Skipped for dry runs.
    pub fn validate_for_send(&self) -> Result<()> {
        for (field, value) in [
            ("email.sender", &self.email.sender),
            ("email.recipient", &self.email.recipient),
            ("email.smtp_host", &self.email.smtp_host),
            ("email.smtp_username", &self.email.smtp_username),
        ] {
            if value.is_empty() {
                return Err(BuildwatchError::config(format!("{field} is not set")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.buildwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BuildwatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.buildwatch/buildwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BuildwatchError::config(format!("cannot read {}: {e}", path.display())))?;

    toml::from_str(&content).map_err(|e| {
        BuildwatchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| BuildwatchError::config(format!("cannot create {}: {e}", dir.display())))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BuildwatchError::config(e.to_string()))?;

    std::fs::write(&path, content)
        .map_err(|e| BuildwatchError::config(format!("cannot write {}: {e}", path.display())))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
