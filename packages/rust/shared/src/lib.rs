//! Shared types, error model, and configuration for buildwatch.
//!
//! This crate is the foundation depended on by all other buildwatch crates.
//! It provides:
//! - [`BuildwatchError`] — the unified error type
//! - Domain types ([`BuildId`], [`BuildDetail`], [`LogEvent`], [`Notification`])
//! - Configuration ([`AppConfig`], config loading, secret resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BodyMode, EmailConfig, OutputConfig, ProjectConfig, ReportFormat, ServiceConfig,
    WindowConfig, WindowPolicy, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{BuildwatchError, Result};
pub use types::{AttachmentSpec, BuildDetail, BuildId, BuildStatus, LogEvent, LogLocation, Notification};
