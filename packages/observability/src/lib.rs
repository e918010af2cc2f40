//! # Observability
//!
//! Logging bootstrap for Heapchat binaries.
//!
//! Library crates only emit `tracing` events and never install a
//! subscriber. A binary calls [`init_with_config`] once at startup:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "heapchat-sim".into(),
//!     default_level: "debug".into(),
//!     jsonl: true,
//!     ..Default::default()
//! });
//! ```
//!
//! Output:
//! - stderr: compact human-readable lines (on by default)
//! - JSONL file: one object per event, see [`json_layer`], written to
//!   `log_path` or `~/.heapchat/logs/<service>.jsonl`
//!
//! `RUST_LOG` overrides `default_level` for every output.

pub mod json_layer;
mod sink;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogLine};
pub use sink::{default_log_path, FileSink};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "heapchat_outbox=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Emit compact lines to stderr.
    pub also_stderr: bool,

    /// Emit JSONL to a file.
    pub jsonl: bool,

    /// JSONL file location; defaults to [`default_log_path`].
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            also_stderr: true,
            jsonl: false,
            log_path: None,
        }
    }
}

impl LogConfig {
    /// Where JSONL output goes, if enabled and resolvable.
    pub fn resolved_log_path(&self) -> Option<PathBuf> {
        if !self.jsonl {
            return None;
        }
        self.log_path
            .clone()
            .or_else(|| default_log_path(&self.service_name))
    }
}

/// Initialize logging with default settings for `service_name`.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Install the global subscriber.
///
/// Safe to call more than once; only the first call installs anything. If
/// the JSONL file cannot be opened, logging continues on stderr and a
/// warning is emitted.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.resolved_log_path();
    let (file_sink, open_error) = match log_path.as_deref().map(FileSink::open) {
        Some(Ok(sink)) => (Some(sink), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let json_layer = file_sink.map(|sink| {
        JsonLayer::new(config.service_name.clone(), sink).with_filter(env_filter(&config))
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (log_path, open_error) {
        (Some(path), Some(e)) => tracing::warn!(
            log_path = %path.display(),
            error = %e,
            "Could not open log file, continuing without JSONL output"
        ),
        (Some(path), None) => tracing::info!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        _ => tracing::debug!(service = %config.service_name, "observability initialized"),
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
}

pub use tracing::{debug, error, info, trace, warn};
