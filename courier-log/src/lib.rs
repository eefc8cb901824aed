//! Courier logging bootstrap
//!
//! Installs a `tracing` subscriber configured from `COURIER_*` environment
//! variables. Library crates only emit `tracing` events; applications call
//! [`init`] once at startup.
//!
//! # Usage
//!
//! ```rust,ignore
//! fn main() {
//!     courier_log::init();
//!     tracing::info!(app = "storefront", "Starting");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `COURIER_DEBUG=1` - Enable debug logging
//! - `COURIER_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `COURIER_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `COURIER_LOG_COLOR=1|0` - Enable/disable colors
//! - `COURIER_LOG_MODULE=1|0` - Include the event target
//!
//! `RUST_LOG`, when set, takes precedence over `COURIER_LOG_LEVEL`.

use once_cell::sync::Lazy;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level written by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    Debug,
    Info,
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Global configuration (lazy initialized).
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub module_path: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            module_path: true,
        }
    }
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl LogConfig {
    /// Create config from `COURIER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let debug = lookup("COURIER_DEBUG").map(|v| flag(&v)).unwrap_or(false);

        let mut level = lookup("COURIER_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(Level::Info);
        if debug && level > Level::Debug {
            level = Level::Debug;
        }

        let format = lookup("COURIER_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = lookup("COURIER_LOG_COLOR")
            .map(|v| flag(&v))
            .unwrap_or_else(|| format != Format::Json && lookup("NO_COLOR").is_none());

        let module_path = lookup("COURIER_LOG_MODULE")
            .map(|v| flag(&v))
            .unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            module_path,
        }
    }

    /// Filter honouring `RUST_LOG` first, then the configured level.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    /// Build a subscriber without installing it.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
        tracing_subscriber::registry()
            .with(self.filter())
            .with(fmt_layer(self))
    }

    /// Install this configuration as the global subscriber.
    pub fn try_init(&self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.filter())
            .with(fmt_layer(self))
            .try_init()
    }
}

fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_ansi(config.color)
        .with_target(config.module_path);

    match config.format {
        Format::Pretty => layer.pretty().boxed(),
        Format::Compact => layer.compact().boxed(),
        #[cfg(feature = "json")]
        Format::Json => layer.json().boxed(),
        #[cfg(not(feature = "json"))]
        Format::Json => layer.compact().boxed(),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the global subscriber from the environment.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init() {
    let _ = try_init();
}

/// Install the global subscriber, failing if one is already set.
pub fn try_init() -> Result<(), TryInitError> {
    config().try_init()
}

// ============================================================================
// Tests
// ============================================================================
