// Logging setup
//
// The engine only emits `tracing` events. Binaries embedding it call
// `init_tracing` once at startup to get console output.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "stepflow_engine=info";

/// Errors from subscriber installation
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// A global subscriber is already installed
    #[error("failed to install tracing subscriber: {0}")]
    AlreadyInstalled(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Console logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives (e.g. "info", "stepflow_engine=debug")
    pub log_filter: Option<String>,
    /// Fallback when `log_filter` is unset
    pub default_filter: String,
    /// Print event targets
    pub with_target: bool,
    /// Colored output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            default_filter: DEFAULT_LOG_FILTER.to_string(),
            with_target: true,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `NO_COLOR`: Disable colored output when set
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok())
                .filter(|f| !f.trim().is_empty()),
            ansi: std::env::var_os("NO_COLOR").is_none(),
            ..Self::default()
        }
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Directives that will be handed to the filter
    pub fn effective_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(&self.default_filter)
    }

    fn build_filter(&self) -> Result<EnvFilter, TelemetryError> {
        let directives = self.effective_filter();
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter {
            filter: directives.to_string(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global console subscriber
///
/// Calling this a second time returns [`TelemetryError::AlreadyInstalled`].
///
/// # Example
///
/// ```no_run
/// use stepflow_engine::telemetry::{init_tracing, LogConfig};
///
/// init_tracing(&LogConfig::from_env()).ok();
/// ```
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = config.build_filter()?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInstalled(e.to_string()))?;

    tracing::debug!(filter = config.effective_filter(), "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let config = LogConfig::default();
        assert_eq!(config.effective_filter(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = LogConfig::default().with_log_filter("stepflow_engine=trace");
        assert_eq!(config.effective_filter(), "stepflow_engine=trace");
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        let config = LogConfig::default().with_log_filter("stepflow_engine=notalevel");
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_second_install_fails() {
        let config = LogConfig::default().with_ansi(false);
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInstalled(_))
        ));
    }
}
