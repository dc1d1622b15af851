//! Tracing subscriber setup for the command-line host
//!
//! The library only emits events and spans; installing a subscriber is left
//! to applications. This module is what the `purikura` binary uses.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable coloured output (default)
    Console,
    /// Plain output without colours, for CI logs
    Compact,
    /// One JSON object per event
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Tracing configuration builder
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Verbosity level: 0 warnings only, 1 info, 2 debug, 3+ trace
    pub verbosity: u8,
    pub format: TracingFormat,
    /// Explicit filter directives; overrides `verbosity`
    pub env_filter: Option<String>,
    /// Identifier attached to the session start event
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Filter directives for the configured verbosity
    ///
    /// Inference runtimes stay at `warn` until trace level; they are very
    /// chatty at debug.
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "purikura=info,warn",
            2 => "purikura=debug,ort=warn,tract_onnx=warn,info",
            _ => "trace",
        }
    }

    /// Install the global subscriber
    ///
    /// `RUST_LOG` takes precedence over verbosity when no explicit filter
    /// was configured.
    pub fn init(self) -> anyhow::Result<()> {
        let filter = match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)?,
            None => EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(self.verbosity_to_filter()))?,
        };
        let registry = Registry::default().with(filter);

        match self.format {
            TracingFormat::Console => {
                let layer = fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            TracingFormat::Compact => {
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact();
                registry.with(layer).try_init()?;
            },
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr);
                registry.with(layer).try_init()?;
            },
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Editing session started");
        }
        Ok(())
    }
}

/// Initialize tracing with CLI defaults and a fresh session id
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<String> {
    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(session_id.clone())
        .init()?;
    Ok(session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        let filter = |v| TracingConfig::new().with_verbosity(v).verbosity_to_filter();
        assert_eq!(filter(0), "warn");
        assert!(filter(1).starts_with("purikura=info"));
        assert!(filter(2).contains("purikura=debug"));
        assert_eq!(filter(3), "trace");
        assert_eq!(filter(9), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_env_filter("purikura=trace")
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.env_filter.as_deref(), Some("purikura=trace"));
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }

    #[test]
    fn test_directives_parse() {
        for verbosity in 0..4 {
            let config = TracingConfig::new().with_verbosity(verbosity);
            assert!(EnvFilter::try_new(config.verbosity_to_filter()).is_ok());
        }
    }
}
