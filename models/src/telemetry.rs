//! Tracing setup shared by the drainer binary and its tests.
use serde::Deserialize;
use snafu::ResultExt;
use std::env;
use tracing::Subscriber;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, EnvFilter, Registry};

const DEFAULT_TRACING_FILTER_DIRECTIVE: LevelFilter = LevelFilter::INFO;

const TRACING_FILTER_DIRECTIVE_ENV_VAR: &str = "TRACING_FILTER_DIRECTIVE";
const LOGGING_FORMATTER_ENV_VAR: &str = "LOGGING_FORMATTER";
const LOGGING_ANSI_ENABLED_ENV_VAR: &str = "LOGGING_ANSI_ENABLED";

/// How tracing events are written to stdout.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct LogFormatter {
    message_format: MessageFormat,
    ansi_enabled: bool,
}

impl LogFormatter {
    pub fn try_from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let message_format = match lookup(LOGGING_FORMATTER_ENV_VAR) {
            Some(formatter) => serde_plain::from_str(&formatter.to_lowercase())
                .context(error::LogFormatterEnvSnafu { env_value: formatter })?,
            None => MessageFormat::default(),
        };

        let ansi_enabled = match lookup(LOGGING_ANSI_ENABLED_ENV_VAR) {
            Some(ansi_enabled) => ansi_enabled
                .to_lowercase()
                .parse()
                .context(error::LogAnsiEnvSnafu {
                    env_value: ansi_enabled,
                })?,
            None => false,
        };

        Ok(Self {
            message_format,
            ansi_enabled,
        })
    }

    /// Adds a formatting layer to a tracing event subscriber.
    fn add_format_layer<S>(&self, event_subscriber: S) -> Box<dyn Subscriber + Send + Sync>
    where
        S: SubscriberExt + Send + Sync + 'static + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        // Each formatter is a distinct layer type, so the subscriber is boxed per arm.
        let layer = fmt::layer().with_ansi(self.ansi_enabled);
        match self.message_format {
            MessageFormat::Full => Box::new(event_subscriber.with(layer)),
            MessageFormat::Compact => Box::new(event_subscriber.with(layer.compact())),
            MessageFormat::Pretty => Box::new(event_subscriber.with(layer.pretty())),
            MessageFormat::Json => Box::new(event_subscriber.with(layer.json())),
        }
    }
}

/// The message format for logging tracing events.
///
/// See https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/format/index.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Human-readable, single-line logs for each event.
    Full,
    /// A variant of the default formatter optimized for short line lengths.
    Compact,
    #[default]
    /// Pretty-formatted multi-line logs optimized for human readability.
    Pretty,
    /// Newline-delimited JSON logs.
    Json,
}

/// Installs the global tracing subscriber.
///
/// `TRACING_FILTER_DIRECTIVE` selects the events to emit (INFO by default), `LOGGING_FORMATTER` and
/// `LOGGING_ANSI_ENABLED` select how they are written.
pub fn init_telemetry_from_env() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_TRACING_FILTER_DIRECTIVE.into())
        .with_env_var(TRACING_FILTER_DIRECTIVE_ENV_VAR)
        .from_env_lossy();

    let subscriber = Registry::default().with(env_filter);
    let subscriber = LogFormatter::try_from_env()?.add_format_layer(subscriber);

    tracing::subscriber::set_global_default(subscriber)
        .context(error::TracingConfigurationSnafu)?;

    Ok(())
}

pub mod error {
    use std::str::ParseBoolError;

    use super::*;
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum TelemetryConfigError {
        #[snafu(display("Error configuring tracing: '{}'", source))]
        TracingConfiguration {
            source: tracing::subscriber::SetGlobalDefaultError,
        },

        #[snafu(display(
            "Could not parse formatter from environment variable '{}={}': '{}'",
            LOGGING_FORMATTER_ENV_VAR,
            env_value,
            source
        ))]
        LogFormatterEnv {
            source: serde_plain::Error,
            env_value: String,
        },

        #[snafu(display(
            "Could not parse ANSI enablement from environment variable '{}={}': '{}'",
            LOGGING_ANSI_ENABLED_ENV_VAR,
            env_value,
            source
        ))]
        LogAnsiEnv {
            source: ParseBoolError,
            env_value: String,
        },
    }
}

type Result<T> = std::result::Result<T, TelemetryConfigError>;
pub use error::TelemetryConfigError;

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use std::collections::HashMap;

    fn formatter_from(vars: HashMap<&str, &str>) -> Result<LogFormatter> {
        LogFormatter::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn test_formatter_defaults() {
        let formatter = formatter_from(HashMap::new()).unwrap();
        assert_eq!(formatter, LogFormatter::default());
        assert_eq!(formatter.message_format, MessageFormat::Pretty);
        assert!(!formatter.ansi_enabled);
    }

    #[test]
    fn test_formatter_from_environment() {
        let formatter = formatter_from(hashmap! {
            "LOGGING_FORMATTER" => "JSON",
            "LOGGING_ANSI_ENABLED" => "True",
        })
        .unwrap();

        assert_eq!(formatter.message_format, MessageFormat::Json);
        assert!(formatter.ansi_enabled);
    }

    #[test]
    fn test_invalid_formatter_settings() {
        assert!(formatter_from(hashmap! { "LOGGING_FORMATTER" => "bunyan" }).is_err());
        assert!(formatter_from(hashmap! { "LOGGING_ANSI_ENABLED" => "sometimes" }).is_err());
    }
}
