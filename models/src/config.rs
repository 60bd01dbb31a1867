//! Startup configuration for the drainer.
//!
//! Configuration is read once from the environment. Any invalid value is fatal: the drainer refuses to
//! start rather than guessing at what the operator meant.
use serde::Serialize;
use snafu::{ensure, ResultExt};
use std::env;

const STATUS_TOPIC_ENV_VAR: &str = "STATUS_TOPIC";
const DELIVERY_QUALITY_ENV_VAR: &str = "DELIVERY_QUALITY";
const BATTERY_DRAIN_THRESHOLD_ENV_VAR: &str = "BATTERY_DRAIN_THRESHOLD";

const DEFAULT_STATUS_TOPIC: &str = "ups/status";
const DEFAULT_BATTERY_DRAIN_THRESHOLD: u8 = 50;

/// The module-wide result type.
type Result<T> = std::result::Result<T, error::Error>;

/// Delivery guarantee requested for status messages on the topic.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum DeliveryQuality {
    /// Fire and forget: the publisher is acknowledged before the status is handled.
    #[default]
    AtMostOnce,
    /// The publisher is acknowledged only once the status has been handled.
    AtLeastOnce,
    ExactlyOnce,
}

impl DeliveryQuality {
    /// Whether the publisher must wait for the status to be handled before it is acknowledged.
    pub fn acknowledges_after_handling(&self) -> bool {
        !matches!(self, DeliveryQuality::AtMostOnce)
    }
}

impl TryFrom<u8> for DeliveryQuality {
    type Error = error::Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(DeliveryQuality::AtMostOnce),
            1 => Ok(DeliveryQuality::AtLeastOnce),
            2 => Ok(DeliveryQuality::ExactlyOnce),
            _ => error::InvalidDeliveryQualitySnafu {
                value: level.to_string(),
            }
            .fail(),
        }
    }
}

/// Configuration for handling power events.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DrainConfig {
    pub topic: String,
    pub delivery_quality: DeliveryQuality,
    /// Worker nodes are drained when the UPS is on battery and its charge drops below this percentage.
    pub battery_drain_threshold: u8,
}

impl Default for DrainConfig {
    fn default() -> Self {
        DrainConfig {
            topic: DEFAULT_STATUS_TOPIC.to_string(),
            delivery_quality: DeliveryQuality::default(),
            battery_drain_threshold: DEFAULT_BATTERY_DRAIN_THRESHOLD,
        }
    }
}

impl DrainConfig {
    pub fn new<S: Into<String>>(
        topic: S,
        delivery_quality: DeliveryQuality,
        battery_drain_threshold: u8,
    ) -> Result<Self> {
        let config = DrainConfig {
            topic: topic.into(),
            delivery_quality,
            battery_drain_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup, falling back to defaults for unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DrainConfig::default();

        let topic = lookup(STATUS_TOPIC_ENV_VAR).unwrap_or(defaults.topic);

        let delivery_quality = match lookup(DELIVERY_QUALITY_ENV_VAR) {
            Some(value) => {
                let level: u8 = value
                    .trim()
                    .parse()
                    .map_err(|_| error::Error::InvalidDeliveryQuality {
                        value: value.clone(),
                    })?;
                DeliveryQuality::try_from(level)?
            }
            None => defaults.delivery_quality,
        };

        let battery_drain_threshold = match lookup(BATTERY_DRAIN_THRESHOLD_ENV_VAR) {
            Some(value) => value
                .trim()
                .parse::<u8>()
                .context(error::UnparsableThresholdSnafu { value })?,
            None => defaults.battery_drain_threshold,
        };

        Self::new(topic, delivery_quality, battery_drain_threshold)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.topic.trim().is_empty(), error::EmptyTopicSnafu);
        ensure!(
            (1..=100).contains(&self.battery_drain_threshold),
            error::ThresholdOutOfRangeSnafu {
                threshold: self.battery_drain_threshold
            }
        );
        Ok(())
    }
}

pub mod error {
    use super::*;
    use snafu::Snafu;
    use std::num::ParseIntError;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub))]
    pub enum Error {
        #[snafu(display("The status topic must not be empty (set '{}')", STATUS_TOPIC_ENV_VAR))]
        EmptyTopic,

        #[snafu(display(
            "Invalid delivery quality '{}' in '{}': expected 0, 1 or 2",
            value,
            DELIVERY_QUALITY_ENV_VAR
        ))]
        InvalidDeliveryQuality { value: String },

        #[snafu(display(
            "Could not parse '{}={}' as a percentage: '{}'",
            BATTERY_DRAIN_THRESHOLD_ENV_VAR,
            value,
            source
        ))]
        UnparsableThreshold {
            source: ParseIntError,
            value: String,
        },

        #[snafu(display(
            "Battery drain threshold must be between 1 and 100, got {}",
            threshold
        ))]
        ThresholdOutOfRange { threshold: u8 },
    }
}

pub use error::Error as ConfigurationError;
