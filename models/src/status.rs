//! Power events reported by the UPS publisher.
use crate::constants::{POWER_STATE_ONLINE, POWER_STATE_ON_BATTERY};

use serde::{Deserialize, Serialize};
use validator::Validate;

use std::fmt;

/// A single status report from the UPS.
///
/// The wire format uses the field names emitted by the publisher (`battery_level`, `load`, `status`).
/// `status` is an open string: only `ONBATT` and `ONLINE` carry meaning for the drainer, see [`PowerState`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Validate)]
pub struct PowerStatus {
    #[serde(default)]
    pub timestamp: String,
    /// Remaining battery charge, in percent.
    #[validate(range(min = 0, max = 100))]
    pub battery_level: i32,
    #[serde(default)]
    pub input_voltage: i32,
    /// Load on the UPS, in percent of its capacity.
    #[serde(rename = "load", default)]
    #[validate(range(min = 0, max = 100))]
    pub load_percent: i32,
    #[serde(rename = "status")]
    pub state: String,
}

impl PowerStatus {
    pub fn new<S: Into<String>>(state: S, battery_level: i32) -> Self {
        PowerStatus {
            state: state.into(),
            battery_level,
            ..Default::default()
        }
    }

    pub fn power_state(&self) -> PowerState {
        PowerState::from(self.state.as_str())
    }
}

/// Classification of the open `status` string of a [`PowerStatus`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    /// Mains power is lost and the UPS is running from its battery.
    OnBattery,
    /// Mains power is present.
    Online,
    /// Any other state the UPS may report (e.g. `LOWBATT`, `CAL`). These never trigger cluster actions.
    Other(String),
}

impl From<&str> for PowerState {
    fn from(state: &str) -> Self {
        match state {
            POWER_STATE_ON_BATTERY => PowerState::OnBattery,
            POWER_STATE_ONLINE => PowerState::Online,
            other => PowerState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::OnBattery => write!(f, "{}", POWER_STATE_ON_BATTERY),
            PowerState::Online => write!(f, "{}", POWER_STATE_ONLINE),
            PowerState::Other(state) => write!(f, "{}", state),
        }
    }
}
