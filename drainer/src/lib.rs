pub mod drain;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod outcome;
pub mod restore;
mod retry;
pub mod server;
mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::gate::{dispatch_for, Dispatch, GateState, PassReport, ReconciliationGate};
pub use crate::metrics::DrainerMetrics;
pub use crate::server::ServerSettings;
