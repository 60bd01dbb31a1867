//! The reconciliation gate turns power status events into drain and restore passes.
//!
//! The gate accepts concurrent calls and serializes them internally: at most one pass runs at a time, and a status
//! arriving while a pass is in progress waits for it to finish rather than being dropped. Drain and restore passes
//! therefore never interleave their node updates.
use crate::drain::DrainExecutor;
use crate::metrics::DrainerMetrics;
use crate::outcome::NodeOutcome;
use crate::restore::RestoreExecutor;

use models::config::DrainConfig;
use models::node::{ClusterClient, ClusterError, OwnershipMarker};
use models::status::{PowerState, PowerStatus};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{event, instrument, Level};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum GateState {
    #[default]
    Idle,
    Handling,
}

/// The cluster action a power status calls for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Dispatch {
    Drain,
    Restore,
    Ignore,
}

/// Decides what to do about a power status.
///
/// Workers are drained only once the UPS is on battery *and* its charge has dropped strictly below the threshold.
/// Any `ONLINE` status restores them. Every other status, including `ONBATT` with charge to spare, is ignored.
pub fn dispatch_for(status: &PowerStatus, battery_drain_threshold: u8) -> Dispatch {
    match status.power_state() {
        PowerState::OnBattery if status.battery_level < i32::from(battery_drain_threshold) => {
            Dispatch::Drain
        }
        PowerState::Online => Dispatch::Restore,
        _ => Dispatch::Ignore,
    }
}

/// What the gate last saw, for inspection.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub state: GateState,
    pub last_status: Option<PowerStatus>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// The result of handling a single power status.
#[derive(Clone, Debug, Serialize)]
pub struct PassReport {
    pub dispatch: Dispatch,
    pub outcomes: Vec<NodeOutcome>,
    /// Set if the pass could not run at all, e.g. because the nodes could not be listed.
    pub error: Option<String>,
}

/// Owns everything needed to act on power statuses. A single gate is shared by every ingress request.
pub struct ReconciliationGate<T: ClusterClient> {
    config: DrainConfig,
    drain_executor: DrainExecutor<T>,
    restore_executor: RestoreExecutor<T>,
    metrics: DrainerMetrics,
    // Held for the whole of a pass.
    pass_lock: Mutex<()>,
    // Only written while `pass_lock` is held.
    observation: RwLock<Observation>,
}

impl<T: ClusterClient> ReconciliationGate<T> {
    pub fn new(cluster_client: T, config: DrainConfig, metrics: DrainerMetrics) -> Self {
        let marker = OwnershipMarker::default();
        ReconciliationGate {
            config,
            drain_executor: DrainExecutor::new(cluster_client.clone(), marker.clone()),
            restore_executor: RestoreExecutor::new(cluster_client, marker),
            metrics,
            pass_lock: Mutex::new(()),
            observation: RwLock::new(Observation::default()),
        }
    }

    pub fn config(&self) -> &DrainConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DrainerMetrics {
        &self.metrics
    }

    /// Handles a power status, waiting for any pass already in progress.
    ///
    /// Failures never escape the gate. Per-node failures are reported in the outcomes, and a pass that could not
    /// run at all is reported in [`PassReport::error`].
    #[instrument(
        skip(self, status),
        fields(power_state = %status.state, battery_level = status.battery_level)
    )]
    pub async fn handle_status(&self, status: PowerStatus) -> PassReport {
        let _pass = self.pass_lock.lock().await;

        let dispatch = dispatch_for(&status, self.config.battery_drain_threshold);
        event!(Level::INFO, ?dispatch, "Handling power status.");
        self.metrics.record_status(&status);
        {
            let mut observation = self.observation.write().await;
            observation.state = GateState::Handling;
            observation.last_status = Some(status);
            observation.observed_at = Some(Utc::now());
        }

        let result = match dispatch {
            Dispatch::Drain => self.drain_executor.drain_all_workers().await,
            Dispatch::Restore => self.restore_executor.restore_all_owned().await,
            Dispatch::Ignore => Ok(Vec::new()),
        };

        let report = match result {
            Ok(outcomes) => {
                self.metrics.record_outcomes(&outcomes);
                PassReport {
                    dispatch,
                    outcomes,
                    error: None,
                }
            }
            Err(e) => {
                event!(Level::ERROR, error = %e, ?dispatch, "Pass failed. Waiting for the next power status.");
                PassReport {
                    dispatch,
                    outcomes: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };

        self.observation.write().await.state = GateState::Idle;
        report
    }

    /// The most recent status the gate started handling, if any.
    pub async fn last_observed(&self) -> Option<PowerStatus> {
        self.observation.read().await.last_status.clone()
    }

    pub async fn observation(&self) -> Observation {
        self.observation.read().await.clone()
    }

    pub async fn state(&self) -> GateState {
        self.observation.read().await.state
    }

    /// Names of the worker nodes the drainer currently holds cordoned.
    pub async fn drained_nodes(&self) -> Result<Vec<String>, ClusterError> {
        self.restore_executor.owned_drained_nodes().await
    }
}
