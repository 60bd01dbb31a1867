use crate::outcome::{NodeAction, NodeOutcome};

use models::status::PowerStatus;

use prometheus::{proto::MetricFamily, IntCounterVec, Opts, Registry};

const POWER_STATE_LABEL: &str = "state";
const ACTION_LABEL: &str = "action";
const RESULT_LABEL: &str = "result";

/// Counters describing what the drainer has observed and done. Vended at the metrics route.
#[derive(Clone)]
pub struct DrainerMetrics {
    registry: Registry,
    status_events: IntCounterVec,
    node_actions: IntCounterVec,
    evictions: IntCounterVec,
}

impl DrainerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Power status events received, by reported power state
        let status_events = IntCounterVec::new(
            Opts::new(
                "ups_drainer_status_events_total",
                "Power status events received from the UPS",
            ),
            &[POWER_STATE_LABEL],
        )?;

        // Per-node results of drain and restore passes
        let node_actions = IntCounterVec::new(
            Opts::new(
                "ups_drainer_node_actions_total",
                "Actions taken on nodes by drain and restore passes",
            ),
            &[ACTION_LABEL],
        )?;

        let evictions = IntCounterVec::new(
            Opts::new("ups_drainer_evictions_total", "Pod evictions requested"),
            &[RESULT_LABEL],
        )?;

        registry.register(Box::new(status_events.clone()))?;
        registry.register(Box::new(node_actions.clone()))?;
        registry.register(Box::new(evictions.clone()))?;

        Ok(DrainerMetrics {
            registry,
            status_events,
            node_actions,
            evictions,
        })
    }

    pub fn record_status(&self, status: &PowerStatus) {
        self.status_events
            .with_label_values(&[&status.power_state().to_string()])
            .inc();
    }

    pub fn record_outcomes(&self, outcomes: &[NodeOutcome]) {
        for outcome in outcomes {
            self.node_actions
                .with_label_values(&[outcome.action.label()])
                .inc();

            if let NodeAction::Cordoned(evictions) = &outcome.action {
                self.evictions
                    .with_label_values(&["evicted"])
                    .inc_by(evictions.evicted as u64);
                self.evictions
                    .with_label_values(&["failed"])
                    .inc_by(evictions.failed_evictions as u64);
            }
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}
