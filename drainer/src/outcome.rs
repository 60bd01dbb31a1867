use serde::Serialize;

/// What a drain or restore pass did to a single Node.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct NodeOutcome {
    pub node_name: String,
    pub action: NodeAction,
}

impl NodeOutcome {
    pub fn new<S: Into<String>>(node_name: S, action: NodeAction) -> Self {
        NodeOutcome {
            node_name: node_name.into(),
            action,
        }
    }
}

/// Eviction counts for one node's Pods.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evictions {
    pub evicted: usize,
    pub failed_evictions: usize,
    pub skipped_pods: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum NodeAction {
    /// Control plane nodes are never touched.
    SkippedControlPlane,
    /// The node was already cordoned by the drainer. Nothing was submitted, not even for its remaining Pods.
    AlreadyDrained,
    /// The node was cordoned and marked. Eviction failures are reported but do not fail the node.
    Cordoned(Evictions),
    /// The node was not cordoned by the drainer, so it is not restored.
    NotOwned,
    Uncordoned,
    /// The node could not be updated.
    Failed { reason: String },
}

impl NodeAction {
    /// A short name for the action, used as a metric label.
    pub fn label(&self) -> &'static str {
        match self {
            NodeAction::SkippedControlPlane => "skipped_control_plane",
            NodeAction::AlreadyDrained => "already_drained",
            NodeAction::Cordoned(_) => "cordoned",
            NodeAction::NotOwned => "not_owned",
            NodeAction::Uncordoned => "uncordoned",
            NodeAction::Failed { .. } => "failed",
        }
    }
}
