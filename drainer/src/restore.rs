//! Returns the nodes the drainer cordoned to service once power is back.
use crate::outcome::{NodeAction, NodeOutcome};
use crate::retry::{self, NodeUpdate};

use models::node::{
    is_control_plane, is_owned_drained, uncordoned, ClusterClient, ClusterError, OwnershipMarker,
};

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{event, instrument, Level};

/// Uncordons nodes carrying the ownership marker. Nodes cordoned by anyone else are never touched.
#[derive(Clone)]
pub struct RestoreExecutor<T: ClusterClient> {
    cluster_client: T,
    marker: OwnershipMarker,
}

impl<T: ClusterClient> RestoreExecutor<T> {
    pub fn new(cluster_client: T, marker: OwnershipMarker) -> Self {
        RestoreExecutor {
            cluster_client,
            marker,
        }
    }

    /// Uncordons every worker node drained by the drainer and removes its marker.
    ///
    /// Pods evicted by the drain are not recreated here; their controllers reschedule them once the nodes accept
    /// Pods again.
    #[instrument(skip(self), err)]
    pub async fn restore_all_owned(&self) -> Result<Vec<NodeOutcome>, ClusterError> {
        let nodes = self.cluster_client.list_nodes().await?;

        let mut outcomes = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            outcomes.push(self.restore_node(node).await);
        }
        Ok(outcomes)
    }

    /// Names of the worker nodes currently drained by the drainer.
    #[instrument(skip(self), err)]
    pub async fn owned_drained_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let nodes = self.cluster_client.list_nodes().await?;
        Ok(nodes
            .iter()
            .filter(|node| !is_control_plane(node) && is_owned_drained(node, &self.marker))
            .map(|node| node.name_any())
            .collect())
    }

    #[instrument(skip(self, node), fields(node_name = %node.name_any()))]
    async fn restore_node(&self, node: &Node) -> NodeOutcome {
        let node_name = node.name_any();

        if let Some(action) = self.skip_reason(node) {
            return NodeOutcome::new(node_name, action);
        }

        event!(Level::INFO, "Uncordoning node.");
        let marker = &self.marker;
        let update = retry::update_node(&self.cluster_client, node, |current| {
            if is_control_plane(current) || !is_owned_drained(current, marker) {
                None
            } else {
                Some(uncordoned(current, marker))
            }
        })
        .await;

        let action = match update {
            Ok(NodeUpdate::Applied) => {
                event!(Level::INFO, "Uncordoned node.");
                NodeAction::Uncordoned
            }
            Ok(NodeUpdate::Unnecessary(current)) => {
                self.skip_reason(&current).unwrap_or(NodeAction::NotOwned)
            }
            Err(e) => {
                event!(Level::ERROR, error = %e, "Failed to uncordon node.");
                NodeAction::Failed {
                    reason: e.to_string(),
                }
            }
        };
        NodeOutcome::new(node_name, action)
    }

    fn skip_reason(&self, node: &Node) -> Option<NodeAction> {
        if is_control_plane(node) {
            event!(Level::INFO, node_name = %node.name_any(), "Skipping control plane node.");
            Some(NodeAction::SkippedControlPlane)
        } else if !is_owned_drained(node, &self.marker) {
            event!(Level::DEBUG, node_name = %node.name_any(), "Node was not drained by the drainer.");
            Some(NodeAction::NotOwned)
        } else {
            None
        }
    }
}
