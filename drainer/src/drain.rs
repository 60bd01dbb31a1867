//! Cordons every worker node and evicts its Pods, similar to running `kubectl drain` across the cluster.
use crate::outcome::{Evictions, NodeAction, NodeOutcome};
use crate::retry::{self, NodeUpdate};

use models::node::drain::{partition_target_pods, pod_namespace, pod_reference};
use models::node::{
    cordoned, is_control_plane, is_owned_drained, ClusterClient, ClusterError, OwnershipMarker,
};

use futures::{stream, StreamExt};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::ResourceExt;
use tracing::{event, instrument, Level};

// Maximum number of Pods to evict concurrently on a single node.
// We don't want to generate too many TPS to Kubernetes while the cluster is losing power.
const CONCURRENT_EVICTIONS: usize = 5;

/// Drains worker nodes, marking each node it cordons with the ownership marker.
#[derive(Clone)]
pub struct DrainExecutor<T: ClusterClient> {
    cluster_client: T,
    marker: OwnershipMarker,
}

impl<T: ClusterClient> DrainExecutor<T> {
    pub fn new(cluster_client: T, marker: OwnershipMarker) -> Self {
        DrainExecutor {
            cluster_client,
            marker,
        }
    }

    /// Drains every worker node in the cluster.
    ///
    /// Nodes are processed one at a time from a fresh listing. Control plane nodes and nodes already drained by us
    /// are skipped without any further API call. A failure on one node never prevents the remaining nodes from being
    /// drained; the only error returned is a failure to list the nodes at all.
    #[instrument(skip(self), err)]
    pub async fn drain_all_workers(&self) -> Result<Vec<NodeOutcome>, ClusterError> {
        let nodes = self.cluster_client.list_nodes().await?;

        let mut outcomes = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            outcomes.push(self.drain_node(node).await);
        }
        Ok(outcomes)
    }

    #[instrument(skip(self, node), fields(node_name = %node.name_any()))]
    async fn drain_node(&self, node: &Node) -> NodeOutcome {
        let node_name = node.name_any();

        if is_control_plane(node) {
            event!(Level::INFO, "Skipping control plane node.");
            return NodeOutcome::new(node_name, NodeAction::SkippedControlPlane);
        }

        if is_owned_drained(node, &self.marker) {
            event!(Level::INFO, "Node is already drained by the drainer.");
            return NodeOutcome::new(node_name, NodeAction::AlreadyDrained);
        }

        event!(Level::INFO, "Cordoning node.");
        let marker = &self.marker;
        let update = retry::update_node(&self.cluster_client, node, |current| {
            if is_control_plane(current) || is_owned_drained(current, marker) {
                None
            } else {
                Some(cordoned(current, marker))
            }
        })
        .await;

        let action = match update {
            Ok(NodeUpdate::Applied) => {
                event!(Level::INFO, "Cordoned node.");
                NodeAction::Cordoned(self.evict_pods(&node_name).await)
            }
            Ok(NodeUpdate::Unnecessary(current)) if is_control_plane(&current) => {
                event!(Level::INFO, "Node became a control plane node. Skipping.");
                NodeAction::SkippedControlPlane
            }
            Ok(NodeUpdate::Unnecessary(_)) => {
                event!(Level::INFO, "Node was drained concurrently by the drainer.");
                NodeAction::AlreadyDrained
            }
            Err(e) => {
                event!(Level::ERROR, error = %e, "Failed to cordon node.");
                NodeAction::Failed {
                    reason: e.to_string(),
                }
            }
        };
        NodeOutcome::new(node_name, action)
    }

    /// Evicts the eligible Pods from a node which has just been cordoned.
    ///
    /// Evictions are best-effort and never retried: later drain passes skip owned-drained nodes entirely, so a Pod
    /// whose eviction fails stays on the cordoned node until power is restored or an operator moves it.
    async fn evict_pods(&self, node_name: &str) -> Evictions {
        let pods = match self.cluster_client.list_pods_on_node(node_name).await {
            Ok(pods) => pods,
            Err(e) => {
                event!(Level::ERROR, error = %e, "Unable to list Pods on cordoned node. No Pods were evicted.");
                return Evictions::default();
            }
        };

        let (targets, skipped) = partition_target_pods(pods);

        let cluster_client = &self.cluster_client;
        let results: Vec<bool> = stream::iter(targets)
            .map(|pod| async move { evict_pod(cluster_client, &pod).await })
            .buffer_unordered(CONCURRENT_EVICTIONS)
            .collect()
            .await;

        let evicted = results.iter().filter(|evicted| **evicted).count();
        Evictions {
            evicted,
            failed_evictions: results.len() - evicted,
            skipped_pods: skipped.len(),
        }
    }
}

/// Creates an eviction for the Pod, logging rather than propagating any failure. Returns whether it succeeded.
async fn evict_pod<T: ClusterClient>(cluster_client: &T, pod: &Pod) -> bool {
    let pod_ref = pod_reference(pod);
    match cluster_client
        .evict_pod(&pod_namespace(pod), &pod.name_any())
        .await
    {
        Ok(()) => {
            event!(Level::INFO, pod = %pod_ref, "Evicted Pod.");
            true
        }
        Err(e) if e.is_rejected_eviction() => {
            event!(
                Level::WARN,
                pod = %pod_ref,
                error = %e,
                "Eviction rejected, likely by a PodDisruptionBudget. The Pod stays on the cordoned node."
            );
            false
        }
        Err(e) if e.is_not_found() => {
            event!(Level::INFO, pod = %pod_ref, "Pod was already gone.");
            false
        }
        Err(e) => {
            event!(Level::ERROR, pod = %pod_ref, error = %e, "Failed to evict Pod.");
            false
        }
    }
}
