//! Builders for cluster objects and an in-memory cluster used by unit tests.
use models::node::error::Result;
use models::node::{ClusterClient, ClusterError, OwnershipMarker};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeSpec, Pod, PodSpec, PodStatus};
use kube::api::ObjectMeta;
use kube::error::ErrorResponse;
use kube::ResourceExt;
use maplit::btreemap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub(crate) fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected failure {}", code),
        reason: "Injected".to_string(),
        code,
    })
}

pub(crate) fn conflict(node_name: &str) -> ClusterError {
    ClusterError::UpdateNodeConflict {
        node_name: node_name.to_string(),
    }
}

pub(crate) fn worker(name: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some("1".to_string()),
            labels: Some(btreemap! {
                "kubernetes.io/hostname".to_string() => name.to_string(),
            }),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        ..Default::default()
    }
}

pub(crate) fn control_plane(name: &str) -> Node {
    let mut node = worker(name);
    node.labels_mut().insert(
        "node-role.kubernetes.io/control-plane".to_string(),
        "".to_string(),
    );
    node
}

/// A node cordoned by someone other than the drainer.
pub(crate) fn cordoned_by_operator(name: &str) -> Node {
    let mut node = worker(name);
    node.spec.get_or_insert_with(Default::default).unschedulable = Some(true);
    node
}

pub(crate) fn owned_drained(name: &str) -> Node {
    models::node::cordoned(&worker(name), &OwnershipMarker::default())
}

pub(crate) fn pod_on(node_name: &str, namespace: &str, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node_name.to_string()),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            ..Default::default()
        }),
    }
}

/// A call made against the [`FakeCluster`], in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Call {
    ListNodes,
    GetNode(String),
    UpdateNode(String),
    ListPods(String),
    Evict(String),
}

#[derive(Default)]
struct FakeState {
    nodes: BTreeMap<String, Node>,
    pods: Vec<Pod>,
    calls: Vec<Call>,
    // Number of successful Node writes, per node.
    writes: HashMap<String, usize>,
    // Remaining conflicts to inject before a write to the node is accepted.
    pending_conflicts: HashMap<String, usize>,
    rejected_evictions: HashSet<String>,
    fail_list_nodes: bool,
    fail_list_pods: bool,
}

/// An in-memory cluster which enforces `resourceVersion` preconditions like the API server does.
#[derive(Clone, Default)]
pub(crate) struct FakeCluster {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCluster {
    pub(crate) fn with_nodes(nodes: Vec<Node>) -> Self {
        let cluster = FakeCluster::default();
        {
            let mut state = cluster.state.lock().unwrap();
            for node in nodes {
                state.nodes.insert(node.name_any(), node);
            }
        }
        cluster
    }

    pub(crate) fn add_pod(&self, pod: Pod) {
        self.state.lock().unwrap().pods.push(pod);
    }

    /// The next `count` writes to the node fail as if another writer got there first.
    pub(crate) fn inject_conflicts(&self, node_name: &str, count: usize) {
        self.state
            .lock()
            .unwrap()
            .pending_conflicts
            .insert(node_name.to_string(), count);
    }

    /// Evictions of the pod are refused as if by a disruption budget.
    pub(crate) fn reject_eviction(&self, pod_name: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_evictions
            .insert(pod_name.to_string());
    }

    /// Lifts a rejection set up by `reject_eviction`, as if the disruption budget now allowed it.
    pub(crate) fn allow_eviction(&self, pod_name: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_evictions
            .remove(pod_name);
    }

    pub(crate) fn fail_list_nodes(&self) {
        self.state.lock().unwrap().fail_list_nodes = true;
    }

    pub(crate) fn fail_list_pods(&self) {
        self.state.lock().unwrap().fail_list_pods = true;
    }

    pub(crate) fn node(&self, name: &str) -> Node {
        self.state.lock().unwrap().nodes[name].clone()
    }

    pub(crate) fn pods(&self) -> Vec<Pod> {
        self.state.lock().unwrap().pods.clone()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Successful node writes, across all nodes.
    pub(crate) fn total_writes(&self) -> usize {
        self.state.lock().unwrap().writes.values().sum()
    }

    pub(crate) fn writes_to(&self, node_name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .writes
            .get(node_name)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn evicted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Evict(pod) => Some(pod),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn next_version(node: &Node) -> String {
    let current: u64 = node
        .metadata
        .resource_version
        .as_deref()
        .and_then(|version| version.parse().ok())
        .unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.record(Call::ListNodes);
        // Give concurrently running passes a chance to interleave.
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        if state.fail_list_nodes {
            return Err(ClusterError::ListNodes {
                source: api_error(503),
            });
        }
        Ok(state.nodes.values().cloned().collect())
    }

    async fn get_node(&self, node_name: &str) -> Result<Node> {
        self.record(Call::GetNode(node_name.to_string()));
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(node_name)
            .cloned()
            .ok_or_else(|| ClusterError::GetNode {
                source: api_error(404),
                node_name: node_name.to_string(),
            })
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        let node_name = node.name_any();
        self.record(Call::UpdateNode(node_name.clone()));
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        let stored = state
            .nodes
            .get(&node_name)
            .cloned()
            .ok_or_else(|| ClusterError::UpdateNode {
                source: api_error(404),
                node_name: node_name.clone(),
            })?;

        let pending = state.pending_conflicts.get(&node_name).copied().unwrap_or(0);
        if pending > 0 {
            // Someone else wrote the node first: bump its version and reject our stale write.
            state.pending_conflicts.insert(node_name.clone(), pending - 1);
            let mut concurrently_written = stored;
            concurrently_written.metadata.resource_version = Some(next_version(&concurrently_written));
            state.nodes.insert(node_name.clone(), concurrently_written);
            return Err(conflict(&node_name));
        }

        if node.metadata.resource_version != stored.metadata.resource_version {
            return Err(conflict(&node_name));
        }

        let mut written = node.clone();
        written.metadata.resource_version = Some(next_version(&stored));
        state.nodes.insert(node_name.clone(), written.clone());
        *state.writes.entry(node_name).or_insert(0) += 1;
        Ok(written)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        self.record(Call::ListPods(node_name.to_string()));
        let state = self.state.lock().unwrap();
        if state.fail_list_pods {
            return Err(ClusterError::ListPods {
                source: api_error(500),
                node_name: node_name.to_string(),
            });
        }
        Ok(state
            .pods
            .iter()
            .filter(|pod| {
                pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref()) == Some(node_name)
            })
            .cloned()
            .collect())
    }

    async fn evict_pod(&self, namespace: &str, pod_name: &str) -> Result<()> {
        self.record(Call::Evict(format!("{}/{}", namespace, pod_name)));
        let mut state = self.state.lock().unwrap();
        if state.rejected_evictions.contains(pod_name) {
            return Err(ClusterError::EvictionRejected {
                source: api_error(429),
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            });
        }

        let before = state.pods.len();
        state
            .pods
            .retain(|pod| !(pod.namespace().as_deref() == Some(namespace) && pod.name_any() == pod_name));
        if state.pods.len() == before {
            return Err(ClusterError::EvictPod {
                source: api_error(404),
                namespace: namespace.to_string(),
                pod_name: pod_name.to_string(),
            });
        }
        Ok(())
    }
}
