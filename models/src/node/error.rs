use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by the cluster while listing, updating or evicting.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Unable to list Nodes: '{}'", source))]
    ListNodes { source: kube::Error },

    #[snafu(display("Unable to read Node '{}': '{}'", node_name, source))]
    GetNode {
        source: kube::Error,
        node_name: String,
    },

    /// The Node was modified between our read and our write. The write was rejected.
    #[snafu(display(
        "Node '{}' was modified concurrently; the update was rejected as stale",
        node_name
    ))]
    UpdateNodeConflict { node_name: String },

    #[snafu(display("Unable to update Node '{}': '{}'", node_name, source))]
    UpdateNode {
        source: kube::Error,
        node_name: String,
    },

    #[snafu(display("Unable to list Pods on Node '{}': '{}'", node_name, source))]
    ListPods {
        source: kube::Error,
        node_name: String,
    },

    /// The eviction was refused to protect workload availability, typically by a PodDisruptionBudget.
    #[snafu(display(
        "Eviction of Pod '{}/{}' was rejected: '{}'",
        namespace,
        pod_name,
        source
    ))]
    EvictionRejected {
        source: kube::Error,
        namespace: String,
        pod_name: String,
    },

    #[snafu(display(
        "Unable to create eviction for Pod '{}/{}': '{}'",
        namespace,
        pod_name,
        source
    ))]
    EvictPod {
        source: kube::Error,
        namespace: String,
        pod_name: String,
    },
}

impl Error {
    /// Whether a read-modify-write that failed with this error may be attempted again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::UpdateNodeConflict { .. })
    }

    pub fn is_rejected_eviction(&self) -> bool {
        matches!(self, Self::EvictionRejected { .. })
    }

    /// Whether the object the request targeted no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::GetNode { source, .. }
            | Self::UpdateNode { source, .. }
            | Self::EvictPod { source, .. } => {
                matches!(source, kube::Error::Api(response) if response.code == 404)
            }
            _ => false,
        }
    }
}
