//! Classification of cluster nodes, and construction of the node records the drainer submits.
//!
//! The drainer distinguishes nodes along two axes:
//! * control plane nodes, which are never cordoned, annotated or uncordoned;
//! * nodes drained by the drainer itself, recognized solely by the ownership marker annotation. A node which is
//!   unschedulable without the marker was cordoned by someone else and is left alone.
//!
//! Records read from the cluster are never modified in place. [`cordoned`] and [`uncordoned`] build the record to
//! submit as a new value.
mod client;
pub mod drain;
pub mod error;

pub use self::client::*;
pub use self::error::Error as ClusterError;

use crate::constants::{CONTROL_PLANE_ROLE_KEYS, OWNERSHIP_ANNOTATION_KEY, OWNERSHIP_ANNOTATION_VALUE};

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use serde::Serialize;

#[cfg(feature = "mockall")]
pub use self::client::MockClusterClient;

/// The annotation recording that a node was cordoned by the drainer.
///
/// This marker is the only state the drainer keeps. It lives on the Node objects themselves so that it survives
/// restarts of the drainer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct OwnershipMarker {
    pub key: String,
    pub value: String,
}

impl Default for OwnershipMarker {
    fn default() -> Self {
        OwnershipMarker {
            key: OWNERSHIP_ANNOTATION_KEY.to_string(),
            value: OWNERSHIP_ANNOTATION_VALUE.to_string(),
        }
    }
}

impl OwnershipMarker {
    /// Whether the node carries this marker with the expected value.
    pub fn is_present_on(&self, node: &Node) -> bool {
        node.annotations().get(&self.key) == Some(&self.value)
    }
}

/// Returns true if the node carries a control plane role, either as a label or as a taint.
pub fn is_control_plane(node: &Node) -> bool {
    let labelled = node
        .labels()
        .keys()
        .any(|key| CONTROL_PLANE_ROLE_KEYS.contains(&key.as_str()));

    let tainted = node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .map_or(false, |taints| {
            taints
                .iter()
                .any(|taint| CONTROL_PLANE_ROLE_KEYS.contains(&taint.key.as_str()))
        });

    labelled || tainted
}

pub fn is_unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.unschedulable)
        .unwrap_or(false)
}

/// Returns true if the node is cordoned and was cordoned by the drainer.
pub fn is_owned_drained(node: &Node, marker: &OwnershipMarker) -> bool {
    is_unschedulable(node) && marker.is_present_on(node)
}

/// Builds a copy of `node` which is unschedulable and carries the ownership marker.
pub fn cordoned(node: &Node, marker: &OwnershipMarker) -> Node {
    let mut updated = node.clone();
    updated.spec.get_or_insert_with(Default::default).unschedulable = Some(true);
    updated
        .annotations_mut()
        .insert(marker.key.clone(), marker.value.clone());
    updated
}

/// Builds a copy of `node` which is schedulable and no longer carries the ownership marker.
pub fn uncordoned(node: &Node, marker: &OwnershipMarker) -> Node {
    let mut updated = node.clone();
    updated.spec.get_or_insert_with(Default::default).unschedulable = Some(false);
    updated.annotations_mut().remove(&marker.key);
    updated
}
