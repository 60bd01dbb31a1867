//! Selection of the Pods which are evicted when a Node is drained.
//!
//! Draining in Kubernetes is done client side: the Node is cordoned, then an eviction is created for each Pod on
//! it. Evictions (rather than deletions) respect PodDisruptionBudgets. This module only decides *which* Pods to
//! evict; it never talks to the cluster.
use crate::constants::{DAEMONSET_KIND, POD_PHASE_FAILED, POD_PHASE_SUCCEEDED, SYSTEM_NAMESPACES};

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{event, Level};

/// Decides whether a Pod on a draining Node may be evicted.
///
/// A Pod is left in place when:
/// * it lives in a reserved system namespace;
/// * it is owned by a DaemonSet. The DaemonSet controller ignores cordons and would just recreate it;
/// * it has already terminated (`Succeeded` or `Failed`);
/// * it mounts node-local storage (`emptyDir` or `hostPath`), which would be lost with the Pod.
pub fn is_evictable(pod: &Pod) -> bool {
    if let Some(namespace) = pod.metadata.namespace.as_deref() {
        if SYSTEM_NAMESPACES.contains(&namespace) {
            return false;
        }
    }

    if pod
        .owner_references()
        .iter()
        .any(|reference| reference.kind == DAEMONSET_KIND)
    {
        return false;
    }

    if let Some(phase) = pod.status.as_ref().and_then(|status| status.phase.as_deref()) {
        if phase == POD_PHASE_SUCCEEDED || phase == POD_PHASE_FAILED {
            return false;
        }
    }

    if let Some(volumes) = pod.spec.as_ref().and_then(|spec| spec.volumes.as_ref()) {
        if volumes
            .iter()
            .any(|volume| volume.empty_dir.is_some() || volume.host_path.is_some())
        {
            return false;
        }
    }

    true
}

/// Splits the Pods of a Node into those to evict and those to leave in place.
pub fn partition_target_pods<I: IntoIterator<Item = Pod>>(pods: I) -> (Vec<Pod>, Vec<Pod>) {
    let (targets, skipped): (Vec<Pod>, Vec<Pod>) = pods.into_iter().partition(is_evictable);

    for pod in skipped.iter() {
        event!(
            Level::DEBUG,
            pod = %pod_reference(pod),
            "Not evicting Pod: excluded from drains."
        );
    }

    (targets, skipped)
}

/// The `namespace/name` of a Pod, for logging.
pub fn pod_reference(pod: &Pod) -> String {
    format!("{}/{}", pod_namespace(pod), pod.name_any())
}

/// The namespace of a Pod. Pods without one live in `default`.
pub fn pod_namespace(pod: &Pod) -> String {
    pod.namespace().unwrap_or_else(|| "default".to_string())
}
