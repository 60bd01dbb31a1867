/// Helper macro to avoid retyping the base domain-like name of our system when creating further
/// string constants from it. When given no parameters, this returns the base domain-like name of
/// the system. When given a string literal parameter it adds `/parameter` to the end.
#[macro_export]
macro_rules! drainer_domain {
    () => {
        "ups-drainer.k8s.io"
    };
    ($s:literal) => {
        concat!(drainer_domain!(), "/", $s)
    };
}

// Ownership marker written onto nodes cordoned by the drainer.
pub const OWNERSHIP_ANNOTATION_KEY: &str = drainer_domain!("drained-by");
pub const OWNERSHIP_ANNOTATION_VALUE: &str = "ups-node-drainer";

// Label and taint keys which identify control plane nodes.
pub const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";
pub const LABEL_MASTER: &str = "node-role.kubernetes.io/master";
pub const CONTROL_PLANE_ROLE_KEYS: &[&str] = &[LABEL_CONTROL_PLANE, LABEL_MASTER];

// Pods in these namespaces are never evicted.
pub const SYSTEM_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

pub const DAEMONSET_KIND: &str = "DaemonSet";
pub const POD_PHASE_SUCCEEDED: &str = "Succeeded";
pub const POD_PHASE_FAILED: &str = "Failed";

// Recognized UPS power states.
pub const POWER_STATE_ON_BATTERY: &str = "ONBATT";
pub const POWER_STATE_ONLINE: &str = "ONLINE";

// drainer http server constants
pub const DRAINER_DEFAULT_PORT: u16 = 8080; // The port on which the status ingress is hosted.
pub const DRAINER_HEALTH_CHECK_ROUTE: &str = "/ping"; // Route used for k8s liveness and readiness checks.
pub const DRAINER_METRICS_ROUTE: &str = "/metrics";
