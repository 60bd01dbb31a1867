//! Conditional Node updates which survive concurrent writers.
//!
//! A Node update is a read-modify-write keyed on the Node's `resourceVersion`. If another writer changes the Node
//! between our read and our write, the write is rejected with a conflict. We then re-read the Node, re-apply our
//! change to the fresh copy and try again, a bounded number of times.
use models::node::{ClusterClient, ClusterError};

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tokio::time::Duration;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{event, instrument, Level};

// Conflicts are resolved by simply trying again, so the delays are short.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
// Number of attempts after the first one, each against a freshly read copy.
const NUM_RETRIES: usize = 3;

/// Wrapper struct to provide retry configurations for conflicting Node updates.
struct RetryStrategy {}
impl RetryStrategy {
    fn retry_strategy() -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .map(jitter)
            .take(NUM_RETRIES)
    }
}

impl tokio_retry::Condition<ClusterError> for RetryStrategy {
    fn should_retry(&mut self, error: &ClusterError) -> bool {
        error.is_conflict()
    }
}

/// The result of a conditional Node update.
#[derive(Clone, Debug)]
pub(crate) enum NodeUpdate {
    /// The change was accepted.
    Applied,
    /// The freshest copy of the Node no longer needed the change. Holds that copy.
    Unnecessary(Node),
}

/// Applies `change` to `listed`, then submits it as a conditional update.
///
/// `change` returns `None` when the given Node does not need updating; it is re-evaluated against a fresh read
/// of the Node after every conflict, so a concurrent writer that already made (or invalidated) the change is
/// respected.
#[instrument(skip(cluster_client, listed, change), fields(node_name = %listed.name_any()), err)]
pub(crate) async fn update_node<T, F>(
    cluster_client: &T,
    listed: &Node,
    change: F,
) -> Result<NodeUpdate, ClusterError>
where
    T: ClusterClient,
    F: Fn(&Node) -> Option<Node>,
{
    let node_name = listed.name_any();
    let node_name = node_name.as_str();
    let change = &change;
    let mut attempt: usize = 0;
    RetryIf::spawn(
        RetryStrategy::retry_strategy(),
        move || {
            attempt += 1;
            let reread = attempt > 1;
            async move {
                if !reread {
                    return submit(cluster_client, listed, change).await;
                }
                event!(
                    Level::WARN,
                    node_name,
                    attempt,
                    "Node was modified concurrently. Retrying with a fresh copy."
                );
                let current = cluster_client.get_node(node_name).await?;
                submit(cluster_client, &current, change).await
            }
        },
        RetryStrategy {},
    )
    .await
}

async fn submit<T, F>(cluster_client: &T, current: &Node, change: &F) -> Result<NodeUpdate, ClusterError>
where
    T: ClusterClient,
    F: Fn(&Node) -> Option<Node>,
{
    match change(current) {
        Some(updated) => cluster_client
            .update_node(&updated)
            .await
            .map(|_| NodeUpdate::Applied),
        None => Ok(NodeUpdate::Unnecessary(current.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{conflict, worker};
    use models::node::MockClusterClient;
    use mockall::Sequence;

    fn mark(node: &Node) -> Option<Node> {
        if node.annotations().contains_key("marked") {
            return None;
        }
        let mut updated = node.clone();
        updated
            .annotations_mut()
            .insert("marked".to_string(), "true".to_string());
        Some(updated)
    }

    #[tokio::test]
    async fn test_first_attempt_uses_listed_copy() {
        let mut cluster_client = MockClusterClient::new();
        cluster_client.expect_get_node().times(0);
        cluster_client
            .expect_update_node()
            .withf(|node: &Node| node.annotations().contains_key("marked"))
            .times(1)
            .returning(|node| Ok(node.clone()));

        let result = update_node(&cluster_client, &worker("w1"), mark).await.unwrap();
        assert!(matches!(result, NodeUpdate::Applied));
    }

    #[tokio::test]
    async fn test_conflict_rereads_and_retries() {
        let mut seq = Sequence::new();
        let mut cluster_client = MockClusterClient::new();
        cluster_client
            .expect_update_node()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|node| Err(conflict(&node.name_any())));
        cluster_client
            .expect_get_node()
            .withf(|name: &str| name == "w1")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|name| Ok(worker(name)));
        cluster_client
            .expect_update_node()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|node| Ok(node.clone()));

        let result = update_node(&cluster_client, &worker("w1"), mark).await.unwrap();
        assert!(matches!(result, NodeUpdate::Applied));
    }

    #[tokio::test]
    async fn test_fresh_copy_may_make_change_unnecessary() {
        let mut cluster_client = MockClusterClient::new();
        cluster_client
            .expect_update_node()
            .times(1)
            .returning(|node| Err(conflict(&node.name_any())));
        cluster_client
            .expect_get_node()
            .times(1)
            .returning(|name| Ok(mark(&worker(name)).unwrap()));

        let result = update_node(&cluster_client, &worker("w1"), mark).await.unwrap();
        assert!(matches!(result, NodeUpdate::Unnecessary(_)));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_a_bounded_number_of_times() {
        let mut cluster_client = MockClusterClient::new();
        cluster_client
            .expect_update_node()
            .times(NUM_RETRIES + 1)
            .returning(|node| Err(conflict(&node.name_any())));
        cluster_client
            .expect_get_node()
            .times(NUM_RETRIES)
            .returning(|name| Ok(worker(name)));

        let result = update_node(&cluster_client, &worker("w1"), mark).await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_retries_stop_once_a_fresh_copy_is_accepted() {
        let mut seq = Sequence::new();
        let mut cluster_client = MockClusterClient::new();
        cluster_client
            .expect_update_node()
            .times(NUM_RETRIES)
            .in_sequence(&mut seq)
            .returning(|node| Err(conflict(&node.name_any())));
        cluster_client
            .expect_update_node()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|node| Ok(node.clone()));
        cluster_client
            .expect_get_node()
            .times(NUM_RETRIES)
            .returning(|name| Ok(worker(name)));

        let result = update_node(&cluster_client, &worker("w1"), mark).await.unwrap();
        assert!(matches!(result, NodeUpdate::Applied));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let mut cluster_client = MockClusterClient::new();
        cluster_client.expect_get_node().times(0);
        cluster_client
            .expect_update_node()
            .times(1)
            .returning(|node| {
                Err(ClusterError::UpdateNode {
                    source: crate::test_support::api_error(403),
                    node_name: node.name_any(),
                })
            });

        let result = update_node(&cluster_client, &worker("w1"), mark).await;
        assert!(!result.unwrap_err().is_conflict());
    }
}
