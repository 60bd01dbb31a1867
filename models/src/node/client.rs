use super::error::{self, Result};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, ListParams, PostParams};
use kube::ResourceExt;
use snafu::ResultExt;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[cfg(feature = "mockall")]
use mockall::mock;

// HTTP status codes the drainer gives special meaning to.
const STATUS_CONFLICT: u16 = 409;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

#[async_trait]
/// A trait providing the cluster operations the drainer relies upon. This is provided as a trait
/// in order to allow mocks to be used for testing purposes.
pub trait ClusterClient: Clone + Sized + Send + Sync {
    /// Lists every Node in the cluster.
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    /// Reads the current version of a single Node.
    async fn get_node(&self, node_name: &str) -> Result<Node>;
    /// Replaces a Node. The write is conditional on the `resourceVersion` carried by `node`, and fails with
    /// `UpdateNodeConflict` if the Node has changed since it was read.
    async fn update_node(&self, node: &Node) -> Result<Node>;
    /// Lists the Pods scheduled onto the given Node, across all namespaces.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;
    /// Creates an eviction for the given Pod.
    async fn evict_pod(&self, namespace: &str, pod_name: &str) -> Result<()>;
}

#[cfg(feature = "mockall")]
mock! {
    /// A Mock ClusterClient for use in tests.
    pub ClusterClient {}
    #[async_trait]
    impl ClusterClient for ClusterClient {
        async fn list_nodes(&self) -> Result<Vec<Node>>;
        async fn get_node(&self, node_name: &str) -> Result<Node>;
        async fn update_node(&self, node: &Node) -> Result<Node>;
        async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;
        async fn evict_pod(&self, namespace: &str, pod_name: &str) -> Result<()>;
    }

    impl Clone for ClusterClient {
        fn clone(&self) -> Self;
    }
}

#[async_trait]
impl<T> ClusterClient for Arc<T>
where
    T: ClusterClient,
{
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        (**self).list_nodes().await
    }

    async fn get_node(&self, node_name: &str) -> Result<Node> {
        (**self).get_node(node_name).await
    }

    async fn update_node(&self, node: &Node) -> Result<Node> {
        (**self).update_node(node).await
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        (**self).list_pods_on_node(node_name).await
    }

    async fn evict_pod(&self, namespace: &str, pod_name: &str) -> Result<()> {
        (**self).evict_pod(namespace, pod_name).await
    }
}

#[derive(Clone)]
/// Concrete implementation of the `ClusterClient` trait. This implementation will almost
/// certainly be used in any case that isn't a unit test.
pub struct K8SClusterClient {
    k8s_client: kube::client::Client,
}

impl K8SClusterClient {
    pub fn new(k8s_client: kube::client::Client) -> Self {
        K8SClusterClient { k8s_client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.k8s_client.clone())
    }
}

#[async_trait]
impl ClusterClient for K8SClusterClient {
    #[instrument(skip(self), err)]
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes = self
            .nodes()
            .list(&ListParams::default())
            .await
            .context(error::ListNodesSnafu)?;
        Ok(nodes.items)
    }

    #[instrument(skip(self), err)]
    async fn get_node(&self, node_name: &str) -> Result<Node> {
        self.nodes()
            .get(node_name)
            .await
            .context(error::GetNodeSnafu { node_name })
    }

    #[instrument(skip(self, node), fields(node_name = %node.name_any()), err)]
    async fn update_node(&self, node: &Node) -> Result<Node> {
        let node_name = node.name_any();
        // `replace` sends the resourceVersion we read, so the API server rejects the write if the Node has
        // changed in the meantime.
        match self
            .nodes()
            .replace(&node_name, &PostParams::default(), node)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(response)) if response.code == STATUS_CONFLICT => {
                error::UpdateNodeConflictSnafu { node_name }.fail()
            }
            Err(e) => Err(e).context(error::UpdateNodeSnafu { node_name }),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::all(self.k8s_client.clone());
        let pods = pods
            .list(&ListParams::default().fields(&format!("spec.nodeName={}", node_name)))
            .await
            .context(error::ListPodsSnafu { node_name })?;
        Ok(pods.items)
    }

    #[instrument(skip(self), err)]
    async fn evict_pod(&self, namespace: &str, pod_name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.k8s_client.clone(), namespace);

        // A 429 (TOO_MANY_REQUESTS) response indicates that the eviction would violate a PodDisruptionBudget.
        match pods.evict(pod_name, &EvictParams::default()).await {
            Ok(_) => {
                event!(Level::DEBUG, "Created eviction for Pod '{}/{}'", namespace, pod_name);
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == STATUS_TOO_MANY_REQUESTS => {
                Err(kube::Error::Api(response)).context(error::EvictionRejectedSnafu {
                    namespace,
                    pod_name,
                })
            }
            Err(e) => Err(e).context(error::EvictPodSnafu {
                namespace,
                pod_name,
            }),
        }
    }
}

