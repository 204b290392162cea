// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::FoundationDBCluster;
use crate::pod_spec::{pod_name, FDB_CLUSTER_LABEL};
use crate::Error;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::json;
use tracing::info;

/// PlatformClient is the reconcilers' view of the compute platform: the pods
/// of a cluster and the persisted cluster status.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn list_pods(&self, cluster: &FoundationDBCluster) -> Result<Vec<Pod>, Error>;

    /// Requests deletion of the pods. Returns once the requests are accepted,
    /// not once the pods are gone.
    async fn delete_pods(&self, cluster: &FoundationDBCluster, pods: &[Pod]) -> Result<(), Error>;

    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<(), Error>;
}

pub struct KubePlatformClient {
    client: Client,
}

impl KubePlatformClient {
    pub fn new(client: Client) -> Self {
        KubePlatformClient { client }
    }

    fn namespace(cluster: &FoundationDBCluster) -> Result<&str, Error> {
        cluster
            .metadata
            .namespace
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))
    }

    fn name(cluster: &FoundationDBCluster) -> Result<&str, Error> {
        cluster
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingObjectKey(".metadata.name"))
    }
}

#[async_trait]
impl PlatformClient for KubePlatformClient {
    async fn list_pods(&self, cluster: &FoundationDBCluster) -> Result<Vec<Pod>, Error> {
        let pod_api = Api::<Pod>::namespaced(self.client.clone(), Self::namespace(cluster)?);
        let selector = format!("{}={}", FDB_CLUSTER_LABEL, Self::name(cluster)?);
        let pods = pod_api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(Error::ListPodsFailed)?;
        Ok(pods.items)
    }

    async fn delete_pods(&self, cluster: &FoundationDBCluster, pods: &[Pod]) -> Result<(), Error> {
        let pod_api = Api::<Pod>::namespaced(self.client.clone(), Self::namespace(cluster)?);
        for pod in pods {
            let name = pod_name(pod);
            info!("Delete pod: {}", name);
            pod_api
                .delete(name, &DeleteParams::default())
                .await
                .map_err(|e| Error::DeletePodFailed(name.to_string(), e))?;
        }
        Ok(())
    }

    async fn update_status(&self, cluster: &FoundationDBCluster) -> Result<(), Error> {
        let cluster_api =
            Api::<FoundationDBCluster>::namespaced(self.client.clone(), Self::namespace(cluster)?);
        let patch = json!({ "status": cluster.status });
        cluster_api
            .patch_status(Self::name(cluster)?, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(Error::UpdateStatusFailed)?;
        Ok(())
    }
}
