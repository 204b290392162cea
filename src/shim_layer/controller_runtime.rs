// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::controllers::{ClusterReconciler, PassOutcome, Requeue};
use crate::crds::FoundationDBCluster;
use crate::events::KubeEventRecorder;
use crate::fdb_client::DatabaseClientProvider;
use crate::platform::KubePlatformClient;
use crate::pod_spec::FDB_CLUSTER_LABEL;
use crate::Error;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::Api,
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    Client,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const CONTROLLER_NAME: &str = "fdb-controller";

// The shim layer connects the reconciliation pipeline to the kube-rs runtime.
// kube-rs watches FoundationDBCluster objects (and the pods they own) and makes
// sure at most one reconcile runs per object at a time; the pipeline decides
// what to do within one pass.

/// Data is passed to every reconcile and error_policy call.
pub struct Data {
    pub client: Client,
    pub reconciler: ClusterReconciler,
}

/// run_controller builds the pipeline on top of the Kubernetes clients and runs
/// it until the process is signalled to stop.
pub async fn run_controller(
    config: ControllerConfig,
    database: Arc<dyn DatabaseClientProvider>,
) -> Result<()> {
    let client = Client::try_default().await?;
    let clusters = Api::<FoundationDBCluster>::all(client.clone());
    let pods = Api::<Pod>::all(client.clone());

    let reconciler = ClusterReconciler::new(
        Arc::new(KubePlatformClient::new(client.clone())),
        database,
        Arc::new(KubeEventRecorder::new(client.clone(), CONTROLLER_NAME)),
        config,
    );

    info!("starting controller");
    Controller::new(clusters, watcher::Config::default())
        .owns(pods, watcher::Config::default().labels(FDB_CLUSTER_LABEL))
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(Data { client, reconciler }))
        .for_each(|res| async move {
            match res {
                Ok(o) => info!("reconciled {:?}", o),
                Err(e) => warn!("reconcile failed: {}", e),
            }
        })
        .await;
    info!("controller terminated");
    Ok(())
}

/// reconcile reads the latest version of the cluster and runs one pass of the
/// pipeline on it, bounded by the configured deadline.
pub async fn reconcile(
    cluster_from_cache: Arc<FoundationDBCluster>,
    ctx: Arc<Data>,
) -> Result<Action, Error> {
    let name = cluster_from_cache
        .metadata
        .name
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = cluster_from_cache
        .metadata
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let cluster_api = Api::<FoundationDBCluster>::namespaced(ctx.client.clone(), namespace);
    // Read the cluster again so the pass does not start from a stale cache entry.
    let mut cluster = match cluster_api.get_opt(name).await {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            info!("{}/{} not found, end reconcile", namespace, name);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(Error::GetClusterFailed(e)),
    };

    let deadline = ctx.reconciler.config().reconcile_timeout;
    reconcile_with_deadline(&ctx.reconciler, &mut cluster, deadline).await
}

/// reconcile_with_deadline runs one pass bounded by `deadline`. An expired pass
/// is reported as a retryable error; dropping it aborts whatever external call
/// was in flight.
pub async fn reconcile_with_deadline(
    reconciler: &ClusterReconciler,
    cluster: &mut FoundationDBCluster,
    deadline: Duration,
) -> Result<Action, Error> {
    match tokio::time::timeout(deadline, reconciler.reconcile_cluster(cluster)).await {
        Ok(outcome) => action_for(outcome, reconciler.config()),
        Err(_) => Err(Error::ReconcileTimeout(deadline)),
    }
}

/// action_for translates the outcome of a pass into what kube-rs should do next.
pub fn action_for(outcome: PassOutcome, config: &ControllerConfig) -> Result<Action, Error> {
    match outcome {
        PassOutcome::Converged => Ok(Action::requeue(config.resync_interval)),
        PassOutcome::Requeue {
            requeue: Requeue::Message { delay, .. },
            ..
        } => Ok(Action::requeue(delay.unwrap_or(Duration::ZERO))),
        PassOutcome::Requeue {
            requeue: Requeue::Error(err),
            ..
        } => Err(err),
    }
}

/// error_policy defines the controller's behavior when the reconcile ends with an error.
pub fn error_policy(_object: Arc<FoundationDBCluster>, error: &Error, ctx: Arc<Data>) -> Action {
    warn!("Reconcile failed due to error: {}", error);
    Action::requeue(ctx.reconciler.config().error_requeue_delay)
}
