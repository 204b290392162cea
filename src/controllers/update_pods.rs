// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::{ClusterSubReconciler, ReconcileContext, StepOutcome};
use crate::crds::{DeletionMode, FoundationDBCluster};
use crate::fdb_client::{can_delete_pods, close_admin_client, HeldLock};
use crate::pod_spec::{
    pod_annotation, pod_ip, pod_label, pod_name, pod_spec_hash, pod_zone, process_class_of,
    FDB_PROCESS_GROUP_ID_LABEL, LAST_SPEC_KEY,
};
use crate::process_group::parse_process_group_id;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::events::EventType;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info};

pub const SIMULATION_ZONE: &str = "simulation";

/// Pods that need to be recreated, grouped by zone. Ordered so that picking
/// "the first zone" is deterministic.
pub type ZoneUpdates = BTreeMap<String, Vec<Pod>>;

/// UpdatePods recreates pods whose spec no longer matches the desired spec.
pub struct UpdatePods;

#[async_trait]
impl ClusterSubReconciler for UpdatePods {
    fn name(&self) -> &'static str {
        "updatePods"
    }

    async fn reconcile(
        &self,
        ctx: &ReconcileContext<'_>,
        cluster: &mut FoundationDBCluster,
    ) -> StepOutcome {
        let pods = match ctx.platform.list_pods(cluster).await {
            Ok(pods) => pods,
            Err(err) => return StepOutcome::error(err),
        };
        let updates = match find_pods_to_update(ctx, cluster, &pods) {
            Ok(updates) => updates,
            Err(outcome) => return outcome,
        };
        if updates.is_empty() {
            return StepOutcome::Continue;
        }

        if cluster.spec.update_pods_by_replacement {
            info!("Requeuing reconciliation to replace pods");
            return StepOutcome::requeue("Requeueing reconciliation to replace pods");
        }

        if !cluster.pod_deletion_enabled() {
            ctx.recorder
                .publish(
                    cluster,
                    EventType::Normal,
                    "NeedsPodsDeletion",
                    "Spec require deleting some pods, but deleting pods is disabled".to_string(),
                )
                .await;
            let generation = cluster.metadata.generation;
            if cluster.generations().needs_pod_deletion != generation {
                cluster.generations_mut().needs_pod_deletion = generation;
                if let Err(err) = ctx.platform.update_status(cluster).await {
                    error!(error = %err, "Error updating cluster status");
                }
            }
            return StepOutcome::requeue("Pod deletion is disabled");
        }

        delete_pods_for_updates(ctx, cluster, updates).await
    }
}

/// find_pods_to_update compares every running pod with the desired spec hash of
/// its process group. An `Err` carries the outcome that ends the pass early.
fn find_pods_to_update(
    ctx: &ReconcileContext<'_>,
    cluster: &FoundationDBCluster,
    pods: &[Pod],
) -> Result<ZoneUpdates, StepOutcome> {
    let pod_map: HashMap<&str, &Pod> = pods
        .iter()
        .filter_map(|pod| pod_label(pod, FDB_PROCESS_GROUP_ID_LABEL).map(|id| (id, pod)))
        .collect();
    let mut updates = ZoneUpdates::new();

    for process_group in cluster.process_groups() {
        let id = process_group.process_group_id.as_str();
        if process_group.is_marked_for_removal() {
            debug!(processGroupID = id, "Ignore removed Pod");
            continue;
        }
        if cluster.skip_process_group(process_group) {
            debug!(processGroupID = id, "Ignore pending Pod");
            continue;
        }
        let pod = match pod_map.get(id) {
            Some(pod) => *pod,
            None => {
                debug!(processGroupID = id, "Could not find Pod for process group ID");
                continue;
            }
        };

        if pod.metadata.deletion_timestamp.is_some() && !cluster.process_group_is_being_removed(id)
        {
            return Err(StepOutcome::requeue_after(
                "Cluster has pod that is pending deletion",
                ctx.config.pod_scheduling_delay,
            ));
        }

        let (_, id_num) = parse_process_group_id(id).map_err(StepOutcome::error)?;
        let process_class = process_class_of(pod).map_err(StepOutcome::error)?;
        let spec_hash =
            pod_spec_hash(cluster, &process_class, id_num).map_err(StepOutcome::error)?;
        let current_hash = pod_annotation(pod, LAST_SPEC_KEY);
        if current_hash == Some(spec_hash.as_str()) {
            continue;
        }

        info!(
            processGroupID = id,
            reason = %format!(
                "specHash has changed from {} to {}",
                spec_hash,
                current_hash.unwrap_or_default()
            ),
            "Update Pod"
        );

        if pod_ip(pod).is_none() {
            return Err(StepOutcome::requeue_after(
                format!("Waiting for pod {} to be assigned an IP", pod_name(pod)),
                ctx.config.pod_scheduling_delay,
            ));
        }

        let zone = if ctx.config.in_simulation {
            SIMULATION_ZONE
        } else {
            match pod_zone(pod) {
                Some(zone) => zone,
                None => {
                    info!(processGroupID = id, "Skipping pod due to missing locality information");
                    continue;
                }
            }
        };
        updates.entry(zone.to_string()).or_default().push(pod.clone());
    }

    Ok(updates)
}

/// get_pods_to_delete selects the pods to delete in this pass together with a
/// label for the selection: the whole cluster, one zone or one process group.
pub fn get_pods_to_delete(deletion_mode: DeletionMode, updates: &ZoneUpdates) -> (String, Vec<Pod>) {
    match deletion_mode {
        DeletionMode::All => (
            "cluster".to_string(),
            updates.values().flatten().cloned().collect(),
        ),
        DeletionMode::Zone => updates
            .iter()
            .find(|(_, zone_pods)| !zone_pods.is_empty())
            .map(|(zone, zone_pods)| (zone.clone(), zone_pods.clone()))
            .unwrap_or_default(),
        DeletionMode::ProcessGroup => updates
            .values()
            .find_map(|zone_pods| zone_pods.first())
            .map(|pod| (pod_name(pod).to_string(), vec![pod.clone()]))
            .unwrap_or_default(),
    }
}

/// delete_pods_for_updates deletes the pods chosen by the cluster's deletion
/// mode. Anything short of deleting everything at once is gated on the
/// database tolerating the loss and on holding the cluster lock.
async fn delete_pods_for_updates(
    ctx: &ReconcileContext<'_>,
    cluster: &FoundationDBCluster,
    updates: ZoneUpdates,
) -> StepOutcome {
    let deletion_mode = match cluster.deletion_mode() {
        Ok(deletion_mode) => deletion_mode,
        Err(err) => return StepOutcome::error(err),
    };
    let (zone, deletions) = get_pods_to_delete(deletion_mode, &updates);
    if deletions.is_empty() {
        return StepOutcome::Continue;
    }

    if deletion_mode != DeletionMode::All {
        let admin_client = match ctx.database.get_admin_client(cluster).await {
            Ok(admin_client) => admin_client,
            Err(err) => return StepOutcome::error(err),
        };
        let ready = can_delete_pods(admin_client.as_ref()).await;
        close_admin_client(admin_client).await;
        match ready {
            Err(err) => return StepOutcome::error(err),
            Ok(false) => {
                return StepOutcome::requeue_after(
                    "Reconciliation requires deleting pods, but deletion is currently not safe",
                    ctx.config.pod_scheduling_delay,
                )
            }
            Ok(true) => {}
        }
    }

    // Deleting everything at once does not need to be serialized with anyone.
    let lock = if deletion_mode != DeletionMode::All && cluster.should_use_locks() {
        let lock_client = match ctx.database.get_lock_client(cluster).await {
            Ok(lock_client) => lock_client,
            Err(err) => return StepOutcome::error(err),
        };
        match lock_client.take_lock("updating pods").await {
            Err(err) => return StepOutcome::error(err),
            Ok(false) => {
                return StepOutcome::requeue_after(
                    "Waiting for the lock to update pods",
                    ctx.config.pod_scheduling_delay,
                )
            }
            Ok(true) => Some(HeldLock::new(lock_client)),
        }
    } else {
        None
    };

    info!(
        zone = %zone,
        count = deletions.len(),
        deletionMode = %deletion_mode,
        "Deleting pods"
    );
    ctx.recorder
        .publish(
            cluster,
            EventType::Normal,
            "UpdatingPods",
            format!("Recreating pods in zone {}", zone),
        )
        .await;

    let deleted = ctx.platform.delete_pods(cluster, &deletions).await;
    if let Some(lock) = lock {
        lock.release().await;
    }

    match deleted {
        Ok(()) => StepOutcome::requeue("Pods need to be recreated"),
        Err(err) => StepOutcome::error(err),
    }
}
