// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::replacements;
use crate::controllers::{ClusterSubReconciler, ReconcileContext, StepOutcome};
use crate::crds::FoundationDBCluster;
use crate::fdb_client::close_admin_client;
use async_trait::async_trait;
use chrono::Utc;

/// ReplaceFailedProcessGroups identifies process groups that have failed and
/// need to be replaced.
pub struct ReplaceFailedProcessGroups;

#[async_trait]
impl ClusterSubReconciler for ReplaceFailedProcessGroups {
    fn name(&self) -> &'static str {
        "replaceFailedProcessGroups"
    }

    async fn reconcile(
        &self,
        ctx: &ReconcileContext<'_>,
        cluster: &mut FoundationDBCluster,
    ) -> StepOutcome {
        let admin_client = match ctx.database.get_admin_client(cluster).await {
            Ok(admin_client) => admin_client,
            Err(err) => return StepOutcome::error(err),
        };
        let changed = replacements::replace_failed_process_groups(
            cluster,
            admin_client.as_ref(),
            Utc::now().timestamp(),
        )
        .await;
        close_admin_client(admin_client).await;

        if !changed {
            return StepOutcome::Continue;
        }
        if let Err(err) = ctx.platform.update_status(cluster).await {
            return StepOutcome::error(err);
        }
        StepOutcome::requeue("Removals have been updated in the cluster status")
    }
}
