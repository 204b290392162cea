// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::FoundationDBCluster;
use crate::fdb_client::AdminClient;
use tracing::{error, info};

/// The number of replacements still allowed: the configured cap minus the
/// removals that are in flight, i.e. marked for removal but not fully excluded.
pub fn remaining_replacements(cluster: &FoundationDBCluster) -> i32 {
    let in_flight = cluster
        .process_groups()
        .iter()
        .filter(|process_group| process_group.is_marked_for_removal() && !process_group.is_excluded())
        .count();
    let in_flight = i32::try_from(in_flight).unwrap_or(i32::MAX);
    cluster.max_concurrent_replacements().saturating_sub(in_flight)
}

/// replace_failed_process_groups marks process groups whose processes have been
/// missing for longer than the failure detection window for removal. Returns
/// whether any process group was changed.
///
/// At most `remaining_replacements` groups are marked, taken in status order.
/// A selected group without addresses never joined the database, so it is
/// marked with its exclusion skipped; that is only done while the database is
/// available and can lose another zone without losing data. If that cannot be
/// confirmed nothing is marked at all.
pub async fn replace_failed_process_groups(
    cluster: &mut FoundationDBCluster,
    admin_client: &dyn AdminClient,
    now: i64,
) -> bool {
    if !cluster.automatic_replacements_enabled() {
        return false;
    }

    let remaining = remaining_replacements(cluster);
    if remaining <= 0 {
        return false;
    }
    let remaining = usize::try_from(remaining).unwrap_or_default();

    let failure_detection_time = cluster.failure_detection_time_seconds();
    let selected: Vec<usize> = cluster
        .process_groups()
        .iter()
        .enumerate()
        .filter(|(_, process_group)| {
            !process_group.is_marked_for_removal()
                && process_group.needs_replacement(failure_detection_time, now)
        })
        .map(|(index, _)| index)
        .take(remaining)
        .collect();
    if selected.is_empty() {
        return false;
    }

    let needs_fault_tolerance_check = selected
        .iter()
        .any(|&index| cluster.process_groups()[index].addresses.is_empty());
    if needs_fault_tolerance_check {
        match admin_client.get_status().await {
            Err(err) => {
                error!(error = %err, "Could not fetch fault tolerance information");
                return false;
            }
            Ok(status) if !status.can_tolerate_zone_failure() => {
                info!(
                    available = status.available(),
                    max_zone_failures_without_losing_data =
                        status.max_zone_failures_without_losing_data(),
                    "Skip replacement of process groups without addresses, the cluster cannot tolerate another failure"
                );
                return false;
            }
            Ok(_) => {}
        }
    }

    let process_groups = cluster.process_groups_mut();
    for index in selected {
        let process_group = &mut process_groups[index];
        if process_group.addresses.is_empty() {
            // Never joined the database, so there is nothing to exclude.
            process_group.exclusion_skipped = true;
        }
        info!(
            processGroupID = %process_group.process_group_id,
            exclusionSkipped = process_group.exclusion_skipped,
            "Replace process group"
        );
        process_group.mark_for_removal();
    }
    true
}
