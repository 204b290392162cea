// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::replacements::*;
use crate::controllers::{ClusterSubReconciler, ReplaceFailedProcessGroups, StepOutcome, Requeue};
use crate::crds::FoundationDBCluster;
use crate::fdb_client::{DatabaseStatus, MockAdminClient};
use crate::process_group::ProcessGroupConditionType;
use crate::unit_tests::*;
use crate::Error;

fn set_missing_since(cluster: &mut FoundationDBCluster, id: &str, since: i64) {
    process_group_mut(cluster, id).add_condition(ProcessGroupConditionType::MissingProcesses, since);
}

async fn replace(cluster: &mut FoundationDBCluster, admin_client: &MockAdminClient) -> bool {
    replace_failed_process_groups(cluster, admin_client, now()).await
}

// Tests for choosing failed process groups to replace
#[tokio::test]
pub async fn test_no_missing_processes() {
    let mut cluster = create_default_cluster();
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_process_missing_for_a_long_time() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2"]);
    assert!(!process_group(&cluster, "storage-2").exclusion_skipped);
}

#[tokio::test]
pub async fn test_multiple_failed_processes_marks_first() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    set_missing_since(&mut cluster, "storage-3", long_ago());
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2"]);
    assert!(!process_group(&cluster, "storage-2").exclusion_skipped);
}

#[tokio::test]
pub async fn test_selection_follows_status_order() {
    let mut cluster = create_default_cluster();
    // log-4 is listed after storage-4 even though it failed earlier.
    set_missing_since(&mut cluster, "log-4", long_ago() - 1000);
    set_missing_since(&mut cluster, "storage-4", long_ago());
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-4"]);
}

#[tokio::test]
pub async fn test_in_flight_exclusion_blocks_replacement() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-3").mark_for_removal();
    let admin_client = MockAdminClient::new(&cluster);

    assert_eq!(remaining_replacements(&cluster), 0);
    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-3"]);
}

#[tokio::test]
pub async fn test_in_flight_exclusion_with_two_concurrent_replacements() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-3").mark_for_removal();
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(2);
    let admin_client = MockAdminClient::new(&cluster);

    assert_eq!(remaining_replacements(&cluster), 1);
    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2", "storage-3"]);
}

#[tokio::test]
pub async fn test_zero_concurrent_replacements() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-3").mark_for_removal();
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(0);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-3"]);
}

#[tokio::test]
pub async fn test_zero_concurrent_replacements_without_in_flight_removals() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(0);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_complete_exclusion_does_not_count() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    let storage_3 = process_group_mut(&mut cluster, "storage-3");
    storage_3.mark_for_removal();
    storage_3.set_excluded();
    let admin_client = MockAdminClient::new(&cluster);

    assert_eq!(remaining_replacements(&cluster), 1);
    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2", "storage-3"]);
}

#[tokio::test]
pub async fn test_cap_limits_replacements_per_pass() {
    let mut cluster = create_default_cluster();
    for id in ["storage-1", "storage-2", "log-1", "stateless-1"] {
        set_missing_since(&mut cluster, id, long_ago());
    }
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(3);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-1", "storage-2", "log-1"]);
    assert_eq!(remaining_replacements(&cluster), 0);
}

#[tokio::test]
pub async fn test_replacements_disabled() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    cluster.spec.automation_options.replacements.enabled = Some(false);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_no_addresses() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-2").addresses.clear();
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2"]);
    assert!(process_group(&cluster, "storage-2").exclusion_skipped);
}

#[tokio::test]
pub async fn test_no_addresses_cluster_not_available() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-2").addresses.clear();
    let admin_client = MockAdminClient::new(&cluster);
    admin_client.set_available(false);
    let before = cluster.clone();

    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(cluster, before);
}

#[tokio::test]
pub async fn test_no_addresses_without_fault_tolerance() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-2").addresses.clear();
    let admin_client = MockAdminClient::new(&cluster);
    admin_client.set_max_zone_failures_without_losing_data(0);
    let before = cluster.clone();

    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(cluster, before);
}

#[tokio::test]
pub async fn test_no_addresses_status_error() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-2").addresses.clear();
    let admin_client = MockAdminClient::new(&cluster);
    admin_client.fail_status_with(Some("connection refused"));
    let before = cluster.clone();

    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(cluster, before);
}

#[tokio::test]
pub async fn test_unsafe_database_blocks_the_whole_selection() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-1", long_ago());
    set_missing_since(&mut cluster, "storage-2", long_ago());
    process_group_mut(&mut cluster, "storage-2").addresses.clear();
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(2);
    let admin_client = MockAdminClient::new(&cluster);
    admin_client.freeze_status(Some(DatabaseStatus::default()));

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_status_not_needed_when_all_selected_have_addresses() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    let admin_client = MockAdminClient::new(&cluster);
    admin_client.fail_status_with(Some("connection refused"));

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2"]);
}

#[tokio::test]
pub async fn test_process_missing_for_a_brief_time() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", now() - 60);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_custom_failure_detection_window() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", now() - 60);
    cluster
        .spec
        .automation_options
        .replacements
        .failure_detection_time_seconds = Some(30);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    assert_eq!(marked_for_removal(&cluster), vec!["storage-2"]);
}

#[tokio::test]
pub async fn test_window_boundary_is_exclusive() {
    let mut cluster = create_default_cluster();
    let now = 1_700_000_000;
    set_missing_since(&mut cluster, "storage-2", now - 1800);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace_failed_process_groups(&mut cluster, &admin_client, now).await);
    assert!(replace_failed_process_groups(&mut cluster, &admin_client, now + 1).await);
}

#[tokio::test]
pub async fn test_incorrect_pod_spec_for_a_long_time() {
    let mut cluster = create_default_cluster();
    process_group_mut(&mut cluster, "storage-2")
        .add_condition(ProcessGroupConditionType::IncorrectPodSpec, long_ago());
    let admin_client = MockAdminClient::new(&cluster);

    assert!(!replace(&mut cluster, &admin_client).await);
    assert!(marked_for_removal(&cluster).is_empty());
}

#[tokio::test]
pub async fn test_replacement_is_idempotent() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    cluster
        .spec
        .automation_options
        .replacements
        .max_concurrent_replacements = Some(5);
    let admin_client = MockAdminClient::new(&cluster);

    assert!(replace(&mut cluster, &admin_client).await);
    let after_first = cluster.clone();
    assert!(!replace(&mut cluster, &admin_client).await);
    assert_eq!(cluster, after_first);
}

// Tests for the replaceFailedProcessGroups step
#[tokio::test]
pub async fn test_step_persists_and_requeues() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    let harness = TestHarness::new(vec![]);

    let outcome = ReplaceFailedProcessGroups
        .reconcile(&harness.context(), &mut cluster)
        .await;
    match outcome {
        StepOutcome::Requeue(Requeue::Message { message, delay }) => {
            assert_eq!(message, "Removals have been updated in the cluster status");
            assert_eq!(delay, None);
        }
        other => panic!("expected a requeue, got {:?}", other),
    }
    let statuses = harness.platform.persisted_statuses();
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0]
        .process_groups
        .iter()
        .any(|process_group| process_group.process_group_id == "storage-2" && process_group.remove));
}

#[tokio::test]
pub async fn test_step_continues_without_changes() {
    let mut cluster = create_default_cluster();
    let harness = TestHarness::new(vec![]);

    let outcome = ReplaceFailedProcessGroups
        .reconcile(&harness.context(), &mut cluster)
        .await;
    assert!(outcome.is_continue());
    assert!(harness.platform.persisted_statuses().is_empty());
}

#[tokio::test]
pub async fn test_step_status_update_failure() {
    let mut cluster = create_default_cluster();
    set_missing_since(&mut cluster, "storage-2", long_ago());
    let harness = TestHarness::new(vec![]);
    harness.platform.fail_status_updates(true);

    let outcome = ReplaceFailedProcessGroups
        .reconcile(&harness.context(), &mut cluster)
        .await;
    assert!(matches!(
        outcome,
        StepOutcome::Requeue(Requeue::Error(Error::UpdateStatusFailed(_)))
    ));
}
