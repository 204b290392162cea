// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::controllers::{
    ClusterReconciler, ClusterSubReconciler, PassOutcome, ReconcileContext, Requeue, StepOutcome,
};
use crate::crds::FoundationDBCluster;
use crate::shim_layer::controller_runtime::{action_for, reconcile_with_deadline};
use crate::unit_tests::{create_default_cluster, TestHarness};
use crate::Error;
use async_trait::async_trait;
use kube::runtime::controller::Action;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// Tests for translating pass outcomes into controller actions
#[test]
pub fn test_converged_waits_for_resync() {
    let config = ControllerConfig {
        resync_interval: Duration::from_secs(300),
        ..ControllerConfig::default()
    };
    assert_eq!(
        action_for(PassOutcome::Converged, &config).unwrap(),
        Action::requeue(Duration::from_secs(300))
    );
}

#[test]
pub fn test_requeue_with_delay() {
    let outcome = PassOutcome::Requeue {
        step: "updatePods",
        requeue: Requeue::Message {
            message: "Waiting for the lock to update pods".to_string(),
            delay: Some(Duration::from_secs(15)),
        },
    };
    assert_eq!(
        action_for(outcome, &ControllerConfig::default()).unwrap(),
        Action::requeue(Duration::from_secs(15))
    );
}

#[test]
pub fn test_immediate_requeue() {
    let outcome = PassOutcome::Requeue {
        step: "replaceFailedProcessGroups",
        requeue: Requeue::Message {
            message: "Removals have been updated in the cluster status".to_string(),
            delay: None,
        },
    };
    assert_eq!(
        action_for(outcome, &ControllerConfig::default()).unwrap(),
        Action::requeue(Duration::ZERO)
    );
}

#[test]
pub fn test_requeue_with_error() {
    let outcome = PassOutcome::Requeue {
        step: "updatePods",
        requeue: Requeue::Error(Error::LockClientFailed("unreachable".to_string())),
    };
    match action_for(outcome, &ControllerConfig::default()) {
        Err(Error::LockClientFailed(message)) => assert_eq!(message, "unreachable"),
        other => panic!("expected the step error, got {:?}", other),
    }
}

/// SlowStep stands in for an external call that never answers in time.
struct SlowStep {
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ClusterSubReconciler for SlowStep {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn reconcile(
        &self,
        _ctx: &ReconcileContext<'_>,
        _cluster: &mut FoundationDBCluster,
    ) -> StepOutcome {
        tokio::time::sleep(Duration::from_secs(30)).await;
        self.log.lock().push("slow");
        StepOutcome::Continue
    }
}

struct LastStep {
    log: Arc<Mutex<Vec<&'static str>>>,
}

#[async_trait]
impl ClusterSubReconciler for LastStep {
    fn name(&self) -> &'static str {
        "last"
    }

    async fn reconcile(
        &self,
        _ctx: &ReconcileContext<'_>,
        _cluster: &mut FoundationDBCluster,
    ) -> StepOutcome {
        self.log.lock().push("last");
        StepOutcome::Continue
    }
}

fn reconciler_with_slow_step(
    harness: &TestHarness,
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> ClusterReconciler {
    ClusterReconciler::with_steps(
        harness.platform.clone(),
        harness.database.clone(),
        harness.recorder.clone(),
        harness.config.clone(),
        vec![
            Box::new(SlowStep { log: log.clone() }),
            Box::new(LastStep { log: log.clone() }),
        ],
    )
}

#[tokio::test]
pub async fn test_pass_past_deadline_is_an_error() {
    let harness = TestHarness::new(vec![]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let reconciler = reconciler_with_slow_step(&harness, &log);
    let mut cluster = create_default_cluster();

    let deadline = Duration::from_millis(50);
    match reconcile_with_deadline(&reconciler, &mut cluster, deadline).await {
        Err(Error::ReconcileTimeout(elapsed)) => assert_eq!(elapsed, deadline),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(log.lock().is_empty());
    assert!(harness.platform.persisted_statuses().is_empty());
}

#[tokio::test]
pub async fn test_pass_within_deadline() {
    let harness = TestHarness::new(vec![]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let reconciler = ClusterReconciler::with_steps(
        harness.platform.clone(),
        harness.database.clone(),
        harness.recorder.clone(),
        harness.config.clone(),
        vec![Box::new(LastStep { log: log.clone() })],
    );
    let mut cluster = create_default_cluster();

    let action = reconcile_with_deadline(&reconciler, &mut cluster, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(action, Action::requeue(harness.config.resync_interval));
    assert_eq!(*log.lock(), vec!["last"]);
}
