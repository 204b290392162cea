// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod replace_failed_process_groups;
pub mod replacements;
pub mod update_pods;

use crate::config::ControllerConfig;
use crate::crds::FoundationDBCluster;
use crate::events::EventRecorder;
use crate::fdb_client::DatabaseClientProvider;
use crate::platform::PlatformClient;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

pub use replace_failed_process_groups::ReplaceFailedProcessGroups;
pub use update_pods::UpdatePods;

/// Requeue stops the current pass and asks for another one.
#[derive(Debug)]
pub enum Requeue {
    /// Run another pass, right away or after the delay.
    Message {
        message: String,
        delay: Option<Duration>,
    },
    /// Retry with the host's error backoff.
    Error(Error),
}

/// StepOutcome is what a reconciliation step reports back to the pipeline.
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    Requeue(Requeue),
}

impl StepOutcome {
    pub fn requeue(message: impl Into<String>) -> Self {
        StepOutcome::Requeue(Requeue::Message {
            message: message.into(),
            delay: None,
        })
    }

    pub fn requeue_after(message: impl Into<String>, delay: Duration) -> Self {
        StepOutcome::Requeue(Requeue::Message {
            message: message.into(),
            delay: Some(delay),
        })
    }

    pub fn error(err: Error) -> Self {
        StepOutcome::Requeue(Requeue::Error(err))
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, StepOutcome::Continue)
    }
}

/// ReconcileContext carries the collaborators of one pass.
pub struct ReconcileContext<'a> {
    pub platform: &'a dyn PlatformClient,
    pub database: &'a dyn DatabaseClientProvider,
    pub recorder: &'a dyn EventRecorder,
    pub config: &'a ControllerConfig,
}

/// ClusterSubReconciler is one step of the reconciliation pipeline. Steps must
/// be idempotent and must persist any status change before returning.
#[async_trait]
pub trait ClusterSubReconciler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(
        &self,
        ctx: &ReconcileContext<'_>,
        cluster: &mut FoundationDBCluster,
    ) -> StepOutcome;
}

#[derive(Debug)]
pub enum PassOutcome {
    /// Every step continued.
    Converged,
    Requeue { step: &'static str, requeue: Requeue },
}

/// ClusterReconciler runs the ordered steps against one cluster object.
pub struct ClusterReconciler {
    platform: Arc<dyn PlatformClient>,
    database: Arc<dyn DatabaseClientProvider>,
    recorder: Arc<dyn EventRecorder>,
    config: ControllerConfig,
    steps: Vec<Box<dyn ClusterSubReconciler>>,
}

pub fn default_steps() -> Vec<Box<dyn ClusterSubReconciler>> {
    vec![Box::new(ReplaceFailedProcessGroups), Box::new(UpdatePods)]
}

impl ClusterReconciler {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        database: Arc<dyn DatabaseClientProvider>,
        recorder: Arc<dyn EventRecorder>,
        config: ControllerConfig,
    ) -> Self {
        Self::with_steps(platform, database, recorder, config, default_steps())
    }

    pub fn with_steps(
        platform: Arc<dyn PlatformClient>,
        database: Arc<dyn DatabaseClientProvider>,
        recorder: Arc<dyn EventRecorder>,
        config: ControllerConfig,
        steps: Vec<Box<dyn ClusterSubReconciler>>,
    ) -> Self {
        ClusterReconciler {
            platform,
            database,
            recorder,
            config,
            steps,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Runs one pass. Later steps see the in-memory mutations of earlier ones;
    /// the pass stops at the first step that does not continue.
    pub async fn reconcile_cluster(&self, cluster: &mut FoundationDBCluster) -> PassOutcome {
        let ctx = ReconcileContext {
            platform: self.platform.as_ref(),
            database: self.database.as_ref(),
            recorder: self.recorder.as_ref(),
            config: &self.config,
        };
        let namespace = cluster.metadata.namespace.clone().unwrap_or_default();
        let name = cluster.metadata.name.clone().unwrap_or_default();

        for step in &self.steps {
            let span = info_span!("reconciler", %namespace, cluster = %name, reconciler = step.name());
            let outcome = step.reconcile(&ctx, cluster).instrument(span).await;
            match outcome {
                StepOutcome::Continue => {
                    debug!(%namespace, cluster = %name, reconciler = step.name(), "Step finished");
                }
                StepOutcome::Requeue(requeue) => {
                    match &requeue {
                        Requeue::Message { message, delay } => info!(
                            %namespace, cluster = %name, reconciler = step.name(), ?delay,
                            "Requeueing: {}", message
                        ),
                        Requeue::Error(err) => warn!(
                            %namespace, cluster = %name, reconciler = step.name(),
                            error = %err, "Step failed, requeueing"
                        ),
                    }
                    return PassOutcome::Requeue {
                        step: step.name(),
                        requeue,
                    };
                }
            }
        }

        if let Err(err) = self.record_reconciled(cluster).await {
            return PassOutcome::Requeue {
                step: "recordReconciled",
                requeue: Requeue::Error(err),
            };
        }
        info!(%namespace, cluster = %name, "Reconciliation complete");
        PassOutcome::Converged
    }

    async fn record_reconciled(&self, cluster: &mut FoundationDBCluster) -> Result<(), Error> {
        let generation = cluster.metadata.generation;
        if generation.is_none() || cluster.generations().reconciled == generation {
            return Ok(());
        }
        cluster.generations_mut().reconciled = generation;
        self.platform.update_status(cluster).await
    }
}
