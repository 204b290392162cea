// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::FoundationDBCluster;
use async_trait::async_trait;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource,
};
use parking_lot::Mutex;
use tracing::warn;

/// EventRecorder publishes operator-visible events about a cluster.
/// Publishing is best effort and never fails a reconciliation.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn publish(
        &self,
        cluster: &FoundationDBCluster,
        type_: EventType,
        reason: &str,
        note: String,
    );
}

pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller: &str) -> Self {
        KubeEventRecorder {
            client,
            reporter: Reporter {
                controller: controller.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        cluster: &FoundationDBCluster,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            cluster.object_ref(&()),
        );
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: reason.to_string(),
            secondary: None,
        };
        if let Err(err) = recorder.publish(event).await {
            warn!(reason, error = %err, "Failed to publish event");
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub cluster: String,
    pub type_: EventType,
    pub reason: String,
    pub note: String,
}

/// MemoryEventRecorder keeps published events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryEventRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventRecorder for MemoryEventRecorder {
    async fn publish(
        &self,
        cluster: &FoundationDBCluster,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        self.events.lock().push(RecordedEvent {
            cluster: cluster.lock_key(),
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}
