// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod config;
pub mod controllers;
pub mod crds;
pub mod events;
pub mod fdb_client;
pub mod platform;
pub mod pod_spec;
pub mod process_group;
pub mod shim_layer;


use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Failed to get cluster: {0}")]
    GetClusterFailed(#[source] kube::Error),
    #[error("Failed to list pods: {0}")]
    ListPodsFailed(#[source] kube::Error),
    #[error("Failed to delete pod {0}: {1}")]
    DeletePodFailed(String, #[source] kube::Error),
    #[error("Failed to update cluster status: {0}")]
    UpdateStatusFailed(#[source] kube::Error),
    #[error("Admin client failed: {0}")]
    AdminClientFailed(String),
    #[error("Lock client failed: {0}")]
    LockClientFailed(String),
    #[error("Invalid process group ID: {0:?}")]
    InvalidProcessGroupId(String),
    #[error("Pod {0} has no process class label")]
    MissingProcessClass(String),
    #[error("unknown deletion mode: {0:?}")]
    UnknownDeletionMode(String),
    #[error("Failed to serialize: {0}")]
    SerializeFailed(#[from] serde_json::Error),
    #[error("Reconciliation did not finish within {0:?}")]
    ReconcileTimeout(Duration),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
