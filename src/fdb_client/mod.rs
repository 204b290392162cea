// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod mock;
pub mod status;

use crate::crds::FoundationDBCluster;
use crate::Error;
use async_trait::async_trait;
use tracing::warn;

pub use mock::{MockAdminClient, MockDatabaseClientProvider, MockLockClient};
pub use status::DatabaseStatus;

// The reconcilers never talk to the database directly. Everything they need
// from it goes through these traits, so a concrete client (or the in-memory
// mock) can be plugged in by the host.

/// AdminClient performs administrative actions against the database.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn get_status(&self) -> Result<DatabaseStatus, Error>;

    async fn exclude_processes(&self, addresses: &[String]) -> Result<(), Error>;

    async fn include_processes(&self, addresses: &[String]) -> Result<(), Error>;

    async fn close(&self) -> Result<(), Error>;
}

/// LockClient takes the cluster-wide lock that serializes destructive actions
/// between operator instances. Taking a lock the caller already holds succeeds.
#[async_trait]
pub trait LockClient: Send + Sync {
    async fn take_lock(&self, reason: &str) -> Result<bool, Error>;

    async fn release_lock(&self) -> Result<(), Error>;
}

/// DatabaseClientProvider creates the clients that talk to one cluster's database.
#[async_trait]
pub trait DatabaseClientProvider: Send + Sync {
    async fn get_admin_client(
        &self,
        cluster: &FoundationDBCluster,
    ) -> Result<Box<dyn AdminClient>, Error>;

    async fn get_lock_client(
        &self,
        cluster: &FoundationDBCluster,
    ) -> Result<Box<dyn LockClient>, Error>;
}

/// can_delete_pods checks whether the database can currently absorb losing the
/// processes of the pods that are about to be recreated.
pub async fn can_delete_pods(admin_client: &dyn AdminClient) -> Result<bool, Error> {
    let status = admin_client.get_status().await?;
    Ok(status.can_tolerate_zone_failure())
}

/// Closes an admin client, logging instead of failing since the result of the
/// surrounding work is already decided.
pub async fn close_admin_client(admin_client: Box<dyn AdminClient>) {
    if let Err(err) = admin_client.close().await {
        warn!(error = %err, "Failed to close admin client");
    }
}

/// HeldLock owns a lock that was taken successfully. `release` gives it back;
/// dropping it without releasing (for example when the pass is cancelled by
/// its deadline) releases it on a background task.
pub struct HeldLock {
    client: Option<Box<dyn LockClient>>,
}

impl HeldLock {
    pub fn new(client: Box<dyn LockClient>) -> Self {
        HeldLock {
            client: Some(client),
        }
    }

    pub async fn release(mut self) {
        if let Some(client) = self.client.take() {
            release_lock(client).await;
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(release_lock(client));
                }
                Err(_) => warn!("Dropped a held lock outside of a runtime, it was not released"),
            }
        }
    }
}

async fn release_lock(client: Box<dyn LockClient>) {
    if let Err(err) = client.release_lock().await {
        warn!(error = %err, "Failed to release lock");
    }
}
