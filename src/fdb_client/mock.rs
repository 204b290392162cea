// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::FoundationDBCluster;
use crate::fdb_client::status::{DatabaseStatus, ProcessInfo};
use crate::fdb_client::{AdminClient, DatabaseClientProvider, LockClient};
use crate::Error;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct MockAdminState {
    cluster_key: String,
    // (process group id, addresses) as last seen in the cluster status
    process_groups: Vec<(String, Vec<String>)>,
    available: bool,
    max_zone_failures_without_losing_data: i32,
    frozen_status: Option<DatabaseStatus>,
    status_error: Option<String>,
    excluded: BTreeSet<String>,
}

/// MockAdminClient simulates a healthy database built from the cluster status.
/// Handles are cheap clones sharing the same state, so tests can change the
/// simulated database while a reconciler holds a client.
#[derive(Debug, Clone)]
pub struct MockAdminClient {
    state: Arc<Mutex<MockAdminState>>,
}

impl MockAdminClient {
    pub fn new(cluster: &FoundationDBCluster) -> Self {
        let state = MockAdminState {
            cluster_key: cluster.lock_key(),
            process_groups: Vec::new(),
            available: true,
            max_zone_failures_without_losing_data: 1,
            frozen_status: None,
            status_error: None,
            excluded: BTreeSet::new(),
        };
        let client = MockAdminClient {
            state: Arc::new(Mutex::new(state)),
        };
        client.observe_cluster(cluster);
        client
    }

    fn observe_cluster(&self, cluster: &FoundationDBCluster) {
        self.state.lock().process_groups = cluster
            .process_groups()
            .iter()
            .map(|process_group| {
                (
                    process_group.process_group_id.clone(),
                    process_group.addresses.clone(),
                )
            })
            .collect();
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn set_max_zone_failures_without_losing_data(&self, failures: i32) {
        self.state.lock().max_zone_failures_without_losing_data = failures;
    }

    /// Makes get_status return exactly this status until unfrozen.
    pub fn freeze_status(&self, status: Option<DatabaseStatus>) {
        self.state.lock().frozen_status = status;
    }

    pub fn fail_status_with(&self, message: Option<&str>) {
        self.state.lock().status_error = message.map(str::to_string);
    }

    pub fn excluded_addresses(&self) -> Vec<String> {
        self.state.lock().excluded.iter().cloned().collect()
    }
}

#[async_trait]
impl AdminClient for MockAdminClient {
    async fn get_status(&self) -> Result<DatabaseStatus, Error> {
        let state = self.state.lock();
        if let Some(message) = &state.status_error {
            return Err(Error::AdminClientFailed(message.clone()));
        }
        if let Some(status) = &state.frozen_status {
            return Ok(status.clone());
        }

        let mut status = DatabaseStatus::default();
        status.client.database_status.available = state.available;
        status.client.database_status.healthy = state.available;
        status.cluster.fault_tolerance.max_zone_failures_without_losing_data =
            state.max_zone_failures_without_losing_data;
        status
            .cluster
            .fault_tolerance
            .max_zone_failures_without_losing_availability =
            state.max_zone_failures_without_losing_data;
        for (id, addresses) in &state.process_groups {
            for (index, address) in addresses.iter().enumerate() {
                let key = format!("{}-{}", id, index);
                let process = ProcessInfo {
                    address: address.clone(),
                    excluded: state.excluded.contains(address),
                    locality: [("instance_id".to_string(), id.clone())].into(),
                };
                status.cluster.processes.insert(key, process);
            }
        }
        Ok(status)
    }

    async fn exclude_processes(&self, addresses: &[String]) -> Result<(), Error> {
        let mut state = self.state.lock();
        info!(cluster = %state.cluster_key, ?addresses, "Excluding processes");
        state.excluded.extend(addresses.iter().cloned());
        Ok(())
    }

    async fn include_processes(&self, addresses: &[String]) -> Result<(), Error> {
        let mut state = self.state.lock();
        info!(cluster = %state.cluster_key, ?addresses, "Including processes");
        for address in addresses {
            state.excluded.remove(address);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LockTable {
    // lock key -> owner
    holders: HashMap<String, String>,
    // lock keys whose next take_lock call fails with the given message
    failures: HashMap<String, String>,
}

/// MockLockClient takes locks in an in-memory table shared by every client of
/// one provider. Locks are scoped by the cluster's lock key.
#[derive(Debug, Clone)]
pub struct MockLockClient {
    key: String,
    owner: String,
    table: Arc<Mutex<LockTable>>,
}

#[async_trait]
impl LockClient for MockLockClient {
    async fn take_lock(&self, reason: &str) -> Result<bool, Error> {
        let mut table = self.table.lock();
        if let Some(message) = table.failures.remove(&self.key) {
            return Err(Error::LockClientFailed(message));
        }
        let holder = table
            .holders
            .entry(self.key.clone())
            .or_insert_with(|| self.owner.clone());
        let acquired = *holder == self.owner;
        debug!(key = %self.key, owner = %self.owner, holder = %holder, reason, acquired, "Take lock");
        Ok(acquired)
    }

    async fn release_lock(&self) -> Result<(), Error> {
        let mut table = self.table.lock();
        if table.holders.get(&self.key) == Some(&self.owner) {
            table.holders.remove(&self.key);
            debug!(key = %self.key, owner = %self.owner, "Released lock");
        }
        Ok(())
    }
}

/// MockDatabaseClientProvider hands out mock clients, one simulated database
/// per cluster.
#[derive(Debug)]
pub struct MockDatabaseClientProvider {
    owner: String,
    admin_clients: Mutex<HashMap<String, MockAdminClient>>,
    locks: Arc<Mutex<LockTable>>,
}

impl MockDatabaseClientProvider {
    pub fn new(owner: impl Into<String>) -> Self {
        MockDatabaseClientProvider {
            owner: owner.into(),
            admin_clients: Mutex::new(HashMap::new()),
            locks: Arc::new(Mutex::new(LockTable::default())),
        }
    }

    /// Returns the handle to the simulated database of a cluster, creating it
    /// on first use.
    pub fn admin_client_for(&self, cluster: &FoundationDBCluster) -> MockAdminClient {
        self.admin_clients
            .lock()
            .entry(cluster.lock_key())
            .or_insert_with(|| MockAdminClient::new(cluster))
            .clone()
    }

    /// Makes another owner hold the cluster's lock.
    pub fn hold_lock(&self, cluster: &FoundationDBCluster, owner: &str) {
        self.locks
            .lock()
            .holders
            .insert(cluster.lock_key(), owner.to_string());
    }

    pub fn lock_holder(&self, cluster: &FoundationDBCluster) -> Option<String> {
        self.locks.lock().holders.get(&cluster.lock_key()).cloned()
    }

    pub fn fail_next_lock(&self, cluster: &FoundationDBCluster, message: &str) {
        self.locks
            .lock()
            .failures
            .insert(cluster.lock_key(), message.to_string());
    }
}

#[async_trait]
impl DatabaseClientProvider for MockDatabaseClientProvider {
    async fn get_admin_client(
        &self,
        cluster: &FoundationDBCluster,
    ) -> Result<Box<dyn AdminClient>, Error> {
        let client = self.admin_client_for(cluster);
        client.observe_cluster(cluster);
        Ok(Box::new(client))
    }

    async fn get_lock_client(
        &self,
        cluster: &FoundationDBCluster,
    ) -> Result<Box<dyn LockClient>, Error> {
        Ok(Box::new(MockLockClient {
            key: cluster.lock_key(),
            owner: self.owner.clone(),
            table: self.locks.clone(),
        }))
    }
}
