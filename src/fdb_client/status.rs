// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;

/// The subset of the database's machine-readable status the reconcilers rely on.
#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct DatabaseStatus {
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default)]
    pub cluster: ClusterInfo,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct ClientInfo {
    #[serde(default)]
    pub database_status: DatabaseAvailability,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct DatabaseAvailability {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub healthy: bool,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct ClusterInfo {
    #[serde(default)]
    pub fault_tolerance: FaultTolerance,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessInfo>,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct FaultTolerance {
    #[serde(default)]
    pub max_zone_failures_without_losing_data: i32,
    #[serde(default)]
    pub max_zone_failures_without_losing_availability: i32,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct ProcessInfo {
    pub address: String,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub locality: BTreeMap<String, String>,
}

impl DatabaseStatus {
    pub fn available(&self) -> bool {
        self.client.database_status.available
    }

    pub fn max_zone_failures_without_losing_data(&self) -> i32 {
        self.cluster.fault_tolerance.max_zone_failures_without_losing_data
    }

    /// The database can absorb losing another zone: it is available and keeps
    /// all data with at least one more zone failure.
    pub fn can_tolerate_zone_failure(&self) -> bool {
        self.available() && self.max_zone_failures_without_losing_data() > 0
    }
}
