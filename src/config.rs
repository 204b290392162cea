// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::Error;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// ControllerConfig holds the host-level tunables of the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Upper bound for one reconciliation pass.
    pub reconcile_timeout: Duration,
    /// Delay for requeues that wait on pods or on the database to settle.
    pub pod_scheduling_delay: Duration,
    /// Delay before retrying a pass that ended with an error.
    pub error_requeue_delay: Duration,
    /// Delay before re-checking a converged cluster.
    pub resync_interval: Duration,
    /// Puts every pod into the same zone.
    pub in_simulation: bool,
    /// Identity used when taking cluster locks.
    pub lock_owner: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            reconcile_timeout: Duration::from_secs(60),
            pod_scheduling_delay: Duration::from_secs(15),
            error_requeue_delay: Duration::from_secs(10),
            resync_interval: Duration::from_secs(60),
            in_simulation: false,
            lock_owner: "fdb-controller".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let defaults = ControllerConfig::default();
        let seconds = |key: &str, default: Duration| -> Result<Duration, Error> {
            match lookup(key) {
                Some(value) => parse::<u64>(key, &value).map(Duration::from_secs),
                None => Ok(default),
            }
        };
        Ok(ControllerConfig {
            reconcile_timeout: seconds("FDB_RECONCILE_TIMEOUT_SECONDS", defaults.reconcile_timeout)?,
            pod_scheduling_delay: seconds(
                "FDB_POD_SCHEDULING_DELAY_SECONDS",
                defaults.pod_scheduling_delay,
            )?,
            error_requeue_delay: seconds("FDB_ERROR_REQUEUE_SECONDS", defaults.error_requeue_delay)?,
            resync_interval: seconds("FDB_RESYNC_SECONDS", defaults.resync_interval)?,
            in_simulation: match lookup("FDB_IN_SIMULATION") {
                Some(value) => parse::<bool>("FDB_IN_SIMULATION", &value)?,
                None => defaults.in_simulation,
            },
            lock_owner: lookup("FDB_LOCK_OWNER").unwrap_or(defaults.lock_owner),
        })
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{}={:?}", key, value)))
}
