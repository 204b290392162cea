// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::Error;
use std::collections::HashMap;
use std::time::Duration;

fn from_vars(vars: &[(&str, &str)]) -> Result<ControllerConfig, Error> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    ControllerConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
pub fn test_defaults_without_overrides() {
    assert_eq!(from_vars(&[]).unwrap(), ControllerConfig::default());
}

#[test]
pub fn test_overrides() {
    let config = from_vars(&[
        ("FDB_RECONCILE_TIMEOUT_SECONDS", "5"),
        ("FDB_POD_SCHEDULING_DELAY_SECONDS", " 30 "),
        ("FDB_ERROR_REQUEUE_SECONDS", "1"),
        ("FDB_RESYNC_SECONDS", "600"),
        ("FDB_IN_SIMULATION", "true"),
        ("FDB_LOCK_OWNER", "operator-a"),
    ])
    .unwrap();
    assert_eq!(config.reconcile_timeout, Duration::from_secs(5));
    assert_eq!(config.pod_scheduling_delay, Duration::from_secs(30));
    assert_eq!(config.error_requeue_delay, Duration::from_secs(1));
    assert_eq!(config.resync_interval, Duration::from_secs(600));
    assert!(config.in_simulation);
    assert_eq!(config.lock_owner, "operator-a");
}

#[test]
pub fn test_invalid_values() {
    match from_vars(&[("FDB_RESYNC_SECONDS", "soon")]) {
        Err(Error::InvalidConfig(message)) => assert_eq!(message, "FDB_RESYNC_SECONDS=\"soon\""),
        other => panic!("expected invalid config, got {:?}", other),
    }
    assert!(matches!(
        from_vars(&[("FDB_IN_SIMULATION", "yes")]),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        from_vars(&[("FDB_RECONCILE_TIMEOUT_SECONDS", "-1")]),
        Err(Error::InvalidConfig(_))
    ));
}
