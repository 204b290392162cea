// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::Error;
use std::collections::BTreeMap;
use std::fmt;

/// Observed health conditions of a process group.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
pub enum ProcessGroupConditionType {
    MissingProcesses,
    IncorrectPodSpec,
    IncorrectConfigMap,
    PodFailing,
    PodPending,
    MissingPod,
    SidecarUnreachable,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessClass {
    Storage,
    Log,
    Transaction,
    Stateless,
    ClusterController,
    Other(String),
}

impl ProcessClass {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessClass::Storage => "storage",
            ProcessClass::Log => "log",
            ProcessClass::Transaction => "transaction",
            ProcessClass::Stateless => "stateless",
            ProcessClass::ClusterController => "cluster_controller",
            ProcessClass::Other(name) => name,
        }
    }
}

impl From<&str> for ProcessClass {
    fn from(name: &str) -> Self {
        match name {
            "storage" => ProcessClass::Storage,
            "log" => ProcessClass::Log,
            "transaction" => ProcessClass::Transaction,
            "stateless" => ProcessClass::Stateless,
            "cluster_controller" => ProcessClass::ClusterController,
            other => ProcessClass::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ProcessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits a process group ID of the form `[<prefix>-]<class>-<index>` into its
/// process class and numeric index.
pub fn parse_process_group_id(id: &str) -> Result<(ProcessClass, i64), Error> {
    let invalid = || Error::InvalidProcessGroupId(id.to_string());
    let (prefix, index) = id.rsplit_once('-').ok_or_else(invalid)?;
    let index = index.parse::<i64>().map_err(|_| invalid())?;
    let class = prefix.rsplit('-').next().unwrap_or(prefix);
    if class.is_empty()
        || !class
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '_')
    {
        return Err(invalid());
    }
    Ok((ProcessClass::from(class), index))
}

/// ProcessGroupStatus tracks one database process and the pod that hosts it.
#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessGroupStatus {
    #[serde(rename = "processGroupID")]
    pub process_group_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    // Condition kind -> unix timestamp of the first observation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub process_group_conditions: BTreeMap<ProcessGroupConditionType, i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remove: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub exclusion_skipped: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub excluded: bool,
}

impl ProcessGroupStatus {
    pub fn new(process_group_id: impl Into<String>, addresses: Vec<String>) -> Self {
        ProcessGroupStatus {
            process_group_id: process_group_id.into(),
            addresses,
            ..ProcessGroupStatus::default()
        }
    }

    pub fn class_and_index(&self) -> Result<(ProcessClass, i64), Error> {
        parse_process_group_id(&self.process_group_id)
    }

    /// Records a condition, keeping the original timestamp when the condition
    /// is already present.
    pub fn add_condition(&mut self, condition: ProcessGroupConditionType, now: i64) {
        self.process_group_conditions.entry(condition).or_insert(now);
    }

    pub fn remove_condition(&mut self, condition: ProcessGroupConditionType) {
        self.process_group_conditions.remove(&condition);
    }

    pub fn condition_time(&self, condition: ProcessGroupConditionType) -> Option<i64> {
        self.process_group_conditions.get(&condition).copied()
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.remove
    }

    pub fn mark_for_removal(&mut self) {
        self.remove = true;
    }

    pub fn is_excluded(&self) -> bool {
        self.excluded
    }

    pub fn set_excluded(&mut self) {
        self.excluded = true;
    }

    pub fn is_pending(&self) -> bool {
        self.process_group_conditions
            .contains_key(&ProcessGroupConditionType::PodPending)
    }

    /// A process group needs replacement once its processes have been missing
    /// for longer than the failure detection window.
    pub fn needs_replacement(&self, failure_detection_time_seconds: i64, now: i64) -> bool {
        match self.condition_time(ProcessGroupConditionType::MissingProcesses) {
            Some(missing_since) => {
                now.saturating_sub(missing_since) > failure_detection_time_seconds
            }
            None => false,
        }
    }
}
