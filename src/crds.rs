// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::process_group::ProcessGroupStatus;
use crate::Error;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_FAILURE_DETECTION_TIME_SECONDS: i64 = 1800;
pub const DEFAULT_MAX_CONCURRENT_REPLACEMENTS: i32 = 1;

#[derive(
    kube::CustomResource,
    Default,
    Debug,
    Clone,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
    PartialEq,
)]
#[kube(group = "apps.foundationdb.org", version = "v1beta1", kind = "FoundationDBCluster")]
#[kube(shortname = "fdb", namespaced)]
#[kube(status = "FoundationDBClusterStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterSpec {
    pub version: String,
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessSettings>,
    #[serde(default)]
    pub automation_options: AutomationOptions,
    #[serde(default)]
    pub update_pods_by_replacement: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_groups_to_remove: Vec<String>,
    #[serde(default)]
    pub lock_options: LockOptions,
}

/// Settings shared by every process of one class. The `general` entry applies
/// to classes without their own entry.
#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_parameters: Vec<String>,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_pods: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_mode: Option<String>,
    #[serde(default)]
    pub replacements: AutomationReplacementOptions,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationReplacementOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detection_time_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_replacements: Option<i32>,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_locks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_key_prefix: Option<String>,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FoundationDBClusterStatus {
    #[serde(default)]
    pub process_groups: Vec<ProcessGroupStatus>,
    #[serde(default)]
    pub generations: ClusterGenerationStatus,
}

#[derive(Default, Debug, Clone, serde::Deserialize, serde::Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterGenerationStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciled: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_pod_deletion: Option<i64>,
}

/// The granularity at which stale pods are recreated in one pass. Accepts
/// both `ProcessGroup` and `process-group` spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionMode {
    All,
    Zone,
    ProcessGroup,
}

impl FromStr for DeletionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" | "all" => Ok(DeletionMode::All),
            "Zone" | "zone" => Ok(DeletionMode::Zone),
            "ProcessGroup" | "process-group" => Ok(DeletionMode::ProcessGroup),
            other => Err(Error::UnknownDeletionMode(other.to_string())),
        }
    }
}

impl fmt::Display for DeletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionMode::All => write!(f, "All"),
            DeletionMode::Zone => write!(f, "Zone"),
            DeletionMode::ProcessGroup => write!(f, "ProcessGroup"),
        }
    }
}

impl FoundationDBCluster {
    pub fn process_groups(&self) -> &[ProcessGroupStatus] {
        self.status
            .as_ref()
            .map(|status| status.process_groups.as_slice())
            .unwrap_or_default()
    }

    pub fn process_groups_mut(&mut self) -> &mut Vec<ProcessGroupStatus> {
        &mut self.status.get_or_insert_with(Default::default).process_groups
    }

    pub fn generations(&self) -> ClusterGenerationStatus {
        self.status
            .as_ref()
            .map(|status| status.generations.clone())
            .unwrap_or_default()
    }

    pub fn generations_mut(&mut self) -> &mut ClusterGenerationStatus {
        &mut self.status.get_or_insert_with(Default::default).generations
    }

    pub fn find_process_group_by_id(&self, id: &str) -> Option<&ProcessGroupStatus> {
        self.process_groups()
            .iter()
            .find(|process_group| process_group.process_group_id == id)
    }

    pub fn find_process_group_by_id_mut(&mut self, id: &str) -> Option<&mut ProcessGroupStatus> {
        self.process_groups_mut()
            .iter_mut()
            .find(|process_group| process_group.process_group_id == id)
    }

    /// A process group is being removed when it is marked for removal or the
    /// operator listed it in `processGroupsToRemove`.
    pub fn process_group_is_being_removed(&self, id: &str) -> bool {
        self.spec.process_groups_to_remove.iter().any(|to_remove| to_remove == id)
            || self
                .find_process_group_by_id(id)
                .map_or(false, ProcessGroupStatus::is_marked_for_removal)
    }

    /// Pending process groups have no running pod to act on yet.
    pub fn skip_process_group(&self, process_group: &ProcessGroupStatus) -> bool {
        process_group.is_pending()
    }

    pub fn automatic_replacements_enabled(&self) -> bool {
        self.spec.automation_options.replacements.enabled.unwrap_or(true)
    }

    /// Absent means the default cap of one; zero or a negative value disables
    /// replacements.
    pub fn max_concurrent_replacements(&self) -> i32 {
        self.spec
            .automation_options
            .replacements
            .max_concurrent_replacements
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REPLACEMENTS)
            .max(0)
    }

    pub fn failure_detection_time_seconds(&self) -> i64 {
        self.spec
            .automation_options
            .replacements
            .failure_detection_time_seconds
            .unwrap_or(DEFAULT_FAILURE_DETECTION_TIME_SECONDS)
    }

    pub fn pod_deletion_enabled(&self) -> bool {
        self.spec.automation_options.delete_pods.unwrap_or(true)
    }

    pub fn deletion_mode(&self) -> Result<DeletionMode, Error> {
        match &self.spec.automation_options.deletion_mode {
            Some(mode) => mode.parse(),
            None => Ok(DeletionMode::Zone),
        }
    }

    pub fn should_use_locks(&self) -> bool {
        !self.spec.lock_options.disable_locks.unwrap_or(false)
    }

    /// The key scoping locks and mock database state to this cluster.
    pub fn lock_key(&self) -> String {
        match &self.spec.lock_options.lock_key_prefix {
            Some(prefix) => prefix.clone(),
            None => format!(
                "{}/{}",
                self.metadata.namespace.as_deref().unwrap_or_default(),
                self.metadata.name.as_deref().unwrap_or_default()
            ),
        }
    }

    pub fn settings_for_class(&self, process_class: &str) -> Option<&ProcessSettings> {
        self.spec
            .processes
            .get(process_class)
            .or_else(|| self.spec.processes.get("general"))
    }
}
