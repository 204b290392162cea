// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::{FoundationDBCluster, ProcessSettings};
use crate::process_group::ProcessClass;
use crate::Error;
use k8s_openapi::api::core::v1::Pod;
use sha2::{Digest, Sha256};

pub const FDB_CLUSTER_LABEL: &str = "foundationdb.org/fdb-cluster-name";
pub const FDB_PROCESS_CLASS_LABEL: &str = "foundationdb.org/fdb-process-class";
pub const FDB_PROCESS_GROUP_ID_LABEL: &str = "foundationdb.org/fdb-process-group-id";
pub const LAST_SPEC_KEY: &str = "foundationdb.org/last-applied-spec";

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct DesiredPodConfig<'a> {
    version: &'a str,
    process_class: &'a str,
    id_num: i64,
    settings: Option<&'a ProcessSettings>,
}

/// pod_spec_hash computes the hash of the configuration a pod for the given
/// process class and instance index should run with. Pods record the hash they
/// were created from in the `LAST_SPEC_KEY` annotation.
pub fn pod_spec_hash(
    cluster: &FoundationDBCluster,
    process_class: &ProcessClass,
    id_num: i64,
) -> Result<String, Error> {
    let desired = DesiredPodConfig {
        version: &cluster.spec.version,
        process_class: process_class.as_str(),
        id_num,
        settings: cluster.settings_for_class(process_class.as_str()),
    };
    let encoded = serde_json::to_vec(&desired)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

pub fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}

pub fn pod_label<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub fn pod_annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

pub fn process_class_of(pod: &Pod) -> Result<ProcessClass, Error> {
    pod_label(pod, FDB_PROCESS_CLASS_LABEL)
        .map(ProcessClass::from)
        .ok_or_else(|| Error::MissingProcessClass(pod_name(pod).to_string()))
}

pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|status| status.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// The failure domain a pod runs in. Processes use the node name as their zone
/// ID, so a pod that is not scheduled yet has no locality.
pub fn pod_zone(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.node_name.as_deref())
        .filter(|node| !node.is_empty())
}
