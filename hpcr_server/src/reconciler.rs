//! Process-wide sync/finalize/customize dispatch (C8) and the related-resource
//! environment aggregator (C9).
//!
//! Grounded on `server/onprem/onprem.go`, `server/datadisk/datadisk.go`,
//! `server/vpc/instance.go`, `server/common/env.go` and
//! `server/common/resources.go`. The on-prem lock mirrors `server/lock`'s
//! package-level `sync.Mutex`.

use crate::datadisk;
use crate::libvirt::{network, volume, LibvirtClient};
use crate::onprem::{self, cloudinit, console};
use crate::vpc::{self, instance, service::VpcService, subnet, tagging};
use hpcr_definitions::options::{AttachedDataDisk, DataDiskOptions, InstanceOptions, VpcInstanceOptions, DEFAULT_STORAGE_POOL};
use hpcr_definitions::{env as envmod, Environment, LogOutcome, RelatedResourceRule, ResourceStatus, SshConfig};
use serde_json::Value;
use std::sync::Mutex;

lazy_static! {
    /// Serializes every on-prem (domain or data-disk) libvirt mutation across
    /// the process; a reconcile that cannot acquire it immediately reports
    /// `Waiting` rather than blocking (§5).
    static ref ONPREM_LOCK: Mutex<()> = Mutex::new(());
}

const KEY_TARGET_SUBNET_ID: &str = "TARGET_SUBNET_ID";
const KEY_REGION: &str = "IBMCLOUD_REGION";
const DEFAULT_BOOTSTRAP_REGION: &str = "us-south";

fn box_storage_pool(pool: &str) -> String {
    if pool.is_empty() {
        DEFAULT_STORAGE_POOL.to_string()
    } else {
        pool.to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ParentMeta {
    uid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OnPremSpec {
    contract: String,
    #[serde(rename = "imageURL")]
    image_url: String,
    #[serde(default)]
    storage_pool: String,
    #[serde(default)]
    target_selector: Option<String>,
    #[serde(default)]
    disk_selector: Option<String>,
    #[serde(default)]
    network_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataDiskSpec {
    #[serde(default)]
    storage_pool: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    target_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VpcSpec {
    contract: String,
    #[serde(default, rename = "subnetID")]
    subnet_id: Option<String>,
    #[serde(default)]
    profile_name: Option<String>,
    #[serde(default)]
    target_selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Parent<S> {
    metadata: ParentMeta,
    spec: S,
}

#[derive(Debug, Clone, Deserialize)]
struct Request<S> {
    parent: Parent<S>,
}

fn decode_parent<S: serde::de::DeserializeOwned>(body: &Value) -> crate::Result<Parent<S>> {
    Ok(serde_json::from_value::<Request<S>>(body.clone())?.parent)
}

/// Stage one of the two-stage decode (§9): walks `related` generically to
/// build the merged environment, without committing to a typed shape.
fn env_from_related(body: &Value) -> Environment {
    let mut env = Environment::new();
    let related = match body.get("related").and_then(Value::as_object) {
        Some(r) => r,
        None => return env,
    };

    if let Some(items) = related.get(&envmod::related_key("ConfigMap", "v1")).and_then(Value::as_object) {
        for item in items.values() {
            if let Some(data) = string_map(item.get("data")) {
                envmod::merge_config_map_data(&mut env, &data);
            }
        }
    }
    if let Some(items) = related.get(&envmod::related_key("Secret", "v1")).and_then(Value::as_object) {
        for item in items.values() {
            if let Some(data) = string_map(item.get("data")) {
                envmod::merge_secret_data(&mut env, &data);
            }
        }
    }
    env
}

fn string_map(v: Option<&Value>) -> Option<std::collections::BTreeMap<String, String>> {
    let obj = v?.as_object()?;
    Some(obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect())
}

fn related_items<'a>(body: &'a Value, kind: &str, api_version: &str) -> Vec<&'a Value> {
    let key = envmod::related_key(kind, api_version);
    body.get("related")
        .and_then(|r| r.get(&key))
        .and_then(Value::as_object)
        .map(|m| m.values().collect())
        .unwrap_or_default()
}

fn is_ready(item: &Value) -> bool {
    item.get("status").and_then(|s| s.get("status")).and_then(Value::as_u64) == Some(1)
}

fn item_name(item: &Value) -> &str {
    item.get("metadata").and_then(|m| m.get("name")).and_then(Value::as_str).unwrap_or("<unnamed>")
}

/// Collects every ready `DataDisk`/`DataDiskRef` related item into the
/// on-prem instance's attached-disk list (§4.9's on-prem selector table).
/// `DataDisk` volumes are named by resource UID (the provisioner created
/// them); `DataDiskRef` volumes are named by the pre-existing volume they
/// point at.
fn attached_data_disks_from_related(body: &Value) -> Vec<AttachedDataDisk> {
    let mut disks = Vec::new();
    for &(kind, uses_volume_name) in &[("DataDisk", false), ("DataDiskRef", true)] {
        for item in related_items(body, kind, "hpcr.ibm.com/v1") {
            if !is_ready(item) {
                warn!("skipping not-ready related {} [{}]", kind, item_name(item));
                continue;
            }
            let spec = match item.get("spec") {
                Some(s) => s,
                None => continue,
            };
            let name = if uses_volume_name {
                spec.get("volumeName").and_then(Value::as_str)
            } else {
                item.get("metadata").and_then(|m| m.get("uid")).and_then(Value::as_str)
            };
            let name = match name {
                Some(n) => n.to_string(),
                None => continue,
            };
            let storage_pool = spec
                .get("storagePool")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_STORAGE_POOL)
                .to_string();
            disks.push(AttachedDataDisk { name, storage_pool });
        }
    }
    disks
}

/// Collects every ready `NetworkRef`'s network name (§4.9).
fn network_names_from_related(body: &Value) -> Vec<String> {
    related_items(body, "NetworkRef", "hpcr.ibm.com/v1")
        .into_iter()
        .filter(|item| {
            if is_ready(item) {
                true
            } else {
                warn!("skipping not-ready related NetworkRef [{}]", item_name(item));
                false
            }
        })
        .filter_map(|item| item.get("spec")?.get("name")?.as_str().map(str::to_string))
        .collect()
}

/// Runs `body` through the on-prem lock, logging and converting any error
/// into `ResourceStatus::Error` rather than letting it escape the HTTP layer.
fn guarded<F>(action_name: &str, f: F) -> ResourceStatus
where
    F: FnOnce() -> crate::Result<ResourceStatus>,
{
    let _guard = match ONPREM_LOCK.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            info!("{}: on-prem lock held, asking meta-controller to retry", action_name);
            return ResourceStatus::waiting("on-prem lock held");
        }
    };
    match f() {
        Ok(status) => status,
        Err(e) => {
            error!("{} failed: {}", action_name, e);
            ResourceStatus::error(e.to_string())
        }
    }
}

fn onprem_options(parent: &Parent<OnPremSpec>, body: &Value) -> InstanceOptions {
    InstanceOptions {
        name: parent.metadata.uid.clone(),
        user_data: parent.spec.contract.clone(),
        image_url: parent.spec.image_url.clone(),
        storage_pool: box_storage_pool(&parent.spec.storage_pool),
        data_disks: attached_data_disks_from_related(body),
        networks: network_names_from_related(body),
    }
}

/// Fetches the console log for an already-valid (running, matching-hash)
/// domain, classifies it, and builds the resulting status; mirrors
/// `onprem/actions.go`'s `createInstanceRunningAction`.
fn classify_running_instance(
    client: &LibvirtClient,
    ssh_config: &SshConfig,
    self_exe: &str,
    opts: &InstanceOptions,
    domain_xml: &str,
) -> crate::Result<ResourceStatus> {
    let pool = volume::lookup_pool(client, &opts.storage_pool)?;
    let console_name = cloudinit::console_volume_name(&opts.name);
    let console_path = match volume::lookup_volume(&pool, &console_name)? {
        Some(vol) => volume::volume_path(&vol)?,
        None => return Ok(ResourceStatus::waiting("console log volume not found yet")),
    };

    let log = console::read_console_log_via_subprocess(self_exe, ssh_config, &console_path)?;
    let outcome = LogOutcome::scan(&log);

    if outcome.failed {
        warn!("domain [{}] failed to start, log: [{}]", opts.name, log);
        return Ok(ResourceStatus::ready(log).with_metadata("domainXML", Value::String(domain_xml.to_string())));
    }

    if outcome.started {
        let network_names = if opts.networks.is_empty() {
            vec![hpcr_definitions::options::DEFAULT_NETWORK.to_string()]
        } else {
            opts.networks.clone()
        };
        let mut ips = Vec::new();
        for name in &network_names {
            match network::lookup_network(client, name).and_then(|n| network::ip_addresses_for_instance(&n, &opts.name)) {
                Ok(mut found) => ips.append(&mut found),
                Err(e) => warn!("could not read DHCP leases on network [{}]: {}", name, e),
            }
        }
        return Ok(ResourceStatus::ready("instance started successfully")
            .with_metadata("domainXML", Value::String(domain_xml.to_string()))
            .with_metadata("ipaddresses", serde_json::to_value(ips)?));
    }

    info!("domain [{}] is still booting", opts.name);
    Ok(ResourceStatus::waiting(log))
}

fn sync_onprem_impl(self_exe: &str, body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<OnPremSpec>(body)?;
    let opts = onprem_options(&parent, body);

    let ssh_config = SshConfig::from_env_map(&env);
    let client = LibvirtClient::connect(&ssh_config)?;

    let outcome = onprem::provisioner::sync(&client, &opts)?;
    if !outcome.already_valid {
        info!("instance [{}] sync dispatched, waiting for boot", opts.name);
        return Ok(ResourceStatus::waiting("instance created, waiting for boot"));
    }

    classify_running_instance(&client, &ssh_config, self_exe, &opts, &outcome.domain_xml)
}

pub fn sync_onprem(self_exe: &str, body: &Value) -> ResourceStatus {
    guarded("onprem sync", || sync_onprem_impl(self_exe, body))
}

fn finalize_onprem_impl(body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<OnPremSpec>(body)?;
    let opts = InstanceOptions {
        name: parent.metadata.uid,
        user_data: parent.spec.contract,
        image_url: parent.spec.image_url,
        storage_pool: box_storage_pool(&parent.spec.storage_pool),
        data_disks: Vec::new(),
        networks: Vec::new(),
    };

    let ssh_config = SshConfig::from_env_map(&env);
    let client = LibvirtClient::connect(&ssh_config)?;
    onprem::provisioner::finalize(&client, &opts)?;
    Ok(ResourceStatus::ready("instance finalized"))
}

pub fn finalize_onprem(body: &Value) -> ResourceStatus {
    guarded("onprem finalize", || finalize_onprem_impl(body))
}

pub fn customize_onprem(body: &Value) -> crate::Result<Vec<RelatedResourceRule>> {
    let parent = decode_parent::<OnPremSpec>(body)?;
    info!("getting related resources for [{}] in namespace [{}]", parent.metadata.name, parent.metadata.namespace);
    Ok(hpcr_definitions::status::related_resource_rules(
        parent.spec.target_selector.as_deref(),
        parent.spec.disk_selector.as_deref(),
        parent.spec.network_selector.as_deref(),
    ))
}

fn sync_datadisk_impl(body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<DataDiskSpec>(body)?;
    let opts = DataDiskOptions {
        name: parent.metadata.uid,
        storage_pool: box_storage_pool(&parent.spec.storage_pool),
        size: parent.spec.size,
    };

    let ssh_config = SshConfig::from_env_map(&env);
    let client = LibvirtClient::connect(&ssh_config)?;
    datadisk::sync(&client, &opts)
}

pub fn sync_datadisk(body: &Value) -> ResourceStatus {
    guarded("datadisk sync", || sync_datadisk_impl(body))
}

fn finalize_datadisk_impl(body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<DataDiskSpec>(body)?;
    let opts = DataDiskOptions {
        name: parent.metadata.uid,
        storage_pool: box_storage_pool(&parent.spec.storage_pool),
        size: parent.spec.size,
    };

    let ssh_config = SshConfig::from_env_map(&env);
    let client = LibvirtClient::connect(&ssh_config)?;
    datadisk::finalize(&client, &opts)
}

pub fn finalize_datadisk(body: &Value) -> ResourceStatus {
    guarded("datadisk finalize", || finalize_datadisk_impl(body))
}

pub fn customize_datadisk(body: &Value) -> crate::Result<Vec<RelatedResourceRule>> {
    let parent = decode_parent::<DataDiskSpec>(body)?;
    Ok(hpcr_definitions::status::related_resource_rules(parent.spec.target_selector.as_deref(), None, None))
}

/// VPC reconciliation takes no process-wide lock (§5: "the IBM Cloud API is
/// the serialization point"), so it needs to resolve its own service handle
/// per call rather than going through [`guarded`].
fn resolve_vpc_service(env: &Environment, subnet_hint: Option<&str>) -> crate::Result<VpcService> {
    if let Some(region) = env.get(KEY_REGION) {
        return VpcService::from_env(env, region);
    }
    // bootstrap against a placeholder region purely to obtain a bearer token;
    // global search is itself region-independent, so this lets the operator
    // skip pinning IBMCLOUD_REGION when the subnet already implies it
    let bootstrap = VpcService::from_env(env, DEFAULT_BOOTSTRAP_REGION)?;
    let subnet_id = subnet_hint.ok_or_else(|| vpc::VpcErrKind::MissingEnv(KEY_TARGET_SUBNET_ID.into()))?;
    let gs_endpoint = subnet::global_search_endpoint(env);
    let region = subnet::find_region_from_subnet(&bootstrap, &gs_endpoint, subnet_id)?;
    VpcService::from_env(env, &region)
}

fn sync_vpc_impl(body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<VpcSpec>(body)?;

    let subnet_hint = parent.spec.subnet_id.clone().or_else(|| env.get(KEY_TARGET_SUBNET_ID).cloned());
    let service = resolve_vpc_service(&env, subnet_hint.as_deref())?;

    let opts = instance::build_options(
        &service,
        &parent.metadata.uid,
        parent.spec.subnet_id.as_deref(),
        parent.spec.profile_name.as_deref(),
        &parent.spec.contract,
        &env,
    )?;

    let gt_endpoint = tagging::global_tagging_endpoint(&env);
    vpc::provisioner::sync(&service, &gt_endpoint, &opts)
}

pub fn sync_vpc(body: &Value) -> ResourceStatus {
    match sync_vpc_impl(body) {
        Ok(status) => status,
        Err(e) => {
            error!("vpc sync failed: {}", e);
            ResourceStatus::error(e.to_string())
        }
    }
}

fn finalize_vpc_impl(body: &Value) -> crate::Result<ResourceStatus> {
    let env = env_from_related(body);
    let parent = decode_parent::<VpcSpec>(body)?;

    let subnet_hint = parent.spec.subnet_id.clone().or_else(|| env.get(KEY_TARGET_SUBNET_ID).cloned());
    let service = resolve_vpc_service(&env, subnet_hint.as_deref())?;
    let name = VpcInstanceOptions::name_for_uid(&parent.metadata.uid);
    vpc::provisioner::finalize(&service, &name)
}

pub fn finalize_vpc(body: &Value) -> ResourceStatus {
    match finalize_vpc_impl(body) {
        Ok(status) => status,
        Err(e) => {
            error!("vpc finalize failed: {}", e);
            ResourceStatus::error(e.to_string())
        }
    }
}

pub fn customize_vpc(body: &Value) -> crate::Result<Vec<RelatedResourceRule>> {
    let parent = decode_parent::<VpcSpec>(body)?;
    Ok(hpcr_definitions::status::related_resource_rules(parent.spec.target_selector.as_deref(), None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_from_related_merges_config_maps_and_secrets() {
        let body = json!({
            "related": {
                "ConfigMap.v1": {
                    "cm1": {"data": {"IBMCLOUD_IS_API_ENDPOINT": "https://example.com"}}
                },
                "Secret.v1": {
                    "s1": {"data": {"IBMCLOUD_API_KEY": base64::encode("xxx")}}
                }
            }
        });
        let env = env_from_related(&body);
        assert_eq!(env.get("IBMCLOUD_IS_API_ENDPOINT").map(String::as_str), Some("https://example.com"));
        assert_eq!(env.get("IBMCLOUD_API_KEY").map(String::as_str), Some("xxx"));
    }

    #[test]
    fn attached_data_disks_skips_not_ready_items() {
        let body = json!({
            "related": {
                "DataDisk.hpcr.ibm.com/v1": {
                    "d1": {"metadata": {"uid": "disk-1", "name": "d1"}, "spec": {"storagePool": "images"}, "status": {"status": 1}},
                    "d2": {"metadata": {"uid": "disk-2", "name": "d2"}, "spec": {}, "status": {"status": 0}}
                }
            }
        });
        let disks = attached_data_disks_from_related(&body);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].name, "disk-1");
        assert_eq!(disks[0].storage_pool, "images");
    }

    #[test]
    fn attached_data_disk_refs_use_the_referenced_volume_name() {
        let body = json!({
            "related": {
                "DataDiskRef.hpcr.ibm.com/v1": {
                    "r1": {"metadata": {"uid": "ref-uid"}, "spec": {"volumeName": "preexisting-vol"}, "status": {"status": 1}}
                }
            }
        });
        let disks = attached_data_disks_from_related(&body);
        assert_eq!(disks.len(), 1);
        assert_eq!(disks[0].name, "preexisting-vol");
        assert_eq!(disks[0].storage_pool, DEFAULT_STORAGE_POOL);
    }

    #[test]
    fn network_names_from_related_filters_by_readiness() {
        let body = json!({
            "related": {
                "NetworkRef.hpcr.ibm.com/v1": {
                    "n1": {"metadata": {"name": "n1"}, "spec": {"name": "mynet"}, "status": {"status": 1}},
                    "n2": {"metadata": {"name": "n2"}, "spec": {"name": "othernet"}, "status": {"status": 0}}
                }
            }
        });
        let networks = network_names_from_related(&body);
        assert_eq!(networks, vec!["mynet".to_string()]);
    }
}
