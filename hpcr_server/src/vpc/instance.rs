//! VPC instance CRUD and desired-options construction, grounded on
//! `vpc/instance.go`'s `FindInstance`/`CreateVpcInstanceOptions` and
//! `InstanceOptionsFromConfigMap`.

use crate::vpc::{image, service::VpcService, subnet, VpcErrKind};
use hpcr_definitions::options::VpcInstanceOptions;
use hpcr_definitions::Environment;
use serde_json::{json, Value};

const API_VERSION: &str = "2023-01-01";
const API_GENERATION: &str = "2";

const KEY_TARGET_IMAGE_NAME: &str = "TARGET_IMAGE_NAME";
const KEY_TARGET_PROFILE: &str = "TARGET_PROFILE";
const KEY_SUBNET_ID: &str = "TARGET_SUBNET_ID";
const DEFAULT_PROFILE_NAME: &str = "bz2e-2x8";

/// The subset of a VPC instance's JSON representation the provisioner needs
/// to judge validity; `raw` is kept verbatim for the `Ready` response metadata.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub crn: String,
    pub status: String,
    pub vpc_id: String,
    pub zone_name: String,
    pub image_id: String,
    pub profile_name: String,
    pub subnet_id: String,
    pub raw: Value,
}

impl Instance {
    fn from_json(v: &Value) -> Instance {
        Instance {
            id: v["id"].as_str().unwrap_or_default().to_string(),
            crn: v["crn"].as_str().unwrap_or_default().to_string(),
            status: v["status"].as_str().unwrap_or_default().to_string(),
            vpc_id: v["vpc"]["id"].as_str().unwrap_or_default().to_string(),
            zone_name: v["zone"]["name"].as_str().unwrap_or_default().to_string(),
            image_id: v["image"]["id"].as_str().unwrap_or_default().to_string(),
            profile_name: v["profile"]["name"].as_str().unwrap_or_default().to_string(),
            subnet_id: v["primary_network_interface"]["subnet"]["id"].as_str().unwrap_or_default().to_string(),
            raw: v.clone(),
        }
    }
}

/// `None` when no instance by that name exists; `Err` when more than one does.
pub fn find_instance(service: &VpcService, name: &str) -> crate::Result<Option<Instance>> {
    let url = format!(
        "{}/v1/instances?name={}&version={}&generation={}",
        service.api_endpoint, name, API_VERSION, API_GENERATION
    );
    let mut response = service
        .client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListInstances".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("ListInstances".into(), response.status().as_u16(), name.to_string()).into());
    }

    let body: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListInstances".into(), 0, e.to_string()))?;
    let items = body["instances"].as_array().cloned().unwrap_or_default();

    match items.len() {
        0 => Ok(None),
        1 => Ok(Some(Instance::from_json(&items[0]))),
        n => Err(VpcErrKind::InstanceAmbiguous(n, name.to_string()).into()),
    }
}

pub fn create_instance(service: &VpcService, opts: &VpcInstanceOptions) -> crate::Result<Instance> {
    let url = format!("{}/v1/instances?version={}&generation={}", service.api_endpoint, API_VERSION, API_GENERATION);
    let body = json!({
        "name": opts.name,
        "vpc": {"id": opts.vpc_id},
        "zone": {"name": opts.zone_name},
        "profile": {"name": opts.profile_name},
        "image": {"id": opts.image_id},
        "user_data": opts.user_data,
        "primary_network_interface": {"subnet": {"id": opts.subnet_id}},
    });

    let mut response = service
        .client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .json(&body)
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("CreateInstance".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("CreateInstance".into(), response.status().as_u16(), opts.name.clone()).into());
    }

    let created: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("CreateInstance".into(), 0, e.to_string()))?;
    Ok(Instance::from_json(&created))
}

pub fn delete_instance(service: &VpcService, instance_id: &str) -> crate::Result<()> {
    let url = format!(
        "{}/v1/instances/{}?version={}&generation={}",
        service.api_endpoint, instance_id, API_VERSION, API_GENERATION
    );
    let response = service
        .client
        .delete(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("DeleteInstance".into(), 0, e.to_string()))?;

    if response.status().is_success() || response.status().as_u16() == 404 {
        Ok(())
    } else {
        Err(VpcErrKind::ApiCallFailed("DeleteInstance".into(), response.status().as_u16(), instance_id.to_string()).into())
    }
}

/// Builds the desired [`VpcInstanceOptions`] for a fresh create, resolving
/// subnet/profile/image the way `InstanceOptionsFromConfigMap` does: CRD
/// overrides win, then environment defaults, then the stock-image fallback.
pub fn build_options(
    service: &VpcService,
    uid: &str,
    subnet_id_override: Option<&str>,
    profile_override: Option<&str>,
    user_data: &str,
    env: &Environment,
) -> crate::Result<VpcInstanceOptions> {
    let subnet_id = subnet_id_override
        .map(str::to_string)
        .or_else(|| env.get(KEY_SUBNET_ID).cloned())
        .ok_or_else(|| VpcErrKind::MissingEnv(KEY_SUBNET_ID.into()))?;
    let resolved_subnet = subnet::get_subnet(service, &subnet_id)?;

    let profile_name = profile_override
        .map(str::to_string)
        .or_else(|| env.get(KEY_TARGET_PROFILE).cloned())
        .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());

    let image_id = match env.get(KEY_TARGET_IMAGE_NAME) {
        Some(name) => image::find_image_by_name(service, name)?,
        None => image::find_latest_stock_image(service)?,
    };

    Ok(VpcInstanceOptions {
        name: VpcInstanceOptions::name_for_uid(uid),
        vpc_id: resolved_subnet.vpc_id,
        profile_name,
        image_id,
        zone_name: resolved_subnet.zone_name,
        subnet_id: resolved_subnet.id,
        user_data: user_data.to_string(),
    })
}
