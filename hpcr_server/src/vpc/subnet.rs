//! Subnet lookup and region discovery, grounded on `vpc/subnet.go` and
//! `vpc/search.go`.

use crate::vpc::{service::VpcService, VpcErrKind};
use hpcr_definitions::Environment;
use regex::Regex;
use serde_json::Value;

const KEY_GS_ENDPOINT: &str = "IBMCLOUD_GS_API_ENDPOINT";
pub const DEFAULT_GS_ENDPOINT: &str = "https://api.global-search-tagging.cloud.ibm.com";

const API_VERSION: &str = "2023-01-01";
const API_GENERATION: &str = "2";

pub fn global_search_endpoint(env: &Environment) -> String {
    env.get(KEY_GS_ENDPOINT).cloned().unwrap_or_else(|| DEFAULT_GS_ENDPOINT.to_string())
}

pub struct Subnet {
    pub id: String,
    pub vpc_id: String,
    pub zone_name: String,
}

pub fn get_subnet(service: &VpcService, subnet_id: &str) -> crate::Result<Subnet> {
    let url = format!(
        "{}/v1/subnets/{}?version={}&generation={}",
        service.api_endpoint, subnet_id, API_VERSION, API_GENERATION
    );
    let mut response = service
        .client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("GetSubnet".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("GetSubnet".into(), response.status().as_u16(), subnet_id.to_string()).into());
    }

    let body: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("GetSubnet".into(), 0, e.to_string()))?;

    Ok(Subnet {
        id: body["id"].as_str().unwrap_or_default().to_string(),
        vpc_id: body["vpc"]["id"].as_str().unwrap_or_default().to_string(),
        zone_name: body["zone"]["name"].as_str().unwrap_or_default().to_string(),
    })
}

/// `^([a-zA-Z]+(?:-[a-zA-Z]+)+)(?:-\d+)?$`: strips a trailing zone number
/// (e.g. `us-south-1` → `us-south`).
fn region_identifier_re() -> Regex {
    Regex::new(r"^([a-zA-Z]+(?:-[a-zA-Z]+)+)(?:-\d+)?$").expect("valid regex")
}

/// Issues a global-search query for the subnet and reads back its `region`
/// property, stripping any trailing zone suffix.
pub fn find_region_from_subnet(service: &VpcService, gs_endpoint: &str, subnet_id: &str) -> crate::Result<String> {
    let url = format!("{}/v3/resources/search", gs_endpoint);
    let query = format!("type:subnet AND resource_id:{} AND service_name:is", subnet_id);
    let body = serde_json::json!({ "query": query, "fields": ["region"], "limit": 1 });

    let mut response = service
        .client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .json(&body)
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("GlobalSearch".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("GlobalSearch".into(), response.status().as_u16(), subnet_id.to_string()).into());
    }

    let parsed: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("GlobalSearch".into(), 0, e.to_string()))?;

    let region = parsed["items"]
        .as_array()
        .and_then(|items| items.first())
        .and_then(|item| item["region"].as_str())
        .ok_or_else(|| VpcErrKind::RegionNotFound(subnet_id.to_string()))?;

    region_identifier_re()
        .captures(region)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| VpcErrKind::RegionNotFound(subnet_id.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_regex_strips_trailing_zone_number() {
        let caps = region_identifier_re().captures("us-south-1").unwrap();
        assert_eq!(&caps[1], "us-south");
    }

    #[test]
    fn region_regex_accepts_bare_regions() {
        let caps = region_identifier_re().captures("eu-de").unwrap();
        assert_eq!(&caps[1], "eu-de");
    }
}
