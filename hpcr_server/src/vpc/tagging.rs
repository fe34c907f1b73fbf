//! Global Tagging client and the content-hash tag that stands in for
//! on-prem's in-band metadata hash, grounded on `vpc/tagging.go` and
//! `server/vpc/actions.go`'s `createTag`/`isTag`.

use crate::vpc::{service::VpcService, VpcErrKind};
use hpcr_definitions::Environment;
use serde_json::Value;
use sha2::{Digest, Sha256};

const KEY_GT_ENDPOINT: &str = "IBMCLOUD_GT_API_ENDPOINT";
pub const DEFAULT_GT_ENDPOINT: &str = "https://tags.global-search-tagging.cloud.ibm.com";
pub const TAG_PREFIX: &str = "hpcr_controller";

pub fn global_tagging_endpoint(env: &Environment) -> String {
    env.get(KEY_GT_ENDPOINT).cloned().unwrap_or_else(|| DEFAULT_GT_ENDPOINT.to_string())
}

/// `hpcr_controller:<sha256(userData)>`.
pub fn content_hash_tag(user_data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.input(user_data.as_bytes());
    format!("{}:{:x}", TAG_PREFIX, hasher.result())
}

pub fn has_tag(tags: &[String], expected: &str) -> bool {
    tags.iter().any(|t| t == expected)
}

pub fn attach_tag(service: &VpcService, gt_endpoint: &str, resource_crn: &str, tag: &str) -> crate::Result<()> {
    let url = format!("{}/v3/tags/attach", gt_endpoint);
    let body = serde_json::json!({
        "resources": [{"resource_id": resource_crn}],
        "tag_names": [tag],
        "tag_type": "user",
    });

    let mut response = service
        .client
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .json(&body)
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("AttachTag".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("AttachTag".into(), response.status().as_u16(), resource_crn.to_string()).into());
    }

    let parsed: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("AttachTag".into(), 0, e.to_string()))?;
    let results = parsed["results"].as_array().map(|a| a.len()).unwrap_or(0);
    if results != 1 {
        return Err(VpcErrKind::ApiCallFailed("AttachTag".into(), 0, "unexpected results count".into()).into());
    }
    Ok(())
}

pub fn list_tags(service: &VpcService, gt_endpoint: &str, resource_crn: &str) -> crate::Result<Vec<String>> {
    let url = format!("{}/v3/tags?attached_to={}&tag_type=user", gt_endpoint, resource_crn);
    let mut response = service
        .client
        .get(&url)
        .header(reqwest::header::AUTHORIZATION, service.bearer())
        .send()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListTags".into(), 0, e.to_string()))?;

    if !response.status().is_success() {
        return Err(VpcErrKind::ApiCallFailed("ListTags".into(), response.status().as_u16(), resource_crn.to_string()).into());
    }

    let parsed: Value = response
        .json()
        .map_err(|e| VpcErrKind::ApiCallFailed("ListTags".into(), 0, e.to_string()))?;

    Ok(parsed["items"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["name"].as_str().map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_tag_is_prefixed_and_hex() {
        let tag = content_hash_tag("userdata");
        assert!(tag.starts_with("hpcr_controller:"));
        assert_eq!(tag.len(), TAG_PREFIX.len() + 1 + 64);
    }

    #[test]
    fn has_tag_matches_exact_strings() {
        let tags = vec!["hpcr_controller:deadbeef".to_string(), "other".to_string()];
        assert!(has_tag(&tags, "hpcr_controller:deadbeef"));
        assert!(!has_tag(&tags, "hpcr_controller:cafe"));
    }
}
