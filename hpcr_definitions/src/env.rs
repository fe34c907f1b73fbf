//! A flat string environment and the merge rules used to build it from
//! related `ConfigMap`/`Secret` objects (C9).
//!
//! Grounded on `server/common/env.go`: config maps merge their `data` map
//! verbatim; secrets are base64-decoded per entry, with decode failures
//! logged and skipped rather than failing the whole reconcile.

use std::collections::BTreeMap;

/// A flat string-to-string environment, the common currency between the CLI,
/// the SSH config round trip and the related-resource aggregator.
pub type Environment = BTreeMap<String, String>;

/// Key under which a related resource's kind/apiVersion pair is looked up in
/// the framework's `related` map: `"<Kind>.<APIVersion>"`.
pub fn related_key(kind: &str, api_version: &str) -> String {
    format!("{}.{}", kind, api_version)
}

/// Merges a `ConfigMap`'s `data` (string values only) into `env`.
pub fn merge_config_map_data(env: &mut Environment, data: &BTreeMap<String, String>) {
    for (k, v) in data {
        env.insert(k.clone(), v.clone());
    }
}

/// Merges a `Secret`'s `data` (base64-encoded values) into `env`, logging and
/// skipping entries whose value does not decode.
pub fn merge_secret_data(env: &mut Environment, data: &BTreeMap<String, String>) {
    for (k, v) in data {
        match base64::decode(v) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(decoded) => {
                    env.insert(k.clone(), decoded);
                }
                Err(e) => warn!("secret key [{}] is not valid utf-8 after decoding: {}", k, e),
            },
            Err(e) => warn!("secret key [{}] is not valid base64: {}", k, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_key_matches_kind_dot_api_version() {
        assert_eq!(related_key("ConfigMap", "v1"), "ConfigMap.v1");
    }

    #[test]
    fn config_map_merge_is_verbatim() {
        let mut env = Environment::new();
        let mut data = BTreeMap::new();
        data.insert(
            "IBMCLOUD_IS_API_ENDPOINT".to_string(),
            "https://us-south-stage01.iaasdev.cloud.ibm.com".to_string(),
        );
        merge_config_map_data(&mut env, &data);
        assert_eq!(
            env.get("IBMCLOUD_IS_API_ENDPOINT").map(String::as_str),
            Some("https://us-south-stage01.iaasdev.cloud.ibm.com")
        );
    }

    #[test]
    fn secret_merge_decodes_base64() {
        let mut env = Environment::new();
        let mut data = BTreeMap::new();
        data.insert(
            "IBMCLOUD_API_KEY".to_string(),
            base64::encode("xxx"),
        );
        merge_secret_data(&mut env, &data);
        assert_eq!(env.get("IBMCLOUD_API_KEY").map(String::as_str), Some("xxx"));
    }

    #[test]
    fn secret_merge_skips_invalid_base64() {
        let mut env = Environment::new();
        let mut data = BTreeMap::new();
        data.insert("BROKEN".to_string(), "not-base64!!".to_string());
        merge_secret_data(&mut env, &data);
        assert!(env.get("BROKEN").is_none());
    }
}
