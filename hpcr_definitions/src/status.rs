//! The result of a reconcile call: [`Status`]/[`ResourceStatus`] returned from
//! `sync`/`finalize`, and [`RelatedResourceRule`] returned from `customize`.
//!
//! Mirrors `server/common/actions.go`: the wire shape nests `status` and
//! omits the raw `error` field entirely (`description` already carries
//! `err.to_string()` when present).

use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::collections::BTreeMap;

/// Outcome of a single reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Status {
    Waiting = 0,
    Ready = 1,
    Error = 2,
}

/// Every `sync`/`finalize` response, independent of kind.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub status: Status,
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// Reconcile calls that are not `Ready` ask the meta-controller to retry after this long.
pub const RESYNC_AFTER_SECONDS: u64 = 10;

impl ResourceStatus {
    pub fn waiting<S: Into<String>>(description: S) -> Self {
        ResourceStatus {
            status: Status::Waiting,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn ready<S: Into<String>>(description: S) -> Self {
        ResourceStatus {
            status: Status::Ready,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn error<S: Into<String>>(description: S) -> Self {
        ResourceStatus {
            status: Status::Error,
            description: description.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata<S: Into<String>>(mut self, key: S, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the HTTP layer should attach `resyncAfterSeconds` to the response.
    pub fn resync_after_seconds(&self) -> Option<u64> {
        match self.status {
            Status::Ready => None,
            _ => Some(RESYNC_AFTER_SECONDS),
        }
    }
}

/// One related-resource selection rule returned from `customize`, matching
/// `server/common/resources.go`'s `RelatedResource` triple.
#[derive(Debug, Clone, Serialize)]
pub struct RelatedResourceRule {
    pub api_version: String,
    pub resource_kind: String,
    pub label_selector: String,
}

impl RelatedResourceRule {
    pub fn new<A, K, S>(api_version: A, resource_kind: K, label_selector: Option<S>) -> Option<Self>
    where
        A: Into<String>,
        K: Into<String>,
        S: Into<String>,
    {
        label_selector.map(|selector| RelatedResourceRule {
            api_version: api_version.into(),
            resource_kind: resource_kind.into(),
            label_selector: selector.into(),
        })
    }
}

/// Builds the `customize` rule set for a given kind's target/disk/network selectors,
/// filtering out any rule whose selector is absent (spec §4.9: "rules with a nil
/// selector must be filtered out").
pub fn related_resource_rules(
    target_selector: Option<&str>,
    disk_selector: Option<&str>,
    network_selector: Option<&str>,
) -> Vec<RelatedResourceRule> {
    let mut rules = Vec::new();
    if let Some(rule) = RelatedResourceRule::new("v1", "ConfigMap", target_selector) {
        rules.push(rule);
    }
    if let Some(rule) = RelatedResourceRule::new("v1", "Secret", target_selector) {
        rules.push(rule);
    }
    if let Some(rule) = RelatedResourceRule::new("hpcr.ibm.com/v1", "DataDisk", disk_selector) {
        rules.push(rule);
    }
    if let Some(rule) = RelatedResourceRule::new("hpcr.ibm.com/v1", "DataDiskRef", disk_selector) {
        rules.push(rule);
    }
    if let Some(rule) = RelatedResourceRule::new("hpcr.ibm.com/v1", "NetworkRef", network_selector) {
        rules.push(rule);
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_nil_selectors() {
        let rules = related_resource_rules(Some("app=foo"), None, None);
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.label_selector == "app=foo"));
    }

    #[test]
    fn ready_has_no_resync() {
        let s = ResourceStatus::ready("done");
        assert_eq!(s.resync_after_seconds(), None);
    }

    #[test]
    fn waiting_resyncs_after_ten_seconds() {
        let s = ResourceStatus::waiting("lock held");
        assert_eq!(s.resync_after_seconds(), Some(10));
    }
}
