//! Contract assembly (C1): a fixed YAML skeleton, the compose archive, pull
//! secrets and logging configuration, folded into one [`ContractMap`] ready
//! for [`crate::crypto::encrypt_and_sign`].
//!
//! Grounded on `examples/original_source/contract/contract.go` and
//! `contract/busybox.go` for the template shape and the credential/logging
//! key names.

use crate::env::Environment;
use base64::encode as base64_encode;
use failure::{Backtrace, Context, Fail};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_yaml::Value;
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

const CONTRACT_TEMPLATE: &str = r#"---
workload:
  type: workload
  compose:
    archive: empty
env:
  type: env
"#;

/// Minimal shape a finished contract must satisfy: `workload.type`,
/// `workload.compose.archive` and `env.type` are mandatory; `auths` and
/// `logging.logDNA`, when present, must carry their expected string fields.
/// The HPCR contract schema itself lives in `terraform-provider-hpcr`
/// outside this codebase; this is a minimal reconstruction of its required
/// shape, sufficient to catch a malformed assembly before encryption.
const CONTRACT_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "required": ["workload", "env"],
  "properties": {
    "workload": {
      "type": "object",
      "required": ["type", "compose"],
      "properties": {
        "type": { "const": "workload" },
        "compose": {
          "type": "object",
          "required": ["archive"],
          "properties": { "archive": { "type": "string" } }
        },
        "auths": {
          "type": "object",
          "additionalProperties": {
            "type": "object",
            "required": ["username", "password"],
            "properties": {
              "username": { "type": "string" },
              "password": { "type": "string" }
            }
          }
        }
      }
    },
    "env": {
      "type": "object",
      "required": ["type"],
      "properties": {
        "type": { "const": "env" },
        "logging": {
          "type": "object",
          "properties": {
            "logDNA": {
              "type": "object",
              "required": ["hostname", "ingestionKey"],
              "properties": {
                "hostname": { "type": "string" },
                "ingestionKey": { "type": "string" }
              }
            }
          }
        }
      }
    }
  }
}"#;

/// Parses [`CONTRACT_SCHEMA`]; panics only if the constant itself is malformed JSON.
pub fn default_schema() -> serde_json::Value {
    serde_json::from_str(CONTRACT_SCHEMA).expect("CONTRACT_SCHEMA is valid JSON")
}

#[derive(Debug)]
pub struct ContractError {
    inner: Context<ContractErrKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ContractErrKind {
    #[fail(display = "missing pull credentials for registry '{}'", _0)]
    MissingCredentials(String),
    #[fail(display = "missing LogDNA ingestion host/key")]
    MissingLogging,
    #[fail(display = "compose folder '{}' could not be archived", _0)]
    ComposeArchiveFailed(String),
}

impl Fail for ContractError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<ContractErrKind> for ContractError {
    fn from(kind: ContractErrKind) -> ContractError {
        ContractError {
            inner: Context::new(kind),
        }
    }
}
impl From<Context<ContractErrKind>> for ContractError {
    fn from(inner: Context<ContractErrKind>) -> ContractError {
        ContractError { inner }
    }
}

/// The assembled, not-yet-encrypted contract: a `{workload, env}` YAML tree.
#[derive(Debug, Clone)]
pub struct ContractMap(pub Value);

impl ContractMap {
    /// Step 1: parse the fixed skeleton.
    pub fn skeleton() -> crate::Result<ContractMap> {
        Ok(ContractMap(serde_yaml::from_str(CONTRACT_TEMPLATE)?))
    }

    /// Step 2: tar the compose folder deterministically (sorted paths, zeroed
    /// mtimes), gzip it, base64 it, and insert at `workload.compose.archive`.
    pub fn with_compose_archive(mut self, compose_folder: &Path) -> crate::Result<ContractMap> {
        let archive = tar_compose_folder(compose_folder)
            .map_err(|_| ContractErrKind::ComposeArchiveFailed(compose_folder.display().to_string()))?;
        set_path(
            &mut self.0,
            &["workload", "compose", "archive"],
            Value::String(base64_encode(&archive)),
        );
        Ok(self)
    }

    /// Step 3: insert `workload.auths.<registry>.{username,password}` when
    /// both `<REGISTRY>_USERNAME` and `<REGISTRY>_PASSWORD` are present.
    pub fn with_pull_secret(mut self, registry: &str, env: &Environment) -> crate::Result<ContractMap> {
        let prefix = scream_snake(registry);
        let username = env.get(&format!("{}_USERNAME", prefix));
        let password = env.get(&format!("{}_PASSWORD", prefix));
        match (username, password) {
            (Some(u), Some(p)) => {
                let mut creds = serde_yaml::Mapping::new();
                creds.insert(Value::String("username".into()), Value::String(u.clone()));
                creds.insert(Value::String("password".into()), Value::String(p.clone()));
                set_path(
                    &mut self.0,
                    &["workload", "auths", registry],
                    Value::Mapping(creds),
                );
                Ok(self)
            }
            _ => Err(ContractErrKind::MissingCredentials(registry.to_string()).into()),
        }
    }

    /// Step 4: insert `env.logging.logDNA.{hostname, ingestionKey}` when both
    /// `LOGDNA_INGESTION_HOST` and `LOGDNA_INGESTION_KEY` are present.
    pub fn with_logging(mut self, env: &Environment) -> crate::Result<ContractMap> {
        let host = env.get("LOGDNA_INGESTION_HOST");
        let key = env.get("LOGDNA_INGESTION_KEY");
        match (host, key) {
            (Some(h), Some(k)) => {
                let mut logdna = serde_yaml::Mapping::new();
                logdna.insert(Value::String("hostname".into()), Value::String(h.clone()));
                logdna.insert(Value::String("ingestionKey".into()), Value::String(k.clone()));
                set_path(&mut self.0, &["env", "logging", "logDNA"], Value::Mapping(logdna));
                Ok(self)
            }
            _ => Err(ContractErrKind::MissingLogging.into()),
        }
    }

    /// Step 5: validate against the HPCR contract JSON Schema.
    pub fn validate(&self, schema: &serde_json::Value) -> crate::Result<()> {
        crate::crypto::validate_schema(&self.to_json()?, schema)
    }

    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.0)?)
    }
}

/// Registry hostname, screaming-snake-cased (`docker.io` → `DOCKER_IO`).
fn scream_snake(registry: &str) -> String {
    registry
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Sets a nested mapping path, creating intermediate mappings as needed.
fn set_path(root: &mut Value, path: &[&str], leaf: Value) {
    if path.is_empty() {
        *root = leaf;
        return;
    }
    if !root.is_mapping() {
        *root = Value::Mapping(serde_yaml::Mapping::new());
    }
    let mapping = root.as_mapping_mut().expect("just ensured mapping");
    let key = Value::String(path[0].to_string());
    if path.len() == 1 {
        mapping.insert(key, leaf);
    } else {
        let mut child = mapping
            .remove(&key)
            .unwrap_or_else(|| Value::Mapping(serde_yaml::Mapping::new()));
        set_path(&mut child, &path[1..], leaf);
        mapping.insert(key, child);
    }
}

/// Deterministic tar+gzip: entries sorted by relative path, mtimes zeroed.
fn tar_compose_folder(folder: &Path) -> std::io::Result<Vec<u8>> {
    let mut entries: Vec<_> = fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    let gz = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(gz);
    for path in entries {
        if !path.is_file() {
            continue;
        }
        let name = path
            .strip_prefix(folder)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let mut header = tar::Header::new_gnu();
        let metadata = fs::metadata(&path)?;
        header.set_size(metadata.len());
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        let mut file = fs::File::open(&path)?;
        builder.append_data(&mut header, &name, &mut file)?;
    }
    let gz = builder.into_inner()?;
    gz.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_parses() {
        let contract = ContractMap::skeleton().unwrap();
        assert!(contract.0.is_mapping());
    }

    #[test]
    fn missing_credentials_fails() {
        let contract = ContractMap::skeleton().unwrap();
        let env = Environment::new();
        assert!(contract.with_pull_secret("docker.io", &env).is_err());
    }

    #[test]
    fn pull_secret_is_inserted_when_present() {
        let contract = ContractMap::skeleton().unwrap();
        let mut env = Environment::new();
        env.insert("DOCKER_IO_USERNAME".to_string(), "alice".to_string());
        env.insert("DOCKER_IO_PASSWORD".to_string(), "hunter2".to_string());
        let contract = contract.with_pull_secret("docker.io", &env).unwrap();
        let json = contract.to_json().unwrap();
        assert_eq!(json["workload"]["auths"]["docker.io"]["username"], "alice");
    }

    #[test]
    fn screaming_snake_case_handles_dots() {
        assert_eq!(scream_snake("docker.io"), "DOCKER_IO");
    }
}
