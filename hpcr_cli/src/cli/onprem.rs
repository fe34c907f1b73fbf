//! `hpcr onprem --name --image-url --cert-path --compose-folder --target ...`
//! (§6A): assembles a [`ContractMap`] via C1, validates and encrypts/signs it
//! via C2, and prints the resulting custom-resource JSON document to stdout.
//!
//! Grounded on `contract/contract.go`'s pipeline shape (skeleton → compose
//! archive → pull secret → logging → validate → encrypt) and
//! `contract/busybox.go`'s `CreateContract`, whose `Either`-monad chain fails
//! the whole build the moment either the registry credentials or the LogDNA
//! settings are missing. The registry to authenticate against is the host
//! component of `--image-url`, since that's the registry actually hosting
//! the image being deployed.

use hpcr_definitions::contract::{self, ContractMap};
use hpcr_definitions::crypto;
use hpcr_definitions::env::Environment;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const DEFAULT_STORAGE_POOL: &str = "default";

fn process_environment() -> Environment {
    std::env::vars().collect()
}

/// The registry hostname an image URL is pulled from, e.g.
/// `registry.example.com/ns/image:tag` → `registry.example.com`.
fn registry_host(image_url: &str) -> &str {
    let without_scheme = image_url.splitn(2, "://").last().unwrap_or(image_url);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

fn build_contract(compose_folder: &Path, image_url: &str, env: &Environment) -> crate::Result<ContractMap> {
    let contract = ContractMap::skeleton()?
        .with_compose_archive(compose_folder)?
        .with_pull_secret(registry_host(image_url), env)?
        .with_logging(env)?;

    contract.validate(&contract::default_schema())?;
    Ok(contract)
}

fn parse_labels(raw: &[&str]) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|label| {
            let mut split = label.splitn(2, ':');
            Some((split.next()?.to_string(), split.next()?.to_string()))
        })
        .collect()
}

pub struct OnPremArgs<'a> {
    pub name: &'a str,
    pub labels: &'a [&'a str],
    pub image_url: &'a str,
    pub storage_pool: Option<&'a str>,
    pub cert_path: &'a str,
    pub compose_folder: &'a str,
    pub target_selectors: &'a [&'a str],
}

pub fn run(args: OnPremArgs) -> crate::Result<()> {
    let env = process_environment();
    let compose_folder = Path::new(args.compose_folder);

    let contract = build_contract(compose_folder, args.image_url, &env)?;
    let cert = fs::read(args.cert_path).map_err(|e| format_err!("reading cert '{}': {}", args.cert_path, e))?;
    let encrypted = crypto::encrypt_and_sign(&contract, &cert)?;

    let target_selector = args.target_selectors.join(",");
    let storage_pool = args.storage_pool.unwrap_or(DEFAULT_STORAGE_POOL);

    let resource = json!({
        "metadata": {
            "name": args.name,
            "labels": parse_labels(args.labels),
        },
        "spec": {
            "imageURL": args.image_url,
            "storagePool": storage_pool,
            "userData": encrypted.0,
            "targetSelector": target_selector,
        },
    });

    println!("{}", serde_json::to_string_pretty(&resource)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_host_strips_scheme_and_path() {
        assert_eq!(registry_host("https://registry.example.com/ns/image:tag"), "registry.example.com");
        assert_eq!(registry_host("registry.example.com/image"), "registry.example.com");
        assert_eq!(registry_host("docker.io"), "docker.io");
    }

    #[test]
    fn missing_pull_secret_fails_the_whole_build() {
        let env = Environment::new();
        let err = build_contract(Path::new("."), "registry.example.com/image", &env).unwrap_err();
        assert!(err.to_string().contains("registry.example.com"));
    }
}
