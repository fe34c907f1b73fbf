//! `hpcr ssh-config --config NAME --name CM_NAME [--label k:v]*` (§6A):
//! resolves a `Host` entry from the caller's `~/.ssh/config`, reads its
//! private key off disk, and prints a `ConfigMap` JSON document carrying the
//! C3 env-map encoding of the resulting [`SshConfig`].
//!
//! Grounded on `cli/ssh.go`'s `CreateSSHConfigCommand`: the same
//! find-path/load-by-name/convert-to-env-map/wrap-in-configmap pipeline,
//! minus the Kubernetes API types this process never links against.

use hpcr_definitions::SshConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

fn ssh_config_path() -> crate::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| format_err!("could not determine home directory"))?;
    Ok(home.join(".ssh").join("config"))
}

fn known_hosts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts"))
}

/// A single `Host <alias>` block as it appears in an OpenSSH client config.
#[derive(Default)]
struct HostEntry {
    hostname: String,
    port: Option<u16>,
    user: String,
    identity_file: String,
}

/// Parses `~/.ssh/config` looking for the `Host <name>` block, the way
/// OpenSSH itself reads it: one `Key Value` pair per line, case-insensitive
/// keys, blocks delimited by `Host` lines.
fn load_host_entry(path: &PathBuf, name: &str) -> crate::Result<HostEntry> {
    let contents = fs::read_to_string(path).map_err(|e| format_err!("reading {}: {}", path.display(), e))?;

    let mut in_block = false;
    let mut entry = HostEntry::default();
    let mut found = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let key = parts.next().unwrap_or("").to_lowercase();
        let value = parts.next().unwrap_or("").trim().to_string();

        if key == "host" {
            in_block = value.split_whitespace().any(|alias| alias == name);
            if in_block {
                found = true;
            }
            continue;
        }
        if !in_block {
            continue;
        }

        match key.as_str() {
            "hostname" => entry.hostname = value,
            "port" => entry.port = value.parse().ok(),
            "user" => entry.user = value,
            "identityfile" => entry.identity_file = value,
            _ => {}
        }
    }

    if !found {
        return Err(format_err!("no Host entry named '{}' in {}", name, path.display()));
    }
    Ok(entry)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn load_ssh_config(name: &str) -> crate::Result<SshConfig> {
    let path = ssh_config_path()?;
    let host = load_host_entry(&path, name)?;

    let key = if host.identity_file.is_empty() {
        String::new()
    } else {
        fs::read_to_string(expand_tilde(&host.identity_file))
            .map_err(|e| format_err!("reading identity file '{}': {}", host.identity_file, e))?
    };

    let known_hosts = known_hosts_path()
        .and_then(|p| fs::read_to_string(p).ok())
        .map(|contents| contents.lines().map(str::to_string).collect())
        .unwrap_or_default();

    Ok(SshConfig {
        hostname: host.hostname,
        port: host.port,
        user: host.user,
        known_hosts,
        key,
    })
}

fn parse_labels(raw: &[&str]) -> BTreeMap<String, String> {
    raw.iter()
        .filter_map(|label| {
            let mut split = label.splitn(2, ':');
            Some((split.next()?.to_string(), split.next()?.to_string()))
        })
        .collect()
}

pub fn run(config_name: &str, cm_name: &str, labels: &[&str]) -> crate::Result<()> {
    let ssh_config = load_ssh_config(config_name)?;
    let data: Value = serde_json::to_value(ssh_config.to_env_map())?;

    let config_map = json!({
        "kind": "ConfigMap",
        "apiVersion": "v1",
        "metadata": {
            "name": cm_name,
            "labels": parse_labels(labels),
        },
        "data": data,
    });

    println!("{}", serde_json::to_string_pretty(&config_map)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_host_block() {
        let path = std::env::temp_dir().join("hpcr_cli_test_ssh_config");
        fs::write(
            &path,
            "Host other\n  HostName other.example.com\n\nHost target\n  HostName libvirt.example.com\n  Port 2222\n  User hpcr\n  IdentityFile ~/.ssh/id_ed25519\n",
        )
        .unwrap();

        let entry = load_host_entry(&path, "target").unwrap();
        assert_eq!(entry.hostname, "libvirt.example.com");
        assert_eq!(entry.port, Some(2222));
        assert_eq!(entry.user, "hpcr");

        fs::remove_file(&path).ok();
    }

    #[test]
    fn parse_labels_splits_on_first_colon() {
        let labels = parse_labels(&["env:prod", "team:hpcr:x"]);
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(labels.get("team").map(String::as_str), Some("hpcr:x"));
    }
}
