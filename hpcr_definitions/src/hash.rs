//! Stable content-identity hashing (C10) for [`crate::options::InstanceOptions`].
//!
//! `onprem/instance.go`'s `CreateInstanceHash` folds `DataDisks` and
//! `Networks` in iteration order, which its test suite's
//! `TestCreateHash` silently assumes is order-independent. It isn't, in
//! the original. This implementation sorts both slices before folding so
//! the order-independence property actually holds.

use crate::options::InstanceOptions;
use sha2::{Digest, Sha256};

/// SHA-256 over `name || imageURL || storagePool || userData || disks || networks`,
/// with `disks` sorted by `(name, storagePool)` and `networks` sorted
/// lexicographically before folding, returned as lowercase hex.
pub fn instance_hash(opts: &InstanceOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.input(opts.name.as_bytes());
    hasher.input(opts.image_url.as_bytes());
    hasher.input(opts.storage_pool.as_bytes());
    hasher.input(opts.user_data.as_bytes());

    let mut disks = opts.data_disks.clone();
    disks.sort_by(|a, b| a.name.cmp(&b.name).then(a.storage_pool.cmp(&b.storage_pool)));
    for disk in &disks {
        hasher.input(disk.name.as_bytes());
        hasher.input(disk.storage_pool.as_bytes());
    }

    let mut networks = opts.networks.clone();
    networks.sort();
    for network in &networks {
        hasher.input(network.as_bytes());
    }

    format!("{:x}", hasher.result())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AttachedDataDisk;

    fn base_opts() -> InstanceOptions {
        InstanceOptions {
            name: "vm-1".to_string(),
            user_data: "userdata".to_string(),
            image_url: "http://localhost:8080/hpcr.qcow2".to_string(),
            storage_pool: "images".to_string(),
            data_disks: vec![
                AttachedDataDisk {
                    name: "first".to_string(),
                    storage_pool: "images".to_string(),
                },
                AttachedDataDisk {
                    name: "second".to_string(),
                    storage_pool: "images".to_string(),
                },
            ],
            networks: vec!["second".to_string(), "first".to_string()],
        }
    }

    #[test]
    fn hash_is_invariant_under_disk_and_network_permutation() {
        let mut reordered = base_opts();
        reordered.data_disks.reverse();
        reordered.networks = vec!["first".to_string(), "second".to_string()];

        assert_eq!(instance_hash(&base_opts()), instance_hash(&reordered));
    }

    #[test]
    fn hash_changes_with_user_data() {
        let mut changed = base_opts();
        changed.user_data.push(' ');
        assert_ne!(instance_hash(&base_opts()), instance_hash(&changed));
    }

    #[test]
    fn hash_is_stable_hex_sha256_length() {
        assert_eq!(instance_hash(&base_opts()).len(), 64);
    }
}
