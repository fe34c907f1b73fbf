//! Structs describing the desired state of an on-prem domain, a data disk,
//! a data-disk reference, a network reference or a VPC instance.
//!
//! These are the inputs to [`crate::hash::instance_hash`] and to the
//! provisioners in `hpcr_server`; this crate never talks to libvirt or the
//! VPC API directly.

/// Default data-disk size when the custom resource leaves `size` at zero: 100 GiB.
pub const DEFAULT_DATA_DISK_SIZE: u64 = 100 * 1024 * 1024 * 1024;

/// Default libvirt network used when a VSI lists no `NetworkRef`.
pub const DEFAULT_NETWORK: &str = "default";

/// Default libvirt storage pool when a resource spec leaves `storagePool` empty.
pub const DEFAULT_STORAGE_POOL: &str = "default";

/// A data disk attached to an on-prem domain, identified by its resource UID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDataDisk {
    pub name: String,
    pub storage_pool: String,
}

/// Desired state of an on-prem libvirt domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceOptions {
    /// Resource UID; also the domain name and the root of every derived volume name.
    pub name: String,
    /// Encrypted, signed contract, carried verbatim as cloud-init user-data.
    pub user_data: String,
    pub image_url: String,
    pub storage_pool: String,
    pub data_disks: Vec<AttachedDataDisk>,
    pub networks: Vec<String>,
}

/// Desired state of a standalone data disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDiskOptions {
    pub name: String,
    pub storage_pool: String,
    /// Bytes; zero is normalized to [`DEFAULT_DATA_DISK_SIZE`] by the caller.
    pub size: u64,
}

impl DataDiskOptions {
    pub fn size_or_default(&self) -> u64 {
        if self.size == 0 {
            DEFAULT_DATA_DISK_SIZE
        } else {
            self.size
        }
    }
}

/// Reference to a volume the provisioner must not create, only look up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDiskRefOptions {
    pub name: String,
    pub storage_pool: String,
}

/// Reference to a libvirt network by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRefOptions {
    pub name: String,
}

impl Default for NetworkRefOptions {
    fn default() -> Self {
        NetworkRefOptions {
            name: DEFAULT_NETWORK.to_string(),
        }
    }
}

/// Desired state of an IBM Cloud VPC instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcInstanceOptions {
    /// Always `hpcr-controller-<uid>`.
    pub name: String,
    pub vpc_id: String,
    pub profile_name: String,
    pub image_id: String,
    pub zone_name: String,
    pub subnet_id: String,
    pub user_data: String,
}

impl VpcInstanceOptions {
    pub fn name_for_uid(uid: &str) -> String {
        format!("hpcr-controller-{}", uid)
    }
}
