#![allow(renamed_and_removed_lints)]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate reqwest;

extern crate regex;

extern crate semver;
extern crate base64;

#[macro_use]
extern crate failure;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Instance, data-disk, network-ref and VPC option structs plus `ResourceStatus`.
pub mod options;
pub use options::{
    AttachedDataDisk, DataDiskOptions, DataDiskRefOptions, InstanceOptions, NetworkRefOptions,
    VpcInstanceOptions,
};

/// `ResourceStatus`/`Status` and related-resource rule types returned by every reconcile.
pub mod status;
pub use status::{RelatedResourceRule, ResourceStatus, Status};

/// Environment map aggregation from related ConfigMaps/Secrets.
pub mod env;
pub use env::Environment;

/// Content hash (C10) over `InstanceOptions`.
pub mod hash;
pub use hash::instance_hash;

/// MAC and machine-id derivation (C10).
pub mod identity;
pub use identity::{mac_from_hash, mac_from_uuid, machine_id_from_hash, machine_id_from_uuid};

/// SSH dial configuration (C3) plus its environment-map round trip.
pub mod sshconfig;
pub use sshconfig::SshConfig;

/// Contract assembly (C1): YAML skeleton, compose archive, pull secrets, logging.
pub mod contract;
pub use contract::ContractMap;

/// Contract encryption, signing and schema validation (C2).
pub mod crypto;

/// Console-log token parsing (C6).
pub mod logoracle;
pub use logoracle::LogOutcome;
