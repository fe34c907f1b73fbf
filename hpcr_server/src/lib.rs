#![allow(non_snake_case)]

extern crate actix;
extern crate actix_web;
#[macro_use]
extern crate log;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate lazy_static;
extern crate hpcr_definitions;
extern crate reqwest;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate serde_yaml;

pub use failure::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// SSH-tunnelled unix-domain dialer to the remote libvirt socket (C3).
pub mod transport;

/// Typed libvirt RPC wrappers: pools, volumes, domains, networks (C4).
pub mod libvirt;

/// On-prem provisioner: volume/domain orchestration, cloud-init, console fence (C5, C4.7).
pub mod onprem;

/// Standalone data-disk volume provisioning, the non-domain sibling of C5.
pub mod datadisk;

/// IBM Cloud VPC provisioner (C7).
pub mod vpc;

/// Process-wide reconciler dispatch and the on-prem mutation lock (C8).
pub mod reconciler;

/// actix-web route handlers for the meta-controller HTTP contract (§6).
pub mod routes;

/// Builds and runs the HTTP server binding all kinds' routes.
pub mod server;
pub use server::create_server;
