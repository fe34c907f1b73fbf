//! On-prem provisioner (C5): volume/domain orchestration, cloud-init, and
//! the console-log subprocess fence (C4.7).

pub mod cloudinit;
pub mod console;
pub mod provisioner;

pub use provisioner::{finalize, sync, SyncOutcome};
