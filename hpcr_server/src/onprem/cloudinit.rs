//! Cloud-init ISO construction (part of C5), grounded on `onprem/cloudinit.go`.

use failure::{Backtrace, Context, Fail};
use iso9660::{DirectoryInput, FileInput, ISO9660};
use std::fmt::{self, Display};
use std::io::Cursor;

const CIDATA_VOLUME_LABEL: &str = "cidata";
pub const USER_DATA_FILENAME: &str = "user-data";
pub const META_DATA_FILENAME: &str = "meta-data";
pub const VENDOR_DATA_FILENAME: &str = "vendor-data";

#[derive(Debug)]
pub struct CloudInitError {
    inner: Context<CloudInitErrKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum CloudInitErrKind {
    #[fail(display = "failed to build cloud-init ISO: {}", _0)]
    IsoBuildFailed(String),
}

impl Fail for CloudInitError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for CloudInitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<CloudInitErrKind> for CloudInitError {
    fn from(kind: CloudInitErrKind) -> CloudInitError {
        CloudInitError {
            inner: Context::new(kind),
        }
    }
}
impl From<Context<CloudInitErrKind>> for CloudInitError {
    fn from(inner: Context<CloudInitErrKind>) -> CloudInitError {
        CloudInitError { inner }
    }
}

pub fn boot_volume_name(instance_name: &str) -> String {
    format!("boot-{}.qcow2", instance_name)
}

pub fn cidata_volume_name(instance_name: &str) -> String {
    format!("cidata-{}.iso", instance_name)
}

pub fn console_volume_name(instance_name: &str) -> String {
    format!("console-{}.log", instance_name)
}

/// `meta-data` content: `"local-hostname: <name>"`.
pub fn meta_data(instance_name: &str) -> String {
    format!("local-hostname: {}", instance_name)
}

/// Writes `user-data`, `meta-data` and an empty `vendor-data` into a `cidata`
/// volume-labeled ISO9660 image and returns its bytes.
pub fn create_cloud_init(user_data: &[u8], meta_data: &[u8]) -> crate::Result<Vec<u8>> {
    let mut writer = ISO9660::new().map_err(|e| CloudInitErrKind::IsoBuildFailed(e.to_string()))?;

    writer
        .add_file(USER_DATA_FILENAME, FileInput::from_vec(user_data.to_vec()))
        .map_err(|e| CloudInitErrKind::IsoBuildFailed(e.to_string()))?;
    writer
        .add_file(META_DATA_FILENAME, FileInput::from_vec(meta_data.to_vec()))
        .map_err(|e| CloudInitErrKind::IsoBuildFailed(e.to_string()))?;
    writer
        .add_file(VENDOR_DATA_FILENAME, FileInput::from_vec(Vec::new()))
        .map_err(|e| CloudInitErrKind::IsoBuildFailed(e.to_string()))?;

    let mut buf = Cursor::new(Vec::new());
    writer
        .write_to(&mut buf, CIDATA_VOLUME_LABEL)
        .map_err(|e| CloudInitErrKind::IsoBuildFailed(e.to_string()))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_scheme_matches_the_documented_prefixes() {
        assert_eq!(boot_volume_name("vm-1"), "boot-vm-1.qcow2");
        assert_eq!(cidata_volume_name("vm-1"), "cidata-vm-1.iso");
        assert_eq!(console_volume_name("vm-1"), "console-vm-1.log");
    }

    #[test]
    fn meta_data_embeds_local_hostname() {
        assert_eq!(meta_data("vm-1"), "local-hostname: vm-1");
    }
}
