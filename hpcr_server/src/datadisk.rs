//! Standalone data-disk volume provisioning, a simpler sibling of the C5
//! on-prem pipeline, grounded on `onprem/datadisk.go`'s `IsDataDiskValid`,
//! `CreateDataDiskSync` and `DeleteDataDiskSync`.

use crate::libvirt::{volume, LibvirtClient};
use hpcr_definitions::{DataDiskOptions, ResourceStatus};
use serde_json::Value;

const DISK_FORMAT: &str = "qcow2";

/// A volume already exists under `opts.name` at or above the requested
/// capacity. An oversized disk is valid as-is (`onprem/datadisk.go`'s
/// `IsDataDiskValid` only flags undersized disks, never oversized ones).
fn is_valid(client: &LibvirtClient, opts: &DataDiskOptions) -> crate::Result<Option<String>> {
    let pool = volume::lookup_pool(client, &opts.storage_pool)?;
    let existing = match volume::lookup_volume(&pool, &opts.name)? {
        Some(v) => v,
        None => return Ok(None),
    };
    if volume::capacity_bytes(&existing)? < opts.size_or_default() {
        return Ok(None);
    }
    Ok(Some(volume::xml_desc(&existing)?))
}

/// Creates the volume if missing, grows it in place if undersized (never
/// deletes an existing, non-conforming disk — `CreateDataDisk`'s
/// `StorageVolResize` call preserves its contents), and returns `Ready` with
/// the volume's XML description attached as `metadata.diskXML`.
pub fn sync(client: &LibvirtClient, opts: &DataDiskOptions) -> crate::Result<ResourceStatus> {
    let xml_desc = match is_valid(client, opts)? {
        Some(xml_desc) => xml_desc,
        None => {
            let pool = volume::lookup_pool(client, &opts.storage_pool)?;
            match volume::lookup_volume(&pool, &opts.name)? {
                Some(existing) => {
                    volume::resize_volume(&existing, opts.size_or_default())?;
                    volume::xml_desc(&existing)?
                }
                None => {
                    let xml = volume::default_volume_xml(&opts.name, opts.size_or_default(), DISK_FORMAT);
                    let vol = volume::create_volume(&pool, &xml)?;
                    volume::xml_desc(&vol)?
                }
            }
        }
    };

    Ok(ResourceStatus::ready(opts.name.clone()).with_metadata("diskXML", Value::String(xml_desc)))
}

pub fn finalize(client: &LibvirtClient, opts: &DataDiskOptions) -> crate::Result<ResourceStatus> {
    let pool = volume::lookup_pool(client, &opts.storage_pool)?;
    volume::delete_volume_if_exists(&pool, &opts.name)?;
    Ok(ResourceStatus::ready("data disk finalized"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_falls_back_to_the_default() {
        let opts = DataDiskOptions {
            name: "disk-1".to_string(),
            storage_pool: "default".to_string(),
            size: 0,
        };
        assert_eq!(opts.size_or_default(), hpcr_definitions::options::DEFAULT_DATA_DISK_SIZE);
    }

    #[test]
    fn disk_format_is_qcow2() {
        assert_eq!(DISK_FORMAT, "qcow2");
    }
}
