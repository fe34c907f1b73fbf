//! Storage-volume operations (C4), grounded on `onprem/volume.go` and
//! `onprem/datadisk.go`.

use super::xml::escape_xml;
use super::{LibvirtClient, LibvirtErrKind};
use virt::storage_pool::StoragePool;
use virt::storage_vol::StorageVol;

/// qcow2, mode 644, capacity 1 byte — the caller always overwrites capacity
/// and, for raw volumes, the format.
pub fn default_volume_xml(name: &str, capacity_bytes: u64, format: &str) -> String {
    format!(
        r#"<volume>
  <name>{name}</name>
  <capacity unit="bytes">{capacity}</capacity>
  <target>
    <format type="{format}"/>
    <permissions><mode>0644</mode></permissions>
  </target>
</volume>"#,
        name = escape_xml(name),
        capacity = capacity_bytes,
        format = escape_xml(format),
    )
}

pub fn lookup_pool(client: &LibvirtClient, name: &str) -> crate::Result<StoragePool> {
    StoragePool::lookup_by_name(&client.connect, name)
        .map_err(|e| LibvirtErrKind::CallFailed("StoragePoolLookupByName".into(), e.to_string()).into())
}

/// `None` when the volume does not exist (never an error: spec §4.4,
/// `ErrNoStorageVol` maps to "absent, not an error").
pub fn lookup_volume(pool: &StoragePool, name: &str) -> crate::Result<Option<StorageVol>> {
    match StorageVol::lookup_by_name(pool, name) {
        Ok(vol) => Ok(Some(vol)),
        Err(e) if super::is_benign_absence(&e) => Ok(None),
        Err(e) => Err(LibvirtErrKind::CallFailed("StorageVolLookupByName".into(), e.to_string()).into()),
    }
}

pub fn refresh_pool(pool: &StoragePool) -> crate::Result<()> {
    pool.refresh(0)
        .map(|_| ())
        .map_err(|e| LibvirtErrKind::CallFailed("StoragePoolRefresh".into(), e.to_string()).into())
}

/// Deletes a volume by name if present, logging and no-op'ing otherwise.
pub fn delete_volume_if_exists(pool: &StoragePool, name: &str) -> crate::Result<()> {
    if let Some(vol) = lookup_volume(pool, name)? {
        info!("deleting volume [{}]", name);
        vol.delete(0)
            .map_err(|e| LibvirtErrKind::CallFailed("StorageVolDelete".into(), e.to_string()))?;
    }
    Ok(())
}

/// Creates a volume from raw XML, returning the handle.
pub fn create_volume(pool: &StoragePool, xml: &str) -> crate::Result<StorageVol> {
    StorageVol::create_xml(pool, xml, 0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolCreateXML".into(), e.to_string()).into())
}

/// In-place grow of an existing volume to `new_capacity_bytes`, preserving
/// its contents (`onprem/datadisk.go`'s `CreateDataDisk` calls
/// `StorageVolResize` rather than deleting and recreating an undersized
/// disk).
pub fn resize_volume(vol: &StorageVol, new_capacity_bytes: u64) -> crate::Result<()> {
    vol.resize(new_capacity_bytes, 0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolResize".into(), e.to_string()).into())
}

/// Clones `source` into a new volume named `name` (backing the boot disk
/// clone in provisioner step 5).
pub fn clone_volume(pool: &StoragePool, name: &str, capacity_bytes: u64, source: &StorageVol) -> crate::Result<StorageVol> {
    let xml = default_volume_xml(name, capacity_bytes, "qcow2");
    StorageVol::create_xml_from(pool, &xml, source, 0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolCreateXMLFrom".into(), e.to_string()).into())
}

/// Uploads `data` into `vol`.
pub fn upload_volume(vol: &StorageVol, data: &[u8]) -> crate::Result<()> {
    vol.upload(data, 0, data.len() as u64, 0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolUpload".into(), e.to_string()).into())
}

/// Downloads up to `max_bytes` from `vol`.
pub fn download_volume(vol: &StorageVol, max_bytes: u64) -> crate::Result<Vec<u8>> {
    vol.download(0, max_bytes, 0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolDownload".into(), e.to_string()).into())
}

pub fn volume_path(vol: &StorageVol) -> crate::Result<String> {
    vol.get_path()
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolGetPath".into(), e.to_string()).into())
}

pub fn xml_desc(vol: &StorageVol) -> crate::Result<String> {
    vol.get_xml_desc(0)
        .map_err(|e| LibvirtErrKind::CallFailed("StorageVolGetXMLDesc".into(), e.to_string()).into())
}

/// Reads a volume's reported `<capacity unit="bytes">`, used to size the
/// boot-disk clone off its source image.
pub fn capacity_bytes(vol: &StorageVol) -> crate::Result<u64> {
    let desc = xml_desc(vol)?;
    let start = desc
        .find("<capacity")
        .and_then(|i| desc[i..].find('>').map(|j| i + j + 1))
        .ok_or(LibvirtErrKind::CallFailed("StorageVolGetXMLDesc".into(), "missing <capacity>".into()))?;
    let end = start + desc[start..].find("</capacity>").ok_or(LibvirtErrKind::CallFailed(
        "StorageVolGetXMLDesc".into(),
        "missing </capacity>".into(),
    ))?;
    desc[start..end]
        .trim()
        .parse()
        .map_err(|_| LibvirtErrKind::CallFailed("StorageVolGetXMLDesc".into(), "non-numeric <capacity>".into()).into())
}

/// A volume template carrying `lastModified`/`contentLength`, the freshness
/// bookkeeping the image cache (provisioner step 4) reads back on the next
/// sync instead of re-fetching the URL unconditionally.
pub fn image_volume_xml(name: &str, capacity_bytes: u64, last_modified: &str, content_length: u64) -> String {
    format!(
        r#"<volume>
  <name>{name}</name>
  <capacity unit="bytes">{capacity}</capacity>
  <target>
    <format type="qcow2"/>
    <permissions><mode>0644</mode></permissions>
  </target>
  <metadata><image xmlns="https://github.com/ibm-hyper-protect/k8s-operator-hpcr"><lastModified>{last_modified}</lastModified><contentLength>{content_length}</contentLength></image></metadata>
</volume>"#,
        name = escape_xml(name),
        capacity = capacity_bytes,
        last_modified = escape_xml(last_modified),
        content_length = content_length,
    )
}

/// Reads back `(lastModified, contentLength)` from a volume built with
/// [`image_volume_xml`], if present.
pub fn extract_image_metadata(volume_xml: &str) -> Option<(String, u64)> {
    let lm_start = volume_xml.find("<lastModified>")? + "<lastModified>".len();
    let lm_end = volume_xml[lm_start..].find("</lastModified>")? + lm_start;
    let cl_start = volume_xml.find("<contentLength>")? + "<contentLength>".len();
    let cl_end = volume_xml[cl_start..].find("</contentLength>")? + cl_start;
    let content_length = volume_xml[cl_start..cl_end].parse().ok()?;
    Some((volume_xml[lm_start..lm_end].to_string(), content_length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_volume_xml_embeds_capacity_and_format() {
        let xml = default_volume_xml("boot-vm-1.qcow2", 4096, "qcow2");
        assert!(xml.contains("boot-vm-1.qcow2"));
        assert!(xml.contains("4096"));
        assert!(xml.contains("qcow2"));
    }

    #[test]
    fn image_metadata_round_trips() {
        let xml = image_volume_xml("hpcr.qcow2", 1024, "Wed, 01 Jan 2025 00:00:00 GMT", 1024);
        assert_eq!(
            extract_image_metadata(&xml),
            Some(("Wed, 01 Jan 2025 00:00:00 GMT".to_string(), 1024))
        );
    }
}
