//! The C5 sync/finalize algorithm, grounded on `onprem/instance.go`'s
//! `CreateInstance`/`DeleteInstance`.

use crate::libvirt::{domain, volume, xml, LibvirtClient, LibvirtErrKind};
use crate::onprem::cloudinit;
use failure::{Backtrace, Context, Fail};
use hpcr_definitions::InstanceOptions;
use std::fmt::{self, Display};
use std::io::Cursor;
use virt::storage_pool::StoragePool;

const CONSOLE_LOG_CAPACITY_BYTES: u64 = 2 * 1024 * 1024;
const CANONICAL_MACHINE: &str = "s390-ccw-virtio";

#[derive(Debug)]
pub struct ProvisionError {
    inner: Context<ProvisionErrKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ProvisionErrKind {
    #[fail(display = "failed to fetch image '{}': {}", _0, _1)]
    ImageFetchFailed(String, String),
}

impl Fail for ProvisionError {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }
    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}
impl Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<ProvisionErrKind> for ProvisionError {
    fn from(kind: ProvisionErrKind) -> ProvisionError {
        ProvisionError {
            inner: Context::new(kind),
        }
    }
}
impl From<Context<ProvisionErrKind>> for ProvisionError {
    fn from(inner: Context<ProvisionErrKind>) -> ProvisionError {
        ProvisionError { inner }
    }
}

/// Result of a successful sync call.
pub struct SyncOutcome {
    pub domain_xml: String,
    /// `true` when step 1's idempotence check short-circuited the rest of the pipeline.
    pub already_valid: bool,
}

/// Step 1: an existing, running domain whose recorded hash matches `opts`'s
/// current hash needs no work.
fn is_valid(client: &LibvirtClient, opts: &InstanceOptions, hash: &str) -> crate::Result<Option<String>> {
    let existing = match domain::lookup_domain(client, &opts.name)? {
        Some(d) => d,
        None => return Ok(None),
    };
    if !domain::is_running(&existing)? {
        return Ok(None);
    }
    let xml_desc = domain::xml_desc(&existing)?;
    match domain::extract_instance_hash(&xml_desc) {
        Some(stored) if stored == hash => Ok(Some(xml_desc)),
        _ => Ok(None),
    }
}

/// Downloads `url` in full, used for both the freshness `HEAD` and the body `GET`.
struct ImageHead {
    last_modified: String,
    content_length: u64,
}

fn fetch_image_head(url: &str) -> crate::Result<ImageHead> {
    let client = reqwest::Client::new();
    let response = client
        .head(url)
        .send()
        .map_err(|e| ProvisionErrKind::ImageFetchFailed(url.to_string(), e.to_string()))?;

    let last_modified = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let content_length = response
        .headers()
        .get(reqwest::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(ImageHead {
        last_modified,
        content_length,
    })
}

fn fetch_image_body(url: &str) -> crate::Result<Vec<u8>> {
    let mut response = reqwest::get(url).map_err(|e| ProvisionErrKind::ImageFetchFailed(url.to_string(), e.to_string()))?;
    let mut buf = Cursor::new(Vec::new());
    response
        .copy_to(&mut buf)
        .map_err(|e| ProvisionErrKind::ImageFetchFailed(url.to_string(), e.to_string()))?;
    Ok(buf.into_inner())
}

fn image_volume_name(image_url: &str) -> String {
    image_url.rsplit('/').next().unwrap_or(image_url).to_string()
}

/// Step 4: re-fetch and re-upload the base image only when the remote
/// `Last-Modified`/`Content-Length` pair no longer matches what's cached.
fn ensure_image_volume(pool: &StoragePool, image_url: &str) -> crate::Result<String> {
    let name = image_volume_name(image_url);
    let head = fetch_image_head(image_url)?;

    let up_to_date = match volume::lookup_volume(pool, &name)? {
        Some(vol) => {
            let xml_desc = volume::xml_desc(&vol)?;
            volume::extract_image_metadata(&xml_desc) == Some((head.last_modified.clone(), head.content_length))
        }
        None => false,
    };

    if up_to_date {
        return Ok(name);
    }

    info!("refreshing cached image volume [{}]", name);
    volume::delete_volume_if_exists(pool, &name)?;
    volume::refresh_pool(pool)?;

    let body = fetch_image_body(image_url)?;
    let volume_xml = volume::image_volume_xml(&name, body.len() as u64, &head.last_modified, head.content_length);
    let vol = volume::create_volume(pool, &volume_xml)?;
    volume::upload_volume(&vol, &body)?;
    Ok(name)
}

/// Composes the device list for domain XML step 8: boot disk, cidata disk,
/// each attached data disk (devices starting at `vdd`), the console log
/// sink, then every configured network (or the default network if none).
fn compose_devices(boot_path: &str, cidata_path: &str, data_disk_paths: &[String], console_path: &str, networks: &[String]) -> String {
    let mut devices = String::new();
    devices.push_str(&xml::boot_disk(boot_path));
    devices.push_str(&xml::cidata_disk(cidata_path));
    for (i, path) in data_disk_paths.iter().enumerate() {
        devices.push_str(&xml::data_disk(i, path));
    }
    devices.push_str(&xml::console_log_sink(console_path));

    if networks.is_empty() {
        devices.push_str(&xml::network_interface(hpcr_definitions::options::DEFAULT_NETWORK));
    } else {
        for network in networks {
            devices.push_str(&xml::network_interface(network));
        }
    }
    devices
}

/// Runs the full nine-step sync algorithm against `opts`, returning the
/// domain's live XML description.
pub fn sync(client: &LibvirtClient, opts: &InstanceOptions) -> crate::Result<SyncOutcome> {
    let hash = hpcr_definitions::instance_hash(opts);

    if let Some(xml_desc) = is_valid(client, opts, &hash)? {
        return Ok(SyncOutcome {
            domain_xml: xml_desc,
            already_valid: true,
        });
    }

    let cidata_bytes = cloudinit::create_cloud_init(opts.user_data.as_bytes(), cloudinit::meta_data(&opts.name).as_bytes())?;

    domain::delete_domain_by_name(client, &opts.name)?;

    let pool = volume::lookup_pool(client, &opts.storage_pool)?;

    let image_name = ensure_image_volume(&pool, &opts.image_url)?;
    let image_volume = volume::lookup_volume(&pool, &image_name)?.ok_or(LibvirtErrKind::NoStorageVol)?;

    let boot_name = cloudinit::boot_volume_name(&opts.name);
    volume::delete_volume_if_exists(&pool, &boot_name)?;
    volume::refresh_pool(&pool)?;
    let boot_capacity = volume::capacity_bytes(&image_volume)?;
    let boot_volume = volume::clone_volume(&pool, &boot_name, boot_capacity, &image_volume)?;
    let boot_path = volume::volume_path(&boot_volume)?;

    let cidata_name = cloudinit::cidata_volume_name(&opts.name);
    volume::delete_volume_if_exists(&pool, &cidata_name)?;
    volume::refresh_pool(&pool)?;
    let cidata_volume_xml = volume::default_volume_xml(&cidata_name, cidata_bytes.len() as u64, "raw");
    let cidata_volume = volume::create_volume(&pool, &cidata_volume_xml)?;
    volume::upload_volume(&cidata_volume, &cidata_bytes)?;
    let cidata_path = volume::volume_path(&cidata_volume)?;

    let console_name = cloudinit::console_volume_name(&opts.name);
    volume::delete_volume_if_exists(&pool, &console_name)?;
    volume::refresh_pool(&pool)?;
    let console_volume_xml = volume::default_volume_xml(&console_name, CONSOLE_LOG_CAPACITY_BYTES, "raw");
    let console_volume = volume::create_volume(&pool, &console_volume_xml)?;
    let console_path = volume::volume_path(&console_volume)?;

    let mut data_disk_paths = Vec::new();
    for disk in &opts.data_disks {
        let disk_pool = volume::lookup_pool(client, &disk.storage_pool)?;
        let vol = volume::lookup_volume(&disk_pool, &disk.name)?.ok_or(LibvirtErrKind::NoStorageVol)?;
        data_disk_paths.push(volume::volume_path(&vol)?);
    }

    let devices = compose_devices(&boot_path, &cidata_path, &data_disk_paths, &console_path, &opts.networks);
    let metadata = domain::instance_metadata_xml(&hash);
    let domain_xml = domain::default_domain_xml(&opts.name, CANONICAL_MACHINE, &devices, &metadata);

    let defined = domain::define_and_start(client, &domain_xml)?;
    let final_xml = domain::xml_desc(&defined)?;

    Ok(SyncOutcome {
        domain_xml: final_xml,
        already_valid: false,
    })
}

/// Shuts down and undefines the domain (idempotent), then best-effort
/// deletes its cidata/boot/console volumes.
pub fn finalize(client: &LibvirtClient, opts: &InstanceOptions) -> crate::Result<()> {
    domain::delete_domain_by_name(client, &opts.name)?;

    let pool = match volume::lookup_pool(client, &opts.storage_pool) {
        Ok(pool) => pool,
        Err(e) => {
            warn!("could not look up storage pool [{}] during finalize: {}", opts.storage_pool, e);
            return Ok(());
        }
    };

    for name in [
        cloudinit::cidata_volume_name(&opts.name),
        cloudinit::boot_volume_name(&opts.name),
        cloudinit::console_volume_name(&opts.name),
    ]
    .iter()
    {
        if let Err(e) = volume::delete_volume_if_exists(&pool, name) {
            warn!("best-effort volume cleanup failed for [{}]: {}", name, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_volume_name_takes_the_url_basename() {
        assert_eq!(image_volume_name("http://localhost:8080/hpcr.qcow2"), "hpcr.qcow2");
    }

    #[test]
    fn compose_devices_falls_back_to_the_default_network() {
        let devices = compose_devices("/pool/boot.qcow2", "/pool/cidata.iso", &[], "/pool/console.log", &[]);
        assert!(devices.contains(hpcr_definitions::options::DEFAULT_NETWORK));
    }

    #[test]
    fn compose_devices_orders_data_disks_after_cidata() {
        let devices = compose_devices(
            "/pool/boot.qcow2",
            "/pool/cidata.iso",
            &["/pool/disk0.qcow2".to_string()],
            "/pool/console.log",
            &["default".to_string()],
        );
        let cidata_pos = devices.find("cidata.iso").unwrap();
        let disk_pos = devices.find("disk0.qcow2").unwrap();
        assert!(cidata_pos < disk_pos);
    }
}
