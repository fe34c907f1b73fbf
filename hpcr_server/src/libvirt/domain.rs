//! Domain lifecycle operations and the default domain XML template (C4),
//! grounded on `onprem/domain.go`.

use super::xml::escape_xml;
use super::{LibvirtClient, LibvirtErrKind};
use std::thread::sleep;
use std::time::Duration;
use virt::domain::Domain;

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SHUTDOWN_MAX_ITERATIONS: u32 = 50;

/// `type=kvm`, OS `hvm/s390x/<machine>`, 4 GiB memory, 2 vCPU, UTC clock, no
/// memballoon, virtio RNG, one `sclp` console, one virtio NIC on `default`
/// with IOMMU on. Devices beyond the console/NIC are appended by the
/// provisioner.
pub fn default_domain_xml(name: &str, machine: &str, extra_devices: &str, metadata: &str) -> String {
    format!(
        r#"<domain type="kvm">
  <name>{name}</name>
  <memory unit="KiB">4194304</memory>
  <currentMemory unit="KiB">4194304</currentMemory>
  <vcpu placement="static">2</vcpu>
  <os>
    <type arch="s390x" machine="{machine}">hvm</type>
  </os>
  <clock offset="utc"/>
  <devices>
    <memballoon model="none"/>
    <rng model="virtio">
      <backend model="random">/dev/urandom</backend>
    </rng>
    <console type="pty">
      <target type="sclp" port="0"/>
    </console>
    <interface type="network">
      <source network="default"/>
      <model type="virtio"/>
      <driver iommu="on"/>
    </interface>
    {extra_devices}
  </devices>
  {metadata}
</domain>"#,
        name = escape_xml(name),
        machine = escape_xml(machine),
        extra_devices = extra_devices,
        metadata = metadata,
    )
}

/// `<instance xmlns="https://github.com/ibm-hyper-protect/k8s-operator-hpcr"><hash>…</hash></instance>`
pub fn instance_metadata_xml(hash: &str) -> String {
    format!(
        r#"<metadata><instance xmlns="https://github.com/ibm-hyper-protect/k8s-operator-hpcr"><hash>{}</hash></instance></metadata>"#,
        hash
    )
}

/// Extracts the content hash previously written via [`instance_metadata_xml`]
/// from a domain's live XML description, if present.
pub fn extract_instance_hash(domain_xml: &str) -> Option<String> {
    let start = domain_xml.find("<hash>")? + "<hash>".len();
    let end = domain_xml[start..].find("</hash>")? + start;
    Some(domain_xml[start..end].to_string())
}

/// `None` when no domain by that name exists (not an error).
pub fn lookup_domain(client: &LibvirtClient, name: &str) -> crate::Result<Option<Domain>> {
    match Domain::lookup_by_name(&client.connect, name) {
        Ok(domain) => Ok(Some(domain)),
        Err(e) if super::is_benign_absence(&e) => Ok(None),
        Err(e) => Err(LibvirtErrKind::CallFailed("DomainLookupByName".into(), e.to_string()).into()),
    }
}

pub fn define_and_start(client: &LibvirtClient, xml: &str) -> crate::Result<Domain> {
    let domain = Domain::define_xml(&client.connect, xml)
        .map_err(|e| LibvirtErrKind::CallFailed("DomainDefineXML".into(), e.to_string()))?;
    domain
        .set_autostart(true)
        .map_err(|e| LibvirtErrKind::CallFailed("DomainSetAutostart".into(), e.to_string()))?;
    domain
        .create()
        .map_err(|e| LibvirtErrKind::CallFailed("DomainCreate".into(), e.to_string()))?;
    Ok(domain)
}

pub fn xml_desc(domain: &Domain) -> crate::Result<String> {
    domain
        .get_xml_desc(0)
        .map_err(|e| LibvirtErrKind::CallFailed("DomainGetXMLDesc".into(), e.to_string()).into())
}

/// libvirt domain states, as observed through `get_state()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
    Pmsuspended,
    Unknown,
}

impl DomainState {
    fn from_code(code: u32) -> DomainState {
        match code {
            0 => DomainState::NoState,
            1 => DomainState::Running,
            2 => DomainState::Blocked,
            3 => DomainState::Paused,
            4 => DomainState::Shutdown,
            5 => DomainState::Shutoff,
            6 => DomainState::Crashed,
            7 => DomainState::Pmsuspended,
            _ => DomainState::Unknown,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            DomainState::Shutdown
                | DomainState::Shutoff
                | DomainState::Crashed
                | DomainState::NoState
                | DomainState::Paused
                | DomainState::Pmsuspended
        )
    }
}

fn domain_state(domain: &Domain) -> crate::Result<DomainState> {
    let (state, _reason) = domain
        .get_state()
        .map_err(|e| LibvirtErrKind::CallFailed("DomainGetState".into(), e.to_string()))?;
    Ok(DomainState::from_code(state))
}

/// Whether `domain` is currently in the `Running` state (used by the
/// idempotence check in provisioner step 1).
pub fn is_running(domain: &Domain) -> crate::Result<bool> {
    Ok(domain_state(domain)? == DomainState::Running)
}

/// Requests a graceful shutdown, polls every 2s for up to 50 iterations,
/// then destroys (ignoring "not active") and undefines. Timeout surfaces as
/// [`LibvirtErrKind::DomainShutdownTimeout`].
pub fn shutdown_destroy_undefine(domain: &Domain) -> crate::Result<()> {
    domain
        .shutdown()
        .map_err(|e| LibvirtErrKind::CallFailed("DomainShutdown".into(), e.to_string()))?;

    let mut stopped = false;
    for _ in 0..SHUTDOWN_MAX_ITERATIONS {
        let state = domain_state(domain)?;
        match state {
            DomainState::Running => {}
            DomainState::Blocked => warn!("domain is blocked while shutting down, continuing to poll"),
            s if s.is_terminal() => {
                stopped = true;
                break;
            }
            _ => warn!("domain in unexpected state while shutting down, continuing to poll"),
        }
        sleep(SHUTDOWN_POLL_INTERVAL);
    }

    if !stopped {
        return Err(LibvirtErrKind::DomainShutdownTimeout.into());
    }

    match domain.destroy() {
        Ok(_) => {}
        Err(e) if super::is_benign_absence(&e) => {}
        Err(e) => return Err(LibvirtErrKind::CallFailed("DomainDestroy".into(), e.to_string()).into()),
    }

    domain
        .undefine()
        .map(|_| ())
        .map_err(|e| LibvirtErrKind::CallFailed("DomainUndefine".into(), e.to_string()).into())
}

/// Looks the domain up by name and, if present, shuts it down and undefines
/// it; a missing domain is treated as already deleted (success).
pub fn delete_domain_by_name(client: &LibvirtClient, name: &str) -> crate::Result<()> {
    match lookup_domain(client, name)? {
        Some(domain) => shutdown_destroy_undefine(&domain),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_metadata_round_trips_the_hash() {
        let xml = default_domain_xml("vm-1", "s390-ccw-virtio", "", &instance_metadata_xml("deadbeef"));
        assert_eq!(extract_instance_hash(&xml), Some("deadbeef".to_string()));
    }

    #[test]
    fn domain_name_is_xml_escaped() {
        let xml = default_domain_xml("vm-1 & friends", "s390-ccw-virtio", "", "");
        assert!(xml.contains("<name>vm-1 &amp; friends</name>"));
    }

    #[test]
    fn terminal_states_cover_the_documented_set() {
        assert!(DomainState::Shutoff.is_terminal());
        assert!(DomainState::Crashed.is_terminal());
        assert!(DomainState::Pmsuspended.is_terminal());
        assert!(!DomainState::Running.is_terminal());
        assert!(!DomainState::Blocked.is_terminal());
    }
}
