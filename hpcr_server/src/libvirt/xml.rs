//! Small, composable XML device snippets appended to
//! [`super::domain::default_domain_xml`]'s `extra_devices` slot, grounded on
//! `onprem/datadisk.go::CreateDataDiskXML` and `onprem/cloudinit.go`.

/// Escapes the five predefined XML entities so that names and paths drawn
/// from CRD-supplied values (which may contain `&`, `<`, `>`, `"`, `'`)
/// can't break out of an attribute or element body.
pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// The boot disk at `vda`, qcow2, boot order 1.
pub fn boot_disk(path: &str) -> String {
    disk_device("vda", "qcow2", path, Some(1))
}

/// The cloud-init ISO at `vdb`, raw format.
pub fn cidata_disk(path: &str) -> String {
    disk_device("vdb", "raw", path, None)
}

/// An attached data disk. Devices start at `vdd` (offset 13), matching
/// `fmt.Sprintf("vd%x", index+13)` in the original.
pub fn data_disk(index: usize, path: &str) -> String {
    let dev = format!("vd{:x}", index + 13);
    disk_device(&dev, "qcow2", path, None)
}

fn disk_device(dev: &str, format: &str, path: &str, boot_order: Option<u32>) -> String {
    let boot = boot_order
        .map(|order| format!(r#"<boot order="{}"/>"#, order))
        .unwrap_or_default();
    format!(
        r#"<disk type="file" device="disk">
      <driver name="qemu" type="{format}" iommu="on"/>
      <source file="{path}"/>
      <target dev="{dev}" bus="virtio"/>
      {boot}
    </disk>"#,
        format = escape_xml(format),
        path = escape_xml(path),
        dev = escape_xml(dev),
        boot = boot,
    )
}

/// The console-log file sink, `append=off` so each rebuild starts clean.
pub fn console_log_sink(path: &str) -> String {
    format!(
        r#"<console type="file">
      <source path="{path}" append="off"/>
      <target type="sclp" port="1"/>
    </console>"#,
        path = escape_xml(path)
    )
}

/// A network interface device for the named libvirt network.
pub fn network_interface(network: &str) -> String {
    format!(
        r#"<interface type="network">
      <source network="{network}"/>
      <model type="virtio"/>
      <driver iommu="on"/>
    </interface>"#,
        network = escape_xml(network)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_disk_devices_start_at_vdd() {
        assert!(data_disk(0, "/pool/disk0.qcow2").contains("dev=\"vdd\""));
        assert!(data_disk(1, "/pool/disk1.qcow2").contains("dev=\"vde\""));
    }

    #[test]
    fn boot_disk_has_boot_order_one() {
        assert!(boot_disk("/pool/boot-vm.qcow2").contains(r#"<boot order="1"/>"#));
    }

    #[test]
    fn escape_xml_handles_all_five_entities() {
        assert_eq!(escape_xml(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
    }

    #[test]
    fn network_interface_escapes_ampersand_in_name() {
        assert!(network_interface("r&d").contains("r&amp;d"));
    }
}
