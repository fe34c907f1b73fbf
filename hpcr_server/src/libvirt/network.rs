//! Network and DHCP-lease lookups (C4), grounded on `onprem/network.go`.

use super::{LibvirtClient, LibvirtErrKind};
use virt::network::Network;

pub const DEFAULT_NETWORK: &str = "default";

pub fn lookup_network(client: &LibvirtClient, name: &str) -> crate::Result<Network> {
    Network::lookup_by_name(&client.connect, name)
        .map_err(|e| LibvirtErrKind::CallFailed("NetworkLookupByName".into(), e.to_string()).into())
}

/// Fetches every DHCP lease on `network` (max `i32::MAX`, matching the Go
/// client's `math.MaxInt32`), filtered to those whose `hostname` list
/// contains `instance_name`, returning their addresses.
pub fn ip_addresses_for_instance(network: &Network, instance_name: &str) -> crate::Result<Vec<String>> {
    let leases = network
        .get_dhcp_leases(None, i32::max_value())
        .map_err(|e| LibvirtErrKind::CallFailed("NetworkGetDHCPLeases".into(), e.to_string()))?;

    Ok(leases
        .into_iter()
        .filter(|lease| lease.hostname.as_deref() == Some(instance_name))
        .filter_map(|lease| lease.ipaddr)
        .collect())
}
