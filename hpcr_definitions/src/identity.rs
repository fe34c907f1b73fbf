//! MAC address and machine-id derivation from a UUID or, failing that, a
//! SHA-256 hash of an arbitrary seed string.
//!
//! Grounded on `onprem/mac.go` and `onprem/machineid.go`. Both force the
//! locally-administered, unicast bit on the first byte of the address so the
//! derived MAC never collides with a vendor-assigned one.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// `(byte0 & 0xfe) | 0x02`: clears the multicast bit, sets the
/// locally-administered bit.
fn force_local_unicast(byte0: u8) -> u8 {
    (byte0 & 0xfe) | 0x02
}

fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Derives a MAC address from the first six bytes of a UUID.
pub fn mac_from_uuid(uuid: &str) -> crate::Result<String> {
    let parsed = Uuid::parse_str(uuid)?;
    let raw = parsed.as_bytes();
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&raw[..6]);
    mac[0] = force_local_unicast(mac[0]);
    Ok(format_mac(&mac))
}

/// Derives a MAC address from the first six bytes of `SHA-256(seed)`.
pub fn mac_from_hash(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&digest[..6]);
    mac[0] = force_local_unicast(mac[0]);
    format_mac(&mac)
}

/// Tries [`mac_from_uuid`] first, falling back to [`mac_from_hash`] of `seed`
/// when `uuid` fails to parse.
pub fn mac_from_uuid_or_hash(uuid: &str, seed: &str) -> String {
    mac_from_uuid(uuid).unwrap_or_else(|_| mac_from_hash(seed))
}

/// First 16 bytes of a UUID, as 32 lowercase hex chars (a libvirt machine-id).
pub fn machine_id_from_uuid(uuid: &str) -> crate::Result<String> {
    let parsed = Uuid::parse_str(uuid)?;
    Ok(parsed.as_bytes()[..16]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// First 16 bytes of `SHA-256(seed)`, as 32 lowercase hex chars.
pub fn machine_id_from_hash(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Tries [`machine_id_from_uuid`] first, falling back to [`machine_id_from_hash`].
pub fn machine_id_from_uuid_or_hash(uuid: &str, seed: &str) -> String {
    machine_id_from_uuid(uuid).unwrap_or_else(|_| machine_id_from_hash(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_from_hash_matches_known_vector() {
        assert_eq!(mac_from_hash("This is some input"), "B6:8C:CA:E7:6F:F1");
    }

    #[test]
    fn mac_from_uuid_matches_known_vector() {
        assert_eq!(
            mac_from_uuid("d3414e67-a26f-4791-96f1-cd842c15346c").unwrap(),
            "D2:41:4E:67:A2:6F"
        );
    }

    #[test]
    fn machine_id_is_always_32_hex_chars() {
        assert_eq!(machine_id_from_hash("anything").len(), 32);
        assert_eq!(
            machine_id_from_uuid("d3414e67-a26f-4791-96f1-cd842c15346c")
                .unwrap()
                .len(),
            32
        );
    }
}
