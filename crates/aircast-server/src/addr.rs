//! Local address enumeration for operators picking a bind address.

use std::net::Ipv4Addr;

use tracing::debug;

/// Enumerate local IPv4 addresses, loopback excluded, private `192.168.*`
/// addresses first.
///
/// A usability affordance for front ends, not part of the protocol
/// contract.
pub fn local_addresses() -> Vec<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!(error = %e, "Interface enumeration failed");
            return Vec::new();
        }
    };

    let mut addresses: Vec<Ipv4Addr> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.addr {
            if_addrs::IfAddr::V4(v4) => Some(v4.ip),
            if_addrs::IfAddr::V6(_) => None,
        })
        .collect();

    sort_addresses(&mut addresses);
    addresses.dedup();
    addresses
}

fn is_private(addr: &Ipv4Addr) -> bool {
    addr.octets()[..2] == [192, 168]
}

fn sort_addresses(addresses: &mut [Ipv4Addr]) {
    addresses.sort_by(|lhs, rhs| {
        is_private(rhs)
            .cmp(&is_private(lhs))
            .then_with(|| lhs.cmp(rhs))
    });
}
