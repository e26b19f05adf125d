//! Source address selection for outgoing offers

use std::io;
use std::net::Ipv4Addr;

use dhcp4::Interface;
use nix::ifaddrs::getifaddrs;

use crate::error::ProxyDhcpError;

/// Pick the IP address to advertise in offers going out `intf`.
///
/// The boot client fetches its images from this address, so it has to be
/// reachable from the client's side of the interface.
pub fn interface_ip(intf: &Interface) -> Result<Ipv4Addr, ProxyDhcpError> {
    let addrs: Vec<Ipv4Addr> = getifaddrs()
        .map_err(io::Error::from)?
        .filter(|ifa| ifa.interface_name == intf.name)
        .filter_map(|ifa| ifa.address.and_then(|addr| addr.as_sockaddr_in().map(|sin| sin.ip())))
        .collect();

    best_address(&addrs).ok_or(ProxyDhcpError::NoUsableAddress)
}

/// First address of the highest non-empty preference tier: global unicast
/// (RFC 1918 included), then link-local unicast, then loopback. Order
/// within a tier is whatever the interface listing yielded.
fn best_address(addrs: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    let tiers: [fn(&Ipv4Addr) -> bool; 3] =
        [is_global_unicast, Ipv4Addr::is_link_local, Ipv4Addr::is_loopback];

    for usable in tiers {
        if let Some(ip) = addrs.iter().find(|ip| usable(ip)) {
            return Some(*ip);
        }
    }

    None
}

fn is_global_unicast(ip: &Ipv4Addr) -> bool {
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast())
}
