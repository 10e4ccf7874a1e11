//! Network interface enumeration.
//!
//! Lists local IPv4 interfaces so the channel can bind per interface and
//! discovery can poll each subnet's broadcast address.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// A local IPv4 network interface with its IP address and subnet mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl NetworkInterface {
    /// Compute the subnet-directed broadcast address (ip | !mask).
    pub fn broadcast_address(&self) -> Ipv4Addr {
        let ip = u32::from(self.ip);
        let mask = u32::from(self.netmask);
        Ipv4Addr::from(ip | !mask)
    }

    /// Whether `addr` is on this interface's subnet. The subnet broadcast
    /// address counts as on it.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(self.ip) & mask == u32::from(addr) & mask
    }
}

/// Enumerate all local IPv4 network interfaces, excluding loopback.
///
/// Returns an empty vec on unsupported platforms (Windows), allowing callers
/// to fall back to limited broadcast (255.255.255.255).
pub fn get_local_interfaces() -> io::Result<Vec<NetworkInterface>> {
    get_local_interfaces_impl()
}

/// Poll targets for every local interface: its broadcast address on `port`.
///
/// Falls back to 255.255.255.255 when no interface is found.
pub fn broadcast_targets(port: u16) -> Vec<SocketAddr> {
    let interfaces = get_local_interfaces().unwrap_or_else(|e| {
        log::warn!("failed to enumerate network interfaces: {}", e);
        Vec::new()
    });
    let mut targets: Vec<SocketAddr> = interfaces
        .iter()
        .map(|iface| SocketAddr::V4(SocketAddrV4::new(iface.broadcast_address(), port)))
        .collect();
    targets.sort();
    targets.dedup();
    if targets.is_empty() {
        targets.push(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)));
    }
    targets
}

#[cfg(unix)]
fn get_local_interfaces_impl() -> io::Result<Vec<NetworkInterface>> {
    let mut interfaces = Vec::new();

    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;
            current = ifa.ifa_next;

            if ifa.ifa_addr.is_null() || ifa.ifa_netmask.is_null() {
                continue;
            }
            if (*ifa.ifa_addr).sa_family as i32 != libc::AF_INET {
                continue;
            }
            // broadcast-capable only
            if ifa.ifa_flags & libc::IFF_BROADCAST as libc::c_uint == 0 {
                continue;
            }

            let ip = sockaddr_to_ipv4(ifa.ifa_addr);
            if ip.is_loopback() {
                continue;
            }
            let netmask = sockaddr_to_ipv4(ifa.ifa_netmask);

            interfaces.push(NetworkInterface { ip, netmask });
        }

        libc::freeifaddrs(ifaddrs);
    }

    Ok(interfaces)
}

/// # Safety
/// `addr` must point to a valid `sockaddr_in`.
#[cfg(unix)]
unsafe fn sockaddr_to_ipv4(addr: *const libc::sockaddr) -> Ipv4Addr {
    let addr = addr as *const libc::sockaddr_in;
    Ipv4Addr::from((*addr).sin_addr.s_addr.to_ne_bytes())
}

#[cfg(windows)]
fn get_local_interfaces_impl() -> io::Result<Vec<NetworkInterface>> {
    // GetAdaptersAddresses would be needed here; callers fall back to
    // limited broadcast instead.
    Ok(vec![])
}
