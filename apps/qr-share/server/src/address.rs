use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, warn};

/// Picks the address other devices on the network should use to reach us: the first
/// non-loopback IPv4 interface, or loopback when none is up.
pub fn resolve_local_address() -> IpAddr {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            let candidates = interfaces
                .into_iter()
                .filter(|iface| !iface.is_loopback())
                .map(|iface| {
                    let ip = iface.ip();
                    (iface.name, ip)
                });
            match pick_lan_address(candidates) {
                Some(ip) => ip,
                None => {
                    warn!("no non-loopback IPv4 interface found; advertising loopback");
                    IpAddr::V4(Ipv4Addr::LOCALHOST)
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to list network interfaces; advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn pick_lan_address(candidates: impl IntoIterator<Item = (String, IpAddr)>) -> Option<IpAddr> {
    candidates.into_iter().find_map(|(name, ip)| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() && !v4.is_link_local() => {
            debug!(interface = %name, address = %v4, "using interface address");
            Some(ip)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use super::*;

    fn named(ip: IpAddr) -> (String, IpAddr) {
        ("eth0".to_string(), ip)
    }

    #[test_timeout::timeout]
    fn prefers_first_routable_ipv4() {
        let picked = pick_lan_address([
            named(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))),
            named(IpAddr::V4(Ipv4Addr::new(169, 254, 3, 4))),
            named(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
            named(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
        ]);
        assert_eq!(picked, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
    }

    #[test_timeout::timeout]
    fn skips_loopback_and_ipv6_only() {
        let picked = pick_lan_address([
            named(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            named(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        ]);
        assert_eq!(picked, None);
    }
}
