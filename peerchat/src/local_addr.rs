//! Local address discovery: pick the IPv4 address peers should use to reach us.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Used when no non-loopback IPv4 interface can be found.
pub const LOOPBACK_FALLBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// TEST-NET-1 address. Connecting a UDP socket to it sends nothing; it only selects a route.
const PROBE_TARGET: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

/// First non-internal IPv4 address of this host, else 127.0.0.1.
pub fn advertised_host() -> IpAddr {
    match probe_outbound_ipv4() {
        Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => IpAddr::V4(ip),
        Ok(ip) => {
            tracing::debug!(%ip, "route probe gave no external address, using loopback");
            IpAddr::V4(LOOPBACK_FALLBACK)
        }
        Err(e) => {
            tracing::debug!(error = %e, "route probe failed, using loopback");
            IpAddr::V4(LOOPBACK_FALLBACK)
        }
    }
}

fn probe_outbound_ipv4() -> std::io::Result<Ipv4Addr> {
    let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    sock.connect(PROBE_TARGET)?;
    match sock.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("expected IPv4 local address, got {ip}"),
        )),
    }
}
