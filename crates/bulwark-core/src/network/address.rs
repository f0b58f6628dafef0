//! Address classification for outbound requests

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Name of the restricted range `ip` falls in, or `None` for a public address
pub fn restriction(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => restriction_v4(v4),
        IpAddr::V6(v6) => restriction_v6(v6),
    }
}

pub fn is_restricted(ip: IpAddr) -> bool {
    restriction(ip).is_some()
}

fn restriction_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let o = ip.octets();

    if ip.is_loopback() {
        return Some("loopback");
    }
    if ip.is_private() {
        return Some("private");
    }
    // Includes 169.254.169.254 cloud metadata
    if ip.is_link_local() {
        return Some("link-local");
    }
    if o[0] == 0 {
        return Some("unspecified");
    }
    if ip.is_broadcast() {
        return Some("broadcast");
    }
    if o[0] == 100 && (64..=127).contains(&o[1]) {
        return Some("shared address space");
    }
    if o[0] == 192 && o[1] == 0 && o[2] == 0 {
        return Some("protocol assignment");
    }
    if ip.is_documentation() {
        return Some("documentation");
    }
    if o[0] == 198 && (o[1] & 0xfe) == 18 {
        return Some("benchmarking");
    }
    if ip.is_multicast() {
        return Some("multicast");
    }
    if o[0] >= 240 {
        return Some("reserved");
    }
    None
}

fn restriction_v6(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_loopback() {
        return Some("loopback");
    }
    if ip.is_unspecified() {
        return Some("unspecified");
    }
    if ip.is_multicast() {
        return Some("multicast");
    }

    let seg = ip.segments();
    if (seg[0] & 0xfe00) == 0xfc00 {
        return Some("unique local");
    }
    if (seg[0] & 0xffc0) == 0xfe80 {
        return Some("link-local");
    }
    if (seg[0] & 0xffc0) == 0xfec0 {
        return Some("site-local");
    }
    if seg[0] == 0x2001 && seg[1] == 0x0db8 {
        return Some("documentation");
    }

    // ::ffff:a.b.c.d and 64:ff9b::a.b.c.d reach the embedded IPv4 host
    if let Some(v4) = ip.to_ipv4_mapped() {
        return restriction_v4(v4);
    }
    if seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        return restriction_v4(embedded_v4(&seg));
    }
    // Deprecated ::a.b.c.d form
    if seg[..6] == [0; 6] {
        return Some("ipv4-compatible");
    }
    None
}

fn embedded_v4(seg: &[u16; 8]) -> Ipv4Addr {
    Ipv4Addr::new(
        (seg[6] >> 8) as u8,
        (seg[6] & 0xff) as u8,
        (seg[7] >> 8) as u8,
        (seg[7] & 0xff) as u8,
    )
}
