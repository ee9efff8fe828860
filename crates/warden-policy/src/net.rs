// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Private-range IP law shared by the dispatcher egress rules and the MCP
//! domain proxy.
//!
//! Blocks: RFC 1918, loopback, link-local, broadcast, unspecified, the cloud
//! metadata endpoint, IPv6 loopback, unique-local, and link-local. Resolved
//! addresses in these ranges are never tunnelled or allow-listed.

use std::net::{IpAddr, Ipv4Addr};

/// Check if an IP is in a private or reserved range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || *v4 == Ipv4Addr::new(169, 254, 169, 254) // cloud metadata
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn blocks_rfc1918() {
        for ip in ["10.0.0.1", "172.16.0.1", "172.31.255.255", "192.168.1.1"] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn blocks_loopback_linklocal_metadata() {
        for ip in ["127.0.0.1", "169.254.1.1", "169.254.169.254", "0.0.0.0", "255.255.255.255"] {
            assert!(is_private_ip(&ip.parse().unwrap()), "{ip}");
        }
    }

    #[test]
    fn blocks_private_v6() {
        assert!(is_private_ip(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_private_ip(&IpAddr::V6(Ipv6Addr::UNSPECIFIED)));
        assert!(is_private_ip(&"fc00::1".parse().unwrap()));
        assert!(is_private_ip(&"fd12::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
    }

    #[test]
    fn allows_public() {
        for ip in ["8.8.8.8", "1.1.1.1", "104.18.0.1"] {
            assert!(!is_private_ip(&ip.parse().unwrap()), "{ip}");
        }
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }
}
