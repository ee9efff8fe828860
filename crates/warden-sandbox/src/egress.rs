// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Egress rule construction for network-enabled executors.
//!
//! Containers with an allow-list policy join a dedicated bridge whose
//! forward chain permits only: loopback, DNS toward the gateway's DNS proxy,
//! and TCP/443 toward addresses resolved from the allowed domains. Resolved
//! addresses in private ranges are dropped before any rule is emitted.

use std::net::{IpAddr, SocketAddr};

use tracing::warn;
use warden_policy::is_private_ip;

/// Resolve the allowed domains, discarding addresses in private ranges.
pub async fn resolve_allowed_domains(domains: &[String]) -> Vec<IpAddr> {
    let mut resolved = Vec::new();
    for domain in domains {
        match tokio::net::lookup_host((domain.as_str(), 443)).await {
            Ok(addrs) => {
                for addr in addrs {
                    let ip = addr.ip();
                    if is_private_ip(&ip) {
                        warn!(domain = %domain, ip = %ip, "blocked: domain resolved to private range");
                    } else {
                        resolved.push(ip);
                    }
                }
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "domain resolution failed");
            }
        }
    }
    resolved.sort();
    resolved.dedup();
    resolved
}

/// Build the iptables rule lines for one container's egress chain.
///
/// `dns_proxy` is the gateway-controlled resolver the container must use;
/// all other DNS is dropped along with everything else.
pub fn iptables_rules(chain: &str, allowed_ips: &[IpAddr], dns_proxy: SocketAddr) -> Vec<String> {
    let mut rules = vec![
        format!("-A {chain} -o lo -j ACCEPT"),
        format!(
            "-A {chain} -p udp -d {} --dport {} -j ACCEPT",
            dns_proxy.ip(),
            dns_proxy.port()
        ),
    ];

    for ip in allowed_ips {
        if is_private_ip(ip) {
            // Belt and braces: resolution already filters these.
            continue;
        }
        rules.push(format!("-A {chain} -p tcp -d {ip} --dport 443 -j ACCEPT"));
    }

    rules.push(format!("-A {chain} -j DROP"));
    rules
}
