// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain-filtering HTTP-CONNECT proxy.
//!
//! MCP containers have no direct egress; their iptables only reach this
//! proxy. The proxy accepts the `CONNECT host:port` verb, checks the caller's
//! source IP against the registration table and the target host against that
//! caller's allow-list, resolves the host, and splices the tunnel. Every
//! request is audited, allowed or denied.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use warden_audit::{AuditKind, AuditLogger};
use warden_core::WardenError;
use warden_policy::is_private_ip;

/// Resolves a hostname to connectable addresses.
///
/// Implementations must never return addresses in private or reserved
/// ranges; [`SystemResolver`] filters them after DNS resolution.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, WardenError>;
}

/// DNS resolution through the OS resolver, private ranges dropped.
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, WardenError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| WardenError::Mcp {
                server: host.to_string(),
                message: format!("resolution failed: {e}"),
            })?
            .filter(|addr| {
                let private = is_private_ip(&addr.ip());
                if private {
                    warn!(host, ip = %addr.ip(), "blocked: target resolved to private range");
                }
                !private
            })
            .collect();

        if addrs.is_empty() {
            return Err(WardenError::Mcp {
                server: host.to_string(),
                message: "host resolves only to blocked addresses".to_string(),
            });
        }
        Ok(addrs)
    }
}

#[derive(Clone)]
struct Registration {
    server_name: String,
    allowed_hosts: HashSet<String>,
}

/// The CONNECT proxy with its per-container registration table.
pub struct DomainProxy {
    listener: TcpListener,
    registrations: Arc<Mutex<HashMap<IpAddr, Registration>>>,
    resolver: Arc<dyn HostResolver>,
    audit: AuditLogger,
}

impl DomainProxy {
    /// Bind on an OS-chosen loopback port.
    pub async fn bind(audit: AuditLogger) -> Result<Self, WardenError> {
        Self::bind_with_resolver(audit, Arc::new(SystemResolver)).await
    }

    /// Bind with a custom resolver (tests).
    pub async fn bind_with_resolver(
        audit: AuditLogger,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, WardenError> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| WardenError::transport("proxy bind failed", e))?;
        Ok(Self {
            listener,
            registrations: Arc::new(Mutex::new(HashMap::new())),
            resolver,
            audit,
        })
    }

    /// The address containers are pointed at.
    pub fn local_addr(&self) -> Result<SocketAddr, WardenError> {
        self.listener
            .local_addr()
            .map_err(|e| WardenError::transport("proxy local_addr", e))
    }

    /// Register a container (by its bridge IP) with its hostname allow-list.
    pub fn register(&self, ip: IpAddr, server_name: &str, allowed_hosts: &[String]) {
        self.registrations
            .lock()
            .expect("registrations lock poisoned")
            .insert(
                ip,
                Registration {
                    server_name: server_name.to_string(),
                    allowed_hosts: allowed_hosts.iter().cloned().collect(),
                },
            );
        debug!(ip = %ip, server = server_name, "proxy registration added");
    }

    /// Remove a container's registration.
    pub fn unregister(&self, ip: &IpAddr) {
        self.registrations
            .lock()
            .expect("registrations lock poisoned")
            .remove(ip);
    }

    /// Accept-loop. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let proxy = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = proxy.handle_connection(stream, peer).await {
                            debug!(peer = %peer, error = %e, "proxy connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "proxy accept failed");
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), WardenError> {
        let head = read_request_head(&mut stream).await?;
        let request_line = head.lines().next().unwrap_or_default().to_string();

        let Some((host, port)) = parse_connect_line(&request_line) else {
            self.audit_decision(&peer, "-", &request_line, false, "non-CONNECT method")
                .await;
            respond(&mut stream, "405 Method Not Allowed").await;
            return Ok(());
        };

        let registration = {
            self.registrations
                .lock()
                .expect("registrations lock poisoned")
                .get(&peer.ip())
                .cloned()
        };
        let Some(registration) = registration else {
            self.audit_decision(&peer, "-", &host, false, "unregistered caller")
                .await;
            respond(&mut stream, "403 Forbidden").await;
            return Ok(());
        };

        if !registration.allowed_hosts.contains(&host) {
            self.audit_decision(
                &peer,
                &registration.server_name,
                &host,
                false,
                "host not in allow-list",
            )
            .await;
            respond(&mut stream, "403 Forbidden").await;
            return Ok(());
        }

        let addrs = match self.resolver.resolve(&host, port).await {
            Ok(addrs) => addrs,
            Err(e) => {
                self.audit_decision(
                    &peer,
                    &registration.server_name,
                    &host,
                    false,
                    &e.to_string(),
                )
                .await;
                respond(&mut stream, "502 Bad Gateway").await;
                return Ok(());
            }
        };

        let mut upstream = match TcpStream::connect(addrs.as_slice()).await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.audit_decision(
                    &peer,
                    &registration.server_name,
                    &host,
                    false,
                    &format!("connect failed: {e}"),
                )
                .await;
                respond(&mut stream, "502 Bad Gateway").await;
                return Ok(());
            }
        };

        self.audit_decision(&peer, &registration.server_name, &host, true, "tunnel")
            .await;
        respond(&mut stream, "200 Connection Established").await;

        match tokio::io::copy_bidirectional(&mut stream, &mut upstream).await {
            Ok((up, down)) => {
                info!(server = %registration.server_name, host = %host, up, down, "tunnel closed");
            }
            Err(e) => {
                debug!(host = %host, error = %e, "tunnel ended with error");
            }
        }
        Ok(())
    }

    async fn audit_decision(
        &self,
        peer: &SocketAddr,
        server: &str,
        target: &str,
        allowed: bool,
        reason: &str,
    ) {
        self.audit
            .log(
                AuditKind::McpProxy,
                server,
                serde_json::json!({
                    "caller": peer.ip().to_string(),
                    "targetDomain": target,
                    "allowed": allowed,
                    "reason": reason,
                }),
            )
            .await;
    }
}

/// Read until the end of the request head (CRLFCRLF), bounded at 8 KiB.
async fn read_request_head(stream: &mut TcpStream) -> Result<String, WardenError> {
    let mut buf = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") && buf.len() < 8 * 1024 {
        let n = stream
            .read(&mut byte)
            .await
            .map_err(|e| WardenError::transport("proxy read", e))?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).map_err(|_| WardenError::Transport {
        message: "non-UTF-8 request head".to_string(),
        source: None,
    })
}

/// Parse `CONNECT host:port HTTP/1.1`, returning the target.
fn parse_connect_line(line: &str) -> Option<(String, u16)> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "CONNECT" {
        return None;
    }
    let target = parts.next()?;
    let (host, port) = target.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

async fn respond(stream: &mut TcpStream, status: &str) {
    let response = format!("HTTP/1.1 {status}\r\n\r\n");
    let _ = stream.write_all(response.as_bytes()).await;
}
