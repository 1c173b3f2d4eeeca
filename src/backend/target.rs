//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single named upstream
//! - Validate `host:port` addresses at startup
//! - Open raw TCP connections to the upstream

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use url::Host;

use crate::error::ProxyError;

/// Reasons a configured address is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("missing port in `{0}`")]
    MissingPort(String),

    #[error("invalid port in `{0}`")]
    InvalidPort(String),

    #[error("invalid host in `{input}`: {reason}")]
    InvalidHost { input: String, reason: String },

    #[error("`{0}` must be a bare host:port")]
    NotAnAuthority(String),
}

/// A validated `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress {
    host: Host<String>,
    port: u16,
}

impl BackendAddress {
    /// Parse `host:port`. IPv6 hosts must be bracketed (`[::1]:8000`).
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.contains(['/', '?', '#', '@']) {
            return Err(AddressError::NotAnAuthority(input.to_string()));
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(input.to_string()))?;

        // An unbracketed IPv6 literal splits on its last group.
        if host.contains(':') && !host.starts_with('[') {
            return Err(AddressError::MissingPort(input.to_string()));
        }

        let port: u16 = port
            .parse()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| AddressError::InvalidPort(input.to_string()))?;

        let host = Host::parse(host).map_err(|e| AddressError::InvalidHost {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { host, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Authority form used for request URIs (`host:port`).
    pub fn authority(&self) -> String {
        self.to_string()
    }

    /// Open a TCP connection, bounded by `timeout`.
    pub async fn connect(&self, timeout: Duration) -> Result<TcpStream, ProxyError> {
        let connect = async {
            match &self.host {
                Host::Domain(domain) => TcpStream::connect((domain.as_str(), self.port)).await,
                Host::Ipv4(ip) => TcpStream::connect((*ip, self.port)).await,
                Host::Ipv6(ip) => TcpStream::connect((*ip, self.port)).await,
            }
        };

        let stream = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ProxyError::BackendUnreachable {
                address: self.to_string(),
                reason: format!("connect timed out after {:?}", timeout),
            })?
            .map_err(|e| ProxyError::BackendUnreachable {
                address: self.to_string(),
                reason: e.to_string(),
            })?;

        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `Host` renders IPv6 with brackets.
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A single named upstream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub name: String,
    pub address: BackendAddress,
}

impl BackendTarget {
    pub fn new(name: impl Into<String>, address: BackendAddress) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
