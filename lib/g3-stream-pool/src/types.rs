/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl From<&IpAddr> for AddressFamily {
    fn from(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl From<&SocketAddr> for AddressFamily {
    fn from(addr: &SocketAddr) -> Self {
        AddressFamily::from(&addr.ip())
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => f.write_str("ipv4"),
            AddressFamily::Ipv6 => f.write_str("ipv6"),
        }
    }
}

/// The host part of a destination, either already an IP address or
/// a domain that the resolver is responsible for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Host {
    Ip(IpAddr),
    Domain(Arc<str>),
}

impl Host {
    pub fn from_domain(domain: &str) -> Self {
        Host::Domain(Arc::from(domain))
    }
}

impl FromStr for Host {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty host string");
        }
        if let Ok(ip) = IpAddr::from_str(s) {
            Ok(Host::Ip(ip))
        } else {
            Ok(Host::from_domain(s))
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Ip(ip) => write!(f, "{ip}"),
            Host::Domain(domain) => f.write_str(domain),
        }
    }
}

/// host:port of the logical destination
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UpstreamAddr {
    host: Host,
    port: u16,
}

impl UpstreamAddr {
    pub fn new(host: Host, port: u16) -> Self {
        UpstreamAddr { host, port }
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host_eq(&self, other: &UpstreamAddr) -> bool {
        self.host == other.host
    }
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            Host::Ip(IpAddr::V4(ip)) => write!(f, "{ip}:{}", self.port),
            Host::Domain(domain) => write!(f, "{domain}:{}", self.port),
        }
    }
}

/// Identity of one pooled stream demand: the destination plus the
/// privacy / network partition it has to be served from, and whether
/// the scheme requires TLS on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey {
    destination: UpstreamAddr,
    partition: Option<Arc<str>>,
    using_tls: bool,
}

impl StreamKey {
    pub fn new(destination: UpstreamAddr, using_tls: bool) -> Self {
        StreamKey {
            destination,
            partition: None,
            using_tls,
        }
    }

    pub fn set_partition(&mut self, partition: &str) {
        self.partition = Some(Arc::from(partition));
    }

    #[inline]
    pub fn destination(&self) -> &UpstreamAddr {
        &self.destination
    }

    #[inline]
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    #[inline]
    pub fn using_tls(&self) -> bool {
        self.using_tls
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Some(p) => write!(f, "{}|{p}", self.destination),
            None => write!(f, "{}", self.destination),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_from_str() {
        assert_eq!(
            Host::from_str("127.0.0.1").unwrap(),
            Host::Ip(IpAddr::from_str("127.0.0.1").unwrap())
        );
        assert_eq!(
            Host::from_str("2001:db8::1").unwrap(),
            Host::Ip(IpAddr::from_str("2001:db8::1").unwrap())
        );
        assert_eq!(
            Host::from_str("www.example.net").unwrap(),
            Host::from_domain("www.example.net")
        );
        assert!(Host::from_str("").is_err());
    }

    #[test]
    fn upstream_addr_display() {
        let addr = UpstreamAddr::new(Host::from_str("2001:db8::1").unwrap(), 443);
        assert_eq!(addr.to_string(), "[2001:db8::1]:443");
        let addr = UpstreamAddr::new(Host::from_domain("www.example.net"), 80);
        assert_eq!(addr.to_string(), "www.example.net:80");
    }

    #[test]
    fn priority_order() {
        assert!(RequestPriority::High > RequestPriority::Normal);
        assert!(RequestPriority::Normal > RequestPriority::Low);
        assert_eq!(RequestPriority::default(), RequestPriority::Normal);
    }
}
