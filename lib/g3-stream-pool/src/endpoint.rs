/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

/// Compact identifier of a root CA, as advertised by servers via DNS
/// or inside the TLS handshake.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TrustAnchorId(Bytes);

impl TrustAnchorId {
    pub fn new<T: Into<Bytes>>(id: T) -> Self {
        TrustAnchorId(id.into())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TrustAnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustAnchorId(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        f.write_str(")")
    }
}

/// Returns the ordered subsequence of `policy_ids` whose elements are
/// also offered in `server_ids`. The result keeps the local preference
/// order; empty means no acceptable intersection.
pub fn select_trust_anchor_ids(
    server_ids: &[TrustAnchorId],
    policy_ids: &[TrustAnchorId],
) -> Vec<TrustAnchorId> {
    policy_ids
        .iter()
        .filter(|id| server_ids.contains(id))
        .cloned()
        .collect()
}

/// TLS-relevant metadata attached to a resolved endpoint, usually
/// carried by DNS HTTPS records.
#[derive(Clone, Debug, Default)]
pub struct EndpointMetadata {
    ech_config_list: Bytes,
    trust_anchor_ids: Vec<TrustAnchorId>,
    supported_protocol_alpns: Vec<String>,
}

impl EndpointMetadata {
    pub fn set_ech_config_list<T: Into<Bytes>>(&mut self, config_list: T) {
        self.ech_config_list = config_list.into();
    }

    pub fn set_trust_anchor_ids(&mut self, ids: Vec<TrustAnchorId>) {
        self.trust_anchor_ids = ids;
    }

    pub fn add_supported_protocol_alpn(&mut self, alpn: &str) {
        self.supported_protocol_alpns.push(alpn.to_string());
    }

    #[inline]
    pub fn ech_config_list(&self) -> &Bytes {
        &self.ech_config_list
    }

    #[inline]
    pub fn trust_anchor_ids(&self) -> &[TrustAnchorId] {
        &self.trust_anchor_ids
    }

    #[inline]
    pub fn supported_protocol_alpns(&self) -> &[String] {
        &self.supported_protocol_alpns
    }

    /// ECH is offered iff the config list is non-empty.
    pub fn ech_offered(&self) -> bool {
        !self.ech_config_list.is_empty()
    }

    pub fn advertises_h3(&self) -> bool {
        self.supported_protocol_alpns.iter().any(|s| s == "h3")
    }

    pub fn requires_tls(&self) -> bool {
        self.supported_protocol_alpns.iter().any(|s| s == "h2")
    }
}

/// One post-resolution destination candidate: the IP endpoints of both
/// address families plus the DNS-derived metadata.
#[derive(Clone, Debug, Default)]
pub struct ServiceEndpoint {
    ipv4_endpoints: Vec<SocketAddr>,
    ipv6_endpoints: Vec<SocketAddr>,
    metadata: EndpointMetadata,
}

impl ServiceEndpoint {
    pub fn push_ipv4_endpoint(&mut self, addr: SocketAddr) {
        debug_assert!(addr.is_ipv4());
        self.ipv4_endpoints.push(addr);
    }

    pub fn push_ipv6_endpoint(&mut self, addr: SocketAddr) {
        debug_assert!(addr.is_ipv6());
        self.ipv6_endpoints.push(addr);
    }

    pub fn set_metadata(&mut self, metadata: EndpointMetadata) {
        self.metadata = metadata;
    }

    #[inline]
    pub fn ipv4_endpoints(&self) -> &[SocketAddr] {
        &self.ipv4_endpoints
    }

    #[inline]
    pub fn ipv6_endpoints(&self) -> &[SocketAddr] {
        &self.ipv6_endpoints
    }

    #[inline]
    pub fn metadata(&self) -> &EndpointMetadata {
        &self.metadata
    }

    pub fn contains_addr(&self, addr: &SocketAddr) -> bool {
        if addr.is_ipv4() {
            self.ipv4_endpoints.contains(addr)
        } else {
            self.ipv6_endpoints.contains(addr)
        }
    }
}
