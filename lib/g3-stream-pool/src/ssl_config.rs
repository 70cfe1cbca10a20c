/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use bytes::Bytes;

use crate::config::ConnectionAttemptConfig;
use crate::endpoint::{select_trust_anchor_ids, EndpointMetadata, TrustAnchorId};

/// Per-attempt TLS parameter overlay. Built only after the resolver has
/// signalled that crypto metadata is final, and mutated only by the ECH
/// and Trust-Anchor-ID retry paths.
#[derive(Clone, Debug, Default)]
pub struct SslConfig {
    ech_config_list: Bytes,
    ech_disabled: bool,
    trust_anchor_ids: Vec<TrustAnchorId>,
    alpn_protocols: Vec<String>,
}

impl SslConfig {
    /// Overlay the per-connection policy onto the endpoint metadata.
    pub(crate) fn build(config: &ConnectionAttemptConfig, metadata: &EndpointMetadata) -> Self {
        let mut ssl_config = SslConfig::default();
        if config.ech_enabled() {
            ssl_config.ech_config_list = metadata.ech_config_list().clone();
        }
        if config.trust_anchor_ids_enabled() && !config.trust_anchor_ids().is_empty() {
            ssl_config.trust_anchor_ids =
                select_trust_anchor_ids(metadata.trust_anchor_ids(), config.trust_anchor_ids());
        }
        ssl_config.alpn_protocols = metadata.supported_protocol_alpns().to_vec();
        ssl_config
    }

    /// An empty retry list means "retry with ECH disabled".
    pub(crate) fn set_ech_retry_configs(&mut self, retry_configs: Bytes) {
        if retry_configs.is_empty() {
            self.ech_disabled = true;
        }
        self.ech_config_list = retry_configs;
    }

    pub(crate) fn set_trust_anchor_ids(&mut self, ids: Vec<TrustAnchorId>) {
        self.trust_anchor_ids = ids;
    }

    #[inline]
    pub fn ech_config_list(&self) -> &Bytes {
        &self.ech_config_list
    }

    #[inline]
    pub fn ech_disabled(&self) -> bool {
        self.ech_disabled
    }

    #[inline]
    pub fn trust_anchor_ids(&self) -> &[TrustAnchorId] {
        &self.trust_anchor_ids
    }

    #[inline]
    pub fn alpn_protocols(&self) -> &[String] {
        &self.alpn_protocols
    }
}
