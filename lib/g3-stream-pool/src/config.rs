/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::time::Duration;

use crate::endpoint::TrustAnchorId;

const DEFAULT_CONNECTION_ATTEMPT_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for a single attempt manager. The feature flags here are read
/// once when an attempt starts and cached for its whole lifetime, so a
/// reconfiguration never changes the behavior of in-flight attempts.
#[derive(Clone, Debug)]
pub struct ConnectionAttemptConfig {
    connection_attempt_delay: Duration,
    tcp_connect_timeout: Duration,
    tls_handshake_timeout: Duration,
    max_attempts_per_family: usize,
    allow_quic: bool,
    ech_enabled: bool,
    trust_anchor_ids_enabled: bool,
    trust_anchor_ids: Vec<TrustAnchorId>,
}

impl Default for ConnectionAttemptConfig {
    fn default() -> Self {
        ConnectionAttemptConfig {
            connection_attempt_delay: DEFAULT_CONNECTION_ATTEMPT_DELAY,
            tcp_connect_timeout: DEFAULT_TCP_CONNECT_TIMEOUT,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            max_attempts_per_family: 8,
            allow_quic: true,
            ech_enabled: true,
            trust_anchor_ids_enabled: false,
            trust_anchor_ids: Vec::new(),
        }
    }
}

impl ConnectionAttemptConfig {
    /// The Happy-Eyeballs delay. Doubles as the slow-attempt threshold.
    pub fn set_connection_attempt_delay(&mut self, delay: Duration) {
        self.connection_attempt_delay = delay;
    }

    pub fn set_tcp_connect_timeout(&mut self, timeout: Duration) {
        self.tcp_connect_timeout = timeout;
    }

    pub fn set_tls_handshake_timeout(&mut self, timeout: Duration) {
        self.tls_handshake_timeout = timeout;
    }

    pub fn set_max_attempts_per_family(&mut self, max: usize) {
        self.max_attempts_per_family = max.max(1);
    }

    pub fn set_allow_quic(&mut self, enable: bool) {
        self.allow_quic = enable;
    }

    pub fn set_ech_enabled(&mut self, enable: bool) {
        self.ech_enabled = enable;
    }

    pub fn set_trust_anchor_ids_enabled(&mut self, enable: bool) {
        self.trust_anchor_ids_enabled = enable;
    }

    /// Operator policy list, in local preference order.
    pub fn set_trust_anchor_ids(&mut self, ids: Vec<TrustAnchorId>) {
        self.trust_anchor_ids = ids;
    }

    #[inline]
    pub fn connection_attempt_delay(&self) -> Duration {
        self.connection_attempt_delay
    }

    #[inline]
    pub fn tcp_connect_timeout(&self) -> Duration {
        self.tcp_connect_timeout
    }

    #[inline]
    pub fn tls_handshake_timeout(&self) -> Duration {
        self.tls_handshake_timeout
    }

    #[inline]
    pub fn max_attempts_per_family(&self) -> usize {
        self.max_attempts_per_family
    }

    #[inline]
    pub fn allow_quic(&self) -> bool {
        self.allow_quic
    }

    #[inline]
    pub fn ech_enabled(&self) -> bool {
        self.ech_enabled
    }

    #[inline]
    pub fn trust_anchor_ids_enabled(&self) -> bool {
        self.trust_anchor_ids_enabled
    }

    #[inline]
    pub fn trust_anchor_ids(&self) -> &[TrustAnchorId] {
        &self.trust_anchor_ids
    }
}

#[derive(Clone, Debug)]
pub struct StreamPoolConfig {
    max_slots: usize,
    max_slots_per_manager: usize,
    attempt: ConnectionAttemptConfig,
}

impl Default for StreamPoolConfig {
    fn default() -> Self {
        StreamPoolConfig {
            max_slots: 256,
            max_slots_per_manager: 6,
            attempt: ConnectionAttemptConfig::default(),
        }
    }
}

impl StreamPoolConfig {
    pub fn set_max_slots(&mut self, max: usize) {
        self.max_slots = max.max(1);
    }

    pub fn set_max_slots_per_manager(&mut self, max: usize) {
        self.max_slots_per_manager = max.max(1);
    }

    pub fn set_attempt_config(&mut self, attempt: ConnectionAttemptConfig) {
        self.attempt = attempt;
    }

    pub fn attempt_config_mut(&mut self) -> &mut ConnectionAttemptConfig {
        &mut self.attempt
    }

    #[inline]
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    #[inline]
    pub fn max_slots_per_manager(&self) -> usize {
        self.max_slots_per_manager
    }

    #[inline]
    pub fn attempt_config(&self) -> &ConnectionAttemptConfig {
        &self.attempt
    }
}
