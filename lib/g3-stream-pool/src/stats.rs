/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::StreamCloseReason;

/// Cumulative counters for one pool. Cheap to bump from any attempt
/// task; consumed by an external metrics emitter.
#[derive(Default)]
pub struct StreamPoolStats {
    tcp_connect_attempted: AtomicU64,
    tcp_connect_established: AtomicU64,
    tls_handshake_success: AtomicU64,
    tls_handshake_error: AtomicU64,
    tls_handshake_timeout: AtomicU64,
    ech_retried: AtomicU64,
    trust_anchor_ids_retried: AtomicU64,
    attempt_failed: AtomicU64,
    attempt_canceled: [AtomicU64; StreamCloseReason::ALL.len()],
    quic_attempted: AtomicU64,
    quic_established: AtomicU64,
    request_served_from_stream: AtomicU64,
    request_served_from_session: AtomicU64,
    request_failed: AtomicU64,
    stream_discarded: AtomicU64,
}

macro_rules! impl_counter {
    ($add:ident, $get:ident, $field:ident) => {
        pub(crate) fn $add(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl StreamPoolStats {
    impl_counter!(add_tcp_connect_attempted, tcp_connect_attempted, tcp_connect_attempted);
    impl_counter!(
        add_tcp_connect_established,
        tcp_connect_established,
        tcp_connect_established
    );
    impl_counter!(add_tls_handshake_success, tls_handshake_success, tls_handshake_success);
    impl_counter!(add_tls_handshake_error, tls_handshake_error, tls_handshake_error);
    impl_counter!(add_tls_handshake_timeout, tls_handshake_timeout, tls_handshake_timeout);
    impl_counter!(add_ech_retry, ech_retried, ech_retried);
    impl_counter!(
        add_trust_anchor_ids_retry,
        trust_anchor_ids_retried,
        trust_anchor_ids_retried
    );
    impl_counter!(add_attempt_failed, attempt_failed, attempt_failed);
    impl_counter!(add_quic_attempted, quic_attempted, quic_attempted);
    impl_counter!(add_quic_established, quic_established, quic_established);
    impl_counter!(
        add_request_served_from_stream,
        request_served_from_stream,
        request_served_from_stream
    );
    impl_counter!(
        add_request_served_from_session,
        request_served_from_session,
        request_served_from_session
    );
    impl_counter!(add_request_failed, request_failed, request_failed);
    impl_counter!(add_stream_discarded, stream_discarded, stream_discarded);

    pub(crate) fn add_attempt_canceled(&self, reason: StreamCloseReason) {
        self.attempt_canceled[reason.as_index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn attempt_canceled(&self, reason: StreamCloseReason) -> u64 {
        self.attempt_canceled[reason.as_index()].load(Ordering::Relaxed)
    }

    pub fn attempt_canceled_total(&self) -> u64 {
        self.attempt_canceled
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}
