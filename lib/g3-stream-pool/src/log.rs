/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;
use std::time::Duration;

use slog::{slog_info, Logger, Record, Serializer, Value};
use uuid::Uuid;

use crate::session::StreamCloseReason;
use crate::types::{AddressFamily, StreamKey};

pub(crate) struct LtUuid<'a>(pub(crate) &'a Uuid);

impl Value for LtUuid<'_> {
    fn serialize(&self, _record: &Record, key: slog::Key, serializer: &mut dyn Serializer) -> slog::Result {
        let mut buffer = Uuid::encode_buffer();
        serializer.emit_str(key, self.0.simple().encode_lower(&mut buffer))
    }
}

pub(crate) struct LtDuration(pub(crate) Duration);

impl Value for LtDuration {
    fn serialize(&self, _record: &Record, key: slog::Key, serializer: &mut dyn Serializer) -> slog::Result {
        serializer.emit_arguments(key, &format_args!("{:?}", self.0))
    }
}

pub(crate) struct ManagerLogContext<'a> {
    pub(crate) manager_id: &'a Uuid,
    pub(crate) key: &'a StreamKey,
    pub(crate) elapsed: Duration,
}

impl ManagerLogContext<'_> {
    pub(crate) fn log_attempt_start(
        &self,
        logger: &Logger,
        peer: SocketAddr,
        using_tls: bool,
    ) {
        slog_info!(logger, "stream attempt started";
            "manager_id" => LtUuid(self.manager_id),
            "stream_key" => self.key.to_string(),
            "next_peer_addr" => peer.to_string(),
            "family" => AddressFamily::from(&peer).to_string(),
            "using_tls" => using_tls,
            "elapsed" => LtDuration(self.elapsed),
        )
    }

    pub(crate) fn log_attempt_slow(&self, logger: &Logger, peer: SocketAddr) {
        slog_info!(logger, "stream attempt slow";
            "manager_id" => LtUuid(self.manager_id),
            "stream_key" => self.key.to_string(),
            "next_peer_addr" => peer.to_string(),
            "family" => AddressFamily::from(&peer).to_string(),
            "elapsed" => LtDuration(self.elapsed),
        )
    }

    pub(crate) fn log_attempt_end(
        &self,
        logger: &Logger,
        peer: SocketAddr,
        result: &'static str,
        duration: Duration,
    ) {
        slog_info!(logger, "stream attempt finished";
            "manager_id" => LtUuid(self.manager_id),
            "stream_key" => self.key.to_string(),
            "next_peer_addr" => peer.to_string(),
            "family" => AddressFamily::from(&peer).to_string(),
            "result" => result,
            "attempt_spend" => LtDuration(duration),
            "elapsed" => LtDuration(self.elapsed),
        )
    }

    pub(crate) fn log_attempt_canceled(
        &self,
        logger: &Logger,
        peer: SocketAddr,
        reason: StreamCloseReason,
    ) {
        slog_info!(logger, "stream attempt canceled";
            "manager_id" => LtUuid(self.manager_id),
            "stream_key" => self.key.to_string(),
            "next_peer_addr" => peer.to_string(),
            "family" => AddressFamily::from(&peer).to_string(),
            "cancel_reason" => reason.as_str(),
            "elapsed" => LtDuration(self.elapsed),
        )
    }

    pub(crate) fn log_manager_finished(
        &self,
        logger: &Logger,
        attempts_started: usize,
        initial_state: &'static str,
    ) {
        slog_info!(logger, "attempt manager finished";
            "manager_id" => LtUuid(self.manager_id),
            "stream_key" => self.key.to_string(),
            "attempts_started" => attempts_started,
            "initial_attempt_state" => initial_state,
            "elapsed" => LtDuration(self.elapsed),
        )
    }
}
