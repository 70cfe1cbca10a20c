/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionProtocol {
    Http2,
    Http3,
}

impl SessionProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionProtocol::Http2 => "h2",
            SessionProtocol::Http3 => "h3",
        }
    }
}

/// A multiplexed session owned by upper layers. The pool only needs to
/// know its protocol and whether it still accepts new streams.
pub trait PooledSession: Send + Sync {
    fn protocol(&self) -> SessionProtocol;

    fn is_usable(&self) -> bool {
        true
    }
}

pub type SharedSession = Arc<dyn PooledSession>;

/// Why an attempt was torn down before finishing on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamCloseReason {
    Unspecified,
    SpdySessionCreated,
    QuicSessionCreated,
    UsingExistingSpdySession,
    UsingExistingQuicSession,
    AttemptManagerDraining,
    CloseAllConnections,
    IpAddressChanged,
    SslConfigChanged,
    Abort,
}

impl StreamCloseReason {
    pub const ALL: &'static [StreamCloseReason] = &[
        StreamCloseReason::Unspecified,
        StreamCloseReason::SpdySessionCreated,
        StreamCloseReason::QuicSessionCreated,
        StreamCloseReason::UsingExistingSpdySession,
        StreamCloseReason::UsingExistingQuicSession,
        StreamCloseReason::AttemptManagerDraining,
        StreamCloseReason::CloseAllConnections,
        StreamCloseReason::IpAddressChanged,
        StreamCloseReason::SslConfigChanged,
        StreamCloseReason::Abort,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamCloseReason::Unspecified => "Unspecified",
            StreamCloseReason::SpdySessionCreated => "SpdySessionCreated",
            StreamCloseReason::QuicSessionCreated => "QuicSessionCreated",
            StreamCloseReason::UsingExistingSpdySession => "UsingExistingSpdySession",
            StreamCloseReason::UsingExistingQuicSession => "UsingExistingQuicSession",
            StreamCloseReason::AttemptManagerDraining => "AttemptManagerDraining",
            StreamCloseReason::CloseAllConnections => "CloseAllConnections",
            StreamCloseReason::IpAddressChanged => "IpAddressChanged",
            StreamCloseReason::SslConfigChanged => "SslConfigChanged",
            StreamCloseReason::Abort => "Abort",
        }
    }

    pub(crate) fn as_index(&self) -> usize {
        Self::ALL.iter().position(|r| r == self).unwrap_or(0)
    }

    /// Reason used when a session discovered for this key preempts the
    /// racing attempts.
    pub(crate) fn for_session(protocol: SessionProtocol, created: bool) -> Self {
        match (protocol, created) {
            (SessionProtocol::Http2, true) => StreamCloseReason::SpdySessionCreated,
            (SessionProtocol::Http3, true) => StreamCloseReason::QuicSessionCreated,
            (SessionProtocol::Http2, false) => StreamCloseReason::UsingExistingSpdySession,
            (SessionProtocol::Http3, false) => StreamCloseReason::UsingExistingQuicSession,
        }
    }
}
