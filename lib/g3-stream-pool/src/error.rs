/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::io;

use thiserror::Error;

use crate::connect::CertRequestInfo;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("connection reset")]
    ConnectionReset,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("host unreachable")]
    HostUnreachable,
    #[error("timed out")]
    TimedOut,
    #[error("unspecified: {0:?}")]
    UnspecifiedError(io::ErrorKind),
}

impl From<io::Error> for ConnectError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::ConnectionRefused,
            io::ErrorKind::ConnectionReset => ConnectError::ConnectionReset,
            io::ErrorKind::NetworkUnreachable => ConnectError::NetworkUnreachable,
            io::ErrorKind::HostUnreachable => ConnectError::HostUnreachable,
            io::ErrorKind::TimedOut => ConnectError::TimedOut,
            kind => ConnectError::UnspecifiedError(kind),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("empty domain")]
    EmptyDomain,
    #[error("aborted by resolver")]
    Aborted,
    #[error("resolve failed: {0}")]
    Failed(String),
}

/// Final status of one stream attempt. Every kind here is terminal for
/// the attempt that reports it; the ECH and Trust-Anchor-ID retry paths
/// are consumed inside `TlsStreamAttempt` before anything surfaces.
#[derive(Error, Debug)]
pub enum StreamAttemptError {
    #[error("setup socket failed: {0:?}")]
    SetupSocketFailed(io::Error),
    #[error("connect failed: {0}")]
    ConnectFailed(#[from] ConnectError),
    #[error("handshake timed out")]
    TimedOut,
    #[error("tls handshake failed: {0:?}")]
    TlsHandshakeFailed(anyhow::Error),
    #[error("ech not negotiated")]
    EchNotNegotiated,
    #[error("certificate verify failed: {0}")]
    CertVerifyFailed(String),
    #[error("client auth cert needed")]
    ClientAuthCertNeeded(CertRequestInfo),
    #[error("network changed")]
    NetworkChanged,
    #[error("resolve failed: {0}")]
    ResolveFailed(#[from] ResolveError),
    #[error("no address connected")]
    NoAddressConnected,
    #[error("aborted")]
    Aborted,
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl StreamAttemptError {
    pub fn brief(&self) -> &'static str {
        match self {
            StreamAttemptError::SetupSocketFailed(_) => "SetupSocketFailed",
            StreamAttemptError::ConnectFailed(_) => "ConnectFailed",
            StreamAttemptError::TimedOut => "TimedOut",
            StreamAttemptError::TlsHandshakeFailed(_) => "TlsHandshakeFailed",
            StreamAttemptError::EchNotNegotiated => "EchNotNegotiated",
            StreamAttemptError::CertVerifyFailed(_) => "CertVerifyFailed",
            StreamAttemptError::ClientAuthCertNeeded(_) => "ClientAuthCertNeeded",
            StreamAttemptError::NetworkChanged => "NetworkChanged",
            StreamAttemptError::ResolveFailed(_) => "ResolveFailed",
            StreamAttemptError::NoAddressConnected => "NoAddressConnected",
            StreamAttemptError::Aborted => "Aborted",
            StreamAttemptError::Internal(_) => "InternalError",
        }
    }

    /// The predicate used when deciding whether a Trust-Anchor-ID retry
    /// may apply. A client cert request is not a certificate error.
    pub fn is_certificate_error(&self) -> bool {
        matches!(self, StreamAttemptError::CertVerifyFailed(_))
    }

    /// An aborted attempt fails but is never counted as an actual failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, StreamAttemptError::Aborted)
    }

    /// An equivalent error value for fan-out to multiple waiting requests.
    /// Payloads that are not `Clone` are flattened to their message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            StreamAttemptError::SetupSocketFailed(e) => {
                StreamAttemptError::SetupSocketFailed(io::Error::new(e.kind(), e.to_string()))
            }
            StreamAttemptError::ConnectFailed(e) => StreamAttemptError::ConnectFailed(*e),
            StreamAttemptError::TimedOut => StreamAttemptError::TimedOut,
            StreamAttemptError::TlsHandshakeFailed(e) => {
                StreamAttemptError::TlsHandshakeFailed(anyhow::anyhow!("{e}"))
            }
            StreamAttemptError::EchNotNegotiated => StreamAttemptError::EchNotNegotiated,
            StreamAttemptError::CertVerifyFailed(s) => {
                StreamAttemptError::CertVerifyFailed(s.clone())
            }
            StreamAttemptError::ClientAuthCertNeeded(info) => {
                StreamAttemptError::ClientAuthCertNeeded(info.clone())
            }
            StreamAttemptError::NetworkChanged => StreamAttemptError::NetworkChanged,
            StreamAttemptError::ResolveFailed(e) => StreamAttemptError::ResolveFailed(e.clone()),
            StreamAttemptError::NoAddressConnected => StreamAttemptError::NoAddressConnected,
            StreamAttemptError::Aborted => StreamAttemptError::Aborted,
            StreamAttemptError::Internal(s) => StreamAttemptError::Internal(s),
        }
    }
}
