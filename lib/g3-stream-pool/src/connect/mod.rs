/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream};

use crate::endpoint::TrustAnchorId;
use crate::ssl_config::SslConfig;
use crate::types::Host;

#[cfg(feature = "rustls")]
mod rustls;
#[cfg(feature = "rustls")]
pub use self::rustls::RustlsStreamConnector;

/// Info captured when the server asked for a client certificate during
/// the handshake. Carried on `ClientAuthCertNeeded` so callers can
/// drive certificate selection.
#[derive(Clone, Debug, Default)]
pub struct CertRequestInfo {
    cert_authorities: Vec<Bytes>,
}

impl CertRequestInfo {
    pub fn new(cert_authorities: Vec<Bytes>) -> Self {
        CertRequestInfo { cert_authorities }
    }

    #[inline]
    pub fn cert_authorities(&self) -> &[Bytes] {
        &self.cert_authorities
    }
}

/// Handshake outcome data the retry machinery needs is carried on the
/// error value itself: ECH retry configs from the outer handshake, and
/// the trust anchor ids the server would accept for a retry.
#[derive(Error, Debug)]
pub enum TlsConnectError {
    #[error("ech rejected by peer")]
    EchRejected { retry_configs: Bytes },
    #[error("certificate verify failed: {error}")]
    CertVerifyFailed {
        error: anyhow::Error,
        server_trust_anchor_ids: Vec<TrustAnchorId>,
    },
    #[error("client certificate requested")]
    ClientCertNeeded(CertRequestInfo),
    #[error("handshake failed: {0:?}")]
    HandshakeFailed(anyhow::Error),
}

pub trait TlsStreamSocket: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> TlsStreamSocket for T {}

pub type BoxTlsStream = Box<dyn TlsStreamSocket>;

/// The plain stream half of the socket factory: one non-blocking TCP
/// connect, bound to no local address.
#[async_trait]
pub trait TcpStreamConnector: Send + Sync {
    async fn connect(&self, peer: SocketAddr) -> io::Result<TcpStream>;
}

pub type ArcTcpStreamConnector = Arc<dyn TcpStreamConnector>;

#[derive(Default)]
pub struct DefaultTcpConnector;

#[async_trait]
impl TcpStreamConnector for DefaultTcpConnector {
    async fn connect(&self, peer: SocketAddr) -> io::Result<TcpStream> {
        // use a new socket every time, no local bind
        let socket = if peer.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.connect(peer).await
    }
}

/// The TLS half of the socket factory: wrap an established TCP stream
/// as a TLS client stream configured from the per-attempt `SslConfig`.
/// The caller owns the handshake timeout.
#[async_trait]
pub trait TlsClientConnector: Send + Sync {
    async fn connect(
        &self,
        tls_name: &Host,
        peer: SocketAddr,
        ssl_config: &SslConfig,
        stream: TcpStream,
    ) -> Result<BoxTlsStream, TlsConnectError>;
}

pub type ArcTlsClientConnector = Arc<dyn TlsClientConnector>;
