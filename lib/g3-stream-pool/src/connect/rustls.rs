/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::ssl_config::SslConfig;
use crate::types::Host;

use super::{BoxTlsStream, TlsClientConnector, TlsConnectError};

/// Default TLS backend. ECH retry configs and server trust anchor ids
/// are surfaced by backends that implement the corresponding
/// extensions; this one reports certificate failures with an empty
/// retry id list.
pub struct RustlsStreamConnector {
    config: Arc<ClientConfig>,
}

impl RustlsStreamConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        RustlsStreamConnector { config }
    }

    fn build_driver(&self, ssl_config: &SslConfig) -> TlsConnector {
        if ssl_config.alpn_protocols().is_empty() {
            TlsConnector::from(self.config.clone())
        } else {
            let mut config = self.config.as_ref().clone();
            config.alpn_protocols = ssl_config
                .alpn_protocols()
                .iter()
                .map(|p| p.as_bytes().to_vec())
                .collect();
            TlsConnector::from(Arc::new(config))
        }
    }
}

fn map_handshake_error(e: std::io::Error) -> TlsConnectError {
    if let Some(tls_e) = e.get_ref().and_then(|r| r.downcast_ref::<rustls::Error>()) {
        if matches!(tls_e, rustls::Error::InvalidCertificate(_)) {
            return TlsConnectError::CertVerifyFailed {
                error: anyhow::anyhow!("{tls_e}"),
                server_trust_anchor_ids: Vec::new(),
            };
        }
    }
    TlsConnectError::HandshakeFailed(anyhow::Error::new(e))
}

#[async_trait]
impl TlsClientConnector for RustlsStreamConnector {
    async fn connect(
        &self,
        tls_name: &Host,
        peer: SocketAddr,
        ssl_config: &SslConfig,
        stream: TcpStream,
    ) -> Result<BoxTlsStream, TlsConnectError> {
        let server_name = match tls_name {
            Host::Ip(ip) => ServerName::IpAddress((*ip).into()),
            Host::Domain(domain) => ServerName::try_from(domain.to_string())
                .map_err(|e| TlsConnectError::HandshakeFailed(anyhow::Error::new(e)))?,
        };
        let _ = peer;

        let connector = self.build_driver(ssl_config);
        match connector.connect(server_name, stream).await {
            Ok(tls_stream) => Ok(Box::new(tls_stream)),
            Err(e) => Err(map_handshake_error(e)),
        }
    }
}
