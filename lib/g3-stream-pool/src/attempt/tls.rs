/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::config::ConnectionAttemptConfig;
use crate::connect::{
    ArcTcpStreamConnector, ArcTlsClientConnector, BoxTlsStream, CertRequestInfo, TlsConnectError,
};
use crate::endpoint::{select_trust_anchor_ids, ServiceEndpoint};
use crate::error::StreamAttemptError;
use crate::ssl_config::SslConfig;
use crate::stats::StreamPoolStats;
use crate::types::Host;

use super::{AttemptProgress, ConnectTiming, LoadState, TcpStreamAttempt};

/// Hooks a TLS attempt needs from its owner. `on_tcp_handshake_complete`
/// is purely observational; the owner typically pauses its slow timer
/// there and resumes it once `wait_for_service_endpoint_ready` returns.
#[async_trait]
pub trait TlsStreamAttemptDelegate: Send + Sync {
    fn on_tcp_handshake_complete(&self) {}

    /// Returns immediately when crypto metadata is already usable.
    async fn wait_for_service_endpoint_ready(&self) -> Result<(), StreamAttemptError>;

    /// Snapshot the endpoint this attempt belongs to. `Aborted` means
    /// the resolver declared the attempt impossible.
    fn get_service_endpoint(&self) -> Result<ServiceEndpoint, StreamAttemptError>;
}

/// TCP handshake, wait for crypto metadata, then TLS handshake.
///
/// An ECH rejection or an intersectable certificate error restarts the
/// whole sequence once, on a fresh TCP connection to the same endpoint:
///
/// ```text
/// TcpAttempt -> TcpAttemptComplete -> TlsAttempt -> TlsAttemptComplete
///      ^_________________________ retry _________________|
/// ```
pub struct TlsStreamAttempt {
    peer: SocketAddr,
    tls_name: Host,
    // read once at construction so flag flips never affect a running attempt
    config: ConnectionAttemptConfig,
    tcp_connector: ArcTcpStreamConnector,
    tls_connector: ArcTlsClientConnector,
    delegate: Arc<dyn TlsStreamAttemptDelegate>,
    stats: Arc<StreamPoolStats>,
    progress: Arc<AttemptProgress>,
    ssl_config: Option<SslConfig>,
    is_ech_capable: bool,
    ech_retry_configs: Option<Bytes>,
    retried_for_trust_anchor_ids: bool,
    cert_request_info: Option<CertRequestInfo>,
}

impl TlsStreamAttempt {
    pub fn new(
        peer: SocketAddr,
        tls_name: Host,
        config: &ConnectionAttemptConfig,
        tcp_connector: ArcTcpStreamConnector,
        tls_connector: ArcTlsClientConnector,
        delegate: Arc<dyn TlsStreamAttemptDelegate>,
        stats: Arc<StreamPoolStats>,
    ) -> Self {
        TlsStreamAttempt {
            peer,
            tls_name,
            config: config.clone(),
            tcp_connector,
            tls_connector,
            delegate,
            stats,
            progress: Arc::new(AttemptProgress::default()),
            ssl_config: None,
            is_ech_capable: false,
            ech_retry_configs: None,
            retried_for_trust_anchor_ids: false,
            cert_request_info: None,
        }
    }

    #[inline]
    pub fn ip_endpoint(&self) -> SocketAddr {
        self.peer
    }

    pub fn load_state(&self) -> LoadState {
        self.progress.load_state()
    }

    pub fn connect_timing(&self) -> ConnectTiming {
        self.progress.timing()
    }

    pub(crate) fn progress(&self) -> Arc<AttemptProgress> {
        self.progress.clone()
    }

    /// Set once the peer rejected ECH and handed out retry configs.
    /// `Some` with empty bytes means the retry ran with ECH disabled.
    pub fn ech_retry_configs(&self) -> Option<&Bytes> {
        self.ech_retry_configs.as_ref()
    }

    pub fn retried_for_trust_anchor_ids(&self) -> bool {
        self.retried_for_trust_anchor_ids
    }

    /// Populated only when the final result is `ClientAuthCertNeeded`.
    pub fn cert_request_info(&self) -> Option<&CertRequestInfo> {
        self.cert_request_info.as_ref()
    }

    pub fn ssl_config(&self) -> Option<&SslConfig> {
        self.ssl_config.as_ref()
    }

    pub async fn run(&mut self) -> Result<BoxTlsStream, StreamAttemptError> {
        let r = self.run_states().await;
        self.progress.complete();
        r
    }

    async fn run_states(&mut self) -> Result<BoxTlsStream, StreamAttemptError> {
        loop {
            let mut tcp_attempt = TcpStreamAttempt::nested(
                self.peer,
                self.config.tcp_connect_timeout(),
                self.tcp_connector.clone(),
                self.stats.clone(),
                self.progress.clone(),
            );
            let stream = tcp_attempt.run().await?;
            drop(tcp_attempt);
            self.delegate.on_tcp_handshake_complete();

            if self.ssl_config.is_none() {
                // first pass, not a retry
                self.progress
                    .set_load_state(LoadState::WaitingForEndpointMetadata);
                self.progress.update_timing(|timing| {
                    timing.endpoint_wait_start = Some(Instant::now());
                });
                self.delegate.wait_for_service_endpoint_ready().await?;
                self.progress.update_timing(|timing| {
                    timing.endpoint_wait_end = Some(Instant::now());
                });
                let endpoint = self.delegate.get_service_endpoint()?;
                self.is_ech_capable =
                    self.config.ech_enabled() && endpoint.metadata().ech_offered();
                self.ssl_config = Some(SslConfig::build(&self.config, endpoint.metadata()));
            }
            let Some(ssl_config) = &self.ssl_config else {
                return Err(StreamAttemptError::Internal("ssl config not built"));
            };

            self.progress.set_load_state(LoadState::SslHandshake);
            self.progress.update_timing(|timing| {
                timing.tls_handshake_start = Some(Instant::now());
                timing.tls_handshake_end = None;
            });
            let r = tokio::time::timeout(
                self.config.tls_handshake_timeout(),
                self.tls_connector
                    .connect(&self.tls_name, self.peer, ssl_config, stream),
            )
            .await;
            self.progress.update_timing(|timing| {
                timing.tls_handshake_end = Some(Instant::now());
            });

            match r {
                Ok(Ok(tls_stream)) => {
                    self.stats.add_tls_handshake_success();
                    return Ok(tls_stream);
                }
                Ok(Err(e)) => {
                    self.stats.add_tls_handshake_error();
                    match self.handle_handshake_error(e) {
                        Ok(()) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(_) => {
                    self.stats.add_tls_handshake_timeout();
                    return Err(StreamAttemptError::TimedOut);
                }
            }
        }
    }

    /// `Ok(())` asks the caller to restart from the TCP attempt.
    fn handle_handshake_error(&mut self, e: TlsConnectError) -> Result<(), StreamAttemptError> {
        match e {
            TlsConnectError::EchRejected { retry_configs } => {
                if self.is_ech_capable && self.ech_retry_configs.is_none() {
                    log::debug!("{} retrying with fresh ech retry configs", self.peer);
                    self.stats.add_ech_retry();
                    self.ech_retry_configs = Some(retry_configs.clone());
                    if let Some(ssl_config) = &mut self.ssl_config {
                        ssl_config.set_ech_retry_configs(retry_configs);
                    }
                    self.reset_for_retry();
                    Ok(())
                } else {
                    Err(StreamAttemptError::EchNotNegotiated)
                }
            }
            TlsConnectError::CertVerifyFailed {
                error,
                server_trust_anchor_ids,
            } => {
                if self.config.trust_anchor_ids_enabled()
                    && !self.retried_for_trust_anchor_ids
                    && !server_trust_anchor_ids.is_empty()
                {
                    let retry_ids = select_trust_anchor_ids(
                        &server_trust_anchor_ids,
                        self.config.trust_anchor_ids(),
                    );
                    if !retry_ids.is_empty() {
                        log::debug!(
                            "{} retrying with {} trust anchor ids",
                            self.peer,
                            retry_ids.len()
                        );
                        self.stats.add_trust_anchor_ids_retry();
                        self.retried_for_trust_anchor_ids = true;
                        if let Some(ssl_config) = &mut self.ssl_config {
                            ssl_config.set_trust_anchor_ids(retry_ids);
                        }
                        self.reset_for_retry();
                        return Ok(());
                    }
                }
                Err(StreamAttemptError::CertVerifyFailed(error.to_string()))
            }
            TlsConnectError::ClientCertNeeded(info) => {
                self.cert_request_info = Some(info.clone());
                Err(StreamAttemptError::ClientAuthCertNeeded(info))
            }
            TlsConnectError::HandshakeFailed(error) => {
                Err(StreamAttemptError::TlsHandshakeFailed(error))
            }
        }
    }

    /// A retry observes the attempt as if freshly constructed, except
    /// for the one-shot retry bookkeeping and the rewritten ssl config.
    fn reset_for_retry(&mut self) {
        self.cert_request_info = None;
        self.progress.set_load_state(LoadState::Idle);
    }
}
