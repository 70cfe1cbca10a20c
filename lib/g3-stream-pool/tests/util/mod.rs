/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};

use g3_stream_pool::{
    BoxTlsStream, CertRequestInfo, EndpointMetadata, Host, PooledSession, ResolveError,
    ServiceEndpoint, ServiceEndpointJob, ServiceEndpointPublisher, ServiceEndpointResolver,
    SessionProtocol, SharedSession, SslConfig, StreamAttemptError, StreamKey, TcpStreamConnector,
    TlsClientConnector, TlsConnectError, TlsStreamAttemptDelegate, TrustAnchorId,
    QuicSessionConnector,
};

#[derive(Clone, Copy, Debug)]
pub enum TcpBehavior {
    Connect,
    Delay(Duration),
    Hang,
    Refuse,
}

/// Scripted TCP side of the socket factory. Successful connects are
/// real loopback connections so the produced stream is usable.
pub struct MockTcpConnector {
    accept_addr: SocketAddr,
    behaviors: Mutex<HashMap<IpAddr, VecDeque<TcpBehavior>>>,
    connects: Mutex<HashMap<SocketAddr, usize>>,
}

impl MockTcpConnector {
    pub async fn new() -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let accept_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut accepted = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                // keep server ends open for the whole test
                accepted.push(stream);
            }
        });
        Arc::new(MockTcpConnector {
            accept_addr,
            behaviors: Mutex::new(HashMap::new()),
            connects: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_behavior(&self, ip: IpAddr, behavior: TcpBehavior) {
        self.behaviors.lock().unwrap().insert(ip, [behavior].into());
    }

    /// Behaviors consumed in order; the last one stays in effect.
    pub fn script_behaviors(&self, ip: IpAddr, behaviors: Vec<TcpBehavior>) {
        self.behaviors.lock().unwrap().insert(ip, behaviors.into());
    }

    fn next_behavior(&self, ip: IpAddr) -> TcpBehavior {
        let mut behaviors = self.behaviors.lock().unwrap();
        match behaviors.get_mut(&ip) {
            Some(queue) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    queue.front().copied().unwrap_or(TcpBehavior::Connect)
                }
            }
            None => TcpBehavior::Connect,
        }
    }

    pub fn connect_count(&self, peer: SocketAddr) -> usize {
        self.connects.lock().unwrap().get(&peer).copied().unwrap_or(0)
    }

    pub fn total_connects(&self) -> usize {
        self.connects.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl TcpStreamConnector for MockTcpConnector {
    async fn connect(&self, peer: SocketAddr) -> io::Result<TcpStream> {
        *self.connects.lock().unwrap().entry(peer).or_insert(0) += 1;
        match self.next_behavior(peer.ip()) {
            TcpBehavior::Connect => TcpStream::connect(self.accept_addr).await,
            TcpBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                TcpStream::connect(self.accept_addr).await
            }
            TcpBehavior::Hang => std::future::pending().await,
            TcpBehavior::Refuse => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum TlsBehavior {
    Ok,
    EchReject(Vec<u8>),
    CertError(Vec<TrustAnchorId>),
    ClientCertNeeded,
    Hang,
}

/// Scripted TLS side: per-peer handshake outcomes consumed in order,
/// defaulting to success. Records the ssl config of every handshake.
#[derive(Default)]
pub struct MockTlsConnector {
    scripts: Mutex<HashMap<IpAddr, VecDeque<TlsBehavior>>>,
    seen_configs: Mutex<Vec<SslConfig>>,
    handshakes: AtomicUsize,
}

impl MockTlsConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTlsConnector::default())
    }

    pub fn script(&self, ip: IpAddr, outcomes: Vec<TlsBehavior>) {
        self.scripts.lock().unwrap().insert(ip, outcomes.into());
    }

    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::Relaxed)
    }

    pub fn seen_configs(&self) -> Vec<SslConfig> {
        self.seen_configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TlsClientConnector for MockTlsConnector {
    async fn connect(
        &self,
        _tls_name: &Host,
        peer: SocketAddr,
        ssl_config: &SslConfig,
        stream: TcpStream,
    ) -> Result<BoxTlsStream, TlsConnectError> {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        self.seen_configs.lock().unwrap().push(ssl_config.clone());
        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&peer.ip())
            .and_then(|s| s.pop_front())
            .unwrap_or(TlsBehavior::Ok);
        match behavior {
            TlsBehavior::Ok => Ok(Box::new(stream)),
            TlsBehavior::EchReject(retry_configs) => Err(TlsConnectError::EchRejected {
                retry_configs: Bytes::from(retry_configs),
            }),
            TlsBehavior::CertError(server_trust_anchor_ids) => {
                Err(TlsConnectError::CertVerifyFailed {
                    error: anyhow::anyhow!("certificate verify failed"),
                    server_trust_anchor_ids,
                })
            }
            TlsBehavior::ClientCertNeeded => Err(TlsConnectError::ClientCertNeeded(
                CertRequestInfo::new(vec![Bytes::from_static(b"test ca")]),
            )),
            TlsBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Publishes a fixed resolution for every key and finishes.
pub struct StaticResolver {
    endpoints: Vec<ServiceEndpoint>,
}

impl StaticResolver {
    pub fn new(endpoints: Vec<ServiceEndpoint>) -> Arc<Self> {
        Arc::new(StaticResolver { endpoints })
    }
}

impl ServiceEndpointResolver for StaticResolver {
    fn resolve(&self, _key: &StreamKey) -> Result<ServiceEndpointJob, ResolveError> {
        let (publisher, job) = ServiceEndpointJob::new();
        publisher.publish_endpoints(self.endpoints.clone());
        publisher.set_crypto_ready();
        publisher.finalize();
        Ok(job)
    }
}

/// Stashes the publisher of every resolution so tests can feed updates
/// after the manager started.
#[derive(Default)]
pub struct ManualResolver {
    publishers: Mutex<Vec<ServiceEndpointPublisher>>,
}

impl ManualResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(ManualResolver::default())
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.lock().unwrap().len()
    }

    pub fn with_publisher<F: FnOnce(&ServiceEndpointPublisher)>(&self, index: usize, f: F) {
        let publishers = self.publishers.lock().unwrap();
        f(&publishers[index]);
    }
}

impl ServiceEndpointResolver for ManualResolver {
    fn resolve(&self, _key: &StreamKey) -> Result<ServiceEndpointJob, ResolveError> {
        let (publisher, job) = ServiceEndpointJob::new();
        self.publishers.lock().unwrap().push(publisher);
        Ok(job)
    }
}

pub struct TestSession {
    protocol: SessionProtocol,
    usable: AtomicBool,
}

impl TestSession {
    pub fn h2() -> Arc<Self> {
        Arc::new(TestSession {
            protocol: SessionProtocol::Http2,
            usable: AtomicBool::new(true),
        })
    }

    pub fn h3() -> Arc<Self> {
        Arc::new(TestSession {
            protocol: SessionProtocol::Http3,
            usable: AtomicBool::new(true),
        })
    }

    pub fn set_unusable(&self) {
        self.usable.store(false, Ordering::Relaxed);
    }
}

impl PooledSession for TestSession {
    fn protocol(&self) -> SessionProtocol {
        self.protocol
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::Relaxed)
    }
}

/// QUIC stack stand-in completing after a fixed delay.
pub struct TestQuicConnector {
    delay: Duration,
    fail: bool,
    attempts: AtomicUsize,
}

impl TestQuicConnector {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(TestQuicConnector {
            delay,
            fail: false,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Arc::new(TestQuicConnector {
            delay,
            fail: true,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QuicSessionConnector for TestQuicConnector {
    async fn connect(
        &self,
        _key: &StreamKey,
        _peer: SocketAddr,
        _metadata: &EndpointMetadata,
    ) -> Result<SharedSession, StreamAttemptError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            Err(StreamAttemptError::Internal("quic handshake failed"))
        } else {
            Ok(TestSession::h3())
        }
    }
}

/// Immediate-ready delegate for attempt-level tests.
pub struct ReadyDelegate {
    endpoint: ServiceEndpoint,
    aborted: AtomicBool,
    tcp_complete: AtomicUsize,
}

impl ReadyDelegate {
    pub fn new(endpoint: ServiceEndpoint) -> Arc<Self> {
        Arc::new(ReadyDelegate {
            endpoint,
            aborted: AtomicBool::new(false),
            tcp_complete: AtomicUsize::new(0),
        })
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn tcp_complete_count(&self) -> usize {
        self.tcp_complete.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TlsStreamAttemptDelegate for ReadyDelegate {
    fn on_tcp_handshake_complete(&self) {
        self.tcp_complete.fetch_add(1, Ordering::Relaxed);
    }

    async fn wait_for_service_endpoint_ready(&self) -> Result<(), StreamAttemptError> {
        if self.aborted.load(Ordering::Relaxed) {
            Err(StreamAttemptError::Aborted)
        } else {
            Ok(())
        }
    }

    fn get_service_endpoint(&self) -> Result<ServiceEndpoint, StreamAttemptError> {
        if self.aborted.load(Ordering::Relaxed) {
            Err(StreamAttemptError::Aborted)
        } else {
            Ok(self.endpoint.clone())
        }
    }
}

pub fn tai(b: &'static [u8]) -> TrustAnchorId {
    TrustAnchorId::new(b)
}

pub fn v4_endpoint(addr: &str, metadata: EndpointMetadata) -> ServiceEndpoint {
    let mut endpoint = ServiceEndpoint::default();
    endpoint.push_ipv4_endpoint(addr.parse().unwrap());
    endpoint.set_metadata(metadata);
    endpoint
}

pub fn dual_stack_endpoint(v6: &str, v4: &str, metadata: EndpointMetadata) -> ServiceEndpoint {
    let mut endpoint = ServiceEndpoint::default();
    endpoint.push_ipv6_endpoint(v6.parse().unwrap());
    endpoint.push_ipv4_endpoint(v4.parse().unwrap());
    endpoint.set_metadata(metadata);
    endpoint
}

pub fn ech_metadata(config_list: &'static [u8]) -> EndpointMetadata {
    let mut metadata = EndpointMetadata::default();
    metadata.set_ech_config_list(Bytes::from_static(config_list));
    metadata
}
