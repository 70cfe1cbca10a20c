/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use slog::Logger;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attempt::ConnectTiming;
use crate::config::StreamPoolConfig;
use crate::connect::{
    ArcTcpStreamConnector, ArcTlsClientConnector, BoxTlsStream, DefaultTcpConnector,
    TlsClientConnector, TlsConnectError,
};
use crate::error::StreamAttemptError;
use crate::manager::{AttemptManager, ManagerCommand, QueuedRequest};
use crate::quic::ArcQuicSessionConnector;
use crate::resolve::ServiceEndpointResolver;
use crate::session::SharedSession;
use crate::ssl_config::SslConfig;
use crate::stats::StreamPoolStats;
use crate::types::{Host, RequestPriority, StreamKey};

/// The stream a winning attempt produced.
pub enum PooledStream {
    Tcp(TcpStream),
    Tls(BoxTlsStream),
}

impl AsyncRead for PooledStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PooledStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            PooledStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            PooledStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            PooledStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A connected stream together with where and how it was established.
pub struct EstablishedStream {
    pub stream: PooledStream,
    pub peer: SocketAddr,
    pub timing: ConnectTiming,
    pub using_tls: bool,
}

/// What a request finally receives: either a fresh stream to build on,
/// or an already usable multiplexed session for the same key.
pub enum StreamLease {
    Stream(EstablishedStream),
    Session(SharedSession),
}

/// Awaitable handed back by [`StreamPool::request_stream`]. Dropping it
/// cancels the queued request.
pub struct StreamRequest {
    rx: oneshot::Receiver<Result<StreamLease, StreamAttemptError>>,
}

impl Future for StreamRequest {
    type Output = Result<StreamLease, StreamAttemptError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(r)) => Poll::Ready(r),
            Poll::Ready(Err(_)) => Poll::Ready(Err(StreamAttemptError::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// TLS attempts started without a configured backend fail cleanly.
struct UnconfiguredTlsConnector;

#[async_trait::async_trait]
impl TlsClientConnector for UnconfiguredTlsConnector {
    async fn connect(
        &self,
        _tls_name: &Host,
        _peer: SocketAddr,
        _ssl_config: &SslConfig,
        _stream: TcpStream,
    ) -> Result<BoxTlsStream, TlsConnectError> {
        Err(TlsConnectError::HandshakeFailed(anyhow::anyhow!(
            "no tls client connector configured"
        )))
    }
}

/// External collaborators of a pool, collected at construction time.
pub struct StreamPoolContext {
    resolver: Arc<dyn ServiceEndpointResolver>,
    tcp_connector: ArcTcpStreamConnector,
    tls_connector: ArcTlsClientConnector,
    quic_connector: Option<ArcQuicSessionConnector>,
    logger: Option<Logger>,
}

impl StreamPoolContext {
    pub fn new(resolver: Arc<dyn ServiceEndpointResolver>) -> Self {
        StreamPoolContext {
            resolver,
            tcp_connector: Arc::new(DefaultTcpConnector),
            tls_connector: Arc::new(UnconfiguredTlsConnector),
            quic_connector: None,
            logger: None,
        }
    }

    pub fn set_tcp_connector(&mut self, connector: ArcTcpStreamConnector) {
        self.tcp_connector = connector;
    }

    pub fn set_tls_connector(&mut self, connector: ArcTlsClientConnector) {
        self.tls_connector = connector;
    }

    pub fn set_quic_connector(&mut self, connector: ArcQuicSessionConnector) {
        self.quic_connector = Some(connector);
    }

    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = Some(logger);
    }
}

struct ManagerEntry {
    id: Uuid,
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
}

type KeyMap<T> = HashMap<StreamKey, T, foldhash::fast::RandomState>;

pub(crate) struct PoolShared {
    pub(crate) config: StreamPoolConfig,
    pub(crate) resolver: Arc<dyn ServiceEndpointResolver>,
    pub(crate) tcp_connector: ArcTcpStreamConnector,
    pub(crate) tls_connector: ArcTlsClientConnector,
    pub(crate) quic_connector: Option<ArcQuicSessionConnector>,
    pub(crate) logger: Option<Logger>,
    pub(crate) stats: Arc<StreamPoolStats>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) slot_released: Arc<Notify>,
    managers: Mutex<KeyMap<ManagerEntry>>,
    sessions: Mutex<KeyMap<SharedSession>>,
    slots_in_use: AtomicUsize,
}

impl PoolShared {
    pub(crate) fn try_acquire_slot(&self) -> bool {
        self.slots_in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_slots()).then_some(n + 1)
            })
            .is_ok()
    }

    pub(crate) fn release_slot(&self) {
        let _ = self
            .slots_in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        // managers blocked on the budget may proceed now
        self.slot_released.notify_waiters();
    }

    pub(crate) fn slots_in_use(&self) -> usize {
        self.slots_in_use.load(Ordering::Acquire)
    }

    fn lock_managers(&self) -> std::sync::MutexGuard<'_, KeyMap<ManagerEntry>> {
        self.managers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, KeyMap<SharedSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lookup_session(&self, key: &StreamKey) -> Option<SharedSession> {
        let mut sessions = self.lock_sessions();
        match sessions.get(key) {
            Some(session) if session.is_usable() => Some(session.clone()),
            Some(_) => {
                sessions.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn register_session(&self, key: &StreamKey, session: SharedSession) {
        self.lock_sessions().insert(key.clone(), session);
    }

    /// Remove a manager entry, but only if it is still the one that
    /// asked: a replacement may already serve the key.
    pub(crate) fn remove_manager(&self, key: &StreamKey, id: Uuid) {
        let mut managers = self.lock_managers();
        if managers.get(key).is_some_and(|entry| entry.id == id) {
            managers.remove(key);
        }
    }

    pub(crate) fn submit_request(self: &Arc<Self>, key: StreamKey, request: QueuedRequest) {
        if self.shutdown.is_cancelled() {
            self.stats.add_request_failed();
            let _ = request.tx.send(Err(StreamAttemptError::Aborted));
            return;
        }
        if let Some(session) = self.lookup_session(&key) {
            self.stats.add_request_served_from_session();
            let _ = request.tx.send(Ok(StreamLease::Session(session)));
            return;
        }

        let mut request = request;
        let mut managers = self.lock_managers();
        if let Some(entry) = managers.get(&key) {
            match entry.cmd_tx.send(ManagerCommand::Request(request)) {
                Ok(()) => return,
                Err(mpsc::error::SendError(cmd)) => {
                    // the manager ended between lookup and send
                    managers.remove(&key);
                    let ManagerCommand::Request(r) = cmd else {
                        return;
                    };
                    request = r;
                }
            }
        }

        let job = match self.resolver.resolve(&key) {
            Ok(job) => job,
            Err(e) => {
                self.stats.add_request_failed();
                let _ = request.tx.send(Err(StreamAttemptError::ResolveFailed(e)));
                return;
            }
        };
        let manager = AttemptManager::new(key.clone(), self.clone(), job);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        managers.insert(
            key,
            ManagerEntry {
                id: manager.id(),
                cmd_tx: cmd_tx.clone(),
            },
        );
        drop(managers);
        tokio::spawn(manager.run(cmd_rx));
        let _ = cmd_tx.send(ManagerCommand::Request(request));
    }

    fn broadcast<F: Fn() -> ManagerCommand>(&self, make_cmd: F) {
        let managers = self.lock_managers();
        for entry in managers.values() {
            let _ = entry.cmd_tx.send(make_cmd());
        }
    }

    fn send_to(&self, key: &StreamKey, cmd: ManagerCommand) {
        let managers = self.lock_managers();
        if let Some(entry) = managers.get(key) {
            let _ = entry.cmd_tx.send(cmd);
        }
    }
}

/// Owner of the `stream key -> attempt manager` allocation, the global
/// slot budget and the session registry. Cheap to clone; all clones
/// share one state.
#[derive(Clone)]
pub struct StreamPool {
    shared: Arc<PoolShared>,
}

impl StreamPool {
    /// Needs a running tokio runtime: managers are spawned lazily on
    /// the first request for their key.
    pub fn new(config: StreamPoolConfig, context: StreamPoolContext) -> Self {
        StreamPool {
            shared: Arc::new(PoolShared {
                config,
                resolver: context.resolver,
                tcp_connector: context.tcp_connector,
                tls_connector: context.tls_connector,
                quic_connector: context.quic_connector,
                logger: context.logger,
                stats: Arc::new(StreamPoolStats::default()),
                shutdown: CancellationToken::new(),
                slot_released: Arc::new(Notify::new()),
                managers: Mutex::new(KeyMap::default()),
                sessions: Mutex::new(KeyMap::default()),
                slots_in_use: AtomicUsize::new(0),
            }),
        }
    }

    pub fn request_stream(&self, key: StreamKey, priority: RequestPriority) -> StreamRequest {
        let (tx, rx) = oneshot::channel();
        self.shared
            .submit_request(key, QueuedRequest { priority, tx });
        StreamRequest { rx }
    }

    /// A session was built on top of a stream this pool handed out.
    /// Remaining waiting requests for the key are served from it.
    pub fn notify_session_created(&self, key: &StreamKey, session: SharedSession) {
        self.shared.register_session(key, session.clone());
        self.shared.send_to(
            key,
            ManagerCommand::SessionAvailable {
                session,
                created: true,
            },
        );
    }

    /// An already established session turned out to be able to serve
    /// this key (IP pooling, ORIGIN frame). Preempts the racing
    /// attempts for the key.
    pub fn notify_existing_session(&self, key: &StreamKey, session: SharedSession) {
        self.shared.register_session(key, session.clone());
        self.shared.send_to(
            key,
            ManagerCommand::SessionAvailable {
                session,
                created: false,
            },
        );
    }

    pub fn notify_ip_address_changed(&self) {
        self.shared.lock_sessions().clear();
        self.shared.broadcast(|| ManagerCommand::IpAddressChanged);
    }

    pub fn notify_ssl_config_changed(&self) {
        self.shared.broadcast(|| ManagerCommand::SslConfigChanged);
    }

    /// Admission-control close: tear down all in-flight attempts and
    /// fail the waiting requests. The pool keeps serving new requests.
    pub fn close_all(&self) {
        self.shared.broadcast(|| ManagerCommand::CloseAll);
    }

    /// Terminal teardown. Every manager aborts its attempts and fails
    /// its requests; new requests are rejected.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn stats(&self) -> Arc<StreamPoolStats> {
        self.shared.stats.clone()
    }

    pub fn active_manager_count(&self) -> usize {
        self.shared.lock_managers().len()
    }

    pub fn slots_in_use(&self) -> usize {
        self.shared.slots_in_use()
    }
}
