/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::attempt::{
    AttemptProgress, LoadState, TcpStreamAttempt, TlsStreamAttempt, TlsStreamAttemptDelegate,
};
use crate::endpoint::{EndpointMetadata, ServiceEndpoint};
use crate::error::StreamAttemptError;
use crate::log::ManagerLogContext;
use crate::pool::{EstablishedStream, PoolShared, PooledStream, StreamLease};
use crate::resolve::{wait_crypto_ready, ResolveOutput, ServiceEndpointJob};
use crate::session::{SharedSession, StreamCloseReason};
use crate::types::{AddressFamily, RequestPriority, StreamKey};

mod slow_timer;
pub(crate) use slow_timer::SlowTimer;

mod slot;
pub(crate) use slot::TcpBasedAttemptSlot;

pub(crate) enum ManagerCommand {
    Request(QueuedRequest),
    SessionAvailable {
        session: SharedSession,
        created: bool,
    },
    IpAddressChanged,
    SslConfigChanged,
    CloseAll,
}

enum AttemptEvent {
    Slow(u64),
    Complete(u64, Result<EstablishedStream, StreamAttemptError>),
    QuicComplete(Result<SharedSession, StreamAttemptError>),
}

pub(crate) struct QueuedRequest {
    pub(crate) priority: RequestPriority,
    pub(crate) tx: oneshot::Sender<Result<StreamLease, StreamAttemptError>>,
}

/// FIFO of waiting requests, ordered by priority first and arrival
/// order within the same priority.
struct RequestQueue {
    next_seq: u64,
    entries: Vec<(u64, QueuedRequest)>,
}

impl RequestQueue {
    fn new() -> Self {
        RequestQueue {
            next_seq: 0,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, request: QueuedRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push((seq, request));
    }

    /// Drop requests whose caller went away.
    fn prune_canceled(&mut self) {
        self.entries.retain(|(_, r)| !r.tx.is_closed());
    }

    fn pending_count(&mut self) -> usize {
        self.prune_canceled();
        self.entries.len()
    }

    fn pop_best(&mut self) -> Option<QueuedRequest> {
        self.prune_canceled();
        let best = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, (seq, r))| (r.priority, std::cmp::Reverse(*seq)))
            .map(|(i, _)| i)?;
        Some(self.entries.remove(best).1)
    }

    fn drain(&mut self) -> Vec<QueuedRequest> {
        self.prune_canceled();
        let mut entries = std::mem::take(&mut self.entries);
        entries.sort_by_key(|(seq, r)| (std::cmp::Reverse(r.priority), *seq));
        entries.into_iter().map(|(_, r)| r).collect()
    }
}

/// Manager-side representation of one running TCP-based attempt.
pub(crate) struct AttemptHandle {
    id: u64,
    peer: SocketAddr,
    start_time: Instant,
    progress: Arc<AttemptProgress>,
    slow_timer: Arc<SlowTimer>,
    abort: AbortHandle,
}

impl AttemptHandle {
    pub(crate) fn new(
        id: u64,
        peer: SocketAddr,
        progress: Arc<AttemptProgress>,
        slow_timer: Arc<SlowTimer>,
        abort: AbortHandle,
    ) -> Self {
        AttemptHandle {
            id,
            peer,
            start_time: Instant::now(),
            progress,
            slow_timer,
            abort,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn ip_endpoint(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn family(&self) -> AddressFamily {
        AddressFamily::from(&self.peer)
    }

    pub(crate) fn load_state(&self) -> LoadState {
        self.progress.load_state()
    }

    pub(crate) fn is_slow(&self) -> bool {
        self.progress.is_slow()
    }

    pub(crate) fn set_cancel_reason(&self, reason: StreamCloseReason) {
        self.progress.set_cancel_reason(reason);
    }

    fn cancel(self, reason: StreamCloseReason) {
        self.progress.set_cancel_reason(reason);
        self.progress.complete();
        self.slow_timer.pause();
        self.abort.abort();
    }
}

/// Delegate handed to every TLS attempt: readiness waits go through the
/// resolver watch channel, endpoint snapshots come from the latest
/// published output, and the slow timer is paused across the wait.
struct ManagerTlsContext {
    peer: SocketAddr,
    snapshot_rx: watch::Receiver<ResolveOutput>,
    wait_rx: AsyncMutex<watch::Receiver<ResolveOutput>>,
    abort: CancellationToken,
    slow_timer: Arc<SlowTimer>,
}

#[async_trait]
impl TlsStreamAttemptDelegate for ManagerTlsContext {
    fn on_tcp_handshake_complete(&self) {
        self.slow_timer.pause();
    }

    async fn wait_for_service_endpoint_ready(&self) -> Result<(), StreamAttemptError> {
        let mut rx = self.wait_rx.lock().await;
        let r = wait_crypto_ready(&mut rx, &self.abort).await;
        // the TLS leg starts now
        self.slow_timer.resume();
        r
    }

    fn get_service_endpoint(&self) -> Result<ServiceEndpoint, StreamAttemptError> {
        if self.abort.is_cancelled() {
            return Err(StreamAttemptError::Aborted);
        }
        let output = self.snapshot_rx.borrow().clone();
        let endpoint = output
            .endpoints()
            .iter()
            .find(|ep| ep.contains_addr(&self.peer))
            .or_else(|| output.endpoints().first())
            .cloned();
        endpoint.ok_or(StreamAttemptError::Aborted)
    }
}

fn initial_attempt_state_str(crypto_ready: bool, has_v4: bool, has_v6: bool) -> &'static str {
    match (crypto_ready, has_v4, has_v6) {
        (true, true, true) => "dual-stack-crypto-ready",
        (true, true, false) => "ipv4-only-crypto-ready",
        (true, false, true) => "ipv6-only-crypto-ready",
        (true, false, false) => "no-address-crypto-ready",
        (false, true, true) => "dual-stack-awaiting-crypto",
        (false, true, false) => "ipv4-only-awaiting-crypto",
        (false, false, true) => "ipv6-only-awaiting-crypto",
        (false, false, false) => "no-address-awaiting-crypto",
    }
}

/// Drives the connection race for one stream key: consumes resolver
/// output, launches TCP-based attempts into slots under Happy-Eyeballs
/// timing, races an optional QUIC attempt, arbitrates against sessions
/// discovered for the same key, and fans the first usable stream out to
/// the waiting requests.
pub(crate) struct AttemptManager {
    id: Uuid,
    key: StreamKey,
    pool: Arc<PoolShared>,
    update_rx: watch::Receiver<ResolveOutput>,
    resolver_abort: CancellationToken,
    slots: Vec<TcpBasedAttemptSlot>,
    requests: RequestQueue,
    tried: HashSet<SocketAddr>,
    started_v4: usize,
    started_v6: usize,
    next_attempt_id: u64,
    attempts_started: usize,
    quic_started: bool,
    quic_in_flight: bool,
    quic_abort: Option<AbortHandle>,
    launch_on_failure: bool,
    budget_blocked: bool,
    resolver_finished: bool,
    last_error: Option<StreamAttemptError>,
    draining: bool,
    started_at: Instant,
    initial_attempt_state: Option<&'static str>,
    attempt_ev_tx: mpsc::UnboundedSender<AttemptEvent>,
    attempt_ev_rx: Option<mpsc::UnboundedReceiver<AttemptEvent>>,
}

impl AttemptManager {
    pub(crate) fn new(key: StreamKey, pool: Arc<PoolShared>, job: ServiceEndpointJob) -> Self {
        let (update_rx, resolver_abort) = job.into_parts();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        AttemptManager {
            id: Uuid::new_v4(),
            key,
            pool,
            update_rx,
            resolver_abort,
            slots: Vec::new(),
            requests: RequestQueue::new(),
            tried: HashSet::new(),
            started_v4: 0,
            started_v6: 0,
            next_attempt_id: 0,
            attempts_started: 0,
            quic_started: false,
            quic_in_flight: false,
            quic_abort: None,
            launch_on_failure: false,
            budget_blocked: false,
            resolver_finished: false,
            last_error: None,
            draining: false,
            started_at: Instant::now(),
            initial_attempt_state: None,
            attempt_ev_tx: ev_tx,
            attempt_ev_rx: Some(ev_rx),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn log_ctx(&self) -> ManagerLogContext<'_> {
        ManagerLogContext {
            manager_id: &self.id,
            key: &self.key,
            elapsed: self.started_at.elapsed(),
        }
    }

    fn attempt_count(&self) -> usize {
        self.slots.iter().map(|s| s.attempt_count()).sum()
    }

    fn all_attempts_slow(&self) -> bool {
        self.slots.iter().all(|s| s.is_slow())
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    ) {
        log::debug!("attempt manager {} created for {}", self.id, self.key);
        let mut join_set: JoinSet<()> = JoinSet::new();
        let Some(mut ev_rx) = self.attempt_ev_rx.take() else {
            return;
        };
        let mut change_rx = self.update_rx.clone();
        let resolver_abort = self.resolver_abort.clone();
        let shutdown = self.pool.shutdown.clone();
        let slot_released = self.pool.slot_released.clone();
        let mut cmd_closed = false;

        loop {
            if !self.draining {
                self.maybe_launch_attempts(&mut join_set);
            }
            if self.draining && join_set.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                Some(ev) = ev_rx.recv() => self.handle_attempt_event(ev),
                cmd = cmd_rx.recv(), if !cmd_closed => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            cmd_closed = true;
                            self.start_draining();
                        }
                    }
                }
                Some(_) = join_set.join_next(), if !join_set.is_empty() => {}
                _ = slot_released.notified(), if self.budget_blocked => {
                    self.budget_blocked = false;
                }
                r = change_rx.changed(), if !self.resolver_finished && !self.draining => {
                    match r {
                        Ok(()) => self.on_resolver_update(),
                        Err(_) => self.resolver_finished = true,
                    }
                }
                _ = resolver_abort.cancelled(), if !self.draining => {
                    self.cancel_all_attempts(StreamCloseReason::Abort);
                    self.fail_all_requests(StreamAttemptError::Aborted);
                    self.start_draining();
                }
                _ = shutdown.cancelled(), if !self.draining => {
                    self.cancel_all_attempts(StreamCloseReason::CloseAllConnections);
                    self.fail_all_requests(StreamAttemptError::Aborted);
                    self.start_draining();
                }
            }
        }

        self.finish();
    }

    fn finish(&mut self) {
        // slots are emptied on every drain path; release whatever is left
        for slot in self.slots.drain(..) {
            for attempt in slot.into_attempts() {
                attempt.cancel(StreamCloseReason::AttemptManagerDraining);
            }
            self.pool.release_slot();
        }
        self.pool.remove_manager(&self.key, self.id);
        if let Some(logger) = &self.pool.logger {
            self.log_ctx().log_manager_finished(
                logger,
                self.attempts_started,
                self.initial_attempt_state.unwrap_or("no-attempt"),
            );
        }
        log::debug!("attempt manager {} finished for {}", self.id, self.key);
    }

    fn on_resolver_update(&mut self) {
        let output = self.update_rx.borrow().clone();
        if output.finalized() {
            self.resolver_finished = true;
        }
        // new endpoints or fresh metadata may unblock launching
    }

    fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Request(request) => {
                if self.draining {
                    // redirected to a fresh manager owned by the pool
                    self.pool.submit_request(self.key.clone(), request);
                } else if let Some(session) = self.pool.lookup_session(&self.key) {
                    self.pool.stats.add_request_served_from_session();
                    let _ = request.tx.send(Ok(StreamLease::Session(session)));
                } else {
                    self.requests.push(request);
                }
            }
            ManagerCommand::SessionAvailable { session, created } => {
                if !session.is_usable() {
                    return;
                }
                let reason = StreamCloseReason::for_session(session.protocol(), created);
                self.cancel_all_attempts(reason);
                self.serve_all_from_session(session);
                self.start_draining();
            }
            ManagerCommand::IpAddressChanged => {
                self.cancel_all_attempts(StreamCloseReason::IpAddressChanged);
                self.fail_all_requests(StreamAttemptError::NetworkChanged);
                self.start_draining();
            }
            ManagerCommand::SslConfigChanged => {
                // stale handshakes are torn down, demand stays; the
                // launch loop restarts with fresh attempts
                self.cancel_all_attempts(StreamCloseReason::SslConfigChanged);
                self.tried.clear();
                self.started_v4 = 0;
                self.started_v6 = 0;
            }
            ManagerCommand::CloseAll => {
                self.cancel_all_attempts(StreamCloseReason::CloseAllConnections);
                self.fail_all_requests(StreamAttemptError::Aborted);
                self.start_draining();
            }
        }
    }

    fn handle_attempt_event(&mut self, ev: AttemptEvent) {
        match ev {
            AttemptEvent::Slow(id) => self.on_attempt_slow(id),
            AttemptEvent::Complete(id, result) => self.on_attempt_complete(id, result),
            AttemptEvent::QuicComplete(result) => self.on_quic_complete(result),
        }
    }

    fn on_attempt_slow(&mut self, id: u64) {
        let mut slow_peer = None;
        for slot in self.slots.iter_mut() {
            let found = slot.iter().find(|a| a.id() == id).map(|a| a.ip_endpoint());
            if let Some(peer) = found {
                slow_peer = Some(peer);
                slot.update_is_slow();
                log::trace!("slot load state now {}", slot.load_state().as_str());
                break;
            }
        }
        if let Some(peer) = slow_peer {
            if let Some(logger) = &self.pool.logger {
                self.log_ctx().log_attempt_slow(logger, peer);
            }
        }
        // the launch loop may now start the next candidate
    }

    fn take_attempt(&mut self, id: u64) -> Option<AttemptHandle> {
        for i in 0..self.slots.len() {
            if let Some(attempt) = self.slots[i].take_attempt(id) {
                if self.slots[i].empty() {
                    self.slots.remove(i);
                    self.pool.release_slot();
                }
                return Some(attempt);
            }
        }
        None
    }

    fn on_attempt_complete(
        &mut self,
        id: u64,
        result: Result<EstablishedStream, StreamAttemptError>,
    ) {
        let Some(attempt) = self.take_attempt(id) else {
            // already canceled; a late success has no consumer
            if result.is_ok() {
                self.pool.stats.add_stream_discarded();
            }
            return;
        };
        match result {
            Ok(stream) => self.on_attempt_success(attempt, stream),
            Err(e) => self.on_attempt_failure(attempt, e),
        }
    }

    fn on_attempt_success(&mut self, attempt: AttemptHandle, stream: EstablishedStream) {
        if let Some(logger) = &self.pool.logger {
            self.log_ctx().log_attempt_end(
                logger,
                attempt.ip_endpoint(),
                "Success",
                attempt.start_time.elapsed(),
            );
        }
        // the winner cancels every other attempt still in flight
        self.cancel_all_attempts(StreamCloseReason::Unspecified);
        self.tried.clear();
        self.started_v4 = 0;
        self.started_v6 = 0;

        match self.requests.pop_best() {
            Some(request) => {
                self.pool.stats.add_request_served_from_stream();
                let _ = request.tx.send(Ok(StreamLease::Stream(stream)));
            }
            None => {
                self.pool.stats.add_stream_discarded();
            }
        }

        if self.requests.pending_count() == 0 {
            self.start_draining();
        } else if let Some(session) = self.pool.lookup_session(&self.key) {
            // a session was built on top of an earlier socket
            self.serve_all_from_session(session);
            self.start_draining();
        }
        // otherwise the launch loop races fresh attempts for the rest
    }

    fn on_attempt_failure(&mut self, attempt: AttemptHandle, e: StreamAttemptError) {
        if let Some(logger) = &self.pool.logger {
            self.log_ctx().log_attempt_end(
                logger,
                attempt.ip_endpoint(),
                e.brief(),
                attempt.start_time.elapsed(),
            );
        }
        let aborted = e.is_aborted() || attempt.progress.cancel_reason().is_some();
        if aborted {
            // never counted as an actual failure
            return;
        }
        self.pool.stats.add_attempt_failed();
        self.last_error = Some(e);
        self.launch_on_failure = true;
    }

    fn on_quic_complete(&mut self, result: Result<SharedSession, StreamAttemptError>) {
        self.quic_in_flight = false;
        self.quic_abort = None;
        match result {
            Ok(session) => {
                self.pool.stats.add_quic_established();
                self.pool.register_session(&self.key, session.clone());
                self.cancel_all_attempts(StreamCloseReason::QuicSessionCreated);
                self.serve_all_from_session(session);
                self.start_draining();
            }
            Err(e) => {
                log::debug!("quic attempt for {} failed: {e}", self.key);
                if !e.is_aborted() && self.last_error.is_none() {
                    self.last_error = Some(e);
                }
            }
        }
    }

    fn serve_all_from_session(&mut self, session: SharedSession) {
        for request in self.requests.drain() {
            self.pool.stats.add_request_served_from_session();
            let _ = request.tx.send(Ok(StreamLease::Session(session.clone())));
        }
    }

    fn fail_all_requests(&mut self, e: StreamAttemptError) {
        for request in self.requests.drain() {
            self.pool.stats.add_request_failed();
            let _ = request.tx.send(Err(e.duplicate()));
        }
    }

    fn cancel_all_attempts(&mut self, reason: StreamCloseReason) {
        let slots = std::mem::take(&mut self.slots);
        for slot in slots {
            slot.set_cancel_reason(reason);
            for attempt in slot.into_attempts() {
                if let Some(logger) = &self.pool.logger {
                    self.log_ctx()
                        .log_attempt_canceled(logger, attempt.ip_endpoint(), reason);
                }
                self.pool.stats.add_attempt_canceled(reason);
                attempt.cancel(reason);
            }
            self.pool.release_slot();
        }
        if let Some(abort) = self.quic_abort.take() {
            abort.abort();
            self.quic_in_flight = false;
            self.pool.stats.add_attempt_canceled(reason);
            log::debug!("quic attempt for {} canceled: {}", self.key, reason.as_str());
        }
    }

    fn start_draining(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        // a fresh manager will serve whatever arrives from now on
        self.pool.remove_manager(&self.key, self.id);
        log::debug!("attempt manager {} draining for {}", self.id, self.key);
    }

    fn maybe_launch_attempts(&mut self, join_set: &mut JoinSet<()>) {
        loop {
            if self.requests.pending_count() == 0 {
                if self.attempt_count() == 0 && !self.quic_in_flight && self.attempts_started > 0 {
                    // all callers went away
                    self.start_draining();
                }
                return;
            }

            self.maybe_launch_quic(join_set);

            let in_flight = self.attempt_count();
            let mut launch = in_flight == 0 || self.all_attempts_slow();
            // always consume the flag so one failure starts one attempt
            if std::mem::take(&mut self.launch_on_failure) {
                launch = true;
            }
            if !launch {
                return;
            }

            let output = self.update_rx.borrow().clone();
            let Some((peer, using_tls)) = self.pick_next_endpoint(&output) else {
                if in_flight == 0 && !self.quic_in_flight && self.resolver_finished {
                    let e = self
                        .last_error
                        .take()
                        .unwrap_or(StreamAttemptError::NoAddressConnected);
                    self.fail_all_requests(e);
                    self.start_draining();
                }
                return;
            };
            if !self.spawn_tcp_based_attempt(join_set, peer, using_tls, &output) {
                // out of slot budget
                return;
            }
        }
    }

    fn pick_next_endpoint(&self, output: &ResolveOutput) -> Option<(SocketAddr, bool)> {
        let mut v4_candidate = None;
        let mut v6_candidate = None;
        for endpoint in output.endpoints() {
            let using_tls = self.key.using_tls() || endpoint.metadata().requires_tls();
            if v4_candidate.is_none() && self.started_v4 < self.max_attempts_per_family() {
                v4_candidate = endpoint
                    .ipv4_endpoints()
                    .iter()
                    .find(|addr| self.addr_untried(addr))
                    .map(|addr| (*addr, using_tls));
            }
            if v6_candidate.is_none() && self.started_v6 < self.max_attempts_per_family() {
                v6_candidate = endpoint
                    .ipv6_endpoints()
                    .iter()
                    .find(|addr| self.addr_untried(addr))
                    .map(|addr| (*addr, using_tls));
            }
        }
        // balance the families: whichever was tried less goes first
        if self.started_v6 <= self.started_v4 {
            v6_candidate.or(v4_candidate)
        } else {
            v4_candidate.or(v6_candidate)
        }
    }

    fn max_attempts_per_family(&self) -> usize {
        self.pool.config.attempt_config().max_attempts_per_family()
    }

    fn addr_untried(&self, addr: &SocketAddr) -> bool {
        !self.tried.contains(addr) && !self.slots.iter().any(|s| s.has_ip_endpoint(addr))
    }

    /// Place the next attempt into a slot that has room for its address
    /// family, creating a new slot when the budget allows.
    fn slot_index_for(&mut self, family: AddressFamily) -> Option<usize> {
        if let Some(i) = self
            .slots
            .iter()
            .position(|s| !s.empty() && !s.family_occupied(family))
        {
            return Some(i);
        }
        if self.slots.len() >= self.pool.config.max_slots_per_manager() {
            log::debug!("{} reached per-manager slot limit", self.key);
            return None;
        }
        if !self.pool.try_acquire_slot() {
            log::debug!("{} denied by pool slot budget", self.key);
            self.budget_blocked = true;
            return None;
        }
        self.slots.push(TcpBasedAttemptSlot::new());
        Some(self.slots.len() - 1)
    }

    fn spawn_tcp_based_attempt(
        &mut self,
        join_set: &mut JoinSet<()>,
        peer: SocketAddr,
        using_tls: bool,
        output: &ResolveOutput,
    ) -> bool {
        let family = AddressFamily::from(&peer);
        let Some(slot_index) = self.slot_index_for(family) else {
            return false;
        };

        let id = self.next_attempt_id;
        self.next_attempt_id += 1;
        self.attempts_started += 1;
        self.tried.insert(peer);
        match family {
            AddressFamily::Ipv4 => self.started_v4 += 1,
            AddressFamily::Ipv6 => self.started_v6 += 1,
        }
        if self.initial_attempt_state.is_none() {
            let has_v4 = output.endpoints().iter().any(|e| !e.ipv4_endpoints().is_empty());
            let has_v6 = output.endpoints().iter().any(|e| !e.ipv6_endpoints().is_empty());
            self.initial_attempt_state = Some(initial_attempt_state_str(
                output.crypto_ready(),
                has_v4,
                has_v6,
            ));
        }

        let attempt_config = self.pool.config.attempt_config();
        let slow_timer = Arc::new(SlowTimer::new(attempt_config.connection_attempt_delay()));
        let ev_tx = self.attempt_ev_tx.clone();

        let (progress, abort) = if using_tls {
            let delegate = Arc::new(ManagerTlsContext {
                peer,
                snapshot_rx: self.update_rx.clone(),
                wait_rx: AsyncMutex::new(self.update_rx.clone()),
                abort: self.resolver_abort.clone(),
                slow_timer: slow_timer.clone(),
            });
            let mut attempt = TlsStreamAttempt::new(
                peer,
                self.key.destination().host().clone(),
                attempt_config,
                self.pool.tcp_connector.clone(),
                self.pool.tls_connector.clone(),
                delegate,
                self.pool.stats.clone(),
            );
            let progress = attempt.progress();
            let fut = async move {
                let r = attempt.run().await;
                r.map(|stream| EstablishedStream {
                    stream: PooledStream::Tls(stream),
                    peer,
                    timing: attempt.connect_timing(),
                    using_tls: true,
                })
            };
            let abort = self.spawn_attempt_task(
                join_set,
                id,
                fut,
                slow_timer.clone(),
                progress.clone(),
                ev_tx,
            );
            (progress, abort)
        } else {
            let mut attempt = TcpStreamAttempt::new(
                peer,
                attempt_config,
                self.pool.tcp_connector.clone(),
                self.pool.stats.clone(),
            );
            let progress = attempt.progress();
            let fut = async move {
                let r = attempt.run().await;
                r.map(|stream| EstablishedStream {
                    stream: PooledStream::Tcp(stream),
                    peer,
                    timing: attempt.connect_timing(),
                    using_tls: false,
                })
            };
            let abort = self.spawn_attempt_task(
                join_set,
                id,
                fut,
                slow_timer.clone(),
                progress.clone(),
                ev_tx,
            );
            (progress, abort)
        };

        let handle = AttemptHandle::new(id, peer, progress, slow_timer, abort);
        self.slots[slot_index].allocate_attempt(handle);
        if let Some(logger) = &self.pool.logger {
            self.log_ctx().log_attempt_start(logger, peer, using_tls);
        }
        true
    }

    fn spawn_attempt_task<F>(
        &mut self,
        join_set: &mut JoinSet<()>,
        id: u64,
        fut: F,
        slow_timer: Arc<SlowTimer>,
        progress: Arc<AttemptProgress>,
        ev_tx: mpsc::UnboundedSender<AttemptEvent>,
    ) -> AbortHandle
    where
        F: Future<Output = Result<EstablishedStream, StreamAttemptError>> + Send + 'static,
    {
        join_set.spawn(async move {
            tokio::pin!(fut);
            let mut slow_seen = false;
            loop {
                tokio::select! {
                    biased;

                    r = &mut fut => {
                        let _ = ev_tx.send(AttemptEvent::Complete(id, r));
                        break;
                    }
                    _ = slow_timer.fired(), if !slow_seen => {
                        slow_seen = true;
                        if progress.mark_slow() {
                            let _ = ev_tx.send(AttemptEvent::Slow(id));
                        }
                    }
                }
            }
        })
    }

    fn maybe_launch_quic(&mut self, join_set: &mut JoinSet<()>) {
        if self.quic_started || !self.pool.config.attempt_config().allow_quic() {
            return;
        }
        let Some(connector) = self.pool.quic_connector.clone() else {
            return;
        };
        let output = self.update_rx.borrow().clone();
        let Some(endpoint) = output.endpoints().iter().find(|e| e.metadata().advertises_h3())
        else {
            return;
        };
        let Some(peer) = endpoint
            .ipv6_endpoints()
            .first()
            .or_else(|| endpoint.ipv4_endpoints().first())
            .copied()
        else {
            return;
        };
        let metadata: EndpointMetadata = endpoint.metadata().clone();

        self.quic_started = true;
        self.quic_in_flight = true;
        self.pool.stats.add_quic_attempted();
        let key = self.key.clone();
        let ev_tx = self.attempt_ev_tx.clone();
        let abort = join_set.spawn(async move {
            let r = connector.connect(&key, peer, &metadata).await;
            let _ = ev_tx.send(AttemptEvent::QuicComplete(r));
        });
        self.quic_abort = Some(abort);
        log::debug!("{} started quic attempt to {}", self.key, peer);
    }
}
