/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::sync::Mutex;

use tokio::time::Instant;

use crate::session::StreamCloseReason;

mod tcp;
pub use tcp::TcpStreamAttempt;

mod tls;
pub use tls::{TlsStreamAttempt, TlsStreamAttemptDelegate};

/// Coarse progress indicator of one attempt, for observability only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadState {
    #[default]
    Idle,
    Connecting,
    WaitingForEndpointMetadata,
    SslHandshake,
    Complete,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Idle => "Idle",
            LoadState::Connecting => "Connecting",
            LoadState::WaitingForEndpointMetadata => "WaitingForEndpointMetadata",
            LoadState::SslHandshake => "SslHandshake",
            LoadState::Complete => "Complete",
        }
    }
}

/// Wall-clock milestones of one attempt. The TCP fields are rewritten
/// by a handshake restarted for an ECH or Trust-Anchor-ID retry, so
/// they always describe the connection that was finally used.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectTiming {
    pub connect_start: Option<Instant>,
    pub tcp_connect_end: Option<Instant>,
    pub endpoint_wait_start: Option<Instant>,
    pub endpoint_wait_end: Option<Instant>,
    pub tls_handshake_start: Option<Instant>,
    pub tls_handshake_end: Option<Instant>,
    pub connect_end: Option<Instant>,
}

#[derive(Default)]
struct ProgressInner {
    load_state: LoadState,
    timing: ConnectTiming,
    is_slow: bool,
    cancel_reason: Option<StreamCloseReason>,
}

/// State shared between a running attempt and its manager-side handle.
#[derive(Default)]
pub(crate) struct AttemptProgress {
    inner: Mutex<ProgressInner>,
}

impl AttemptProgress {
    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_load_state(&self, state: LoadState) {
        self.lock().load_state = state;
    }

    pub(crate) fn load_state(&self) -> LoadState {
        self.lock().load_state
    }

    pub(crate) fn update_timing<F: FnOnce(&mut ConnectTiming)>(&self, f: F) {
        f(&mut self.lock().timing);
    }

    pub(crate) fn timing(&self) -> ConnectTiming {
        self.lock().timing
    }

    /// Once slow, always slow. Returns false if it already was.
    pub(crate) fn mark_slow(&self) -> bool {
        let mut inner = self.lock();
        if inner.is_slow {
            false
        } else {
            inner.is_slow = true;
            true
        }
    }

    pub(crate) fn is_slow(&self) -> bool {
        self.lock().is_slow
    }

    pub(crate) fn set_cancel_reason(&self, reason: StreamCloseReason) {
        self.lock().cancel_reason = Some(reason);
    }

    pub(crate) fn cancel_reason(&self) -> Option<StreamCloseReason> {
        self.lock().cancel_reason
    }

    pub(crate) fn complete(&self) {
        let mut inner = self.lock();
        inner.load_state = LoadState::Complete;
        if inner.timing.connect_end.is_none() {
            inner.timing.connect_end = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_state_order() {
        assert!(LoadState::Idle < LoadState::Connecting);
        assert!(LoadState::Connecting < LoadState::WaitingForEndpointMetadata);
        assert!(LoadState::WaitingForEndpointMetadata < LoadState::SslHandshake);
        assert!(LoadState::SslHandshake < LoadState::Complete);
    }

    #[tokio::test]
    async fn slow_is_sticky() {
        let progress = AttemptProgress::default();
        assert!(!progress.is_slow());
        assert!(progress.mark_slow());
        assert!(!progress.mark_slow());
        assert!(progress.is_slow());
    }

    #[tokio::test]
    async fn complete_sets_connect_end_once() {
        let progress = AttemptProgress::default();
        progress.complete();
        let end = progress.timing().connect_end.unwrap();
        progress.complete();
        assert_eq!(progress.timing().connect_end.unwrap(), end);
        assert_eq!(progress.load_state(), LoadState::Complete);
    }
}
