/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::ConnectionAttemptConfig;
use crate::connect::ArcTcpStreamConnector;
use crate::error::{ConnectError, StreamAttemptError};
use crate::stats::StreamPoolStats;

use super::{AttemptProgress, ConnectTiming, LoadState};

/// A single TCP handshake towards one IP endpoint.
pub struct TcpStreamAttempt {
    peer: SocketAddr,
    connect_timeout: Duration,
    connector: ArcTcpStreamConnector,
    stats: Arc<StreamPoolStats>,
    progress: Arc<AttemptProgress>,
    mark_complete: bool,
}

impl TcpStreamAttempt {
    pub fn new(
        peer: SocketAddr,
        config: &ConnectionAttemptConfig,
        connector: ArcTcpStreamConnector,
        stats: Arc<StreamPoolStats>,
    ) -> Self {
        TcpStreamAttempt {
            peer,
            connect_timeout: config.tcp_connect_timeout(),
            connector,
            stats,
            progress: Arc::new(AttemptProgress::default()),
            mark_complete: true,
        }
    }

    /// The first leg of a TLS attempt. Records into the owner's shared
    /// progress and leaves completion marking to the owner.
    pub(crate) fn nested(
        peer: SocketAddr,
        connect_timeout: Duration,
        connector: ArcTcpStreamConnector,
        stats: Arc<StreamPoolStats>,
        progress: Arc<AttemptProgress>,
    ) -> Self {
        TcpStreamAttempt {
            peer,
            connect_timeout,
            connector,
            stats,
            progress,
            mark_complete: false,
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

    pub async fn run(&mut self) -> Result<TcpStream, StreamAttemptError> {
        let r = self.run_connect().await;
        if self.mark_complete {
            self.progress.complete();
        }
        r
    }

    async fn run_connect(&mut self) -> Result<TcpStream, StreamAttemptError> {
        self.progress.set_load_state(LoadState::Connecting);
        self.progress.update_timing(|timing| {
            timing.connect_start = Some(Instant::now());
            timing.tcp_connect_end = None;
        });
        self.stats.add_tcp_connect_attempted();
        match tokio::time::timeout(self.connect_timeout, self.connector.connect(self.peer)).await {
            Ok(Ok(stream)) => {
                self.progress.update_timing(|timing| {
                    timing.tcp_connect_end = Some(Instant::now());
                });
                self.stats.add_tcp_connect_established();
                Ok(stream)
            }
            Ok(Err(e)) => Err(StreamAttemptError::ConnectFailed(ConnectError::from(e))),
            Err(_) => Err(StreamAttemptError::TimedOut),
        }
    }
}
