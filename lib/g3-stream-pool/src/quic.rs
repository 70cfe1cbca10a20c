/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::EndpointMetadata;
use crate::error::StreamAttemptError;
use crate::session::SharedSession;
use crate::types::StreamKey;

/// Seam to an external QUIC stack. The pool races at most one QUIC
/// attempt per manager against the TCP-based attempts; a successful
/// result is registered as an HTTP/3 session for the stream key.
#[async_trait]
pub trait QuicSessionConnector: Send + Sync {
    async fn connect(
        &self,
        key: &StreamKey,
        peer: SocketAddr,
        metadata: &EndpointMetadata,
    ) -> Result<SharedSession, StreamAttemptError>;
}

pub type ArcQuicSessionConnector = Arc<dyn QuicSessionConnector>;
