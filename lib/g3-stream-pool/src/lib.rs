/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

//! Connection attempt manager for HTTP stream pools.
//!
//! Given resolved service endpoints for a stream key, the pool races
//! TCP and TCP+TLS handshakes under the Happy-Eyeballs discipline,
//! arbitrates them against an optional QUIC attempt and against
//! multiplexed sessions discovered for the same key, recovers from ECH
//! and Trust-Anchor-ID handshake failures, and hands a single usable
//! stream to each waiting request.

mod types;
pub use types::{AddressFamily, Host, RequestPriority, StreamKey, UpstreamAddr};

mod error;
pub use error::{ConnectError, ResolveError, StreamAttemptError};

mod endpoint;
pub use endpoint::{select_trust_anchor_ids, EndpointMetadata, ServiceEndpoint, TrustAnchorId};

mod config;
pub use config::{ConnectionAttemptConfig, StreamPoolConfig};

mod ssl_config;
pub use ssl_config::SslConfig;

mod resolve;
pub use resolve::{
    ResolveOutput, ServiceEndpointJob, ServiceEndpointPublisher, ServiceEndpointResolver,
};

mod connect;
pub use connect::{
    ArcTcpStreamConnector, ArcTlsClientConnector, BoxTlsStream, CertRequestInfo,
    DefaultTcpConnector, TcpStreamConnector, TlsClientConnector, TlsConnectError, TlsStreamSocket,
};
#[cfg(feature = "rustls")]
pub use connect::RustlsStreamConnector;

mod attempt;
pub use attempt::{
    ConnectTiming, LoadState, TcpStreamAttempt, TlsStreamAttempt, TlsStreamAttemptDelegate,
};

mod session;
pub use session::{PooledSession, SessionProtocol, SharedSession, StreamCloseReason};

mod quic;
pub use quic::{ArcQuicSessionConnector, QuicSessionConnector};

mod stats;
pub use stats::StreamPoolStats;

mod log;
mod manager;

mod pool;
pub use pool::{
    EstablishedStream, PooledStream, StreamLease, StreamPool, StreamPoolContext, StreamRequest,
};
