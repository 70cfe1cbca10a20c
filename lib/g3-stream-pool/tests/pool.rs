/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::str::FromStr;
use std::time::Duration;

use g3_stream_pool::{
    EndpointMetadata, Host, PooledSession, RequestPriority, StreamAttemptError, StreamCloseReason,
    StreamKey, StreamLease, StreamPool, StreamPoolConfig, StreamPoolContext, UpstreamAddr,
};

mod util;
use util::{
    v4_endpoint, ManualResolver, MockTcpConnector, MockTlsConnector, StaticResolver, TcpBehavior,
    TestSession,
};

const WAIT: Duration = Duration::from_secs(5);

fn tcp_key(host: &str, port: u16) -> StreamKey {
    StreamKey::new(UpstreamAddr::new(Host::from_str(host).unwrap(), port), false)
}

fn tls_key(host: &str, port: u16) -> StreamKey {
    StreamKey::new(UpstreamAddr::new(Host::from_domain(host), port), true)
}

fn fast_config() -> StreamPoolConfig {
    let mut config = StreamPoolConfig::default();
    config
        .attempt_config_mut()
        .set_connection_attempt_delay(Duration::from_millis(50));
    config
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn shutdown_aborts_in_flight_attempts() {
    let tcp = MockTcpConnector::new().await;
    tcp.set_behavior("198.51.100.7".parse().unwrap(), TcpBehavior::Hang);
    tcp.set_behavior("2001:db8::1".parse().unwrap(), TcpBehavior::Hang);
    let mut endpoint = v4_endpoint("198.51.100.7:80", EndpointMetadata::default());
    endpoint.push_ipv6_endpoint("[2001:db8::1]:80".parse().unwrap());
    let resolver = StaticResolver::new(vec![endpoint]);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(fast_config(), context);

    let request = pool.request_stream(tcp_key("198.51.100.7", 80), RequestPriority::Normal);
    // both families are in flight once the slow timer fired
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(tcp.total_connects(), 2);

    pool.shutdown();
    let r = tokio::time::timeout(WAIT, request).await.unwrap();
    assert!(matches!(r, Err(StreamAttemptError::Aborted)));

    settle().await;
    let stats = pool.stats();
    assert_eq!(
        stats.attempt_canceled(StreamCloseReason::CloseAllConnections),
        2
    );
    assert_eq!(pool.active_manager_count(), 0);
    assert_eq!(pool.slots_in_use(), 0);

    // new requests are rejected after shutdown
    let r = tokio::time::timeout(
        WAIT,
        pool.request_stream(tcp_key("198.51.100.7", 80), RequestPriority::Normal),
    )
    .await
    .unwrap();
    assert!(matches!(r, Err(StreamAttemptError::Aborted)));
}

#[tokio::test]
async fn existing_session_preempts_attempts() {
    let tcp = MockTcpConnector::new().await;
    tcp.set_behavior("198.51.100.7".parse().unwrap(), TcpBehavior::Hang);
    let resolver = StaticResolver::new(vec![v4_endpoint(
        "198.51.100.7:443",
        EndpointMetadata::default(),
    )]);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    context.set_tls_connector(MockTlsConnector::new());
    let pool = StreamPool::new(fast_config(), context);

    let key = tls_key("www.example.net", 443);
    let request = pool.request_stream(key.clone(), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = TestSession::h2();
    pool.notify_existing_session(&key, session);

    let lease = tokio::time::timeout(WAIT, request).await.unwrap().unwrap();
    let StreamLease::Session(session) = lease else {
        panic!("expected a session lease");
    };
    assert_eq!(session.protocol().as_str(), "h2");

    settle().await;
    assert!(
        pool.stats()
            .attempt_canceled(StreamCloseReason::UsingExistingSpdySession)
            >= 1
    );
    assert_eq!(pool.active_manager_count(), 0);
}

#[tokio::test]
async fn registered_session_serves_new_requests_directly() {
    let tcp = MockTcpConnector::new().await;
    let resolver = StaticResolver::new(vec![v4_endpoint(
        "198.51.100.7:443",
        EndpointMetadata::default(),
    )]);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(fast_config(), context);

    let key = tls_key("www.example.net", 443);
    let session = TestSession::h2();
    pool.notify_session_created(&key, session.clone());

    let lease = tokio::time::timeout(
        WAIT,
        pool.request_stream(key.clone(), RequestPriority::Normal),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(lease, StreamLease::Session(_)));
    // no attempt manager was created at all
    assert_eq!(pool.active_manager_count(), 0);
    assert_eq!(tcp.total_connects(), 0);

    // a dead session is evicted and a real race starts instead
    session.set_unusable();
    let lease = tokio::time::timeout(
        WAIT,
        pool.request_stream(tls_key("www.example.net", 443), RequestPriority::Normal),
    )
    .await
    .unwrap();
    // no tls connector was installed, so the fresh race fails after the
    // tcp leg; what matters is that attempts ran at all
    assert!(lease.is_err());
    assert!(tcp.total_connects() >= 1);
}

#[tokio::test]
async fn ip_address_change_fails_requests_with_network_changed() {
    let tcp = MockTcpConnector::new().await;
    tcp.set_behavior("198.51.100.7".parse().unwrap(), TcpBehavior::Hang);
    let resolver = StaticResolver::new(vec![v4_endpoint(
        "198.51.100.7:80",
        EndpointMetadata::default(),
    )]);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(fast_config(), context);

    let request = pool.request_stream(tcp_key("198.51.100.7", 80), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(50)).await;
    pool.notify_ip_address_changed();

    let r = tokio::time::timeout(WAIT, request).await.unwrap();
    assert!(matches!(r, Err(StreamAttemptError::NetworkChanged)));

    settle().await;
    assert!(
        pool.stats()
            .attempt_canceled(StreamCloseReason::IpAddressChanged)
            >= 1
    );
}

#[tokio::test]
async fn ssl_config_change_relaunches_attempts() {
    let tcp = MockTcpConnector::new().await;
    // first connect hangs, the relaunched one succeeds
    tcp.script_behaviors(
        "198.51.100.7".parse().unwrap(),
        vec![TcpBehavior::Hang, TcpBehavior::Connect],
    );
    let resolver = StaticResolver::new(vec![v4_endpoint(
        "198.51.100.7:80",
        EndpointMetadata::default(),
    )]);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(fast_config(), context);

    let request = pool.request_stream(tcp_key("198.51.100.7", 80), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(30)).await;
    pool.notify_ssl_config_changed();

    let lease = tokio::time::timeout(WAIT, request).await.unwrap();
    assert!(lease.is_ok());
    assert_eq!(tcp.total_connects(), 2);

    settle().await;
    assert!(
        pool.stats()
            .attempt_canceled(StreamCloseReason::SslConfigChanged)
            >= 1
    );
}

#[tokio::test]
async fn pool_slot_budget_blocks_and_releases() {
    let tcp = MockTcpConnector::new().await;
    tcp.set_behavior("198.51.100.7".parse().unwrap(), TcpBehavior::Hang);
    let resolver = StaticResolver::new(vec![v4_endpoint(
        "198.51.100.7:80",
        EndpointMetadata::default(),
    )]);
    let mut config = fast_config();
    config.set_max_slots(1);
    let mut context = StreamPoolContext::new(resolver);
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(config, context);

    let key_a = tcp_key("198.51.100.7", 80);
    let mut key_b = tcp_key("198.51.100.7", 81);
    key_b.set_partition("other");

    let blocked_holder = pool.request_stream(key_a.clone(), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.slots_in_use(), 1);

    // the second manager is denied a slot and stays queued
    let request_b = pool.request_stream(key_b.clone(), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(tcp.connect_count("198.51.100.7:81".parse().unwrap()), 0);

    // the already launched attempt keeps hanging; the blocked manager
    // will connect for real once it gets a slot
    tcp.set_behavior("198.51.100.7".parse().unwrap(), TcpBehavior::Connect);

    // preempting the first manager releases its slot
    pool.notify_existing_session(&key_a, TestSession::h2());
    let lease = tokio::time::timeout(WAIT, blocked_holder).await.unwrap();
    assert!(matches!(lease, Ok(StreamLease::Session(_))));

    let lease = tokio::time::timeout(WAIT, request_b).await.unwrap();
    assert!(matches!(lease, Ok(StreamLease::Stream(_))));
}

#[tokio::test]
async fn tls_attempt_waits_for_crypto_metadata() {
    let tcp = MockTcpConnector::new().await;
    let tls = MockTlsConnector::new();
    let resolver = ManualResolver::new();
    let mut context = StreamPoolContext::new(resolver.clone());
    context.set_tcp_connector(tcp.clone());
    context.set_tls_connector(tls.clone());
    let pool = StreamPool::new(fast_config(), context);

    let request = pool.request_stream(tls_key("www.example.net", 443), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(resolver.publisher_count(), 1);

    // addresses arrive first; the TCP leg runs, TLS has to wait
    resolver.with_publisher(0, |p| {
        p.publish_endpoints(vec![v4_endpoint(
            "198.51.100.7:443",
            EndpointMetadata::default(),
        )]);
    });
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(tcp.connect_count("198.51.100.7:443".parse().unwrap()), 1);
    assert_eq!(tls.handshake_count(), 0);

    resolver.with_publisher(0, |p| {
        p.set_crypto_ready();
        p.finalize();
    });

    let lease = tokio::time::timeout(WAIT, request).await.unwrap();
    assert!(matches!(lease, Ok(StreamLease::Stream(_))));
    assert_eq!(tls.handshake_count(), 1);
}

#[tokio::test]
async fn resolver_abort_fails_waiting_requests() {
    let tcp = MockTcpConnector::new().await;
    let resolver = ManualResolver::new();
    let mut context = StreamPoolContext::new(resolver.clone());
    context.set_tcp_connector(tcp.clone());
    let pool = StreamPool::new(fast_config(), context);

    let request = pool.request_stream(tcp_key("198.51.100.7", 80), RequestPriority::Normal);
    tokio::time::sleep(Duration::from_millis(30)).await;
    resolver.with_publisher(0, |p| p.abort());

    let r = tokio::time::timeout(WAIT, request).await.unwrap();
    assert!(matches!(r, Err(StreamAttemptError::Aborted)));
    settle().await;
    assert_eq!(pool.active_manager_count(), 0);
}
