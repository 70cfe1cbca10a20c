/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use g3_stream_pool::{
    Host, RequestPriority, ResolveError, ServiceEndpoint, ServiceEndpointJob,
    ServiceEndpointResolver, StreamKey, StreamLease, StreamPool, StreamPoolConfig,
    StreamPoolContext, UpstreamAddr,
};

/// Feed the pool from the system resolver. Real owners plug in their
/// own resolver with HTTPS-record metadata; the demo only needs plain
/// A/AAAA answers.
struct SystemResolver;

impl ServiceEndpointResolver for SystemResolver {
    fn resolve(&self, key: &StreamKey) -> Result<ServiceEndpointJob, ResolveError> {
        let (publisher, job) = ServiceEndpointJob::new();
        let host = key.destination().host().clone();
        let port = key.destination().port();
        tokio::spawn(async move {
            let mut endpoint = ServiceEndpoint::default();
            match host {
                Host::Ip(ip) => {
                    let addr = SocketAddr::new(ip, port);
                    if addr.is_ipv4() {
                        endpoint.push_ipv4_endpoint(addr);
                    } else {
                        endpoint.push_ipv6_endpoint(addr);
                    }
                }
                Host::Domain(domain) => {
                    match tokio::net::lookup_host((domain.as_ref(), port)).await {
                        Ok(addrs) => {
                            for addr in addrs {
                                if addr.is_ipv4() {
                                    endpoint.push_ipv4_endpoint(addr);
                                } else {
                                    endpoint.push_ipv6_endpoint(addr);
                                }
                            }
                        }
                        Err(e) => {
                            eprintln!("resolve failed: {e}");
                        }
                    }
                }
            }
            publisher.publish_endpoints(vec![endpoint]);
            publisher.set_crypto_ready();
            publisher.finalize();
        });
        Ok(job)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = env::var("TEST_CONNECT_HOST").unwrap_or_else(|_| "example.com".to_string());
    let port = env::var("TEST_CONNECT_PORT")
        .ok()
        .and_then(|s| u16::from_str(&s).ok())
        .unwrap_or(80);

    let pool = StreamPool::new(
        StreamPoolConfig::default(),
        StreamPoolContext::new(Arc::new(SystemResolver)),
    );

    let upstream = UpstreamAddr::new(
        Host::from_str(&host).map_err(|e| anyhow!("invalid host: {e}"))?,
        port,
    );
    let key = StreamKey::new(upstream, false);

    let lease = pool
        .request_stream(key, RequestPriority::Normal)
        .await
        .map_err(|e| anyhow!("no stream: {e}"))?;
    let mut established = match lease {
        StreamLease::Stream(s) => s,
        StreamLease::Session(_) => return Err(anyhow!("unexpected session lease")),
    };

    println!("connected to {} via {}", host, established.peer);
    if let (Some(start), Some(end)) = (
        established.timing.connect_start,
        established.timing.connect_end,
    ) {
        println!("handshake took {:?}", end.duration_since(start));
    }

    let request = format!("HEAD / HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    established.stream.write_all(request.as_bytes()).await?;
    established.stream.flush().await?;

    let mut buf = vec![0u8; 4096];
    let nr = established.stream.read(&mut buf).await?;
    let head = String::from_utf8_lossy(&buf[..nr]);
    match head.lines().next() {
        Some(status) => println!("{status}"),
        None => println!("empty response"),
    }

    Ok(())
}
