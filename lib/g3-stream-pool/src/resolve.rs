/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 G3-OSS developers.
 */

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{ResolveError, StreamAttemptError};
use crate::endpoint::ServiceEndpoint;
use crate::types::StreamKey;

/// Latest state of one service endpoint resolution. `crypto_ready` and
/// `finalized` are monotone: once raised they stay raised.
#[derive(Clone, Default)]
pub struct ResolveOutput {
    endpoints: Arc<Vec<ServiceEndpoint>>,
    crypto_ready: bool,
    finalized: bool,
}

impl ResolveOutput {
    #[inline]
    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.endpoints
    }

    #[inline]
    pub fn crypto_ready(&self) -> bool {
        self.crypto_ready
    }

    #[inline]
    pub fn finalized(&self) -> bool {
        self.finalized
    }
}

/// Producer half of a resolution job. Resolver implementations and
/// tests push updates here; the attempt manager observes them through
/// the paired [`ServiceEndpointJob`].
pub struct ServiceEndpointPublisher {
    tx: watch::Sender<ResolveOutput>,
    abort: CancellationToken,
}

impl ServiceEndpointPublisher {
    pub fn publish_endpoints(&self, endpoints: Vec<ServiceEndpoint>) {
        self.tx.send_modify(|output| {
            output.endpoints = Arc::new(endpoints);
        });
    }

    pub fn set_crypto_ready(&self) {
        self.tx.send_modify(|output| {
            output.crypto_ready = true;
        });
    }

    pub fn finalize(&self) {
        self.tx.send_modify(|output| {
            output.finalized = true;
        });
    }

    /// Declare the whole resolution impossible, e.g. after detecting a
    /// poisoned answer. In-flight attempts observing this will abort.
    pub fn abort(&self) {
        self.abort.cancel();
    }
}

/// Consumer half. Handed to the attempt manager at creation.
pub struct ServiceEndpointJob {
    rx: watch::Receiver<ResolveOutput>,
    abort: CancellationToken,
}

impl ServiceEndpointJob {
    pub fn new() -> (ServiceEndpointPublisher, ServiceEndpointJob) {
        let (tx, rx) = watch::channel(ResolveOutput::default());
        let abort = CancellationToken::new();
        (
            ServiceEndpointPublisher {
                tx,
                abort: abort.clone(),
            },
            ServiceEndpointJob { rx, abort },
        )
    }

    pub fn current(&self) -> ResolveOutput {
        self.rx.borrow().clone()
    }

    pub fn endpoints_crypto_ready(&self) -> bool {
        self.rx.borrow().crypto_ready
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub(crate) fn into_parts(self) -> (watch::Receiver<ResolveOutput>, CancellationToken) {
        (self.rx, self.abort)
    }
}

/// Wait until the resolver marks crypto metadata as final. An error
/// means the attempt has to abort: either the resolver declared the
/// resolution impossible or it went away before readiness.
pub(crate) async fn wait_crypto_ready(
    rx: &mut watch::Receiver<ResolveOutput>,
    abort: &CancellationToken,
) -> Result<(), StreamAttemptError> {
    loop {
        if abort.is_cancelled() {
            return Err(StreamAttemptError::Aborted);
        }
        if rx.borrow().crypto_ready {
            return Ok(());
        }
        tokio::select! {
            _ = abort.cancelled() => return Err(StreamAttemptError::Aborted),
            r = rx.changed() => {
                if r.is_err() {
                    return Err(StreamAttemptError::Aborted);
                }
            }
        }
    }
}

pub trait ServiceEndpointResolver: Send + Sync {
    fn resolve(&self, key: &StreamKey) -> Result<ServiceEndpointJob, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn monotone_flags() {
        let (publisher, job) = ServiceEndpointJob::new();
        assert!(!job.endpoints_crypto_ready());
        publisher.set_crypto_ready();
        assert!(job.endpoints_crypto_ready());
        publisher.publish_endpoints(Vec::new());
        assert!(job.endpoints_crypto_ready());
        publisher.finalize();
        assert!(job.current().finalized());
    }

    #[tokio::test]
    async fn crypto_wait_observes_abort() {
        let (publisher, job) = ServiceEndpointJob::new();
        let (mut rx, abort) = job.into_parts();
        publisher.abort();
        let r = wait_crypto_ready(&mut rx, &abort).await;
        assert!(matches!(r, Err(StreamAttemptError::Aborted)));
    }

    #[tokio::test]
    async fn crypto_wait_observes_publisher_drop() {
        let (publisher, job) = ServiceEndpointJob::new();
        let (mut rx, abort) = job.into_parts();
        drop(publisher);
        let r = wait_crypto_ready(&mut rx, &abort).await;
        assert!(matches!(r, Err(StreamAttemptError::Aborted)));
    }

    #[tokio::test]
    async fn crypto_wait_wakes_on_ready() {
        let (publisher, job) = ServiceEndpointJob::new();
        let (mut rx, abort) = job.into_parts();
        let wait = tokio::spawn(async move { wait_crypto_ready(&mut rx, &abort).await });
        tokio::task::yield_now().await;
        publisher.set_crypto_ready();
        assert!(wait.await.unwrap().is_ok());
    }
}
