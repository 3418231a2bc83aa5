//! Chaos injection wrapper for [`Transport`].
//!
//! [`ChaosTransport`] wraps any `T: Transport` and injects configurable
//! failures: random errors, refused endpoints, silent endpoints, and latency.

use crate::transport::{ReplicaRequest, ReplicaResponse, Transport, TransportError};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tierkv_common::Endpoint;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Configuration for transport chaos injection.
#[derive(Debug, Clone, Default)]
pub struct ChaosConfig {
    /// Probability of returning an error \[0.0, 1.0\].
    pub failure_rate: f64,
    /// Fixed latency injected before forwarding.
    pub latency: Duration,
    /// Random additional latency in \[0, jitter\].
    pub jitter: Duration,
}

/// A [`Transport`] wrapper that injects chaos.
pub struct ChaosTransport<T: Transport> {
    inner: Arc<T>,
    config: Arc<RwLock<ChaosConfig>>,
    /// Endpoints that refuse every call.
    failed: Arc<RwLock<HashSet<Endpoint>>>,
    /// Endpoints that accept calls and never answer.
    blackholed: Arc<RwLock<HashSet<Endpoint>>>,
}

impl<T: Transport> std::fmt::Debug for ChaosTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosTransport").finish_non_exhaustive()
    }
}

impl<T: Transport> ChaosTransport<T> {
    pub fn new(inner: T, config: ChaosConfig) -> Self {
        Self {
            inner: Arc::new(inner),
            config: Arc::new(RwLock::new(config)),
            failed: Arc::new(RwLock::new(HashSet::new())),
            blackholed: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Refuse every call to `endpoint` until recovered.
    pub async fn fail_node(&self, endpoint: Endpoint) {
        self.failed.write().await.insert(endpoint);
    }

    /// Let calls to `endpoint` hang forever until recovered.
    pub async fn blackhole_node(&self, endpoint: Endpoint) {
        self.blackholed.write().await.insert(endpoint);
    }

    /// Clear both fault kinds for `endpoint`.
    pub async fn recover_node(&self, endpoint: &Endpoint) {
        self.failed.write().await.remove(endpoint);
        self.blackholed.write().await.remove(endpoint);
    }

    /// Dynamically update the random failure rate.
    pub async fn set_failure_rate(&self, rate: f64) {
        self.config.write().await.failure_rate = rate;
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.config.write().await.latency = latency;
    }

    /// Apply chaos checks: returns Err if the call should fail.
    async fn maybe_fail(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        if self.failed.read().await.contains(endpoint) {
            return Err(TransportError::Connection(
                "chaos: endpoint marked as failed".into(),
            ));
        }

        let silent = self.blackholed.read().await.contains(endpoint);
        if silent {
            futures::future::pending::<()>().await;
        }

        let (delay, failure_rate) = {
            let config = self.config.read().await;
            let jitter_ms = if config.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..=config.jitter.as_millis() as u64)
            };
            (
                config.latency + Duration::from_millis(jitter_ms),
                config.failure_rate,
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if failure_rate > 0.0 && rand::thread_rng().gen_bool(failure_rate.min(1.0)) {
            return Err(TransportError::Connection("chaos: random failure".into()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for ChaosTransport<T> {
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: ReplicaRequest,
    ) -> Result<ReplicaResponse, TransportError> {
        self.maybe_fail(endpoint).await?;
        self.inner.invoke(endpoint, request).await
    }
}

// ────────────────────────── Tests ──────────────────────────
