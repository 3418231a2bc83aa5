//! KV coordinator: drives client GET/PUT/DELETE/STAT against a replica set.
//!
//! The coordinator:
//! 1. Resolves a key to its replica set (via placement)
//! 2. Issues one replica call per endpoint, all in parallel
//! 3. Waits until the consistency tier's response count is met, the
//!    deadline passes, or the count becomes unreachable
//! 4. Reconciles read responses by version-vector comparison
//! 5. Stamps writes with the session's version vector for the key

use crate::placement::{Placement, ReplicaSet};
use crate::transport::{
    NodeStatus, ReplicaRequest, ReplicaResponse, Transport, TransportError, VersionedValue,
};
use crate::vclock::{Causality, VersionVector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tierkv_common::{ConflictPolicy, ConsistencyTier, Endpoint};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};

/// Result of a GET operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResult {
    pub value: String,
    /// Vector of the winning version.
    pub vector: VersionVector,
    /// Replica responses the decision was based on.
    pub responses: usize,
}

/// Result of a PUT or DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Vector the write was stamped with.
    pub vector: VersionVector,
    pub acks: usize,
}

/// One row of a [`StatReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStat {
    pub endpoint: Endpoint,
    pub status: NodeStatus,
    /// `None` when the replica did not answer.
    pub key_count: Option<u64>,
}

/// Best-effort cluster status, sorted by endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatReport {
    pub nodes: Vec<NodeStat>,
}

impl StatReport {
    pub fn reachable(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status != NodeStatus::Unreachable)
            .count()
    }
}

/// Per-session coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Identity stamped into version vectors on write.
    pub node_id: String,
    pub read_tier: ConsistencyTier,
    pub write_tier: ConsistencyTier,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Per-replica deadline for `connect` and `stat`.
    pub stat_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

impl CoordinatorConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            read_tier: ConsistencyTier::default(),
            write_tier: ConsistencyTier::default(),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            stat_timeout: Duration::from_secs(2),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("not connected")]
    NotConnected,
    #[error("no replicas configured")]
    NoReplicas,
    #[error("replica {endpoint}: {source}")]
    Transport {
        endpoint: Endpoint,
        #[source]
        source: TransportError,
    },
    #[error("{operation} timed out: needed {needed} responses, got {got}")]
    Timeout {
        operation: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("conflict on key '{key}': {} concurrent versions", .siblings.len())]
    Conflict {
        key: String,
        siblings: Vec<VersionedValue>,
    },
    #[error("key not found")]
    NotFound { key: String },
}

/// Lifecycle of one fanned-out operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    Dispatched,
    Waiting,
    Satisfied,
    TimedOut,
    Failed,
}

/// Client-side coordinator for one session.
///
/// Generic over `T: Transport` for testability: the CLI uses
/// `TcpTransport`; tests use in-memory transports.
pub struct Coordinator<T: Transport> {
    config: CoordinatorConfig,
    placement: Box<dyn Placement>,
    transport: Arc<T>,
    connected: AtomicBool,
    /// Local causality state, one vector per key written or read.
    clocks: Mutex<HashMap<String, VersionVector>>,
}

impl<T: Transport> std::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Coordinator<T> {
    pub fn new(
        config: CoordinatorConfig,
        placement: impl Placement,
        transport: Arc<T>,
    ) -> Self {
        Self {
            config,
            placement: Box::new(placement),
            transport,
            connected: AtomicBool::new(false),
            clocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn read_tier(&self) -> ConsistencyTier {
        self.config.read_tier
    }

    pub fn write_tier(&self) -> ConsistencyTier {
        self.config.write_tier
    }

    pub fn set_read_tier(&mut self, tier: ConsistencyTier) {
        self.config.read_tier = tier;
    }

    pub fn set_write_tier(&mut self, tier: ConsistencyTier) {
        self.config.write_tier = tier;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The session's current vector for `key` (empty if never touched).
    pub async fn local_vector(&self, key: &str) -> VersionVector {
        self.clocks
            .lock()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // CONNECT
    // -----------------------------------------------------------------------

    /// Ping every known replica. Succeeds if at least one answers and
    /// returns how many did.
    pub async fn connect(&self) -> Result<usize, CoordinatorError> {
        let replicas = self.placement.all_replicas();
        if replicas.is_empty() {
            return Err(CoordinatorError::NoReplicas);
        }

        let timeout = self.config.stat_timeout;
        let pings = replicas.iter().map(|endpoint| async move {
            let outcome =
                tokio::time::timeout(timeout, self.transport.invoke(endpoint, ReplicaRequest::Ping))
                    .await;
            let result = match outcome {
                Ok(Ok(ReplicaResponse::Pong)) => Ok(()),
                Ok(Ok(other)) => Err(TransportError::unexpected("ping", &other)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TransportError::Connection(format!(
                    "no reply within {:?}",
                    timeout
                ))),
            };
            (endpoint, result)
        });

        let mut reachable = 0usize;
        let mut last_error = None;
        for (endpoint, result) in futures::future::join_all(pings).await {
            match result {
                Ok(()) => reachable += 1,
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "replica unreachable");
                    last_error = Some((endpoint.clone(), e));
                }
            }
        }

        if reachable == 0 {
            return Err(match last_error {
                Some((endpoint, source)) => CoordinatorError::Transport { endpoint, source },
                None => CoordinatorError::NoReplicas,
            });
        }

        self.connected.store(true, Ordering::Release);
        tracing::info!(reachable, total = replicas.len(), "connected to replica set");
        Ok(reachable)
    }

    // -----------------------------------------------------------------------
    // GET
    // -----------------------------------------------------------------------

    /// GET a key. Fans out to the replica set, waits for the read tier's
    /// response count, and reconciles what came back.
    pub async fn get(&self, key: &str) -> Result<GetResult, CoordinatorError> {
        self.ensure_connected()?;
        tierkv_metrics::metrics().kv_gets.inc();
        let _timer = tierkv_metrics::start_kv_timer("get");

        let replicas = self.replicas_for(key)?;
        let needed = self.config.read_tier.required(replicas.len());
        let responses = self
            .fan_out(
                "get",
                &replicas,
                ReplicaRequest::Get {
                    key: key.to_string(),
                },
                needed,
                self.config.read_timeout,
                |response| match response {
                    ReplicaResponse::Value { versioned } => Ok(versioned),
                    other => Err(TransportError::unexpected("get", &other)),
                },
            )
            .await?;

        let count = responses.len();
        let versions: Vec<VersionedValue> =
            responses.into_iter().filter_map(|(_, v)| v).collect();
        let survivors = reconcile_versions(versions);

        // Observed versions become part of this session's history so the
        // next local write supersedes them.
        if !survivors.is_empty() {
            let mut clocks = self.clocks.lock().await;
            let local = clocks.entry(key.to_string()).or_default();
            for version in &survivors {
                local.merge(&version.vector);
            }
        }

        let winner = match resolve(key, survivors, self.config.conflict_policy) {
            Ok(winner) => winner,
            Err(e) => {
                if matches!(e, CoordinatorError::Conflict { .. }) {
                    tierkv_metrics::metrics().kv_conflicts.inc();
                }
                return Err(e);
            }
        };
        if winner.tombstone {
            return Err(CoordinatorError::NotFound {
                key: key.to_string(),
            });
        }

        Ok(GetResult {
            value: winner.value,
            vector: winner.vector,
            responses: count,
        })
    }

    // -----------------------------------------------------------------------
    // PUT / DELETE
    // -----------------------------------------------------------------------

    /// PUT a value. Advances the key's vector, then waits for the write
    /// tier's ack count.
    pub async fn put(
        &self,
        key: &str,
        value: impl Into<String>,
    ) -> Result<WriteAck, CoordinatorError> {
        self.ensure_connected()?;
        tierkv_metrics::metrics().kv_puts.inc();
        let _timer = tierkv_metrics::start_kv_timer("put");

        let replicas = self.replicas_for(key)?;
        let vector = self.advance_clock(key).await;
        self.write("put", key, &replicas, VersionedValue::live(value, vector))
            .await
    }

    /// DELETE a key (writes a tombstone under an advanced vector).
    pub async fn delete(&self, key: &str) -> Result<WriteAck, CoordinatorError> {
        self.ensure_connected()?;
        tierkv_metrics::metrics().kv_deletes.inc();
        let _timer = tierkv_metrics::start_kv_timer("delete");

        let replicas = self.replicas_for(key)?;
        let vector = self.advance_clock(key).await;
        self.write("delete", key, &replicas, VersionedValue::tombstone(vector))
            .await
    }

    // -----------------------------------------------------------------------
    // STAT
    // -----------------------------------------------------------------------

    /// Query every known replica for status and key count. Replicas that do
    /// not answer are listed as unreachable.
    pub async fn stat(&self) -> Result<StatReport, CoordinatorError> {
        self.ensure_connected()?;
        tierkv_metrics::metrics().kv_stats.inc();
        let _timer = tierkv_metrics::start_kv_timer("stat");

        let replicas = self.placement.all_replicas();
        let timeout = self.config.stat_timeout;
        let queries = replicas.iter().map(|endpoint| async move {
            let outcome =
                tokio::time::timeout(timeout, self.transport.invoke(endpoint, ReplicaRequest::Stat))
                    .await;
            match outcome {
                Ok(Ok(ReplicaResponse::Stat { status, key_count })) => NodeStat {
                    endpoint: endpoint.clone(),
                    status,
                    key_count: Some(key_count),
                },
                other => {
                    match other {
                        Ok(Ok(response)) => tracing::warn!(
                            %endpoint,
                            error = %TransportError::unexpected("stat", &response),
                            "stat failed"
                        ),
                        Ok(Err(e)) => tracing::warn!(%endpoint, error = %e, "stat failed"),
                        Err(_) => tracing::warn!(%endpoint, ?timeout, "stat timed out"),
                    }
                    NodeStat {
                        endpoint: endpoint.clone(),
                        status: NodeStatus::Unreachable,
                        key_count: None,
                    }
                }
            }
        });

        let mut nodes = futures::future::join_all(queries).await;
        nodes.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Ok(StatReport { nodes })
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), CoordinatorError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CoordinatorError::NotConnected)
        }
    }

    fn replicas_for(&self, key: &str) -> Result<ReplicaSet, CoordinatorError> {
        let replicas = self.placement.replica_set(key);
        if replicas.is_empty() {
            return Err(CoordinatorError::NoReplicas);
        }
        Ok(replicas)
    }

    /// Bump this session's counter for `key` and return the new vector.
    async fn advance_clock(&self, key: &str) -> VersionVector {
        let mut clocks = self.clocks.lock().await;
        let vector = clocks.entry(key.to_string()).or_default();
        vector.update(&self.config.node_id);
        vector.clone()
    }

    async fn write(
        &self,
        operation: &'static str,
        key: &str,
        replicas: &ReplicaSet,
        versioned: VersionedValue,
    ) -> Result<WriteAck, CoordinatorError> {
        let needed = self.config.write_tier.required(replicas.len());
        let vector = versioned.vector.clone();
        let request = ReplicaRequest::Put {
            key: key.to_string(),
            versioned,
            write_id: uuid::Uuid::new_v4().to_string(),
        };

        let acks = self
            .fan_out(
                operation,
                replicas,
                request,
                needed,
                self.config.write_timeout,
                |response| match response {
                    ReplicaResponse::Ack => Ok(()),
                    other => Err(TransportError::unexpected(operation, &other)),
                },
            )
            .await?;

        tracing::debug!(operation, key, vector = %vector, acks = acks.len(), "write acknowledged");
        Ok(WriteAck {
            vector,
            acks: acks.len(),
        })
    }

    /// Send `request` to every replica concurrently and collect `needed`
    /// accepted responses.
    ///
    /// Returns as soon as `needed` responses are in; the remaining calls are
    /// aborted when the task set is dropped. Fails with `Timeout` at the
    /// deadline, or early with the last replica error once too many replicas
    /// have failed for `needed` to be reachable.
    async fn fan_out<R, F>(
        &self,
        operation: &'static str,
        replicas: &ReplicaSet,
        request: ReplicaRequest,
        needed: usize,
        timeout: Duration,
        accept: F,
    ) -> Result<Vec<(Endpoint, R)>, CoordinatorError>
    where
        R: Send,
        F: Fn(ReplicaResponse) -> Result<R, TransportError> + Send,
    {
        let deadline = Instant::now() + timeout;
        let mut calls = JoinSet::new();
        for endpoint in replicas {
            let transport = self.transport.clone();
            let endpoint = endpoint.clone();
            let request = request.clone();
            calls.spawn(async move {
                let result = transport.invoke(&endpoint, request).await;
                (endpoint, result)
            });
        }

        let mut tally = Tally::new(replicas.len(), needed);
        tracing::trace!(operation, phase = ?tally.phase(0), total = replicas.len(), needed);

        let mut accepted: Vec<(Endpoint, R)> = Vec::with_capacity(needed);
        while !matches!(
            tally.phase(accepted.len()),
            OperationPhase::Satisfied | OperationPhase::Failed
        ) {
            let joined = match tokio::time::timeout_at(deadline, calls.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    tierkv_metrics::metrics().kv_timeouts.inc();
                    tracing::debug!(
                        operation,
                        phase = ?OperationPhase::TimedOut,
                        needed,
                        got = accepted.len()
                    );
                    return Err(CoordinatorError::Timeout {
                        operation,
                        needed,
                        got: accepted.len(),
                    });
                }
            };

            match joined {
                Ok((endpoint, Ok(response))) => match accept(response) {
                    Ok(r) => accepted.push((endpoint, r)),
                    Err(e) => tally.record_failure(operation, endpoint, e),
                },
                Ok((endpoint, Err(e))) => tally.record_failure(operation, endpoint, e),
                Err(join_err) => {
                    tracing::warn!(operation, error = %join_err, "replica call task failed");
                    tally.failed += 1;
                }
            }
        }

        if tally.phase(accepted.len()) == OperationPhase::Satisfied {
            tracing::debug!(
                operation,
                phase = ?OperationPhase::Satisfied,
                needed,
                got = accepted.len()
            );
            return Ok(accepted);
        }

        tracing::debug!(
            operation,
            phase = ?OperationPhase::Failed,
            needed,
            got = accepted.len(),
            failed = tally.failed
        );
        Err(match tally.last_error {
            Some((endpoint, source)) => CoordinatorError::Transport { endpoint, source },
            None => CoordinatorError::Timeout {
                operation,
                needed,
                got: accepted.len(),
            },
        })
    }
}

/// Failure bookkeeping for one fan-out.
#[derive(Debug)]
struct Tally {
    total: usize,
    needed: usize,
    failed: usize,
    last_error: Option<(Endpoint, TransportError)>,
}

impl Tally {
    fn new(total: usize, needed: usize) -> Self {
        Self {
            total,
            needed,
            failed: 0,
            last_error: None,
        }
    }

    fn record_failure(&mut self, operation: &str, endpoint: Endpoint, error: TransportError) {
        tracing::warn!(operation, %endpoint, error = %error, "replica call failed");
        self.failed += 1;
        self.last_error = Some((endpoint, error));
    }

    /// Phase after `got` accepted responses. Never reports `TimedOut`; the
    /// deadline is tracked by the caller.
    fn phase(&self, got: usize) -> OperationPhase {
        if got >= self.needed {
            OperationPhase::Satisfied
        } else if self.total - self.failed < self.needed {
            OperationPhase::Failed
        } else if got == 0 && self.failed == 0 {
            OperationPhase::Dispatched
        } else {
            OperationPhase::Waiting
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Filter a set of versions down to the non-dominated ones.
///
/// Dominated versions are removed; equal vectors collapse to one copy;
/// concurrent versions (siblings) are all kept. The result does not depend
/// on input order.
pub fn reconcile_versions(versions: Vec<VersionedValue>) -> Vec<VersionedValue> {
    let mut result: Vec<VersionedValue> = Vec::new();

    'candidates: for candidate in versions {
        let mut to_remove = Vec::new();

        for (i, existing) in result.iter_mut().enumerate() {
            match candidate.vector.compare(&existing.vector) {
                Causality::Older => continue 'candidates,
                Causality::Equal => {
                    // Same history; keep one copy, chosen independently of order.
                    if sibling_order(&candidate, existing) == std::cmp::Ordering::Greater {
                        *existing = candidate;
                    }
                    continue 'candidates;
                }
                Causality::Newer => to_remove.push(i),
                Causality::Concurrent => {}
            }
        }

        for i in to_remove.into_iter().rev() {
            result.remove(i);
        }
        result.push(candidate);
    }

    result.sort_by(sibling_order);
    result
}

/// Pick the single version a read returns.
pub fn resolve(
    key: &str,
    mut survivors: Vec<VersionedValue>,
    policy: ConflictPolicy,
) -> Result<VersionedValue, CoordinatorError> {
    match (survivors.len(), policy) {
        (0, _) => Err(CoordinatorError::NotFound {
            key: key.to_string(),
        }),
        (1, _) => Ok(survivors.remove(0)),
        (_, ConflictPolicy::Surface) => Err(CoordinatorError::Conflict {
            key: key.to_string(),
            siblings: survivors,
        }),
        (_, ConflictPolicy::HighestNode) => survivors
            .into_iter()
            .max_by(highest_node_order)
            .ok_or_else(|| CoordinatorError::NotFound {
                key: key.to_string(),
            }),
    }
}

/// Total order used to keep reconciliation output deterministic.
fn sibling_order(a: &VersionedValue, b: &VersionedValue) -> std::cmp::Ordering {
    a.vector
        .render()
        .cmp(&b.vector.render())
        .then_with(|| a.tombstone.cmp(&b.tombstone))
        .then_with(|| a.value.cmp(&b.value))
}

/// Orders siblings by the highest node id each has seen, then that node's
/// counter, walking down through lower node ids on ties.
fn highest_node_order(a: &VersionedValue, b: &VersionedValue) -> std::cmp::Ordering {
    let key = |v: &VersionedValue| -> Vec<(String, u64)> {
        v.vector
            .entries()
            .rev()
            .map(|e| (e.node_id.clone(), e.counter))
            .collect()
    };
    key(a)
        .cmp(&key(b))
        .then_with(|| sibling_order(a, b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
