//! In-memory replica server.
//!
//! Speaks the line-delimited JSON protocol in [`crate::protocol`]. Backs
//! integration tests and the `tierkv-replica` binary; it keeps one version
//! per key and answers STAT with its live key count.

use crate::protocol::{read_message, write_message};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tierkv_kv::{Causality, NodeStatus, ReplicaRequest, ReplicaResponse, VersionedValue};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Key → latest accepted version.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    entries: Arc<RwLock<HashMap<String, VersionedValue>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<VersionedValue> {
        self.entries.read().await.get(key).cloned()
    }

    /// Store `incoming` unless the current version already covers it.
    /// Returns whether the store changed.
    pub async fn put(&self, key: String, incoming: VersionedValue) -> bool {
        let mut entries = self.entries.write().await;
        if let Some(current) = entries.get(&key) {
            if matches!(
                incoming.vector.compare(&current.vector),
                Causality::Older | Causality::Equal
            ) {
                return false;
            }
        }
        entries.insert(key, incoming);
        true
    }

    /// Keys whose latest version is not a tombstone.
    pub async fn live_keys(&self) -> u64 {
        self.entries
            .read()
            .await
            .values()
            .filter(|v| !v.tombstone)
            .count() as u64
    }

    /// Answer one request against this store.
    pub async fn handle(&self, request: ReplicaRequest) -> ReplicaResponse {
        let rpc_type = request.operation_name();
        let m = tierkv_metrics::metrics();
        m.rpcs_received_by_type.with_label_values(&[rpc_type]).inc();
        let _timer = tierkv_metrics::start_rpc_timer(rpc_type, "inbound");

        match request {
            ReplicaRequest::Ping => ReplicaResponse::Pong,
            ReplicaRequest::Get { key } => ReplicaResponse::Value {
                versioned: self.get(&key).await,
            },
            ReplicaRequest::Put {
                key,
                versioned,
                write_id,
            } => {
                let applied = self.put(key.clone(), versioned).await;
                debug!(key = %key, write_id = %write_id, applied, "replica write");
                ReplicaResponse::Ack
            }
            ReplicaRequest::Stat => ReplicaResponse::Stat {
                status: NodeStatus::Alive,
                key_count: self.live_keys().await,
            },
        }
    }
}

/// Accept loop serving a [`MemStore`].
pub struct ReplicaServer {
    listener: TcpListener,
    store: MemStore,
}

impl ReplicaServer {
    pub fn new(listener: TcpListener) -> Self {
        Self::with_store(listener, MemStore::new())
    }

    pub fn with_store(listener: TcpListener, store: MemStore) -> Self {
        Self { listener, store }
    }

    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        Ok(Self::new(TcpListener::bind(addr).await?))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> &MemStore {
        &self.store
    }

    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let ReplicaServer { listener, store } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("replica shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => spawn_connection(stream, peer, store.clone()),
                    Err(err) => warn!(error = ?err, "failed to accept connection"),
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> std::io::Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn spawn_connection(stream: TcpStream, peer: SocketAddr, store: MemStore) {
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, store).await {
            warn!(%peer, error = ?err, "connection closed with error");
        }
    });
}

/// Serve requests on one connection until the peer hangs up.
async fn handle_connection(stream: TcpStream, store: MemStore) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request: ReplicaRequest = match read_message(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                let reply = ReplicaResponse::Error {
                    message: format!("malformed request: {}", err),
                };
                write_message(&mut writer, &reply).await?;
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let response = store.handle(request).await;
        write_message(&mut writer, &response).await?;
    }
}
