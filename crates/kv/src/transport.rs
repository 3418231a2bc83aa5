//! Abstraction over coordinator-to-replica calls.
//!
//! Concrete implementation lives in `tierkv-net::tcp`.

use crate::vclock::VersionVector;
use serde::{Deserialize, Serialize};
use std::fmt;
use tierkv_common::Endpoint;

/// A value together with the version vector it was written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: String,
    pub vector: VersionVector,
    #[serde(default)]
    pub tombstone: bool,
}

impl VersionedValue {
    pub fn live(value: impl Into<String>, vector: VersionVector) -> Self {
        Self {
            value: value.into(),
            vector,
            tombstone: false,
        }
    }

    pub fn tombstone(vector: VersionVector) -> Self {
        Self {
            value: String::new(),
            vector,
            tombstone: true,
        }
    }
}

/// Liveness of a replica as reported by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Alive,
    Suspect,
    Faulty,
    /// Set client-side when the replica did not answer.
    Unreachable,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Alive => "alive",
            NodeStatus::Suspect => "suspect",
            NodeStatus::Faulty => "faulty",
            NodeStatus::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

/// One call to a replica. The tag is the wire operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicaRequest {
    Ping,
    Get {
        key: String,
    },
    Put {
        key: String,
        versioned: VersionedValue,
        write_id: String,
    },
    Stat,
}

impl ReplicaRequest {
    pub fn operation_name(&self) -> &'static str {
        match self {
            ReplicaRequest::Ping => "ping",
            ReplicaRequest::Get { .. } => "get",
            ReplicaRequest::Put { versioned, .. } if versioned.tombstone => "delete",
            ReplicaRequest::Put { .. } => "put",
            ReplicaRequest::Stat => "stat",
        }
    }
}

/// A replica's answer to one [`ReplicaRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplicaResponse {
    Pong,
    Value { versioned: Option<VersionedValue> },
    Ack,
    Stat { status: NodeStatus, key_count: u64 },
    Error { message: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Dial or send failed; the replica never saw a complete request.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The reply was missing, malformed, or of the wrong kind.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The replica answered with an error.
    #[error("replica error: {0}")]
    Remote(String),
}

impl TransportError {
    pub fn is_connection(&self) -> bool {
        matches!(self, TransportError::Connection(_))
    }

    /// Error for a well-formed reply that does not answer the request sent.
    pub fn unexpected(operation: &str, response: &ReplicaResponse) -> Self {
        match response {
            ReplicaResponse::Error { message } => TransportError::Remote(message.clone()),
            other => TransportError::Protocol(format!(
                "unexpected reply to {}: {:?}",
                operation, other
            )),
        }
    }
}

/// Request/response channel to replicas.
///
/// Implementations must not share one duplex stream between concurrent
/// calls; `TcpTransport` dials a fresh connection per call.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: ReplicaRequest,
    ) -> Result<ReplicaResponse, TransportError>;
}
