//! TCP client implementing [`Transport`].
//!
//! `TcpTransport` dials a fresh connection per call, writes one request
//! line, and reads one response line. Calls never share a stream, so any
//! number of them may be in flight at once.

use crate::protocol::{read_message, write_message};
use tierkv_common::Endpoint;
use tierkv_kv::{ReplicaRequest, ReplicaResponse, Transport, TransportError};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Duration;

/// Line-delimited JSON over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn dial(&self, endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
        let connect = TcpStream::connect(endpoint.to_string());
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                // Small single-line writes; don't wait on Nagle.
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%endpoint, error = %e, "set_nodelay failed");
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(TransportError::Connection(format!(
                "connect to {} failed: {}",
                endpoint, e
            ))),
            Err(_) => Err(TransportError::Connection(format!(
                "connect to {} timed out after {:?}",
                endpoint, self.connect_timeout
            ))),
        }
    }

    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &ReplicaRequest,
    ) -> Result<ReplicaResponse, TransportError> {
        let stream = self.dial(endpoint).await?;
        let (reader, mut writer) = stream.into_split();

        write_message(&mut writer, request)
            .await
            .map_err(|e| TransportError::Connection(format!("send failed: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let response: Option<ReplicaResponse> = read_message(&mut reader)
            .await
            .map_err(|e| TransportError::Protocol(format!("bad reply: {}", e)))?;

        match response {
            Some(ReplicaResponse::Error { message }) => Err(TransportError::Remote(message)),
            Some(response) => Ok(response),
            None => Err(TransportError::Protocol(
                "connection closed before reply".into(),
            )),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn invoke(
        &self,
        endpoint: &Endpoint,
        request: ReplicaRequest,
    ) -> Result<ReplicaResponse, TransportError> {
        let rpc_type = request.operation_name();
        let m = tierkv_metrics::metrics();
        m.rpcs_sent_by_type.with_label_values(&[rpc_type]).inc();
        let _timer = tierkv_metrics::start_rpc_timer(rpc_type, "outbound");

        let result = self.call(endpoint, &request).await;
        if let Err(e) = &result {
            m.rpc_failures_by_type.with_label_values(&[rpc_type]).inc();
            tracing::debug!(%endpoint, rpc_type, error = %e, "replica call failed");
        }
        result
    }
}
