//! Integration test: spin up several in-memory replicas over real TCP, then
//! drive GET/PUT/DELETE/STAT through the coordinator at each tier.

use std::net::SocketAddr;
use std::sync::Arc;
use tierkv_common::{ConsistencyTier, Endpoint};
use tierkv_kv::{Coordinator, CoordinatorConfig, CoordinatorError, NodeStatus, StaticPlacement};
use tierkv_net::{ReplicaServer, TcpTransport};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;

struct TestReplica {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestReplica {
    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

async fn spawn_replica() -> TestReplica {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = ReplicaServer::new(listener);
    let addr = server.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async move {
        let _ = rx.await;
    }));
    TestReplica {
        addr,
        shutdown: Some(tx),
        handle,
    }
}

async fn spawn_replicas(n: usize) -> Vec<TestReplica> {
    let mut replicas = Vec::with_capacity(n);
    for _ in 0..n {
        replicas.push(spawn_replica().await);
    }
    replicas
}

fn endpoints(replicas: &[TestReplica]) -> Vec<Endpoint> {
    replicas.iter().map(|r| Endpoint::from(r.addr)).collect()
}

fn client(
    node_id: &str,
    endpoints: Vec<Endpoint>,
    read: ConsistencyTier,
    write: ConsistencyTier,
) -> Coordinator<TcpTransport> {
    let config = CoordinatorConfig {
        read_tier: read,
        write_tier: write,
        read_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_secs(2),
        stat_timeout: Duration::from_secs(1),
        ..CoordinatorConfig::new(node_id)
    };
    Coordinator::new(
        config,
        StaticPlacement::new(endpoints),
        Arc::new(TcpTransport::new(Duration::from_millis(500))),
    )
}

#[tokio::test]
async fn test_put_get_across_replicas() {
    let replicas = spawn_replicas(3).await;
    let session = client(
        "client-a",
        endpoints(&replicas),
        ConsistencyTier::Quorum,
        ConsistencyTier::Quorum,
    );
    assert_eq!(session.connect().await.unwrap(), 3);

    let ack = session.put("hello", "world").await.unwrap();
    assert!(ack.acks >= 2);

    let got = session.get("hello").await.unwrap();
    assert_eq!(got.value, "world");
    assert_eq!(got.vector.get("client-a"), 1);
}

#[tokio::test]
async fn test_update_supersedes_across_sessions() {
    let replicas = spawn_replicas(3).await;
    let eps = endpoints(&replicas);
    let first = client("first", eps.clone(), ConsistencyTier::All, ConsistencyTier::All);
    let second = client("second", eps, ConsistencyTier::All, ConsistencyTier::All);
    first.connect().await.unwrap();
    second.connect().await.unwrap();

    first.put("counter", "1").await.unwrap();
    assert_eq!(second.get("counter").await.unwrap().value, "1");

    // second has seen first's write, so its update is strictly newer.
    second.put("counter", "2").await.unwrap();
    let got = first.get("counter").await.unwrap();
    assert_eq!(got.value, "2");
    assert_eq!(got.vector.get("first"), 1);
    assert_eq!(got.vector.get("second"), 1);
}

#[tokio::test]
async fn test_delete_over_tcp() {
    let replicas = spawn_replicas(2).await;
    let session = client(
        "client-a",
        endpoints(&replicas),
        ConsistencyTier::All,
        ConsistencyTier::All,
    );
    session.connect().await.unwrap();

    session.put("k", "v").await.unwrap();
    session.delete("k").await.unwrap();
    assert!(matches!(
        session.get("k").await,
        Err(CoordinatorError::NotFound { .. })
    ));

    let report = session.stat().await.unwrap();
    assert!(report.nodes.iter().all(|n| n.key_count == Some(0)));
}

#[tokio::test]
async fn test_stopped_replica_tiers() {
    let mut replicas = spawn_replicas(3).await;
    let eps = endpoints(&replicas);
    let mut session = client(
        "client-a",
        eps.clone(),
        ConsistencyTier::Quorum,
        ConsistencyTier::Quorum,
    );
    session.connect().await.unwrap();
    session.put("k", "v").await.unwrap();

    let stopped = replicas.remove(2);
    let stopped_endpoint = Endpoint::from(stopped.addr);
    stopped.stop().await;

    // QUORUM of 3 survives one refused replica.
    assert_eq!(session.get("k").await.unwrap().value, "v");
    session.put("k", "v2").await.unwrap();

    // ALL fails fast with the refused replica's error.
    session.set_write_tier(ConsistencyTier::All);
    match session.put("k", "v3").await {
        Err(CoordinatorError::Transport { endpoint, source }) => {
            assert_eq!(endpoint, stopped_endpoint);
            assert!(source.is_connection());
        }
        other => panic!("expected transport error, got {:?}", other),
    }

    let report = session.stat().await.unwrap();
    assert_eq!(report.nodes.len(), 3);
    assert_eq!(report.reachable(), 2);
    let down = report
        .nodes
        .iter()
        .find(|n| n.endpoint == stopped_endpoint)
        .unwrap();
    assert_eq!(down.status, NodeStatus::Unreachable);
    assert_eq!(down.key_count, None);
}

#[tokio::test]
async fn test_connect_fails_when_all_down() {
    let replicas = spawn_replicas(2).await;
    let eps = endpoints(&replicas);
    for replica in replicas {
        replica.stop().await;
    }

    let session = client("client-a", eps, ConsistencyTier::One, ConsistencyTier::One);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Transport { .. }));
    assert!(matches!(
        session.get("k").await,
        Err(CoordinatorError::NotConnected)
    ));
}

#[tokio::test]
async fn test_concurrent_sessions_many_keys() {
    let replicas = spawn_replicas(3).await;
    let eps = endpoints(&replicas);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let eps = eps.clone();
        tasks.push(tokio::spawn(async move {
            let session = client(
                &format!("client-{}", i),
                eps,
                ConsistencyTier::Quorum,
                ConsistencyTier::All,
            );
            session.connect().await.unwrap();
            for j in 0..5 {
                let key = format!("key-{}-{}", i, j);
                session.put(&key, format!("value-{}", j)).await.unwrap();
                assert_eq!(session.get(&key).await.unwrap().value, format!("value-{}", j));
            }
        }));
    }
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let observer = client("observer", eps, ConsistencyTier::One, ConsistencyTier::One);
    observer.connect().await.unwrap();
    let report = observer.stat().await.unwrap();
    assert!(report.nodes.iter().all(|n| n.key_count == Some(20)));
}
