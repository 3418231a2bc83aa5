//! Key placement: which replicas hold a key.
//!
//! Placement itself (hash rings, membership) is decided outside the client;
//! the coordinator only consumes the resulting [`ReplicaSet`].

use tierkv_common::Endpoint;

/// Ordered, duplicate-free set of replica endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSet {
    endpoints: Vec<Endpoint>,
}

impl ReplicaSet {
    /// Build a set, keeping the first occurrence of each endpoint.
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut unique: Vec<Endpoint> = Vec::new();
        for endpoint in endpoints {
            if !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }
        Self { endpoints: unique }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }
}

impl<'a> IntoIterator for &'a ReplicaSet {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.iter()
    }
}

/// Source of replica sets.
pub trait Placement: Send + Sync + 'static {
    /// Replicas responsible for `key`.
    fn replica_set(&self, key: &str) -> ReplicaSet;

    /// Every replica known to the client (used by `connect` and `stat`).
    fn all_replicas(&self) -> ReplicaSet;
}

/// Every key lives on every configured replica.
#[derive(Debug, Clone)]
pub struct StaticPlacement {
    replicas: ReplicaSet,
}

impl StaticPlacement {
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            replicas: ReplicaSet::new(endpoints),
        }
    }
}

impl Placement for StaticPlacement {
    fn replica_set(&self, _key: &str) -> ReplicaSet {
        self.replicas.clone()
    }

    fn all_replicas(&self) -> ReplicaSet {
        self.replicas.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port)
    }

    #[test]
    fn test_replica_set_dedups_preserving_order() {
        let set = ReplicaSet::new(vec![ep(3), ep(1), ep(3), ep(2), ep(1)]);
        let ports: Vec<u16> = set.iter().map(|e| e.port()).collect();
        assert_eq!(ports, vec![3, 1, 2]);
    }

    #[test]
    fn test_static_placement_same_set_for_every_key() {
        let placement = StaticPlacement::new(vec![ep(1), ep(2), ep(3)]);
        assert_eq!(placement.replica_set("a"), placement.replica_set("b"));
        assert_eq!(placement.replica_set("a").len(), 3);
        assert_eq!(placement.all_replicas().len(), 3);
    }

    #[test]
    fn test_empty_placement() {
        let placement = StaticPlacement::new(Vec::new());
        assert!(placement.replica_set("k").is_empty());
    }
}
