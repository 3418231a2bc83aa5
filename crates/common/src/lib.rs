//! tierkv-common: shared types for the tierkv workspace.
//!
//! Provides the replica `Endpoint` address type and the two policy enums
//! (`ConsistencyTier`, `ConflictPolicy`) that the config, coordinator and
//! CLI crates all agree on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Address of one replica, `host:port`.
///
/// Ordering is host (lexicographic) first, then numeric port, which is the
/// order `stat` output is sorted in.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ParseError::Endpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(ParseError::Endpoint(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ParseError::Endpoint(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => Self::new(v4.ip().to_string(), v4.port()),
            std::net::SocketAddr::V6(v6) => Self::new(format!("[{}]", v6.ip()), v6.port()),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsistencyTier
// ---------------------------------------------------------------------------

/// How many replica responses an operation needs before it completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyTier {
    /// First response wins.
    #[serde(alias = "one")]
    One,
    /// Majority: ⌊N/2⌋ + 1.
    #[serde(alias = "quorum")]
    Quorum,
    /// Every replica in the set.
    #[default]
    #[serde(alias = "all")]
    All,
}

impl ConsistencyTier {
    /// Number of responses required from a replica set of size `n`.
    pub fn required(self, n: usize) -> usize {
        match self {
            ConsistencyTier::One => n.min(1),
            ConsistencyTier::Quorum => n / 2 + 1,
            ConsistencyTier::All => n,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyTier::One => "ONE",
            ConsistencyTier::Quorum => "QUORUM",
            ConsistencyTier::All => "ALL",
        }
    }
}

impl fmt::Display for ConsistencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyTier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONE" => Ok(ConsistencyTier::One),
            "QUORUM" => Ok(ConsistencyTier::Quorum),
            "ALL" => Ok(ConsistencyTier::All),
            _ => Err(ParseError::Tier(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictPolicy
// ---------------------------------------------------------------------------

/// What a QUORUM/ALL read does when replicas return concurrent versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail the read with a conflict carrying every sibling.
    #[default]
    Surface,
    /// Pick the sibling that has seen the highest node id.
    HighestNode,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Surface => f.write_str("surface"),
            ConflictPolicy::HighestNode => f.write_str("highest_node"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "surface" => Ok(ConflictPolicy::Surface),
            "highest_node" => Ok(ConflictPolicy::HighestNode),
            _ => Err(ParseError::Policy(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid endpoint '{0}', expected host:port")]
    Endpoint(String),

    #[error("invalid consistency level '{0}', expected ONE, QUORUM or ALL")]
    Tier(String),

    #[error("invalid conflict policy '{0}', expected surface or highest_node")]
    Policy(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
