//! Graph store boundary
//!
//! The knowledge graph lives in an external store that speaks Cypher.
//! This module defines the typed row model the rest of the crate sees,
//! the `GraphStore` trait implemented by adapters, and a bounded session
//! pool that scopes every access.

pub mod neo4j;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

pub use neo4j::Neo4jHttpStore;

/// Errors reported by a graph store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Query text is not valid Cypher
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Query references an unknown label, relationship, property or procedure
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Query parameters, sent alongside the query text
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A single result row: column name -> value, in column order
pub type Row = IndexMap<String, Value>;

/// Values returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A Cypher-speaking graph store.
///
/// Implemented by:
/// - `Neo4jHttpStore`: Neo4j HTTP transactional endpoint
/// - in-process stubs in tests
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a query and return all rows
    async fn run(&self, query: &str, params: &Params) -> StoreResult<Vec<Row>>;
}

/// Bounded pool of store sessions.
///
/// Every access goes through `acquire`, which waits at most
/// `acquire_timeout` for a free slot. The returned `Session` holds its slot
/// until dropped, so the slot comes back on every exit path including
/// cancellation of the awaiting task.
#[derive(Clone)]
pub struct SessionPool {
    store: Arc<dyn GraphStore>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl SessionPool {
    pub fn new(store: Arc<dyn GraphStore>, size: usize, acquire_timeout: Duration) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(size)),
            acquire_timeout,
        }
    }

    /// Acquire a session, waiting at most the configured timeout
    pub async fn acquire(&self) -> StoreResult<Session> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                StoreError::Connection(format!(
                    "timed out after {:?} waiting for a graph session",
                    self.acquire_timeout
                ))
            })?
            .map_err(|_| StoreError::Connection("session pool is closed".to_string()))?;

        debug!("Acquired graph session ({} left)", self.permits.available_permits());
        Ok(Session {
            store: self.store.clone(),
            _permit: permit,
        })
    }

    /// Acquire a session, run one query under `limit`, release the session
    pub async fn run(&self, query: &str, params: &Params, limit: Duration) -> StoreResult<Vec<Row>> {
        let session = self.acquire().await?;
        session.run(query, params, limit).await
    }

    /// Number of free sessions
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out sessions; in-flight sessions finish normally
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

/// A scoped store session; its pool slot is released on drop
pub struct Session {
    store: Arc<dyn GraphStore>,
    _permit: OwnedSemaphorePermit,
}

impl Session {
    pub async fn run(&self, query: &str, params: &Params, limit: Duration) -> StoreResult<Vec<Row>> {
        tokio::time::timeout(limit, self.store.run(query, params))
            .await
            .map_err(|_| StoreError::Timeout(format!("query exceeded {:?}", limit)))?
    }
}
