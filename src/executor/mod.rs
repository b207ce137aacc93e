//! Query Executor
//!
//! Runs a generated query against the graph store through the session
//! pool and turns every outcome into an `ExecutionResult`. Nothing here
//! returns `Err`: failures are data for the repair loop.
//!
//! Before anything reaches the store, the query must pass two local
//! checks: the read-only guard (`UnsafeQuery`, never retried) and, when
//! enabled, the static schema check (`SchemaViolation`).

pub mod safety;

use crate::config::ExecutorConfig;
use crate::nlq::GeneratedQuery;
use crate::schema::{SchemaRegistry, SchemaValidator};
use crate::store::{Params, Row, SessionPool, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Classification of an execution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed query text
    Syntax,
    /// Unknown label, relationship type or property
    SchemaViolation,
    /// Contains a write operation; never sent to the store
    UnsafeQuery,
    Timeout,
    /// Store unreachable, rejected credentials, or no free session
    Connection,
    /// Any other store-side failure while running the query
    Runtime,
}

impl ErrorKind {
    /// Whether a corrected query could plausibly succeed
    pub fn is_repairable(&self) -> bool {
        !matches!(self, ErrorKind::UnsafeQuery | ErrorKind::Connection)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::SchemaViolation => "SchemaViolationError",
            ErrorKind::UnsafeQuery => "UnsafeQueryError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Runtime => "RuntimeError",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ExecutionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Syntax(m) => ExecutionError::new(ErrorKind::Syntax, m),
            StoreError::Schema(m) => ExecutionError::new(ErrorKind::SchemaViolation, m),
            StoreError::Timeout(m) => ExecutionError::new(ErrorKind::Timeout, m),
            StoreError::Connection(m) => ExecutionError::new(ErrorKind::Connection, m),
            StoreError::Other(m) => ExecutionError::new(ErrorKind::Runtime, m),
        }
    }
}

/// Outcome of running one query
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Rows in store order; `truncated` when the row cap cut the result
    Success { rows: Vec<Row>, truncated: bool },
    Failure(ExecutionError),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            ExecutionResult::Success { rows, .. } => Some(rows),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionResult::Failure(e) => Some(e),
            ExecutionResult::Success { .. } => None,
        }
    }
}

pub struct QueryExecutor {
    pool: SessionPool,
    validator: Option<SchemaValidator>,
    timeout: Duration,
    row_cap: usize,
}

impl QueryExecutor {
    pub fn new(pool: SessionPool, schema: &SchemaRegistry, config: &ExecutorConfig) -> Self {
        Self {
            pool,
            validator: config.validate_schema.then(|| schema.validator()),
            timeout: config.timeout(),
            row_cap: config.row_cap,
        }
    }

    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Check a query without running it
    pub fn precheck(&self, query: &str) -> Result<(), ExecutionError> {
        if let Some(op) = safety::find_write_operation(query) {
            return Err(ExecutionError::new(
                ErrorKind::UnsafeQuery,
                format!("query contains write operation {}", op),
            ));
        }
        if let Some(validator) = &self.validator {
            validator.validate(query).map_err(|violations| {
                let message = violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                ExecutionError::new(ErrorKind::SchemaViolation, message)
            })?;
        }
        Ok(())
    }

    /// Run the query text verbatim, bounded by the timeout and row cap
    pub async fn execute(&self, query: &GeneratedQuery) -> ExecutionResult {
        if let Err(e) = self.precheck(&query.text) {
            warn!("Rejected query (attempt {}): {}", query.attempt, e);
            return ExecutionResult::Failure(e);
        }

        debug!("Executing query (attempt {}):\n{}", query.attempt, query.text);
        match self.pool.run(&query.text, &Params::new(), self.timeout).await {
            Ok(mut rows) => {
                let truncated = rows.len() > self.row_cap;
                if truncated {
                    info!("Result capped at {} of {} rows", self.row_cap, rows.len());
                    rows.truncate(self.row_cap);
                }
                info!("Query returned {} rows (attempt {})", rows.len(), query.attempt);
                ExecutionResult::Success { rows, truncated }
            }
            Err(e) => {
                let error = ExecutionError::from(e);
                warn!("Query failed (attempt {}): {}", query.attempt, error);
                ExecutionResult::Failure(error)
            }
        }
    }
}
