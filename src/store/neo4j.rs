//! Neo4j HTTP adapter
//!
//! Talks to the transactional Cypher endpoint (`/db/{database}/tx/commit`).

use crate::config::GraphConfig;
use crate::store::{GraphStore, Params, Row, StoreError, StoreResult, Value};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Graph store backed by a Neo4j server over HTTP
pub struct Neo4jHttpStore {
    client: Client,
    commit_url: String,
    username: String,
    password: Option<String>,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

impl Neo4jHttpStore {
    pub fn new(config: &GraphConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            commit_url: format!(
                "{}/db/{}/tx/commit",
                config.url.trim_end_matches('/'),
                config.database
            ),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Map a Neo4j status code onto the store error classes
    fn classify(code: &str, message: String) -> StoreError {
        if code.ends_with("SyntaxError") {
            StoreError::Syntax(message)
        } else if code.contains(".Schema.")
            || code.ends_with("NotFound")
            || code.ends_with("TypeError")
            || code.ends_with("ArgumentError")
        {
            StoreError::Schema(message)
        } else if code.contains("TimedOut") || code.contains("Timeout") {
            StoreError::Timeout(message)
        } else if code.contains(".Security.") || code.contains("Unavailable") {
            StoreError::Connection(message)
        } else {
            StoreError::Other(format!("{}: {}", code, message))
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn run(&self, query: &str, params: &Params) -> StoreResult<Vec<Row>> {
        debug!("Sending Cypher to {}", self.commit_url);

        let resp = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.username, self.password.as_deref())
            .json(&CommitRequest {
                statements: vec![Statement {
                    statement: query,
                    parameters: params,
                }],
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout(e.to_string())
                } else {
                    StoreError::Connection(e.to_string())
                }
            })?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(StoreError::Connection(format!(
                    "authentication rejected ({})",
                    resp.status()
                )));
            }
            s => {
                let text = resp.text().await.unwrap_or_default();
                return Err(StoreError::Connection(format!("HTTP {}: {}", s, text)));
            }
        }

        let body: CommitResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Other(format!("malformed response: {}", e)))?;

        if let Some(err) = body.errors.into_iter().next() {
            return Err(Self::classify(&err.code, err.message));
        }

        let Some(result) = body.results.into_iter().next() else {
            return Ok(Vec::new());
        };

        let rows = result
            .data
            .into_iter()
            .map(|data| {
                result
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.row.into_iter().map(Value::from))
                    .collect::<Row>()
            })
            .collect();

        Ok(rows)
    }
}
