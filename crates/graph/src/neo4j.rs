//! Neo4j over the HTTP transactional endpoint (`/db/{db}/tx/commit`).

use std::time::Duration;

use async_trait::async_trait;
use atomspace_core::config::Neo4jConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{GraphBackend, Row, Statement};
use crate::error::GraphError;

pub struct Neo4jHttpBackend {
    client: reqwest::Client,
    base_url: String,
    database: String,
    username: String,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

impl Neo4jHttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| GraphError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            username: username.into(),
            password,
        })
    }

    pub fn from_config(config: &Neo4jConfig) -> Result<Self, GraphError> {
        Self::new(
            config.url(),
            config.database.clone(),
            config.username.clone(),
            config.password.clone(),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.base_url, self.database)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.username, self.password.as_deref())
    }
}

/// Map a status code outside the 2xx range to an error.
fn status_error(status: reqwest::StatusCode, body: String) -> GraphError {
    match status.as_u16() {
        401 | 403 => GraphError::Auth(body),
        502..=504 => GraphError::Unavailable(format!("{status}: {body}")),
        _ => GraphError::Http(format!("{status}: {body}")),
    }
}

fn classify_tx_error(err: TxError) -> GraphError {
    if err.code.contains("DatabaseUnavailable") || err.code.starts_with("Neo.TransientError") {
        GraphError::Unavailable(format!("{}: {}", err.code, err.message))
    } else if err.code.starts_with("Neo.ClientError.Security") {
        GraphError::Auth(err.message)
    } else {
        GraphError::Query {
            code: err.code,
            message: err.message,
        }
    }
}

fn rows_from(result: TxResult) -> Vec<Row> {
    result
        .data
        .into_iter()
        .map(|r| result.columns.iter().cloned().zip(r.row).collect())
        .collect()
}

#[async_trait]
impl GraphBackend for Neo4jHttpBackend {
    async fn connect(&self) -> Result<(), GraphError> {
        let response = self.authed(self.client.get(&self.base_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        debug!(url = %self.base_url, "neo4j endpoint reachable");
        Ok(())
    }

    async fn probe(&self) -> Result<(), GraphError> {
        self.run(&Statement::new("RETURN 1 AS ok")).await.map(|_| ())
    }

    async fn run(&self, statement: &Statement) -> Result<Vec<Row>, GraphError> {
        let body = json!({ "statements": [statement] });
        let response = self
            .authed(self.client.post(self.commit_url()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let tx: TxResponse = response.json().await?;
        if let Some(err) = tx.errors.into_iter().next() {
            return Err(classify_tx_error(err));
        }
        Ok(tx.results.into_iter().next().map(rows_from).unwrap_or_default())
    }
}
