use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GraphError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// A parameterised Cypher statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    #[serde(rename = "statement")]
    pub query: String,
    pub parameters: Map<String, Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// Transport to a graph database.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Establish (or re-establish) the underlying connection.
    async fn connect(&self) -> Result<(), GraphError>;

    /// Cheap round trip proving the database answers queries.
    async fn probe(&self) -> Result<(), GraphError>;

    async fn run(&self, statement: &Statement) -> Result<Vec<Row>, GraphError>;
}
