//! Live graph database access.
//!
//! [`ConnectionManager`] supervises connectivity to a [`GraphBackend`] that
//! may come up after the process starts; [`Neo4jBulkLoader`] imports a job's
//! generated CSV + Cypher artifacts through it.

pub mod adapter;
pub mod backend;
pub mod bulk_load;
pub mod connection;
pub mod error;
pub mod neo4j;

pub use adapter::{BulkLoadResult, GraphDatabaseAdapter, LoadStatus};
pub use backend::{GraphBackend, Row, Statement};
pub use bulk_load::Neo4jBulkLoader;
pub use connection::{ConnectionHealth, ConnectionManager, ConnectionState, RetrySettings};
pub use error::GraphError;
pub use neo4j::Neo4jHttpBackend;
