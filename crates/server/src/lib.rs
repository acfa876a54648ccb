//! Job orchestration for the knowledge-graph builder.
//!
//! Upload sessions feed [`pipeline::JobPipeline`], which runs the bulk loader,
//! syncs to the graph database, notifies the annotation service and records
//! the job in [`history::JobHistoryStore`].

pub mod background;
pub mod cli;
pub mod history;
pub mod pipeline;
pub mod sessions;
pub mod startup;
pub mod state;
pub mod stats;
