//! Bulk-loader invocation.
//!
//! [`ExternalLoaderAdapter`] turns staged upload files plus a schema and a
//! mapping config into a directory of writer-specific artifacts.
//! [`HugeGraphLoader`] drives the HugeGraph loader CLI.

pub mod adapter;
pub mod error;
pub mod hugegraph;

pub use adapter::{ExternalLoaderAdapter, LoadRequest, LoaderOutput};
pub use error::LoaderError;
pub use hugegraph::HugeGraphLoader;
