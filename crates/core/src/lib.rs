pub mod config;
pub mod error;
pub mod records;
pub mod schema;
pub mod struct_config;
pub mod writer;

pub use config::Config;
pub use error::*;
pub use records::*;
pub use schema::SchemaDefinition;
pub use struct_config::StructConfig;
pub use writer::WriterType;
