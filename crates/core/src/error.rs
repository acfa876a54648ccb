use thiserror::Error;

/// Validation failures for declarative inputs (schema, loader config, writer type).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid JSON in {what}: {message}")]
    Json { what: &'static str, message: String },

    #[error("Unknown writer type '{0}': must be one of metta, neo4j, mork, networkx")]
    UnknownWriterType(String),

    #[error("Empty name in {0}")]
    EmptyName(&'static str),

    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("Property key '{name}' has unsupported type '{data_type}'")]
    UnsupportedType { name: String, data_type: String },

    #[error("{owner} '{label}' references undeclared property key '{property}'")]
    UndeclaredProperty {
        owner: &'static str,
        label: String,
        property: String,
    },

    #[error("Vertex label '{label}' primary key '{key}' is not one of its properties")]
    PrimaryKeyNotProperty { label: String, key: String },

    #[error("Edge label '{edge}' references undeclared vertex label '{vertex}'")]
    UndeclaredVertexLabel { edge: String, vertex: String },

    #[error("Schema declares no vertex labels")]
    NoVertexLabels,

    #[error("Loader config declares no vertex or edge mappings")]
    EmptyLoaderConfig,

    #[error("Loader mapping #{index} in {section} has no label")]
    UnlabeledMapping { section: &'static str, index: usize },
}
