//! Declarative graph schema and its conversion to the loader's Groovy form.
//!
//! A [`SchemaDefinition`] is a validated set of property keys, vertex labels
//! and edge labels. [`SchemaDefinition::to_groovy`] renders it through
//! [`SchemaStatement`] builders, one statement per declaration:
//!
//! ```text
//! schema.propertyKey("name").asText().ifNotExist().create();
//!
//! schema.vertexLabel("person").useCustomizeStringId().properties("name").primaryKeys("name").ifNotExist().create();
//!
//! schema.edgeLabel("knows").sourceLabel("person").targetLabel("person").ifNotExist().create();
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Property value types understood by the loader.
const SUPPORTED_TYPES: &[&str] = &[
    "text", "int", "long", "double", "float", "boolean", "date", "uuid", "blob", "byte",
];

pub type Options = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyKey {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

/// How vertex ids are assigned.
///
/// Strategies the loader schema has no call for (`customize_uuid`, ...)
/// parse as [`IdStrategy::Unrecognized`] and leave the id choice to the
/// loader's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    PrimaryKey,
    CustomizeNumber,
    CustomizeString,
    Automatic,
    #[serde(other)]
    Unrecognized,
}

impl IdStrategy {
    fn method(&self) -> Option<&'static str> {
        match self {
            // primary-key vertices are loaded with string ids derived from the key
            Self::PrimaryKey | Self::CustomizeString => Some("useCustomizeStringId"),
            Self::CustomizeNumber => Some("useCustomizeNumberId"),
            Self::Automatic => Some("useAutomaticId"),
            Self::Unrecognized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexLabel {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_strategy: Option<IdStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeLabel {
    pub name: String,
    pub source_label: String,
    pub target_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub property_keys: Vec<PropertyKey>,
    #[serde(default)]
    pub vertex_labels: Vec<VertexLabel>,
    #[serde(default)]
    pub edge_labels: Vec<EdgeLabel>,
}

impl SchemaDefinition {
    /// Parse and validate a schema submitted as JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(raw).map_err(|e| SchemaError::Json {
            what: "schema",
            message: e.to_string(),
        })?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check internal consistency: names, types, and cross references.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut keys = HashSet::new();
        for prop in &self.property_keys {
            if prop.name.trim().is_empty() {
                return Err(SchemaError::EmptyName("property_keys"));
            }
            if !keys.insert(prop.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "property key",
                    name: prop.name.clone(),
                });
            }
            if !SUPPORTED_TYPES.contains(&prop.data_type.to_ascii_lowercase().as_str()) {
                return Err(SchemaError::UnsupportedType {
                    name: prop.name.clone(),
                    data_type: prop.data_type.clone(),
                });
            }
        }

        if self.vertex_labels.is_empty() {
            return Err(SchemaError::NoVertexLabels);
        }

        let mut vertices = HashSet::new();
        for vertex in &self.vertex_labels {
            if vertex.name.trim().is_empty() {
                return Err(SchemaError::EmptyName("vertex_labels"));
            }
            if !vertices.insert(vertex.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "vertex label",
                    name: vertex.name.clone(),
                });
            }
            let nullable = vertex.nullable_keys.iter().flatten();
            for property in vertex.properties.iter().chain(nullable) {
                if !keys.contains(property.as_str()) {
                    return Err(SchemaError::UndeclaredProperty {
                        owner: "Vertex label",
                        label: vertex.name.clone(),
                        property: property.clone(),
                    });
                }
            }
            for key in vertex.primary_keys.iter().flatten() {
                if !vertex.properties.contains(key) {
                    return Err(SchemaError::PrimaryKeyNotProperty {
                        label: vertex.name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }

        let mut edges = HashSet::new();
        for edge in &self.edge_labels {
            if edge.name.trim().is_empty() {
                return Err(SchemaError::EmptyName("edge_labels"));
            }
            if !edges.insert(edge.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    kind: "edge label",
                    name: edge.name.clone(),
                });
            }
            for endpoint in [&edge.source_label, &edge.target_label] {
                if !vertices.contains(endpoint.as_str()) {
                    return Err(SchemaError::UndeclaredVertexLabel {
                        edge: edge.name.clone(),
                        vertex: endpoint.clone(),
                    });
                }
            }
            let sort_keys = edge.sort_keys.iter().flatten();
            for property in edge.properties.iter().flatten().chain(sort_keys) {
                if !keys.contains(property.as_str()) {
                    return Err(SchemaError::UndeclaredProperty {
                        owner: "Edge label",
                        label: edge.name.clone(),
                        property: property.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Render the schema as loader Groovy: property keys, vertex labels and
    /// edge labels, each section followed by a blank line separator.
    pub fn to_groovy(&self) -> String {
        let mut lines = Vec::new();

        for prop in &self.property_keys {
            let mut stmt = SchemaStatement::new("propertyKey", &prop.name)
                .call(format!("as{}", capitalize(&prop.data_type)), Vec::new());
            if let Some(ref cardinality) = prop.cardinality {
                stmt = stmt.call("cardinality", vec![GroovyArg::Str(cardinality.clone())]);
            }
            lines.push(stmt.options(prop.options.as_ref()).render());
        }
        lines.push(String::new());

        for vertex in &self.vertex_labels {
            let mut stmt = SchemaStatement::new("vertexLabel", &vertex.name);
            if let Some(method) = vertex.id_strategy.as_ref().and_then(IdStrategy::method) {
                stmt = stmt.call(method, Vec::new());
            }
            stmt = stmt
                .call_strs("properties", &vertex.properties)
                .call_strs("primaryKeys", vertex.primary_keys.as_deref().unwrap_or_default())
                .call_strs("nullableKeys", vertex.nullable_keys.as_deref().unwrap_or_default());
            lines.push(stmt.options(vertex.options.as_ref()).render());
        }
        lines.push(String::new());

        for edge in &self.edge_labels {
            let stmt = SchemaStatement::new("edgeLabel", &edge.name)
                .call("sourceLabel", vec![GroovyArg::Str(edge.source_label.clone())])
                .call("targetLabel", vec![GroovyArg::Str(edge.target_label.clone())])
                .call_strs("properties", edge.properties.as_deref().unwrap_or_default())
                .call_strs("sortKeys", edge.sort_keys.as_deref().unwrap_or_default());
            lines.push(stmt.options(edge.options.as_ref()).render());
        }

        lines.join("\n")
    }
}

// ── Groovy builder ────────────────────────────────────────────

/// A single argument of a chained Groovy call.
#[derive(Debug, Clone, PartialEq)]
pub enum GroovyArg {
    /// Rendered as a double-quoted, escaped string literal.
    Str(String),
    /// Rendered verbatim (numbers, booleans).
    Raw(String),
}

impl GroovyArg {
    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Str(s.clone()),
            other => Self::Raw(other.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Str(s) => quote(s),
            Self::Raw(r) => r.clone(),
        }
    }
}

/// One `schema.<kind>("<name>")...ifNotExist().create();` statement.
#[derive(Debug, Clone)]
pub struct SchemaStatement {
    kind: &'static str,
    name: String,
    calls: Vec<(String, Vec<GroovyArg>)>,
}

impl SchemaStatement {
    pub fn new(kind: &'static str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            calls: Vec::new(),
        }
    }

    pub fn call(mut self, method: impl Into<String>, args: Vec<GroovyArg>) -> Self {
        self.calls.push((method.into(), args));
        self
    }

    /// Append a call taking string arguments; skipped when `values` is empty.
    pub fn call_strs(self, method: &str, values: &[String]) -> Self {
        if values.is_empty() {
            return self;
        }
        let args = values.iter().cloned().map(GroovyArg::Str).collect();
        self.call(method, args)
    }

    fn options(mut self, options: Option<&Options>) -> Self {
        for (name, value) in options.into_iter().flatten() {
            self = self.call(name.clone(), vec![GroovyArg::from_json(value)]);
        }
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("schema.{}({})", self.kind, quote(&self.name));
        for (method, args) in &self.calls {
            let rendered: Vec<String> = args.iter().map(GroovyArg::render).collect();
            out.push_str(&format!(".{}({})", method, rendered.join(", ")));
        }
        out.push_str(".ifNotExist().create();");
        out
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// First character upper-cased, the rest lower-cased (`text` → `Text`).
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
