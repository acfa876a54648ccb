//! Loader mapping config (`struct.json`): which input feeds which label.
//!
//! Only the fields the pipeline touches are typed; everything else is kept in
//! the `extra` maps so the file round-trips to the loader unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

type Extra = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl InputSource {
    pub fn is_file(&self) -> bool {
        self.kind.eq_ignore_ascii_case("file")
    }

    /// Basename of the referenced file, if this is a file input.
    pub fn file_name(&self) -> Option<String> {
        if !self.is_file() {
            return None;
        }
        let path = self.path.as_deref()?;
        Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMapping {
    pub label: String,
    pub input: InputSource,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructConfig {
    #[serde(default)]
    pub vertices: Vec<InputMapping>,
    #[serde(default)]
    pub edges: Vec<InputMapping>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl StructConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| SchemaError::Json {
            what: "config",
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.vertices.is_empty() && self.edges.is_empty() {
            return Err(SchemaError::EmptyLoaderConfig);
        }
        for (section, mappings) in [("vertices", &self.vertices), ("edges", &self.edges)] {
            if let Some(index) = mappings.iter().position(|m| m.label.trim().is_empty()) {
                return Err(SchemaError::UnlabeledMapping { section, index });
            }
        }
        Ok(())
    }

    /// Basenames of every file input, in declaration order.
    pub fn referenced_files(&self) -> Vec<String> {
        self.vertices
            .iter()
            .chain(&self.edges)
            .filter_map(|m| m.input.file_name())
            .collect()
    }

    /// Point each file input at its staged copy, matched by basename.
    /// Inputs without a staged counterpart keep their original path.
    pub fn with_staged_paths(&self, staged: &HashMap<String, PathBuf>) -> Self {
        let mut updated = self.clone();
        for mapping in updated.vertices.iter_mut().chain(updated.edges.iter_mut()) {
            if let Some(name) = mapping.input.file_name() {
                if let Some(path) = staged.get(&name) {
                    mapping.input.path = Some(path.to_string_lossy().into_owned());
                }
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "version": "2.0",
        "vertices": [
            {"label": "person", "input": {"type": "file", "path": "/client/data/people.csv",
             "format": "CSV", "header": ["name", "age"]}, "null_values": [""]}
        ],
        "edges": [
            {"label": "knows", "source": ["a"], "target": ["b"],
             "input": {"type": "file", "path": "knows.csv", "format": "CSV"}},
            {"label": "remote", "input": {"type": "hdfs", "path": "hdfs://x/y.csv"}}
        ]
    }"#;

    #[test]
    fn rewrites_file_paths_by_basename() {
        let config = StructConfig::from_json_str(CONFIG).unwrap();
        let staged = HashMap::from([
            ("people.csv".to_string(), PathBuf::from("/tmp/stage/people.csv")),
        ]);
        let updated = config.with_staged_paths(&staged);

        assert_eq!(updated.vertices[0].input.path.as_deref(), Some("/tmp/stage/people.csv"));
        // No staged copy: untouched.
        assert_eq!(updated.edges[0].input.path.as_deref(), Some("knows.csv"));
        // Non-file inputs are never rewritten.
        assert_eq!(updated.edges[1].input.path.as_deref(), Some("hdfs://x/y.csv"));
    }

    #[test]
    fn preserves_unknown_fields() {
        let config = StructConfig::from_json_str(CONFIG).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["version"], "2.0");
        assert_eq!(value["vertices"][0]["null_values"][0], "");
        assert_eq!(value["vertices"][0]["input"]["format"], "CSV");
        assert_eq!(value["edges"][0]["source"][0], "a");
    }

    #[test]
    fn lists_referenced_files() {
        let config = StructConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.referenced_files(), vec!["people.csv", "knows.csv"]);
    }

    #[test]
    fn rejects_empty_and_unlabeled_configs() {
        assert_eq!(
            StructConfig::from_json_str("{}").unwrap_err(),
            SchemaError::EmptyLoaderConfig
        );
        let err = StructConfig::from_json_str(
            r#"{"vertices": [{"label": " ", "input": {"type": "file", "path": "a.csv"}}]}"#,
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::UnlabeledMapping { section: "vertices", index: 0 });
    }
}
