use serde::{Deserialize, Serialize};

use crate::schema::SchemaDefinition;
use crate::writer::WriterType;

/// `{name, count}` pair used for entity and connection rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

/// A source/target label pair and how many edges connect them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCount {
    pub entities: [String; 2],
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNodeData {
    pub id: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaNode {
    pub data: SchemaNodeData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEdgeData {
    pub source: String,
    pub target: String,
    pub possible_connections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEdge {
    pub data: SchemaEdgeData,
}

/// Graph-view projection of a [`SchemaDefinition`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaProjection {
    pub nodes: Vec<SchemaNode>,
    pub edges: Vec<SchemaEdge>,
}

impl SchemaProjection {
    pub fn from_schema(schema: &SchemaDefinition) -> Self {
        let nodes = schema
            .vertex_labels
            .iter()
            .map(|v| SchemaNode {
                data: SchemaNodeData {
                    id: v.name.clone(),
                    properties: v.properties.clone(),
                },
            })
            .collect();
        let edges = schema
            .edge_labels
            .iter()
            .map(|e| SchemaEdge {
                data: SchemaEdgeData {
                    source: e.source_label.clone(),
                    target: e.target_label.clone(),
                    possible_connections: vec![e.name.clone()],
                },
            })
            .collect();
        Self { nodes, edges }
    }
}

/// Statistics of one finalized job, as stored in the history file and in the
/// job's own `graph_info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHistoryRecord {
    pub job_id: String,
    pub writer_type: WriterType,
    pub node_count: u64,
    pub edge_count: u64,
    pub dataset_count: u64,
    pub data_size: String,
    pub imported_on: String,
    pub top_entities: Vec<NamedCount>,
    pub top_connections: Vec<NamedCount>,
    pub frequent_relationships: Vec<RelationshipCount>,
    pub schema: SchemaProjection,
}

impl JobHistoryRecord {
    /// Placeholder returned by read APIs when no job resolves.
    pub fn empty() -> Self {
        Self {
            job_id: String::new(),
            writer_type: WriterType::Metta,
            node_count: 0,
            edge_count: 0,
            dataset_count: 0,
            data_size: "0 Bytes".to_string(),
            imported_on: String::new(),
            top_entities: Vec::new(),
            top_connections: Vec::new(),
            frequent_relationships: Vec::new(),
            schema: SchemaProjection::default(),
        }
    }
}

/// Durable history document: `{"selected_job_id": "...", "history": [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobHistory {
    #[serde(default)]
    pub selected_job_id: String,
    #[serde(default)]
    pub history: Vec<JobHistoryRecord>,
}

/// Per-job `job_metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: String,
    pub writer_type: WriterType,
    pub created_at: String,
}

// ── Annotation schema ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationInput {
    pub label: String,
    pub name: String,
    #[serde(rename = "inputType")]
    pub input_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationNode {
    pub id: String,
    pub name: String,
    pub category: String,
    pub inputs: Vec<AnnotationInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Form description consumed by the annotation service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationSchema {
    pub job_id: String,
    pub nodes: Vec<AnnotationNode>,
    pub edges: Vec<AnnotationEdge>,
}

impl AnnotationSchema {
    pub fn from_schema(schema: &SchemaDefinition, job_id: &str) -> Self {
        let nodes = schema
            .vertex_labels
            .iter()
            .map(|v| AnnotationNode {
                id: v.name.clone(),
                name: v.name.clone(),
                category: "entity".to_string(),
                inputs: v
                    .properties
                    .iter()
                    .map(|p| AnnotationInput {
                        label: p.clone(),
                        name: p.clone(),
                        input_type: "input".to_string(),
                    })
                    .collect(),
            })
            .collect();
        // Edge ids are 1-based positions.
        let edges = schema
            .edge_labels
            .iter()
            .enumerate()
            .map(|(i, e)| AnnotationEdge {
                id: (i + 1).to_string(),
                source: e.source_label.clone(),
                target: e.target_label.clone(),
                label: e.name.clone(),
            })
            .collect();
        Self {
            job_id: job_id.to_string(),
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::from_json_str(
            r#"{
                "property_keys": [{"name": "symbol", "type": "text"}],
                "vertex_labels": [{"name": "gene", "properties": ["symbol"]}, {"name": "protein"}],
                "edge_labels": [
                    {"name": "codes", "source_label": "gene", "target_label": "protein"},
                    {"name": "binds", "source_label": "protein", "target_label": "protein"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn annotation_schema_numbers_edges_from_one() {
        let annotation = AnnotationSchema::from_schema(&schema(), "job-1");
        assert_eq!(annotation.job_id, "job-1");
        assert_eq!(annotation.nodes.len(), 2);
        assert_eq!(annotation.nodes[0].inputs[0].name, "symbol");
        assert_eq!(annotation.edges[0].id, "1");
        assert_eq!(annotation.edges[1].id, "2");
        assert_eq!(annotation.edges[1].label, "binds");

        let value = serde_json::to_value(&annotation).unwrap();
        assert_eq!(value["nodes"][0]["inputs"][0]["inputType"], "input");
    }

    #[test]
    fn projection_wraps_entries_in_data() {
        let projection = SchemaProjection::from_schema(&schema());
        let value = serde_json::to_value(&projection).unwrap();
        assert_eq!(value["nodes"][0]["data"]["id"], "gene");
        assert_eq!(value["edges"][0]["data"]["possible_connections"][0], "codes");
    }

    #[test]
    fn history_defaults_to_empty_skeleton() {
        let history: JobHistory = serde_json::from_str("{}").unwrap();
        assert_eq!(history, JobHistory::default());
        assert!(history.selected_job_id.is_empty());
    }
}
