//! Aggregate statistics for a finished job.
//!
//! Counts come from the loader's own metadata file when present
//! (`graph_metadata.json` for the HugeGraph writers, `networkx_metadata.json`
//! for networkx), otherwise from the database sync result.

use std::collections::BTreeMap;
use std::path::Path;

use atomspace_core::{
    JobHistoryRecord, NamedCount, RelationshipCount, SchemaDefinition, SchemaProjection, WriterType,
};
use atomspace_graph::BulkLoadResult;
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::history::{
    ANNOTATION_SCHEMA_FILE, GRAPH_INFO_FILE, JOB_METADATA_FILE, NEO4J_RESULT_FILE, SCHEMA_FILE,
};

const GRAPH_METADATA_FILE: &str = "graph_metadata.json";
const NETWORKX_METADATA_FILE: &str = "networkx_metadata.json";

/// Files in a job directory that describe the job rather than hold data.
pub const METADATA_FILES: &[&str] = &[
    SCHEMA_FILE,
    JOB_METADATA_FILE,
    GRAPH_INFO_FILE,
    ANNOTATION_SCHEMA_FILE,
    NEO4J_RESULT_FILE,
    GRAPH_METADATA_FILE,
    NETWORKX_METADATA_FILE,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphCounts {
    pub total_vertices: u64,
    pub total_edges: u64,
    pub vertices_by_label: BTreeMap<String, u64>,
    pub edges_by_label: BTreeMap<String, u64>,
}

#[derive(Debug, Default, Deserialize)]
struct Num {
    #[serde(default)]
    num: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HugeGraphMetadata {
    #[serde(default)]
    total_vertices: Num,
    #[serde(default)]
    total_edges: Num,
    #[serde(default)]
    vertices_by_label: BTreeMap<String, Num>,
    #[serde(default)]
    edges_by_label: BTreeMap<String, Num>,
}

#[derive(Debug, Deserialize)]
struct NetworkxMetadata {
    #[serde(default)]
    node_count: u64,
    #[serde(default)]
    edge_count: u64,
    #[serde(default)]
    node_counters: BTreeMap<String, u64>,
    #[serde(default)]
    edge_counters: BTreeMap<String, u64>,
}

impl From<HugeGraphMetadata> for GraphCounts {
    fn from(m: HugeGraphMetadata) -> Self {
        Self {
            total_vertices: m.total_vertices.num,
            total_edges: m.total_edges.num,
            vertices_by_label: m.vertices_by_label.into_iter().map(|(k, v)| (k, v.num)).collect(),
            edges_by_label: m.edges_by_label.into_iter().map(|(k, v)| (k, v.num)).collect(),
        }
    }
}

impl From<NetworkxMetadata> for GraphCounts {
    fn from(m: NetworkxMetadata) -> Self {
        Self {
            total_vertices: m.node_count,
            total_edges: m.edge_count,
            vertices_by_label: m.node_counters,
            edges_by_label: m.edge_counters,
        }
    }
}

fn read_metadata<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unparseable loader metadata");
            None
        }
    }
}

/// Counts from the loader's metadata file, falling back to the sync result.
pub fn graph_counts(output_dir: &Path, sync: Option<&BulkLoadResult>) -> GraphCounts {
    if let Some(meta) = read_metadata::<HugeGraphMetadata>(&output_dir.join(GRAPH_METADATA_FILE)) {
        return meta.into();
    }
    if let Some(meta) = read_metadata::<NetworkxMetadata>(&output_dir.join(NETWORKX_METADATA_FILE)) {
        return meta.into();
    }
    match sync.filter(|s| s.is_success()) {
        Some(s) => GraphCounts {
            total_vertices: s.nodes_loaded,
            total_edges: s.edges_loaded,
            ..GraphCounts::default()
        },
        None => GraphCounts::default(),
    }
}

fn ranked(by_label: &BTreeMap<String, u64>) -> Vec<NamedCount> {
    let mut ranked: Vec<NamedCount> = by_label
        .iter()
        .map(|(name, &count)| NamedCount {
            name: name.clone(),
            count,
        })
        .collect();
    // BTreeMap order makes ties alphabetical.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

fn frequent_relationships(
    schema: &SchemaDefinition,
    edges_by_label: &BTreeMap<String, u64>,
) -> Vec<RelationshipCount> {
    let mut relationships: Vec<RelationshipCount> = schema
        .edge_labels
        .iter()
        .filter_map(|edge| {
            let count = edges_by_label.get(&edge.name).copied().unwrap_or(0);
            (count > 0).then(|| RelationshipCount {
                entities: [edge.source_label.clone(), edge.target_label.clone()],
                count,
            })
        })
        .collect();
    relationships.sort_by(|a, b| b.count.cmp(&a.count));
    relationships
}

/// Total size in bytes of the regular files under `dir`.
pub fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Decimal, human-readable size: `1 Byte`, `999 Bytes`, `1.0 kB`, `2.5 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["kB", "MB", "GB", "TB", "PB", "EB"];
    match bytes {
        1 => "1 Byte".to_string(),
        0..=999 => format!("{bytes} Bytes"),
        _ => {
            let mut value = bytes as f64 / 1000.0;
            let mut unit = 0;
            while value >= 1000.0 && unit < UNITS.len() - 1 {
                value /= 1000.0;
                unit += 1;
            }
            format!("{value:.1} {}", UNITS[unit])
        }
    }
}

/// Data files of a manifest, excluding job and loader metadata.
pub fn dataset_count(manifest: &[String]) -> u64 {
    manifest
        .iter()
        .filter(|name| !METADATA_FILES.contains(&name.as_str()))
        .count() as u64
}

pub fn compute_graph_info(
    job_id: &str,
    writer_type: WriterType,
    output_dir: &Path,
    schema: &SchemaDefinition,
    manifest: &[String],
    sync: Option<&BulkLoadResult>,
) -> JobHistoryRecord {
    let counts = graph_counts(output_dir, sync);
    JobHistoryRecord {
        job_id: job_id.to_string(),
        writer_type,
        node_count: counts.total_vertices,
        edge_count: counts.total_edges,
        dataset_count: dataset_count(manifest),
        data_size: human_size(dir_size(output_dir)),
        imported_on: Utc::now().to_rfc3339(),
        top_entities: ranked(&counts.vertices_by_label),
        top_connections: ranked(&counts.edges_by_label),
        frequent_relationships: frequent_relationships(schema, &counts.edges_by_label),
        schema: SchemaProjection::from_schema(schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomspace_graph::LoadStatus;
    use tempfile::TempDir;

    fn schema() -> SchemaDefinition {
        SchemaDefinition::from_json_str(
            r#"{
                "vertex_labels": [{"name": "gene"}, {"name": "protein"}],
                "edge_labels": [
                    {"name": "codes", "source_label": "gene", "target_label": "protein"},
                    {"name": "unused", "source_label": "gene", "target_label": "gene"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn human_size_uses_decimal_units() {
        assert_eq!(human_size(0), "0 Bytes");
        assert_eq!(human_size(1), "1 Byte");
        assert_eq!(human_size(999), "999 Bytes");
        assert_eq!(human_size(1000), "1.0 kB");
        assert_eq!(human_size(2_500_000), "2.5 MB");
        assert_eq!(human_size(3_000_000_000), "3.0 GB");
    }

    #[test]
    fn counts_from_hugegraph_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(GRAPH_METADATA_FILE),
            r#"{"totalVertices": {"num": 30}, "totalEdges": {"num": 12},
                "verticesByLabel": {"gene": {"num": 10}, "protein": {"num": 20}},
                "edgesByLabel": {"codes": {"num": 12}}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("gene.metta"), "x".repeat(1500)).unwrap();

        let manifest = vec![
            "gene.metta".to_string(),
            "protein.metta".to_string(),
            GRAPH_METADATA_FILE.to_string(),
        ];
        let info = compute_graph_info("job-1", WriterType::Metta, dir.path(), &schema(), &manifest, None);

        assert_eq!(info.node_count, 30);
        assert_eq!(info.edge_count, 12);
        assert_eq!(info.dataset_count, 2);
        assert_eq!(info.top_entities[0], NamedCount { name: "protein".into(), count: 20 });
        assert_eq!(info.top_connections.len(), 1);
        assert_eq!(info.frequent_relationships.len(), 1);
        assert_eq!(info.frequent_relationships[0].entities, ["gene".to_string(), "protein".to_string()]);
        assert!(info.data_size.ends_with("kB"));
        assert_eq!(info.schema.nodes.len(), 2);
    }

    #[test]
    fn counts_from_networkx_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(NETWORKX_METADATA_FILE),
            r#"{"node_count": 4, "edge_count": 3, "node_counters": {"gene": 4}, "edge_counters": {"codes": 3}}"#,
        )
        .unwrap();
        let counts = graph_counts(dir.path(), None);
        assert_eq!(counts.total_vertices, 4);
        assert_eq!(counts.edges_by_label["codes"], 3);
    }

    #[test]
    fn falls_back_to_successful_sync_result() {
        let dir = TempDir::new().unwrap();
        let sync = BulkLoadResult {
            status: LoadStatus::Success,
            job_id: Some("job-1".into()),
            nodes_loaded: 7,
            edges_loaded: 2,
            files_processed: vec![],
            message: None,
        };
        let counts = graph_counts(dir.path(), Some(&sync));
        assert_eq!((counts.total_vertices, counts.total_edges), (7, 2));

        let failed = BulkLoadResult::error("down");
        assert_eq!(graph_counts(dir.path(), Some(&failed)), GraphCounts::default());
    }
}
