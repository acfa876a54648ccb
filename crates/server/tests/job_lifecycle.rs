//! End-to-end job runs through the real HugeGraph loader adapter (driven by
//! a stand-in shell script) and the HTTP annotation notifier.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use atomspace_core::WriterType;
use atomspace_loader::HugeGraphLoader;
use atomspace_notify::HttpAnnotationNotifier;
use atomspace_server::history::JobHistoryStore;
use atomspace_server::pipeline::{JobPipeline, JobRequest, PipelineError, Stage};
use atomspace_server::sessions::UploadSessionStore;
use tempfile::TempDir;

/// Writes one atom file per run plus HugeGraph-style metadata.
const STAND_IN_LOADER: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2;;
    -w) writer="$2"; shift 2;;
    *) shift;;
  esac
done
mkdir -p "$out"
echo "(person alice)" > "$out/person.$writer"
cat > "$out/graph_metadata.json" <<JSON
{"totalVertices": {"num": 1}, "totalEdges": {"num": 0}, "verticesByLabel": {"person": {"num": 1}}, "edgesByLabel": {}}
JSON
"#;

const SCHEMA: &str = r#"{
    "property_keys": [{"name": "name", "type": "text"}],
    "vertex_labels": [{"name": "person", "properties": ["name"], "primary_keys": ["name"]}]
}"#;

const CONFIG: &str = r#"{
    "vertices": [{"label": "person", "input": {"type": "file", "path": "a.csv", "format": "CSV", "header": ["name"]}}]
}"#;

struct Service {
    root: TempDir,
    sessions: Arc<UploadSessionStore>,
    history: Arc<JobHistoryStore>,
}

impl Service {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("loader.sh"), STAND_IN_LOADER).unwrap();
        let output = root.path().join("output");
        let uploads = output.join("uploads");
        let sessions = Arc::new(UploadSessionStore::new(&uploads, Duration::from_secs(60)).unwrap());
        let history = Arc::new(JobHistoryStore::new(&output, &uploads).unwrap());
        Self { root, sessions, history }
    }

    fn pipeline(&self, annotation_url: Option<String>) -> JobPipeline {
        let loader = HugeGraphLoader::new(self.root.path().join("loader.sh"), "hugegraph", "localhost", 8080);
        let notifier = HttpAnnotationNotifier::new(annotation_url, Duration::from_secs(2)).unwrap();
        JobPipeline::new(
            self.sessions.clone(),
            self.history.clone(),
            Arc::new(loader),
            None,
            Arc::new(notifier),
        )
    }

    fn upload(&self) -> String {
        let session_id = self.sessions.create().unwrap();
        self.sessions
            .stage_file(&session_id, "a.csv", b"name\nalice\nbob\n")
            .unwrap();
        session_id
    }

    fn job_dir_count(&self) -> usize {
        std::fs::read_dir(self.history.output_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir() && e.file_name().to_str() != Some("uploads"))
            .count()
    }
}

/// A URL on which nothing is listening.
fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/annotation/load")
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn upload_and_submit_metta_job() {
    let service = Service::new();
    let pipeline = service.pipeline(None);
    let before = service.history.get().unwrap().history.len();

    let session_id = service.upload();
    let request = JobRequest::from_raw(&session_id, CONFIG, SCHEMA, "metta").unwrap();
    let outcome = pipeline.run(request).await.unwrap();

    assert_eq!(outcome.status, "success");
    assert!(!outcome.job_id.is_empty());
    assert_eq!(outcome.stage, Stage::Finalized);
    assert_eq!(outcome.output_files, vec!["graph_metadata.json", "person.metta"]);

    let history = service.history.get().unwrap();
    assert_eq!(history.history.len(), before + 1);
    assert_eq!(history.history[0].job_id, outcome.job_id);
    assert_eq!(history.history[0].writer_type, WriterType::Metta);
    assert_eq!(history.history[0].node_count, 1);
    assert_eq!(history.selected_job_id, outcome.job_id);

    let dir = service.history.job_dir(&outcome.job_id).unwrap();
    assert_eq!(read_json(&dir.join("job_metadata.json"))["writer_type"], "metta");
    assert_eq!(read_json(&dir.join("schema.json"))["vertex_labels"][0]["name"], "person");

    // The durable history file carries the documented shape.
    let raw = read_json(&service.history.output_dir().join("history.json"));
    let record = &raw["history"][0];
    for key in [
        "job_id", "writer_type", "node_count", "edge_count", "dataset_count", "data_size",
        "imported_on", "top_entities", "top_connections", "frequent_relationships", "schema",
    ] {
        assert!(record.get(key).is_some(), "history record missing {key}");
    }
    assert!(record["schema"]["nodes"].is_array());

    // The consumed session is gone and cannot feed another job.
    let again = JobRequest::from_raw(&session_id, CONFIG, SCHEMA, "metta").unwrap();
    assert!(matches!(pipeline.run(again).await, Err(PipelineError::Session(_))));
}

#[tokio::test]
async fn unreachable_annotation_service_rolls_back() {
    let service = Service::new();
    let first = service
        .pipeline(None)
        .run(JobRequest::from_raw(&service.upload(), CONFIG, SCHEMA, "metta").unwrap())
        .await
        .unwrap();

    let pipeline = service.pipeline(Some(refused_url()));
    let session_id = service.upload();
    let err = pipeline
        .run(JobRequest::from_raw(&session_id, CONFIG, SCHEMA, "mork").unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Notification { .. }), "{err}");
    assert_eq!(service.job_dir_count(), 1);
    assert_eq!(service.history.selected().as_deref(), Some(first.job_id.as_str()));
    assert_eq!(service.history.get().unwrap().history.len(), 1);
    assert!(service.sessions.require_active(&session_id).is_ok());
}
