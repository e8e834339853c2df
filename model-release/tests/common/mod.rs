//! In-process stand-in for the Databricks workspace and the Azure ML
//! endpoints, served with axum on an ephemeral port.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine};
use model_release::artifact::ArtifactName;
use model_release::config::{ReleaseConfig, WorkspaceConfig};
use model_release::databricks::DatabricksClient;
use model_release::registry::{AzureMlRegistry, TokenSource};
use model_release::release::JobOrchestrator;
use secrecy::Secret;
use serde_json::{json, Value};

/// Knobs and call log of the mock services.
pub struct Mock {
    pub fail_create: bool,
    pub fail_run_now: bool,
    pub fail_dbfs: bool,
    /// Number of RUNNING answers before the run terminates; `None` never terminates
    pub running_polls: Option<u32>,
    pub result_state: &'static str,
    pub archive: Vec<u8>,

    pub created_jobs: Vec<Value>,
    pub run_now_calls: u32,
    pub status_polls: u32,
    pub dbfs_paths: Vec<String>,
    pub uploads: Vec<String>,
    pub registrations: Vec<Value>,
}

impl Default for Mock {
    fn default() -> Self {
        Self {
            fail_create: false,
            fail_run_now: false,
            fail_dbfs: false,
            running_polls: Some(2),
            result_state: "SUCCESS",
            archive: zip_bytes(&[
                ("metadata/part-00000", b"{\"class\":\"PipelineModel\"}"),
                ("stages/0_lr/data/part-00000.parquet", b"PAR1"),
            ]),
            created_jobs: Vec::new(),
            run_now_calls: 0,
            status_polls: 0,
            dbfs_paths: Vec::new(),
            uploads: Vec::new(),
            registrations: Vec::new(),
        }
    }
}

pub type Shared = Arc<Mutex<Mock>>;

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn service_error(error_code: &str, message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error_code": error_code, "message": message})),
    )
}

async fn create_job(State(mock): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut mock = mock.lock().unwrap();
    mock.created_jobs.push(body);
    if mock.fail_create {
        return service_error("INVALID_PARAMETER_VALUE", "Node type Standard_D3_v2 is not supported");
    }
    (StatusCode::OK, Json(json!({"job_id": 42})))
}

async fn run_now(State(mock): State<Shared>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut mock = mock.lock().unwrap();
    mock.run_now_calls += 1;
    if mock.fail_run_now {
        return service_error("RESOURCE_DOES_NOT_EXIST", "Job 42 does not exist.");
    }
    assert_eq!(body["job_id"], 42);
    (StatusCode::OK, Json(json!({"run_id": 7, "number_in_job": 1})))
}

async fn runs_get(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    assert_eq!(query["run_id"], "7");
    mock.status_polls += 1;
    let state = match mock.running_polls {
        Some(running) if mock.status_polls > running => json!({
            "life_cycle_state": "TERMINATED",
            "result_state": mock.result_state,
            "state_message": ""
        }),
        _ => json!({"life_cycle_state": "RUNNING", "state_message": "In run"}),
    };
    Json(json!({"job_id": 42, "run_id": 7, "state": state}))
}

async fn dbfs_read(
    State(mock): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut mock = mock.lock().unwrap();
    mock.dbfs_paths.push(query["path"].clone());
    if mock.fail_dbfs {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error_code": "RESOURCE_DOES_NOT_EXIST",
                "message": format!("No file or directory exists on path {}.", query["path"])
            })),
        );
    }
    let offset: usize = query["offset"].parse().unwrap();
    let data = mock.archive.get(offset..).unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({"bytes_read": data.len(), "data": STANDARD.encode(data)})),
    )
}

async fn record_upload(State(mock): State<Shared>, uri: Uri) -> StatusCode {
    mock.lock().unwrap().uploads.push(uri.path().to_string());
    StatusCode::OK
}

async fn register(State(mock): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut mock = mock.lock().unwrap();
    mock.registrations.push(body.clone());
    Json(json!({
        "id": "databricksmodel.mml:1",
        "name": body["name"],
        "version": 1,
        "description": body["description"]
    }))
}

pub async fn serve(mock: Shared) -> String {
    let app = Router::new()
        .route("/api/2.0/jobs/create", post(create_job))
        .route("/api/2.0/jobs/run-now", post(run_now))
        .route("/api/2.0/jobs/runs/get", get(runs_get))
        .route("/api/2.0/dbfs/read", get(dbfs_read))
        .route(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.MachineLearningServices/workspaces/ws",
            get(|| async { Json(json!({"name": "ws", "location": "westeurope"})) }),
        )
        .route("/history/v1.0/*rest", patch(|| async { StatusCode::OK }))
        .route("/artifact/v2.0/*rest", put(record_upload))
        .route("/modelmanagement/v1.0/*rest", post(register))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

pub fn release_config(base: &str, dir: &Path) -> ReleaseConfig {
    let mut config = ReleaseConfig::new(WorkspaceConfig {
        subscription_id: "sub".to_string(),
        resource_group: "rg".to_string(),
        workspace_name: "ws".to_string(),
    });
    config.databricks.host = base.to_string();
    config.registry.arm_endpoint = base.to_string();
    config.registry.service_endpoint = base.to_string();
    config.polling.interval_secs = 0;
    config.output.deploy_dir = dir.join("deploy");
    config.output.metadata_path = dir.join("conf").join("model.json");
    config
}

pub fn orchestrator(
    config: ReleaseConfig,
    artifact: ArtifactName,
) -> JobOrchestrator<AzureMlRegistry> {
    let databricks =
        DatabricksClient::new(config.databricks.host.clone(), Secret::new("dapi-test".to_string()))
            .unwrap();
    let registry = AzureMlRegistry::new(
        &config.workspace,
        &config.registry,
        TokenSource::Static(Secret::new("aml-token".to_string())),
    )
    .unwrap();
    JobOrchestrator::new(config, databricks, registry, artifact)
}
