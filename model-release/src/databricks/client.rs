use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use super::models::{DbfsReadResponse, JobHandle, JobSpec, RunHandle, RunResponse, RunState};
use crate::error::Error;
use crate::poll::RunStatusSource;

// DBFS read refuses lengths above 1MB
const DBFS_READ_CHUNK: u64 = 1024 * 1024;

#[derive(Deserialize, Debug)]
struct ServiceError {
    error_code: String,
    message: String,
}

#[derive(Serialize)]
struct RunNowRequest {
    job_id: u64,
}

/// Pulls `error_code` and `message` out of a failed Databricks response.
/// Bodies that are not the documented error object are passed through as-is.
async fn service_error(response: Response) -> (String, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ServiceError>(&body) {
        Ok(err) => (err.error_code, err.message),
        Err(_) => (format!("HTTP {}", status.as_u16()), body),
    }
}

/// Client for the Databricks Jobs and DBFS REST APIs (version 2.0).
pub struct DatabricksClient {
    http: Client,
    host: String,
    token: Secret<String>,
}

impl DatabricksClient {
    pub fn new(host: impl Into<String>, token: Secret<String>) -> Result<Self, Error> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            host: host.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/{}", self.host, endpoint)
    }

    pub async fn create_job(&self, spec: &JobSpec) -> Result<JobHandle, Error> {
        let response = self
            .http
            .post(self.url("jobs/create"))
            .bearer_auth(self.token.expose_secret())
            .json(spec)
            .send()
            .await?;
        if !response.status().is_success() {
            let (error_code, message) = service_error(response).await;
            return Err(Error::JobCreate {
                error_code,
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn run_now(&self, job: &JobHandle) -> Result<RunHandle, Error> {
        let response = self
            .http
            .post(self.url("jobs/run-now"))
            .bearer_auth(self.token.expose_secret())
            .json(&RunNowRequest { job_id: job.job_id })
            .send()
            .await?;
        if !response.status().is_success() {
            let (error_code, message) = service_error(response).await;
            return Err(Error::JobStart {
                error_code,
                message,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn get_run_state(&self, run: &RunHandle) -> Result<RunState, Error> {
        let response = self
            .http
            .get(self.url("jobs/runs/get"))
            .bearer_auth(self.token.expose_secret())
            .query(&[("run_id", run.run_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            let (error_code, message) = service_error(response).await;
            return Err(Error::RunStatus {
                error_code,
                message,
            });
        }
        let run: RunResponse = response.json().await?;
        Ok(run.state)
    }

    /// Reads a whole DBFS file, following offsets until a short chunk comes back.
    pub async fn read_dbfs_file(&self, path: &str) -> Result<Vec<u8>, Error> {
        let mut contents = Vec::new();
        let mut offset = 0u64;
        loop {
            let response = self
                .http
                .get(self.url("dbfs/read"))
                .bearer_auth(self.token.expose_secret())
                .query(&[("path", path)])
                .query(&[("offset", offset), ("length", DBFS_READ_CHUNK)])
                .send()
                .await?;
            if !response.status().is_success() {
                let (error_code, message) = service_error(response).await;
                return Err(Error::ArtifactFetch {
                    error_code,
                    message,
                });
            }
            let chunk: DbfsReadResponse = response.json().await?;
            let decoded = STANDARD.decode(chunk.data.as_bytes())?;
            contents.extend_from_slice(&decoded);
            if chunk.bytes_read < DBFS_READ_CHUNK || decoded.is_empty() {
                break;
            }
            offset += chunk.bytes_read;
        }
        Ok(contents)
    }
}

impl RunStatusSource for DatabricksClient {
    async fn run_state(&self, run: &RunHandle) -> Result<RunState, Error> {
        self.get_run_state(run).await
    }
}
