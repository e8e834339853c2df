use std::path::Path;

use chrono::Utc;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde_json::json;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{
    LoggingRun, ModelRegistration, ModelRegistry, RegisteredModel, TokenSource, WorkspaceDetails,
};
use crate::artifact::list_files;
use crate::config::{RegistryConfig, WorkspaceConfig};
use crate::error::Error;

const WORKSPACE_API_VERSION: &str = "2023-10-01";

async fn registry_error(response: Response) -> Error {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Error::RegistryError { status, message }
}

/// REST client for an Azure ML workspace: run history, run artifacts and
/// model management.
///
/// The bearer token is only requested on first use, so a release whose job
/// fails never touches the credential provider.
pub struct AzureMlRegistry {
    http: Client,
    arm_endpoint: String,
    service_endpoint: String,
    scope: String,
    tokens: TokenSource,
    token: OnceCell<Secret<String>>,
}

impl AzureMlRegistry {
    pub fn new(
        workspace: &WorkspaceConfig,
        config: &RegistryConfig,
        tokens: TokenSource,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: Client::builder().build()?,
            arm_endpoint: config.arm_endpoint.trim_end_matches('/').to_string(),
            service_endpoint: config.service_endpoint.trim_end_matches('/').to_string(),
            scope: format!(
                "subscriptions/{}/resourceGroups/{}/providers/Microsoft.MachineLearningServices/workspaces/{}",
                workspace.subscription_id, workspace.resource_group, workspace.workspace_name
            ),
            tokens,
            token: OnceCell::new(),
        })
    }

    async fn bearer(&self) -> Result<&str, Error> {
        let token = self
            .token
            .get_or_try_init(|| self.tokens.token())
            .await?;
        Ok(token.expose_secret())
    }

    fn run_url(&self, run: &LoggingRun) -> String {
        format!(
            "{}/history/v1.0/{}/experiments/{}/runs/{}",
            self.service_endpoint, self.scope, run.experiment, run.run_id
        )
    }

    fn artifact_url(&self, container: &str, name: &str) -> String {
        format!(
            "{}/artifact/v2.0/{}/artifacts/content/{}/{}",
            self.service_endpoint, self.scope, container, name
        )
    }

    async fn patch_run(&self, run: &LoggingRun, body: serde_json::Value) -> Result<(), Error> {
        let response = self
            .http
            .patch(self.run_url(run))
            .bearer_auth(self.bearer().await?)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(registry_error(response).await);
        }
        Ok(())
    }

    async fn put_artifact(&self, container: &str, name: &str, path: &Path) -> Result<(), Error> {
        let contents = tokio::fs::read(path).await.map_err(Error::FileError)?;
        log::debug!("uploading {} ({} bytes) to {container}", name, contents.len());
        let response = self
            .http
            .put(self.artifact_url(container, name))
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(contents)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(registry_error(response).await);
        }
        Ok(())
    }
}

fn run_container(run: &LoggingRun) -> String {
    format!("ExperimentRun/dcid.{}", run.run_id)
}

fn new_run_id(experiment: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", experiment, Utc::now().timestamp(), &suffix[..8])
}

impl ModelRegistry for AzureMlRegistry {
    async fn attach_workspace(&self) -> Result<WorkspaceDetails, Error> {
        let response = self
            .http
            .get(format!("{}/{}", self.arm_endpoint, self.scope))
            .bearer_auth(self.bearer().await?)
            .query(&[("api-version", WORKSPACE_API_VERSION)])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(Error::WorkspaceError { status, message });
        }
        Ok(response.json().await?)
    }

    async fn start_run(&self, experiment: &str) -> Result<LoggingRun, Error> {
        let run = LoggingRun {
            experiment: experiment.to_string(),
            run_id: new_run_id(experiment),
        };
        self.patch_run(
            &run,
            json!({
                "runId": run.run_id,
                "status": "Running",
                "startTimeUtc": Utc::now().to_rfc3339(),
            }),
        )
        .await?;
        Ok(run)
    }

    async fn upload_file(&self, run: &LoggingRun, name: &str, path: &Path) -> Result<(), Error> {
        self.put_artifact(&run_container(run), name, path).await
    }

    async fn complete_run(&self, run: &LoggingRun) -> Result<(), Error> {
        self.patch_run(
            run,
            json!({
                "runId": run.run_id,
                "status": "Completed",
                "endTimeUtc": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    async fn register_model(
        &self,
        registration: &ModelRegistration<'_>,
    ) -> Result<RegisteredModel, Error> {
        let dir_name = registration
            .model_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::FileError(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid model path {}", registration.model_path.display()),
                ))
            })?;
        // the unpacked folder lives next to the raw archive in the logging run
        let container = format!("ExperimentRun/dcid.{}", registration.run_id);
        let prefix = format!("outputs/{dir_name}");
        for relative in list_files(registration.model_path)? {
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            self.put_artifact(
                &container,
                &format!("{prefix}/{name}"),
                &registration.model_path.join(&relative),
            )
            .await?;
        }

        let response = self
            .http
            .post(format!(
                "{}/modelmanagement/v1.0/{}/models",
                self.service_endpoint, self.scope
            ))
            .bearer_auth(self.bearer().await?)
            .json(&json!({
                "name": registration.name,
                "url": format!("aml://artifact/{container}/{prefix}"),
                "mimeType": "application/octet-stream",
                "description": registration.description,
                "kvTags": registration.tags,
                "experimentName": registration.experiment,
                "runId": registration.run_id,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(registry_error(response).await);
        }
        Ok(response.json().await?)
    }
}
