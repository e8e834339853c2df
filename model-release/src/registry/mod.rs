//! Azure ML side of a release: attach to the workspace, log the archive
//! against an experiment run, then register the unpacked model.

pub mod azureml;
pub mod credentials;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

pub use azureml::AzureMlRegistry;
pub use credentials::TokenSource;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceDetails {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// A run started with `start_logging` semantics: created under an experiment,
/// which itself is created on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingRun {
    pub experiment: String,
    pub run_id: String,
}

#[derive(Debug)]
pub struct ModelRegistration<'a> {
    pub model_path: &'a Path,
    pub name: &'a str,
    pub tags: BTreeMap<String, String>,
    pub description: &'a str,
    pub experiment: &'a str,
    pub run_id: &'a str,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub version: u64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Workspace-scoped experiment logging and model registration.
#[allow(async_fn_in_trait)]
pub trait ModelRegistry {
    async fn attach_workspace(&self) -> Result<WorkspaceDetails, Error>;
    async fn start_run(&self, experiment: &str) -> Result<LoggingRun, Error>;
    async fn upload_file(&self, run: &LoggingRun, name: &str, path: &Path) -> Result<(), Error>;
    async fn complete_run(&self, run: &LoggingRun) -> Result<(), Error>;
    async fn register_model(
        &self,
        registration: &ModelRegistration<'_>,
    ) -> Result<RegisteredModel, Error>;
}
