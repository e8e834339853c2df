use std::path::PathBuf;

use crate::artifact::{self, ArtifactName};
use crate::config::{ReleaseConfig, WorkspaceConfig};
use crate::databricks::{DatabricksClient, JobHandle, JobSpec, Parameter, RunHandle, RunState};
use crate::error::Error;
use crate::metadata::{self, ModelRecord};
use crate::poll;
use crate::registry::{ModelRegistration, ModelRegistry};

/// Notebook parameters, one entry per key.
pub fn base_parameters(workspace: &WorkspaceConfig, artifact: &ArtifactName) -> Vec<Parameter> {
    vec![
        Parameter::new("subscription_id", &workspace.subscription_id),
        Parameter::new("resource_group", &workspace.resource_group),
        Parameter::new("workspace_name", &workspace.workspace_name),
        Parameter::new("model_name", artifact.run_name()),
    ]
}

/// Archive written to the deploy directory by [`JobOrchestrator::fetch_artifact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub len: usize,
}

/// Drives one release: train on Databricks, pull the model archive back,
/// register it in Azure ML and record what was registered.
///
/// Each stage takes the previous stage's output and nothing runs concurrently.
/// All filesystem locations come from [`ReleaseConfig::output`]; the process
/// working directory is never changed.
pub struct JobOrchestrator<R> {
    config: ReleaseConfig,
    databricks: DatabricksClient,
    registry: R,
    artifact: ArtifactName,
}

impl<R: ModelRegistry> JobOrchestrator<R> {
    pub fn new(
        config: ReleaseConfig,
        databricks: DatabricksClient,
        registry: R,
        artifact: ArtifactName,
    ) -> Self {
        Self {
            config,
            databricks,
            registry,
            artifact,
        }
    }

    pub fn artifact(&self) -> &ArtifactName {
        &self.artifact
    }

    pub fn job_spec(&self) -> JobSpec {
        JobSpec::new(
            &self.config.databricks,
            base_parameters(&self.config.workspace, &self.artifact),
        )
    }

    pub async fn submit_job(&self, spec: &JobSpec) -> Result<JobHandle, Error> {
        log::info!(
            "Creating job {:?} for notebook {}",
            spec.name,
            spec.notebook_task.notebook_path
        );
        let job = self.databricks.create_job(spec).await?;
        log::info!("Created job {}", job.job_id);
        Ok(job)
    }

    pub async fn start_job(&self, job: &JobHandle) -> Result<RunHandle, Error> {
        let run = self.databricks.run_now(job).await?;
        log::info!("Started run {} of job {}", run.run_id, job.job_id);
        Ok(run)
    }

    pub async fn poll_until_terminal(&self, run: &RunHandle) -> Result<RunState, Error> {
        poll::poll_until_terminal(&self.databricks, run, &self.config.polling.policy()).await
    }

    pub async fn fetch_artifact(&self) -> Result<DownloadedArtifact, Error> {
        let contents = self
            .databricks
            .read_dbfs_file(&self.artifact.dbfs_path())
            .await?;
        let path = self.artifact.download_path(&self.config.output.deploy_dir);
        artifact::write_archive(&path, &contents)?;
        log::info!(
            "Downloaded model {} ({} bytes) to {}",
            self.artifact,
            contents.len(),
            path.display()
        );
        Ok(DownloadedArtifact {
            path,
            len: contents.len(),
        })
    }

    pub async fn register_model(&self, archive: &DownloadedArtifact) -> Result<ModelRecord, Error> {
        let registry_config = &self.config.registry;
        let workspace = self.registry.attach_workspace().await?;
        log::info!(
            "Attached to workspace {} ({})",
            workspace.name,
            workspace.location
        );

        let run = self
            .registry
            .start_run(&registry_config.experiment_name)
            .await?;
        self.registry
            .upload_file(&run, &self.artifact.upload_name(), &archive.path)
            .await?;
        log::info!(
            "Logged {} ({} bytes) against run {}",
            self.artifact.upload_name(),
            archive.len,
            run.run_id
        );
        self.registry.complete_run(&run).await?;
        log::info!("run id: {}", run.run_id);

        let model_dir = self.artifact.unpack_dir(&self.config.output.deploy_dir);
        artifact::unpack_archive(&archive.path, &model_dir)?;

        let mut tags = registry_config.tags.clone();
        tags.insert("run_id".to_string(), run.run_id.clone());
        let model = self
            .registry
            .register_model(&ModelRegistration {
                model_path: &model_dir,
                name: &registry_config.model_name,
                tags,
                description: &registry_config.description,
                experiment: &run.experiment,
                run_id: &run.run_id,
            })
            .await?;
        log::info!(
            "Model registered: {} \nModel Description: {} \nModel Version: {}",
            model.name,
            model
                .description
                .as_deref()
                .unwrap_or(&registry_config.description),
            model.version
        );

        Ok(ModelRecord {
            model_name: model.name,
            model_version: model.version,
            run_id: run.run_id,
            model_name_run: self.artifact.run_name().to_string(),
        })
    }

    pub fn persist_metadata(&self, record: &ModelRecord) -> Result<PathBuf, Error> {
        let path = self.config.output.metadata_path.clone();
        metadata::persist_metadata(record, &path)?;
        Ok(path)
    }

    /// Runs every stage in order, stopping at the first failure.
    pub async fn run(&self) -> Result<ModelRecord, Error> {
        let spec = self.job_spec();
        let job = self.submit_job(&spec).await?;
        let run = self.start_job(&job).await?;
        self.poll_until_terminal(&run).await?;
        let archive = self.fetch_artifact().await?;
        let record = self.register_model(&archive).await?;
        self.persist_metadata(&record)?;
        Ok(record)
    }
}
