use log::LevelFilter;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use model_release::artifact::ArtifactName;
use model_release::config::ReleaseConfig;
use model_release::databricks::DatabricksClient;
use model_release::error::{Error, EXIT_FATAL};
use model_release::metadata::ModelRecord;
use model_release::registry::{AzureMlRegistry, TokenSource};
use model_release::release::JobOrchestrator;
use secrecy::Secret;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(
    about = "Train a model with a Databricks notebook job and register the result in Azure ML"
)]
struct Cli {
    /// File path to the JSON release config (workspace, cluster, registry and output settings)
    #[arg(long = "config")]
    config: PathBuf,
    /// Databricks personal access token
    #[arg(long = "databricks-token", env = "DATABRICKS_TOKEN", hide_env_values = true)]
    databricks_token: Secret<String>,
    /// Azure ML bearer token. If not provided, one is requested from a logged-in Azure CLI
    #[arg(long = "azureml-token", env = "AZUREML_TOKEN", hide_env_values = true)]
    azureml_token: Option<Secret<String>>,
    /// Overrides `output.deploy_dir`
    #[arg(long = "deploy-dir")]
    deploy_dir: Option<PathBuf>,
    /// Overrides `output.metadata_path`
    #[arg(long = "metadata-path")]
    metadata_path: Option<PathBuf>,
    /// Overrides `polling.max_polls`
    #[arg(long = "max-polls")]
    max_polls: Option<u32>,
    /// Overrides `polling.interval_secs`
    #[arg(long = "poll-interval")]
    poll_interval: Option<u64>,
}

impl Cli {
    fn load_config(&self) -> Result<ReleaseConfig, Error> {
        let mut config = ReleaseConfig::from_file(&self.config)?;
        if let Some(deploy_dir) = &self.deploy_dir {
            config.output.deploy_dir = deploy_dir.clone();
        }
        if let Some(metadata_path) = &self.metadata_path {
            config.output.metadata_path = metadata_path.clone();
        }
        if let Some(max_polls) = self.max_polls {
            config.polling.max_polls = max_polls;
        }
        if let Some(interval) = self.poll_interval {
            config.polling.interval_secs = interval;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Off)
        .filter_module("model_release", LevelFilter::Info)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn release(cli: Cli, artifact: ArtifactName) -> Result<ModelRecord, Error> {
    let config = cli.load_config()?;
    log::info!("Releasing model run {artifact}");
    let tokens = match cli.azureml_token {
        Some(token) => TokenSource::Static(token),
        None => TokenSource::default(),
    };
    let databricks = DatabricksClient::new(config.databricks.host.clone(), cli.databricks_token)?;
    let registry = AzureMlRegistry::new(&config.workspace, &config.registry, tokens)?;
    let rt = Runtime::new().map_err(Error::AsyncError)?;
    rt.block_on(JobOrchestrator::new(config, databricks, registry, artifact).run())
}

/// Usage errors must not collide with the stage exit codes, clap's own
/// default of 2 means "job creation failed" to the pipeline.
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        EXIT_FATAL
    } else {
        0
    }
}

fn main() {
    // one timestamp for the whole run
    let artifact = ArtifactName::now();
    init_logger();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(usage_exit_code(&err));
        }
    };
    match release(cli, artifact) {
        Ok(record) => log::info!(
            "Released {} version {} (run {})",
            record.model_name,
            record.model_version,
            record.run_id
        ),
        Err(err) => {
            log::error!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}
