use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::error::Error;
use super::poll::PollPolicy;

/// Identifies the Azure ML workspace the model is registered in. The same
/// values are handed to the notebook as job parameters.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace_name: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ClusterConfig {
    pub spark_version: String,
    pub node_type_id: String,
    pub min_workers: u32,
    pub max_workers: u32,
    pub spark_env_vars: BTreeMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            spark_version: "4.0.x-scala2.11".to_string(),
            node_type_id: "Standard_D3_v2".to_string(),
            min_workers: 1,
            max_workers: 2,
            spark_env_vars: BTreeMap::from([(
                "PYSPARK_PYTHON".to_string(),
                "/databricks/python3/bin/python3".to_string(),
            )]),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabricksConfig {
    /// Base URL of the Databricks workspace, e.g. `https://westeurope.azuredatabricks.net`
    pub host: String,
    pub job_name: String,
    pub notebook_path: String,
    pub cluster: ClusterConfig,
    /// PyPI packages installed on the job cluster
    #[serde(alias = "libraries")]
    pub pypi_packages: Vec<String>,
}

impl Default for DatabricksConfig {
    fn default() -> Self {
        Self {
            host: "https://westeurope.azuredatabricks.net".to_string(),
            job_name: "Run AzureDevopsNotebook Job".to_string(),
            notebook_path: "/3_IncomeNotebookDevops".to_string(),
            cluster: ClusterConfig::default(),
            pypi_packages: vec!["azureml-sdk[databricks]".to_string()],
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub max_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_secs: policy.interval.as_secs(),
            max_polls: policy.max_polls,
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            max_polls: self.max_polls,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    /// Azure Resource Manager endpoint used to resolve the workspace
    pub arm_endpoint: String,
    /// Regional Azure ML service endpoint (run history, artifacts, model management)
    pub service_endpoint: String,
    pub experiment_name: String,
    pub model_name: String,
    /// Fixed tags attached to every registered version, `run_id` is added at registration
    pub tags: BTreeMap<String, String>,
    pub description: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            arm_endpoint: "https://management.azure.com".to_string(),
            service_endpoint: "https://westeurope.api.azureml.ms".to_string(),
            experiment_name: "experiment_model_release".to_string(),
            model_name: "databricksmodel.mml".to_string(),
            tags: BTreeMap::from([
                ("area".to_string(), "spar".to_string()),
                ("type".to_string(), "regression".to_string()),
            ]),
            description: "Medium blog test model".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving the downloaded archive and its unpacked contents
    pub deploy_dir: PathBuf,
    /// Where the registered model record is written for later pipeline stages
    pub metadata_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            deploy_dir: PathBuf::from("deploy"),
            metadata_path: PathBuf::from("conf").join("model.json"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReleaseConfig {
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub databricks: DatabricksConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ReleaseConfig {
    pub fn new(workspace: WorkspaceConfig) -> Self {
        Self {
            workspace,
            databricks: DatabricksConfig::default(),
            polling: PollingConfig::default(),
            registry: RegistryConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config_str = fs::read_to_string(path).map_err(Error::FileError)?;
        let config: ReleaseConfig = serde_json::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("workspace.subscription_id", &self.workspace.subscription_id),
            ("workspace.resource_group", &self.workspace.resource_group),
            ("workspace.workspace_name", &self.workspace.workspace_name),
            ("databricks.host", &self.databricks.host),
            ("databricks.notebook_path", &self.databricks.notebook_path),
            ("registry.model_name", &self.registry.model_name),
            ("registry.experiment_name", &self.registry.experiment_name),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::ConfigError(format!("{name} must not be empty")));
        }
        if self.polling.max_polls == 0 {
            return Err(Error::ConfigError(
                "polling.max_polls must be at least 1".to_string(),
            ));
        }
        let cluster = &self.databricks.cluster;
        if cluster.min_workers > cluster.max_workers {
            return Err(Error::ConfigError(format!(
                "cluster min_workers ({}) exceeds max_workers ({})",
                cluster.min_workers, cluster.max_workers
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test_log::test]
    fn test_minimal_config_uses_release_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"workspace": {{"subscription_id": "sub", "resource_group": "rg", "workspace_name": "ws"}}}}"#
        )
        .unwrap();
        let config = ReleaseConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workspace.workspace_name, "ws");
        assert_eq!(config.databricks.notebook_path, "/3_IncomeNotebookDevops");
        assert_eq!(config.databricks.cluster.max_workers, 2);
        assert_eq!(config.polling.policy(), PollPolicy::default());
        assert_eq!(config.registry.model_name, "databricksmodel.mml");
        assert_eq!(config.output.metadata_path, Path::new("conf/model.json"));
    }

    #[test_log::test]
    fn test_partial_sections_keep_remaining_defaults() {
        let config: ReleaseConfig = serde_json::from_str(
            r#"{
                "workspace": {"subscription_id": "sub", "resource_group": "rg", "workspace_name": "ws"},
                "databricks": {"host": "https://adb-1.azuredatabricks.net", "cluster": {"max_workers": 8}},
                "polling": {"interval_secs": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(config.databricks.host, "https://adb-1.azuredatabricks.net");
        assert_eq!(config.databricks.cluster.max_workers, 8);
        assert_eq!(config.databricks.cluster.min_workers, 1);
        assert_eq!(config.databricks.cluster.node_type_id, "Standard_D3_v2");
        assert_eq!(config.polling.interval_secs, 5);
        assert_eq!(config.polling.max_polls, 180);
    }

    #[test_log::test]
    fn test_libraries_key_sets_pypi_packages() {
        let config: ReleaseConfig = serde_json::from_str(
            r#"{
                "workspace": {"subscription_id": "sub", "resource_group": "rg", "workspace_name": "ws"},
                "databricks": {"libraries": ["azureml-sdk[databricks]==1.0.85", "pyarrow"]}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.databricks.pypi_packages,
            vec!["azureml-sdk[databricks]==1.0.85", "pyarrow"]
        );
    }

    #[test_log::test]
    fn test_validation_rejects_bad_values() {
        let workspace = WorkspaceConfig {
            subscription_id: "sub".to_string(),
            resource_group: " ".to_string(),
            workspace_name: "ws".to_string(),
        };
        let config = ReleaseConfig::new(workspace.clone());
        assert!(matches!(config.validate(), Err(Error::ConfigError(msg)) if msg.contains("resource_group")));

        let mut config = ReleaseConfig::new(WorkspaceConfig {
            resource_group: "rg".to_string(),
            ..workspace
        });
        assert!(config.validate().is_ok());
        config.polling.max_polls = 0;
        assert!(config.validate().is_err());
        config.polling.max_polls = 1;
        config.databricks.cluster.min_workers = 3;
        assert!(config.validate().is_err());
    }

    #[test_log::test]
    fn test_missing_workspace_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"polling": {{"max_polls": 10}}}}"#).unwrap();
        assert!(matches!(
            ReleaseConfig::from_file(file.path()),
            Err(Error::ParseError(_))
        ));
    }
}
