use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DatabricksConfig;

/// Body of `POST /api/2.0/jobs/create`.
#[derive(Serialize, Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub new_cluster: NewCluster,
    pub libraries: Vec<Library>,
    pub notebook_task: NotebookTask,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewCluster {
    pub spark_version: String,
    pub node_type_id: String,
    pub spark_env_vars: BTreeMap<String, String>,
    pub autoscale: Autoscale,
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct Autoscale {
    pub min_workers: u32,
    pub max_workers: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Pypi(PypiLibrary),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PypiLibrary {
    pub package: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NotebookTask {
    pub notebook_path: String,
    pub base_parameters: Vec<Parameter>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl JobSpec {
    pub fn new(config: &DatabricksConfig, base_parameters: Vec<Parameter>) -> Self {
        let cluster = &config.cluster;
        Self {
            name: config.job_name.clone(),
            new_cluster: NewCluster {
                spark_version: cluster.spark_version.clone(),
                node_type_id: cluster.node_type_id.clone(),
                spark_env_vars: cluster.spark_env_vars.clone(),
                autoscale: Autoscale {
                    min_workers: cluster.min_workers,
                    max_workers: cluster.max_workers,
                },
            },
            libraries: config
                .pypi_packages
                .iter()
                .map(|package| {
                    Library::Pypi(PypiLibrary {
                        package: package.clone(),
                    })
                })
                .collect(),
            notebook_task: NotebookTask {
                notebook_path: config.notebook_path.clone(),
                base_parameters,
            },
        }
    }
}

/// Job definition id returned by `jobs/create`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: u64,
}

/// Run id returned by `jobs/run-now`, only used to poll `jobs/runs/get`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: u64,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RunResponse {
    pub state: RunState,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifeCycleState {
    Queued,
    Pending,
    Running,
    Terminating,
    Terminated,
    Skipped,
    InternalError,
    Blocked,
    WaitingForRetry,
    #[serde(other)]
    Unknown,
}

impl LifeCycleState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Terminated | Self::Skipped | Self::InternalError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Skipped => "SKIPPED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Blocked => "BLOCKED",
            Self::WaitingForRetry => "WAITING_FOR_RETRY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultState {
    Success,
    SuccessWithFailures,
    Failed,
    Timedout,
    Canceled,
    MaximumConcurrentRunsReached,
    Excluded,
    UpstreamFailed,
    UpstreamCanceled,
    #[serde(other)]
    Unknown,
}

impl ResultState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::SuccessWithFailures => "SUCCESS_WITH_FAILURES",
            Self::Failed => "FAILED",
            Self::Timedout => "TIMEDOUT",
            Self::Canceled => "CANCELED",
            Self::MaximumConcurrentRunsReached => "MAXIMUM_CONCURRENT_RUNS_REACHED",
            Self::Excluded => "EXCLUDED",
            Self::UpstreamFailed => "UPSTREAM_FAILED",
            Self::UpstreamCanceled => "UPSTREAM_CANCELED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a run as reported by `jobs/runs/get`, re-fetched on every poll.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub life_cycle_state: LifeCycleState,
    #[serde(default)]
    pub result_state: Option<ResultState>,
    #[serde(default)]
    pub state_message: String,
}

impl RunState {
    /// Only an exact `SUCCESS` counts; `SUCCESS_WITH_FAILURES` does not.
    pub fn is_success(&self) -> bool {
        self.result_state == Some(ResultState::Success)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "life_cycle_state: {}", self.life_cycle_state)?;
        if let Some(result_state) = self.result_state {
            write!(f, ", result_state: {result_state}")?;
        }
        if !self.state_message.is_empty() {
            write!(f, ", state_message: {}", self.state_message)?;
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct DbfsReadResponse {
    // required: the chunk loop relies on it to detect the end of the file
    pub bytes_read: u64,
    pub data: String,
}
