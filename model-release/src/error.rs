use reqwest::Error as RequestError;
use thiserror::Error;

pub const EXIT_FATAL: i32 = 1;
pub const EXIT_JOB_CREATE: i32 = 2;
pub const EXIT_JOB_START: i32 = 3;
pub const EXIT_JOB_FAILED: i32 = 4;
pub const EXIT_POLL_TIMEOUT: i32 = 5;
pub const EXIT_ARTIFACT_FETCH: i32 = 6;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error creating job: {error_code}: {message}")]
    JobCreate { error_code: String, message: String },
    #[error("Error starting job: {error_code}: {message}")]
    JobStart { error_code: String, message: String },
    #[error("Error reading run status: {error_code}: {message}")]
    RunStatus { error_code: String, message: String },
    #[error("Job run did not succeed: life cycle state {life_cycle_state}, result state {result_state}")]
    JobFailed {
        life_cycle_state: String,
        result_state: String,
    },
    #[error("Time out occurred after {polls} status polls")]
    PollTimeout { polls: u32 },
    #[error("Error copying dbfs results: {error_code}: {message}")]
    ArtifactFetch { error_code: String, message: String },
    #[error("Request Error: {0}")]
    RequestError(#[from] RequestError),
    #[error("File Error: {0}")]
    FileError(std::io::Error),
    #[error("Response Parsing Error: {0}")]
    ParseError(serde_json::Error),
    #[error("Config Error: {0}")]
    ConfigError(String),
    #[error("Artifact Decode Error: {0}")]
    DecodeError(#[from] base64::DecodeError),
    #[error("Archive Error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),
    #[error("Credential Error: {0}")]
    CredentialError(String),
    #[error("Workspace Error: {status}: {message}")]
    WorkspaceError { status: u16, message: String },
    #[error("Registry Error: {status}: {message}")]
    RegistryError { status: u16, message: String },
    #[error("Async Runtime Error: {0}")]
    AsyncError(std::io::Error),
}

impl Error {
    /// Process exit status for this failure. Only the remote job and DBFS
    /// stages carry a dedicated code, everything else is a plain fatal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::JobCreate { .. } => EXIT_JOB_CREATE,
            Self::JobStart { .. } => EXIT_JOB_START,
            Self::JobFailed { .. } => EXIT_JOB_FAILED,
            Self::PollTimeout { .. } => EXIT_POLL_TIMEOUT,
            Self::ArtifactFetch { .. } => EXIT_ARTIFACT_FETCH,
            _ => EXIT_FATAL,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::ParseError(value)
    }
}
