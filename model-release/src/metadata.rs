use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Output of a release, consumed by the deployment stages that follow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    pub model_name: String,
    pub model_version: u64,
    pub run_id: String,
    pub model_name_run: String,
}

/// Writes `record` as a JSON object, overwriting whatever is at `path`.
pub fn persist_metadata(record: &ModelRecord, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(Error::FileError)?;
    }
    let contents = serde_json::to_vec(record)?;
    fs::write(path, contents).map_err(Error::FileError)?;
    log::info!("Wrote model details to {}", path.display());
    Ok(())
}
