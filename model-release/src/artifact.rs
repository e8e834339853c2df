use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::error::Error;

// keep the .mml extension, the notebook relies on it
const RUN_NAME_SUFFIX: &str = "_dbrmod.mml";
const ARCHIVE_EXTENSION: &str = "zip";

/// Timestamped name of the model produced by one release run.
///
/// Built once from the wall clock at process start. Every place that refers to
/// the artifact (notebook parameter, DBFS path, download target, unpack target,
/// uploaded file name) derives from this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    run_name: String,
}

impl ArtifactName {
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: Display,
    {
        Self {
            run_name: format!("{}{}", time.format("%Y%m%d%H%M%S"), RUN_NAME_SUFFIX),
        }
    }

    /// `20240131235959_dbrmod.mml`, handed to the notebook as `model_name`.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn stem(&self) -> &str {
        self.run_name
            .split_once('.')
            .map_or(self.run_name.as_str(), |(stem, _)| stem)
    }

    /// `20240131235959_dbrmod.zip`, the archive the notebook leaves on DBFS.
    pub fn archive_name(&self) -> String {
        format!("{}.{}", self.stem(), ARCHIVE_EXTENSION)
    }

    pub fn dbfs_path(&self) -> String {
        format!("/{}", self.archive_name())
    }

    pub fn download_path(&self, deploy_dir: &Path) -> PathBuf {
        deploy_dir.join(self.archive_name())
    }

    pub fn unpack_dir(&self, deploy_dir: &Path) -> PathBuf {
        deploy_dir.join(self.run_name())
    }

    /// Name the archive is stored under in the logging run.
    pub fn upload_name(&self) -> String {
        format!("outputs/{}", self.archive_name())
    }
}

impl Display for ArtifactName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.run_name)
    }
}

/// Writes the downloaded archive, replacing any previous file.
pub fn write_archive(path: &Path, contents: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(Error::FileError)?;
    }
    fs::write(path, contents).map_err(Error::FileError)
}

/// Extracts a zip archive into `target`. A corrupt or non-zip archive is an error.
pub fn unpack_archive(archive: &Path, target: &Path) -> Result<(), Error> {
    let file = File::open(archive).map_err(Error::FileError)?;
    let mut zip = zip::ZipArchive::new(file)?;
    log::info!(
        "Unpacking {} entries from {} to {}",
        zip.len(),
        archive.display(),
        target.display()
    );
    fs::create_dir_all(target).map_err(Error::FileError)?;
    zip.extract(target)?;
    Ok(())
}

/// All regular files below `dir`, sorted, as paths relative to `dir`.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).map_err(Error::FileError)? {
            let path = entry.map_err(Error::FileError)?.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(dir) {
                files.push(relative.to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}
