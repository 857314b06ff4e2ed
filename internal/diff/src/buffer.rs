use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use codesync_store::record;
use uuid::Uuid;

use crate::{validate, DiffKind, DiffRecord, Error};

/// Format of `created_at`, always in UTC.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BUFFER_EXTENSION: &str = "yml";

// How many fresh names to try before giving up.
const CREATE_ATTEMPTS: usize = 3;

/// The append-only directory of buffered diff records.
#[derive(Debug, Clone)]
pub struct DiffBuffer {
    dir: PathBuf,
    source: String,
}

impl DiffBuffer {
    pub fn new<P>(dir: P, source: &str) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            dir: dir.as_ref().to_path_buf(),
            source: source.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Records a single change.
    ///
    /// An edit with an empty diff changed nothing and is dropped; `Ok(None)`
    /// is returned in that case. Otherwise the path of the new record is
    /// returned.
    pub fn manage_diff(
        &self,
        repo_path: &str,
        branch: &str,
        rel_path: &str,
        diff: &str,
        kind: DiffKind,
    ) -> Result<Option<PathBuf>, Error> {
        self.manage_diff_at(repo_path, branch, rel_path, diff, kind, Utc::now())
    }

    pub(crate) fn manage_diff_at(
        &self,
        repo_path: &str,
        branch: &str,
        rel_path: &str,
        diff: &str,
        kind: DiffKind,
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, Error> {
        if diff.is_empty() && kind == DiffKind::Edit {
            log::info!("skipping empty diff for {} in {}", rel_path, repo_path);
            return Ok(None);
        }

        let record = DiffRecord::new(
            &self.source,
            now.format(DATETIME_FORMAT).to_string(),
            repo_path,
            branch,
            rel_path,
            diff,
            kind,
        );
        record.validate()?;

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }

        for _ in 0..CREATE_ATTEMPTS {
            let path = self.dir.join(format!(
                "{:013}-{}.{}",
                now.timestamp_millis(),
                Uuid::now_v7().simple(),
                BUFFER_EXTENSION
            ));
            if record::create(&path, &record)? {
                log::debug!("buffered {:?} diff for {} at {}", kind, rel_path, path.display());
                return Ok(Some(path));
            }
            log::debug!("buffer file {} already exists; retrying", path.display());
        }

        Err(Error::NameCollision(CREATE_ATTEMPTS))
    }

    /// Lists buffered records, oldest first.
    ///
    /// Records that can't be decoded or fail validation are removed from the
    /// buffer, since they will never become valid.
    pub fn pending(&self) -> Result<Vec<(PathBuf, DiffRecord)>, Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(BUFFER_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths.into_iter() {
            match decode(&path) {
                Ok(record) => records.push((path, record)),
                Err(reason) => {
                    log::warn!("removing invalid diff {}: {}", path.display(), reason);
                    self.remove(&path)?;
                }
            }
        }

        Ok(records)
    }

    /// Removes a consumed record. A record that's already gone is fine.
    pub fn remove<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        match fs::remove_file(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode(path: &Path) -> Result<DiffRecord, String> {
    let raw = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let value: serde_yaml::Value = serde_yaml::from_str(&raw).map_err(|e| e.to_string())?;
    validate::validate(&value).map_err(|e| e.to_string())?;
    serde_yaml::from_value(value).map_err(|e| e.to_string())
}
