//! The structured record codec: small YAML documents on disk.
//!
//! Records are always rewritten in full. Writes go to a temporary file in the
//! same directory which is then renamed over the target, so readers never see
//! a half-written record.

use std::{
    fmt::Debug,
    fs::{self, OpenOptions},
    io::{self, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::Error;

/// Reads and decodes the record at `path`.
pub fn read<T, P>(path: P) -> Result<T, Error>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|err| Error::decode(path, err))
}

/// Reads the record at `path`, treating a missing or blank file as the
/// default value.
pub fn read_or_default<T, P>(path: P) -> Result<T, Error>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };

    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&raw).map_err(|err| Error::decode(path, err))
}

/// Encodes `value` and replaces whatever is at `path`.
pub fn write<T, P>(path: P, value: &T) -> Result<(), Error>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let encoded = serde_yaml::to_string(value)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(encoded.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|err| Error::Persist {
        path: path.to_path_buf(),
        err,
    })?;

    Ok(())
}

/// Encodes `value` into a new file at `path`.
///
/// Returns `false` without touching the file system if something already
/// exists at `path`.
pub fn create<T, P>(path: P, value: &T) -> Result<bool, Error>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let encoded = serde_yaml::to_string(value)?;

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path.as_ref())
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(encoded.as_bytes())?;

    Ok(true)
}

/// `Handle` owns a persisted record and serialises every read-modify-write of
/// it.
///
/// The record is re-read from disk inside the lock on every update, so changes
/// made by other writers between updates are not lost. Only one update per
/// handle (and its clones) is in flight at any time.
pub struct Handle<T> {
    path: Arc<Mutex<PathBuf>>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("path", &self.path).finish()
    }
}

impl<T> Handle<T>
where
    T: DeserializeOwned + Serialize + Default,
{
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            path: Arc::new(Mutex::new(path.as_ref().to_path_buf())),
            _record: PhantomData,
        }
    }

    /// Returns the current persisted value.
    pub async fn load(&self) -> Result<T, Error> {
        let path = self.path.lock().await;
        read_or_default(path.as_path())
    }

    /// Applies `f` to the persisted value and writes the result back.
    ///
    /// If the write fails, the persisted record is left as it was.
    pub async fn update<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> R,
    {
        let path = self.path.lock().await;

        let mut value: T = read_or_default(path.as_path())?;
        let result = f(&mut value);
        write(path.as_path(), &value)?;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    type Counts = BTreeMap<String, u32>;

    #[test]
    fn test_read_or_default() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("counts.yml");

        assert_eq!(read_or_default::<Counts, _>(&path)?, Counts::new());

        fs::write(&path, "  \n")?;
        assert_eq!(read_or_default::<Counts, _>(&path)?, Counts::new());

        fs::write(&path, "a: 1\nb: 2\n")?;
        let counts: Counts = read_or_default(&path)?;
        assert_eq!(counts.get("b"), Some(&2));

        fs::write(&path, "a: [not a number\n")?;
        assert!(matches!(
            read_or_default::<Counts, _>(&path),
            Err(Error::Decode { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_create_does_not_overwrite() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("once.yml");

        let first: Counts = vec![("first".to_string(), 1)].into_iter().collect();
        let second: Counts = vec![("second".to_string(), 2)].into_iter().collect();

        assert!(create(&path, &first)?);
        assert!(!create(&path, &second)?);
        assert_eq!(read::<Counts, _>(&path)?, first);

        Ok(())
    }

    #[tokio::test]
    async fn test_handle_update() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("counts.yml");
        let handle = Handle::<Counts>::new(&path);

        let n = handle
            .update(|counts| {
                *counts.entry("a".into()).or_default() += 1;
                counts.len()
            })
            .await?;
        assert_eq!(n, 1);

        // Someone else rewrites the file between updates; the next update
        // starts from what's on disk.
        fs::write(&path, "a: 1\nz: 26\n")?;
        handle
            .update(|counts| *counts.entry("a".into()).or_default() += 1)
            .await?;

        let counts = handle.load().await?;
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("z"), Some(&26));

        Ok(())
    }

    #[tokio::test]
    async fn test_handle_concurrent_updates() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let handle = Handle::<Counts>::new(dir.path().join("counts.yml"));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .update(|counts| *counts.entry("n".into()).or_default() += 1)
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert_ok!(task.await?);
        }

        assert_eq!(handle.load().await?.get("n"), Some(&16));

        Ok(())
    }

    #[tokio::test]
    async fn test_handle_decode_error_leaves_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("counts.yml");
        fs::write(&path, "- not\n- a\n- map\n")?;

        let handle = Handle::<Counts>::new(&path);
        assert_err!(handle.update(|counts| counts.clear()).await);
        assert_eq!(fs::read_to_string(&path)?, "- not\n- a\n- map\n");

        Ok(())
    }
}
