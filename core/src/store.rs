use crate::error::{Result, SncError};
use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Handle on the directory that holds the local session and selection records.
///
/// Records are small JSON documents addressed by name. Writes replace the
/// whole file through a rename, so readers never see a half-written record.
/// Concurrent writers from separate processes resolve as last-writer-wins.
#[derive(Clone, Debug)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A fresh, uniquely named directory under the system temp dir.
    pub fn temporary() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("snowcell-{}", Uuid::new_v4()));
        Self::new(path)
    }

    /// `~/.snc`, or `.snc` in the working directory when no home is known.
    pub fn default_root() -> PathBuf {
        BaseDirs::new()
            .map(|base| base.home_dir().join(".snc"))
            .unwrap_or_else(|| PathBuf::from(".snc"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path(name);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SncError::storage(path, err)),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|err| SncError::storage(path, err))
    }

    pub fn write<T: Serialize>(&self, name: &str, record: &T) -> Result<()> {
        let path = self.path(name);
        fs::create_dir_all(&self.root).map_err(|err| SncError::storage(&self.root, err))?;
        let serialized =
            serde_json::to_vec_pretty(record).map_err(|err| SncError::storage(&path, err))?;

        let temp_path = self.root.join(format!(".{name}.json.{}.tmp", Uuid::new_v4()));
        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(&serialized)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&temp_path, &path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(SncError::storage(path, err));
        }
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SncError::storage(path, err)),
        }
    }
}
