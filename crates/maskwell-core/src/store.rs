//! Backing stores for persisted placeholder mappings

use crate::error::StoreError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Persistence contract for one mapping blob per session
pub trait MappingStore: Send + Sync {
    /// `Ok(None)` when nothing was ever written for the session
    fn read(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the session's blob. Either the whole blob lands or nothing does.
    fn write(&self, session_id: &str, blob: &[u8]) -> Result<(), StoreError>;
}

fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidSessionId(session_id.to_string()))
    }
}

/// One pretty-printed JSON file per session under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

impl MappingStore for FileStore {
    fn read(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(session_id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, session_id: &str, blob: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        let mut writer = AtomicWriter::new(&path)?;
        writer.write(blob)?;
        writer.commit()
    }
}

/// Writes to `<path>.tmp` and renames over the target on commit.
///
/// Dropping without commit removes the temp file and leaves the target
/// untouched.
struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

impl AtomicWriter {
    fn new(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp_path = PathBuf::from(temp);
        let file = File::create(&temp_path)?;
        Ok(Self {
            temp_path,
            final_path: path.to_path_buf(),
            file: Some(file),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), StoreError> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
        }
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        // No-op after a successful rename
        let _ = fs::remove_file(&self.temp_path);
    }
}

/// In-process store, handy for tests and single-process pipelines
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MappingStore for MemoryStore {
    fn read(&self, session_id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_session_id(session_id)?;
        Ok(self.records.lock().get(session_id).cloned())
    }

    fn write(&self, session_id: &str, blob: &[u8]) -> Result<(), StoreError> {
        validate_session_id(session_id)?;
        self.records
            .lock()
            .insert(session_id.to_string(), blob.to_vec());
        Ok(())
    }
}
