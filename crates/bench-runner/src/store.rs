use crate::Result;
use bench_core::{atomic_write_bytes, ensure_dir, TaskName};
use std::path::{Path, PathBuf};

/// One `<task name>.json` file per task. Writing a name that already exists
/// replaces the earlier result.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn open(dir: &Path) -> Result<Self> {
        ensure_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &TaskName) -> PathBuf {
        self.dir.join(name.file_name())
    }

    pub fn write(&self, name: &TaskName, record: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(name);
        atomic_write_bytes(&path, record)?;
        Ok(path)
    }
}
