use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::scope::Scope;

const MARKER_NAME: &str = "disabled";

#[derive(Debug, thiserror::Error)]
#[error("failed to create disable marker {}: {source}", .path.display())]
pub(crate) struct StoreError {
    pub(crate) path: PathBuf,
    #[source]
    pub(crate) source: io::Error,
}

/// Filesystem-backed disable flags: `{base_dir}/disabled` for the whole bot,
/// `{base_dir}/{task}/disabled` for a single task. Only presence matters.
#[derive(Debug, Clone)]
pub(crate) struct DisableStore {
    base_dir: PathBuf,
}

impl DisableStore {
    pub(crate) fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    pub(crate) fn marker_path(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Global => self.base_dir.join(MARKER_NAME),
            Scope::Task(slug) => self.base_dir.join(slug.as_str()).join(MARKER_NAME),
        }
    }

    pub(crate) fn is_disabled_by_file(&self, scope: &Scope) -> bool {
        self.marker_path(scope).is_file()
    }

    /// Ensures the marker exists. Returns `true` when this call created it.
    ///
    /// The task directory is owned by the task's own setup and is never created
    /// here; a missing parent surfaces as a [`StoreError`].
    pub(crate) fn create_disable_file(&self, scope: &Scope) -> Result<bool, StoreError> {
        let path = self.marker_path(scope);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(StoreError { path, source }),
        }
    }
}
