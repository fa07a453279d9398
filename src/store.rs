use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, NamedTempFile};

use crate::error::ChartError;

/// Download directory holding chart images and their sidecars.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Relative template output lands under the root; absolute paths are kept.
    pub fn resolve(&self, rendered: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(rendered);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn ensure_root(&self) -> Result<(), ChartError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ChartError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    fn ensure_parent(path: &Utf8Path) -> Result<&Utf8Path, ChartError> {
        let parent = path
            .parent()
            .ok_or_else(|| ChartError::Filesystem(format!("invalid destination path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ChartError::Filesystem(format!("create {parent}: {err}")))?;
        Ok(parent)
    }

    /// Temporary file next to `target`, removed automatically unless persisted.
    pub fn partial_file(target: &Utf8Path) -> Result<NamedTempFile, ChartError> {
        let parent = Self::ensure_parent(target)?;
        Builder::new()
            .prefix(".wxchart-")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ChartError::Filesystem(format!("create partial for {target}: {err}")))
    }

    /// Moves a finished partial file into place without replacing an existing file.
    pub fn persist_new(partial: NamedTempFile, target: &Utf8Path) -> Result<(), ChartError> {
        partial
            .persist_noclobber(target.as_std_path())
            .map(|_| ())
            .map_err(|err| ChartError::Filesystem(format!("persist {target}: {}", err.error)))
    }

    pub fn remove_file(path: &Utf8Path) -> Result<(), ChartError> {
        fs::remove_file(path.as_std_path())
            .map_err(|err| ChartError::Filesystem(format!("remove {path}: {err}")))
    }

    pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<(), ChartError> {
        let parent = Self::ensure_parent(path)?;
        let temp = Builder::new()
            .prefix(".wxchart-")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ChartError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content.as_bytes())
            .map_err(|err| ChartError::Filesystem(format!("write {path}: {err}")))?;
        temp.persist(path.as_std_path())
            .map_err(|err| ChartError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }
}
