//! # Module directory seam.
//!
//! The engine only needs "which module files exist and when were they last
//! modified". [`FsDirectory`] answers that for `<dir>/*.<extension>`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::ScanError;

/// One eligible module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    /// File path; identity of the module.
    pub path: PathBuf,
    /// Last modification time.
    pub modified: SystemTime,
}

/// Lists module files.
#[async_trait]
pub trait ModuleDirectory: Send + Sync + 'static {
    /// Current listing. Any I/O failure aborts the scan that asked.
    async fn list(&self) -> Result<Vec<ModuleFile>, ScanError>;
}

/// Non-recursive listing of one directory, filtered by extension.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    root: PathBuf,
    extension: String,
}

impl FsDirectory {
    /// Lists `<root>/*.<extension>`; a leading dot in `extension` is ignored.
    pub fn new(root: impl Into<PathBuf>, extension: impl AsRef<str>) -> Self {
        Self {
            root: root.into(),
            extension: extension.as_ref().trim_start_matches('.').to_string(),
        }
    }

    /// Watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn eligible(&self, path: &Path) -> bool {
        path.extension().is_some_and(|e| e == self.extension.as_str())
    }
}

#[async_trait]
impl ModuleDirectory for FsDirectory {
    async fn list(&self) -> Result<Vec<ModuleFile>, ScanError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ScanError::Io { path, source }
        };

        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(io_err(&self.root))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&self.root))? {
            let path = entry.path();
            if !self.eligible(&path) {
                continue;
            }
            let meta = tokio::fs::metadata(&path).await.map_err(io_err(&path))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().map_err(io_err(&path))?;
            files.push(ModuleFile { path, modified });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}
