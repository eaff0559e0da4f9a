//! Workspace manager for the shared scratch directory.
//!
//! The workspace holds serialized figure files between an execution and
//! their delivery. The directory itself lives for the whole process; its
//! contents are request-scoped by convention: `prepare()` purges the figure
//! files of the previous execution before a new one starts, and files
//! written during a run persist until the next `prepare()` so the
//! `/api/temp` boundary can still stream them out.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::errors::{EngineError, Result};
use crate::plot;

/// Owns the scratch directory shared by all executions.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create the manager, creating the directory if it does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            EngineError::workspace(format!(
                "could not create workspace directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    /// Path of the scratch directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove every figure file left behind by the previous execution.
    ///
    /// Individual deletion failures are logged and skipped; a single stuck
    /// file must not abort the whole execution.
    pub fn prepare(&self) {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "could not list workspace {} for cleanup: {}",
                    self.root.display(),
                    e
                );
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if plot::parse_figure_index(name).is_none() {
                continue;
            }
            if let Err(e) = fs::remove_file(entry.path()) {
                log::warn!("could not remove stale figure {}: {}", name, e);
            }
        }
    }

    /// Read the byte content of a named workspace file for out-of-band
    /// retrieval.
    ///
    /// The filename must be a single plain path component; anything that
    /// could escape the workspace is rejected.
    pub fn read_file(&self, filename: &str) -> Result<Vec<u8>> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(EngineError::InvalidFilename(filename.to_string())),
        }

        let path = self.root.join(filename);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::FileNotFound(filename.to_string()))
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}
