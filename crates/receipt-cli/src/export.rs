use std::fmt;
use std::path::{Path, PathBuf};

/// Result of handing a rendered receipt to the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved { path: PathBuf, bytes: usize },
    Failed { path: PathBuf, reason: String },
}

impl ExportOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, ExportOutcome::Saved { .. })
    }
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportOutcome::Saved { path, bytes } => {
                write!(f, "Saved receipt to {} ({bytes} bytes)", path.display())
            }
            ExportOutcome::Failed { path, reason } => {
                write!(f, "Could not save receipt to {}: {reason}", path.display())
            }
        }
    }
}

/// Write `surface` to `path`, creating parent directories as needed.
pub fn export_receipt(surface: &str, path: &Path) -> ExportOutcome {
    let written = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(path, surface));
    match written {
        Ok(()) => ExportOutcome::Saved {
            path: path.to_path_buf(),
            bytes: surface.len(),
        },
        Err(e) => ExportOutcome::Failed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    }
}
