use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Name of the persisted admin state file inside the uploads directory.
pub const STATE_FILE: &str = "admin_state.json";

/// Resolve the base data directory.
///
/// Priority:
/// 1. `ASV_DATA_DIR` environment variable
/// 2. Platform-specific app data dir (`~/.local/share/asv/`, etc.)
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("ASV_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path).context("create ASV_DATA_DIR")?;
        return Ok(path);
    }

    let dirs =
        ProjectDirs::from("", "", "asv").context("could not determine platform data directory")?;

    let path = dirs.data_dir().to_owned();
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}

/// The directories the server reads and writes under its base data dir.
#[derive(Debug, Clone)]
pub struct DataDirs {
    /// Uploaded images and CSV files, plus the state file.
    pub uploads: PathBuf,
    /// Static CSV originals, served read-only.
    pub assets: PathBuf,
}

impl DataDirs {
    /// Create `uploads/` and `assets/` under `base` if missing.
    pub fn prepare(base: &Path) -> Result<Self> {
        let uploads = base.join("uploads");
        let assets = base.join("assets");
        std::fs::create_dir_all(&uploads)
            .with_context(|| format!("create uploads dir: {}", uploads.display()))?;
        std::fs::create_dir_all(&assets)
            .with_context(|| format!("create assets dir: {}", assets.display()))?;
        Ok(Self { uploads, assets })
    }

    pub fn state_file(&self) -> PathBuf {
        self.uploads.join(STATE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn prepare_creates_both_dirs() {
        let base = tempdir().unwrap();
        let dirs = DataDirs::prepare(base.path()).unwrap();
        assert!(dirs.uploads.is_dir());
        assert!(dirs.assets.is_dir());
        assert_eq!(dirs.state_file(), base.path().join("uploads").join(STATE_FILE));

        // Idempotent.
        DataDirs::prepare(base.path()).unwrap();
    }
}
