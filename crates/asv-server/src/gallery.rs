use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AdminError, AdminResult};
use crate::sanitize::{extension, sanitize_filename};

/// Extensions treated as gallery images. Matches the image upload allow-list.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

pub fn is_image(name: &str) -> bool {
    extension(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ClearReport {
    pub deleted_count: usize,
    pub failed: Vec<String>,
}

/// Image files living in the uploads directory.
#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image filenames, most recently modified first.
    pub fn list(&self) -> AdminResult<Vec<String>> {
        let mut found: Vec<(SystemTime, String)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_image(&name) {
                continue;
            }
            // Removed since `read_dir` saw it, e.g. by a concurrent delete.
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((mtime, name));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    /// Remove one image. Names that are not images are reported as missing.
    pub fn delete(&self, filename: &str) -> AdminResult<()> {
        let name = sanitize_filename(filename)?;
        if !is_image(&name) {
            return Err(AdminError::NotFound(name));
        }
        match std::fs::remove_file(self.dir.join(&name)) {
            Ok(()) => {
                debug!(filename = %name, "removed image");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AdminError::NotFound(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every image file, collecting the names that could not be removed.
    pub fn clear(&self) -> AdminResult<ClearReport> {
        let mut report = ClearReport::default();
        for name in self.list()? {
            match std::fs::remove_file(self.dir.join(&name)) {
                Ok(()) => report.deleted_count += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(filename = %name, error = %e, "failed to remove image");
                    report.failed.push(name);
                }
            }
        }
        Ok(report)
    }
}
