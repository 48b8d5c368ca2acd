//! Upload validation: content-type allow-list and size ceiling, checked
//! against the whole buffered body before anything is written.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{AdminError, AdminResult};
use crate::sanitize::sanitize_filename;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// What a given upload endpoint accepts.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub allowed_types: &'static [&'static str],
    pub max_mb: u64,
}

impl UploadPolicy {
    pub const fn image() -> Self {
        Self {
            allowed_types: &["image/jpeg", "image/png", "image/webp"],
            max_mb: 10,
        }
    }

    pub const fn csv() -> Self {
        Self {
            allowed_types: &["text/csv", "application/csv", "text/plain"],
            max_mb: 5,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_mb * BYTES_PER_MB
    }

    /// Policy named by the legacy `type` selector. Anything but `csv` is an image.
    pub fn for_kind(kind: &str) -> Self {
        if kind.trim().eq_ignore_ascii_case("csv") {
            Self::csv()
        } else {
            Self::image()
        }
    }

    /// Compares the media type only; parameters like `charset` are ignored.
    pub fn allows(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        self.allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(essence))
    }
}

/// Filename and content-type checks, run on the part headers before any
/// bytes are read. Passes if any of `policies` accepts the type.
pub fn check_declared(
    filename: &str,
    content_type: Option<&str>,
    policies: &[UploadPolicy],
) -> AdminResult<String> {
    let name = sanitize_filename(filename)?;

    let content_type = content_type.unwrap_or_default();
    if !policies.iter().any(|p| p.allows(content_type)) {
        return Err(AdminError::UnsupportedType(if content_type.is_empty() {
            "missing".into()
        } else {
            content_type.to_owned()
        }));
    }
    Ok(name)
}

/// Validate and persist one uploaded file into `target_dir`.
///
/// Returns the sanitized filename. An existing file with the same name is
/// overwritten.
pub fn save_upload<R: Read>(
    target_dir: &Path,
    filename: &str,
    content_type: Option<&str>,
    policy: &UploadPolicy,
    reader: R,
) -> AdminResult<String> {
    let name = check_declared(filename, content_type, std::slice::from_ref(policy))?;

    // One byte past the ceiling is enough to know the file is too large.
    let limit = policy.max_bytes();
    let mut buf = Vec::new();
    reader.take(limit + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        return Err(AdminError::FileTooLarge {
            max_mb: policy.max_mb,
        });
    }

    std::fs::write(target_dir.join(&name), &buf)?;
    debug!(filename = %name, bytes = buf.len(), "wrote upload");
    Ok(name)
}
