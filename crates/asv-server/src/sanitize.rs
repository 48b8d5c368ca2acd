use crate::error::{AdminError, AdminResult};

/// Longest filename accepted after sanitization.
pub const MAX_FILENAME_LEN: usize = 100;

/// Reduce a user-supplied name to a safe single path component.
///
/// Only the final segment (after the last `/` or `\`) is kept, and every
/// character outside `[A-Za-z0-9._-]` is dropped.
pub fn sanitize_filename(raw: &str) -> AdminResult<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let clean: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        return Err(AdminError::InvalidFilename);
    }
    if clean.len() > MAX_FILENAME_LEN {
        return Err(AdminError::FilenameTooLong {
            max: MAX_FILENAME_LEN,
        });
    }
    Ok(clean)
}

/// Lower-cased extension of `name`, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
