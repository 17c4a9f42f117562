//! Upload validation: size ceiling and filename extension.
//!
//! Runs before any byte of the file body is read, so oversized or
//! wrong-type uploads are refused without touching the disk. The rules are
//! checked in a fixed order and the first failure wins:
//!
//! 1. the declared size must be known and within the ceiling;
//! 2. the filename's extension (case-insensitive) must match the endpoint.
//!
//! An upper bound on the size (the whole request's length) only proves the
//! size is known. The file's exact length is settled by the store's byte
//! ceiling while it writes.

use crate::error::ConvertError;
use std::path::Path;

/// What the client told us about the file's size before sending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredSize {
    /// Exact file length, e.g. a multipart part's own `Content-Length`.
    Exact(u64),
    /// Upper bound including framing, e.g. the request's `Content-Length`.
    AtMost(u64),
    /// No size information at all.
    Unknown,
}

/// Check an upload against the size ceiling and required extension.
///
/// `required_extension` is lower-case with a leading dot, e.g. `".doc"`.
pub fn validate_upload(
    declared_size: DeclaredSize,
    filename: &str,
    required_extension: &'static str,
    max_bytes: u64,
) -> Result<(), ConvertError> {
    match declared_size {
        DeclaredSize::Unknown => return Err(ConvertError::UnknownSize { limit: max_bytes }),
        DeclaredSize::Exact(size) if size > max_bytes => {
            return Err(ConvertError::UploadTooLarge { limit: max_bytes })
        }
        DeclaredSize::Exact(_) | DeclaredSize::AtMost(_) => {}
    }

    match extension_of(filename) {
        Some(ext) if ext == required_extension => Ok(()),
        _ => Err(ConvertError::InvalidFileType {
            expected: required_extension,
        }),
    }
}

/// Lower-cased extension of `filename` including the leading dot.
///
/// Dot-files such as `.doc` have no extension, matching how most path
/// libraries treat them.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// Stem of the client-supplied filename, used only for the download name.
///
/// Falls back to `"document"` when the name has no usable stem.
pub fn original_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "document".to_string())
}
