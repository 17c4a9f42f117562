//! Error types for the office-convert service.
//!
//! Every failure a conversion request can hit is a [`ConvertError`]. The
//! variants fall into four classes that decide the HTTP status and the short
//! label used in logs:
//!
//! * **validation**: the client sent something we refuse (too large, unknown
//!   size, wrong extension, malformed multipart). Maps to `400`.
//! * **io**: local temp storage failed. Maps to `500`.
//! * **conversion_failed**: the external converter could not start, exited
//!   non-zero, or exited cleanly without producing output. Maps to `500`.
//! * **timeout**: the converter overran its deadline and was killed. Maps
//!   to `500`.
//!
//! The `Display` text is for logs and may name programs or OS errors.
//! [`ConvertError::client_message`] is what goes over the wire.

use thiserror::Error;

/// All errors returned by the conversion pipeline.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Declared or streamed upload size is above the configured ceiling.
    #[error("File size exceeds the maximum limit of {limit} bytes.")]
    UploadTooLarge { limit: u64 },

    /// The request carried no usable size information.
    #[error("File size is unknown; uploads must declare a size of at most {limit} bytes.")]
    UnknownSize { limit: u64 },

    /// Filename extension does not match the endpoint.
    #[error("Invalid file type. Only {expected} files are allowed.")]
    InvalidFileType { expected: &'static str },

    /// No multipart field named `file` with a filename was sent.
    #[error("No file uploaded. Send the document in the multipart field 'file'.")]
    MissingFile,

    /// The multipart body could not be read.
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// A temp-store operation failed.
    #[error("Failed to {action}: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The converter process could not be spawned at all.
    #[error("Converter '{program}' could not be started: {source}")]
    ConverterStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The converter ran and reported failure.
    #[error("Converter '{program}' failed with {detail}")]
    ConverterFailed { program: String, detail: String },

    /// The converter exited successfully but left no usable output artifact.
    #[error("Converter '{program}' exited successfully but produced no output")]
    MissingOutput { program: String },

    /// The converter overran its deadline and was killed.
    #[error("Converter '{program}' timed out after {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Io,
    ConversionFailed,
    Timeout,
}

impl ErrorKind {
    /// Stable label used in structured logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Io => "io",
            ErrorKind::ConversionFailed => "conversion_failed",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl ConvertError {
    pub(crate) fn io(action: &'static str, source: std::io::Error) -> Self {
        ConvertError::Io { action, source }
    }

    /// Which of the four failure classes this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UploadTooLarge { .. }
            | ConvertError::UnknownSize { .. }
            | ConvertError::InvalidFileType { .. }
            | ConvertError::MissingFile
            | ConvertError::MalformedUpload(_) => ErrorKind::Validation,
            ConvertError::Io { .. } | ConvertError::InvalidConfig(_) => ErrorKind::Io,
            ConvertError::ConverterStart { .. }
            | ConvertError::ConverterFailed { .. }
            | ConvertError::MissingOutput { .. } => ErrorKind::ConversionFailed,
            ConvertError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// `true` when the client is at fault (HTTP 400).
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Short, human-readable message safe to return to the client.
    ///
    /// Validation messages are returned verbatim. Server-side failures keep
    /// their classification but drop program names, paths and OS detail.
    pub fn client_message(&self) -> String {
        match self {
            ConvertError::Io { action, .. } => format!("Failed to {action}."),
            ConvertError::ConverterStart { .. } => {
                "File conversion failed: the converter could not be started.".to_string()
            }
            ConvertError::ConverterFailed { detail, .. } => {
                format!("File conversion failed: the converter exited with {detail}.")
            }
            ConvertError::MissingOutput { .. } => {
                "File conversion failed: the converter produced no output.".to_string()
            }
            ConvertError::Timeout { secs, .. } => {
                format!("File conversion timed out after {secs} seconds.")
            }
            ConvertError::InvalidConfig(_) => "Service is misconfigured.".to_string(),
            other => other.to_string(),
        }
    }
}
