//! Temp artifact store: one directory, one file per artifact.
//!
//! Every artifact lives at `{root}/{request_id}{extension}`. The path is
//! derived only from the request's [`RequestId`] and a fixed extension, never
//! from the client's filename, so concurrent requests cannot collide and a
//! hostile filename cannot escape the root.
//!
//! Deletion is owned by [`ArtifactGuard`]. The orchestrator creates one guard
//! per request covering both the input and output paths; whichever way the
//! request ends, the guard is dropped exactly once and removes whatever files
//! exist at that moment.

use crate::error::ConvertError;
use futures::{Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique per-request token that namespaces all on-disk artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Mint a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Filesystem-backed store for per-request artifacts.
#[derive(Debug, Clone)]
pub struct TempStore {
    root: PathBuf,
}

impl TempStore {
    /// Open the store, creating `root` if it does not exist.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ConvertError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ConvertError::io("create the temp directory", e))?;
        debug!("Temp store ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `id` with the given extension (e.g. `".doc"`).
    pub fn artifact_path(&self, id: RequestId, extension: &str) -> PathBuf {
        self.root.join(format!("{id}{extension}"))
    }

    /// Stream an upload body into the input artifact for `id`.
    ///
    /// Bytes are written chunk by chunk as they arrive; the body is never
    /// buffered whole. If the running total exceeds `limit` the write stops
    /// immediately, the partial file is removed and
    /// [`ConvertError::UploadTooLarge`] is returned. A body read error maps to
    /// [`ConvertError::MalformedUpload`] and also removes the partial file.
    pub async fn write_input<S, B, E>(
        &self,
        id: RequestId,
        extension: &str,
        body: S,
        limit: u64,
    ) -> Result<(PathBuf, u64), ConvertError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let path = self.artifact_path(id, extension);
        match write_chunks(&path, body, limit).await {
            Ok(written) => {
                debug!(request_id = %id, bytes = written, "Stored input {}", path.display());
                Ok((path, written))
            }
            Err(e) => {
                remove_artifact(&path);
                Err(e)
            }
        }
    }

    /// Open an artifact for streaming, returning the handle and its size.
    pub async fn read_output(&self, path: &Path) -> Result<(tokio::fs::File, u64), ConvertError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ConvertError::io("open the converted file", e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| ConvertError::io("read the converted file", e))?
            .len();
        Ok((file, len))
    }

    /// Remove artifacts. Never fails; see [`remove_artifact`].
    pub fn delete(&self, paths: &[&Path]) {
        for path in paths {
            remove_artifact(path);
        }
    }
}

async fn write_chunks<S, B, E>(path: &Path, body: S, limit: u64) -> Result<u64, ConvertError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| ConvertError::io("save the uploaded file", e))?;

    let mut body = std::pin::pin!(body);
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ConvertError::MalformedUpload(e.to_string()))?;
        let bytes = chunk.as_ref();
        written += bytes.len() as u64;
        if written > limit {
            return Err(ConvertError::UploadTooLarge { limit });
        }
        file.write_all(bytes)
            .await
            .map_err(|e| ConvertError::io("save the uploaded file", e))?;
    }

    file.flush()
        .await
        .map_err(|e| ConvertError::io("save the uploaded file", e))?;
    Ok(written)
}

/// Remove one artifact, tolerating a file that is already gone.
///
/// Any other failure is logged and swallowed: cleanup never changes the
/// outcome of the request that owns the artifact.
///
/// This is a synchronous `unlink`. It is called from `Drop`, which cannot
/// await, and runs inline on whichever runtime worker drops the guard. That is
/// at most two unlinks per request, and the files are gone when drop returns.
pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

/// Deletes a request's artifacts when dropped.
///
/// Dropping is the only way to trigger cleanup, so it happens exactly once
/// per guard. Move the guard into whatever outlives the handler (the
/// response body stream) to postpone cleanup until that value is dropped.
#[derive(Debug)]
pub struct ArtifactGuard {
    request_id: RequestId,
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    pub fn new(request_id: RequestId, paths: Vec<PathBuf>) -> Self {
        Self { request_id, paths }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for ArtifactGuard {
    // Inline, not handed to `spawn_blocking`: callers rely on the paths being
    // gone once the guard is.
    fn drop(&mut self) {
        for path in &self.paths {
            remove_artifact(path);
        }
        debug!(request_id = %self.request_id, "Artifacts cleaned up");
    }
}
