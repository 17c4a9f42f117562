//! Request orchestration: validate → store → invoke → hand back the artifact.
//!
//! [`Converter::convert_upload`] is the single entry point used by every
//! conversion endpoint. It owns the per-request [`ArtifactGuard`] from the
//! moment a [`RequestId`] is minted. On any error the guard is dropped before
//! the function returns, deleting whatever was written. On success the guard
//! travels inside the returned [`ConvertedDocument`] and cleanup happens when
//! the response body built from it is dropped (see [`crate::stream`]).

use crate::config::{ConversionKind, ServiceConfig};
use crate::error::ConvertError;
use crate::pipeline::invoke;
use crate::pipeline::store::{ArtifactGuard, RequestId, TempStore};
use crate::pipeline::validate::{original_stem, validate_upload, DeclaredSize};
use futures::Stream;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of one conversion request.
pub type ConversionOutcome = Result<ConvertedDocument, ConvertError>;

/// An uploaded document as the HTTP layer sees it.
///
/// `body` yields the file's bytes in arrival order and is consumed at most
/// once. `declared_size` is whatever size the client announced up front; it
/// is checked before `body` is polled.
#[derive(Debug)]
pub struct Upload<S> {
    pub filename: String,
    pub declared_size: DeclaredSize,
    pub body: S,
}

/// A finished conversion, ready to be streamed to the client.
///
/// Holds the open output file and the guard that deletes both artifacts.
/// Fields drop in declaration order, so the file handle closes before the
/// guard removes the paths.
#[derive(Debug)]
pub struct ConvertedDocument {
    pub(crate) request_id: RequestId,
    pub(crate) file: tokio::fs::File,
    pub(crate) len: u64,
    pub(crate) media_type: &'static str,
    pub(crate) download_name: String,
    pub(crate) chunk_bytes: usize,
    pub(crate) guard: ArtifactGuard,
}

impl ConvertedDocument {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Size of the output artifact in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Always `false`; empty outputs are rejected as [`ConvertError::MissingOutput`].
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// Suggested download filename: the upload's stem plus the target extension.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }
}

/// Shared, stateless conversion front end.
///
/// Cheap to share behind an `Arc`; holds only read-only configuration and the
/// temp store root. Requests never touch each other's artifacts.
#[derive(Debug)]
pub struct Converter {
    config: Arc<ServiceConfig>,
    store: TempStore,
}

impl Converter {
    /// Create a converter, ensuring the temp directory exists.
    pub async fn new(config: ServiceConfig) -> Result<Self, ConvertError> {
        let store = TempStore::open(&config.temp_dir).await?;
        info!(
            temp_dir = %config.temp_dir.display(),
            max_upload_bytes = config.max_upload_bytes,
            timeout_secs = config.timeout_secs,
            "Converter ready"
        );
        Ok(Self {
            config: Arc::new(config),
            store,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    /// Run one upload through the full pipeline.
    ///
    /// # Errors
    /// * validation errors when the upload is refused (nothing is written)
    /// * [`ConvertError::Io`] when the temp store fails
    /// * [`ConvertError::ConverterStart`], [`ConvertError::ConverterFailed`]
    ///   or [`ConvertError::MissingOutput`] when the converter does not
    ///   deliver
    /// * [`ConvertError::Timeout`] when the converter overruns and is killed
    pub async fn convert_upload<S, B, E>(
        &self,
        kind: ConversionKind,
        upload: Upload<S>,
    ) -> ConversionOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let request_id = RequestId::new();
        let started = Instant::now();
        info!(
            request_id = %request_id,
            %kind,
            filename = %upload.filename,
            declared_size = ?upload.declared_size,
            "Conversion requested"
        );

        let outcome = self.run(request_id, kind, upload).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(doc) => info!(
                request_id = %request_id,
                bytes = doc.len,
                elapsed_ms,
                "Conversion succeeded"
            ),
            Err(e) if e.is_client_error() => warn!(
                request_id = %request_id,
                kind = e.kind().as_str(),
                "Upload rejected: {}", e
            ),
            Err(e) => error!(
                request_id = %request_id,
                kind = e.kind().as_str(),
                elapsed_ms,
                "Conversion failed: {}", e
            ),
        }
        outcome
    }

    async fn run<S, B, E>(
        &self,
        request_id: RequestId,
        kind: ConversionKind,
        upload: Upload<S>,
    ) -> ConversionOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let config = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────
        validate_upload(
            upload.declared_size,
            &upload.filename,
            kind.source_extension(),
            config.max_upload_bytes,
        )?;

        // ── Step 2: Store ────────────────────────────────────────────────
        let input = self.store.artifact_path(request_id, kind.source_extension());
        let output = self.store.artifact_path(request_id, kind.target_extension());
        let guard = ArtifactGuard::new(request_id, vec![input.clone(), output.clone()]);

        let (_, written) = self
            .store
            .write_input(
                request_id,
                kind.source_extension(),
                upload.body,
                config.max_upload_bytes,
            )
            .await?;
        debug!(request_id = %request_id, bytes = written, "Upload stored");

        // ── Step 3: Invoke ───────────────────────────────────────────────
        let template = config.converter_for(kind);
        let run = invoke::run_converter(template, &input, &output, config.timeout()).await?;
        debug!(
            request_id = %request_id,
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Converter exited cleanly"
        );

        // ── Step 4: Open output ──────────────────────────────────────────
        ensure_output(&output, template.program()).await?;
        let (file, len) = self.store.read_output(&output).await?;

        Ok(ConvertedDocument {
            request_id,
            file,
            len,
            media_type: kind.media_type(),
            download_name: format!("{}{}", original_stem(&upload.filename), kind.target_extension()),
            chunk_bytes: config.stream_chunk_bytes,
            guard,
        })
    }
}

/// A converter that exits 0 must still leave a non-empty output file.
async fn ensure_output(output: &Path, program: &str) -> Result<(), ConvertError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(ConvertError::MissingOutput {
            program: program.to_string(),
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::CommandTemplate;
    use futures::stream;

    fn body(data: &'static [u8]) -> impl Stream<Item = Result<&'static [u8], String>> {
        stream::iter(vec![Ok(data)])
    }

    fn upload(name: &str, data: &'static [u8]) -> Upload<impl Stream<Item = Result<&'static [u8], String>>> {
        Upload {
            filename: name.to_string(),
            declared_size: DeclaredSize::Exact(data.len() as u64),
            body: body(data),
        }
    }

    async fn converter(root: &Path, doc: CommandTemplate) -> Converter {
        let config = ServiceConfig::builder()
            .temp_dir(root)
            .timeout_secs(5)
            .doc_converter(doc)
            .build()
            .unwrap();
        Converter::new(config).await.unwrap()
    }

    fn stub(script: &str) -> CommandTemplate {
        CommandTemplate::new("/bin/sh", ["-c", script, "stub", "{input}", "{output}"])
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn success_returns_open_document_and_cleans_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), stub(r#"cp "$1" "$2""#)).await;

        let doc = conv
            .convert_upload(ConversionKind::DocToDocx, upload("Minutes.DOC", b"legacy bytes"))
            .await
            .unwrap();

        assert_eq!(doc.len(), 12);
        assert_eq!(doc.download_name(), "Minutes.docx");
        assert_eq!(doc.media_type(), ConversionKind::DocToDocx.media_type());
        assert_eq!(entries(dir.path()), 2);

        drop(doc);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn download_name_keeps_non_ascii_stem() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), stub(r#"cp "$1" "$2""#)).await;

        let doc = conv
            .convert_upload(ConversionKind::DocToDocx, upload("résumé 2024.doc", b"x"))
            .await
            .unwrap();

        assert_eq!(doc.download_name(), "résumé 2024.docx");
    }

    #[tokio::test]
    async fn request_length_bound_defers_to_byte_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .temp_dir(dir.path())
            .max_upload_bytes(8)
            .doc_converter(stub(r#"cp "$1" "$2""#))
            .build()
            .unwrap();
        let conv = Converter::new(config).await.unwrap();

        let fits = Upload {
            filename: "a.doc".to_string(),
            declared_size: DeclaredSize::AtMost(200),
            body: body(b"12345678"),
        };
        let doc = conv.convert_upload(ConversionKind::DocToDocx, fits).await.unwrap();
        assert_eq!(doc.len(), 8);
        drop(doc);

        let too_big = Upload {
            filename: "a.doc".to_string(),
            declared_size: DeclaredSize::AtMost(200),
            body: body(b"123456789"),
        };
        let err = conv
            .convert_upload(ConversionKind::DocToDocx, too_big)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UploadTooLarge { limit: 8 }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn rejected_upload_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), stub(r#"cp "$1" "$2""#)).await;

        let err = conv
            .convert_upload(ConversionKind::DocToDocx, upload("notes.txt", b"text"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::InvalidFileType { expected: ".doc" }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn failing_converter_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), stub(r#"echo partial > "$2"; exit 2"#)).await;

        let err = conv
            .convert_upload(ConversionKind::DocToDocx, upload("a.doc", b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::ConverterFailed { .. }), "got {err:?}");
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn clean_exit_without_output_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let conv = converter(dir.path(), stub("true")).await;

        let err = conv
            .convert_upload(ConversionKind::DocToDocx, upload("a.doc", b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::MissingOutput { .. }), "got {err:?}");
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn understated_size_is_caught_while_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .temp_dir(dir.path())
            .max_upload_bytes(4)
            .doc_converter(stub(r#"cp "$1" "$2""#))
            .build()
            .unwrap();
        let conv = Converter::new(config).await.unwrap();

        let lying = Upload {
            filename: "a.doc".to_string(),
            declared_size: DeclaredSize::Exact(1),
            body: body(b"far more than four bytes"),
        };
        let err = conv
            .convert_upload(ConversionKind::DocToDocx, lying)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::UploadTooLarge { limit: 4 }));
        assert_eq!(entries(dir.path()), 0);
    }
}
