//! Streaming a converted artifact back to the client.
//!
//! The output file is read in fixed-size chunks as the client consumes them,
//! so a large PDF never sits in memory whole. The [`ArtifactGuard`] rides
//! inside the stream state: when the stream finishes, errors, or is dropped
//! because the client went away, the state is dropped and both temp artifacts
//! are deleted.

use crate::convert::ConvertedDocument;
use crate::pipeline::store::ArtifactGuard;
use bytes::{Bytes, BytesMut};
use futures::{stream, Stream};
use std::io;
use std::pin::Pin;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// A boxed stream of output chunks.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

// Field order matters: the file closes before the guard deletes it.
struct ReadState {
    file: tokio::fs::File,
    chunk_bytes: usize,
    remaining: u64,
    guard: ArtifactGuard,
}

impl ConvertedDocument {
    /// Turn the document into a body stream that owns its cleanup.
    pub fn into_stream(self) -> ArtifactStream {
        let state = ReadState {
            file: self.file,
            chunk_bytes: self.chunk_bytes,
            remaining: self.len,
            guard: self.guard,
        };

        Box::pin(stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            if state.remaining == 0 {
                debug!(request_id = %state.guard.request_id(), "Response body complete");
                return None;
            }

            let want = state.remaining.min(state.chunk_bytes as u64) as usize;
            let mut buf = BytesMut::zeroed(want);
            match state.file.read(&mut buf).await {
                Ok(0) => {
                    warn!(
                        request_id = %state.guard.request_id(),
                        missing = state.remaining,
                        "Output artifact shrank while streaming"
                    );
                    Some((
                        Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "converted file ended early",
                        )),
                        None,
                    ))
                }
                Ok(n) => {
                    buf.truncate(n);
                    state.remaining -= n as u64;
                    Some((Ok(buf.freeze()), Some(state)))
                }
                Err(e) => {
                    warn!(request_id = %state.guard.request_id(), "Failed to read output: {}", e);
                    Some((Err(e), None))
                }
            }
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use crate::config::{CommandTemplate, ConversionKind, ServiceConfig};
    use crate::convert::{Converter, Upload};
    use crate::pipeline::validate::DeclaredSize;
    use futures::{stream, StreamExt};
    use std::path::Path;

    async fn converted(root: &Path, payload: &'static [u8]) -> crate::convert::ConvertedDocument {
        let config = ServiceConfig::builder()
            .temp_dir(root)
            .stream_chunk_bytes(1024)
            .doc_converter(CommandTemplate::new(
                "/bin/sh",
                ["-c", r#"cp "$1" "$2""#, "stub", "{input}", "{output}"],
            ))
            .build()
            .unwrap();
        let conv = Converter::new(config).await.unwrap();
        conv.convert_upload(
            ConversionKind::DocToDocx,
            Upload {
                filename: "big.doc".to_string(),
                declared_size: DeclaredSize::Exact(payload.len() as u64),
                body: stream::iter(vec![Ok::<_, String>(payload)]),
            },
        )
        .await
        .unwrap()
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    static PAYLOAD: [u8; 5000] = [7u8; 5000];

    #[tokio::test]
    async fn streams_whole_file_in_chunks_then_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let doc = converted(dir.path(), &PAYLOAD).await;
        let mut body = doc.into_stream();

        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 1024);
            collected.extend_from_slice(&chunk);
            chunks += 1;
        }

        assert_eq!(collected, PAYLOAD);
        assert!(chunks >= 5);
        drop(body);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn exhausted_stream_already_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let doc = converted(dir.path(), b"tiny").await;
        let mut body = doc.into_stream();

        while body.next().await.is_some() {}
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn dropping_stream_midway_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let doc = converted(dir.path(), &PAYLOAD).await;
        let mut body = doc.into_stream();

        let first = body.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert_eq!(entries(dir.path()), 2);

        drop(body);
        assert_eq!(entries(dir.path()), 0);
    }
}
