//! HTTP surface: routes, multipart extraction and response mapping.
//!
//! ```text
//! GET  /              {"message":"ok"}
//! GET  /ping          {"ping":"pong"}
//! GET  /health_check  {"status":true}
//! POST /convert       multipart `file` (.doc)  → .docx bytes
//! POST /docx2pdf      multipart `file` (.docx) → PDF bytes
//! ```
//!
//! Every failure is a JSON body `{"error": "..."}` with status 400 for
//! client faults and 500 for everything else.

use crate::config::ConversionKind;
use crate::convert::{ConvertedDocument, Converter, Upload};
use crate::error::ConvertError;
use crate::pipeline::validate::DeclaredSize;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        Self {
            converter: Arc::new(converter),
        }
    }
}

/// Build the service router.
///
/// Axum's default 2 MB body limit is lifted; the upload ceiling is enforced by
/// the pipeline against the configured maximum instead.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ping", get(ping))
        .route("/health_check", get(health_check))
        .route("/convert", post(convert_doc))
        .route("/docx2pdf", post(convert_docx))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "ok" }))
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "ping": "pong" }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": true }))
}

async fn convert_doc(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    handle_upload(&state, ConversionKind::DocToDocx, &headers, multipart).await
}

async fn convert_docx(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    handle_upload(&state, ConversionKind::DocxToPdf, &headers, multipart).await
}

async fn handle_upload(
    state: &AppState,
    kind: ConversionKind,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ConvertError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(%kind, "Rejected non-multipart request: {}", rejection.body_text());
        ConvertError::MalformedUpload(rejection.body_text())
    })?;
    let request_len = content_length(headers);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ConvertError::MalformedUpload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
        else {
            break;
        };

        // A part-level Content-Length is exact. The request's own length
        // includes multipart framing, so it only bounds the file from above.
        let declared_size = match (content_length(field.headers()), request_len) {
            (Some(len), _) => DeclaredSize::Exact(len),
            (None, Some(len)) => DeclaredSize::AtMost(len),
            (None, None) => DeclaredSize::Unknown,
        };
        let upload = Upload {
            filename,
            declared_size,
            body: field,
        };
        let doc = state.converter.convert_upload(kind, upload).await?;
        return Ok(document_response(doc));
    }

    warn!(%kind, "Request carried no '{}' file part", FILE_FIELD);
    Err(ConvertError::MissingFile)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn document_response(doc: ConvertedDocument) -> Response {
    let disposition = HeaderValue::from_str(&content_disposition(doc.download_name()))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let headers = [
        (CONTENT_TYPE, HeaderValue::from_static(doc.media_type())),
        (CONTENT_LENGTH, HeaderValue::from(doc.len())),
        (CONTENT_DISPOSITION, disposition),
    ];
    (StatusCode::OK, headers, Body::from_stream(doc.into_stream())).into_response()
}

/// RFC 5987 `attr-char`: everything outside this set is percent-encoded.
const FILENAME_STAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// `attachment` disposition for `name`.
///
/// Plain ASCII names go out as a quoted `filename`. Anything else also gets a
/// UTF-8 `filename*`, with an ASCII-safe `filename` fallback for old clients.
fn content_disposition(name: &str) -> String {
    let fallback = ascii_fallback(name);
    if fallback == name {
        return format!("attachment; filename=\"{name}\"");
    }
    format!(
        "attachment; filename=\"{fallback}\"; filename*=utf-8''{}",
        utf8_percent_encode(name, FILENAME_STAR)
    )
}

/// Reduce a download name to characters safe inside a quoted header value.
fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_use_only_quoted_filename() {
        assert_eq!(
            content_disposition("Quarterly report (v2).docx"),
            "attachment; filename=\"Quarterly report (v2).docx\""
        );
    }

    #[test]
    fn unicode_names_keep_their_stem_in_filename_star() {
        assert_eq!(
            content_disposition("résumé.docx"),
            "attachment; filename=\"r_sum_.docx\"; filename*=utf-8''r%C3%A9sum%C3%A9.docx"
        );
    }

    #[test]
    fn quotes_and_separators_never_reach_the_quoted_form() {
        let header = content_disposition("a\"b/c\\d\r\n.pdf");
        assert!(header.starts_with("attachment; filename=\"a_b_c_d__.pdf\"; filename*="));
        assert!(header.ends_with("a%22b%2Fc%5Cd%0D%0A.pdf"), "got {header}");
        assert!(HeaderValue::from_str(&header).is_ok());
    }

    #[test]
    fn content_length_parses_and_ignores_garbage() {
        let mut h = HeaderMap::new();
        assert_eq!(content_length(&h), None);
        h.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&h), Some(42));
        h.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&h), None);
    }

    #[test]
    fn error_status_follows_kind() {
        let bad = ConvertError::InvalidFileType { expected: ".doc" }.into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let slow = ConvertError::Timeout {
            program: "Wordconv".into(),
            secs: 1,
        }
        .into_response();
        assert_eq!(slow.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
