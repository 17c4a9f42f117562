//! # office-convert
//!
//! A small, stateless HTTP service that converts uploaded Word documents by
//! delegating to external converter programs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! multipart upload
//!  │
//!  ├─ 1. Validate  declared size ≤ ceiling, extension matches endpoint
//!  ├─ 2. Store     stream body to {TMP_DIR}/{request_id}.{ext}
//!  ├─ 3. Invoke    run the converter with a deadline, kill on overrun
//!  ├─ 4. Stream    send the output in chunks with the right media type
//!  └─ 5. Clean up  delete input and output exactly once, on every path
//! ```
//!
//! | Endpoint         | Accepts | Returns |
//! |------------------|---------|---------|
//! | `POST /convert`  | `.doc`  | `.docx` (`application/vnd.openxmlformats-officedocument.wordprocessingml.document`) |
//! | `POST /docx2pdf` | `.docx` | `.pdf` (`application/pdf`) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use office_convert::{router, AppState, Converter, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().temp_dir("/var/tmp/office-convert").build()?;
//!     let app = router(AppState::new(Converter::new(config).await?));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `office-convert` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another server:
//! ```toml
//! office-convert = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CommandTemplate, ConversionKind, ServiceConfig, ServiceConfigBuilder};
pub use convert::{ConversionOutcome, ConvertedDocument, Converter, Upload};
pub use error::{ConvertError, ErrorKind};
pub use pipeline::store::{ArtifactGuard, RequestId, TempStore};
pub use pipeline::validate::DeclaredSize;
pub use server::{router, AppState};
pub use stream::ArtifactStream;
