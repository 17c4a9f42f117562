//! Pipeline stages for one conversion request.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestrator in [`crate::convert`] stays a thin sequence of
//! calls.
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ store ──▶ invoke ──▶ (stream)
//! (size/ext)   (disk)    (child)    crate::stream
//! ```
//!
//! 1. [`validate`] - check declared size and filename extension before any
//!    body byte is read
//! 2. [`store`]    - stream the body into a per-request temp artifact and own
//!    its deletion through [`store::ArtifactGuard`]
//! 3. [`invoke`]   - run the external converter with a deadline; the only
//!    stage that spawns processes

pub mod invoke;
pub mod store;
pub mod validate;
