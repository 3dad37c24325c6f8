//! coursegate - Purchase-gated static course content server
//!
//! Courses are static HTML trees uploaded as ZIP archives and served
//! behind an entitlement check.
//!
//! # Architecture
//!
//! - Content lives on disk under a per-group directory; uploads replace
//!   a group's whole tree atomically, so readers never see a half-
//!   extracted course.
//! - Access is fail-closed: a request is served only when the
//!   entitlement oracle positively confirms the purchase (admins
//!   excepted).
//! - Course metadata (slug, content group, default route) lives in a
//!   small SQLite registry.
//!
//! # Modules
//!
//! - `store`: content-store path resolution and atomic tree replacement
//! - `ingest`: ZIP validation and extraction
//! - `access`: identities, the entitlement oracle, and the gate
//! - `registry`: course metadata and its SQLite store
//! - `server`: the axum HTTP surface
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Register a course and ingest its content
//! coursegate course add intro-to-rust --content-group 1042
//! coursegate ingest course.zip --course intro-to-rust
//!
//! # Serve
//! coursegate serve --bind 0.0.0.0:8080
//! ```

pub mod access;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod registry;
pub mod server;
pub mod store;

// Re-export main types at crate root for convenience
pub use access::{EntitlementOracle, Gate, HttpOracle, Identity, StaticOracle, UserInfo};
pub use error::{Error, Result};
pub use ingest::{ArchiveIngestor, UploadJob};
pub use registry::{Course, CourseId, CourseStore};
pub use server::{AppState, ServerConfig};
pub use store::{ContentStore, ResolvedFile};
