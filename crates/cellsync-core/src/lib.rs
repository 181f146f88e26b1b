//! cellsync-core library.
//!
//! Authoritative state of one notebook cell and its loop-free synchronization
//! with a shared collaborative document.
//!
//! ```text
//! guard ─┐
//! metadata::alias ─┤
//! outputs ─────────┼─▶ model::CellRecord ─▶ engine::SyncEngine ◀─ shared::SharedCell
//! execution ───────┘
//! ```
//!
//! # Conventions
//!
//! - **Errors**: Library operations return `Result<_, error::SyncError>`;
//!   configuration loading uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`debug!` for sync traffic, `trace!`
//!   for suppressed echoes, `warn!` for recovered malformed input).

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod guard;
pub mod metadata;
pub mod model;
pub mod nbformat;
pub mod outputs;
pub mod shared;

pub use engine::{SyncEngine, SyncStats};
pub use error::{ErrorCode, SyncError};
pub use model::{CellKind, CellRecord};
pub use shared::{MemorySharedCell, SharedCell, SharedChange};
