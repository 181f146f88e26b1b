//! Typed cell data model.
//!
//! A single [`CellRecord`] type covers all three nbformat kinds. Kind-specific
//! state lives in a facet: code cells carry outputs plus an execution tracker,
//! markdown and raw cells carry attachments.

pub mod attachments;
pub mod cell;
pub mod factory;
pub mod kind;

pub use attachments::{Attachments, MimeBundle};
pub use cell::{CellRecord, ExecutionFacet, LocalChange};
pub use factory::{ContentFactory, DefaultContentFactory};
pub use kind::{CellKind, ParseKindError};
