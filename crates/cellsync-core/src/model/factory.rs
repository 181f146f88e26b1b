use serde_json::{Map, Value};

use super::attachments::Attachments;
use crate::error::SyncError;
use crate::outputs::{OutputLedger, OutputRecord};

/// Creates the kind-specific sub-stores of a cell.
///
/// Injected at construction; hosts use it to supply instrumented or
/// pre-validated stores.
pub trait ContentFactory {
    fn create_output_ledger(&self, values: Vec<OutputRecord>, trusted: bool) -> OutputLedger;

    /// # Errors
    ///
    /// Returns [`SyncError::MalformedCell`] when the attachment JSON is not a
    /// map of MIME bundles.
    fn create_attachments(&self, values: Option<&Map<String, Value>>)
    -> Result<Attachments, SyncError>;
}

/// Plain in-memory stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentFactory;

impl ContentFactory for DefaultContentFactory {
    fn create_output_ledger(&self, values: Vec<OutputRecord>, trusted: bool) -> OutputLedger {
        OutputLedger::new(values, trusted)
    }

    fn create_attachments(
        &self,
        values: Option<&Map<String, Value>>,
    ) -> Result<Attachments, SyncError> {
        values.map_or_else(|| Ok(Attachments::new()), Attachments::from_json)
    }
}
