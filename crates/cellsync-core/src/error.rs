use std::fmt;

use crate::model::CellKind;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    MalformedCell,
    InvalidCellKind,
    KindMismatch,
    OutputIndexOutOfRange,
    CellDisposed,
    ProtocolViolation,
    InvalidLedgerEvent,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::MalformedCell => "E2001",
            Self::InvalidCellKind => "E2002",
            Self::KindMismatch => "E2003",
            Self::OutputIndexOutOfRange => "E2004",
            Self::CellDisposed => "E2005",
            Self::ProtocolViolation => "E3001",
            Self::InvalidLedgerEvent => "E3002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedCell => "Malformed notebook cell",
            Self::InvalidCellKind => "Invalid cell type",
            Self::KindMismatch => "Operation not valid for this cell type",
            Self::OutputIndexOutOfRange => "Output index out of range",
            Self::CellDisposed => "Cell has been disposed",
            Self::ProtocolViolation => "Shared document protocol violation",
            Self::InvalidLedgerEvent => "Invalid ledger event",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .cellsync/config.toml and retry."),
            Self::MalformedCell => Some("Check the cell JSON against nbformat 4."),
            Self::InvalidCellKind => Some("Use one of: code, markdown, raw."),
            Self::KindMismatch => {
                Some("Outputs and execution counts exist only on code cells; attachments only on markdown/raw cells.")
            }
            Self::OutputIndexOutOfRange => None,
            Self::CellDisposed => Some("The owning notebook removed this cell; re-fetch it."),
            Self::ProtocolViolation | Self::InvalidLedgerEvent => {
                Some("The shared document and the engine disagree on the event contract; report a bug with logs.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by the cell model and the synchronization engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An event discriminant neither side of the contract knows about.
    #[error("invalid event type: {0}")]
    ProtocolViolation(String),

    /// A list mutation kind the output translator cannot express as a range patch.
    #[error("invalid ledger event: {kind}")]
    InvalidLedgerEvent { kind: &'static str },

    /// Output ledger index outside the current list.
    #[error("output index {index} out of range for ledger of length {len}")]
    OutOfRange { index: usize, len: usize },

    /// A facet operation on a cell kind that does not carry the facet.
    #[error("{kind} cells have no {facet}")]
    KindMismatch { kind: CellKind, facet: &'static str },

    /// Mutation attempted after disposal.
    #[error("cell {id} has been disposed")]
    Disposed { id: String },

    /// External cell representation could not be interpreted.
    #[error("malformed cell: {0}")]
    MalformedCell(String),

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ProtocolViolation(_) => ErrorCode::ProtocolViolation,
            Self::InvalidLedgerEvent { .. } => ErrorCode::InvalidLedgerEvent,
            Self::OutOfRange { .. } => ErrorCode::OutputIndexOutOfRange,
            Self::KindMismatch { .. } => ErrorCode::KindMismatch,
            Self::Disposed { .. } => ErrorCode::CellDisposed,
            Self::MalformedCell(_) | Self::Json(_) => ErrorCode::MalformedCell,
        }
    }

    /// Protocol violations are contract breaches, never recovered.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::InvalidLedgerEvent { .. }
        )
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, SyncError};
    use crate::model::CellKind;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::MalformedCell,
            ErrorCode::InvalidCellKind,
            ErrorCode::KindMismatch,
            ErrorCode::OutputIndexOutOfRange,
            ErrorCode::CellDisposed,
            ErrorCode::ProtocolViolation,
            ErrorCode::InvalidLedgerEvent,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::InvalidLedgerEvent.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn ledger_error_message_matches_contract() {
        let err = SyncError::InvalidLedgerEvent { kind: "move" };
        assert_eq!(err.to_string(), "invalid ledger event: move");
        assert!(err.is_fatal());
        assert_eq!(err.code(), ErrorCode::InvalidLedgerEvent);
    }

    #[test]
    fn kind_mismatch_is_recoverable() {
        let err = SyncError::KindMismatch {
            kind: CellKind::Markdown,
            facet: "outputs",
        };
        assert_eq!(err.to_string(), "markdown cells have no outputs");
        assert!(!err.is_fatal());
        assert!(err.hint().is_some());
    }
}
