use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::ErrorCode;

/// The three nbformat cell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl CellKind {
    pub const ALL: [Self; 3] = [Self::Code, Self::Markdown, Self::Raw];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Raw => "raw",
        }
    }

    /// Code cells carry the execution facet; the others carry attachments.
    #[must_use]
    pub const fn is_code(self) -> bool {
        matches!(self, Self::Code)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a cell type from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseKindError {
    pub got: String,
}

impl ParseKindError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidCellKind
    }
}

impl fmt::Display for ParseKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cell type: '{}'", self.got)
    }
}

impl std::error::Error for ParseKindError {}

impl FromStr for CellKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "markdown" => Ok(Self::Markdown),
            "raw" => Ok(Self::Raw),
            _ => Err(ParseKindError { got: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CellKind;
    use std::str::FromStr;

    #[test]
    fn display_parse_roundtrips() {
        for kind in CellKind::ALL {
            assert_eq!(CellKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert_eq!(CellKind::from_str(" Markdown ").unwrap(), CellKind::Markdown);
    }

    #[test]
    fn json_form_is_lowercase() {
        assert_eq!(serde_json::to_string(&CellKind::Raw).unwrap(), "\"raw\"");
        assert_eq!(
            serde_json::from_str::<CellKind>("\"code\"").unwrap(),
            CellKind::Code
        );
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let err = CellKind::from_str("heading").unwrap_err();
        assert_eq!(err.to_string(), "invalid cell type: 'heading'");
        assert_eq!(err.code().code(), "E2002");
    }
}
