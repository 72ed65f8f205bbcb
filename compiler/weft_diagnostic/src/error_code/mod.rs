//! Error codes for middle-end diagnostics.
//!
//! Each code is a unique identifier (e.g., `E7001`) whose first digit names
//! the compiler phase.

use std::fmt;

/// Error codes.
///
/// Format: E#### where first digit indicates phase:
/// - E7xxx: Iterator lowering errors
/// - E9xxx: Internal compiler errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Iterator Lowering Errors (E7xxx)
    /// Parallel construct inside a serial iterator
    E7001,
    /// `on` block inside a serial iterator
    E7002,

    // Internal Errors (E9xxx)
    /// Internal compiler error
    E9001,
    /// Too many errors
    E9002,
}

impl ErrorCode {
    /// All codes, in declaration order.
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::E7001,
        ErrorCode::E7002,
        ErrorCode::E9001,
        ErrorCode::E9002,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E7001 => "E7001",
            ErrorCode::E7002 => "E7002",
            ErrorCode::E9001 => "E9001",
            ErrorCode::E9002 => "E9002",
        }
    }

    /// Short description used by `--explain` style listings.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E7001 => "parallel construct in serial iterator",
            ErrorCode::E7002 => "'on' block in serial iterator",
            ErrorCode::E9001 => "internal compiler error",
            ErrorCode::E9002 => "too many errors",
        }
    }

    pub fn is_iterator_error(&self) -> bool {
        matches!(self, ErrorCode::E7001 | ErrorCode::E7002)
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, ErrorCode::E9001 | ErrorCode::E9002)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse an error code string like `"E7001"`. Case-insensitive.
impl std::str::FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(())
    }
}
