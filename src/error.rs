//! Fatal compile errors.
//!
//! Only the compiler produces these; parsing always completes and reports
//! malformed input through [`crate::parse::ParseOutcome::unterminated`]
//! instead. Resolver failures are wrapped with `ERR_DEPENDENCY` by the
//! resolver implementation itself and pass through the compiler untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::SourceLocation;

/// A directive/element callback invoked the error hook.
pub const ERR_CALLBACK: &str = "Q-ERR-CALLBACK";
/// A dependency path could not be resolved to source text.
pub const ERR_DEPENDENCY: &str = "Q-ERR-DEPENDENCY";
/// A directive received an argument count outside its declared arity.
pub const ERR_ARITY: &str = "Q-ERR-ARITY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileError {
    pub code: String,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl CompileError {
    pub fn new(code: &str, message: &str, loc: SourceLocation) -> Self {
        Self::at(code, message, loc.line, loc.column)
    }

    pub fn at(code: &str, message: &str, line: u32, column: u32) -> Self {
        CompileError {
            code: code.to_string(),
            message: message.to_string(),
            line,
            column,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (line {}, column {})",
            self.code, self.message, self.line, self.column
        )
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CompileError::new(ERR_CALLBACK, "boom", SourceLocation::new(3, 7));
        assert_eq!(err.to_string(), "[Q-ERR-CALLBACK] boom (line 3, column 7)");
    }
}
