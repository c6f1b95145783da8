use crate::util::Position;
use std::fmt::{Display, Formatter};

/// An error produced while compiling a Dojo program.
///
/// Compilation has no error recovery (§7): the first error found by the
/// scanner or parser aborts the whole `compile()` call and is returned here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The scanner could not match any registered symbol or pattern at the
    /// current position.
    InvalidSyntax {
        line: usize,
        column: usize,
        /// Up to 25 characters from the offending position.
        snippet: String,
    },
    /// The parser received a token outside the set it allows at that point.
    UnexpectedToken {
        found: &'static str,
        line: usize,
        column: usize,
        expected: Vec<&'static str>,
    },
}

impl CompileError {
    pub fn invalid_syntax(position: Position, snippet: &str) -> Self {
        let snippet: String = snippet.chars().take(25).collect();
        Self::InvalidSyntax {
            line: position.line,
            column: position.column,
            snippet,
        }
    }

    pub fn unexpected_token(
        found: &'static str,
        position: Position,
        expected: Vec<&'static str>,
    ) -> Self {
        Self::UnexpectedToken {
            found,
            line: position.line,
            column: position.column,
            expected,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::InvalidSyntax {
                line,
                column,
                snippet,
            } => write!(
                f,
                "Invalid syntax at line {} column {}: '{}'",
                line, column, snippet
            ),
            CompileError::UnexpectedToken {
                found,
                line,
                column,
                expected,
            } => write!(
                f,
                "Unexpected '{}' at line {} column {}, expected one of: {}",
                found,
                line,
                column,
                expected
                    .iter()
                    .map(|x| format!("'{}'", x))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl std::error::Error for CompileError {}
