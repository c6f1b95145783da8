//! Positional cursor over the [`Scanner`] (spec.md §4.2).
//!
//! `TokenStream` is the parser's sole way to look at source text: it owns
//! the scan position and exposes `peek`/`maybe`/`next`/`next_if`/`ignore`/
//! `expect_lf_or`, each a thin wrapper over [`Scanner::scan`] plus a cursor
//! advance. It is not re-entrant on the same instance (spec.md §5) --
//! nothing here is `Clone`, by design.

use crate::error::CompileError;
use crate::scanner::{ScanOpts, Scanner, Token, TokenName};
use crate::util::Position;

pub struct TokenStream<'s> {
    scanner: &'s Scanner,
    source: &'s str,
    pos: usize,
    pub line: usize,
    pub column: usize,
}

impl<'s> TokenStream<'s> {
    pub fn new(scanner: &'s Scanner, source: &'s str) -> Self {
        Self {
            scanner,
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Next token without consuming it.
    pub fn peek(&self, opts: ScanOpts) -> Option<Token> {
        self.scanner.scan(self.source, self.pos, self.line, self.column, opts)
    }

    fn peek_or_invalid(&self, opts: ScanOpts) -> Result<Token, CompileError> {
        self.peek(opts).ok_or_else(|| {
            let snippet = &self.source[self.pos..];
            CompileError::invalid_syntax(self.position(), snippet)
        })
    }

    /// Peek, returning the token iff its name is one of `allowed`.
    pub fn maybe(&self, allowed: &[TokenName], opts: ScanOpts) -> Option<Token> {
        let token = self.peek(opts)?;
        if allowed.contains(&token.name) {
            Some(token)
        } else {
            None
        }
    }

    /// Consume the next token. Fails with `InvalidSyntax` if nothing
    /// matches at all, `UnexpectedToken` if it matches but isn't one of
    /// `allowed`.
    pub fn next(&mut self, allowed: &[TokenName], opts: ScanOpts) -> Result<Token, CompileError> {
        let token = self.peek_or_invalid(opts)?;
        if !allowed.contains(&token.name) {
            return Err(CompileError::unexpected_token(
                token.name,
                Position::new(token.line, token.column),
                allowed.to_vec(),
            ));
        }
        self.pos += token.raw_len();
        self.line = token.line;
        self.column = token.column + token.image.chars().count();
        Ok(token)
    }

    /// `maybe` + `next`: consume and return the token iff it matches.
    pub fn next_if(&mut self, allowed: &[TokenName], opts: ScanOpts) -> Option<Token> {
        self.maybe(allowed, opts)?;
        self.next(allowed, opts).ok()
    }

    /// Consume zero or more of `allowed` (e.g. the `;` separators a block
    /// tolerates between expressions).
    pub fn ignore(&mut self, allowed: &[TokenName], opts: ScanOpts) {
        while self.next_if(allowed, opts).is_some() {}
    }

    /// Soft statement terminator: succeeds (without consuming anything) iff
    /// the upcoming token is preceded by a newline or is one of `allowed`.
    /// Used to require `;` or a line break between block expressions
    /// without forcing either on the last one.
    pub fn expect_lf_or(&self, allowed: &[TokenName], opts: ScanOpts) -> Result<(), CompileError> {
        let token = self.peek_or_invalid(opts)?;
        if token.has_lf || allowed.contains(&token.name) {
            return Ok(());
        }
        let mut expected = vec!["NEWLINE"];
        expected.extend_from_slice(allowed);
        Err(CompileError::unexpected_token(
            token.name,
            Position::new(token.line, token.column),
            expected,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::dojo_scanner;

    #[test]
    fn next_advances_position_and_checks_name() {
        let scanner = dojo_scanner();
        let mut ts = TokenStream::new(&scanner, "a+1");
        let id = ts.next(&["IDENTIFIER"], ScanOpts::default()).unwrap();
        assert_eq!(id.image, "a");
        let plus = ts.next(&["+"], ScanOpts::default()).unwrap();
        assert_eq!(plus.image, "+");
        assert_eq!(ts.line, 1);
    }

    #[test]
    fn next_rejects_disallowed_name() {
        let scanner = dojo_scanner();
        let mut ts = TokenStream::new(&scanner, "+1");
        let err = ts.next(&["IDENTIFIER"], ScanOpts::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnexpectedToken { .. }));
    }

    #[test]
    fn expect_lf_or_allows_newline_without_consuming() {
        let scanner = dojo_scanner();
        let mut ts = TokenStream::new(&scanner, "a\nb");
        ts.next(&["IDENTIFIER"], ScanOpts::default()).unwrap();
        ts.expect_lf_or(&[";"], ScanOpts::default()).unwrap();
        // still unconsumed: next token is "b", not affected by expect_lf_or
        let b = ts.next(&["IDENTIFIER"], ScanOpts::default()).unwrap();
        assert_eq!(b.image, "b");
    }

    #[test]
    fn expect_lf_or_rejects_same_line_without_separator() {
        let scanner = dojo_scanner();
        let mut ts = TokenStream::new(&scanner, "a b");
        ts.next(&["IDENTIFIER"], ScanOpts::default()).unwrap();
        let err = ts.expect_lf_or(&[";"], ScanOpts::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnexpectedToken { .. }));
    }
}
