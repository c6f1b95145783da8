//! Longest-match lexical scanner.
//!
//! A [`Scanner`] is built once from a list of fixed symbols (operators,
//! punctuation, keywords) and a list of named regular-expression patterns
//! (`INTEGER`, `IDENTIFIER`, ...). Scanning tries every registered entry at
//! the current position and keeps whichever produced the longest `image`,
//! exactly as described in spec.md §4.1.
mod token;

pub use token::{Token, TokenName};

use crate::util::{Log, Position};
use once_cell::unsync::OnceCell;
use regex::Regex;

/// Options accepted by [`Scanner::scan`] and threaded through
/// [`TokenStream`](crate::token_stream::TokenStream).
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOpts {
    /// Reject a candidate whose preceding whitespace contains a line feed.
    /// This is how the parser disambiguates `f\n(x)` (two expressions) from
    /// `f(x)` (a call) -- see spec.md §4.1 "LF sensitivity".
    pub stop_on_lf: bool,
}

impl ScanOpts {
    pub fn stop_on_lf() -> Self {
        Self { stop_on_lf: true }
    }
}

struct ScanEntry {
    name: TokenName,
    regex: Regex,
}

/// A longest-match lexical scanner over a fixed set of symbols and named
/// patterns, compiled once at construction.
pub struct Scanner {
    entries: Vec<ScanEntry>,
    log: OnceCell<Log<&'static str>>,
}

impl Scanner {
    /// Build a scanner from fixed symbols (matched literally, a run of
    /// whitespace between the words of a multi-word symbol such as
    /// `"not in"`) and named regex patterns (matched as given).
    ///
    /// Fixed symbols are registered before named patterns, and within each
    /// group in the order given -- this is the tie-break order used when two
    /// candidates match the same length (spec.md §4.1).
    pub fn new(
        fixed: &[&'static str],
        named: &[(&'static str, &str)],
    ) -> Result<Self, String> {
        let mut entries = Vec::with_capacity(fixed.len() + named.len());
        for &symbol in fixed {
            entries.push(ScanEntry {
                name: symbol,
                regex: compile_fixed(symbol)?,
            });
        }
        for &(name, pattern) in named {
            entries.push(ScanEntry {
                name,
                regex: compile_named(pattern)?,
            });
        }
        Ok(Self {
            entries,
            log: OnceCell::new(),
        })
    }

    pub fn set_log(&self, log: Log<&'static str>) -> Result<(), String> {
        self.log
            .set(log)
            .map_err(|err| format!("Log label {} is already assigned.", err))
    }

    /// Try every registered entry at `pos` and return the longest match, or
    /// `None` if nothing matched (an [`InvalidSyntax`](crate::error::CompileError)
    /// for the caller to report).
    pub fn scan(&self, source: &str, pos: usize, line: usize, column: usize, opts: ScanOpts) -> Option<Token> {
        let mut best: Option<Token> = None;
        let rest = &source[pos..];

        for entry in &self.entries {
            let Some(caps) = entry.regex.captures(rest) else {
                continue;
            };
            let whites = caps.get(1).unwrap().as_str();
            let image = caps.get(2).unwrap().as_str();
            if image.is_empty() && entry.name != "EOF" {
                continue;
            }

            let t_line = line + whites.matches('\n').count();
            let t_column = match whites.rfind('\n') {
                Some(at) => whites[at + 1..].chars().count() + 1,
                None => column + whites.chars().count(),
            };

            let candidate = Token::new(
                entry.name,
                whites.to_string(),
                image.to_string(),
                pos,
                t_line,
                t_column,
            );

            #[cfg(debug_assertions)]
            self.trace(&candidate);

            best = best_of(best, candidate, opts);
        }

        best
    }

    #[cfg(debug_assertions)]
    fn trace(&self, candidate: &Token) {
        if let Some(log) = self.log.get() {
            if log.order() >= Log::Success(()).order() {
                println!(
                    "[{}; ScannerMatch]: {} -> {:?} at {}",
                    log,
                    candidate.name,
                    candidate.image,
                    Position::new(candidate.line, candidate.column)
                );
            }
        }
    }
}

fn best_of(best: Option<Token>, candidate: Token, opts: ScanOpts) -> Option<Token> {
    if opts.stop_on_lf && candidate.has_lf {
        return best;
    }
    match &best {
        None => Some(candidate),
        Some(current) => {
            if candidate.image.len() > current.image.len() {
                Some(candidate)
            } else {
                best
            }
        }
    }
}

/// Compile a fixed symbol into `^(\s*)(escaped words joined by \s+)`. A
/// multi-word symbol like `"not in"` matches any positive whitespace run
/// between its words, not just a single space (spec.md §9 Open Questions).
fn compile_fixed(symbol: &str) -> Result<Regex, String> {
    let body = symbol
        .split(' ')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&format!(r"^(\s*)({})", body))
        .map_err(|err| format!("Fixed symbol '{}' is not a valid pattern: {}", symbol, err))
}

/// Compile a named pattern into `^(\s*)(pattern)`, as given by the caller.
fn compile_named(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!(r"^(\s*)({})", pattern))
        .map_err(|err| format!("Pattern '{}' is not a valid regex: {}", pattern, err))
}

/// The fixed symbol and named pattern table for the Dojo language itself
/// (spec.md §6 "Source syntax"), mirroring the original's module-level
/// `SCANNER = Scanner(...)` table.
pub fn dojo_scanner() -> Scanner {
    Scanner::new(
        &[
            "+", "-", "*", "/", "//", "**", "%", "(", ")", "[", "]", "{", "}", "==", "!=", ",",
            "=", "@", ";", ":", "::", "..", "|>", "=>", ".", "<", "<=", ">", ">=", "~", "<<", ">>",
            "&", "|", "^", "return", "in", "not in", "if", "else", "elif", "and", "or", "not",
            "import", "def", "yield",
        ],
        &[
            ("INTEGER", r"[0-9]+"),
            ("FLOAT", r"[0-9]*\.[0-9]+"),
            ("IDENTIFIER", r"[_a-zA-Z][_a-zA-Z0-9]*"),
            ("STRING", r#"("([^\\"]|\\.)*")|('([^\\']|\\.)*')"#),
            ("EOF", r"$"),
        ],
    )
    .expect("the Dojo grammar table is a fixed, valid set of patterns")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<(TokenName, String)> {
        let scanner = dojo_scanner();
        let mut pos = 0;
        let mut line = 1;
        let mut column = 1;
        let mut out = Vec::new();
        loop {
            let token = scanner
                .scan(source, pos, line, column, ScanOpts::default())
                .unwrap_or_else(|| panic!("no token at {}", pos));
            let is_eof = token.name == "EOF";
            pos += token.raw_len();
            line = token.line;
            column = token.column + token.image.chars().count();
            out.push((token.name, token.image.clone()));
            if is_eof {
                break;
            }
        }
        out
    }

    #[test]
    fn longest_match_prefers_keyword_over_identifier() {
        let tokens = scan_all("not in");
        assert_eq!(tokens[0], ("not in", "not in".to_string()));
    }

    #[test]
    fn longest_match_prefers_longer_operator() {
        let tokens = scan_all("a<<=b");
        // "<<" is matched before "=" ; "<=" would tie length with "<<" at
        // a different slice, but at this position "<<" must win over "<".
        assert_eq!(tokens[1], ("<<", "<<".to_string()));
    }

    #[test]
    fn integer_and_float_are_distinguished() {
        assert_eq!(scan_all("42")[0], ("INTEGER", "42".to_string()));
        assert_eq!(scan_all("4.2")[0], ("FLOAT", "4.2".to_string()));
    }

    #[test]
    fn lf_sensitive_scan_rejects_newline_preceded_token() {
        let scanner = dojo_scanner();
        let source = "4\n-2";
        let token = scanner.scan(source, 1, 1, 2, ScanOpts::stop_on_lf());
        assert!(token.is_none(), "the '-' after a newline must be rejected under stop_on_lf");
    }

    #[test]
    fn track_line_and_column_across_newlines() {
        let scanner = dojo_scanner();
        let source = "a\n  b";
        let first = scanner.scan(source, 0, 1, 1, ScanOpts::default()).unwrap();
        assert_eq!((first.line, first.column), (1, 1));
        let pos = first.raw_len();
        let second = scanner
            .scan(source, pos, first.line, first.column + 1, ScanOpts::default())
            .unwrap();
        assert_eq!((second.line, second.column), (2, 3));
    }

    #[test]
    fn empty_image_only_valid_for_eof() {
        let scanner = dojo_scanner();
        let token = scanner.scan("", 0, 1, 1, ScanOpts::default()).unwrap();
        assert_eq!(token.name, "EOF");
        assert_eq!(token.image, "");
    }
}
