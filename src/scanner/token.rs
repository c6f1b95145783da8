/// The lexical category of a [`Token`](super::Token): a fixed symbol
/// (`"+"`, `"not in"`, `"elif"`, ...) or a named pattern (`"IDENTIFIER"`,
/// `"INTEGER"`, `"EOF"`, ...), whichever the scanner registered it under.
pub type TokenName = &'static str;

/// A single lexical unit produced by [`Scanner::scan`](super::Scanner::scan).
///
/// Tokens are value objects: they do not outlive the call that produced
/// them, and [`TokenStream`](crate::token_stream::TokenStream) only ever
/// holds the most recently peeked one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub name: TokenName,
    /// The whitespace run consumed immediately before `image`.
    pub whites: String,
    /// The matched text itself (empty for a zero-width match, only valid
    /// for `EOF`).
    pub image: String,
    /// Byte offset of `whites` within the source.
    pub begin: usize,
    pub line: usize,
    pub column: usize,
    /// Whether `whites` contained a line feed.
    pub has_lf: bool,
}

impl Token {
    pub fn new(
        name: TokenName,
        whites: String,
        image: String,
        begin: usize,
        line: usize,
        column: usize,
    ) -> Self {
        let has_lf = whites.contains('\n');
        Self {
            name,
            whites,
            image,
            begin,
            line,
            column,
            has_lf,
        }
    }

    /// Combined length, in bytes, of the whitespace run and the image --
    /// how far a [`TokenStream`](crate::token_stream::TokenStream) must
    /// advance its cursor to consume this token.
    pub fn raw_len(&self) -> usize {
        self.whites.len() + self.image.len()
    }
}
