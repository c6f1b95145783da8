//! Recursive-descent parser with precedence climbing (spec.md §4.4).
//!
//! One method per grammar production, from `program()` down to `primary()`.
//! Binary/compare/boolean precedence levels share a single generic
//! [`Parser::binary_level`] helper parametrized by the next-tighter
//! production and the AST constructor to build, rather than repeating the
//! loop at each of the dozen levels.
//!
//! Assignment folding (spec.md §9 "Get/Set duality") goes through
//! [`Lvalue`] instead of a dynamic `to_assignment` dispatch: a freshly
//! parsed `operators()` result is inspected once, and only variants that
//! can be targets are reshaped into their `Set*` counterpart when `=`
//! follows.

use crate::ast::{ImportItem, KeywordArg, LexicalContext, Literal, Node, Scope, Variable};
use crate::error::CompileError;
use crate::scanner::{dojo_scanner, ScanOpts, Scanner, TokenName};
use crate::token_stream::TokenStream;

/// A parsed `operators()` result, classified by whether `=` can follow it.
enum Lvalue {
    Variable { line: usize, var: Variable },
    Attribute { line: usize, target: Box<Node>, name: String },
    Subscript { line: usize, target: Box<Node>, index: Box<Node> },
    Value(Node),
}

impl Lvalue {
    fn classify(node: Node) -> Self {
        match node {
            Node::GetVariable { line, var } => Lvalue::Variable { line, var },
            Node::GetAttribute { line, target, name } => Lvalue::Attribute { line, target, name },
            Node::GetSubscript { line, target, index } => Lvalue::Subscript { line, target, index },
            other => Lvalue::Value(other),
        }
    }

    fn into_get(self) -> Node {
        match self {
            Lvalue::Variable { line, var } => Node::GetVariable { line, var },
            Lvalue::Attribute { line, target, name } => Node::GetAttribute { line, target, name },
            Lvalue::Subscript { line, target, index } => Node::GetSubscript { line, target, index },
            Lvalue::Value(node) => node,
        }
    }

    /// Re-resolves the target name through [`LexicalContext::assign`] rather
    /// than reusing the handle `classify` captured: a write can introduce a
    /// fresh local binding where the read that produced this node saw only
    /// an outer/global one (spec.md §4.3 `assign`).
    fn into_set(self, ctx: &LexicalContext, value: Node) -> Node {
        match self {
            Lvalue::Variable { line, var } => Node::SetVariable {
                line,
                var: ctx.assign(&var.name),
                expr: Box::new(value),
            },
            Lvalue::Attribute { line, target, name } => Node::SetAttribute {
                line,
                target,
                name,
                value: Box::new(value),
            },
            Lvalue::Subscript { line, target, index } => Node::SetSubscript {
                line,
                target,
                index,
                expr: Box::new(value),
            },
            Lvalue::Value(_) => unreachable!("caller must not assign to a non-lvalue"),
        }
    }
}

fn mk_binary(line: usize, op: &'static str, lhs: Node, rhs: Node) -> Node {
    Node::BinaryOp { line, op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn mk_compare(line: usize, op: &'static str, lhs: Node, rhs: Node) -> Node {
    Node::CompareOp { line, op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn mk_boolean(line: usize, op: &'static str, lhs: Node, rhs: Node) -> Node {
    Node::BooleanOp { line, op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

/// Parse a complete Dojo program into its [`Node::Program`] root. This is
/// the parser's sole public entry point; everything else is a private
/// grammar production reachable only through `program()`.
pub fn parse_program(source: &str) -> Result<Node, CompileError> {
    let scanner = dojo_scanner();
    let mut parser = Parser::new(&scanner, source);
    let ctx = LexicalContext::root();
    let body = parser.block(&ctx, "EOF")?;
    Ok(Node::Program {
        line: body.line(),
        cell: ctx.varnames(Scope::Exported),
        free: ctx.varnames(Scope::Closure),
        body: Box::new(body),
    })
}

struct Parser<'s> {
    ts: TokenStream<'s>,
}

type PResult = Result<Node, CompileError>;

impl<'s> Parser<'s> {
    fn new(scanner: &'s Scanner, source: &'s str) -> Self {
        Self { ts: TokenStream::new(scanner, source) }
    }

    /// Zero or more `;`-ignoring, soft-`\n`-or-`;`-separated expressions up
    /// to `until` (spec.md §4.4 "Block").
    fn block(&mut self, ctx: &LexicalContext, until: TokenName) -> PResult {
        let line = self.ts.line;
        let mut exprs = Vec::new();
        loop {
            self.ts.ignore(&[";"], ScanOpts::default());
            if self.ts.next_if(&[until], ScanOpts::default()).is_some() {
                break;
            }
            exprs.push(self.expr(ctx)?);
            self.ts.expect_lf_or(&[";", until], ScanOpts::default())?;
        }
        Ok(Node::Block { line, exprs })
    }

    /// Comma-separated `what()` up to `until`, stopping early (without
    /// consuming) at any token in `rest` -- used to let keyword call
    /// arguments (`@name=expr`) follow positional ones without a comma.
    fn list_of<T>(
        &mut self,
        until: TokenName,
        rest: &[TokenName],
        mut what: impl FnMut(&mut Self) -> Result<T, CompileError>,
    ) -> Result<Vec<T>, CompileError> {
        let mut stoppers = vec![until];
        stoppers.extend_from_slice(rest);
        let mut items = Vec::new();
        if self.ts.maybe(&stoppers, ScanOpts::default()).is_none() {
            items.push(what(self)?);
            while self.ts.next_if(&[","], ScanOpts::default()).is_some()
                && self.ts.maybe(&stoppers, ScanOpts::default()).is_none()
            {
                items.push(what(self)?);
            }
        }
        // A `rest` stopper (e.g. the `@` that starts keyword arguments) is
        // left unconsumed for the caller; anything else must be `until`,
        // strictly, so a missing comma is reported here rather than
        // surfacing later as a confusing soft-terminator error.
        if self.ts.maybe(rest, ScanOpts::default()).is_none() {
            self.ts.next(&[until], ScanOpts::default())?;
        }
        Ok(items)
    }

    fn expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.if_expr(ctx)
    }

    fn if_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if self.ts.next_if(&["if"], ScanOpts::default()).is_some() {
            self.if_test_and_bodies(ctx)
        } else {
            self.yield_expr(ctx)
        }
    }

    fn if_test_and_bodies(&mut self, ctx: &LexicalContext) -> PResult {
        let test = self.expr(ctx)?;
        let line = test.line();
        self.ts.next(&[":"], ScanOpts::default())?;
        let then_body = self.expr(ctx)?;

        let else_body = if self.ts.next_if(&["else"], ScanOpts::default()).is_some() {
            self.ts.next(&[":"], ScanOpts::default())?;
            self.expr(ctx)?
        } else if self.ts.next_if(&["elif"], ScanOpts::default()).is_some() {
            self.if_test_and_bodies(ctx)?
        } else {
            Node::Block { line, exprs: Vec::new() }
        };

        Ok(Node::If {
            line,
            test: Box::new(test),
            then_body: Box::new(then_body),
            else_body: Box::new(else_body),
        })
    }

    fn yield_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["yield"], ScanOpts::default()) {
            Ok(Node::Yield { line: op.line, expr: Box::new(self.expr(ctx)?) })
        } else {
            self.return_expr(ctx)
        }
    }

    fn return_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["return"], ScanOpts::default()) {
            Ok(Node::Return { line: op.line, expr: Box::new(self.expr(ctx)?) })
        } else {
            self.import_expr(ctx)
        }
    }

    fn import_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["import"], ScanOpts::default()) {
            let module = self.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image;
            let names = if self.ts.next_if(&["("], ScanOpts::stop_on_lf()).is_some() {
                Some(self.list_of(")", &[], |p| {
                    Ok(p.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image)
                })?)
            } else {
                None
            };
            Ok(Node::Import { line: op.line, item: ImportItem { module, names } })
        } else {
            self.pipe(ctx)
        }
    }

    /// `compose ('|>' compose)*` (spec.md §4.4).
    fn pipe(&mut self, ctx: &LexicalContext) -> PResult {
        let mut e = self.compose(ctx)?;
        while let Some(op) = self.ts.next_if(&["|>"], ScanOpts::default()) {
            e = Node::PipeForward { line: op.line, arg: Box::new(e), method: Box::new(self.compose(ctx)?) };
        }
        Ok(e)
    }

    /// `function ('=>' function)*` (spec.md §4.4).
    fn compose(&mut self, ctx: &LexicalContext) -> PResult {
        let mut e = self.function(ctx)?;
        while let Some(op) = self.ts.next_if(&["=>"], ScanOpts::default()) {
            e = Node::Composition { line: op.line, lhs: Box::new(e), rhs: Box::new(self.function(ctx)?) };
        }
        Ok(e)
    }

    fn function(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["/"], ScanOpts::default()) {
            let args = self.list_of(":", &[], |p| {
                Ok(p.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image)
            })?;
            return self.function_body(op.line, ctx, None, args, Self::function);
        }

        if let Some(op) = self.ts.next_if(&["def"], ScanOpts::default()) {
            let name = self.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image;
            let var = ctx.ensure(&name, Scope::Local);
            self.ts.next(&["("], ScanOpts::default())?;
            let args = self.list_of(")", &[], |p| {
                Ok(p.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image)
            })?;
            self.ts.next(&[":"], ScanOpts::default())?;
            let body = self.function_body(op.line, ctx, Some(name), args, Self::expr)?;
            return Ok(Node::SetVariable { line: op.line, var, expr: Box::new(body) });
        }

        self.assignment(ctx)
    }

    fn function_body(
        &mut self,
        line: usize,
        ctx: &LexicalContext,
        name: Option<String>,
        args: Vec<String>,
        body_of: fn(&mut Self, &LexicalContext) -> PResult,
    ) -> PResult {
        let body_ctx = ctx.push(&args);
        let body = body_of(self, &body_ctx)?;
        let cell = body_ctx.varnames(Scope::Exported);
        let free = body_ctx.varnames(Scope::Closure);
        Ok(Node::Function { line, name, args, body: Box::new(body), cell, free })
    }

    /// `operators ('=' expr)?`, folding a target read into the matching
    /// write (spec.md §4.4 "Assignment folding").
    fn assignment(&mut self, ctx: &LexicalContext) -> PResult {
        let to = self.operators(ctx)?;
        match Lvalue::classify(to) {
            Lvalue::Value(node) => Ok(node),
            lvalue => {
                if self.ts.next_if(&["="], ScanOpts::default()).is_some() {
                    let value = self.expr(ctx)?;
                    Ok(lvalue.into_set(ctx, value))
                } else {
                    Ok(lvalue.into_get())
                }
            }
        }
    }

    fn operators(&mut self, ctx: &LexicalContext) -> PResult {
        self.or_expr(ctx)
    }

    fn binary_level(
        &mut self,
        ctx: &LexicalContext,
        higher: fn(&mut Self, &LexicalContext) -> PResult,
        make: fn(usize, &'static str, Node, Node) -> Node,
        ops: &[TokenName],
    ) -> PResult {
        let mut e = higher(self, ctx)?;
        while let Some(op) = self.ts.next_if(ops, ScanOpts::stop_on_lf()) {
            let rhs = higher(self, ctx)?;
            e = make(op.line, op.name, e, rhs);
        }
        Ok(e)
    }

    fn or_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::and_expr, mk_boolean, &["or"])
    }

    fn and_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::not_expr, mk_boolean, &["and"])
    }

    fn not_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["not"], ScanOpts::default()) {
            Ok(Node::UnaryOp { line: op.line, op: op.name, expr: Box::new(self.not_expr(ctx)?) })
        } else {
            self.in_expr(ctx)
        }
    }

    fn in_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::compare_expr, mk_compare, &["in", "not in"])
    }

    fn compare_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::bitor_expr, mk_compare, &["==", "!=", "<", ">", "<=", ">="])
    }

    fn bitor_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::bitxor_expr, mk_binary, &["|"])
    }

    fn bitxor_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::bitand_expr, mk_binary, &["^"])
    }

    fn bitand_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::shift_expr, mk_binary, &["&"])
    }

    fn shift_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::addsub_expr, mk_binary, &["<<", ">>"])
    }

    fn addsub_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::muldiv_expr, mk_binary, &["+", "-"])
    }

    fn muldiv_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::pow_expr, mk_binary, &["*", "/", "//", "%"])
    }

    fn pow_expr(&mut self, ctx: &LexicalContext) -> PResult {
        self.binary_level(ctx, Self::prefix_expr, mk_binary, &["**"])
    }

    fn prefix_expr(&mut self, ctx: &LexicalContext) -> PResult {
        if let Some(op) = self.ts.next_if(&["-", "+", "~"], ScanOpts::default()) {
            Ok(Node::UnaryOp { line: op.line, op: op.name, expr: Box::new(self.prefix_expr(ctx)?) })
        } else {
            self.range_expr(ctx)
        }
    }

    /// `call ('..' call (':' call)?)?` -- standalone range literals, sitting
    /// between the arithmetic/unary operator chain and `call` (SPEC_FULL.md
    /// §2 item 1). Bracketed two-part slices (`a[x..y]`) are a separate
    /// production in `get_subscript`.
    fn range_expr(&mut self, ctx: &LexicalContext) -> PResult {
        let e = self.call(ctx)?;
        if self.ts.next_if(&[".."], ScanOpts::default()).is_some() {
            let line = e.line();
            let end = self.call(ctx)?;
            let step = if self.ts.next_if(&[":"], ScanOpts::default()).is_some() {
                Some(Box::new(self.call(ctx)?))
            } else {
                None
            };
            Ok(Node::RangeLiteral { line, begin: Box::new(e), end: Box::new(end), step })
        } else {
            Ok(e)
        }
    }

    fn named_arg(&mut self, ctx: &LexicalContext) -> Result<KeywordArg, CompileError> {
        self.ts.next(&["@"], ScanOpts::default())?;
        let name = self.ts.next(&["IDENTIFIER"], ScanOpts::default())?.image;
        self.ts.next(&["="], ScanOpts::default())?;
        let value = self.expr(ctx)?;
        Ok(KeywordArg { name, value })
    }

    fn call_args(
        &mut self,
        ctx: &LexicalContext,
        until: TokenName,
    ) -> Result<(Vec<Node>, Vec<KeywordArg>), CompileError> {
        let args = self.list_of(until, &["@"], |p| p.expr(ctx))?;
        let kwargs = if self.ts.maybe(&["@"], ScanOpts::default()).is_some() {
            self.list_of(until, &[], |p| p.named_arg(ctx))?
        } else {
            Vec::new()
        };
        Ok((args, kwargs))
    }

    /// `'(' args ')' | '{' args '}'`, chained, each stopping the chain at a
    /// line break (spec.md §4.4 "call").
    fn call(&mut self, ctx: &LexicalContext) -> PResult {
        let mut e = self.get_attribute(ctx)?;
        loop {
            if let Some(op) = self.ts.next_if(&["("], ScanOpts::stop_on_lf()) {
                let (args, kwargs) = self.call_args(ctx, ")")?;
                e = Node::Call { line: op.line, method: Box::new(e), args, kwargs };
            } else if let Some(op) = self.ts.next_if(&["{"], ScanOpts::stop_on_lf()) {
                let (args, kwargs) = self.call_args(ctx, "}")?;
                e = Node::PartialCall { line: op.line, method: Box::new(e), args, kwargs };
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn get_attribute(&mut self, ctx: &LexicalContext) -> PResult {
        let mut e = self.get_subscript(ctx)?;
        while let Some(op) = self.ts.next_if(&["."], ScanOpts::default()) {
            let member = self.ts.next(&["IDENTIFIER"], ScanOpts::default())?;
            e = Node::GetAttribute { line: op.line, target: Box::new(e), name: member.image };
        }
        Ok(e)
    }

    fn get_subscript(&mut self, ctx: &LexicalContext) -> PResult {
        let mut e = self.primary(ctx)?;
        while let Some(op) = self.ts.next_if(&["["], ScanOpts::stop_on_lf()) {
            let v1 = if self.ts.maybe(&[".."], ScanOpts::default()).is_some() {
                Node::Literal { line: op.line, value: Literal::None }
            } else {
                self.expr(ctx)?
            };

            let index = if self.ts.next_if(&[".."], ScanOpts::default()).is_some() {
                let v2 = if self.ts.maybe(&["]"], ScanOpts::default()).is_some() {
                    Node::Literal { line: op.line, value: Literal::None }
                } else {
                    self.expr(ctx)?
                };
                Node::Slice { line: v1.line(), start: Box::new(v1), end: Box::new(v2) }
            } else {
                v1
            };

            self.ts.next(&["]"], ScanOpts::default())?;
            e = Node::GetSubscript { line: op.line, target: Box::new(e), index: Box::new(index) };
        }
        Ok(e)
    }

    fn key_value(&mut self, ctx: &LexicalContext) -> Result<(Node, Node), CompileError> {
        let key = self.expr(ctx)?;
        self.ts.next(&[":"], ScanOpts::default())?;
        let value = self.expr(ctx)?;
        Ok((key, value))
    }

    fn primary(&mut self, ctx: &LexicalContext) -> PResult {
        let token = self.ts.next(
            &["INTEGER", "FLOAT", "STRING", "IDENTIFIER", "(", "[", "{"],
            ScanOpts::default(),
        )?;
        match token.name {
            "INTEGER" => Ok(Node::Literal {
                line: token.line,
                value: Literal::Int(token.image.parse().map_err(|_| {
                    CompileError::invalid_syntax(
                        crate::util::Position::new(token.line, token.column),
                        &token.image,
                    )
                })?),
            }),
            "FLOAT" => Ok(Node::Literal {
                line: token.line,
                value: Literal::Float(token.image.parse().map_err(|_| {
                    CompileError::invalid_syntax(
                        crate::util::Position::new(token.line, token.column),
                        &token.image,
                    )
                })?),
            }),
            "STRING" => Ok(Node::Literal { line: token.line, value: Literal::Str(unescape(&token.image)) }),
            "IDENTIFIER" => Ok(Node::GetVariable { line: token.line, var: ctx.request(&token.image) }),
            "(" => self.block(ctx, ")"),
            "[" => Ok(Node::ListLiteral {
                line: token.line,
                exprs: self.list_of("]", &[], |p| p.expr(ctx))?,
            }),
            "{" => Ok(Node::DictLiteral {
                line: token.line,
                items: self.list_of("}", &[], |p| p.key_value(ctx))?,
            }),
            _ => unreachable!("primary() only ever consumes the names it requested"),
        }
    }
}

/// Strip the surrounding quotes and resolve backslash escapes in a scanned
/// `STRING` token's image (spec.md §6: "backslash escapes").
fn unescape(image: &str) -> String {
    let body = &image[1..image.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Node {
        parse_program(source).unwrap_or_else(|e| panic!("{}: {:?}", source, e))
    }

    #[test]
    fn precedence_multiplication_before_addition() {
        let program = parse("2+3*4");
        let Node::Program { body, .. } = program else { unreachable!() };
        let Node::Block { exprs, .. } = *body else { unreachable!() };
        match &exprs[0] {
            Node::BinaryOp { op: "+", rhs, .. } => {
                assert!(matches!(**rhs, Node::BinaryOp { op: "*", .. }));
            }
            other => panic!("expected top-level '+', got {:?}", other),
        }
    }

    #[test]
    fn assignment_folds_get_variable_into_set_variable() {
        let program = parse("a=1");
        let Node::Program { body, .. } = program else { unreachable!() };
        let Node::Block { exprs, .. } = *body else { unreachable!() };
        assert!(matches!(exprs[0], Node::SetVariable { .. }));
    }

    #[test]
    fn newline_terminates_a_binary_expression() {
        let program = parse("4\n-2");
        let Node::Program { body, .. } = program else { unreachable!() };
        let Node::Block { exprs, .. } = *body else { unreachable!() };
        assert_eq!(exprs.len(), 2);
        assert!(matches!(exprs[0], Node::Literal { value: Literal::Int(4), .. }));
        assert!(matches!(exprs[1], Node::UnaryOp { op: "-", .. }));
    }

    #[test]
    fn closure_upgrade_through_nested_function() {
        let program = parse("seq=/:(x=0; /: x=x+1)");
        let Node::Program { body, .. } = program else { unreachable!() };
        let Node::Block { exprs, .. } = *body else { unreachable!() };
        let Node::SetVariable { expr: seq_fn, .. } = &exprs[0] else { unreachable!() };
        let Node::Function { cell, .. } = seq_fn.as_ref() else { unreachable!() };
        assert_eq!(cell, &vec!["x".to_string()]);
    }

    #[test]
    fn range_literal_parses_standalone() {
        let program = parse("1..20");
        let Node::Program { body, .. } = program else { unreachable!() };
        let Node::Block { exprs, .. } = *body else { unreachable!() };
        assert!(matches!(exprs[0], Node::RangeLiteral { step: None, .. }));
    }

    #[test]
    fn unexpected_token_reports_position() {
        let err = parse_program("2+2\n2+3\n  )").unwrap_err();
        match err {
            CompileError::UnexpectedToken { line, column, .. } => {
                assert_eq!((line, column), (3, 3));
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn invalid_syntax_reports_position() {
        let err = parse_program("$").unwrap_err();
        match err {
            CompileError::InvalidSyntax { line, column, .. } => assert_eq!((line, column), (1, 1)),
            other => panic!("expected InvalidSyntax, got {:?}", other),
        }
    }

    #[test]
    fn missing_comma_in_call_is_unexpected_token() {
        let err = parse_program("2*add(2+2 3+3)").unwrap_err();
        assert!(matches!(err, CompileError::UnexpectedToken { .. }));
    }
}
