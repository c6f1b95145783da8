//! The Dojo abstract syntax tree (spec.md §3 "AST node").
//!
//! Every source form -- blocks, literals, control flow, function
//! definitions -- lowers to one variant of [`Node`]. The original compiler
//! dispatches on this with `getattr(self, 'emit_' + type(e).__name__)`;
//! here it is a single tagged enum so the emitter's `match` is exhaustive
//! and checked at compile time (spec.md §9 "Dynamic dispatch on AST kind").

pub mod context;

pub use context::{LexicalContext, Scope, Variable};

use std::borrow::Cow;

/// A literal value parsed straight out of source text (spec.md §4.4
/// `primary`). Kept distinct from the emitter's `ConstValue` -- this is
/// what the parser produces, that is what the assembled code object stores.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One `module` or `module(a, b)` clause of an `import` expression
/// (spec.md §6 "Source syntax").
#[derive(Debug, Clone)]
pub struct ImportItem {
    pub module: String,
    /// `Some(names)` for `module(a, b)` (import only `a`, `b` from
    /// `module`); `None` for a plain `import module`.
    pub names: Option<Vec<String>>,
}

/// A keyword argument pair in a [`Node::Call`]/[`Node::PartialCall`]
/// (`@name=expr`, spec.md §6).
#[derive(Debug, Clone)]
pub struct KeywordArg {
    pub name: String,
    pub value: Node,
}

/// A tagged variant over every expression form in the language (spec.md
/// §3). Every node carries its source `line`; "target" nodes additionally
/// support the get/set duality described in spec.md §9 via
/// [`crate::parser::Lvalue`] rather than a `to_assignment` method, so there
/// is no need for an inheritance-style hook here.
#[derive(Debug, Clone)]
pub enum Node {
    Block {
        line: usize,
        exprs: Vec<Node>,
    },
    Literal {
        line: usize,
        value: Literal,
    },
    ListLiteral {
        line: usize,
        exprs: Vec<Node>,
    },
    DictLiteral {
        line: usize,
        items: Vec<(Node, Node)>,
    },
    RangeLiteral {
        line: usize,
        begin: Box<Node>,
        end: Box<Node>,
        step: Option<Box<Node>>,
    },
    GetVariable {
        line: usize,
        var: Variable,
    },
    SetVariable {
        line: usize,
        var: Variable,
        expr: Box<Node>,
    },
    GetAttribute {
        line: usize,
        target: Box<Node>,
        name: String,
    },
    SetAttribute {
        line: usize,
        target: Box<Node>,
        name: String,
        value: Box<Node>,
    },
    GetSubscript {
        line: usize,
        target: Box<Node>,
        index: Box<Node>,
    },
    SetSubscript {
        line: usize,
        target: Box<Node>,
        index: Box<Node>,
        expr: Box<Node>,
    },
    Slice {
        line: usize,
        start: Box<Node>,
        end: Box<Node>,
    },
    Return {
        line: usize,
        expr: Box<Node>,
    },
    Yield {
        line: usize,
        expr: Box<Node>,
    },
    Call {
        line: usize,
        method: Box<Node>,
        args: Vec<Node>,
        kwargs: Vec<KeywordArg>,
    },
    PipeForward {
        line: usize,
        arg: Box<Node>,
        method: Box<Node>,
    },
    Composition {
        line: usize,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    PartialCall {
        line: usize,
        method: Box<Node>,
        args: Vec<Node>,
        kwargs: Vec<KeywordArg>,
    },
    BinaryOp {
        line: usize,
        op: &'static str,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    CompareOp {
        line: usize,
        op: &'static str,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    BooleanOp {
        line: usize,
        op: &'static str,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    UnaryOp {
        line: usize,
        op: &'static str,
        expr: Box<Node>,
    },
    If {
        line: usize,
        test: Box<Node>,
        then_body: Box<Node>,
        else_body: Box<Node>,
    },
    Function {
        line: usize,
        name: Option<String>,
        args: Vec<String>,
        body: Box<Node>,
        cell: Vec<String>,
        free: Vec<String>,
    },
    Import {
        line: usize,
        item: ImportItem,
    },
    Program {
        line: usize,
        body: Box<Node>,
        cell: Vec<String>,
        free: Vec<String>,
    },
}

impl Node {
    pub fn line(&self) -> usize {
        match self {
            Node::Block { line, .. }
            | Node::Literal { line, .. }
            | Node::ListLiteral { line, .. }
            | Node::DictLiteral { line, .. }
            | Node::RangeLiteral { line, .. }
            | Node::GetVariable { line, .. }
            | Node::SetVariable { line, .. }
            | Node::GetAttribute { line, .. }
            | Node::SetAttribute { line, .. }
            | Node::GetSubscript { line, .. }
            | Node::SetSubscript { line, .. }
            | Node::Slice { line, .. }
            | Node::Return { line, .. }
            | Node::Yield { line, .. }
            | Node::Call { line, .. }
            | Node::PipeForward { line, .. }
            | Node::Composition { line, .. }
            | Node::PartialCall { line, .. }
            | Node::BinaryOp { line, .. }
            | Node::CompareOp { line, .. }
            | Node::BooleanOp { line, .. }
            | Node::UnaryOp { line, .. }
            | Node::If { line, .. }
            | Node::Function { line, .. }
            | Node::Import { line, .. }
            | Node::Program { line, .. } => *line,
        }
    }

    fn label(&self) -> Cow<'static, str> {
        match self {
            Node::Block { .. } => Cow::Borrowed("Block"),
            Node::Literal { value, .. } => Cow::Owned(format!("Literal({:?})", value)),
            Node::ListLiteral { .. } => Cow::Borrowed("ListLiteral"),
            Node::DictLiteral { .. } => Cow::Borrowed("DictLiteral"),
            Node::RangeLiteral { .. } => Cow::Borrowed("RangeLiteral"),
            Node::GetVariable { var, .. } => Cow::Owned(format!("GetVariable({})", var.name)),
            Node::SetVariable { var, .. } => Cow::Owned(format!("SetVariable({})", var.name)),
            Node::GetAttribute { name, .. } => Cow::Owned(format!("GetAttribute(.{})", name)),
            Node::SetAttribute { name, .. } => Cow::Owned(format!("SetAttribute(.{})", name)),
            Node::GetSubscript { .. } => Cow::Borrowed("GetSubscript"),
            Node::SetSubscript { .. } => Cow::Borrowed("SetSubscript"),
            Node::Slice { .. } => Cow::Borrowed("Slice"),
            Node::Return { .. } => Cow::Borrowed("Return"),
            Node::Yield { .. } => Cow::Borrowed("Yield"),
            Node::Call { .. } => Cow::Borrowed("Call"),
            Node::PipeForward { .. } => Cow::Borrowed("PipeForward"),
            Node::Composition { .. } => Cow::Borrowed("Composition"),
            Node::PartialCall { .. } => Cow::Borrowed("PartialCall"),
            Node::BinaryOp { op, .. } => Cow::Owned(format!("BinaryOp({})", op)),
            Node::CompareOp { op, .. } => Cow::Owned(format!("CompareOp({})", op)),
            Node::BooleanOp { op, .. } => Cow::Owned(format!("BooleanOp({})", op)),
            Node::UnaryOp { op, .. } => Cow::Owned(format!("UnaryOp({})", op)),
            Node::If { .. } => Cow::Borrowed("If"),
            Node::Function { name, .. } => {
                Cow::Owned(format!("Function({})", name.as_deref().unwrap_or("<anonymous>")))
            }
            Node::Import { item, .. } => Cow::Owned(format!("Import({})", item.module)),
            Node::Program { .. } => Cow::Borrowed("Program"),
        }
    }

    fn tree_children(&self) -> Vec<&Node> {
        match self {
            Node::Block { exprs, .. } | Node::ListLiteral { exprs, .. } => exprs.iter().collect(),
            Node::DictLiteral { items, .. } => {
                items.iter().flat_map(|(k, v)| [k, v]).collect()
            }
            Node::RangeLiteral { begin, end, step, .. } => {
                let mut v = vec![begin.as_ref(), end.as_ref()];
                if let Some(step) = step {
                    v.push(step.as_ref());
                }
                v
            }
            Node::Literal { .. } | Node::GetVariable { .. } | Node::Import { .. } => Vec::new(),
            Node::SetVariable { expr, .. } => vec![expr.as_ref()],
            Node::GetAttribute { target, .. } => vec![target.as_ref()],
            Node::SetAttribute { target, value, .. } => vec![target.as_ref(), value.as_ref()],
            Node::GetSubscript { target, index, .. } => vec![target.as_ref(), index.as_ref()],
            Node::SetSubscript { target, index, expr, .. } => {
                vec![target.as_ref(), index.as_ref(), expr.as_ref()]
            }
            Node::Slice { start, end, .. } => vec![start.as_ref(), end.as_ref()],
            Node::Return { expr, .. } | Node::Yield { expr, .. } => vec![expr.as_ref()],
            Node::Call { method, args, kwargs, .. } | Node::PartialCall { method, args, kwargs, .. } => {
                let mut v = vec![method.as_ref()];
                v.extend(args.iter());
                v.extend(kwargs.iter().map(|kw| &kw.value));
                v
            }
            Node::PipeForward { arg, method, .. } => vec![arg.as_ref(), method.as_ref()],
            Node::Composition { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Node::BinaryOp { lhs, rhs, .. }
            | Node::CompareOp { lhs, rhs, .. }
            | Node::BooleanOp { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Node::UnaryOp { expr, .. } => vec![expr.as_ref()],
            Node::If { test, then_body, else_body, .. } => {
                vec![test.as_ref(), then_body.as_ref(), else_body.as_ref()]
            }
            Node::Function { body, .. } => vec![body.as_ref()],
            Node::Program { body, .. } => vec![body.as_ref()],
        }
    }

    /// Pretty-print this tree with `ptree`, mirroring the teacher's
    /// `ASTNode::print` debug helper.
    pub fn print(&self) -> std::io::Result<()> {
        ptree::print_tree(self)
    }
}

impl ptree::TreeItem for Node {
    type Child = Node;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{} # line {}", self.label(), self.line())
    }

    fn children(&self) -> Cow<[Self::Child]> {
        Cow::Owned(self.tree_children().into_iter().cloned().collect())
    }
}
