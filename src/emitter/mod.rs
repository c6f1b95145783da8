//! Bytecode emission (spec.md §4.5): lowers an AST into a root
//! [`CodeObject`], recursing into a fresh [`CodeBuilder`] per nested
//! `Function` node. One `emit_*` method per [`Node`] variant, dispatched
//! through a single exhaustive `match` -- the original walks the same
//! table via `getattr(self, 'emit_' + type(e).__name__)`; here the compiler
//! checks it instead (spec.md §9 "Dynamic dispatch on AST kind").

pub mod code_builder;
pub mod code_object;
pub mod opcode;

use crate::ast::{KeywordArg, Literal, Node, Scope};
use code_builder::CodeBuilder;
use code_object::{CodeObject, ConstValue};
use opcode::{CompareOp, Opcode};
use std::rc::Rc;

/// Lower a parsed [`Node::Program`] into its root code object (spec.md
/// §4.5 `dojo_emit`).
pub fn emit_program(program: &Node, filename: &str) -> CodeObject {
    let Node::Program { body, cell, free, .. } = program else {
        panic!("emit_program expects a Node::Program");
    };
    let mut builder = CodeBuilder::new("<root>", filename, 1, &[], cell, free);
    emit(&mut builder, body);
    builder.assemble()
}

fn emit(b: &mut CodeBuilder, node: &Node) {
    match node {
        Node::Block { exprs, line } => emit_block(b, exprs, *line),
        Node::Literal { value, line } => emit_literal(b, value, *line),
        Node::ListLiteral { exprs, line } => emit_list_literal(b, exprs, *line),
        Node::DictLiteral { items, line } => emit_dict_literal(b, items, *line),
        Node::RangeLiteral { begin, end, step, line } => emit_range_literal(b, begin, end, step, *line),
        Node::GetVariable { var, line } => emit_var(b, *line, true, &var.name, var.scope()),
        Node::SetVariable { var, expr, line } => {
            emit(b, expr);
            b.emit_op(Some(*line), Opcode::DUP_TOP, None);
            emit_var(b, *line, false, &var.name, var.scope());
        }
        Node::GetAttribute { target, name, line } => {
            emit(b, target);
            let idx = b.name_index(name);
            b.emit_op(Some(*line), Opcode::LOAD_ATTR, Some(idx));
        }
        Node::SetAttribute { target, name, value, line } => {
            emit(b, value);
            emit(b, target);
            let idx = b.name_index(name);
            b.emit_op(Some(*line), Opcode::STORE_ATTR, Some(idx));
        }
        Node::GetSubscript { target, index, line } => {
            emit(b, target);
            emit(b, index);
            b.emit_op(Some(*line), Opcode::BINARY_SUBSCR, None);
        }
        Node::SetSubscript { target, index, expr, line } => {
            emit(b, expr);
            b.emit_op(Some(*line), Opcode::DUP_TOP, None);
            emit(b, target);
            emit(b, index);
            b.emit_op(Some(*line), Opcode::STORE_SUBSCR, None);
        }
        Node::Slice { start, end, line } => {
            emit(b, start);
            emit(b, end);
            b.emit_op(Some(*line), Opcode::BUILD_SLICE, Some(2));
        }
        Node::Return { expr, line } => {
            emit(b, expr);
            b.emit_op(Some(*line), Opcode::RETURN_VALUE, None);
        }
        Node::Yield { expr, line } => {
            emit(b, expr);
            b.emit_op(Some(*line), Opcode::YIELD_VALUE, None);
            b.mark_generator();
        }
        Node::Call { method, args, kwargs, line } => {
            emit(b, method);
            emit_args(b, args, kwargs);
            let arg = pack_call_arg(args.len(), kwargs.len());
            b.emit_op(Some(*line), Opcode::CALL_FUNCTION, Some(arg));
        }
        Node::PartialCall { method, args, kwargs, line } => {
            let idx = b.const_index(ConstValue::Builtin("partial"));
            b.emit_op(None, Opcode::LOAD_CONST, Some(idx));
            emit(b, method);
            emit_args(b, args, kwargs);
            let arg = pack_call_arg(args.len() + 1, kwargs.len());
            b.emit_op(Some(*line), Opcode::CALL_FUNCTION, Some(arg));
        }
        Node::Composition { lhs, rhs, line } => {
            let idx = b.const_index(ConstValue::Builtin("compose"));
            b.emit_op(None, Opcode::LOAD_CONST, Some(idx));
            emit(b, lhs);
            emit(b, rhs);
            let arg = pack_call_arg(2, 0);
            b.emit_op(Some(*line), Opcode::CALL_FUNCTION, Some(arg));
        }
        Node::PipeForward { arg, method, line } => {
            emit(b, method);
            emit(b, arg);
            let packed = pack_call_arg(1, 0);
            b.emit_op(Some(*line), Opcode::CALL_FUNCTION, Some(packed));
        }
        Node::BinaryOp { op, lhs, rhs, line } => {
            emit(b, lhs);
            emit(b, rhs);
            b.emit_op(Some(*line), binary_opcode(op), None);
        }
        Node::CompareOp { op, lhs, rhs, line } => {
            emit(b, lhs);
            emit(b, rhs);
            b.emit_op(Some(*line), Opcode::COMPARE_OP, Some(CompareOp::from_token(op) as u8 as u16));
        }
        Node::UnaryOp { op, expr, line } => {
            emit(b, expr);
            b.emit_op(Some(*line), unary_opcode(op), None);
        }
        Node::BooleanOp { op, lhs, rhs, line } => {
            emit(b, lhs);
            let patch = b.patch_point(*line);
            emit(b, rhs);
            let target = b.current_offset() as u32;
            b.patch_op(patch, boolean_opcode(op), target);
        }
        Node::If { test, then_body, else_body, line } => {
            emit(b, test);
            let patch1 = b.patch_point(then_body.line());
            emit(b, then_body);
            let patch2 = b.patch_point(else_body.line());
            let else_start = b.current_offset() as u32;
            b.patch_op(patch1, Opcode::POP_JUMP_IF_FALSE, else_start);
            emit(b, else_body);
            let end = b.current_offset() as u32;
            b.patch_op(patch2, Opcode::JUMP_ABSOLUTE, end);
            let _ = line;
        }
        Node::Function { name, args, body, cell, free, line } => emit_function(b, name, args, body, cell, free, *line),
        Node::Import { item, line } => emit_import(b, item, *line),
        Node::Program { .. } => panic!("nested Program node"),
    }
}

fn emit_block(b: &mut CodeBuilder, exprs: &[Node], line: usize) {
    if exprs.is_empty() {
        let idx = b.const_index(ConstValue::None);
        b.emit_op(Some(line), Opcode::LOAD_CONST, Some(idx));
        return;
    }
    emit(b, &exprs[0]);
    for expr in &exprs[1..] {
        b.emit_op(None, Opcode::POP_TOP, None);
        emit(b, expr);
    }
}

fn emit_literal(b: &mut CodeBuilder, value: &Literal, line: usize) {
    let constant = match value {
        Literal::None => ConstValue::None,
        Literal::Bool(v) => ConstValue::Bool(*v),
        Literal::Int(v) => ConstValue::Int(*v),
        Literal::Float(v) => ConstValue::Float(*v),
        Literal::Str(v) => ConstValue::Str(v.clone()),
    };
    let idx = b.const_index(constant);
    b.emit_op(Some(line), Opcode::LOAD_CONST, Some(idx));
}

fn emit_list_literal(b: &mut CodeBuilder, exprs: &[Node], line: usize) {
    for expr in exprs {
        emit(b, expr);
    }
    b.emit_op(Some(line), Opcode::BUILD_LIST, Some(exprs.len() as u16));
}

fn emit_dict_literal(b: &mut CodeBuilder, items: &[(Node, Node)], line: usize) {
    b.emit_op(Some(line), Opcode::BUILD_MAP, Some(0));
    for (key, value) in items {
        b.emit_op(Some(key.line()), Opcode::DUP_TOP, None);
        emit(b, value);
        b.emit_op(Some(value.line()), Opcode::ROT_TWO, None);
        emit(b, key);
        b.emit_op(Some(value.line()), Opcode::STORE_SUBSCR, None);
    }
}

/// `RangeLiteral` lowers to a call to the VM-provided `range` builtin
/// (SPEC_FULL.md §2 item 1), pushed as a constant exactly as
/// `codegen.py`'s `emit_RangeLiteral` pushes `xrange` via `LOAD_CONST`
/// (not a global lookup -- the range constructor isn't a name the user
/// program could ever rebind).
fn emit_range_literal(b: &mut CodeBuilder, begin: &Node, end: &Node, step: &Option<Box<Node>>, line: usize) {
    let idx = b.const_index(ConstValue::Builtin("range"));
    b.emit_op(Some(line), Opcode::LOAD_CONST, Some(idx));
    emit(b, begin);
    emit(b, end);
    let argcount = if let Some(step) = step {
        emit(b, step);
        3
    } else {
        2
    };
    let arg = pack_call_arg(argcount, 0);
    b.emit_op(Some(line), Opcode::CALL_FUNCTION, Some(arg));
}

fn emit_var(b: &mut CodeBuilder, line: usize, is_get: bool, name: &str, scope: Scope) {
    let (op, arg) = match scope {
        Scope::Local => (if is_get { Opcode::LOAD_FAST } else { Opcode::STORE_FAST }, b.varname_index(name)),
        Scope::Exported | Scope::Closure => {
            (if is_get { Opcode::LOAD_DEREF } else { Opcode::STORE_DEREF }, b.deref_index(name))
        }
        Scope::Global => (if is_get { Opcode::LOAD_GLOBAL } else { Opcode::STORE_GLOBAL }, b.name_index(name)),
    };
    b.emit_op(Some(line), op, Some(arg));
}

fn emit_args(b: &mut CodeBuilder, args: &[Node], kwargs: &[KeywordArg]) {
    for arg in args {
        emit(b, arg);
    }
    for kwarg in kwargs {
        let idx = b.const_index(ConstValue::Str(kwarg.name.clone()));
        b.emit_op(None, Opcode::LOAD_CONST, Some(idx));
        emit(b, &kwarg.value);
    }
}

/// Packs positional/keyword argument counts the way `CALL_FUNCTION`'s
/// single 16-bit operand holds both (`codegen.py`'s `two`): keyword count
/// in the high byte, positional count in the low byte.
fn pack_call_arg(positional: usize, keyword: usize) -> u16 {
    ((keyword as u16) << 8) | (positional as u16 & 0xFF)
}

fn binary_opcode(op: &str) -> Opcode {
    match op {
        "&" => Opcode::BINARY_AND,
        "|" => Opcode::BINARY_OR,
        "^" => Opcode::BINARY_XOR,
        "<<" => Opcode::BINARY_LSHIFT,
        ">>" => Opcode::BINARY_RSHIFT,
        "+" => Opcode::BINARY_ADD,
        "-" => Opcode::BINARY_SUBTRACT,
        "*" => Opcode::BINARY_MULTIPLY,
        "/" => Opcode::BINARY_TRUE_DIVIDE,
        "//" => Opcode::BINARY_FLOOR_DIVIDE,
        "**" => Opcode::BINARY_POWER,
        "%" => Opcode::BINARY_MODULO,
        other => unreachable!("not a binary operator: {other}"),
    }
}

fn unary_opcode(op: &str) -> Opcode {
    match op {
        "+" => Opcode::UNARY_POSITIVE,
        "-" => Opcode::UNARY_NEGATIVE,
        "not" => Opcode::UNARY_NOT,
        "~" => Opcode::UNARY_INVERT,
        other => unreachable!("not a unary operator: {other}"),
    }
}

fn boolean_opcode(op: &str) -> Opcode {
    match op {
        "and" => Opcode::JUMP_IF_FALSE_OR_POP,
        "or" => Opcode::JUMP_IF_TRUE_OR_POP,
        other => unreachable!("not a boolean operator: {other}"),
    }
}

fn emit_function(
    b: &mut CodeBuilder,
    name: &Option<String>,
    args: &[String],
    body: &Node,
    cell: &[String],
    free: &[String],
    line: usize,
) {
    let mut inner = CodeBuilder::new(
        name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
        "<compiled>",
        body.line(),
        args,
        cell,
        free,
    );
    emit(&mut inner, body);
    let code = Rc::new(inner.assemble());

    if free.is_empty() {
        let idx = b.const_index(ConstValue::Code(code));
        b.emit_op(Some(line), Opcode::LOAD_CONST, Some(idx));
        b.emit_op(Some(line), Opcode::MAKE_FUNCTION, Some(0));
    } else {
        for var in free {
            let idx = b.deref_index(var);
            b.emit_op(Some(line), Opcode::LOAD_CLOSURE, Some(idx));
        }
        b.emit_op(Some(line), Opcode::BUILD_TUPLE, Some(free.len() as u16));
        let idx = b.const_index(ConstValue::Code(code));
        b.emit_op(Some(line), Opcode::LOAD_CONST, Some(idx));
        b.emit_op(Some(line), Opcode::MAKE_CLOSURE, Some(0));
    }
}

/// `import name` / `import name(a, b)` (spec.md §4.5, SPEC_FULL.md §2 item
/// 3). Emits `codegen.py`'s `emit_Import` sequence in full, `LOAD_CONST(-1)`
/// / `LOAD_CONST(fromlist)` included: level is always `-1` and fromlist is
/// the tuple of imported names, or `None` for a plain `import name`. The
/// module is loaded once and left on the stack for the whole lowering; the
/// no-`items` branch consumes its single `DUP_TOP` copy via `STORE_GLOBAL`.
/// The original leaves a second, unpopped module copy on the stack in the
/// `items` branch -- its own `IMPORT_FROM` never touches the duplicate
/// beneath it -- which corrupts any later expression's view of the stack
/// (see DESIGN.md); this emits an explicit final `POP_TOP` there instead so
/// both branches leave exactly one value behind, matching every other
/// statement's contract with `emit_block`.
fn emit_import(b: &mut CodeBuilder, item: &crate::ast::ImportItem, line: usize) {
    let level_idx = b.const_index(ConstValue::Int(-1));
    b.emit_op(Some(line), Opcode::LOAD_CONST, Some(level_idx));
    let fromlist_idx = b.const_index(match &item.names {
        Some(names) => ConstValue::Tuple(names.clone()),
        None => ConstValue::None,
    });
    b.emit_op(Some(line), Opcode::LOAD_CONST, Some(fromlist_idx));

    let module_idx = b.name_index(&item.module);
    b.emit_op(Some(line), Opcode::IMPORT_NAME, Some(module_idx));
    b.emit_op(Some(line), Opcode::DUP_TOP, None);

    match &item.names {
        Some(names) => {
            for name in names {
                let idx = b.name_index(name);
                b.emit_op(Some(line), Opcode::IMPORT_FROM, Some(idx));
                b.emit_op(Some(line), Opcode::STORE_GLOBAL, Some(idx));
            }
            b.emit_op(Some(line), Opcode::POP_TOP, None);
        }
        None => {
            let idx = b.name_index(&item.module);
            b.emit_op(Some(line), Opcode::STORE_GLOBAL, Some(idx));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn emit_source(source: &str) -> CodeObject {
        let program = parse_program(source).unwrap();
        emit_program(&program, "<test>")
    }

    #[test]
    fn literal_emits_single_load_const_and_returns() {
        let code = emit_source("42");
        assert_eq!(code.consts, vec![ConstValue::Int(42)]);
        assert_eq!(code.code.last().copied(), Some(Opcode::RETURN_VALUE as u8));
    }

    #[test]
    fn assignment_reuses_the_same_fast_slot() {
        let code = emit_source("a=1; a=a+1; a");
        assert_eq!(code.varnames, vec!["a".to_string()]);
    }

    #[test]
    fn nested_function_closes_over_outer_local() {
        let code = emit_source("seq=/:(x=0; /: x=x+1)");
        let Some(ConstValue::Code(inner)) = code.consts.iter().find_map(|c| match c {
            ConstValue::Code(code) => Some(ConstValue::Code(code.clone())),
            _ => None,
        }) else {
            panic!("expected a nested code object");
        };
        assert_eq!(inner.cellvars, vec!["x".to_string()]);
    }

    #[test]
    fn lnotab_splits_large_line_deltas() {
        let mut long_source = String::new();
        for _ in 0..300 {
            long_source.push_str("1\n");
        }
        long_source.push('2');
        let code = emit_source(&long_source);
        assert!(!code.lnotab.is_empty());
        let total_delta: u32 = code.lnotab.chunks_exact(2).map(|p| p[1] as u32).sum();
        assert!(total_delta >= 299);
    }
}
