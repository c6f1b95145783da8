//! Bytecode instruction set (spec.md §4.5).
//!
//! One opcode per CPython-style instruction the original `codegen.py`
//! emits, renumbered for this crate's own [`crate::vm`] rather than
//! matching CPython's real numeric opcodes -- nothing here ever touches an
//! actual `.pyc`. Every instruction is 3 bytes: the opcode followed by a
//! little-endian `u16` argument (unused for zero-arity ops), exactly the
//! shape `CodeBuilder::emit_op` produces.

/// A single instruction. `repr(u8)` so [`CodeBuilder`](super::code_builder::CodeBuilder)
/// can push `Opcode::LOAD_CONST as u8` straight into the code vector and the
/// VM can recover it with [`Opcode::from_u8`].
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    POP_TOP = 0,
    DUP_TOP = 1,
    ROT_TWO = 2,

    LOAD_CONST = 10,
    LOAD_FAST = 11,
    STORE_FAST = 12,
    LOAD_DEREF = 13,
    STORE_DEREF = 14,
    LOAD_GLOBAL = 15,
    STORE_GLOBAL = 16,
    LOAD_ATTR = 17,
    STORE_ATTR = 18,
    LOAD_CLOSURE = 19,

    BINARY_SUBSCR = 20,
    STORE_SUBSCR = 21,
    BUILD_LIST = 22,
    BUILD_MAP = 23,
    BUILD_TUPLE = 24,
    BUILD_SLICE = 25,

    BINARY_ADD = 30,
    BINARY_SUBTRACT = 31,
    BINARY_MULTIPLY = 32,
    BINARY_TRUE_DIVIDE = 33,
    BINARY_FLOOR_DIVIDE = 34,
    BINARY_MODULO = 35,
    BINARY_POWER = 36,
    BINARY_AND = 37,
    BINARY_OR = 38,
    BINARY_XOR = 39,
    BINARY_LSHIFT = 40,
    BINARY_RSHIFT = 41,

    UNARY_POSITIVE = 50,
    UNARY_NEGATIVE = 51,
    UNARY_NOT = 52,
    UNARY_INVERT = 53,

    COMPARE_OP = 60,

    RETURN_VALUE = 70,
    YIELD_VALUE = 71,

    CALL_FUNCTION = 80,
    MAKE_FUNCTION = 81,
    MAKE_CLOSURE = 82,

    JUMP_ABSOLUTE = 90,
    POP_JUMP_IF_FALSE = 91,
    JUMP_IF_FALSE_OR_POP = 92,
    JUMP_IF_TRUE_OR_POP = 93,
    EXTENDED_ARG = 94,

    IMPORT_NAME = 100,
    IMPORT_FROM = 101,
}

impl Opcode {
    /// Opcodes that take no 2-byte argument -- `emit_op` skips writing one
    /// for these (mirrors `codegen.py`'s `emit_op(self, line, op, arg1=None)`).
    pub fn has_arg(self) -> bool {
        !matches!(
            self,
            Opcode::POP_TOP
                | Opcode::DUP_TOP
                | Opcode::ROT_TWO
                | Opcode::BINARY_SUBSCR
                | Opcode::STORE_SUBSCR
                | Opcode::BINARY_ADD
                | Opcode::BINARY_SUBTRACT
                | Opcode::BINARY_MULTIPLY
                | Opcode::BINARY_TRUE_DIVIDE
                | Opcode::BINARY_FLOOR_DIVIDE
                | Opcode::BINARY_MODULO
                | Opcode::BINARY_POWER
                | Opcode::BINARY_AND
                | Opcode::BINARY_OR
                | Opcode::BINARY_XOR
                | Opcode::BINARY_LSHIFT
                | Opcode::BINARY_RSHIFT
                | Opcode::UNARY_POSITIVE
                | Opcode::UNARY_NEGATIVE
                | Opcode::UNARY_NOT
                | Opcode::UNARY_INVERT
                | Opcode::RETURN_VALUE
                | Opcode::YIELD_VALUE
        )
    }

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        const ALL: &[Opcode] = &[
            POP_TOP, DUP_TOP, ROT_TWO, LOAD_CONST, LOAD_FAST, STORE_FAST, LOAD_DEREF,
            STORE_DEREF, LOAD_GLOBAL, STORE_GLOBAL, LOAD_ATTR, STORE_ATTR, LOAD_CLOSURE,
            BINARY_SUBSCR, STORE_SUBSCR, BUILD_LIST, BUILD_MAP, BUILD_TUPLE, BUILD_SLICE,
            BINARY_ADD, BINARY_SUBTRACT, BINARY_MULTIPLY, BINARY_TRUE_DIVIDE,
            BINARY_FLOOR_DIVIDE, BINARY_MODULO, BINARY_POWER, BINARY_AND, BINARY_OR,
            BINARY_XOR, BINARY_LSHIFT, BINARY_RSHIFT, UNARY_POSITIVE, UNARY_NEGATIVE,
            UNARY_NOT, UNARY_INVERT, COMPARE_OP, RETURN_VALUE, YIELD_VALUE, CALL_FUNCTION,
            MAKE_FUNCTION, MAKE_CLOSURE, JUMP_ABSOLUTE, POP_JUMP_IF_FALSE,
            JUMP_IF_FALSE_OR_POP, JUMP_IF_TRUE_OR_POP, EXTENDED_ARG, IMPORT_NAME,
            IMPORT_FROM,
        ];
        ALL.iter().copied().find(|op| *op as u8 == byte)
    }
}

/// `COMPARE_OP`'s argument, spelled out instead of indexing into a shared
/// `cmp_op` tuple the way CPython's real opcode module does (spec.md §9:
/// no borrowed host-runtime internals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompareOp {
    Lt = 0,
    Le = 1,
    Eq = 2,
    Ne = 3,
    Gt = 4,
    Ge = 5,
    In = 6,
    NotIn = 7,
}

impl CompareOp {
    pub fn from_token(op: &str) -> Self {
        match op {
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "in" => CompareOp::In,
            "not in" => CompareOp::NotIn,
            other => unreachable!("not a compare operator: {other}"),
        }
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => CompareOp::Lt,
            1 => CompareOp::Le,
            2 => CompareOp::Eq,
            3 => CompareOp::Ne,
            4 => CompareOp::Gt,
            5 => CompareOp::Ge,
            6 => CompareOp::In,
            7 => CompareOp::NotIn,
            _ => return None,
        })
    }
}
