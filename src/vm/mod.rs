//! A reference interpreter for the bytecode [`crate::emitter`] produces
//! (SPEC_FULL.md §2 item 2). Supplementary, not one of the three core
//! subsystems spec.md calls out as "the hard engineering" -- a host with its
//! own execution engine can ignore this module entirely and consume
//! [`crate::compile::Callable::code`] directly.
//!
//! Suspension for `yield` is handled by simply returning from
//! [`Frame::run`] on `YIELD_VALUE` and resuming later from the frame's own
//! saved `pc`/stack/locals, rather than an OS thread or channel -- this
//! crate is single-threaded throughout (spec.md §5).

pub mod value;

use crate::emitter::code_object::{CodeObject, ConstValue};
use crate::emitter::opcode::{CompareOp, Opcode};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use value::{Closure, Composed, GeneratorState, Partial, RangeData, Value};

/// A name -> value mapping a [`crate::compile::Callable`] is run against:
/// read for free (global-scope) variable lookups, written by `import`
/// (spec.md §6 "External Interfaces").
pub type Globals = Rc<RefCell<HashMap<String, Value>>>;

/// Failure produced while running already-compiled bytecode. Distinct from
/// [`crate::error::CompileError`] -- this crate has no error-recovery
/// notion here either: the first one aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    NotCallable(&'static str),
    TypeMismatch(&'static str, &'static str),
    UnknownGlobal(String),
    UnknownModule(String),
    NoSuchAttribute(String),
    KeyNotFound,
    IndexOutOfRange,
    DivisionByZero,
    ZeroStepRange,
}

impl Display for VmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VmError::NotCallable(found) => write!(f, "'{found}' is not callable"),
            VmError::TypeMismatch(expected, found) => write!(f, "expected {expected}, found '{found}'"),
            VmError::UnknownGlobal(name) => write!(f, "undefined global '{name}'"),
            VmError::UnknownModule(name) => write!(f, "no such module '{name}'"),
            VmError::NoSuchAttribute(name) => write!(f, "no such attribute '{name}'"),
            VmError::KeyNotFound => write!(f, "key not found"),
            VmError::IndexOutOfRange => write!(f, "index out of range"),
            VmError::DivisionByZero => write!(f, "division by zero"),
            VmError::ZeroStepRange => write!(f, "range step must not be zero"),
        }
    }
}

impl std::error::Error for VmError {}

fn const_to_value(c: &ConstValue) -> Value {
    match c {
        ConstValue::None => Value::None,
        ConstValue::Bool(b) => Value::Bool(*b),
        ConstValue::Int(i) => Value::Int(*i),
        ConstValue::Float(f) => Value::Float(*f),
        ConstValue::Str(s) => Value::Str(Rc::from(s.as_str())),
        ConstValue::Tuple(items) => {
            Value::Tuple(items.iter().map(|s| Value::Str(Rc::from(s.as_str()))).collect())
        }
        ConstValue::Code(code) => Value::Code(code.clone()),
        ConstValue::Builtin(name) => Value::Builtin(name),
    }
}

/// What a frame stopped on: either it ran off the end of its body (always
/// via the implicit trailing `RETURN_VALUE` every [`CodeObject`] has), or it
/// hit `YIELD_VALUE` and is suspended for a later [`Frame::run`] call.
pub enum Outcome {
    Return(Value),
    Yield(Value),
}

/// One activation record: a function call's program counter, operand stack,
/// fast locals and `cellvars`+`freevars` cell storage (spec.md §4.5
/// `deref`). Persists across suspension, which is what makes resuming a
/// generator just another call to [`run`](Self::run).
pub struct Frame {
    code: Rc<CodeObject>,
    pc: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
    cells: Vec<Rc<RefCell<Value>>>,
}

impl Frame {
    fn new(code: Rc<CodeObject>, locals: Vec<Value>, free_cells: Vec<Rc<RefCell<Value>>>) -> Self {
        let mut locals = locals;
        locals.resize(code.varnames.len(), Value::None);
        let mut cells: Vec<Rc<RefCell<Value>>> =
            (0..code.cellvars.len()).map(|_| Rc::new(RefCell::new(Value::None))).collect();
        cells.extend(free_cells);
        Self { code, pc: 0, stack: Vec::new(), locals, cells }
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: malformed bytecode")
    }

    fn peek(&self) -> &Value {
        self.stack.last().expect("stack underflow: malformed bytecode")
    }

    /// Read one instruction at `self.pc`, transparently folding a preceding
    /// `EXTENDED_ARG` into a 32-bit argument -- the uniform jump-patch
    /// format every forward jump uses (spec.md §5 Open Question, SPEC_FULL
    /// §5 "patch_op reserves six bytes unconditionally").
    fn fetch(&mut self) -> (Opcode, u32) {
        let op = Opcode::from_u8(self.code.code[self.pc]).expect("invalid opcode byte");
        if op == Opcode::EXTENDED_ARG {
            let high = self.read_u16(self.pc + 1) as u32;
            self.pc += 3;
            let op = Opcode::from_u8(self.code.code[self.pc]).expect("invalid opcode byte");
            let low = self.read_u16(self.pc + 1) as u32;
            self.pc += 3;
            (op, (high << 16) | low)
        } else if op.has_arg() {
            let arg = self.read_u16(self.pc + 1) as u32;
            self.pc += 3;
            (op, arg)
        } else {
            self.pc += 1;
            (op, 0)
        }
    }

    fn read_u16(&self, at: usize) -> u16 {
        self.code.code[at] as u16 | ((self.code.code[at + 1] as u16) << 8)
    }

    /// Run until this frame returns or yields. Calling `run` again after a
    /// `Yield` continues exactly where it left off, since `pc`/`stack`/
    /// `locals`/`cells` all live in `self`.
    pub fn run(&mut self, globals: &Globals) -> Result<Outcome, VmError> {
        loop {
            let (op, arg) = self.fetch();
            match op {
                Opcode::POP_TOP => {
                    self.pop();
                }
                Opcode::DUP_TOP => {
                    let top = self.peek().clone();
                    self.push(top);
                }
                Opcode::ROT_TWO => {
                    let a = self.pop();
                    let b = self.pop();
                    self.push(a);
                    self.push(b);
                }
                Opcode::LOAD_CONST => {
                    let v = const_to_value(&self.code.consts[arg as usize]);
                    self.push(v);
                }
                Opcode::LOAD_FAST => self.push(self.locals[arg as usize].clone()),
                Opcode::STORE_FAST => {
                    let v = self.pop();
                    self.locals[arg as usize] = v;
                }
                Opcode::LOAD_DEREF => {
                    let v = self.cells[arg as usize].borrow().clone();
                    self.push(v);
                }
                Opcode::STORE_DEREF => {
                    let v = self.pop();
                    *self.cells[arg as usize].borrow_mut() = v;
                }
                Opcode::LOAD_CLOSURE => {
                    let cell = self.cells[arg as usize].clone();
                    self.push(Value::Cell(cell));
                }
                Opcode::LOAD_GLOBAL => {
                    let name = &self.code.names[arg as usize];
                    let v = globals
                        .borrow()
                        .get(name)
                        .cloned()
                        .ok_or_else(|| VmError::UnknownGlobal(name.clone()))?;
                    self.push(v);
                }
                Opcode::STORE_GLOBAL => {
                    let name = self.code.names[arg as usize].clone();
                    let v = self.pop();
                    globals.borrow_mut().insert(name, v);
                }
                Opcode::LOAD_ATTR => {
                    let name = &self.code.names[arg as usize];
                    let target = self.pop();
                    self.push(get_attribute(&target, name)?);
                }
                Opcode::STORE_ATTR => {
                    let name = self.code.names[arg as usize].clone();
                    let target = self.pop();
                    let value = self.pop();
                    set_attribute(&target, &name, value)?;
                }
                Opcode::BINARY_SUBSCR => {
                    let index = self.pop();
                    let target = self.pop();
                    self.push(get_subscript(&target, &index)?);
                }
                Opcode::STORE_SUBSCR => {
                    let index = self.pop();
                    let target = self.pop();
                    let value = self.pop();
                    set_subscript(&target, &index, value)?;
                }
                Opcode::BUILD_LIST => {
                    let n = arg as usize;
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.push(Value::List(Rc::new(RefCell::new(items))));
                }
                Opcode::BUILD_MAP => {
                    self.push(Value::Dict(Rc::new(RefCell::new(Vec::new()))));
                }
                Opcode::BUILD_TUPLE => {
                    let n = arg as usize;
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.push(Value::Tuple(items));
                }
                Opcode::BUILD_SLICE => {
                    let end = self.pop();
                    let start = self.pop();
                    self.push(Value::Slice(Box::new(start), Box::new(end)));
                }
                Opcode::BINARY_ADD | Opcode::BINARY_SUBTRACT | Opcode::BINARY_MULTIPLY
                | Opcode::BINARY_TRUE_DIVIDE | Opcode::BINARY_FLOOR_DIVIDE | Opcode::BINARY_MODULO
                | Opcode::BINARY_POWER | Opcode::BINARY_AND | Opcode::BINARY_OR | Opcode::BINARY_XOR
                | Opcode::BINARY_LSHIFT | Opcode::BINARY_RSHIFT => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(binary_op(op, &lhs, &rhs)?);
                }
                Opcode::UNARY_POSITIVE | Opcode::UNARY_NEGATIVE | Opcode::UNARY_NOT | Opcode::UNARY_INVERT => {
                    let v = self.pop();
                    self.push(unary_op(op, &v)?);
                }
                Opcode::COMPARE_OP => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    let cmp = CompareOp::from_u8(arg as u8).expect("invalid compare op byte");
                    self.push(lhs.compare(cmp, &rhs)?);
                }
                Opcode::RETURN_VALUE => {
                    let v = self.pop();
                    return Ok(Outcome::Return(v));
                }
                Opcode::YIELD_VALUE => {
                    let v = self.pop();
                    return Ok(Outcome::Yield(v));
                }
                Opcode::CALL_FUNCTION => {
                    let positional = (arg & 0xFF) as usize;
                    let keyword = (arg >> 8) as usize;
                    let mut kwargs = Vec::with_capacity(keyword);
                    for _ in 0..keyword {
                        let value = self.pop();
                        let key = self.pop();
                        let Value::Str(key) = key else {
                            panic!("keyword argument name must be a string constant");
                        };
                        kwargs.push((key.to_string(), value));
                    }
                    kwargs.reverse();
                    let mut args = Vec::with_capacity(positional);
                    for _ in 0..positional {
                        args.push(self.pop());
                    }
                    args.reverse();
                    let callee = self.pop();
                    self.push(call_value(&callee, args, kwargs, globals)?);
                }
                Opcode::MAKE_FUNCTION => {
                    let Value::Code(code) = self.pop() else {
                        panic!("MAKE_FUNCTION expects a code constant on top of stack");
                    };
                    self.push(Value::Function(Rc::new(Closure { code, free_cells: Vec::new() })));
                }
                Opcode::MAKE_CLOSURE => {
                    let Value::Code(code) = self.pop() else {
                        panic!("MAKE_CLOSURE expects a code constant on top of stack");
                    };
                    let Value::Tuple(cells) = self.pop() else {
                        panic!("MAKE_CLOSURE expects a cell tuple under the code constant");
                    };
                    let free_cells = cells
                        .into_iter()
                        .map(|v| match v {
                            Value::Cell(cell) => cell,
                            _ => panic!("MAKE_CLOSURE tuple must hold only cell references"),
                        })
                        .collect();
                    self.push(Value::Function(Rc::new(Closure { code, free_cells })));
                }
                Opcode::JUMP_ABSOLUTE => self.pc = arg as usize,
                Opcode::POP_JUMP_IF_FALSE => {
                    let v = self.pop();
                    if !v.truthy() {
                        self.pc = arg as usize;
                    }
                }
                Opcode::JUMP_IF_FALSE_OR_POP => {
                    if !self.peek().truthy() {
                        self.pc = arg as usize;
                    } else {
                        self.pop();
                    }
                }
                Opcode::JUMP_IF_TRUE_OR_POP => {
                    if self.peek().truthy() {
                        self.pc = arg as usize;
                    } else {
                        self.pop();
                    }
                }
                Opcode::EXTENDED_ARG => unreachable!("folded into the following instruction by fetch()"),
                Opcode::IMPORT_NAME => {
                    // Pop the fromlist and level constants `emit_import` pushed ahead
                    // of this op; this VM resolves imports by name alone.
                    self.pop();
                    self.pop();
                    let name = &self.code.names[arg as usize];
                    let module = globals
                        .borrow()
                        .get(name)
                        .cloned()
                        .ok_or_else(|| VmError::UnknownModule(name.clone()))?;
                    self.push(module);
                }
                Opcode::IMPORT_FROM => {
                    let name = &self.code.names[arg as usize];
                    let module = self.peek().clone();
                    self.push(get_attribute(&module, name)?);
                }
            }
        }
    }
}

fn get_attribute(target: &Value, name: &str) -> Result<Value, VmError> {
    match target {
        Value::Dict(d) => d
            .borrow()
            .iter()
            .find(|(k, _)| matches!(k, Value::Str(s) if s.as_ref() == name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| VmError::NoSuchAttribute(name.to_string())),
        other => Err(VmError::TypeMismatch("a dict", other.type_name())),
    }
}

fn set_attribute(target: &Value, name: &str, value: Value) -> Result<(), VmError> {
    match target {
        Value::Dict(d) => {
            let mut d = d.borrow_mut();
            if let Some(entry) = d.iter_mut().find(|(k, _)| matches!(k, Value::Str(s) if s.as_ref() == name)) {
                entry.1 = value;
            } else {
                d.push((Value::Str(Rc::from(name)), value));
            }
            Ok(())
        }
        other => Err(VmError::TypeMismatch("a dict", other.type_name())),
    }
}

fn get_subscript(target: &Value, index: &Value) -> Result<Value, VmError> {
    match (target, index) {
        (Value::List(l), Value::Int(i)) => {
            let l = l.borrow();
            resolve_index(*i, l.len()).map(|i| l[i].clone())
        }
        (Value::List(l), Value::Slice(start, end)) => {
            let l = l.borrow();
            let (start, end) = slice_bounds(start, end, l.len())?;
            Ok(Value::List(Rc::new(RefCell::new(l[start..end].to_vec()))))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            resolve_index(*i, chars.len()).map(|i| Value::Str(Rc::from(chars[i].to_string().as_str())))
        }
        (Value::Str(s), Value::Slice(start, end)) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(start, end, chars.len())?;
            Ok(Value::Str(Rc::from(chars[start..end].iter().collect::<String>().as_str())))
        }
        (Value::Dict(d), key) => d
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or(VmError::KeyNotFound),
        (Value::Range(r), Value::Int(i)) => {
            let values = r.values();
            resolve_index(*i, values.len()).map(|i| values[i].clone())
        }
        (other, _) => Err(VmError::TypeMismatch("a list, string, dict or range", other.type_name())),
    }
}

fn set_subscript(target: &Value, index: &Value, value: Value) -> Result<(), VmError> {
    match (target, index) {
        (Value::List(l), Value::Int(i)) => {
            let mut l = l.borrow_mut();
            let i = resolve_index(*i, l.len())?;
            l[i] = value;
            Ok(())
        }
        (Value::Dict(d), key) => {
            let mut d = d.borrow_mut();
            if let Some(entry) = d.iter_mut().find(|(k, _)| k == key) {
                entry.1 = value;
            } else {
                d.push((key.clone(), value));
            }
            Ok(())
        }
        (other, _) => Err(VmError::TypeMismatch("a list or dict", other.type_name())),
    }
}

/// Negative indices count from the end, as in `original_source`'s host
/// language; out-of-range in either direction is a [`VmError::IndexOutOfRange`].
fn resolve_index(i: i64, len: usize) -> Result<usize, VmError> {
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved as usize >= len {
        Err(VmError::IndexOutOfRange)
    } else {
        Ok(resolved as usize)
    }
}

fn slice_bound(v: &Value, len: usize, default: usize) -> Result<usize, VmError> {
    match v {
        Value::None => Ok(default),
        Value::Int(i) => {
            let resolved = if *i < 0 { *i + len as i64 } else { *i };
            Ok(resolved.clamp(0, len as i64) as usize)
        }
        other => Err(VmError::TypeMismatch("an integer bound", other.type_name())),
    }
}

fn slice_bounds(start: &Value, end: &Value, len: usize) -> Result<(usize, usize), VmError> {
    let start = slice_bound(start, len, 0)?;
    let end = slice_bound(end, len, len)?;
    Ok((start, end.max(start)))
}

fn numeric_pair(lhs: &Value, rhs: &Value) -> Result<(f64, f64, bool), VmError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok((*a as f64, *b as f64, true)),
        (Value::Int(a), Value::Float(b)) => Ok((*a as f64, *b, false)),
        (Value::Float(a), Value::Int(b)) => Ok((*a, *b as f64, false)),
        (Value::Float(a), Value::Float(b)) => Ok((*a, *b, false)),
        _ => Err(VmError::TypeMismatch("numeric operands", lhs.type_name())),
    }
}

fn int_pair(lhs: &Value, rhs: &Value) -> Result<(i64, i64), VmError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        _ => Err(VmError::TypeMismatch("integer operands", lhs.type_name())),
    }
}

fn binary_op(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
    if op == Opcode::BINARY_ADD {
        match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => return Ok(Value::Str(Rc::from(format!("{a}{b}").as_str()))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Ok(Value::List(Rc::new(RefCell::new(items))));
            }
            _ => {}
        }
    }
    match op {
        Opcode::BINARY_AND | Opcode::BINARY_OR | Opcode::BINARY_XOR | Opcode::BINARY_LSHIFT
        | Opcode::BINARY_RSHIFT => {
            let (a, b) = int_pair(lhs, rhs)?;
            return Ok(Value::Int(match op {
                Opcode::BINARY_AND => a & b,
                Opcode::BINARY_OR => a | b,
                Opcode::BINARY_XOR => a ^ b,
                Opcode::BINARY_LSHIFT => a << b,
                Opcode::BINARY_RSHIFT => a >> b,
                _ => unreachable!(),
            }));
        }
        Opcode::BINARY_TRUE_DIVIDE => {
            let (a, b, _) = numeric_pair(lhs, rhs)?;
            if b == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            return Ok(Value::Float(a / b));
        }
        Opcode::BINARY_FLOOR_DIVIDE => {
            if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
                if *b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                return Ok(Value::Int(a.div_euclid(*b)));
            }
            let (a, b, _) = numeric_pair(lhs, rhs)?;
            if b == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            return Ok(Value::Float((a / b).floor()));
        }
        Opcode::BINARY_MODULO => {
            if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
                if *b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                return Ok(Value::Int(a.rem_euclid(*b)));
            }
            let (a, b, _) = numeric_pair(lhs, rhs)?;
            if b == 0.0 {
                return Err(VmError::DivisionByZero);
            }
            return Ok(Value::Float(a - b * (a / b).floor()));
        }
        Opcode::BINARY_POWER => {
            if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
                if *b >= 0 {
                    return Ok(Value::Int(a.pow(*b as u32)));
                }
            }
            let (a, b, _) = numeric_pair(lhs, rhs)?;
            return Ok(Value::Float(a.powf(b)));
        }
        _ => {}
    }
    let (a, b, both_int) = numeric_pair(lhs, rhs)?;
    let result = match op {
        Opcode::BINARY_ADD => a + b,
        Opcode::BINARY_SUBTRACT => a - b,
        Opcode::BINARY_MULTIPLY => a * b,
        other => unreachable!("unhandled binary opcode {other:?}"),
    };
    Ok(if both_int { Value::Int(result as i64) } else { Value::Float(result) })
}

fn unary_op(op: Opcode, v: &Value) -> Result<Value, VmError> {
    match op {
        Opcode::UNARY_NOT => Ok(Value::Bool(!v.truthy())),
        Opcode::UNARY_POSITIVE => match v {
            Value::Int(_) | Value::Float(_) => Ok(v.clone()),
            other => Err(VmError::TypeMismatch("a number", other.type_name())),
        },
        Opcode::UNARY_NEGATIVE => match v {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(VmError::TypeMismatch("a number", other.type_name())),
        },
        Opcode::UNARY_INVERT => match v {
            Value::Int(i) => Ok(Value::Int(!i)),
            other => Err(VmError::TypeMismatch("an integer", other.type_name())),
        },
        other => unreachable!("unhandled unary opcode {other:?}"),
    }
}

/// Dispatch a `CALL_FUNCTION` against whatever [`Value`] is in callee
/// position -- a user-defined closure, a host native, or one of the
/// `partial`/`compose`/`range` builtins pushed via `LOAD_CONST`
/// (SPEC_FULL.md §2 items 1-2).
pub fn call_value(
    callee: &Value,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    globals: &Globals,
) -> Result<Value, VmError> {
    match callee {
        Value::Function(closure) => call_closure(closure, args, kwargs, globals),
        Value::Native(f) => f(&args, &kwargs, globals),
        Value::Partial(p) => {
            let mut combined_args = p.bound_args.clone();
            combined_args.extend(args);
            let mut combined_kwargs = p.bound_kwargs.clone();
            combined_kwargs.extend(kwargs);
            call_value(&p.func, combined_args, combined_kwargs, globals)
        }
        Value::Composed(c) => {
            let mid = call_value(&c.f, args, kwargs, globals)?;
            call_value(&c.g, vec![mid], Vec::new(), globals)
        }
        Value::Builtin(name) => call_builtin(name, args, kwargs),
        other => Err(VmError::NotCallable(other.type_name())),
    }
}

fn call_closure(
    closure: &Rc<Closure>,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    globals: &Globals,
) -> Result<Value, VmError> {
    let mut locals = args;
    locals.resize(closure.code.argcount, Value::None);
    for (name, value) in kwargs {
        if let Some(i) = closure.code.varnames[..closure.code.argcount].iter().position(|n| *n == name) {
            locals[i] = value;
        }
    }

    let frame = Frame::new(closure.code.clone(), locals, closure.free_cells.clone());

    if closure.code.is_generator {
        return Ok(Value::Generator(Rc::new(GeneratorState { frame: RefCell::new(Some(frame)) })));
    }

    let mut frame = frame;
    match frame.run(globals)? {
        Outcome::Return(v) => Ok(v),
        Outcome::Yield(_) => unreachable!("is_generator is false: no YIELD_VALUE was ever emitted"),
    }
}

fn call_builtin(name: &'static str, mut args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Result<Value, VmError> {
    match name {
        "partial" => {
            if args.is_empty() {
                return Err(VmError::TypeMismatch("a function to partially apply", "nothing"));
            }
            let func = args.remove(0);
            Ok(Value::Partial(Rc::new(Partial { func, bound_args: args, bound_kwargs: kwargs })))
        }
        "compose" => {
            if args.len() != 2 {
                return Err(VmError::TypeMismatch("exactly two functions", "wrong arity"));
            }
            let g = args.pop().unwrap();
            let f = args.pop().unwrap();
            Ok(Value::Composed(Rc::new(Composed { f, g })))
        }
        "range" => {
            let ints: Vec<i64> = args
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Ok(*i),
                    other => Err(VmError::TypeMismatch("integer range bounds", other.type_name())),
                })
                .collect::<Result<_, _>>()?;
            let (start, stop, step) = match ints[..] {
                [start, stop] => (start, stop, 1),
                [start, stop, step] => (start, stop, step),
                _ => return Err(VmError::TypeMismatch("2 or 3 range arguments", "wrong arity")),
            };
            if step == 0 {
                return Err(VmError::ZeroStepRange);
            }
            Ok(Value::Range(Rc::new(RangeData { start, stop, step })))
        }
        other => unreachable!("no such builtin: {other}"),
    }
}

/// Advance a suspended generator one `yield` at a time, returning `None`
/// once its body runs to completion.
pub fn generator_next(state: &GeneratorState, globals: &Globals) -> Result<Option<Value>, VmError> {
    let mut slot = state.frame.borrow_mut();
    let Some(mut frame) = slot.take() else { return Ok(None) };
    match frame.run(globals)? {
        Outcome::Yield(v) => {
            *slot = Some(frame);
            Ok(Some(v))
        }
        Outcome::Return(_) => Ok(None),
    }
}

/// Run a freshly assembled root program to completion (SPEC_FULL.md §0
/// "Compiler API"). The root code object is itself a plain zero-argument
/// frame, same as any function body -- its `Exported` locals are `cellvars`
/// on this very frame, not a special case (spec.md §4.3, §4.5).
pub fn run_program(code: Rc<CodeObject>, globals: HashMap<String, Value>) -> Result<Value, VmError> {
    let globals: Globals = Rc::new(RefCell::new(globals));
    let mut frame = Frame::new(code, Vec::new(), Vec::new());
    match frame.run(&globals)? {
        Outcome::Return(v) => Ok(v),
        Outcome::Yield(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    fn run(source: &str) -> Value {
        compile(source, None).unwrap().call(None).unwrap()
    }

    fn run_with(source: &str, globals: HashMap<String, Value>) -> Value {
        compile(source, None).unwrap().call(Some(globals)).unwrap()
    }

    #[test]
    fn constant_folding_and_precedence() {
        assert_eq!(run("42+2"), Value::Int(44));
        assert_eq!(run("2+3*4"), Value::Int(14));
        assert_eq!(run("(2+3)*4"), Value::Int(20));
    }

    #[test]
    fn true_and_floor_division() {
        assert_eq!(run("43/2"), Value::Float(21.5));
        assert_eq!(run("43//2"), Value::Int(21));
        assert_eq!(run("42%4"), Value::Int(2));
        assert_eq!(run("2**10"), Value::Int(1024));
    }

    #[test]
    fn closure_keeps_incrementing_shared_cell() {
        let v = run("seq=/:(x=0; /: x=x+1); s=seq(); [s(),s(),s()]");
        let Value::List(l) = v else { panic!("expected a list") };
        assert_eq!(*l.borrow(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn short_circuit_and_skips_the_right_hand_side() {
        let calls = Rc::new(RefCell::new(0));
        let counted = calls.clone();
        let mut g = HashMap::new();
        g.insert(
            "f".to_string(),
            Value::Native(Rc::new(move |_args: &[Value], _kwargs: &[(String, Value)], _g: &Globals| {
                *counted.borrow_mut() += 1;
                Ok(Value::Bool(true))
            })),
        );
        assert_eq!(run_with("2+2==5 and f()", g.clone()), Value::Bool(false));
        assert_eq!(*calls.borrow(), 0);

        let calls2 = Rc::new(RefCell::new(0));
        let counted2 = calls2.clone();
        let mut g2 = HashMap::new();
        g2.insert(
            "f".to_string(),
            Value::Native(Rc::new(move |_args: &[Value], _kwargs: &[(String, Value)], _g: &Globals| {
                *counted2.borrow_mut() += 1;
                Ok(Value::Bool(true))
            })),
        );
        assert_eq!(run_with("2+2==4 and f()", g2), Value::Bool(true));
        assert_eq!(*calls2.borrow(), 1);
    }

    #[test]
    fn recursive_fibonacci_via_global_upgrade() {
        assert_eq!(run("def fib(n): n<=2 and 1 or fib(n-1)+fib(n-2); fib(10)"), Value::Int(55));
    }

    #[test]
    fn set_subscript_yields_the_assigned_value_and_mutates_in_place() {
        let v = run("a=[1,2,3,4]; a[2]=42; a");
        let Value::List(l) = v else { panic!("expected a list") };
        assert_eq!(*l.borrow(), vec![Value::Int(1), Value::Int(2), Value::Int(42), Value::Int(4)]);
    }
}
