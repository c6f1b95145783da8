//! Runtime values the reference interpreter operates on (SPEC_FULL.md §2
//! item 2). Distinct from [`crate::emitter::code_object::ConstValue`]: a
//! `ConstValue` is baked into a code object at compile time, a `Value` is
//! what the stack machine actually pushes and pops while running.

use super::{CompareOp, Globals, VmError};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::emitter::code_object::CodeObject;

/// A `/`-closure or `def`-function, bound to whatever free variables it
/// captured at creation time. Calling it twice shares the same cells, which
/// is how `seq=/:(x=0; /: x=x+1); s=seq(); s()` keeps incrementing the same
/// `x` across calls (spec.md §8 scenario 2).
pub struct Closure {
    pub code: Rc<CodeObject>,
    pub free_cells: Vec<Rc<RefCell<Value>>>,
}

/// `partial(f, ...bound)` (SPEC_FULL.md §2 item 2): remembers the leading
/// positional/keyword arguments a `{...}` partial-call fixed in place.
pub struct Partial {
    pub func: Value,
    pub bound_args: Vec<Value>,
    pub bound_kwargs: Vec<(String, Value)>,
}

/// `compose(f, g)`: calling the result with `(*args, **kwargs)` computes
/// `g(f(*args, **kwargs))`, matching `codegen.py`'s `COMPOSE` lambda.
pub struct Composed {
    pub f: Value,
    pub g: Value,
}

/// A half-open arithmetic range as produced by `begin..end` / `begin..end:step`
/// (SPEC_FULL.md §2 item 1). `step` is never zero -- the `range` builtin
/// rejects that at construction.
pub struct RangeData {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeData {
    pub fn values(&self) -> Vec<Value> {
        let mut out = Vec::new();
        let mut i = self.start;
        if self.step > 0 {
            while i < self.stop {
                out.push(Value::Int(i));
                i += self.step;
            }
        } else {
            while i > self.stop {
                out.push(Value::Int(i));
                i += self.step;
            }
        }
        out
    }
}

/// A suspended `yield`-bearing function body. Resuming is just calling
/// [`Frame::run`](super::Frame::run) again -- the frame's program counter,
/// operand stack and locals already hold everything needed to continue,
/// so no OS thread or channel is involved (spec.md §5 "single-threaded").
pub struct GeneratorState {
    pub frame: RefCell<Option<super::Frame>>,
}

/// A Dojo runtime value. `List`/`Dict` wrap their storage in `Rc<RefCell<_>>`
/// so that `DUP_TOP`-then-mutate sequences (`emit_SetSubscript`,
/// `emit_DictLiteral`) observe the same underlying storage a sibling copy on
/// the stack already holds, exactly as CPython's object-reference semantics
/// do for the bytecode this crate's emitter mirrors.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Range(Rc<RangeData>),
    Function(Rc<Closure>),
    /// A host-supplied function (spec.md §8 scenarios 3 and 5's `f`/
    /// `filter`/`list`). Takes the ambient [`Globals`] too, so a native like
    /// `filter` can call a Dojo closure argument back through
    /// [`super::call_value`].
    Native(Rc<dyn Fn(&[Value], &[(String, Value)], &Globals) -> Result<Value, VmError>>),
    Builtin(&'static str),
    Partial(Rc<Partial>),
    Composed(Rc<Composed>),
    Generator(Rc<GeneratorState>),
    /// A two-element slice bound (`a[x..y]`), meaningful only as a
    /// `BINARY_SUBSCR`/`STORE_SUBSCR` index, never a user-visible result.
    Slice(Box<Value>, Box<Value>),
    /// Operand-stack-only values the emitter's `MAKE_CLOSURE` sequence
    /// produces and immediately consumes: a code object fresh off
    /// `LOAD_CONST` before `MAKE_FUNCTION`/`MAKE_CLOSURE` wraps it, and the
    /// `BUILD_TUPLE` of `LOAD_CLOSURE` cell references feeding it.
    Code(Rc<CodeObject>),
    Cell(Rc<RefCell<Value>>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Dojo truthiness: `None`, `false`, `0`, `0.0` and empty containers are
    /// falsy, matching `compile("2+2==5 and f()")` short-circuiting on the
    /// `false` comparison result (spec.md §8 scenario 3).
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Range(r) => !r.values().is_empty(),
            _ => true,
        }
    }

    /// Materialize an iterable value as a `Vec`, for host-supplied natives
    /// (the `filter`/`list` of spec.md §8 scenario 5) to walk over a range or
    /// list without reaching into this module's internals.
    pub fn to_vec(&self) -> Result<Vec<Value>, VmError> {
        match self {
            Value::List(l) => Ok(l.borrow().clone()),
            Value::Range(r) => Ok(r.values()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(Rc::from(c.to_string().as_str()))).collect()),
            Value::Dict(d) => Ok(d.borrow().iter().map(|(k, _)| k.clone()).collect()),
            other => Err(VmError::TypeMismatch("expected an iterable", other.type_name())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Native(_) => "native",
            Value::Builtin(_) => "builtin",
            Value::Partial(_) => "partial",
            Value::Composed(_) => "composed",
            Value::Generator(_) => "generator",
            Value::Slice(..) => "slice",
            Value::Code(_) => "code",
            Value::Cell(_) => "cell",
            Value::Tuple(_) => "tuple",
        }
    }

    pub fn compare(&self, op: CompareOp, other: &Value) -> Result<Value, VmError> {
        use CompareOp::*;
        match op {
            Eq => return Ok(Value::Bool(self == other)),
            Ne => return Ok(Value::Bool(self != other)),
            In | NotIn => {
                let items = other.to_vec()?;
                let found = items.iter().any(|item| item == self);
                return Ok(Value::Bool(if op == In { found } else { !found }));
            }
            _ => {}
        }
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => return Err(VmError::TypeMismatch("orderable values", self.type_name())),
        };
        let Some(ordering) = ordering else {
            return Err(VmError::TypeMismatch("orderable values", self.type_name()));
        };
        use std::cmp::Ordering::*;
        let result = match (op, ordering) {
            (Lt, Less) | (Le, Less | Equal) | (Gt, Greater) | (Ge, Greater | Equal) => true,
            (Le, _) | (Ge, _) | (Lt, _) | (Gt, _) => false,
            (Eq, _) | (Ne, _) | (In, _) | (NotIn, _) => unreachable!("handled above"),
        };
        Ok(Value::Bool(result))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a.start == b.start && a.stop == b.stop && a.step == b.step,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(l) => write!(f, "{:?}", l.borrow()),
            Value::Dict(d) => write!(f, "{:?}", d.borrow()),
            Value::Range(r) => write!(f, "{}..{}:{}", r.start, r.stop, r.step),
            Value::Function(_) => write!(f, "<function>"),
            Value::Native(_) => write!(f, "<native>"),
            Value::Builtin(name) => write!(f, "<builtin {name}>"),
            Value::Partial(_) => write!(f, "<partial>"),
            Value::Composed(_) => write!(f, "<composed>"),
            Value::Generator(_) => write!(f, "<generator>"),
            Value::Slice(a, b) => write!(f, "{a:?}..{b:?}"),
            Value::Code(c) => write!(f, "<code {}>", c.codename),
            Value::Cell(_) => write!(f, "<cell>"),
            Value::Tuple(t) => write!(f, "{t:?}"),
        }
    }
}
