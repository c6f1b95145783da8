//! The single public entry point a host embeds (SPEC_FULL.md §1.3):
//! `compile(source, filename) -> Result<Callable, CompileError>`.
//!
//! Mirrors `dojo/compiler.py`'s `dojo_compile`/`DojoCallable`, except the
//! `Callable` this crate returns exposes the assembled [`CodeObject`]
//! directly and runs it through this crate's own [`crate::vm`] rather than
//! CPython's `eval` (SPEC_FULL.md §2 item 2) -- the execution engine a host
//! brings is out of scope, so a host that wants its own can skip
//! [`Callable::call`] entirely and read [`Callable::code`].

use std::collections::HashMap;

use crate::emitter::code_object::CodeObject;
use crate::emitter::emit_program;
use crate::error::CompileError;
use crate::parser::parse_program;
use crate::vm::value::Value;
use crate::vm::{run_program, VmError};

/// Parse and lower `source` into a runnable [`Callable`]. `filename`
/// defaults to `<string>`, matching `dojo_compile`'s own default, and is
/// carried into the assembled root [`CodeObject`] purely for diagnostics --
/// nothing in this crate's own error types reads it back out.
pub fn compile(source: &str, filename: Option<&str>) -> Result<Callable, CompileError> {
    let program = parse_program(source)?;
    let code = emit_program(&program, filename.unwrap_or("<string>"));
    Ok(Callable { code: std::rc::Rc::new(code) })
}

/// An assembled program, ready to run. `call` evaluates it once against an
/// optional name -> value environment (spec.md §6 "Compiler API"); the code
/// object itself is immutable and reusable across calls.
pub struct Callable {
    code: std::rc::Rc<CodeObject>,
}

impl Callable {
    /// The assembled bytecode, for a host bringing its own execution engine
    /// (SPEC_FULL.md §2 item 2).
    pub fn code(&self) -> &CodeObject {
        &self.code
    }

    /// Evaluate the program. `globals` seeds free-variable lookups and is
    /// consumed by the call; top-level stores and `import` bindings land in
    /// the VM's own copy, not in anything the caller still holds, so a host
    /// that needs to observe what got bound should do so through a
    /// `Value::Native` closure capturing its own shared state rather than by
    /// inspecting `globals` after `call` returns.
    pub fn call(&self, globals: Option<HashMap<String, Value>>) -> Result<Value, VmError> {
        run_program(self.code.clone(), globals.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_program_returns_none() {
        assert_eq!(compile("   ", None).unwrap().call(None).unwrap(), Value::None);
    }

    #[test]
    fn multi_expr_program_keeps_only_the_last_value() {
        assert_eq!(compile("2+3; 4+5", None).unwrap().call(None).unwrap(), Value::Int(9));
    }

    #[test]
    fn set_variable_and_get_after() {
        assert_eq!(compile("a=2; a+3", None).unwrap().call(None).unwrap(), Value::Int(5));
    }

    #[test]
    fn lf_sensitivity_splits_into_two_expressions() {
        assert_eq!(compile("4\n-2", None).unwrap().call(None).unwrap(), Value::Int(-2));
        assert_eq!(compile("4-2", None).unwrap().call(None).unwrap(), Value::Int(2));
    }
}
