//! A compiler front-end for Dojo, a small expression-oriented scripting
//! language: a longest-match scanner, a recursive-descent parser, and a
//! stack-machine bytecode emitter, plus a minimal reference interpreter so
//! the assembled bytecode is runnable out of the box.
//!
//! # Overview
//!
//! The three core subsystems sit in their own modules, each usable on its
//! own:
//!
//! - [`scanner`] turns source text into a stream of [`scanner::token::Token`]s
//!   by longest match against a table of fixed symbols and named regex
//!   patterns, with line-feed-sensitive peeking for statement
//!   disambiguation.
//! - [`parser`] walks that stream with one recursive-descent function per
//!   precedence level, producing an [`ast::Node`] tree. Assignment folding
//!   goes through an internal `Lvalue` intermediate rather than a dynamic
//!   per-node dispatch.
//! - [`emitter`] lowers that tree into a [`emitter::code_object::CodeObject`]:
//!   a flat instruction stream plus constant/name/local tables, one
//!   [`emitter::code_builder::CodeBuilder`] per nested function body.
//!
//! [`compile`] ties these together into the crate's single public entry
//! point, and [`vm`] is a small reference interpreter for the opcode subset
//! [`emitter::opcode`] defines -- supplementary tooling, not one of the
//! three subsystems above; a host with its own execution engine can ignore
//! it and consume [`compile::Callable::code`] directly.
//!
//! # Example
//!
//! ```
//! use dojo_compiler::compile::compile;
//!
//! let program = compile("def fib(n): n<=2 and 1 or fib(n-1)+fib(n-2); fib(10)", None).unwrap();
//! assert_eq!(program.call(None).unwrap(), dojo_compiler::vm::value::Value::Int(55));
//! ```

pub mod ast;
pub mod compile;
pub mod emitter;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod token_stream;
pub mod util;
pub mod vm;

pub use compile::{compile, Callable};
pub use error::CompileError;
