//! Per-function emission state (spec.md §4.5). One [`CodeBuilder`] exists
//! per `Program`/`Function` node being lowered; [`CodeBuilder::assemble`]
//! consumes it into an immutable [`CodeObject`].

use super::code_object::{CodeObject, ConstValue};
use super::opcode::Opcode;

pub struct CodeBuilder {
    argcount: usize,
    consts: Vec<ConstValue>,
    names: Vec<String>,
    varnames: Vec<String>,
    cellvars: Vec<String>,
    freevars: Vec<String>,
    code: Vec<u8>,
    /// Parallel to `code`: the source line an instruction's *opcode* byte
    /// came from, `None` for the argument bytes that follow it. Feeds
    /// `make_lnotab`.
    line: Vec<Option<usize>>,
    filename: String,
    codename: String,
    firstlineno: usize,
    is_generator: bool,
}

impl CodeBuilder {
    pub fn new(
        codename: impl Into<String>,
        filename: impl Into<String>,
        firstlineno: usize,
        argnames: &[String],
        cellvars: &[String],
        freevars: &[String],
    ) -> Self {
        Self {
            argcount: argnames.len(),
            consts: Vec::new(),
            names: Vec::new(),
            varnames: argnames.to_vec(),
            cellvars: cellvars.to_vec(),
            freevars: freevars.to_vec(),
            code: Vec::new(),
            line: Vec::new(),
            filename: filename.into(),
            codename: codename.into(),
            firstlineno,
            is_generator: false,
        }
    }

    pub fn mark_generator(&mut self) {
        self.is_generator = true;
    }

    fn intern_const(&mut self, value: ConstValue) -> u16 {
        if let Some(i) = self.consts.iter().position(|v| *v == value) {
            return i as u16;
        }
        self.consts.push(value);
        (self.consts.len() - 1) as u16
    }

    pub fn const_index(&mut self, value: ConstValue) -> u16 {
        self.intern_const(value)
    }

    fn intern(table: &mut Vec<String>, name: &str) -> u16 {
        if let Some(i) = table.iter().position(|n| n == name) {
            return i as u16;
        }
        table.push(name.to_string());
        (table.len() - 1) as u16
    }

    pub fn name_index(&mut self, name: &str) -> u16 {
        Self::intern(&mut self.names, name)
    }

    pub fn varname_index(&mut self, name: &str) -> u16 {
        Self::intern(&mut self.varnames, name)
    }

    /// `cellvars` then `freevars`, concatenated -- the numbering
    /// `LOAD_DEREF`/`STORE_DEREF`/`LOAD_CLOSURE` address into (spec.md §4.5
    /// `deref`). Both lists are fixed at construction; a name missing from
    /// both is a bug in the resolver upstream, not a user error.
    pub fn deref_index(&self, name: &str) -> u16 {
        if let Some(i) = self.cellvars.iter().position(|n| n == name) {
            return i as u16;
        }
        let i = self
            .freevars
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} is neither a cellvar nor a freevar"));
        (self.cellvars.len() + i) as u16
    }

    /// Append one instruction. Zero-arg opcodes omit the argument bytes
    /// entirely (mirrors `codegen.py`'s `emit_op(line, op, arg1=None)`).
    pub fn emit_op(&mut self, line: Option<usize>, op: Opcode, arg: Option<u16>) {
        self.code.push(op as u8);
        self.line.push(line);
        if op.has_arg() {
            let arg = arg.unwrap_or(0);
            self.code.push((arg & 0xFF) as u8);
            self.line.push(None);
            self.code.push((arg >> 8) as u8);
            self.line.push(None);
        }
    }

    /// Reserve six bytes for a forward jump whose target isn't known yet,
    /// unconditionally, whether or not the final patched instruction will
    /// need `EXTENDED_ARG` (spec.md §5 Open Question: "patch_op reserves
    /// six bytes always"). Returns the byte offset to later pass to
    /// [`patch_op`](Self::patch_op).
    pub fn patch_point(&mut self, line: usize) -> usize {
        let begin = self.code.len();
        self.code.extend_from_slice(&[0; 6]);
        self.line.push(Some(line));
        self.line.extend(std::iter::repeat(None).take(5));
        begin
    }

    /// Fill in a [`patch_point`](Self::patch_point) reservation with
    /// `EXTENDED_ARG <high16>` followed by `op <low16>`, once `arg` (usually
    /// the now-known jump target) is known.
    pub fn patch_op(&mut self, begin: usize, op: Opcode, arg: u32) {
        self.code[begin] = Opcode::EXTENDED_ARG as u8;
        self.code[begin + 1] = ((arg >> 16) & 0xFF) as u8;
        self.code[begin + 2] = ((arg >> 24) & 0xFF) as u8;
        self.code[begin + 3] = op as u8;
        self.code[begin + 4] = (arg & 0xFF) as u8;
        self.code[begin + 5] = ((arg >> 8) & 0xFF) as u8;
    }

    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Build the `(byte_delta, line_delta)` table, saturating any delta
    /// over 255 into repeated `(255, 0)` / `(delta, 255)` pairs rather than
    /// clamping -- the exact algorithm `dojo/codegen.py`'s `make_lnotab`
    /// uses, since a naive single-byte clamp silently drops line
    /// information for anything but trivially short functions.
    fn make_lnotab(&self) -> Vec<u8> {
        let mut current_line = self.firstlineno;
        let mut current_offset = 0usize;
        let mut lnotab = Vec::new();

        for (i, line) in self.line.iter().enumerate() {
            let Some(line) = line else { continue };
            let line = *line;
            if line <= current_line {
                continue;
            }
            let mut delta_line = line - current_line;
            let mut delta_offset = i - current_offset;
            if delta_offset == 0 {
                continue;
            }

            current_line = line;
            current_offset = i;

            while delta_offset > 255 {
                lnotab.push(255);
                lnotab.push(0);
                delta_offset -= 255;
            }
            while delta_line > 255 {
                lnotab.push(delta_offset as u8);
                lnotab.push(255);
                delta_line -= 255;
                delta_offset = 0;
            }
            lnotab.push(delta_offset as u8);
            lnotab.push(delta_line as u8);
        }

        lnotab
    }

    /// Consume this builder into its immutable [`CodeObject`], appending the
    /// implicit trailing `RETURN_VALUE` every body gets (spec.md §4.5
    /// "assemble").
    pub fn assemble(mut self) -> CodeObject {
        let lnotab = self.make_lnotab();
        self.code.push(Opcode::RETURN_VALUE as u8);
        CodeObject {
            argcount: self.argcount,
            code: self.code,
            consts: self.consts,
            names: self.names,
            varnames: self.varnames,
            cellvars: self.cellvars,
            freevars: self.freevars,
            filename: self.filename,
            codename: self.codename,
            firstlineno: self.firstlineno,
            lnotab,
            is_generator: self.is_generator,
        }
    }
}
