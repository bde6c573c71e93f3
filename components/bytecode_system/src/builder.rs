//! Incremental construction of code objects.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::{self, CodeError};
use crate::{
    CodeFlags, CodeObject, Constant, HandlerEntry, HandlerKind, LineEntry, LineTable, Opcode,
};

/// A forward-referenceable instruction offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

#[derive(Debug, Clone, Copy)]
struct PendingHandler {
    kind: HandlerKind,
    start: Label,
    end: Label,
    target: Label,
    body_end: Label,
    stack_depth: u32,
}

/// Assembles a [`CodeObject`] instruction by instruction.
///
/// Jumps and handler ranges refer to [`Label`]s that are bound later;
/// [`CodeBuilder::build`] resolves them and validates the result.
///
/// # Examples
///
/// ```
/// use bytecode_system::{CodeBuilder, Constant, Opcode};
///
/// let mut b = CodeBuilder::function("answer", 1);
/// b.line(2);
/// b.load_const(Constant::Int(42));
/// b.emit(Opcode::Return);
/// let code = b.build().unwrap();
///
/// assert_eq!(code.name(), "answer");
/// assert_eq!(code.line_table().line_for(0), 2);
/// ```
#[derive(Debug)]
pub struct CodeBuilder {
    name: String,
    first_line: u32,
    flags: CodeFlags,
    argcount: u32,
    instructions: Vec<Opcode>,
    constants: Vec<Constant>,
    varnames: Vec<String>,
    names: Vec<String>,
    lines: Vec<LineEntry>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    handlers: Vec<PendingHandler>,
}

impl CodeBuilder {
    /// Start a code object with the given flags.
    pub fn new(name: impl Into<String>, first_line: u32, flags: CodeFlags) -> Self {
        Self {
            name: name.into(),
            first_line,
            flags,
            argcount: 0,
            instructions: Vec::new(),
            constants: Vec::new(),
            varnames: Vec::new(),
            names: Vec::new(),
            lines: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Start a function body: locals live in fast slots.
    pub fn function(name: impl Into<String>, first_line: u32) -> Self {
        Self::new(name, first_line, CodeFlags::OPTIMIZED)
    }

    /// Start a generator function body.
    pub fn generator(name: impl Into<String>, first_line: u32) -> Self {
        Self::new(name, first_line, CodeFlags::OPTIMIZED | CodeFlags::GENERATOR)
    }

    /// Start module-level code: locals are a namespace.
    pub fn module(name: impl Into<String>, first_line: u32) -> Self {
        Self::new(name, first_line, CodeFlags::empty())
    }

    /// Add flags.
    pub fn with_flags(mut self, flags: CodeFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Declare the next positional parameter.
    ///
    /// Parameters must be declared before any other local.
    pub fn param(mut self, name: &str) -> Self {
        self.local(name);
        self.argcount += 1;
        self
    }

    /// Declare the varargs parameter, after the positional ones.
    pub fn varargs(mut self, name: &str) -> Self {
        self.local(name);
        self.flags |= CodeFlags::VARARGS;
        self
    }

    /// Index of a fast local, declaring it on first use.
    pub fn local(&mut self, name: &str) -> u32 {
        intern(&mut self.varnames, name)
    }

    /// Index of a name-table entry, adding it on first use.
    pub fn name(&mut self, name: &str) -> u32 {
        intern(&mut self.names, name)
    }

    /// Index of a constant, reusing an equal one when present.
    pub fn constant(&mut self, constant: Constant) -> u32 {
        if let Some(i) = self.constants.iter().position(|c| *c == constant) {
            return i as u32;
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Attribute the following instructions to `line`.
    pub fn line(&mut self, line: u32) -> &mut Self {
        let start = self.offset();
        match self.lines.last_mut() {
            Some(last) if last.start == start => last.line = line,
            Some(last) if last.line == line => {}
            _ => self.lines.push(LineEntry { start, line }),
        }
        self
    }

    /// Offset the next instruction will occupy.
    pub fn offset(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Append an instruction and return its offset.
    pub fn emit(&mut self, op: Opcode) -> u32 {
        self.instructions.push(op);
        self.offset() - 1
    }

    /// Append a jump-carrying instruction whose target is `label`.
    pub fn emit_jump(&mut self, op: fn(u32) -> Opcode, label: Label) -> u32 {
        let at = self.emit(op(0));
        self.fixups.push((at as usize, label));
        at
    }

    /// Create an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.offset());
    }

    /// Create a label bound to the current offset.
    pub fn here(&mut self) -> Label {
        let label = self.label();
        self.bind(label);
        label
    }

    /// Register a protected region. Nested regions must be registered
    /// innermost first.
    pub fn handler(
        &mut self,
        kind: HandlerKind,
        (start, end): (Label, Label),
        (target, body_end): (Label, Label),
        stack_depth: u32,
    ) {
        self.handlers.push(PendingHandler {
            kind,
            start,
            end,
            target,
            body_end,
            stack_depth,
        });
    }

    /// `LoadConst` with pooling.
    pub fn load_const(&mut self, constant: impl Into<Constant>) -> u32 {
        let index = self.constant(constant.into());
        self.emit(Opcode::LoadConst(index))
    }

    /// `LoadFast` by name.
    pub fn load_fast(&mut self, name: &str) -> u32 {
        let index = self.local(name);
        self.emit(Opcode::LoadFast(index))
    }

    /// `StoreFast` by name.
    pub fn store_fast(&mut self, name: &str) -> u32 {
        let index = self.local(name);
        self.emit(Opcode::StoreFast(index))
    }

    /// `LoadName` by name.
    pub fn load_name(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::LoadName(index))
    }

    /// `StoreName` by name.
    pub fn store_name(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::StoreName(index))
    }

    /// `LoadGlobal` by name.
    pub fn load_global(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::LoadGlobal(index))
    }

    /// `StoreGlobal` by name.
    pub fn store_global(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::StoreGlobal(index))
    }

    /// `LoadAttr` by name.
    pub fn load_attr(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::LoadAttr(index))
    }

    /// `StoreAttr` by name.
    pub fn store_attr(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::StoreAttr(index))
    }

    /// `DeleteAttr` by name.
    pub fn delete_attr(&mut self, name: &str) -> u32 {
        let index = self.name(name);
        self.emit(Opcode::DeleteAttr(index))
    }

    /// `MakeFunction` over a nested code object.
    pub fn make_function(&mut self, code: Arc<CodeObject>) -> u32 {
        let index = self.constant(Constant::Code(code));
        self.emit(Opcode::MakeFunction(index))
    }

    /// `Return None`.
    pub fn return_none(&mut self) -> u32 {
        self.load_const(Constant::None);
        self.emit(Opcode::Return)
    }

    /// Resolve labels and validate.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] for unbound labels, out-of-range operands,
    /// malformed handler ranges or an unordered line table.
    pub fn build(self) -> Result<Arc<CodeObject>, CodeError> {
        let resolve = |label: Label| self.labels[label.0].ok_or(CodeError::UnboundLabel(label.0));

        let mut instructions = self.instructions.clone();
        for &(at, label) in &self.fixups {
            instructions[at] = instructions[at].with_target(resolve(label)?);
        }

        let handlers = self
            .handlers
            .iter()
            .map(|h| {
                Ok(HandlerEntry {
                    kind: h.kind,
                    start: resolve(h.start)?,
                    end: resolve(h.end)?,
                    target: resolve(h.target)?,
                    body_end: resolve(h.body_end)?,
                    stack_depth: h.stack_depth,
                })
            })
            .collect::<Result<Vec<_>, CodeError>>()?;

        let len = self.offset();
        let lines = self.lines.into_iter().filter(|e| e.start < len).collect();

        let code = CodeObject {
            name: self.name,
            instructions,
            constants: self.constants,
            varnames: self.varnames,
            names: self.names,
            argcount: self.argcount,
            flags: self.flags,
            line_table: LineTable::new(self.first_line, lines),
            handlers,
            flow: RwLock::new(None),
        };
        analysis::validate(&code)?;
        Ok(Arc::new(code))
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> u32 {
    if let Some(i) = table.iter().position(|n| n == name) {
        return i as u32;
    }
    table.push(name.to_string());
    (table.len() - 1) as u32
}
