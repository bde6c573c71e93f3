//! Immutable compiled code units.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::{self, CodeError, FlowInfo};
use crate::{Constant, LineTable, Opcode};

bitflags::bitflags! {
    /// Properties of a code object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CodeFlags: u32 {
        /// Calling the code produces a generator instead of running it
        const GENERATOR = 1 << 0;
        /// Surplus positional arguments are collected into the last local
        const VARARGS = 1 << 1;
        /// Locals live in fast slots rather than a namespace
        const OPTIMIZED = 1 << 2;
        /// Frames of this code are invisible to tracing and introspection
        const HIDDEN = 1 << 3;
    }
}

/// Which kind of protected region a handler guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// `try/except`: the handler body runs with the exception as the
    /// handled exception and leaves through `PopExcept`
    Except,
    /// `try/finally`: the handler body receives either `None` (normal
    /// entry) or the exception, and leaves through `EndFinally`
    Finally,
}

/// One entry of the static exception-handler table.
///
/// While the instruction pointer lies in `start..end`, a raised exception
/// truncates the operand stack to `stack_depth`, pushes the exception and
/// jumps to `target`. The handler body spans `target..body_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    /// Handler kind
    pub kind: HandlerKind,
    /// First protected offset
    pub start: u32,
    /// First offset past the protected range
    pub end: u32,
    /// Offset of the handler body
    pub target: u32,
    /// First offset past the handler body
    pub body_end: u32,
    /// Operand stack depth on entry to the protected range
    pub stack_depth: u32,
}

impl HandlerEntry {
    /// Returns whether `offset` lies in the protected range.
    pub fn protects(&self, offset: u32) -> bool {
        (self.start..self.end).contains(&offset)
    }

    /// Returns whether `offset` lies in the handler body.
    pub fn in_body(&self, offset: u32) -> bool {
        (self.target..self.body_end).contains(&offset)
    }
}

/// A compiled unit of code.
///
/// Code objects are immutable once built and are shared between functions,
/// frames and threads through `Arc`. The only interior state is the lazily
/// computed stack-depth analysis used when a trace hook moves a frame to a
/// new line.
pub struct CodeObject {
    pub(crate) name: String,
    pub(crate) instructions: Vec<Opcode>,
    pub(crate) constants: Vec<Constant>,
    pub(crate) varnames: Vec<String>,
    pub(crate) names: Vec<String>,
    pub(crate) argcount: u32,
    pub(crate) flags: CodeFlags,
    pub(crate) line_table: LineTable,
    pub(crate) handlers: Vec<HandlerEntry>,
    pub(crate) flow: RwLock<Option<Arc<FlowInfo>>>,
}

impl CodeObject {
    /// Function or module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instruction sequence.
    pub fn instructions(&self) -> &[Opcode] {
        &self.instructions
    }

    /// Instruction at `offset`, if in range.
    pub fn instruction(&self, offset: u32) -> Option<Opcode> {
        self.instructions.get(offset as usize).copied()
    }

    /// Constant pool.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Names of fast local slots; parameters come first.
    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    /// Names referenced by name, global and attribute instructions.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of positional parameters, excluding the varargs slot.
    pub fn argcount(&self) -> u32 {
        self.argcount
    }

    /// Code flags.
    pub fn flags(&self) -> CodeFlags {
        self.flags
    }

    /// Returns whether calling this code produces a generator.
    pub fn is_generator(&self) -> bool {
        self.flags.contains(CodeFlags::GENERATOR)
    }

    /// Returns whether locals are stored in fast slots.
    pub fn is_optimized(&self) -> bool {
        self.flags.contains(CodeFlags::OPTIMIZED)
    }

    /// Returns whether frames of this code are hidden from tracing.
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(CodeFlags::HIDDEN)
    }

    /// Line of the definition itself.
    pub fn first_line(&self) -> u32 {
        self.line_table.first_line()
    }

    /// Offset-to-line table.
    pub fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    /// Handler table, innermost region first.
    pub fn handlers(&self) -> &[HandlerEntry] {
        &self.handlers
    }

    /// The innermost handler protecting `offset`.
    pub fn handler_for(&self, offset: u32) -> Option<&HandlerEntry> {
        self.handlers.iter().find(|h| h.protects(offset))
    }

    /// Stack-depth analysis, computed on first use and cached.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] when the instruction stream underflows the
    /// stack or reaches an offset with two different depths.
    pub fn flow(&self) -> Result<Arc<FlowInfo>, CodeError> {
        if let Some(flow) = self.flow.read().as_ref() {
            return Ok(Arc::clone(flow));
        }
        let computed = Arc::new(analysis::analyze(self)?);
        let mut slot = self.flow.write();
        Ok(Arc::clone(slot.get_or_insert(computed)))
    }
}

impl fmt::Debug for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeObject")
            .field("name", &self.name)
            .field("first_line", &self.first_line())
            .field("flags", &self.flags)
            .field("instructions", &self.instructions.len())
            .finish()
    }
}
