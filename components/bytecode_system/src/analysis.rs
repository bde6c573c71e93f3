//! Structural validation and stack-depth analysis of code objects.

use thiserror::Error;

use crate::{CodeFlags, CodeObject, Opcode};

/// A code object is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// A jump leaves the instruction sequence
    #[error("jump at offset {offset} targets {target}, past the end of the code")]
    JumpOutOfRange {
        /// Offending instruction
        offset: u32,
        /// Its target
        target: u32,
    },
    /// A constant, name or local operand is out of range
    #[error("{table} index {index} at offset {offset} is out of range")]
    IndexOutOfRange {
        /// Offending instruction
        offset: u32,
        /// Which table was indexed
        table: &'static str,
        /// The index
        index: u32,
    },
    /// `MakeFunction` operand is not a code constant
    #[error("MakeFunction at offset {offset} does not reference a code constant")]
    NotCode {
        /// Offending instruction
        offset: u32,
    },
    /// A handler range is empty or leaves the code
    #[error("handler {index} has an invalid range")]
    InvalidHandler {
        /// Position in the handler table
        index: usize,
    },
    /// Line table offsets are not strictly increasing or leave the code
    #[error("line table entry {index} is out of order")]
    LineTableOrder {
        /// Position in the line table
        index: usize,
    },
    /// A builder label was used but never bound
    #[error("label {0} was never bound")]
    UnboundLabel(usize),
    /// Parameters do not fit in the declared locals
    #[error("{params} parameters declared but only {locals} locals")]
    TooFewLocals {
        /// Parameter slots required
        params: usize,
        /// Locals declared
        locals: usize,
    },
    /// The stack would go negative
    #[error("stack underflow at offset {offset}")]
    StackUnderflow {
        /// Offending instruction
        offset: u32,
    },
    /// Two control-flow paths reach an offset with different depths
    #[error("offset {offset} reached with stack depths {first} and {second}")]
    InconsistentDepth {
        /// Merge point
        offset: u32,
        /// Depth recorded first
        first: u32,
        /// Conflicting depth
        second: u32,
    },
}

/// Static operand-stack depth at each reachable instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowInfo {
    depths: Vec<Option<u32>>,
}

impl FlowInfo {
    /// Stack depth before the instruction at `offset` executes, or `None`
    /// when the offset is unreachable.
    pub fn depth_at(&self, offset: u32) -> Option<u32> {
        self.depths.get(offset as usize).copied().flatten()
    }
}

/// Check operand ranges, handler ranges and the line table.
pub(crate) fn validate(code: &CodeObject) -> Result<(), CodeError> {
    let len = code.instructions.len() as u32;
    let check = |offset: u32, table: &'static str, index: u32, bound: usize| {
        if (index as usize) < bound {
            Ok(())
        } else {
            Err(CodeError::IndexOutOfRange {
                offset,
                table,
                index,
            })
        }
    };

    for (offset, op) in code.instructions.iter().enumerate() {
        let offset = offset as u32;
        if let Some(target) = op.jump_target() {
            if target >= len {
                return Err(CodeError::JumpOutOfRange { offset, target });
            }
        }
        match *op {
            Opcode::LoadConst(i) => check(offset, "constant", i, code.constants.len())?,
            Opcode::MakeFunction(i) => {
                check(offset, "constant", i, code.constants.len())?;
                if code.constants[i as usize].as_code().is_none() {
                    return Err(CodeError::NotCode { offset });
                }
            }
            Opcode::LoadFast(i) | Opcode::StoreFast(i) | Opcode::DeleteFast(i) => {
                check(offset, "local", i, code.varnames.len())?
            }
            Opcode::LoadName(i)
            | Opcode::StoreName(i)
            | Opcode::DeleteName(i)
            | Opcode::LoadGlobal(i)
            | Opcode::StoreGlobal(i)
            | Opcode::LoadAttr(i)
            | Opcode::StoreAttr(i)
            | Opcode::DeleteAttr(i) => check(offset, "name", i, code.names.len())?,
            _ => {}
        }
    }

    for (index, h) in code.handlers.iter().enumerate() {
        if h.start >= h.end || h.end > len || h.target >= h.body_end || h.body_end > len {
            return Err(CodeError::InvalidHandler { index });
        }
    }

    if let Some(index) = code.line_table.first_disorder() {
        return Err(CodeError::LineTableOrder { index });
    }
    if let Some(index) = code
        .line_table
        .entries()
        .iter()
        .position(|e| e.start >= len)
    {
        return Err(CodeError::LineTableOrder { index });
    }

    let params = code.argcount as usize + usize::from(code.flags.contains(CodeFlags::VARARGS));
    if params > code.varnames.len() {
        return Err(CodeError::TooFewLocals {
            params,
            locals: code.varnames.len(),
        });
    }
    Ok(())
}

/// Forward dataflow over the instruction graph, including the edges from
/// every protected offset to its handler.
pub(crate) fn analyze(code: &CodeObject) -> Result<FlowInfo, CodeError> {
    let len = code.instructions.len();
    let mut depths: Vec<Option<u32>> = vec![None; len];
    let mut work = Vec::new();
    if len > 0 {
        depths[0] = Some(0);
        work.push(0u32);
    }

    while let Some(offset) = work.pop() {
        let Some(depth) = depths[offset as usize] else {
            continue;
        };
        let op = code.instructions[offset as usize];
        let after = |jump: bool| -> Result<u32, CodeError> {
            u32::try_from(depth as i64 + op.stack_effect(jump) as i64)
                .map_err(|_| CodeError::StackUnderflow { offset })
        };

        let mut successors = Vec::with_capacity(3);
        let fallthrough = after(false)?;
        if !op.is_terminator() {
            successors.push((offset + 1, fallthrough));
        }
        if let Some(target) = op.jump_target() {
            successors.push((target, after(true)?));
        }
        for handler in code.handlers.iter().filter(|h| h.protects(offset)) {
            successors.push((handler.target, handler.stack_depth + 1));
        }

        for (next, next_depth) in successors {
            let Some(slot) = depths.get_mut(next as usize) else {
                // Falling off the end is a runtime fault, not a static one.
                continue;
            };
            match *slot {
                None => {
                    *slot = Some(next_depth);
                    work.push(next);
                }
                Some(first) if first != next_depth => {
                    return Err(CodeError::InconsistentDepth {
                        offset: next,
                        first,
                        second: next_depth,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(FlowInfo { depths })
}
