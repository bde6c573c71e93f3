//! Instruction set for the stack-based frame interpreter.
//!
//! Every instruction occupies exactly one slot in
//! [`CodeObject::instructions`](crate::CodeObject::instructions), so an
//! instruction offset is simply an index. Jump operands are absolute
//! offsets.

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b` (numbers, strings, tuples, lists)
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`, always a float
    Div,
    /// `a // b`, floored
    FloorDiv,
    /// `a % b`, sign follows the divisor
    Mod,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// Identity
    Is,
    /// Negated identity
    IsNot,
    /// Membership
    In,
    /// Negated membership
    NotIn,
}

/// How a `raise` statement produces its exception.
///
/// Only [`RaiseForm::New`] starts a fresh propagation. The other two forms
/// continue an existing one: trace hooks do not see a second `exception`
/// event for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaiseForm {
    /// `raise exc`: pops an exception instance or class
    New,
    /// Bare `raise`: re-raises the exception currently being handled
    Reraise,
    /// `raise exc, tb`: pops a traceback then an exception, keeps the traceback
    WithTraceback,
}

/// A single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Do nothing
    Nop,
    /// Push constant at index
    LoadConst(u32),
    /// Push fast local at index; unbound raises `UnboundLocalError`
    LoadFast(u32),
    /// Pop into fast local at index
    StoreFast(u32),
    /// Unbind fast local at index
    DeleteFast(u32),
    /// Push name from locals, then globals, then builtins
    LoadName(u32),
    /// Pop into the locals namespace
    StoreName(u32),
    /// Remove a name from the locals namespace
    DeleteName(u32),
    /// Push name from globals, then builtins
    LoadGlobal(u32),
    /// Pop into the globals namespace
    StoreGlobal(u32),
    /// Replace TOS with `TOS.name`
    LoadAttr(u32),
    /// `TOS.name = TOS1`, pops both
    StoreAttr(u32),
    /// `del TOS.name`, pops TOS
    DeleteAttr(u32),
    /// Replace `TOS1, TOS` with `TOS1[TOS]`
    BinarySubscr,
    /// `TOS1[TOS] = TOS2`, pops all three
    StoreSubscr,
    /// Discard TOS
    Pop,
    /// Duplicate TOS
    Dup,
    /// Swap TOS and TOS1
    Rot2,
    /// Replace `TOS1, TOS` with `TOS1 op TOS`
    Binary(BinaryOp),
    /// Logical not of TOS
    UnaryNot,
    /// Arithmetic negation of TOS
    UnaryNeg,
    /// Replace `TOS1, TOS` with `TOS1 op TOS`
    Compare(CompareOp),
    /// Pop n values and push them as a tuple
    BuildTuple(u32),
    /// Pop n values and push them as a list
    BuildList(u32),
    /// Pop a sequence of exactly n items and push them, first item on top
    UnpackSequence(u32),
    /// Unconditional jump
    Jump(u32),
    /// Pop TOS and jump when it is falsy
    PopJumpIfFalse(u32),
    /// Pop TOS and jump when it is truthy
    PopJumpIfTrue(u32),
    /// Replace TOS with an iterator over it
    GetIter,
    /// Advance the iterator at TOS: push the next item, or pop the
    /// iterator and jump when it is exhausted
    ForIter(u32),
    /// Push a function built from the code constant at index, bound to the
    /// current globals
    MakeFunction(u32),
    /// Call `TOS-argc` with the `argc` values above it
    Call(u32),
    /// Return TOS from the frame
    Return,
    /// Suspend the generator, yielding TOS; the sent value is pushed on resume
    Yield,
    /// Raise an exception
    Raise(RaiseForm),
    /// Pop an exception class; jump unless the exception below it matches
    JumpIfNotExcMatch(u32),
    /// Leave an `except` body: pop the caught exception and restore the
    /// previously handled one
    PopExcept,
    /// Leave a `finally` body: pop the marker and re-raise it if it is an
    /// exception
    EndFinally,
}

impl Opcode {
    /// Net change in stack depth when control continues with the next
    /// instruction (`jump == false`) or with the jump target (`jump == true`).
    ///
    /// Terminators report the effect of the values they consume.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytecode_system::Opcode;
    ///
    /// assert_eq!(Opcode::Call(2).stack_effect(false), -2);
    /// assert_eq!(Opcode::ForIter(9).stack_effect(false), 1);
    /// assert_eq!(Opcode::ForIter(9).stack_effect(true), -1);
    /// ```
    pub fn stack_effect(&self, jump: bool) -> i32 {
        use Opcode::*;
        match *self {
            Nop | DeleteFast(_) | DeleteName(_) | LoadAttr(_) | Rot2 | UnaryNot | UnaryNeg
            | GetIter | Jump(_) | Yield => 0,
            LoadConst(_) | LoadFast(_) | LoadName(_) | LoadGlobal(_) | Dup | MakeFunction(_) => 1,
            StoreFast(_) | StoreName(_) | StoreGlobal(_) | DeleteAttr(_) | BinarySubscr | Pop
            | Binary(_) | Compare(_) | PopJumpIfFalse(_) | PopJumpIfTrue(_) | Return
            | JumpIfNotExcMatch(_) | PopExcept | EndFinally => -1,
            StoreAttr(_) => -2,
            StoreSubscr => -3,
            BuildTuple(n) | BuildList(n) => 1 - n as i32,
            UnpackSequence(n) => n as i32 - 1,
            ForIter(_) => {
                if jump {
                    -1
                } else {
                    1
                }
            }
            Call(argc) => -(argc as i32),
            Raise(RaiseForm::New) => -1,
            Raise(RaiseForm::Reraise) => 0,
            Raise(RaiseForm::WithTraceback) => -2,
        }
    }

    /// Absolute jump target, for instructions that have one.
    pub fn jump_target(&self) -> Option<u32> {
        use Opcode::*;
        match *self {
            Jump(t) | PopJumpIfFalse(t) | PopJumpIfTrue(t) | ForIter(t)
            | JumpIfNotExcMatch(t) => Some(t),
            _ => None,
        }
    }

    /// Returns whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Jump(_) | Opcode::Return | Opcode::Raise(_))
    }

    /// Rewrite the jump target. No-op for instructions without one.
    pub fn with_target(self, target: u32) -> Opcode {
        use Opcode::*;
        match self {
            Jump(_) => Jump(target),
            PopJumpIfFalse(_) => PopJumpIfFalse(target),
            PopJumpIfTrue(_) => PopJumpIfTrue(target),
            ForIter(_) => ForIter(target),
            JumpIfNotExcMatch(_) => JumpIfNotExcMatch(target),
            other => other,
        }
    }
}
