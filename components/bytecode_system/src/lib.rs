//! Bytecode system for the frame interpreter
//!
//! This crate defines the instruction set, the immutable [`CodeObject`]
//! that frames execute, and the [`CodeBuilder`] used to assemble one.
//!
//! # Features
//!
//! - Stack-based instruction set with absolute jump offsets
//! - Offset-to-line table with run bounds for line tracing
//! - Static exception-handler table
//! - Lazily cached stack-depth analysis for line jumps
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CodeBuilder, Constant, Opcode};
//!
//! let mut b = CodeBuilder::function("double", 1).param("x");
//! b.line(2);
//! b.load_fast("x");
//! b.load_const(Constant::Int(2));
//! b.emit(Opcode::Binary(bytecode_system::BinaryOp::Mul));
//! b.emit(Opcode::Return);
//! let code = b.build().unwrap();
//!
//! let flow = code.flow().unwrap();
//! assert_eq!(flow.depth_at(2), Some(2));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod builder;
pub mod code;
pub mod constant;
pub mod line_table;
pub mod opcode;

// Re-export main types at crate root
pub use analysis::{CodeError, FlowInfo};
pub use builder::{CodeBuilder, Label};
pub use code::{CodeFlags, CodeObject, HandlerEntry, HandlerKind};
pub use constant::Constant;
pub use line_table::{LineBounds, LineEntry, LineTable};
pub use opcode::{BinaryOp, CompareOp, Opcode, RaiseForm};
