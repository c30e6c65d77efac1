//! Stack-machine intermediate representation.
//!
//! Programs are recorded as a linear sequence of [`Node`]s by an
//! [`IrBuilder`]; control flow is expressed by branch nodes holding a
//! handle to a label node in the same sequence. The host backend walks
//! the finished sequence to generate machine code.

pub mod builder;
pub mod dump;
pub mod node;
pub mod opcode;

pub use builder::IrBuilder;
pub use node::{Arg, Node, NodeIdx};
pub use opcode::{OpDef, OpFlags, Opcode, OPCODE_DEFS};

/// Size of one evaluation-stack slot in bytes.
pub const SLOT_SIZE: u32 = 4;
