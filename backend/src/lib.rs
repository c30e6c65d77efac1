//! x86 host backend for the stack-machine IR.
//!
//! Pipeline: IR builder -> code generator -> x86 encoder -> peephole
//! rewriter -> code buffer. The relocator runs once after the
//! generation walk, patching every recorded branch displacement to its
//! label's bound offset.

pub mod code_buffer;
pub mod codegen;
pub mod jit;
pub mod reloc;
pub mod x86;

pub use code_buffer::CodeBuffer;
pub use codegen::CodeGen;
pub use jit::Jit;
pub use reloc::{Reloc, RelocKind};
