pub mod emitter;
pub mod peephole;
pub mod regs;

pub use emitter::{Abs, ArithOp, Cond, Emitter, Ext3Op, Ext5Op, Mem, Rel32, Rel8, ShiftOp, Sib};
pub use regs::{Reg, Reg16, Reg8};
