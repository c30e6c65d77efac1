//! JIT facade — one IR builder paired with one code buffer.

use std::io;

use log::debug;
use sjit_core::{IrBuilder, NodeIdx};

use crate::code_buffer::CodeBuffer;
use crate::codegen::CodeGen;
use crate::x86::emitter::Emitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Finished,
}

/// A single-function JIT compiler.
///
/// Record a program through the `emit_*` methods, bind branch edges
/// with [`Jit::set_target`], then call [`Jit::finish`] to generate the
/// machine code and obtain a pointer the host casts to an
/// `extern "C" fn` (32-bit cdecl: arguments on the stack, result in
/// EAX, caller cleans up).
///
/// One instance is not safe to share across threads; distinct
/// instances with distinct buffers may run concurrently.
pub struct Jit {
    ir: IrBuilder,
    asm: Emitter,
    state: State,
}

impl Jit {
    /// Allocate an executable buffer of `capacity` bytes and build on
    /// top of it.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self::with_buffer(CodeBuffer::new(capacity)?))
    }

    /// Build on top of a caller-provided buffer.
    pub fn with_buffer(buf: CodeBuffer) -> Self {
        Self {
            ir: IrBuilder::new(),
            asm: Emitter::new(buf),
            state: State::Open,
        }
    }

    fn ir_mut(&mut self) -> &mut IrBuilder {
        assert!(
            self.state == State::Open,
            "emit after finish (call clear first)"
        );
        &mut self.ir
    }

    // -- IR recording (see sjit_core::IrBuilder) --

    pub fn emit_const(&mut self, val: i32) -> NodeIdx {
        self.ir_mut().emit_const(val)
    }

    pub fn emit_drop(&mut self, slots: u32) -> NodeIdx {
        self.ir_mut().emit_drop(slots)
    }

    pub fn emit_dup(&mut self) -> NodeIdx {
        self.ir_mut().emit_dup()
    }

    pub fn emit_sink(&mut self, slots: u32) -> NodeIdx {
        self.ir_mut().emit_sink(slots)
    }

    pub fn emit_getl(&mut self, slot: i32) -> NodeIdx {
        self.ir_mut().emit_getl(slot)
    }

    pub fn emit_setl(&mut self, slot: i32) -> NodeIdx {
        self.ir_mut().emit_setl(slot)
    }

    pub fn emit_frame(&mut self, slots: u32) -> NodeIdx {
        self.ir_mut().emit_frame(slots)
    }

    pub fn emit_return(&mut self, slots: u32) -> NodeIdx {
        self.ir_mut().emit_return(slots)
    }

    pub fn emit_call(&mut self) -> NodeIdx {
        self.ir_mut().emit_call()
    }

    pub fn emit_jz(&mut self) -> NodeIdx {
        self.ir_mut().emit_jz()
    }

    pub fn emit_jnz(&mut self) -> NodeIdx {
        self.ir_mut().emit_jnz()
    }

    pub fn emit_jmp(&mut self) -> NodeIdx {
        self.ir_mut().emit_jmp()
    }

    pub fn emit_label(&mut self) -> NodeIdx {
        self.ir_mut().emit_label()
    }

    pub fn emit_add(&mut self) -> NodeIdx {
        self.ir_mut().emit_add()
    }

    pub fn emit_sub(&mut self) -> NodeIdx {
        self.ir_mut().emit_sub()
    }

    pub fn emit_mul(&mut self) -> NodeIdx {
        self.ir_mut().emit_mul()
    }

    pub fn emit_and(&mut self) -> NodeIdx {
        self.ir_mut().emit_and()
    }

    pub fn emit_or(&mut self) -> NodeIdx {
        self.ir_mut().emit_or()
    }

    pub fn emit_notl(&mut self) -> NodeIdx {
        self.ir_mut().emit_notl()
    }

    pub fn emit_lt(&mut self) -> NodeIdx {
        self.ir_mut().emit_lt()
    }

    pub fn emit_le(&mut self) -> NodeIdx {
        self.ir_mut().emit_le()
    }

    pub fn emit_gt(&mut self) -> NodeIdx {
        self.ir_mut().emit_gt()
    }

    pub fn emit_ge(&mut self) -> NodeIdx {
        self.ir_mut().emit_ge()
    }

    pub fn emit_eq(&mut self) -> NodeIdx {
        self.ir_mut().emit_eq()
    }

    pub fn emit_ne(&mut self) -> NodeIdx {
        self.ir_mut().emit_ne()
    }

    /// Bind a branch/call node's edge to a label node.
    pub fn set_target(&mut self, branch: NodeIdx, label: NodeIdx) {
        self.ir_mut().set_target(branch, label)
    }

    // -- Compilation --

    /// Generate machine code for the recorded program and return a
    /// pointer to it. The program must be well-formed (all branch
    /// targets bound to labels); violations are fatal.
    pub fn finish(&mut self) -> *const u8 {
        assert!(
            self.state == State::Open,
            "finish called twice (call clear first)"
        );
        CodeGen::new(&self.ir, &mut self.asm).run();
        self.state = State::Finished;
        debug!("finish: {} bytes at {:p}", self.asm.cursor(), self.asm.base_ptr());
        self.asm.base_ptr()
    }

    /// Drop the recorded program and rewind the code buffer, returning
    /// to the open state. The buffer is reused, not reallocated.
    pub fn clear(&mut self) {
        self.ir.clear();
        self.asm.reset();
        self.state = State::Open;
    }

    /// The recorded IR.
    pub fn ir(&self) -> &IrBuilder {
        &self.ir
    }

    /// The generated code bytes (meaningful after `finish`).
    pub fn code(&self) -> &[u8] {
        self.asm.code()
    }
}
