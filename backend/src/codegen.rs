//! Code generator — walks the IR sequence and drives the x86 encoder.
//!
//! A single in-order pass with one node of look-ahead: a comparison
//! immediately followed by a conditional branch is fused into a
//! `CMP; Jcc` pair. Branch displacements are recorded as relocations
//! keyed by their IR node and patched after the walk, when every label
//! has a bound offset.

use std::collections::HashMap;

use log::{debug, trace};
use sjit_core::{IrBuilder, Node, NodeIdx, Opcode};

use crate::reloc::{Reloc, RelocKind};
use crate::x86::emitter::{ArithOp, Cond, Emitter, Mem, Rel32};
use crate::x86::regs::Reg;

/// Evaluation model of the generated code: all operands live on the
/// machine stack; EAX/EDX are scratch. EBP is the frame pointer, with
/// arguments at positive offsets (slot 2 = first argument, past the
/// saved EBP and return address) and frame locals at negative offsets.
pub struct CodeGen<'a> {
    ir: &'a IrBuilder,
    asm: &'a mut Emitter,
    bindings: HashMap<NodeIdx, usize>,
    relocs: Vec<Reloc>,
}

impl<'a> CodeGen<'a> {
    pub fn new(ir: &'a IrBuilder, asm: &'a mut Emitter) -> Self {
        Self {
            ir,
            asm,
            bindings: HashMap::new(),
            relocs: Vec::new(),
        }
    }

    /// Generate code for the whole sequence and apply relocations.
    pub fn run(&mut self) {
        self.generate();
        self.relocate();
        debug!(
            "generated {} bytes from {} nodes, {} relocations",
            self.asm.cursor(),
            self.ir.len(),
            self.relocs.len()
        );
    }

    /// Label bindings recorded so far (label node -> code offset).
    pub fn bindings(&self) -> &HashMap<NodeIdx, usize> {
        &self.bindings
    }

    /// Relocations recorded so far.
    pub fn relocs(&self) -> &[Reloc] {
        &self.relocs
    }

    // -- Generation walk --

    fn generate(&mut self) {
        let nodes = self.ir.nodes();
        let mut i = 0;
        while i < nodes.len() {
            let idx = NodeIdx(i as u32);
            let node = &nodes[i];
            trace!("gen {:04}: {}", i, node.opc.name());

            match node.opc {
                Opcode::Label => {
                    // Branch targets may point here: nothing emitted
                    // before this offset may be rewritten from now on.
                    self.asm.peep_fence();
                    self.bindings.insert(idx, self.asm.cursor());
                }

                Opcode::Const => {
                    let imm = node.imm();
                    if imm == 0 {
                        self.asm.emit_arith_rr(ArithOp::Xor, Reg::Eax, Reg::Eax);
                    } else {
                        self.asm.emit_mov_ri(Reg::Eax, imm as u32);
                    }
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::Drop => {
                    let n = node.count();
                    if n > 0 {
                        self.asm.emit_arith_ri(ArithOp::Add, Reg::Esp, n);
                    }
                }

                Opcode::Dup => {
                    self.asm.emit_mov_r_mem(Reg::Eax, Mem::reg(Reg::Esp));
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::Sink => {
                    // Save top-of-stack, discard n bytes below, restore
                    let n = node.count();
                    if n > 0 {
                        self.asm.emit_pop(Reg::Eax);
                        self.asm.emit_arith_ri(ArithOp::Add, Reg::Esp, n);
                        self.asm.emit_push(Reg::Eax);
                    }
                }

                Opcode::GetLocal => {
                    let off = node.imm();
                    self.asm.emit_mov_r_mem(Reg::Eax, Mem::disp(Reg::Ebp, off));
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::SetLocal => {
                    let off = node.imm();
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_mov_mem_r(Mem::disp(Reg::Ebp, off), Reg::Eax);
                }

                Opcode::Frame => {
                    let n = node.count();
                    self.asm.emit_push(Reg::Ebp);
                    self.asm.emit_mov_rr(Reg::Ebp, Reg::Esp);
                    if n > 0 {
                        self.asm.emit_arith_ri(ArithOp::Sub, Reg::Esp, n);
                    }
                }

                Opcode::Return => {
                    let n = node.count();
                    self.asm.emit_pop(Reg::Eax);
                    if n > 0 {
                        self.asm.emit_arith_ri(ArithOp::Add, Reg::Esp, n);
                    }
                    self.asm.emit_pop(Reg::Ebp);
                    self.asm.emit_ret();
                }

                Opcode::Add => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm
                        .emit_arith_mem_r(ArithOp::Add, Mem::reg(Reg::Esp), Reg::Eax);
                }

                Opcode::Sub => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm
                        .emit_arith_mem_r(ArithOp::Sub, Mem::reg(Reg::Esp), Reg::Eax);
                }

                Opcode::Mul => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_mov_r_mem(Reg::Edx, Mem::reg(Reg::Esp));
                    self.asm.emit_imul(Reg::Edx);
                    self.asm.emit_mov_mem_r(Mem::reg(Reg::Esp), Reg::Eax);
                }

                Opcode::And => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_pop(Reg::Edx);
                    self.asm.emit_arith_rr(ArithOp::And, Reg::Eax, Reg::Edx);
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::Or => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_pop(Reg::Edx);
                    self.asm.emit_arith_rr(ArithOp::Or, Reg::Eax, Reg::Edx);
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::NotL => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_test_rr(Reg::Eax, Reg::Eax);
                    self.asm.emit_setcc(Cond::Eq, Reg::Eax);
                    self.asm.emit_arith_ri(ArithOp::And, Reg::Eax, 1);
                    self.asm.emit_push(Reg::Eax);
                }

                Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge | Opcode::Eq
                | Opcode::Ne => {
                    let cc = compare_cond(node.opc);
                    let next = nodes.get(i + 1);
                    if self.gen_compare(cc, next, NodeIdx((i + 1) as u32)) {
                        // fused with the following Jz/Jnz
                        i += 2;
                        continue;
                    }
                }

                Opcode::Jz => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_arith_ri(ArithOp::Cmp, Reg::Eax, 0);
                    let rel = self.asm.emit_jcc32(Cond::Eq, None);
                    self.relocs.push(Reloc::rel(rel.0, idx));
                }

                Opcode::Jnz => {
                    self.asm.emit_pop(Reg::Eax);
                    self.asm.emit_arith_ri(ArithOp::Cmp, Reg::Eax, 0);
                    let rel = self.asm.emit_jcc32(Cond::Ne, None);
                    self.relocs.push(Reloc::rel(rel.0, idx));
                }

                Opcode::Jmp => {
                    let rel = self.asm.emit_jmp32(None);
                    self.relocs.push(Reloc::rel(rel.0, idx));
                }

                Opcode::Call => {
                    // Callee leaves its result in EAX; push it back onto
                    // the evaluation stack.
                    let rel = self.asm.emit_call(None);
                    self.relocs.push(Reloc::rel(rel.0, idx));
                    self.asm.emit_push(Reg::Eax);
                }
            }

            i += 1;
        }
    }

    /// Emit a comparison. Returns true when the comparison was fused
    /// with a directly following Jz/Jnz (consuming both nodes).
    fn gen_compare(&mut self, cc: Cond, next: Option<&Node>, next_idx: NodeIdx) -> bool {
        if let Some(next) = next {
            if matches!(next.opc, Opcode::Jz | Opcode::Jnz) {
                // Jz of a comparison means "branch when the comparison
                // is false": invert the condition.
                let cc = if next.opc == Opcode::Jz { cc.invert() } else { cc };
                self.asm.emit_pop(Reg::Eax);
                self.asm.emit_pop(Reg::Edx);
                self.asm.emit_arith_rr(ArithOp::Cmp, Reg::Edx, Reg::Eax);
                let rel = self.asm.emit_jcc32(cc, None);
                self.relocs.push(Reloc::rel(rel.0, next_idx));
                return true;
            }
        }

        // Booleanize: SETcc writes only the low byte, mask the rest.
        self.asm.emit_pop(Reg::Eax);
        self.asm.emit_pop(Reg::Edx);
        self.asm.emit_arith_rr(ArithOp::Cmp, Reg::Edx, Reg::Eax);
        self.asm.emit_setcc(cc, Reg::Eax);
        self.asm.emit_arith_ri(ArithOp::And, Reg::Eax, 1);
        self.asm.emit_push(Reg::Eax);
        false
    }

    // -- Relocation --

    fn relocate(&mut self) {
        for reloc in &self.relocs {
            let branch = self.ir.node(reloc.node);
            let target = match branch.target() {
                Some(t) => t,
                None => panic!(
                    "{} node {} has an unbound target",
                    branch.opc.name(),
                    reloc.node.0
                ),
            };
            let target_node = self.ir.node(target);
            assert!(
                target_node.opc == Opcode::Label,
                "{} node {} targets a {} node, not a label",
                branch.opc.name(),
                reloc.node.0,
                target_node.opc.name()
            );
            let offset = match self.bindings.get(&target) {
                Some(&o) => o,
                None => panic!("label node {} was never bound", target.0),
            };
            trace!(
                "reloc {:?} at {:#x} -> label L{} at {:#x}",
                reloc.kind,
                reloc.patch_offset,
                target.0,
                offset
            );
            match reloc.kind {
                RelocKind::Rel => {
                    self.asm.set_target_rel32(Rel32(reloc.patch_offset), offset)
                }
                RelocKind::Abs => self.asm.set_target_abs(reloc.patch_offset, offset),
            }
        }
    }
}

/// Condition code computing a comparison opcode's result in terms of
/// `CMP lhs, rhs`.
fn compare_cond(opc: Opcode) -> Cond {
    match opc {
        Opcode::Lt => Cond::Lt,
        Opcode::Le => Cond::Le,
        Opcode::Gt => Cond::Gt,
        Opcode::Ge => Cond::Ge,
        Opcode::Eq => Cond::Eq,
        Opcode::Ne => Cond::Ne,
        _ => panic!("not a comparison opcode: {}", opc.name()),
    }
}
