#![allow(non_upper_case_globals)]

//! 32-bit x86 instruction encoder.
//!
//! Emits machine code into a [`CodeBuffer`] one instruction at a time.
//! Branch emitters take an optional bound target; when the target is not
//! yet known they leave a zeroed displacement field and hand back a
//! [`Rel8`]/[`Rel32`] reference for later completion with
//! [`Emitter::set_target_rel8`]/[`Emitter::set_target_rel32`].
//!
//! After every instruction the peephole rewriter runs on the emitted
//! tail; branches and label placements advance the rewriter's fence so
//! recorded offsets stay valid.
//!
//! Opcode reference: https://www.felixcloutier.com/x86/index.html

use crate::code_buffer::CodeBuffer;
use crate::x86::regs::{Reg, Reg16, Reg8};

// -- Prefix flags --

pub const P_EXT: u32 = 0x100; // 0x0F prefix
pub const P_DATA16: u32 = 0x400; // 0x66 prefix

// -- Opcode constants (OPC_*) --

// Arithmetic. The group opcodes stride by op << 3; the eAX forms are the
// one-byte accumulator encodings (ADD eax,imm = 05, OR = 0D, ...).
pub const OPC_ARITH_EvGv: u32 = 0x01;
pub const OPC_ARITH_GvEv: u32 = 0x03;
pub const OPC_ARITH_eAXIz: u32 = 0x05;
pub const OPC_ARITH_EvIz: u32 = 0x81;

// Shift
pub const OPC_SHIFT_1: u32 = 0xD1;
pub const OPC_SHIFT_Ib: u32 = 0xC1;
pub const OPC_SHIFT_cl: u32 = 0xD3;

// Data movement
pub const OPC_MOVB_EvGv: u32 = 0x88;
pub const OPC_MOVL_EvGv: u32 = 0x89;
pub const OPC_MOVB_GvEv: u32 = 0x8A;
pub const OPC_MOVL_GvEv: u32 = 0x8B;
pub const OPC_MOVB_EvIb: u32 = 0xC6;
pub const OPC_MOVL_EvIz: u32 = 0xC7;
pub const OPC_MOVL_Iv: u32 = 0xB8;

// Extensions
pub const OPC_MOVZBL: u32 = 0xB6 | P_EXT;
pub const OPC_MOVZWL: u32 = 0xB7 | P_EXT;
pub const OPC_MOVSBL: u32 = 0xBE | P_EXT;
pub const OPC_MOVSWL: u32 = 0xBF | P_EXT;

// Branch
pub const OPC_JCC_short: u32 = 0x70;
pub const OPC_JCC_long: u32 = 0x80 | P_EXT;
pub const OPC_JMP_short: u32 = 0xEB;
pub const OPC_JMP_long: u32 = 0xE9;
pub const OPC_CALL_Jz: u32 = 0xE8;

// Compare / conditional
pub const OPC_CMOVCC: u32 = 0x40 | P_EXT;
pub const OPC_SETCC: u32 = 0x90 | P_EXT;
pub const OPC_TESTL: u32 = 0x85;
pub const OPC_TEST_eAXIz: u32 = 0xA9;

// Group opcodes
pub const OPC_GRP3_Ev: u32 = 0xF7;
pub const OPC_GRP5: u32 = 0xFF;
pub const OPC_GRPBT: u32 = 0xBA | P_EXT;

// Multiply
pub const OPC_IMUL_GvEv: u32 = 0xAF | P_EXT;

// Stack
pub const OPC_PUSH_r32: u32 = 0x50;
pub const OPC_POP_r32: u32 = 0x58;
pub const OPC_PUSH_Iz: u32 = 0x68;
pub const OPC_POP_Ev: u32 = 0x8F;
pub const OPC_PUSHA: u32 = 0x60;
pub const OPC_POPA: u32 = 0x61;

// Misc
pub const OPC_INC_r32: u32 = 0x40;
pub const OPC_DEC_r32: u32 = 0x48;
pub const OPC_RET: u32 = 0xC3;
pub const OPC_NOP: u32 = 0x90;
pub const OPC_INT3: u32 = 0xCC;
pub const OPC_CBW: u32 = 0x98 | P_DATA16;
pub const OPC_CWD: u32 = 0x99 | P_DATA16;
pub const OPC_CDQ: u32 = 0x99;

// -- Sub-operation enums --

/// Arithmetic sub-opcodes (the /r field of 0x81 and the stride of the
/// two-operand forms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArithOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/// Shift/rotate sub-opcodes (the /r field of 0xC1/0xD1/0xD3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Rcl = 2,
    Rcr = 3,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/// Group 3 extension codes (the /r field of 0xF7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext3Op {
    Not = 2,
    Neg = 3,
    Mul = 4,
    Imul = 5,
    Div = 6,
    Idiv = 7,
}

/// Group 5 extension codes (the /r field of 0xFF).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ext5Op {
    Inc = 0,
    Dec = 1,
    Call = 2,
    Jmp = 4,
    Push = 6,
}

/// x86 condition codes for Jcc/SETcc/CMOVcc.
///
/// The 4-bit value is ORed into the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    O = 0x0,  // overflow          (OF=1)
    No = 0x1, // not overflow      (OF=0)
    C = 0x2,  // carry / below     (CF=1)
    Ae = 0x3, // above or equal    (CF=0)
    Eq = 0x4, // equal             (ZF=1)
    Ne = 0x5, // not equal         (ZF=0)
    Be = 0x6, // below or equal    (CF=1 or ZF=1)
    Ab = 0x7, // above             (CF=0 and ZF=0)
    S = 0x8,  // sign              (SF=1)
    Ns = 0x9, // not sign          (SF=0)
    P = 0xA,  // parity even       (PF=1)
    Np = 0xB, // parity odd        (PF=0)
    Lt = 0xC, // less              (SF!=OF)
    Ge = 0xD, // greater or equal  (SF=OF)
    Le = 0xE, // less or equal     (ZF=1 or SF!=OF)
    Gt = 0xF, // greater           (ZF=0 and SF=OF)
}

impl Cond {
    /// Return the inverted condition (LT<->GE, LE<->GT, EQ<->NE, ...).
    pub fn invert(self) -> Self {
        // Flip the low bit
        unsafe { core::mem::transmute(self as u8 ^ 1) }
    }
}

// -- Memory operands --

/// Absolute memory operand `[disp32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abs(pub u32);

/// Register-relative memory operand `[base + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem {
    pub base: Reg,
    pub disp: i32,
}

impl Mem {
    pub fn reg(base: Reg) -> Self {
        Self { base, disp: 0 }
    }

    pub fn disp(base: Reg, disp: i32) -> Self {
        Self { base, disp }
    }
}

/// Scaled-index memory operand `[base + index*scale + disp]`.
///
/// `index == ESP` means "no index" (the SIB encoding reserves that
/// slot); it is how an ESP-based `[base + disp]` is expressed, since
/// ESP as a base always forces the SIB form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    pub scale: u8, // encoded 2-bit field
    pub index: Reg,
    pub base: Reg,
    pub disp: i32,
    has_disp: bool,
}

impl Sib {
    /// `[base + disp]` through the SIB form (no index). Always encodes
    /// at least a disp8, even for `disp == 0`.
    pub fn disp(scale: u32, disp: i32, base: Reg) -> Self {
        Self {
            scale: scale_bits(scale),
            index: Reg::Esp,
            base,
            disp,
            has_disp: true,
        }
    }

    /// `[base + index*scale]`.
    pub fn index(scale: u32, index: Reg, base: Reg) -> Self {
        assert!(index != Reg::Esp, "ESP cannot be a SIB index");
        Self {
            scale: scale_bits(scale),
            index,
            base,
            disp: 0,
            has_disp: false,
        }
    }
}

fn scale_bits(scale: u32) -> u8 {
    match scale {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => panic!("invalid scale value: {scale}"),
    }
}

// -- Pending branch references --

/// Reference to an unresolved 8-bit displacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel8(pub usize);

/// Reference to an unresolved 32-bit displacement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel32(pub usize);

/// In ModR/M, rm = 101 with mod = 00 selects a bare disp32.
const RM_DISP32: u8 = 5;

/// The 32-bit x86 encoder.
///
/// Owns the code buffer and the peephole fence.
pub struct Emitter {
    pub(crate) buf: CodeBuffer,
    pub(crate) fence: usize,
}

impl Emitter {
    pub fn new(buf: CodeBuffer) -> Self {
        Self { buf, fence: 0 }
    }

    /// Current write offset (a bound label target).
    #[inline]
    pub fn cursor(&self) -> usize {
        self.buf.cursor()
    }

    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.buf.base_ptr()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Generated code so far.
    pub fn code(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Current peephole fence offset.
    #[inline]
    pub fn fence(&self) -> usize {
        self.fence
    }

    /// Advance the peephole fence to the cursor. Offsets at or below
    /// the fence (branch targets, recorded displacement fields) are
    /// never touched by the rewriter again.
    #[inline]
    pub fn peep_fence(&mut self) {
        self.fence = self.buf.cursor();
    }

    /// Rewind the instruction stream and the fence.
    pub fn reset(&mut self) {
        self.buf.reset();
        self.fence = 0;
    }

    // -- Target completion --

    /// Complete an 8-bit displacement. The target must be within
    /// -128..=127 of the end of the field.
    pub fn set_target_rel8(&mut self, rel: Rel8, target: usize) {
        let disp = target as i64 - (rel.0 as i64 + 1);
        assert!(
            (-128..=127).contains(&disp),
            "8-bit branch displacement out of range: {disp}"
        );
        self.buf.patch_u8(rel.0, disp as u8);
    }

    /// Complete a 32-bit displacement.
    pub fn set_target_rel32(&mut self, rel: Rel32, target: usize) {
        let disp = target as i64 - (rel.0 as i64 + 4);
        self.buf.patch_u32(rel.0, disp as u32);
    }

    /// Write an absolute address (buffer base + target offset) into a
    /// 32-bit patch field.
    pub fn set_target_abs(&mut self, at: usize, target: usize) {
        let addr = self.buf.base_ptr() as usize + target;
        self.buf.patch_u32(at, addr as u32);
    }

    // -- Core encoding helpers --

    /// Emit prefix bytes and the opcode byte.
    fn opc(&mut self, opc: u32) {
        if opc & P_DATA16 != 0 {
            self.buf.write_u8(0x66);
        }
        if opc & P_EXT != 0 {
            self.buf.write_u8(0x0F);
        }
        self.buf.write_u8(opc as u8);
    }

    /// Write a single ModR/M byte.
    fn modrm(&mut self, md: u8, reg: u8, rm: u8) {
        self.buf.write_u8((md << 6) | (reg << 3) | rm);
    }

    /// ModR/M for an absolute `[disp32]` operand.
    fn modrm_abs(&mut self, reg: u8, addr: u32) {
        self.modrm(0, reg, RM_DISP32);
        self.buf.write_u32(addr);
    }

    /// ModR/M + SIB (+ displacement) for a scaled-index operand.
    ///
    ///   mod  reg  r/m
    ///   00   ...  100   SIB
    ///   01   ...  100   SIB + disp8
    ///   10   ...  100   SIB + disp32
    fn modrm_sib(&mut self, reg: u8, sib: Sib) {
        // EBP as base with mod=00 would re-interpret the base field as
        // a bare disp32, so it always gets a displacement byte.
        let needs_disp = sib.has_disp || sib.base == Reg::Ebp;
        let md = if !needs_disp {
            0
        } else if (-128..=127).contains(&sib.disp) {
            1
        } else {
            2
        };
        self.modrm(md, reg, 4);
        self.buf
            .write_u8((sib.scale << 6) | ((sib.index as u8) << 3) | sib.base as u8);
        match md {
            1 => self.buf.write_u8(sib.disp as u8),
            2 => self.buf.write_u32(sib.disp as u32),
            _ => {}
        }
    }

    /// ModR/M (+ SIB) (+ displacement) for a `[base + disp]` operand.
    fn modrm_mem(&mut self, reg: u8, mem: Mem) {
        if mem.base == Reg::Esp {
            // ESP as a base forces the SIB form
            self.modrm_sib(reg, Sib::disp(1, mem.disp, Reg::Esp));
        } else if mem.disp == 0 && mem.base != Reg::Ebp {
            self.modrm(0, reg, mem.base as u8);
        } else if (-128..=127).contains(&mem.disp) {
            self.modrm(1, reg, mem.base as u8);
            self.buf.write_u8(mem.disp as u8);
        } else {
            self.modrm(2, reg, mem.base as u8);
            self.buf.write_u32(mem.disp as u32);
        }
    }

    // ------------------------------------------------------------------
    // mov
    // ------------------------------------------------------------------

    /// MOV r32, r32.
    pub fn emit_mov_rr(&mut self, dst: Reg, src: Reg) {
        self.opc(OPC_MOVL_EvGv);
        self.modrm(3, src as u8, dst as u8);
        self.post_emit();
    }

    /// MOV r32, imm32. Always the B8+r form.
    pub fn emit_mov_ri(&mut self, dst: Reg, imm: u32) {
        self.opc(OPC_MOVL_Iv + dst as u32);
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// MOV r32, [disp32].
    pub fn emit_mov_rm(&mut self, dst: Reg, src: Abs) {
        self.opc(OPC_MOVL_GvEv);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOV [disp32], r32.
    pub fn emit_mov_mr(&mut self, dst: Abs, src: Reg) {
        self.opc(OPC_MOVL_EvGv);
        self.modrm_abs(src as u8, dst.0);
        self.post_emit();
    }

    /// MOV [disp32], imm32.
    pub fn emit_mov_mi(&mut self, dst: Abs, imm: u32) {
        self.opc(OPC_MOVL_EvIz);
        self.modrm_abs(0, dst.0);
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// MOV r32, [base + disp].
    pub fn emit_mov_r_mem(&mut self, dst: Reg, src: Mem) {
        self.opc(OPC_MOVL_GvEv);
        self.modrm_mem(dst as u8, src);
        self.post_emit();
    }

    /// MOV [base + disp], r32.
    pub fn emit_mov_mem_r(&mut self, dst: Mem, src: Reg) {
        self.opc(OPC_MOVL_EvGv);
        self.modrm_mem(src as u8, dst);
        self.post_emit();
    }

    /// MOV r32, [base + index*scale + disp].
    pub fn emit_mov_r_sib(&mut self, dst: Reg, src: Sib) {
        self.opc(OPC_MOVL_GvEv);
        self.modrm_sib(dst as u8, src);
        self.post_emit();
    }

    /// MOV [base + index*scale + disp], r32.
    pub fn emit_mov_sib_r(&mut self, dst: Sib, src: Reg) {
        self.opc(OPC_MOVL_EvGv);
        self.modrm_sib(src as u8, dst);
        self.post_emit();
    }

    /// MOV [disp32], r16.
    pub fn emit_mov_m16_r16(&mut self, dst: Abs, src: Reg16) {
        self.opc(OPC_MOVL_EvGv | P_DATA16);
        self.modrm_abs(src as u8, dst.0);
        self.post_emit();
    }

    /// MOV r16, [disp32].
    pub fn emit_mov_r16_m16(&mut self, dst: Reg16, src: Abs) {
        self.opc(OPC_MOVL_GvEv | P_DATA16);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOV [disp32], imm16.
    pub fn emit_mov_m16_i16(&mut self, dst: Abs, imm: u16) {
        self.opc(OPC_MOVL_EvIz | P_DATA16);
        self.modrm_abs(0, dst.0);
        self.buf.write_u16(imm);
        self.post_emit();
    }

    /// MOV [disp32], r8.
    pub fn emit_mov_m8_r8(&mut self, dst: Abs, src: Reg8) {
        self.opc(OPC_MOVB_EvGv);
        self.modrm_abs(src as u8, dst.0);
        self.post_emit();
    }

    /// MOV r8, [disp32].
    pub fn emit_mov_r8_m8(&mut self, dst: Reg8, src: Abs) {
        self.opc(OPC_MOVB_GvEv);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOV [disp32], imm8.
    pub fn emit_mov_m8_i8(&mut self, dst: Abs, imm: u8) {
        self.opc(OPC_MOVB_EvIb);
        self.modrm_abs(0, dst.0);
        self.buf.write_u8(imm);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // mov sign/zero extend
    // ------------------------------------------------------------------

    /// MOVSX r32, r8.
    pub fn emit_movsx_r8(&mut self, dst: Reg, src: Reg8) {
        self.opc(OPC_MOVSBL);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// MOVSX r32, [disp32] (byte).
    pub fn emit_movsx_m8(&mut self, dst: Reg, src: Abs) {
        self.opc(OPC_MOVSBL);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOVSX r32, r16.
    pub fn emit_movsx_r16(&mut self, dst: Reg, src: Reg16) {
        self.opc(OPC_MOVSWL);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// MOVSX r32, [disp32] (word).
    pub fn emit_movsx_m16(&mut self, dst: Reg, src: Abs) {
        self.opc(OPC_MOVSWL);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOVZX r32, r8.
    pub fn emit_movzx_r8(&mut self, dst: Reg, src: Reg8) {
        self.opc(OPC_MOVZBL);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// MOVZX r32, [disp32] (byte).
    pub fn emit_movzx_m8(&mut self, dst: Reg, src: Abs) {
        self.opc(OPC_MOVZBL);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// MOVZX r32, r16.
    pub fn emit_movzx_r16(&mut self, dst: Reg, src: Reg16) {
        self.opc(OPC_MOVZWL);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// MOVZX r32, [disp32] (word).
    pub fn emit_movzx_m16(&mut self, dst: Reg, src: Abs) {
        self.opc(OPC_MOVZWL);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // conditional move
    // ------------------------------------------------------------------

    /// CMOVcc r32, r32.
    pub fn emit_cmovcc(&mut self, cc: Cond, dst: Reg, src: Reg) {
        self.opc(OPC_CMOVCC + cc as u32);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// CMOVcc r32, [disp32].
    pub fn emit_cmovcc_m(&mut self, cc: Cond, dst: Reg, src: Abs) {
        self.opc(OPC_CMOVCC + cc as u32);
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // arithmetic (ADD/OR/ADC/SBB/AND/SUB/XOR/CMP)
    // ------------------------------------------------------------------

    /// Arith r32, r32.
    pub fn emit_arith_rr(&mut self, op: ArithOp, dst: Reg, src: Reg) {
        self.opc(OPC_ARITH_EvGv + ((op as u32) << 3));
        self.modrm(3, src as u8, dst as u8);
        self.post_emit();
    }

    /// Arith r32, imm32. Always the imm32 encoding: the short
    /// accumulator opcode for EAX, the 0x81 group otherwise — never the
    /// sign-extended imm8 form, which the peephole patterns do not
    /// recognize.
    pub fn emit_arith_ri(&mut self, op: ArithOp, dst: Reg, imm: u32) {
        if dst == Reg::Eax {
            self.opc(OPC_ARITH_eAXIz + ((op as u32) << 3));
        } else {
            self.opc(OPC_ARITH_EvIz);
            self.modrm(3, op as u8, dst as u8);
        }
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// Arith r32, [disp32].
    pub fn emit_arith_rm(&mut self, op: ArithOp, dst: Reg, src: Abs) {
        self.opc(OPC_ARITH_GvEv + ((op as u32) << 3));
        self.modrm_abs(dst as u8, src.0);
        self.post_emit();
    }

    /// Arith [disp32], r32.
    pub fn emit_arith_mr(&mut self, op: ArithOp, dst: Abs, src: Reg) {
        self.opc(OPC_ARITH_EvGv + ((op as u32) << 3));
        self.modrm_abs(src as u8, dst.0);
        self.post_emit();
    }

    /// Arith [disp32], imm32.
    pub fn emit_arith_mi(&mut self, op: ArithOp, dst: Abs, imm: u32) {
        self.opc(OPC_ARITH_EvIz);
        self.modrm_abs(op as u8, dst.0);
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// Arith [base + disp], r32.
    pub fn emit_arith_mem_r(&mut self, op: ArithOp, dst: Mem, src: Reg) {
        self.opc(OPC_ARITH_EvGv + ((op as u32) << 3));
        self.modrm_mem(src as u8, dst);
        self.post_emit();
    }

    /// Arith r32, [base + disp].
    pub fn emit_arith_r_mem(&mut self, op: ArithOp, dst: Reg, src: Mem) {
        self.opc(OPC_ARITH_GvEv + ((op as u32) << 3));
        self.modrm_mem(dst as u8, src);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // unary
    // ------------------------------------------------------------------

    /// NOT r32.
    pub fn emit_not(&mut self, dst: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Not as u8, dst as u8);
        self.post_emit();
    }

    /// NEG r32.
    pub fn emit_neg(&mut self, dst: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Neg as u8, dst as u8);
        self.post_emit();
    }

    /// INC r32.
    pub fn emit_inc(&mut self, dst: Reg) {
        self.opc(OPC_INC_r32 + dst as u32);
        self.post_emit();
    }

    /// DEC r32.
    pub fn emit_dec(&mut self, dst: Reg) {
        self.opc(OPC_DEC_r32 + dst as u32);
        self.post_emit();
    }

    /// INC [disp32].
    pub fn emit_inc_m(&mut self, dst: Abs) {
        self.opc(OPC_GRP5);
        self.modrm_abs(Ext5Op::Inc as u8, dst.0);
        self.post_emit();
    }

    /// DEC [disp32].
    pub fn emit_dec_m(&mut self, dst: Abs) {
        self.opc(OPC_GRP5);
        self.modrm_abs(Ext5Op::Dec as u8, dst.0);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // multiply / divide
    // ------------------------------------------------------------------

    /// MUL r32 (unsigned): EDX:EAX = EAX * r32.
    pub fn emit_mul(&mut self, src: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Mul as u8, src as u8);
        self.post_emit();
    }

    /// MUL [disp32].
    pub fn emit_mul_m(&mut self, src: Abs) {
        self.opc(OPC_GRP3_Ev);
        self.modrm_abs(Ext3Op::Mul as u8, src.0);
        self.post_emit();
    }

    /// IMUL r32 (signed): EDX:EAX = EAX * r32.
    pub fn emit_imul(&mut self, src: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Imul as u8, src as u8);
        self.post_emit();
    }

    /// IMUL [disp32].
    pub fn emit_imul_m(&mut self, src: Abs) {
        self.opc(OPC_GRP3_Ev);
        self.modrm_abs(Ext3Op::Imul as u8, src.0);
        self.post_emit();
    }

    /// IMUL r32, r32: dst = dst * src.
    pub fn emit_imul_rr(&mut self, dst: Reg, src: Reg) {
        self.opc(OPC_IMUL_GvEv);
        self.modrm(3, dst as u8, src as u8);
        self.post_emit();
    }

    /// DIV r32 (unsigned): EAX = EDX:EAX / r32, EDX = remainder.
    pub fn emit_div(&mut self, src: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Div as u8, src as u8);
        self.post_emit();
    }

    /// DIV [disp32].
    pub fn emit_div_m(&mut self, src: Abs) {
        self.opc(OPC_GRP3_Ev);
        self.modrm_abs(Ext3Op::Div as u8, src.0);
        self.post_emit();
    }

    /// IDIV r32 (signed): EAX = EDX:EAX / r32, EDX = remainder.
    pub fn emit_idiv(&mut self, src: Reg) {
        self.opc(OPC_GRP3_Ev);
        self.modrm(3, Ext3Op::Idiv as u8, src as u8);
        self.post_emit();
    }

    /// IDIV [disp32].
    pub fn emit_idiv_m(&mut self, src: Abs) {
        self.opc(OPC_GRP3_Ev);
        self.modrm_abs(Ext3Op::Idiv as u8, src.0);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // shift / rotate
    // ------------------------------------------------------------------

    /// Shift/rotate r32 by imm8 (the one-bit form for imm == 1).
    pub fn emit_shift_ri(&mut self, op: ShiftOp, dst: Reg, imm: u8) {
        if imm == 1 {
            self.opc(OPC_SHIFT_1);
            self.modrm(3, op as u8, dst as u8);
        } else {
            self.opc(OPC_SHIFT_Ib);
            self.modrm(3, op as u8, dst as u8);
            self.buf.write_u8(imm);
        }
        self.post_emit();
    }

    /// Shift/rotate r32 by CL.
    pub fn emit_shift_cl(&mut self, op: ShiftOp, dst: Reg) {
        self.opc(OPC_SHIFT_cl);
        self.modrm(3, op as u8, dst as u8);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // stack
    // ------------------------------------------------------------------

    /// PUSH r32.
    pub fn emit_push(&mut self, src: Reg) {
        self.opc(OPC_PUSH_r32 + src as u32);
        self.post_emit();
    }

    /// PUSH imm32. Always the 68 imm32 form.
    pub fn emit_push_imm(&mut self, imm: u32) {
        self.opc(OPC_PUSH_Iz);
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// PUSH [disp32].
    pub fn emit_push_m(&mut self, src: Abs) {
        self.opc(OPC_GRP5);
        self.modrm_abs(Ext5Op::Push as u8, src.0);
        self.post_emit();
    }

    /// PUSH [base + index*scale + disp].
    pub fn emit_push_sib(&mut self, src: Sib) {
        self.opc(OPC_GRP5);
        self.modrm_sib(Ext5Op::Push as u8, src);
        self.post_emit();
    }

    /// POP r32.
    pub fn emit_pop(&mut self, dst: Reg) {
        self.opc(OPC_POP_r32 + dst as u32);
        self.post_emit();
    }

    /// POP [base + index*scale + disp].
    pub fn emit_pop_sib(&mut self, dst: Sib) {
        self.opc(OPC_POP_Ev);
        self.modrm_sib(0, dst);
        self.post_emit();
    }

    /// PUSHA.
    pub fn emit_pusha(&mut self) {
        self.opc(OPC_PUSHA);
        self.post_emit();
    }

    /// POPA.
    pub fn emit_popa(&mut self) {
        self.opc(OPC_POPA);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // control flow
    // ------------------------------------------------------------------

    /// Jcc rel8. Unbound targets return a [`Rel8`] to complete later.
    pub fn emit_jcc8(&mut self, cc: Cond, target: Option<usize>) -> Rel8 {
        self.opc(OPC_JCC_short + cc as u32);
        self.buf.write_u8(0);
        let rel = Rel8(self.buf.cursor() - 1);
        if let Some(t) = target {
            self.set_target_rel8(rel, t);
        }
        self.peep_fence();
        self.post_emit();
        rel
    }

    /// Jcc rel32.
    pub fn emit_jcc32(&mut self, cc: Cond, target: Option<usize>) -> Rel32 {
        self.opc(OPC_JCC_long + cc as u32);
        self.buf.write_u32(0);
        let rel = Rel32(self.buf.cursor() - 4);
        if let Some(t) = target {
            self.set_target_rel32(rel, t);
        }
        self.peep_fence();
        self.post_emit();
        rel
    }

    /// JMP rel8.
    pub fn emit_jmp8(&mut self, target: Option<usize>) -> Rel8 {
        self.opc(OPC_JMP_short);
        self.buf.write_u8(0);
        let rel = Rel8(self.buf.cursor() - 1);
        if let Some(t) = target {
            self.set_target_rel8(rel, t);
        }
        self.peep_fence();
        self.post_emit();
        rel
    }

    /// JMP rel32.
    pub fn emit_jmp32(&mut self, target: Option<usize>) -> Rel32 {
        self.opc(OPC_JMP_long);
        self.buf.write_u32(0);
        let rel = Rel32(self.buf.cursor() - 4);
        if let Some(t) = target {
            self.set_target_rel32(rel, t);
        }
        self.peep_fence();
        self.post_emit();
        rel
    }

    /// JMP r32 (indirect).
    pub fn emit_jmp_r(&mut self, dst: Reg) {
        self.opc(OPC_GRP5);
        self.modrm(3, Ext5Op::Jmp as u8, dst as u8);
        self.peep_fence();
        self.post_emit();
    }

    /// CALL rel32.
    pub fn emit_call(&mut self, target: Option<usize>) -> Rel32 {
        self.opc(OPC_CALL_Jz);
        self.buf.write_u32(0);
        let rel = Rel32(self.buf.cursor() - 4);
        if let Some(t) = target {
            self.set_target_rel32(rel, t);
        }
        self.peep_fence();
        self.post_emit();
        rel
    }

    /// CALL r32 (indirect).
    pub fn emit_call_r(&mut self, dst: Reg) {
        self.opc(OPC_GRP5);
        self.modrm(3, Ext5Op::Call as u8, dst as u8);
        self.peep_fence();
        self.post_emit();
    }

    /// CALL [disp32] (indirect through memory).
    pub fn emit_call_m(&mut self, dst: Abs) {
        self.opc(OPC_GRP5);
        self.modrm_abs(Ext5Op::Call as u8, dst.0);
        self.peep_fence();
        self.post_emit();
    }

    /// RET.
    pub fn emit_ret(&mut self) {
        self.opc(OPC_RET);
        self.post_emit();
    }

    /// SETcc on the low byte register of `dst` (AL for EAX, ...).
    /// Upper bits are left unchanged.
    pub fn emit_setcc(&mut self, cc: Cond, dst: Reg) {
        self.opc(OPC_SETCC + cc as u32);
        self.modrm(3, 0, dst as u8);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // test / bit test / compare support
    // ------------------------------------------------------------------

    /// TEST r32, r32.
    pub fn emit_test_rr(&mut self, dst: Reg, src: Reg) {
        self.opc(OPC_TESTL);
        self.modrm(3, src as u8, dst as u8);
        self.post_emit();
    }

    /// TEST r32, imm32.
    pub fn emit_test_ri(&mut self, dst: Reg, imm: u32) {
        if dst == Reg::Eax {
            self.opc(OPC_TEST_eAXIz);
        } else {
            self.opc(OPC_GRP3_Ev);
            self.modrm(3, 0, dst as u8);
        }
        self.buf.write_u32(imm);
        self.post_emit();
    }

    /// BT r32, imm8.
    pub fn emit_bt_ri(&mut self, dst: Reg, bit: u8) {
        self.opc(OPC_GRPBT);
        self.modrm(3, 4, dst as u8);
        self.buf.write_u8(bit);
        self.post_emit();
    }

    // ------------------------------------------------------------------
    // data conversion / misc
    // ------------------------------------------------------------------

    /// CBW: sign-extend AL into AX.
    pub fn emit_cbw(&mut self) {
        self.opc(OPC_CBW);
        self.post_emit();
    }

    /// CWD: sign-extend AX into DX:AX.
    pub fn emit_cwd(&mut self) {
        self.opc(OPC_CWD);
        self.post_emit();
    }

    /// CDQ: sign-extend EAX into EDX:EAX.
    pub fn emit_cdq(&mut self) {
        self.opc(OPC_CDQ);
        self.post_emit();
    }

    /// NOP.
    pub fn emit_nop(&mut self) {
        self.opc(OPC_NOP);
        self.post_emit();
    }

    /// INT3 (debug trap).
    pub fn emit_int3(&mut self) {
        self.opc(OPC_INT3);
        self.post_emit();
    }
}
