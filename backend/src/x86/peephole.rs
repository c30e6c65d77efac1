//! Post-emit peephole rewriter.
//!
//! Runs after every encoded instruction on the trailing bytes between
//! the fence and the cursor. A firing rule rolls the cursor back over
//! the matched sequence and re-emits the replacement through the
//! encoder, which re-enters the rewriter; the loop repeats until no
//! rule matches. Rewrites never read or move bytes at or below the
//! fence, so offsets recorded for branch targets and pending
//! displacement fields stay valid.

use crate::x86::emitter::{ArithOp, Emitter};
use crate::x86::regs::Reg;

const PUSH_EAX: u8 = 0x50;
const POP_EAX: u8 = 0x58;
const POP_EDX: u8 = 0x5A;
const MOV_EAX_Iv: u8 = 0xB8;
const PUSH_Iz: u8 = 0x68;

impl Emitter {
    /// Byte `index` positions behind the cursor.
    #[inline]
    fn prior8(&self, index: usize) -> u8 {
        self.buf.read_u8(self.buf.cursor() - index)
    }

    /// Little-endian u32 starting `index` positions behind the cursor.
    #[inline]
    fn prior32(&self, index: usize) -> u32 {
        self.buf.read_u32(self.buf.cursor() - index)
    }

    /// Roll the cursor back `count` bytes.
    #[inline]
    fn rewind(&mut self, count: usize) {
        let cursor = self.buf.cursor();
        self.buf.set_cursor(cursor - count);
    }

    /// Rewrite recognized sequences at the tail of the emitted stream.
    pub(crate) fn post_emit(&mut self) {
        loop {
            let space = self.buf.cursor() - self.fence;

            // [ push eax | pop eax ] => []
            if space >= 2 && self.prior8(2) == PUSH_EAX && self.prior8(1) == POP_EAX {
                self.rewind(2);
                continue;
            }

            // [ mov eax, imm32 | push eax ] => [ push imm32 ]
            if space >= 6 && self.prior8(6) == MOV_EAX_Iv && self.prior8(1) == PUSH_EAX {
                let imm = self.prior32(5);
                self.rewind(6);
                self.emit_push_imm(imm);
                continue;
            }

            // [ push imm32 | pop eax ] => [ mov eax, imm32 ]
            if space >= 6 && self.prior8(6) == PUSH_Iz && self.prior8(1) == POP_EAX {
                let imm = self.prior32(5);
                self.rewind(6);
                self.emit_mov_ri(Reg::Eax, imm);
                continue;
            }

            // [ mov eax, imm32 | pop edx | cmp edx, eax ]
            //   => [ pop edx | cmp edx, imm32 ]
            if space >= 8
                && self.prior8(8) == MOV_EAX_Iv
                && self.prior8(3) == POP_EDX
                && self.prior8(2) == 0x39
                && self.prior8(1) == 0xC2
            {
                let imm = self.prior32(7);
                self.rewind(8);
                self.emit_pop(Reg::Edx);
                self.emit_arith_ri(ArithOp::Cmp, Reg::Edx, imm);
                continue;
            }

            // [ push eax | pop edx ] => [ mov edx, eax ]
            if space >= 2 && self.prior8(2) == PUSH_EAX && self.prior8(1) == POP_EDX {
                self.rewind(2);
                self.emit_mov_rr(Reg::Edx, Reg::Eax);
                continue;
            }

            // [ mov edx, eax | cmp edx, imm32 ] => [ cmp eax, imm32 ]
            // 89 c2             mov edx, eax
            // 81 fa xx xx xx xx cmp edx, imm32
            if space >= 8
                && self.prior8(8) == 0x89
                && self.prior8(7) == 0xC2
                && self.prior8(6) == 0x81
                && self.prior8(5) == 0xFA
            {
                let imm = self.prior32(4);
                self.rewind(8);
                self.emit_arith_ri(ArithOp::Cmp, Reg::Eax, imm);
                continue;
            }

            // [ mov eax, imm32 | sub [esp], eax ] => [ sub [esp], imm32 ]
            // b8 xx xx xx xx    mov eax, imm32
            // 29 44 24 00       sub dword [esp+0x0], eax
            if space >= 9
                && self.prior8(9) == MOV_EAX_Iv
                && self.prior8(4) == 0x29
                && self.prior8(3) == 0x44
                && self.prior8(2) == 0x24
                && self.prior8(1) == 0x00
            {
                let imm = self.prior32(8);
                self.rewind(9);
                // 81 2c 24 imm32: sub dword [esp], imm32
                self.buf.write_bytes(&[0x81, 0x2C, 0x24]);
                self.buf.write_u32(imm);
                continue;
            }

            break;
        }
    }
}
