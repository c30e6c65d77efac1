use sjit_backend::code_buffer::CodeBuffer;
use sjit_backend::x86::emitter::Emitter;
use sjit_backend::{CodeGen, Jit, RelocKind};
use sjit_core::IrBuilder;

fn jit() -> Jit {
    Jit::new(4096).unwrap()
}

// -- straight-line programs, full byte images --

#[test]
fn return_constant() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(0xCAFEBABEu32 as i32);
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0xB8, 0xBE, 0xBA, 0xFE, 0xCA, // mov eax, 0xcafebabe
            0x5D, // pop ebp
            0xC3, // ret
        ]
    );
}

#[test]
fn const_zero_uses_xor() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(0);
    j.emit_return(0);
    j.finish();
    // xor leaves nothing for the rewriter to fold: the push/pop pair
    // around it cancels instead
    assert_eq!(j.code(), [0x55, 0x89, 0xE5, 0x31, 0xC0, 0x5D, 0xC3]);
}

#[test]
fn add_two_constants() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(11);
    j.emit_const(1234);
    j.emit_add();
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0x68, 0x0B, 0x00, 0x00, 0x00, // push 11
            0xB8, 0xD2, 0x04, 0x00, 0x00, // mov eax, 1234
            0x01, 0x44, 0x24, 0x00, // add [esp], eax
            0x58, // pop eax
            0x5D, // pop ebp
            0xC3, // ret
        ]
    );
}

#[test]
fn sub_of_constant_folds_to_stack_top() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(10);
    j.emit_const(1);
    j.emit_sub();
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, 0x89, 0xE5, // prologue
            0x68, 0x0A, 0x00, 0x00, 0x00, // push 10
            0x81, 0x2C, 0x24, 0x01, 0x00, 0x00, 0x00, // sub [esp], 1
            0x58, 0x5D, 0xC3, // pop eax; pop ebp; ret
        ]
    );
}

#[test]
fn drop_releases_slots() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(1);
    j.emit_const(2);
    j.emit_drop(1);
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, 0x89, 0xE5, // prologue
            0x68, 0x01, 0x00, 0x00, 0x00, // push 1
            0x68, 0x02, 0x00, 0x00, 0x00, // push 2
            0x81, 0xC4, 0x04, 0x00, 0x00, 0x00, // add esp, 4
            0x58, 0x5D, 0xC3, // pop eax; pop ebp; ret
        ]
    );
}

#[test]
fn drop_zero_emits_nothing() {
    let mut j = jit();
    j.emit_drop(0);
    j.emit_sink(0);
    j.finish();
    assert!(j.code().is_empty());
}

#[test]
fn sink_saves_the_stack_top() {
    let mut j = jit();
    j.emit_sink(2);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x58, // pop eax
            0x81, 0xC4, 0x08, 0x00, 0x00, 0x00, // add esp, 8
            0x50, // push eax
        ]
    );
}

#[test]
fn dup_reloads_the_stack_top() {
    let mut j = jit();
    j.emit_dup();
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x8B, 0x44, 0x24, 0x00, // mov eax, [esp]
            0x50, // push eax
        ]
    );
}

#[test]
fn locals_address_through_ebp() {
    let mut j = jit();
    j.emit_getl(2);
    j.emit_setl(-1);
    j.finish();
    // getl's push cancels against setl's pop
    assert_eq!(
        j.code(),
        [
            0x8B, 0x45, 0x08, // mov eax, [ebp+8]
            0x89, 0x45, 0xFC, // mov [ebp-4], eax
        ]
    );
}

#[test]
fn frame_reserves_local_space() {
    let mut j = jit();
    j.emit_frame(1);
    j.emit_const(0xC0FFEE);
    j.emit_return(1);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0x81, 0xEC, 0x04, 0x00, 0x00, 0x00, // sub esp, 4
            0xB8, 0xEE, 0xFF, 0xC0, 0x00, // mov eax, 0xc0ffee
            0x81, 0xC4, 0x04, 0x00, 0x00, 0x00, // add esp, 4
            0x5D, // pop ebp
            0xC3, // ret
        ]
    );
}

#[test]
fn mul_multiplies_through_edx() {
    let mut j = jit();
    j.emit_mul();
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x58, // pop eax
            0x8B, 0x54, 0x24, 0x00, // mov edx, [esp]
            0xF7, 0xEA, // imul edx
            0x89, 0x44, 0x24, 0x00, // mov [esp], eax
        ]
    );
}

#[test]
fn and_or_work_in_registers() {
    let mut j = jit();
    j.emit_and();
    j.finish();
    assert_eq!(j.code(), [0x58, 0x5A, 0x21, 0xD0, 0x50]);

    let mut j = jit();
    j.emit_or();
    j.finish();
    assert_eq!(j.code(), [0x58, 0x5A, 0x09, 0xD0, 0x50]);
}

#[test]
fn logical_not_booleanizes() {
    let mut j = jit();
    j.emit_notl();
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x58, // pop eax
            0x85, 0xC0, // test eax, eax
            0x0F, 0x94, 0xC0, // sete al
            0x25, 0x01, 0x00, 0x00, 0x00, // and eax, 1
            0x50, // push eax
        ]
    );
}

// -- comparisons --

#[test]
fn bare_comparison_booleanizes() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(1);
    j.emit_const(2);
    j.emit_lt();
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, 0x89, 0xE5, // prologue
            0x68, 0x01, 0x00, 0x00, 0x00, // push 1
            0x5A, // pop edx
            0x81, 0xFA, 0x02, 0x00, 0x00, 0x00, // cmp edx, 2
            0x0F, 0x9C, 0xC0, // setl al
            0x25, 0x01, 0x00, 0x00, 0x00, // and eax, 1
            0x5D, 0xC3, // pop ebp; ret
        ]
    );
}

#[test]
fn comparison_followed_by_jnz_fuses() {
    let mut j = jit();
    j.emit_lt();
    let br = j.emit_jnz();
    let label = j.emit_label();
    j.set_target(br, label);
    j.finish();
    // single jl, no setcc
    assert_eq!(
        j.code(),
        [
            0x58, // pop eax
            0x5A, // pop edx
            0x39, 0xC2, // cmp edx, eax
            0x0F, 0x8C, 0x00, 0x00, 0x00, 0x00, // jl +0
        ]
    );
}

#[test]
fn comparison_followed_by_jz_inverts() {
    let mut j = jit();
    j.emit_le();
    let br = j.emit_jz();
    let label = j.emit_label();
    j.set_target(br, label);
    j.finish();
    // jz of "le" branches when the comparison is false: jg
    assert_eq!(j.code()[4..6], [0x0F, 0x8F]);
}

#[test]
fn label_between_comparison_and_branch_blocks_fusion() {
    let mut j = jit();
    j.emit_eq();
    j.emit_label();
    let br = j.emit_jz();
    let label = j.emit_label();
    j.set_target(br, label);
    j.finish();
    // booleanized sete must be present
    let code = j.code();
    assert!(
        code.windows(2).any(|w| w == [0x0F, 0x94]),
        "expected a sete in {code:02x?}"
    );
}

#[test]
fn comparison_before_drop_is_not_fused() {
    let mut j = jit();
    j.emit_gt();
    j.emit_drop(1);
    j.finish();
    let code = j.code();
    // booleanized setg, then add esp
    assert!(code.windows(2).any(|w| w == [0x0F, 0x9F]));
}

// -- control flow and relocation --

#[test]
fn forward_conditional() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(0);
    let br = j.emit_jz();
    j.emit_const(0xDEAD);
    j.emit_return(0);
    let label = j.emit_label();
    j.set_target(br, label);
    j.emit_const(0xBEEF);
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0x31, 0xC0, // xor eax, eax
            0x3D, 0x00, 0x00, 0x00, 0x00, // cmp eax, 0
            0x0F, 0x84, 0x07, 0x00, 0x00, 0x00, // je +7
            0xB8, 0xAD, 0xDE, 0x00, 0x00, // mov eax, 0xdead
            0x5D, 0xC3, // pop ebp; ret
            0xB8, 0xEF, 0xBE, 0x00, 0x00, // mov eax, 0xbeef
            0x5D, 0xC3, // pop ebp; ret
        ]
    );
}

#[test]
fn countdown_loop() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(10);
    let entry = j.emit_jmp();
    let body = j.emit_label();
    j.emit_const(1);
    j.emit_sub();
    let check = j.emit_label();
    j.emit_dup();
    let back = j.emit_jnz();
    j.emit_return(0);
    j.set_target(entry, check);
    j.set_target(back, body);
    j.finish();
    assert_eq!(
        j.code(),
        [
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0x68, 0x0A, 0x00, 0x00, 0x00, // push 10
            0xE9, 0x07, 0x00, 0x00, 0x00, // jmp check
            0x81, 0x2C, 0x24, 0x01, 0x00, 0x00, 0x00, // body: sub [esp], 1
            0x8B, 0x44, 0x24, 0x00, // check: mov eax, [esp]
            0x3D, 0x00, 0x00, 0x00, 0x00, // cmp eax, 0
            0x0F, 0x85, 0xEA, 0xFF, 0xFF, 0xFF, // jne body
            0x58, 0x5D, 0xC3, // pop eax; pop ebp; ret
        ]
    );
}

#[test]
fn recursive_factorial_image() {
    let mut j = jit();
    let func = j.emit_label();
    j.emit_frame(0);
    j.emit_getl(2);
    j.emit_const(1);
    j.emit_le();
    let not_base = j.emit_jz();
    j.emit_const(1);
    j.emit_return(0);
    let recurse = j.emit_label();
    j.set_target(not_base, recurse);
    j.emit_getl(2);
    j.emit_getl(2);
    j.emit_const(1);
    j.emit_sub();
    let call = j.emit_call();
    j.set_target(call, func);
    j.emit_sink(1);
    j.emit_mul();
    j.emit_return(0);
    j.finish();
    assert_eq!(
        j.code(),
        [
            // func:
            0x55, // push ebp
            0x89, 0xE5, // mov ebp, esp
            0x8B, 0x45, 0x08, // mov eax, [ebp+8]
            0x3D, 0x01, 0x00, 0x00, 0x00, // cmp eax, 1
            0x0F, 0x8F, 0x07, 0x00, 0x00, 0x00, // jg recurse
            0xB8, 0x01, 0x00, 0x00, 0x00, // mov eax, 1
            0x5D, 0xC3, // pop ebp; ret
            // recurse:
            0x8B, 0x45, 0x08, // mov eax, [ebp+8]
            0x50, // push eax
            0x8B, 0x45, 0x08, // mov eax, [ebp+8]
            0x50, // push eax
            0x81, 0x2C, 0x24, 0x01, 0x00, 0x00, 0x00, // sub [esp], 1
            0xE8, 0xD4, 0xFF, 0xFF, 0xFF, // call func
            0x81, 0xC4, 0x04, 0x00, 0x00, 0x00, // add esp, 4
            0x50, // push eax
            0x8B, 0x54, 0x24, 0x00, // mov edx, [esp]
            0xF7, 0xEA, // imul edx
            0x89, 0x44, 0x24, 0x00, // mov [esp], eax
            0x58, 0x5D, 0xC3, // pop eax; pop ebp; ret
        ]
    );
}

// -- the walk via CodeGen directly --

#[test]
fn label_bindings_record_offsets() {
    let mut ir = IrBuilder::new();
    ir.emit_frame(0);
    let label = ir.emit_label();
    let jmp = ir.emit_jmp();
    ir.set_target(jmp, label);

    let mut asm = Emitter::new(CodeBuffer::new(4096).unwrap());
    let mut gen = CodeGen::new(&ir, &mut asm);
    gen.run();

    // frame is push ebp; mov ebp, esp = 3 bytes
    assert_eq!(gen.bindings()[&label], 3);
    assert_eq!(gen.relocs().len(), 1);
    assert_eq!(gen.relocs()[0].kind, RelocKind::Rel);
    assert_eq!(gen.relocs()[0].node, jmp);
}

#[test]
fn backward_jump_displacement() {
    let mut ir = IrBuilder::new();
    let label = ir.emit_label();
    let jmp = ir.emit_jmp();
    ir.set_target(jmp, label);

    let mut asm = Emitter::new(CodeBuffer::new(4096).unwrap());
    CodeGen::new(&ir, &mut asm).run();
    // jmp at 0, displacement points back to 0: -5
    assert_eq!(asm.code(), [0xE9, 0xFB, 0xFF, 0xFF, 0xFF]);
}

// -- error paths --

#[test]
#[should_panic(expected = "unbound target")]
fn unbound_branch_is_fatal() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_jmp();
    j.finish();
}

#[test]
#[should_panic(expected = "not a label")]
fn branch_to_non_label_is_fatal() {
    let mut j = jit();
    let jmp = j.emit_jmp();
    let not_a_label = j.emit_const(0);
    j.set_target(jmp, not_a_label);
    j.finish();
}

#[test]
#[should_panic(expected = "finish called twice")]
fn finishing_twice_without_clear_is_fatal() {
    let mut j = jit();
    j.emit_frame(0);
    j.finish();
    j.finish();
}

#[test]
#[should_panic(expected = "emit after finish")]
fn emitting_after_finish_is_fatal() {
    let mut j = jit();
    j.emit_frame(0);
    j.finish();
    j.emit_const(1);
}

// -- state machine / idempotence --

#[test]
fn clear_reopens_the_builder() {
    let mut j = jit();
    j.emit_frame(0);
    j.emit_const(7);
    j.emit_return(0);
    j.finish();
    j.clear();
    assert!(j.ir().is_empty());
    assert!(j.code().is_empty());
    j.emit_frame(0);
    j.emit_const(8);
    j.emit_return(0);
    j.finish();
    assert_eq!(j.code()[3..8], [0xB8, 0x08, 0x00, 0x00, 0x00]);
}

#[test]
fn finish_is_deterministic_across_clear() {
    fn build(j: &mut Jit) {
        j.emit_frame(0);
        j.emit_const(10);
        let entry = j.emit_jmp();
        let body = j.emit_label();
        j.emit_const(1);
        j.emit_sub();
        let check = j.emit_label();
        j.emit_dup();
        let back = j.emit_jnz();
        j.emit_return(0);
        j.set_target(entry, check);
        j.set_target(back, body);
    }

    let mut j = jit();
    build(&mut j);
    j.finish();
    let first = j.code().to_vec();

    j.clear();
    build(&mut j);
    j.finish();
    assert_eq!(j.code(), first);
}
