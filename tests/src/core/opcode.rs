use sjit_core::opcode::OPCODE_COUNT;
use sjit_core::{OpFlags, Opcode, OPCODE_DEFS};

#[test]
fn names_come_from_the_table() {
    assert_eq!(Opcode::Const.name(), "const");
    assert_eq!(Opcode::GetLocal.name(), "getl");
    assert_eq!(Opcode::Return.name(), "ret");
    assert_eq!(Opcode::NotL.name(), "notl");
    assert_eq!(Opcode::Ne.name(), "ne");
}

#[test]
fn table_covers_every_opcode() {
    assert_eq!(OPCODE_DEFS.len(), OPCODE_COUNT);
    assert_eq!(OPCODE_DEFS[Opcode::Ne as usize].name, "ne");
}

#[test]
fn branch_opcodes_carry_targets() {
    for opc in [Opcode::Call, Opcode::Jz, Opcode::Jnz, Opcode::Jmp] {
        assert!(opc.has_target(), "{} should carry a target", opc.name());
    }
    for opc in [Opcode::Const, Opcode::Label, Opcode::Add, Opcode::Lt] {
        assert!(!opc.has_target(), "{} should not carry a target", opc.name());
    }
}

#[test]
fn comparison_opcodes_are_flagged() {
    for opc in [
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Eq,
        Opcode::Ne,
    ] {
        assert!(opc.is_compare());
    }
    assert!(!Opcode::Add.is_compare());
    assert!(!Opcode::NotL.is_compare());
    assert!(!Opcode::Jz.is_compare());
}

#[test]
fn payload_flags() {
    assert!(Opcode::Const.def().flags.contains(OpFlags::IMM));
    assert!(Opcode::SetLocal.def().flags.contains(OpFlags::IMM));
    assert!(Opcode::Drop.def().flags.contains(OpFlags::COUNT));
    assert!(Opcode::Frame.def().flags.contains(OpFlags::COUNT));
    assert!(!Opcode::Dup.def().flags.contains(OpFlags::IMM));
    assert!(!Opcode::Dup.def().flags.contains(OpFlags::COUNT));
}
