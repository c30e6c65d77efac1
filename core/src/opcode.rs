//! Stack-machine IR opcodes and their static metadata.

/// IR opcodes for the stack machine.
///
/// Every operand lives on the evaluation stack; the only out-of-band
/// payloads are immediates (`Const`, `GetLocal`, `SetLocal`), slot
/// counts (`Drop`, `Sink`, `Frame`, `Return`) and branch targets
/// (`Call`, `Jz`, `Jnz`, `Jmp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // -- Stack shuffling --
    Const = 0,
    Drop,
    Dup,
    Sink,

    // -- Frame-relative locals --
    GetLocal,
    SetLocal,

    // -- Procedure frame --
    Frame,
    Return,

    // -- Control flow --
    Call,
    Jz,
    Jnz,
    Jmp,
    Label,

    // -- Arithmetic --
    Add,
    Sub,
    Mul,

    // -- Logic --
    And,
    Or,
    NotL,

    // -- Comparison (signed) --
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

pub const OPCODE_COUNT: usize = Opcode::Ne as usize + 1;

/// Opcode flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpFlags(pub u8);

impl OpFlags {
    pub const NONE: OpFlags = OpFlags(0);
    /// Carries a signed 32-bit immediate.
    pub const IMM: OpFlags = OpFlags(1 << 0);
    /// Carries an unsigned slot-count payload (stored pre-scaled in bytes).
    pub const COUNT: OpFlags = OpFlags(1 << 1);
    /// Carries a target handle that must bind to a `Label` node.
    pub const TARGET: OpFlags = OpFlags(1 << 2);
    /// Comparison producing a 0/1 result (eligible for branch fusion).
    pub const COMPARE: OpFlags = OpFlags(1 << 3);

    #[inline]
    pub const fn contains(self, other: OpFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

/// Static definition of one opcode.
pub struct OpDef {
    pub name: &'static str,
    pub flags: OpFlags,
}

macro_rules! def {
    ($name:literal) => {
        OpDef { name: $name, flags: OpFlags::NONE }
    };
    ($name:literal, $($flag:ident)|+) => {
        OpDef {
            name: $name,
            flags: OpFlags($(OpFlags::$flag.0)|+),
        }
    };
}

/// Metadata table, indexed by `Opcode as usize`.
pub static OPCODE_DEFS: [OpDef; OPCODE_COUNT] = [
    def!("const", IMM),
    def!("drop", COUNT),
    def!("dup"),
    def!("sink", COUNT),
    def!("getl", IMM),
    def!("setl", IMM),
    def!("frame", COUNT),
    def!("ret", COUNT),
    def!("call", TARGET),
    def!("jz", TARGET),
    def!("jnz", TARGET),
    def!("jmp", TARGET),
    def!("label"),
    def!("add"),
    def!("sub"),
    def!("mul"),
    def!("and"),
    def!("or"),
    def!("notl"),
    def!("lt", COMPARE),
    def!("le", COMPARE),
    def!("gt", COMPARE),
    def!("ge", COMPARE),
    def!("eq", COMPARE),
    def!("ne", COMPARE),
];

impl Opcode {
    #[inline]
    pub fn def(self) -> &'static OpDef {
        &OPCODE_DEFS[self as usize]
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Whether this opcode's node carries a branch target handle.
    #[inline]
    pub fn has_target(self) -> bool {
        self.def().flags.contains(OpFlags::TARGET)
    }

    /// Whether this opcode is a comparison (fusable with Jz/Jnz).
    #[inline]
    pub fn is_compare(self) -> bool {
        self.def().flags.contains(OpFlags::COMPARE)
    }
}
