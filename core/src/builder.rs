//! IR builder — records the instruction stream for one program.

use crate::node::{Arg, Node, NodeIdx};
use crate::opcode::Opcode;
use crate::SLOT_SIZE;

/// Owns the ordered node sequence of one program under construction.
///
/// Nodes are appended in program order and addressed by [`NodeIdx`].
/// Branch and call nodes start with an unbound target; the caller binds
/// them to label nodes with [`IrBuilder::set_target`] before code
/// generation. `clear()` drops the whole sequence at once; individual
/// nodes are never removed or reordered.
pub struct IrBuilder {
    nodes: Vec<Node>,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(64),
        }
    }

    fn push(&mut self, node: Node) -> NodeIdx {
        let idx = NodeIdx(self.nodes.len() as u32);
        self.nodes.push(node);
        idx
    }

    // -- Value operations --

    /// Push a constant onto the evaluation stack.
    pub fn emit_const(&mut self, val: i32) -> NodeIdx {
        self.push(Node::with_imm(Opcode::Const, val))
    }

    /// Discard `slots` values from the top of the stack.
    pub fn emit_drop(&mut self, slots: u32) -> NodeIdx {
        self.push(Node::with_count(Opcode::Drop, slots * SLOT_SIZE))
    }

    /// Duplicate the top of the stack.
    pub fn emit_dup(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Dup))
    }

    /// Save the top of the stack, discard `slots` values below it,
    /// restore the saved top.
    pub fn emit_sink(&mut self, slots: u32) -> NodeIdx {
        self.push(Node::with_count(Opcode::Sink, slots * SLOT_SIZE))
    }

    /// Push the local at frame slot `slot` (args at positive slots,
    /// frame locals at negative slots).
    pub fn emit_getl(&mut self, slot: i32) -> NodeIdx {
        self.push(Node::with_imm(Opcode::GetLocal, slot * SLOT_SIZE as i32))
    }

    /// Pop the stack into the local at frame slot `slot`.
    pub fn emit_setl(&mut self, slot: i32) -> NodeIdx {
        self.push(Node::with_imm(Opcode::SetLocal, slot * SLOT_SIZE as i32))
    }

    /// Open a procedure frame reserving `slots` local slots.
    pub fn emit_frame(&mut self, slots: u32) -> NodeIdx {
        self.push(Node::with_count(Opcode::Frame, slots * SLOT_SIZE))
    }

    /// Pop the return value, release `slots` local slots, tear down the
    /// frame and return to the caller.
    pub fn emit_return(&mut self, slots: u32) -> NodeIdx {
        self.push(Node::with_count(Opcode::Return, slots * SLOT_SIZE))
    }

    // -- Arithmetic / logic / comparison --

    pub fn emit_add(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Add))
    }

    pub fn emit_sub(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Sub))
    }

    pub fn emit_mul(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Mul))
    }

    pub fn emit_and(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::And))
    }

    pub fn emit_or(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Or))
    }

    /// Logical not: 0 becomes 1, everything else becomes 0.
    pub fn emit_notl(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::NotL))
    }

    pub fn emit_lt(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Lt))
    }

    pub fn emit_le(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Le))
    }

    pub fn emit_gt(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Gt))
    }

    pub fn emit_ge(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Ge))
    }

    pub fn emit_eq(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Eq))
    }

    pub fn emit_ne(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Ne))
    }

    // -- Control flow --

    /// Call a label; the callee's return value is pushed after return.
    pub fn emit_call(&mut self) -> NodeIdx {
        self.push(Node::with_target(Opcode::Call))
    }

    /// Pop the stack, branch if the value is zero.
    pub fn emit_jz(&mut self) -> NodeIdx {
        self.push(Node::with_target(Opcode::Jz))
    }

    /// Pop the stack, branch if the value is non-zero.
    pub fn emit_jnz(&mut self) -> NodeIdx {
        self.push(Node::with_target(Opcode::Jnz))
    }

    /// Unconditional branch.
    pub fn emit_jmp(&mut self) -> NodeIdx {
        self.push(Node::with_target(Opcode::Jmp))
    }

    /// Place a label at the current position in the stream.
    pub fn emit_label(&mut self) -> NodeIdx {
        self.push(Node::new(Opcode::Label))
    }

    /// Bind a branch/call node's edge to a label node.
    ///
    /// The target is validated to be a `Label` node at code-generation
    /// time, not here, so labels may be appended after their uses.
    pub fn set_target(&mut self, branch: NodeIdx, label: NodeIdx) {
        let node = &mut self.nodes[branch.0 as usize];
        assert!(
            node.opc.has_target(),
            "set_target on non-branch {} node",
            node.opc.name()
        );
        node.arg = Arg::Target(Some(label));
    }

    // -- Accessors --

    #[inline]
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0 as usize]
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop the whole sequence. Outstanding `NodeIdx` handles are
    /// invalidated.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
