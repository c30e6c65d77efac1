//! IR dump — human-readable text output for the node sequence.

use std::io::Write;

use crate::builder::IrBuilder;
use crate::node::Arg;

/// Dump all nodes of `ir` to the given writer, one line per node.
///
/// Labels are rendered as `L<idx>:` markers; branch targets reference
/// the label's node index.
pub fn dump_nodes(ir: &IrBuilder, w: &mut impl Write) -> std::io::Result<()> {
    for (i, node) in ir.nodes().iter().enumerate() {
        if node.opc == crate::Opcode::Label {
            writeln!(w, "L{i}:")?;
            continue;
        }
        match node.arg {
            Arg::None => writeln!(w, "{i:04}: {}", node.opc.name())?,
            Arg::Imm(v) => {
                writeln!(w, "{i:04}: {} ${v:#x}", node.opc.name())?
            }
            Arg::Count(n) => {
                writeln!(w, "{i:04}: {} {n}", node.opc.name())?
            }
            Arg::Target(t) => match t {
                Some(l) => {
                    let l = l.0;
                    writeln!(w, "{i:04}: {} -> L{l}", node.opc.name())?
                }
                None => {
                    writeln!(w, "{i:04}: {} -> ?", node.opc.name())?
                }
            },
        }
    }
    Ok(())
}
