//! sjit-irdump — build a demo program, dump its IR and generated code.
//!
//! Compiles a recursive factorial and prints the IR listing followed by
//! a hex dump of the machine code. Run with `RUST_LOG=trace` to see the
//! code generator's per-node tracing.

use std::io::{self, BufWriter, Write};

use sjit_backend::Jit;
use sjit_core::dump::dump_nodes;

/// factorial(n), taking its argument at frame slot 2 (first cdecl arg).
fn build_factorial(j: &mut Jit) {
    let func = j.emit_label();
    j.emit_frame(0);

    // if (n <= 1) return 1
    j.emit_getl(2);
    j.emit_const(1);
    j.emit_le();
    let not_base = j.emit_jz();
    j.emit_const(1);
    j.emit_return(0);

    // return n * factorial(n - 1)
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
}

fn hex_dump(code: &[u8], w: &mut impl Write) -> io::Result<()> {
    for (i, chunk) in code.chunks(16).enumerate() {
        write!(w, "{:08x}: ", i * 16)?;
        for byte in chunk {
            write!(w, "{byte:02x} ")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn main() -> io::Result<()> {
    env_logger::init();

    let mut j = Jit::new(4096).expect("failed to allocate code buffer");
    build_factorial(&mut j);

    let stdout = io::stdout();
    let mut w = BufWriter::new(stdout.lock());

    writeln!(w, "-- IR ({} nodes)", j.ir().len())?;
    dump_nodes(j.ir(), &mut w)?;

    j.finish();

    writeln!(w, "-- code ({} bytes)", j.code().len())?;
    hex_dump(j.code(), &mut w)?;
    w.flush()
}
