//! Assemble a tiny guest program in memory, run it to completion,
//! and print what it wrote to the console sink.

use rv32vm::encode;
use rv32vm::hart::memory::Wordsize;
use rv32vm::hart::{Exception, Hart, VmConfig};

fn main() {
    let mut hart = Hart::with_local_host(VmConfig::default());
    hart.memory.write_range(256, b"liftoff\n").unwrap();

    let program = [
        encode::addi(5, 0, 5),    // t0 = 5
        encode::addi(5, 5, -1),   // t0 -= 1
        encode::bne(5, 0, -4),    // loop until t0 reaches zero
        encode::addi(10, 0, 256), // a0 = message address
        encode::addi(11, 0, 8),   // a1 = message length
        encode::addi(17, 0, 1),   // a7 = PRINT
        encode::ecall(),
        encode::ebreak(),
    ];
    for (n, word) in program.iter().enumerate() {
        hart.memory
            .write(4 * n as u32, *word, Wordsize::Word)
            .unwrap();
    }

    loop {
        match hart.step() {
            Ok(()) => {}
            Err(Exception::Break) => break,
            Err(e) => panic!("unexpected exception: {e}"),
        }
    }
    print!("{}", hart.console.flush());
}
