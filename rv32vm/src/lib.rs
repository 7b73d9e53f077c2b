//! RV32IM user-mode virtual machine
//!
//! This crate implements a single-hart RV32IM interpreter: a flat
//! byte-addressable memory, the 32 general-purpose registers (x0
//! hardwired to zero), a program counter, and a two-level instruction
//! decoder feeding per-instruction execution functions.
//!
//! Environment calls are routed through a small dispatcher: PRINT and
//! DRAW are serviced in-process (console sink and frame sink), while
//! file and socket operations are marshalled over a length-delimited
//! wire format to a HostOS server (see the [`hostos`] module), which
//! owns the descriptor table and the actual host resources.
//!
//! The crate is a library; the `emulator` binary in this workspace
//! provides the step-loop driver and the HostOS daemon.

pub mod utils;
pub mod fields;
pub mod opcodes;
pub mod instr_type;
pub mod decode;
pub mod encode;
pub mod hart;
pub mod rv32i;
pub mod rv32m;
pub mod syscall;
pub mod hostos;
pub mod loader;

pub use hart::{Exception, Hart, VmConfig};
