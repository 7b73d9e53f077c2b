//! Environment-call dispatcher
//!
//! The syscall number travels in a7, arguments in a0-a6, and the
//! result lands in a0. PRINT and DRAW are serviced in-process against
//! the console and frame sinks; RESET and the file/socket calls are
//! marshalled to the HostOS bridge. An unrecognised syscall number
//! returns -1 in a0 and touches nothing else. In every case the
//! handler finishes by stepping the pc past the ecall; control
//! transfer is never the handler's business.

use std::fmt;
use std::time::Instant;

use log::{debug, warn};
use queues::{IsQueue, Queue};

use crate::decode::{Decoder, DecoderError, MaskWithValue};
use crate::hart::memory::MemoryError;
use crate::hart::{Exception, ExecFn, Hart};
use crate::hostos::wire::{
    self, Request, SYSCALL_CLOSE, SYSCALL_OPEN, SYSCALL_READ, SYSCALL_RESET, SYSCALL_SEEK,
    SYSCALL_SOCKET, SYSCALL_WRITE,
};
use crate::opcodes::{FUNCT3_PRIV, IMM_EBREAK, IMM_ECALL, OP_SYSTEM};
use crate::utils::mask;

/// Append bytes to the console stream
pub const SYS_PRINT: u32 = 0x01;
/// Publish the VRAM region as a frame
pub const SYS_DRAW: u32 = 0x02;

// Argument register indices (RISC-V ABI names)
const A0: u8 = 10;
const A1: u8 = 11;
const A2: u8 = 12;
const A7: u8 = 17;

/// Byte stream fed by PRINT, drained by the embedder
pub struct ConsoleSink {
    bytes: Queue<u8>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self {
            bytes: Queue::new(),
        }
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsoleSink({} bytes queued)", self.bytes.size())
    }
}

impl ConsoleSink {
    pub fn append(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.bytes
                .add(*byte)
                .expect("insert into queue should work");
        }
    }

    /// Return the buffered bytes as a string (lossily decoded as
    /// UTF-8) and empty the buffer
    pub fn flush(&mut self) -> String {
        let mut out = Vec::new();
        while let Ok(byte) = self.bytes.remove() {
            out.push(byte);
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

/// One published VRAM snapshot
#[derive(Debug, Clone)]
pub struct Frame {
    pub published_at: Instant,
    pub pixels: Vec<u8>,
}

/// Frames published by DRAW, in publication order
#[derive(Debug, Default)]
pub struct FrameSink {
    frames: Vec<Frame>,
}

impl FrameSink {
    pub fn publish(&mut self, pixels: Vec<u8>) {
        self.frames.push(Frame {
            published_at: Instant::now(),
            pixels,
        });
    }

    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

fn system_determined(
    decoder: &mut Decoder<ExecFn>,
    imm: u32,
    exec: ExecFn,
) -> Result<(), DecoderError> {
    let masks_with_values = vec![
        MaskWithValue {
            mask: mask::<u32>(12) << 20,
            value: imm << 20,
        },
        MaskWithValue {
            mask: mask::<u32>(3) << 12,
            value: FUNCT3_PRIV << 12,
        },
        MaskWithValue {
            mask: mask(7),
            value: OP_SYSTEM,
        },
    ];
    decoder.push_instruction(masks_with_values, exec)
}

pub fn make_system(decoder: &mut Decoder<ExecFn>) -> Result<(), DecoderError> {
    system_determined(decoder, IMM_ECALL, execute_ecall)?;
    system_determined(decoder, IMM_EBREAK, execute_ebreak)
}

/// Dispatch on a7, then set pc = pc + 4
pub fn execute_ecall(hart: &mut Hart, _instr: u32) -> Result<(), Exception> {
    let syscall = hart.x(A7);
    match syscall {
        SYS_PRINT => sys_print(hart),
        SYS_DRAW => sys_draw(hart),
        SYSCALL_RESET | SYSCALL_OPEN | SYSCALL_CLOSE | SYSCALL_SEEK | SYSCALL_READ
        | SYSCALL_WRITE | SYSCALL_SOCKET => host_call(hart, syscall),
        other => {
            debug!("ecall with unknown syscall {other} in a7");
            hart.set_x(A0, u32::MAX);
        }
    }
    hart.increment_pc();
    Ok(())
}

/// Halt stepping
pub fn execute_ebreak(_hart: &mut Hart, _instr: u32) -> Result<(), Exception> {
    Err(Exception::Break)
}

fn sys_print(hart: &mut Hart) {
    let ptr = hart.x(A0);
    let len = hart.x(A1) as usize;
    let bytes = match hart.memory.read_range(ptr, len) {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            warn!("PRINT source outside memory: {e}");
            hart.set_x(A0, u32::MAX);
            return;
        }
    };
    hart.console.append(&bytes);
    hart.set_x(A0, 0);
}

fn sys_draw(hart: &mut Hart) {
    let pixels = match hart.memory.read_range(hart.vram_start, hart.vram_len) {
        Ok(pixels) => pixels.to_vec(),
        Err(e) => {
            warn!("VRAM region outside memory: {e}");
            hart.set_x(A0, u32::MAX);
            return;
        }
    };
    hart.frames.publish(pixels);
    hart.set_x(A0, 0);
}

fn host_call(hart: &mut Hart, syscall: u32) {
    let request = match marshal(hart, syscall) {
        Ok(request) => request,
        Err(e) => {
            warn!("{} arguments outside memory: {e}", wire::syscall_name(syscall));
            hart.set_x(A0, u32::MAX);
            return;
        }
    };
    let response = hart.host.call(&request);
    if syscall == SYSCALL_READ && response.status > 0 {
        let buf_ptr = hart.x(A1);
        if let Err(e) = hart.memory.write_range(buf_ptr, &response.bytes) {
            warn!("READ destination outside memory: {e}");
            hart.set_x(A0, u32::MAX);
            return;
        }
    }
    hart.set_x(A0, response.status as u32);
}

/// Build the wire request for a HostOS syscall from the argument
/// registers, copying any byte runs out of guest memory
fn marshal(hart: &Hart, syscall: u32) -> Result<Request, MemoryError> {
    let request = match syscall {
        SYSCALL_RESET => Request::reset(),
        SYSCALL_OPEN => {
            let path = hart.memory.read_range(hart.x(A0), hart.x(A1) as usize)?;
            Request::open(path, hart.x(A2))
        }
        SYSCALL_CLOSE => Request::close(hart.x(A0) as i32),
        SYSCALL_SEEK => Request::seek(hart.x(A0) as i32, hart.x(A1) as i32, hart.x(A2) as i32),
        SYSCALL_READ => Request::read(hart.x(A0) as i32, hart.x(A2)),
        SYSCALL_WRITE => {
            let bytes = hart.memory.read_range(hart.x(A1), hart.x(A2) as usize)?;
            Request::write(hart.x(A0) as i32, bytes)
        }
        SYSCALL_SOCKET => {
            let address = hart.memory.read_range(hart.x(A0), hart.x(A1) as usize)?;
            Request::socket(address)
        }
        other => unreachable!("host_call only sees HostOS syscalls, got {other}"),
    };
    Ok(request)
}
