//! HostOS wire format
//!
//! Request frame: `u32 syscall_no | payload`. Response frame:
//! `i32 status | bytes`. All fixed-width fields are little-endian;
//! strings travel as NUL-terminated byte runs. One request and one
//! response per datagram.

use thiserror::Error;

pub const SYSCALL_RESET: u32 = 0x00;
pub const SYSCALL_OPEN: u32 = 0x0a;
pub const SYSCALL_CLOSE: u32 = 0x0b;
pub const SYSCALL_SEEK: u32 = 0x0c;
pub const SYSCALL_READ: u32 = 0x0d;
pub const SYSCALL_WRITE: u32 = 0x0e;
pub const SYSCALL_SOCKET: u32 = 0x0f;

/// Sentinel identifying a synthesised failure response
pub const SYSCALL_FAILED: u32 = 0xdead;

/// Non-fatal "no packet available" status for non-blocking pipe reads
pub const PIPE_EAGAIN: i32 = -64;

/// Largest frame either side will send or accept (one UDP datagram)
pub const MAX_FRAME: usize = 64 * 1024;

pub fn syscall_name(syscall: u32) -> &'static str {
    match syscall {
        SYSCALL_RESET => "RESET",
        SYSCALL_OPEN => "OPEN",
        SYSCALL_CLOSE => "CLOSE",
        SYSCALL_SEEK => "SEEK",
        SYSCALL_READ => "READ",
        SYSCALL_WRITE => "WRITE",
        SYSCALL_SOCKET => "SOCKET",
        SYSCALL_FAILED => "FAILED",
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("{context}: frame or payload too short")]
    Truncated { context: &'static str },
}

fn truncated(context: &'static str) -> WireError {
    WireError::Truncated { context }
}

/// Read a NUL-terminated byte run from the front of input, returning
/// it together with the remainder after the terminator. A missing
/// terminator consumes the whole input.
pub fn read_cstr(input: &[u8]) -> (&[u8], &[u8]) {
    match input.iter().position(|b| *b == 0) {
        Some(n) => (&input[..n], &input[n + 1..]),
        None => (input, &[]),
    }
}

/// Read a little-endian u32 from the front of input
pub fn read_u32<'a>(input: &'a [u8], context: &'static str) -> Result<(u32, &'a [u8]), WireError> {
    if input.len() < 4 {
        return Err(truncated(context));
    }
    let (word, rest) = input.split_at(4);
    let value = u32::from_le_bytes(word.try_into().expect("split gave four bytes"));
    Ok((value, rest))
}

pub fn read_i32<'a>(input: &'a [u8], context: &'static str) -> Result<(i32, &'a [u8]), WireError> {
    let (value, rest) = read_u32(input, context)?;
    Ok((value as i32, rest))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub syscall: u32,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn reset() -> Self {
        Self {
            syscall: SYSCALL_RESET,
            payload: Vec::new(),
        }
    }

    pub fn open(path: &[u8], flags: u32) -> Self {
        let mut payload = Vec::with_capacity(path.len() + 5);
        payload.extend_from_slice(path);
        payload.push(0);
        payload.extend_from_slice(&flags.to_le_bytes());
        Self {
            syscall: SYSCALL_OPEN,
            payload,
        }
    }

    pub fn close(fd: i32) -> Self {
        Self {
            syscall: SYSCALL_CLOSE,
            payload: fd.to_le_bytes().to_vec(),
        }
    }

    pub fn seek(fd: i32, offset: i32, whence: i32) -> Self {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&fd.to_le_bytes());
        payload.extend_from_slice(&offset.to_le_bytes());
        payload.extend_from_slice(&whence.to_le_bytes());
        Self {
            syscall: SYSCALL_SEEK,
            payload,
        }
    }

    pub fn read(fd: i32, count: u32) -> Self {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&fd.to_le_bytes());
        payload.extend_from_slice(&count.to_le_bytes());
        Self {
            syscall: SYSCALL_READ,
            payload,
        }
    }

    pub fn write(fd: i32, bytes: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(bytes.len() + 4);
        payload.extend_from_slice(&fd.to_le_bytes());
        payload.extend_from_slice(bytes);
        Self {
            syscall: SYSCALL_WRITE,
            payload,
        }
    }

    pub fn socket(address: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(address.len() + 1);
        payload.extend_from_slice(address);
        payload.push(0);
        Self {
            syscall: SYSCALL_SOCKET,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + self.payload.len());
        frame.extend_from_slice(&self.syscall.to_le_bytes());
        frame.extend_from_slice(&self.payload);
        frame
    }

    pub fn parse(frame: &[u8]) -> Result<Self, WireError> {
        let (syscall, payload) = read_u32(frame, "request header")?;
        Ok(Self {
            syscall,
            payload: payload.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub bytes: Vec<u8>,
}

impl Response {
    pub fn status(status: i32) -> Self {
        Self {
            status,
            bytes: Vec::new(),
        }
    }

    pub fn with_bytes(status: i32, bytes: Vec<u8>) -> Self {
        Self { status, bytes }
    }

    /// The response the guest sees when the bridge itself failed
    pub fn failed() -> Self {
        Self::status(-1)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + self.bytes.len());
        frame.extend_from_slice(&self.status.to_le_bytes());
        frame.extend_from_slice(&self.bytes);
        frame
    }

    pub fn parse(frame: &[u8]) -> Result<Self, WireError> {
        let (status, bytes) = read_i32(frame, "response header")?;
        Ok(Self {
            status,
            bytes: bytes.to_vec(),
        })
    }
}
