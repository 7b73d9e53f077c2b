//! HostOS server
//!
//! Owns the descriptor table and the host resources behind it. The
//! server is transport-agnostic: [`HostServer::handle`] maps one
//! request to one response, and [`HostServer::serve`] wraps that in a
//! UDP datagram loop for the daemon. Descriptor 0 is pre-populated
//! with stdin; new descriptors count up from
//! [`ServerConfig::descriptor_start`].
//!
//! A SOCKET descriptor is a UDP pipe: a dialled socket plus a
//! background receiver thread that drains inbound datagrams into a
//! bounded queue. Reading a pipe never blocks; an empty queue yields
//! the EAGAIN status.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::wire::{
    read_cstr, read_i32, read_u32, syscall_name, Request, Response, WireError, MAX_FRAME,
    PIPE_EAGAIN, SYSCALL_CLOSE, SYSCALL_OPEN, SYSCALL_READ, SYSCALL_RESET, SYSCALL_SEEK,
    SYSCALL_SOCKET, SYSCALL_WRITE,
};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// First descriptor handed out by OPEN/SOCKET (0-2 are reserved)
    pub descriptor_start: i32,
    /// Inbound datagrams buffered per UDP pipe
    pub pipe_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            descriptor_start: 3,
            pipe_queue_capacity: 32,
        }
    }
}

#[derive(Debug)]
enum Descriptor {
    Stdin(io::Stdin),
    File {
        file: std::fs::File,
        path: String,
        seek: u64,
    },
    Pipe(UdpPipe),
}

/// A dialled UDP endpoint with a non-blocking inbound packet queue
#[derive(Debug)]
pub struct UdpPipe {
    socket: UdpSocket,
    packets: mpsc::Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
}

impl UdpPipe {
    pub fn dial(address: &str, queue_capacity: usize) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(address)?;
        let receiver = socket.try_clone()?;
        // The receiver wakes periodically to notice a stop request
        receiver.set_read_timeout(Some(Duration::from_millis(250)))?;
        let (tx, rx) = mpsc::sync_channel(queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_seen = Arc::clone(&stop);
        thread::spawn(move || background_read(receiver, tx, stop_seen));
        Ok(Self {
            socket,
            packets: rx,
            stop,
        })
    }

    /// Dequeue one packet, truncated to count bytes. Returns the
    /// packet length (which the queue preserves per datagram), the
    /// EAGAIN status when the queue is empty, or -1 when the
    /// receiver has died.
    pub fn read(&self, count: usize) -> (i32, Vec<u8>) {
        match self.packets.try_recv() {
            Ok(mut packet) => {
                packet.truncate(count);
                (packet.len() as i32, packet)
            }
            Err(TryRecvError::Empty) => (PIPE_EAGAIN, Vec::new()),
            Err(TryRecvError::Disconnected) => (-1, Vec::new()),
        }
    }

    pub fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send(bytes)
    }
}

impl Drop for UdpPipe {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn background_read(socket: UdpSocket, tx: mpsc::SyncSender<Vec<u8>>, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_FRAME];
    while !stop.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            // A send error means the pipe itself was dropped
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                warn!("udp pipe receiver stopped: {e}");
                break;
            }
        }
    }
}

#[derive(Debug)]
pub struct HostServer {
    config: ServerConfig,
    descriptors: HashMap<i32, Descriptor>,
    next_fd: i32,
}

impl Default for HostServer {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl HostServer {
    pub fn new(config: ServerConfig) -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert(0, Descriptor::Stdin(io::stdin()));
        let next_fd = config.descriptor_start;
        Self {
            config,
            descriptors,
            next_fd,
        }
    }

    fn alloc_fd(&mut self) -> i32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        fd
    }

    /// Open a file before serving and seek it to a known position,
    /// replicating descriptors a resumed guest expects to hold
    pub fn preopen(&mut self, path: &str, offset: u64) -> io::Result<i32> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let position = file.seek(SeekFrom::Start(offset))?;
        let fd = self.alloc_fd();
        self.descriptors.insert(
            fd,
            Descriptor::File {
                file,
                path: path.to_string(),
                seek: position,
            },
        );
        info!("preopened '{path}' as fd {fd} at offset {position}");
        Ok(fd)
    }

    /// Execute one request against the descriptor table
    pub fn handle(&mut self, request: &Request) -> Response {
        debug!(
            "{} ({}), {} payload bytes",
            syscall_name(request.syscall),
            request.syscall,
            request.payload.len()
        );
        let result = match request.syscall {
            SYSCALL_RESET => Ok(self.handle_reset()),
            SYSCALL_OPEN => self.handle_open(&request.payload),
            SYSCALL_CLOSE => self.handle_close(&request.payload),
            SYSCALL_SEEK => self.handle_seek(&request.payload),
            SYSCALL_READ => self.handle_read(&request.payload),
            SYSCALL_WRITE => self.handle_write(&request.payload),
            SYSCALL_SOCKET => self.handle_socket(&request.payload),
            other => {
                warn!("unknown syscall number {other}");
                return Response::failed();
            }
        };
        result.unwrap_or_else(|e: WireError| {
            warn!("malformed {} payload: {e}", syscall_name(request.syscall));
            Response::failed()
        })
    }

    /// Close everything and restart descriptor numbering. Idempotent.
    fn handle_reset(&mut self) -> Response {
        self.descriptors.clear();
        self.next_fd = self.config.descriptor_start;
        Response::status(0)
    }

    fn handle_open(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (path, rest) = read_cstr(payload);
        let (flags, _) = read_u32(rest, "open flags")?;
        let path = String::from_utf8_lossy(path).into_owned();
        debug!("OPEN '{path}' flags {flags}");
        // Flags travel on the wire but every open is read/write/create
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
        {
            Ok(file) => {
                let fd = self.alloc_fd();
                self.descriptors
                    .insert(fd, Descriptor::File { file, path, seek: 0 });
                Ok(Response::status(fd))
            }
            Err(e) => {
                warn!("failed to open '{path}': {e}");
                Ok(Response::failed())
            }
        }
    }

    fn handle_close(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (fd, _) = read_i32(payload, "close fd")?;
        debug!("CLOSE fd {fd}");
        match self.descriptors.remove(&fd) {
            Some(_) => Ok(Response::status(0)),
            None => {
                warn!("close of unknown fd {fd}");
                Ok(Response::failed())
            }
        }
    }

    fn handle_seek(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (fd, rest) = read_i32(payload, "seek fd")?;
        let (offset, rest) = read_i32(rest, "seek offset")?;
        let (whence, _) = read_i32(rest, "seek whence")?;
        debug!("SEEK fd {fd} offset {offset} whence {whence}");
        let Some(Descriptor::File { file, seek, .. }) = self.descriptors.get_mut(&fd) else {
            warn!("seek on fd {fd}, which is not an open file");
            return Ok(Response::failed());
        };
        let Some(from) = seek_from(offset, whence) else {
            return Ok(Response::failed());
        };
        match file.seek(from) {
            Ok(position) => {
                *seek = position;
                Ok(Response::status(position as i32))
            }
            Err(e) => {
                warn!("failed to seek fd {fd}: {e}");
                Ok(Response::failed())
            }
        }
    }

    fn handle_read(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (fd, rest) = read_i32(payload, "read fd")?;
        let (count, _) = read_u32(rest, "read count")?;
        debug!("READ fd {fd} count {count}");
        let mut buf = vec![0u8; count as usize];
        match self.descriptors.get_mut(&fd) {
            // End of file (a zero-length read into a non-empty
            // buffer) fails like any other read error
            Some(Descriptor::File { file, seek, .. }) => match file.read(&mut buf) {
                Ok(0) if count > 0 => {
                    warn!("failed to read fd {fd}: end of file");
                    Ok(Response::failed())
                }
                Ok(n) => {
                    *seek += n as u64;
                    buf.truncate(n);
                    Ok(Response::with_bytes(n as i32, buf))
                }
                Err(e) => {
                    warn!("failed to read fd {fd}: {e}");
                    Ok(Response::failed())
                }
            },
            Some(Descriptor::Stdin(stdin)) => match stdin.read(&mut buf) {
                Ok(0) if count > 0 => {
                    warn!("failed to read stdin: end of file");
                    Ok(Response::failed())
                }
                Ok(n) => {
                    buf.truncate(n);
                    Ok(Response::with_bytes(n as i32, buf))
                }
                Err(e) => {
                    warn!("failed to read stdin: {e}");
                    Ok(Response::failed())
                }
            },
            Some(Descriptor::Pipe(pipe)) => {
                let (status, packet) = pipe.read(count as usize);
                Ok(Response::with_bytes(status, packet))
            }
            None => {
                warn!("read of unknown fd {fd}");
                Ok(Response::failed())
            }
        }
    }

    fn handle_write(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (fd, bytes) = read_i32(payload, "write fd")?;
        debug!("WRITE fd {fd}, {} bytes", bytes.len());
        match self.descriptors.get_mut(&fd) {
            Some(Descriptor::File { file, seek, .. }) => match file.write(bytes) {
                Ok(n) => {
                    *seek += n as u64;
                    Ok(Response::status(n as i32))
                }
                Err(e) => {
                    warn!("failed to write fd {fd}: {e}");
                    Ok(Response::failed())
                }
            },
            Some(Descriptor::Pipe(pipe)) => match pipe.write(bytes) {
                Ok(n) => Ok(Response::status(n as i32)),
                Err(e) => {
                    warn!("failed to write udp pipe fd {fd}: {e}");
                    Ok(Response::failed())
                }
            },
            Some(Descriptor::Stdin(_)) => Ok(Response::failed()),
            None => {
                warn!("write of unknown fd {fd}");
                Ok(Response::failed())
            }
        }
    }

    fn handle_socket(&mut self, payload: &[u8]) -> Result<Response, WireError> {
        let (address, _) = read_cstr(payload);
        let address = String::from_utf8_lossy(address).into_owned();
        debug!("SOCKET '{address}'");
        match UdpPipe::dial(&address, self.config.pipe_queue_capacity) {
            Ok(pipe) => {
                let fd = self.alloc_fd();
                self.descriptors.insert(fd, Descriptor::Pipe(pipe));
                Ok(Response::status(fd))
            }
            Err(e) => {
                warn!("failed to dial '{address}': {e}");
                Ok(Response::failed())
            }
        }
    }

    /// Datagram loop for the daemon: one request in, one response out
    pub fn serve(&mut self, socket: &UdpSocket) -> io::Result<()> {
        info!("HostOS listening on {}", socket.local_addr()?);
        let mut buf = vec![0u8; MAX_FRAME];
        loop {
            let (n, peer) = socket.recv_from(&mut buf)?;
            let response = match Request::parse(&buf[..n]) {
                Ok(request) => self.handle(&request),
                Err(e) => {
                    warn!("bad frame from {peer}: {e}");
                    Response::failed()
                }
            };
            socket.send_to(&response.encode(), peer)?;
        }
    }
}

fn seek_from(offset: i32, whence: i32) -> Option<SeekFrom> {
    match whence {
        0 if offset >= 0 => Some(SeekFrom::Start(offset as u64)),
        1 => Some(SeekFrom::Current(offset.into())),
        2 => Some(SeekFrom::End(offset.into())),
        _ => {
            warn!("seek with invalid whence {whence} or offset {offset}");
            None
        }
    }
}
