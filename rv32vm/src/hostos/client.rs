//! Guest-side HostOS transport
//!
//! The execution unit hands a [`Request`] to a [`HostBridge`] and
//! gets a [`Response`] back. The bridge never fails: any transport
//! problem (unreachable server, deadline expiry, garbage frame) is
//! folded into the synthesised FAILED response, so the guest simply
//! sees `a0 = -1`.

use std::fmt::Debug;
use std::io;
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use log::warn;

use super::server::HostServer;
use super::wire::{Request, Response, MAX_FRAME};

pub trait HostBridge: Debug {
    fn call(&mut self, request: &Request) -> Response;
}

/// Bridge to a HostOS daemon over UDP, one datagram per direction
/// per call, with per-call send and receive deadlines
#[derive(Debug)]
pub struct UdpBridge {
    socket: UdpSocket,
}

impl UdpBridge {
    pub fn connect<A: ToSocketAddrs>(server: A, deadline: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(server)?;
        socket.set_write_timeout(Some(deadline))?;
        socket.set_read_timeout(Some(deadline))?;
        Ok(Self { socket })
    }
}

impl HostBridge for UdpBridge {
    fn call(&mut self, request: &Request) -> Response {
        if let Err(e) = self.socket.send(&request.encode()) {
            warn!("failed to write request to HostOS: {e}");
            return Response::failed();
        }
        let mut buf = vec![0u8; MAX_FRAME];
        let n = match self.socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("failed to read response from HostOS: {e}");
                return Response::failed();
            }
        };
        Response::parse(&buf[..n]).unwrap_or_else(|e| {
            warn!("bad response frame from HostOS: {e}");
            Response::failed()
        })
    }
}

/// In-process bridge that owns its server; requests are plain calls
#[derive(Debug, Default)]
pub struct LocalBridge {
    server: HostServer,
}

impl LocalBridge {
    pub fn new(server: HostServer) -> Self {
        Self { server }
    }
}

impl HostBridge for LocalBridge {
    fn call(&mut self, request: &Request) -> Response {
        self.server.handle(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_server_yields_failed_sentinel() {
        // Port 9 is the discard service, which nothing answers on
        let mut bridge =
            UdpBridge::connect("127.0.0.1:9", Duration::from_millis(100)).unwrap();
        let response = bridge.call(&Request::reset());
        assert_eq!(response.status, -1);
    }

    #[test]
    fn local_bridge_answers_in_process() {
        let mut bridge = LocalBridge::default();
        assert_eq!(bridge.call(&Request::reset()).status, 0);
    }
}
