//! HostOS service bridge
//!
//! The VM cannot touch host files or sockets itself. File and socket
//! ECALLs are marshalled into a little-endian request frame ([`wire`])
//! and carried to a HostOS server ([`server`]), which owns the
//! descriptor table and executes the operation. The [`client`] module
//! provides the guest-side half: a UDP transport with per-call
//! deadlines, and an in-process variant for tests and daemonless runs.

pub mod client;
pub mod server;
pub mod wire;

pub use client::{HostBridge, LocalBridge, UdpBridge};
pub use server::{HostServer, ServerConfig};
pub use wire::{Request, Response};
