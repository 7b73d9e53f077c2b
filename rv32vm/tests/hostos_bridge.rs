//! HostOS bridge end to end: once over real UDP with a served
//! descriptor table, and once at the guest level, with a program
//! driving file I/O purely through ecalls.

use std::net::UdpSocket;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rv32vm::hart::memory::Wordsize;
use rv32vm::hart::{Hart, VmConfig};
use rv32vm::hostos::wire::{Request, SYSCALL_CLOSE, SYSCALL_OPEN, SYSCALL_READ, SYSCALL_SEEK, SYSCALL_WRITE};
use rv32vm::hostos::{HostBridge, HostServer, UdpBridge};

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("rv32vm-bridge-{}-{name}", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

fn spawn_server() -> String {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap().to_string();
    thread::spawn(move || {
        let mut server = HostServer::default();
        let _ = server.serve(&socket);
    });
    addr
}

#[test]
fn file_io_over_udp() {
    let addr = spawn_server();
    let mut bridge = UdpBridge::connect(addr.as_str(), Duration::from_secs(5)).unwrap();

    let path = temp_path("udp");
    let path_bytes = path.to_str().unwrap().as_bytes();

    let fd = bridge.call(&Request::open(path_bytes, 0)).status;
    assert!(fd >= 3, "open over udp failed: {fd}");

    assert_eq!(bridge.call(&Request::write(fd, b"over the wire")).status, 13);
    assert_eq!(bridge.call(&Request::seek(fd, 5, 0)).status, 5);

    let response = bridge.call(&Request::read(fd, 64));
    assert_eq!(response.status, 8);
    assert_eq!(response.bytes, b"the wire");

    assert_eq!(bridge.call(&Request::close(fd)).status, 0);
    assert_eq!(bridge.call(&Request::reset()).status, 0);

    std::fs::remove_file(&path).unwrap();
}

/// Drive OPEN/WRITE/SEEK/READ/CLOSE from guest code: one ecall at
/// address 0, re-entered with fresh arguments for every call
#[test]
fn guest_program_does_file_io() {
    const A0: u8 = 10;
    const A1: u8 = 11;
    const A2: u8 = 12;
    const A7: u8 = 17;

    let path = temp_path("guest");
    let path_bytes = path.to_str().unwrap().as_bytes();

    let mut hart = Hart::with_local_host(VmConfig::default());
    hart.memory
        .write(0, rv32vm::encode::ecall(), Wordsize::Word)
        .unwrap();
    hart.memory.write_range(256, path_bytes).unwrap();
    hart.memory.write_range(512, b"written by the guest").unwrap();

    let mut ecall = |hart: &mut Hart, a7: u32, a0: u32, a1: u32, a2: u32| -> u32 {
        hart.pc = 0;
        hart.set_x(A7, a7);
        hart.set_x(A0, a0);
        hart.set_x(A1, a1);
        hart.set_x(A2, a2);
        hart.step().unwrap();
        hart.x(A0)
    };

    let fd = ecall(&mut hart, SYSCALL_OPEN, 256, path_bytes.len() as u32, 0);
    assert_eq!(fd, 3);

    let written = ecall(&mut hart, SYSCALL_WRITE, fd, 512, 20);
    assert_eq!(written, 20);

    let position = ecall(&mut hart, SYSCALL_SEEK, fd, 0, 0);
    assert_eq!(position, 0);

    let read = ecall(&mut hart, SYSCALL_READ, fd, 1024, 20);
    assert_eq!(read, 20);
    assert_eq!(
        hart.memory.read_range(1024, 20).unwrap(),
        b"written by the guest"
    );

    assert_eq!(ecall(&mut hart, SYSCALL_CLOSE, fd, 0, 0), 0);
    // Closing again fails, visible to the guest as -1
    assert_eq!(ecall(&mut hart, SYSCALL_CLOSE, fd, 0, 0) as i32, -1);

    assert_eq!(std::fs::read(&path).unwrap(), b"written by the guest");
    std::fs::remove_file(&path).unwrap();
}
