use std::fs;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;
use env_logger::Env;
use log::{info, warn};

use rv32vm::hart::{Exception, Hart, VmConfig};
use rv32vm::hostos::{HostServer, ServerConfig, UdpBridge};
use rv32vm::loader;

/// Drive a 32-bit RISC-V virtual machine, or its HostOS daemon
#[derive(Parser, Debug)]
#[command(name = "emulator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a guest image and drive the step loop at full rate
    Run(RunArgs),
    /// Run the HostOS daemon
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the guest image
    image: PathBuf,

    /// Treat the image as a hex blob instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// Load address of the image (use 0x prefix for hexadecimal)
    #[arg(long, value_parser = maybe_hex::<u32>, default_value_t = 0)]
    base: u32,

    /// Initial program counter
    #[arg(long, value_parser = maybe_hex::<u32>, default_value_t = 0)]
    pc: u32,

    /// Stop after this many instructions (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_cycles: u64,

    /// Total guest memory in bytes
    #[arg(long, default_value_t = 3872)]
    mem_size: usize,

    /// First byte of the VRAM region published by DRAW
    #[arg(long, value_parser = maybe_hex::<u32>, default_value_t = 3072)]
    vram_start: u32,

    /// Length of the VRAM region in bytes
    #[arg(long, default_value_t = 800)]
    vram_len: usize,

    /// Address of a HostOS daemon; without it, file and socket
    /// syscalls are served in-process
    #[arg(long)]
    hostos: Option<String>,

    /// Per-call HostOS deadline in milliseconds
    #[arg(long, default_value_t = 5000)]
    deadline_ms: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9008")]
    listen: String,

    /// Open PATH@OFFSET before serving, replicating a descriptor a
    /// resumed guest expects to hold (repeatable)
    #[arg(long)]
    preopen: Vec<String>,

    /// First descriptor handed out by OPEN/SOCKET
    #[arg(long, default_value_t = 3)]
    descriptor_start: i32,

    /// Inbound datagrams buffered per UDP pipe
    #[arg(long, default_value_t = 32)]
    queue_capacity: usize,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Serve(args) => cmd_serve(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = VmConfig {
        mem_size: args.mem_size,
        initial_pc: args.pc,
        vram_start: args.vram_start,
        vram_len: args.vram_len,
    };
    let mut hart = match &args.hostos {
        Some(server) => {
            let deadline = Duration::from_millis(args.deadline_ms);
            let bridge = UdpBridge::connect(server.as_str(), deadline)?;
            info!("bridging HostOS syscalls to {server}");
            Hart::new(config, Box::new(bridge))
        }
        None => Hart::with_local_host(config),
    };

    if args.hex {
        let text = fs::read_to_string(&args.image)?;
        let n = loader::load_hex(&mut hart.memory, &text, args.base)?;
        info!("loaded {n} bytes (hex) at {:#x}", args.base);
    } else {
        let image = fs::read(&args.image)?;
        let n = loader::load_image(&mut hart.memory, &image, args.base)?;
        info!("loaded {n} bytes at {:#x}", args.base);
    }

    let mut cycles: u64 = 0;
    let mut window_cycles: u64 = 0;
    let mut window_start = Instant::now();
    let reason = loop {
        if args.max_cycles > 0 && cycles == args.max_cycles {
            break None;
        }
        match hart.step() {
            Ok(()) => {
                cycles += 1;
                window_cycles += 1;
            }
            Err(e) => break Some(e),
        }
        let output = hart.console.flush();
        if !output.is_empty() {
            print!("{output}");
        }
        for frame in hart.frames.take() {
            info!("frame published ({} bytes)", frame.pixels.len());
        }
        if window_start.elapsed() >= Duration::from_secs(1) {
            info!("clock speed: {window_cycles}hz total cycles: {cycles}");
            window_cycles = 0;
            window_start = Instant::now();
        }
    };

    let output = hart.console.flush();
    if !output.is_empty() {
        print!("{output}");
    }
    match reason {
        Some(Exception::Break) => info!("guest hit ebreak after {cycles} cycles"),
        Some(e) => warn!("halted at pc {:#010x} after {cycles} cycles: {e}", hart.pc),
        None => info!("cycle limit reached after {cycles} cycles"),
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig {
        descriptor_start: args.descriptor_start,
        pipe_queue_capacity: args.queue_capacity,
    };
    let mut server = HostServer::new(config);
    for spec in &args.preopen {
        let (path, offset) = parse_preopen(spec)?;
        server.preopen(path, offset)?;
    }
    let socket = UdpSocket::bind(&args.listen)?;
    server.serve(&socket)?;
    Ok(())
}

fn parse_preopen(spec: &str) -> Result<(&str, u64), String> {
    match spec.rsplit_once('@') {
        Some((path, offset)) => {
            let offset = offset
                .parse()
                .map_err(|_| format!("bad offset in --preopen '{spec}'"))?;
            Ok((path, offset))
        }
        None => Ok((spec, 0)),
    }
}
