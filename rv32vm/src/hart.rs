//! RISC-V hardware thread
//!
//! This is the simplest possible RISC-V hardware thread: a single
//! hart with no notion of privilege, implementing RV32IM against a
//! flat byte-addressable memory. The initial state is all zeros
//! unless the embedder sets memory, registers or the program counter
//! before stepping.
//!
//! The member function step() controls execution of the hart. Each
//! time it is called, the instruction at the current pc is fetched,
//! decoded and executed. A step either retires completely or returns
//! an [`Exception`] leaving pc unchanged, so observers never see a
//! half-executed instruction. The caller decides whether an exception
//! is fatal; all of them halt a plain run loop.

use log::trace;
use thiserror::Error;

use crate::decode::Decoder;
use crate::hostos::HostBridge;
use crate::syscall::{ConsoleSink, FrameSink};
use crate::utils::mask;
use crate::{rv32i, rv32m, syscall};

pub mod memory;
pub mod registers;

use memory::{Memory, MemoryError, Wordsize};
use registers::Registers;

/// Reasons a step can fail to retire
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    #[error("instruction fetch out of range or misaligned")]
    FetchFault,
    #[error("unknown opcode/funct3/funct7 combination")]
    IllegalInstruction,
    #[error("load outside backed memory")]
    LoadFault,
    #[error("store outside backed memory")]
    StoreFault,
    #[error("ebreak")]
    Break,
}

/// Execution function for one instruction, produced by the decoder
pub type ExecFn = fn(&mut Hart, u32) -> Result<(), Exception>;

/// Tunable parameters of a hart and its conventional memory layout
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Total backed memory in bytes
    pub mem_size: usize,
    /// Program counter at reset
    pub initial_pc: u32,
    /// First byte of the VRAM region published by DRAW
    pub vram_start: u32,
    /// Length of the VRAM region in bytes
    pub vram_len: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            mem_size: 3872,
            initial_pc: 0,
            vram_start: 3072,
            vram_len: 800,
        }
    }
}

#[derive(Debug)]
pub struct Hart {
    pub pc: u32,
    pub registers: Registers,
    pub memory: Memory,
    pub console: ConsoleSink,
    pub frames: FrameSink,
    pub(crate) host: Box<dyn HostBridge>,
    pub(crate) vram_start: u32,
    pub(crate) vram_len: usize,
    decoder: Decoder<ExecFn>,
}

impl Hart {
    pub fn new(config: VmConfig, host: Box<dyn HostBridge>) -> Self {
        let mut decoder = Decoder::new(mask(7));
        rv32i::make_rv32i(&mut decoder).expect("rv32i decodings are consistent");
        rv32m::make_rv32m(&mut decoder).expect("rv32m decodings are consistent");
        syscall::make_system(&mut decoder).expect("system decodings are consistent");
        Self {
            pc: config.initial_pc,
            registers: Registers::default(),
            memory: Memory::new(config.mem_size),
            console: ConsoleSink::default(),
            frames: FrameSink::default(),
            host,
            vram_start: config.vram_start,
            vram_len: config.vram_len,
            decoder,
        }
    }

    /// A hart bridged to an in-process HostOS server; the usual
    /// choice for tests and for running without a daemon
    pub fn with_local_host(config: VmConfig) -> Self {
        let bridge = crate::hostos::LocalBridge::default();
        Self::new(config, Box::new(bridge))
    }

    /// Read the value of register xn. Reading x0 always returns 0.
    pub fn x(&self, n: u8) -> u32 {
        self.registers.read(n)
    }

    /// Write the value of register xn. Writes to x0 have no effect.
    pub fn set_x(&mut self, n: u8, value: u32) {
        self.registers.write(n, value);
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Set pc = pc + 4, wrapping if necessary
    pub fn increment_pc(&mut self) {
        self.pc = self.pc.wrapping_add(4);
    }

    /// Load a value from memory, converting an out-of-range access
    /// into a load fault
    pub fn load(&self, addr: u32, width: Wordsize) -> Result<u32, Exception> {
        self.memory.read(addr, width).map_err(|e| {
            trace!("load fault: {e}");
            Exception::LoadFault
        })
    }

    /// Store a value to memory, converting an out-of-range access
    /// into a store fault
    pub fn store(&mut self, addr: u32, data: u32, width: Wordsize) -> Result<(), Exception> {
        self.memory.write(addr, data, width).map_err(|e| {
            trace!("store fault: {e}");
            Exception::StoreFault
        })
    }

    /// Execute exactly one instruction
    ///
    /// Fetches the word at pc (which must be 4-byte aligned and in
    /// range), decodes it and runs the execution function. The
    /// execution function performs the writeback and the pc update;
    /// on error the pc is left where it was.
    pub fn step(&mut self) -> Result<(), Exception> {
        if self.pc % 4 != 0 {
            return Err(Exception::FetchFault);
        }
        let instr = self
            .memory
            .read(self.pc, Wordsize::Word)
            .map_err(|_: MemoryError| Exception::FetchFault)?;
        let exec = self
            .decoder
            .get_exec(instr)
            .map_err(|_| Exception::IllegalInstruction)?;
        trace!("pc={:#010x} instr={:#010x}", self.pc, instr);
        exec(self, instr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::*;
    use memory::Wordsize;

    fn hart() -> Hart {
        Hart::with_local_host(VmConfig::default())
    }

    fn hart_with_program(words: &[u32]) -> Hart {
        let mut hart = hart();
        for (n, word) in words.iter().enumerate() {
            hart.memory
                .write(4 * n as u32, *word, Wordsize::Word)
                .unwrap();
        }
        hart
    }

    #[test]
    fn check_lui() {
        let mut hart = hart_with_program(&[lui(2, 53)]);
        hart.step().unwrap();
        assert_eq!(hart.x(2), 53 << 12);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_auipc() {
        let mut hart = hart();
        hart.pc = 8;
        hart.memory.write(8, auipc(4, 53), Wordsize::Word).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(4), 8 + (53 << 12));
        assert_eq!(hart.pc, 12);
    }

    #[test]
    fn check_jal() {
        let mut hart = hart();
        hart.pc = 8;
        hart.memory.write(8, jal(4, -4), Wordsize::Word).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(4), 12);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_jalr() {
        let mut hart = hart();
        hart.pc = 12;
        hart.set_x(6, 20);
        hart.memory.write(12, jalr(4, 6, -4), Wordsize::Word).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(4), 16);
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_jalr_clears_low_bit() {
        let mut hart = hart_with_program(&[jalr(1, 5, 0)]);
        hart.set_x(5, 0x101);
        hart.step().unwrap();
        assert_eq!(hart.pc, 0x100);
        assert_eq!(hart.x(1), 4);
    }

    #[test]
    fn check_beq() {
        let mut hart = hart_with_program(&[beq(1, 2, 16)]);
        hart.set_x(1, 1);
        hart.set_x(2, 2);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[beq(1, 2, 16)]);
        hart.set_x(1, 2);
        hart.set_x(2, 2);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_bne() {
        let mut hart = hart_with_program(&[bne(1, 2, 16)]);
        hart.set_x(1, 2);
        hart.set_x(2, 2);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[bne(1, 2, 16)]);
        hart.set_x(1, 1);
        hart.set_x(2, 2);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_blt_is_signed() {
        let mut hart = hart_with_program(&[blt(1, 2, 16)]);
        hart.set_x(1, 10);
        hart.set_x(2, 0xffff_ffff);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[blt(1, 2, 16)]);
        hart.set_x(1, 0xffff_ffff);
        hart.set_x(2, 10);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_bge_is_signed() {
        let mut hart = hart_with_program(&[bge(1, 2, 16)]);
        hart.set_x(1, 0xffff_ffff);
        hart.set_x(2, 10);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[bge(1, 2, 16)]);
        hart.set_x(1, 10);
        hart.set_x(2, 0xffff_ffff);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_bltu() {
        let mut hart = hart_with_program(&[bltu(1, 2, 16)]);
        hart.set_x(1, 10);
        hart.set_x(2, 1);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[bltu(1, 2, 16)]);
        hart.set_x(1, 1);
        hart.set_x(2, 10);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_bgeu() {
        let mut hart = hart_with_program(&[bgeu(1, 2, 16)]);
        hart.set_x(1, 1);
        hart.set_x(2, 10);
        hart.step().unwrap();
        assert_eq!(hart.pc, 4);

        let mut hart = hart_with_program(&[bgeu(1, 2, 16)]);
        hart.set_x(1, 10);
        hart.set_x(2, 1);
        hart.step().unwrap();
        assert_eq!(hart.pc, 16);
    }

    #[test]
    fn check_branch_backwards() {
        let mut hart = hart();
        hart.pc = 32;
        hart.memory.write(32, beq(0, 0, -32), Wordsize::Word).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.pc, 0);
    }

    #[test]
    fn check_lb_sign_extends() {
        let mut hart = hart_with_program(&[lb(1, 2, 16)]);
        hart.set_x(2, 4);
        hart.memory.write(20, 0xff, Wordsize::Byte).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_ffff);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_lbu_zero_extends() {
        let mut hart = hart_with_program(&[lbu(1, 2, 16)]);
        hart.set_x(2, 4);
        hart.memory.write(20, 0xff, Wordsize::Byte).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x0000_00ff);
    }

    #[test]
    fn check_lh_sign_extends() {
        let mut hart = hart_with_program(&[lh(1, 2, 16)]);
        hart.set_x(2, 5);
        hart.memory.write(21, 0xff92, Wordsize::Halfword).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_ff92);
    }

    #[test]
    fn check_lhu_zero_extends() {
        let mut hart = hart_with_program(&[lhu(1, 2, 16)]);
        hart.set_x(2, 5);
        hart.memory.write(21, 0xff92, Wordsize::Halfword).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x0000_ff92);
    }

    #[test]
    fn check_lw() {
        let mut hart = hart_with_program(&[lw(1, 2, 16)]);
        hart.set_x(2, 6);
        hart.memory.write(22, 0x1234_ff92, Wordsize::Word).unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x1234_ff92);
    }

    #[test]
    fn check_load_out_of_range_is_fault() {
        let mut hart = hart_with_program(&[lw(1, 2, 0)]);
        hart.set_x(2, 0xffff_0000);
        assert_eq!(hart.step(), Err(Exception::LoadFault));
        // pc unchanged, so the fault is observable at its own address
        assert_eq!(hart.pc, 0);
    }

    #[test]
    fn check_sb() {
        let mut hart = hart_with_program(&[sb(1, 2, 16)]);
        hart.set_x(1, 0xfe);
        hart.set_x(2, 6);
        hart.step().unwrap();
        assert_eq!(hart.memory.read(22, Wordsize::Byte).unwrap(), 0xfe);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_sh() {
        let mut hart = hart_with_program(&[sh(1, 2, 16)]);
        hart.set_x(1, 0xabfe);
        hart.set_x(2, 7);
        hart.step().unwrap();
        assert_eq!(hart.memory.read(23, Wordsize::Halfword).unwrap(), 0xabfe);
    }

    #[test]
    fn check_sw_negative_offset() {
        let mut hart = hart_with_program(&[sw(1, 2, -15)]);
        hart.set_x(1, 0xabcd_ef12);
        hart.set_x(2, 20);
        hart.step().unwrap();
        assert_eq!(hart.memory.read(5, Wordsize::Word).unwrap(), 0xabcd_ef12);
    }

    #[test]
    fn check_store_out_of_range_is_fault() {
        let mut hart = hart_with_program(&[sw(1, 2, 0)]);
        hart.set_x(2, 0xffff_0000);
        assert_eq!(hart.step(), Err(Exception::StoreFault));
        assert_eq!(hart.pc, 0);
    }

    #[test]
    fn check_addi() {
        let mut hart = hart_with_program(&[addi(1, 2, -23)]);
        hart.set_x(2, 22);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_ffff);
        assert_eq!(hart.pc, 4);
    }

    #[test]
    fn check_slti() {
        let mut hart = hart_with_program(&[slti(1, 2, -5)]);
        hart.set_x(2, (-24i32) as u32);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1);

        let mut hart = hart_with_program(&[slti(1, 2, -24)]);
        hart.set_x(2, (-5i32) as u32);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0);
    }

    #[test]
    fn check_sltiu_sign_extends_then_compares_unsigned() {
        // imm -1 sign-extends to 0xffff_ffff, so almost everything
        // is below it
        let mut hart = hart_with_program(&[sltiu(1, 2, -1)]);
        hart.set_x(2, 124);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1);

        let mut hart = hart_with_program(&[sltiu(1, 2, 22)]);
        hart.set_x(2, 124);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0);
    }

    #[test]
    fn check_andi() {
        let mut hart = hart_with_program(&[andi(1, 2, 0xff0)]);
        hart.set_x(2, 0x00ff_ff00);
        hart.step().unwrap();
        // andi uses the sign-extended 12-bit immediate
        assert_eq!(hart.x(1), 0x00ff_ff00);
    }

    #[test]
    fn check_ori() {
        let mut hart = hart_with_program(&[ori(1, 2, 0xff0)]);
        hart.set_x(2, 0x00ff_ff00);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_fff0);
    }

    #[test]
    fn check_xori() {
        let mut hart = hart_with_program(&[xori(1, 2, 0xff0)]);
        hart.set_x(2, 0x00ff_ff00);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xff00_00f0);
    }

    #[test]
    fn check_slli() {
        let mut hart = hart_with_program(&[slli(1, 2, 2)]);
        hart.set_x(2, 0b1101);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0b110100);
    }

    #[test]
    fn check_srli() {
        let mut hart = hart_with_program(&[srli(1, 2, 4)]);
        hart.set_x(2, 0xf000_0f00);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x0f00_00f0);
    }

    #[test]
    fn check_srai_preserves_sign() {
        let mut hart = hart_with_program(&[srai(1, 2, 4)]);
        hart.set_x(2, 0xf000_0f00);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xff00_00f0);
    }

    #[test]
    fn check_add_wrapping() {
        let mut hart = hart_with_program(&[add(1, 2, 3)]);
        hart.set_x(2, 0xffff_fffe);
        hart.set_x(3, 5);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 3);
    }

    #[test]
    fn check_sub_wrapping() {
        let mut hart = hart_with_program(&[sub(1, 2, 3)]);
        hart.set_x(2, 20);
        hart.set_x(3, 22);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_fffe);
    }

    #[test]
    fn check_slt() {
        let mut hart = hart_with_program(&[slt(1, 2, 3)]);
        hart.set_x(2, (-24i32) as u32);
        hart.set_x(3, 5);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1);
    }

    #[test]
    fn check_sltu() {
        let mut hart = hart_with_program(&[sltu(1, 2, 3)]);
        hart.set_x(2, 22);
        hart.set_x(3, 124);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1);
    }

    #[test]
    fn check_and_or_xor() {
        let mut hart = hart_with_program(&[and(1, 2, 3), or(4, 2, 3), xor(5, 2, 3)]);
        hart.set_x(2, 0x00ff_ff00);
        hart.set_x(3, 0x0f0f_f0f0);
        hart.step().unwrap();
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x000f_f000);
        assert_eq!(hart.x(4), 0x0fff_fff0);
        assert_eq!(hart.x(5), 0x0ff0_0ff0);
        assert_eq!(hart.pc, 12);
    }

    #[test]
    fn check_sll_uses_low_five_bits() {
        let mut hart = hart_with_program(&[sll(1, 2, 3)]);
        hart.set_x(2, 0b1101);
        hart.set_x(3, 32 + 2);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0b110100);
    }

    #[test]
    fn check_srl_and_sra() {
        let mut hart = hart_with_program(&[srl(1, 2, 3), sra(4, 2, 3)]);
        hart.set_x(2, 0xf000_0f00);
        hart.set_x(3, 4);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0x0f00_00f0);
        assert_eq!(hart.x(4), 0xff00_00f0);
    }

    #[test]
    fn check_writes_to_x0_never_stick() {
        let mut hart = hart_with_program(&[addi(0, 0, 123), jal(0, 8)]);
        hart.step().unwrap();
        assert_eq!(hart.x(0), 0);
        hart.pc = 4;
        hart.step().unwrap();
        assert_eq!(hart.x(0), 0);
        assert_eq!(hart.pc, 12);
    }

    #[test]
    fn check_unknown_opcode_is_illegal_instruction() {
        let hart = &mut hart_with_program(&[0x0000_0000]);
        assert_eq!(hart.step(), Err(Exception::IllegalInstruction));
        assert_eq!(hart.pc, 0);
    }

    #[test]
    fn check_misaligned_fetch_is_fault() {
        let mut hart = hart();
        hart.pc = 2;
        assert_eq!(hart.step(), Err(Exception::FetchFault));
    }

    #[test]
    fn check_fetch_past_end_is_fault() {
        let mut hart = hart();
        hart.pc = hart.memory.size() as u32;
        assert_eq!(hart.step(), Err(Exception::FetchFault));
    }

    #[test]
    fn check_ebreak_halts() {
        let mut hart = hart_with_program(&[ebreak()]);
        assert_eq!(hart.step(), Err(Exception::Break));
    }

    #[test]
    fn check_mul() {
        let mut hart = hart_with_program(&[mul(1, 2, 3)]);
        hart.set_x(2, (-7i32) as u32);
        hart.set_x(3, 3);
        hart.step().unwrap();
        assert_eq!(hart.x(1) as i32, -21);
    }

    #[test]
    fn check_mulh() {
        let mut hart = hart_with_program(&[mulh(1, 2, 3)]);
        hart.set_x(2, (-1i32) as u32);
        hart.set_x(3, (-1i32) as u32);
        hart.step().unwrap();
        // (-1) * (-1) = 1, upper word 0
        assert_eq!(hart.x(1), 0);

        let mut hart = hart_with_program(&[mulh(1, 2, 3)]);
        hart.set_x(2, 0x4000_0000);
        hart.set_x(3, 4);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1);
    }

    #[test]
    fn check_mulhu() {
        let mut hart = hart_with_program(&[mulhu(1, 2, 3)]);
        hart.set_x(2, 0xffff_ffff);
        hart.set_x(3, 0xffff_ffff);
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_fffe);
    }

    #[test]
    fn check_mulhsu() {
        let mut hart = hart_with_program(&[mulhsu(1, 2, 3)]);
        hart.set_x(2, (-1i32) as u32);
        hart.set_x(3, 0xffff_ffff);
        hart.step().unwrap();
        // -1 * 0xffff_ffff = -0xffff_ffff; upper word all ones
        assert_eq!(hart.x(1), 0xffff_ffff);
    }

    #[test]
    fn check_div() {
        let mut hart = hart_with_program(&[div(1, 2, 3)]);
        hart.set_x(2, (-21i32) as u32);
        hart.set_x(3, 3);
        hart.step().unwrap();
        assert_eq!(hart.x(1) as i32, -7);
    }

    #[test]
    fn check_div_by_zero_is_all_ones() {
        let mut hart = hart_with_program(&[div(1, 2, 3), divu(4, 2, 3)]);
        hart.set_x(2, 1234);
        hart.set_x(3, 0);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 0xffff_ffff);
        assert_eq!(hart.x(4), u32::MAX);
    }

    #[test]
    fn check_div_overflow() {
        let mut hart = hart_with_program(&[div(1, 2, 3), rem(4, 2, 3)]);
        hart.set_x(2, i32::MIN as u32);
        hart.set_x(3, (-1i32) as u32);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), i32::MIN as u32);
        assert_eq!(hart.x(4), 0);
    }

    #[test]
    fn check_rem_by_zero_returns_dividend() {
        let mut hart = hart_with_program(&[rem(1, 2, 3), remu(4, 2, 3)]);
        hart.set_x(2, 1234);
        hart.set_x(3, 0);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 1234);
        assert_eq!(hart.x(4), 1234);
    }

    #[test]
    fn check_rem_sign_follows_dividend() {
        let mut hart = hart_with_program(&[rem(1, 2, 3)]);
        hart.set_x(2, (-22i32) as u32);
        hart.set_x(3, 5);
        hart.step().unwrap();
        assert_eq!(hart.x(1) as i32, -2);
    }

    #[test]
    fn check_divu_remu() {
        let mut hart = hart_with_program(&[divu(1, 2, 3), remu(4, 2, 3)]);
        hart.set_x(2, 22);
        hart.set_x(3, 5);
        hart.step().unwrap();
        hart.step().unwrap();
        assert_eq!(hart.x(1), 4);
        assert_eq!(hart.x(4), 2);
    }
}
