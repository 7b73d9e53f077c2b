//! Execution of the RV32I base instructions
//!
//! Each function takes the hart and the raw instruction word, pulls
//! out the fields of the relevant format, performs the operation, the
//! writeback (never to x0, which the register file enforces) and the
//! program counter update. Instruction behaviour is defined in the
//! RISC-V unprivileged specification version 20191213.

use crate::hart::memory::Wordsize;
use crate::hart::{Exception, Hart};
use crate::instr_type::{
    decode_btype, decode_ishtype, decode_itype, decode_jtype, decode_rtype, decode_stype,
    decode_utype, Btype, Ishtype, Itype, Rtype, Stype, UJtype,
};
use crate::utils::{interpret_u32_as_signed, sign_extend};

/// Load upper immediate
///
/// Load the u_immediate into the upper 20 bits of the register dest
/// and fill the lower 12 bits with zeros. Set pc = pc + 4.
pub fn execute_lui(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let UJtype {
        rd: dest,
        imm: u_immediate,
    } = decode_utype(instr);
    hart.set_x(dest, u_immediate << 12);
    hart.increment_pc();
    Ok(())
}

/// Add upper immediate to program counter
///
/// Make a 32-bit value by setting its upper 20 bits to u_immediate
/// and its lower 12 bits to zero, add the current program counter,
/// and store the result in dest. Set pc = pc + 4.
pub fn execute_auipc(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let UJtype {
        rd: dest,
        imm: u_immediate,
    } = decode_utype(instr);
    let value = hart.pc.wrapping_add(u_immediate << 12);
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

/// Jump and link
///
/// Store the address of the next instruction (pc + 4) in dest, then
/// set pc = pc + offset. Alignment of the target is not checked here;
/// a misaligned target faults at the next fetch.
pub fn execute_jal(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let UJtype {
        rd: dest,
        imm: offset,
    } = decode_jtype(instr);
    let return_address = hart.pc.wrapping_add(4);
    hart.set_pc(hart.pc.wrapping_add(sign_extend(offset, 20)));
    hart.set_x(dest, return_address);
    Ok(())
}

/// Jump and link register
///
/// Store the address of the next instruction (pc + 4) in dest, then
/// compute base + offset, clear the least significant bit, and set
/// the pc to the result.
pub fn execute_jalr(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let Itype {
        rs1: base,
        imm: offset,
        rd: dest,
    } = decode_itype(instr);
    let return_address = hart.pc.wrapping_add(4);
    let target = 0xffff_fffe & hart.x(base).wrapping_add(sign_extend(offset, 11));
    hart.set_pc(target);
    hart.set_x(dest, return_address);
    Ok(())
}

fn get_branch_data(hart: &Hart, instr: u32) -> (u32, u32, u16) {
    let Btype {
        rs1: src1,
        rs2: src2,
        imm: offset,
    } = decode_btype(instr);
    (hart.x(src1), hart.x(src2), offset)
}

/// If taken, set pc = pc + offset (a 13-bit immediate whose bit 0 is
/// always zero); otherwise set pc = pc + 4
fn do_branch(hart: &mut Hart, branch_taken: bool, offset: u16) {
    if branch_taken {
        let relative = sign_extend(offset, 12);
        hart.set_pc(hart.pc.wrapping_add(relative));
    } else {
        hart.increment_pc();
    }
}

pub fn execute_beq(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    do_branch(hart, src1 == src2, offset);
    Ok(())
}

pub fn execute_bne(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    do_branch(hart, src1 != src2, offset);
    Ok(())
}

pub fn execute_blt(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    let branch_taken = interpret_u32_as_signed(src1) < interpret_u32_as_signed(src2);
    do_branch(hart, branch_taken, offset);
    Ok(())
}

pub fn execute_bge(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    let branch_taken = interpret_u32_as_signed(src1) >= interpret_u32_as_signed(src2);
    do_branch(hart, branch_taken, offset);
    Ok(())
}

pub fn execute_bltu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    do_branch(hart, src1 < src2, offset);
    Ok(())
}

pub fn execute_bgeu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, offset) = get_branch_data(hart, instr);
    do_branch(hart, src1 >= src2, offset);
    Ok(())
}

fn load_address(hart: &Hart, instr: u32) -> (u32, u8) {
    let Itype {
        rs1: base,
        imm: offset,
        rd: dest,
    } = decode_itype(instr);
    let addr = hart.x(base).wrapping_add(sign_extend(offset, 11));
    (addr, dest)
}

pub fn execute_lb(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, dest) = load_address(hart, instr);
    let data = sign_extend(hart.load(addr, Wordsize::Byte)?, 7);
    hart.set_x(dest, data);
    hart.increment_pc();
    Ok(())
}

pub fn execute_lh(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, dest) = load_address(hart, instr);
    let data = sign_extend(hart.load(addr, Wordsize::Halfword)?, 15);
    hart.set_x(dest, data);
    hart.increment_pc();
    Ok(())
}

pub fn execute_lw(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, dest) = load_address(hart, instr);
    let data = hart.load(addr, Wordsize::Word)?;
    hart.set_x(dest, data);
    hart.increment_pc();
    Ok(())
}

pub fn execute_lbu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, dest) = load_address(hart, instr);
    let data = hart.load(addr, Wordsize::Byte)?;
    hart.set_x(dest, data);
    hart.increment_pc();
    Ok(())
}

pub fn execute_lhu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, dest) = load_address(hart, instr);
    let data = hart.load(addr, Wordsize::Halfword)?;
    hart.set_x(dest, data);
    hart.increment_pc();
    Ok(())
}

fn store_address_and_data(hart: &Hart, instr: u32) -> (u32, u32) {
    let Stype {
        rs1: base,
        rs2: src,
        imm: offset,
    } = decode_stype(instr);
    let addr = hart.x(base).wrapping_add(sign_extend(offset, 11));
    (addr, hart.x(src))
}

pub fn execute_sb(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, data) = store_address_and_data(hart, instr);
    hart.store(addr, data, Wordsize::Byte)?;
    hart.increment_pc();
    Ok(())
}

pub fn execute_sh(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, data) = store_address_and_data(hart, instr);
    hart.store(addr, data, Wordsize::Halfword)?;
    hart.increment_pc();
    Ok(())
}

pub fn execute_sw(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (addr, data) = store_address_and_data(hart, instr);
    hart.store(addr, data, Wordsize::Word)?;
    hart.increment_pc();
    Ok(())
}

fn reg_imm_values(hart: &Hart, instr: u32) -> (u32, u32, u8) {
    let Itype {
        rs1: src,
        imm: i_immediate,
        rd: dest,
    } = decode_itype(instr);
    (hart.x(src), sign_extend(i_immediate, 11), dest)
}

pub fn execute_addi(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    hart.set_x(dest, src.wrapping_add(imm));
    hart.increment_pc();
    Ok(())
}

pub fn execute_slti(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    let value = (interpret_u32_as_signed(src) < interpret_u32_as_signed(imm)) as u32;
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

/// The immediate is sign extended first and then treated as unsigned
pub fn execute_sltiu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    hart.set_x(dest, (src < imm) as u32);
    hart.increment_pc();
    Ok(())
}

pub fn execute_xori(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    hart.set_x(dest, src ^ imm);
    hart.increment_pc();
    Ok(())
}

pub fn execute_ori(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    hart.set_x(dest, src | imm);
    hart.increment_pc();
    Ok(())
}

pub fn execute_andi(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src, imm, dest) = reg_imm_values(hart, instr);
    hart.set_x(dest, src & imm);
    hart.increment_pc();
    Ok(())
}

pub fn execute_slli(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let Ishtype {
        rs1: src,
        shamt,
        rd: dest,
    } = decode_ishtype(instr);
    hart.set_x(dest, hart.x(src) << shamt);
    hart.increment_pc();
    Ok(())
}

pub fn execute_srli(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let Ishtype {
        rs1: src,
        shamt,
        rd: dest,
    } = decode_ishtype(instr);
    hart.set_x(dest, hart.x(src) >> shamt);
    hart.increment_pc();
    Ok(())
}

/// Arithmetic right shift: the sign bit is copied into the vacated
/// upper bits
pub fn execute_srai(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let Ishtype {
        rs1: src,
        shamt,
        rd: dest,
    } = decode_ishtype(instr);
    let value = (interpret_u32_as_signed(hart.x(src)) >> shamt) as u32;
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

fn reg_reg_values(hart: &Hart, instr: u32) -> (u32, u32, u8) {
    let Rtype {
        rs1: src1,
        rs2: src2,
        rd: dest,
    } = decode_rtype(instr);
    (hart.x(src1), hart.x(src2), dest)
}

pub fn execute_add(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1.wrapping_add(src2));
    hart.increment_pc();
    Ok(())
}

pub fn execute_sub(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1.wrapping_sub(src2));
    hart.increment_pc();
    Ok(())
}

/// Shift amount is the low 5 bits of src2
pub fn execute_sll(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1 << (src2 & 0x1f));
    hart.increment_pc();
    Ok(())
}

pub fn execute_slt(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = (interpret_u32_as_signed(src1) < interpret_u32_as_signed(src2)) as u32;
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_sltu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, (src1 < src2) as u32);
    hart.increment_pc();
    Ok(())
}

pub fn execute_xor(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1 ^ src2);
    hart.increment_pc();
    Ok(())
}

pub fn execute_srl(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1 >> (src2 & 0x1f));
    hart.increment_pc();
    Ok(())
}

pub fn execute_sra(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = (interpret_u32_as_signed(src1) >> (src2 & 0x1f)) as u32;
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_or(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1 | src2);
    hart.increment_pc();
    Ok(())
}

pub fn execute_and(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    hart.set_x(dest, src1 & src2);
    hart.increment_pc();
    Ok(())
}
