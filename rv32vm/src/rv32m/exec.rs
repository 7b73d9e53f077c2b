//! Execution of the RV32M multiply/divide instructions
//!
//! Division never traps. The edge cases follow section 7.2 of the
//! unprivileged specification: division by zero returns all ones
//! (the dividend for remainder), and the one signed overflow case
//! (INT_MIN / -1) returns INT_MIN with remainder 0.

use crate::hart::{Exception, Hart};
use crate::instr_type::{decode_rtype, Rtype};
use crate::utils::interpret_u32_as_signed;

fn reg_reg_values(hart: &Hart, instr: u32) -> (u32, u32, u8) {
    let Rtype {
        rs1: src1,
        rs2: src2,
        rd: dest,
    } = decode_rtype(instr);
    (hart.x(src1), hart.x(src2), dest)
}

/// Low 32 bits of the signed product
pub fn execute_mul(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1 = interpret_u32_as_signed(src1);
        let src2 = interpret_u32_as_signed(src2);
        src1.wrapping_mul(src2) as u32
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

/// High 32 bits of the signed x signed product
pub fn execute_mulh(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1: i64 = interpret_u32_as_signed(src1).into();
        let src2: i64 = interpret_u32_as_signed(src2).into();
        ((src1 * src2) >> 32) as u32
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

/// High 32 bits of the signed x unsigned product
pub fn execute_mulhsu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1: i64 = interpret_u32_as_signed(src1).into();
        let src2: i64 = src2.into();
        ((src1 * src2) >> 32) as u32
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

/// High 32 bits of the unsigned product
pub fn execute_mulhu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1: u64 = src1.into();
        let src2: u64 = src2.into();
        ((src1 * src2) >> 32) as u32
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_div(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1 = interpret_u32_as_signed(src1);
        let src2 = interpret_u32_as_signed(src2);
        if src2 == 0 {
            u32::MAX
        } else {
            // wrapping_div returns INT_MIN for INT_MIN / -1
            src1.wrapping_div(src2) as u32
        }
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_divu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = if src2 == 0 { u32::MAX } else { src1 / src2 };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_rem(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = {
        let src1 = interpret_u32_as_signed(src1);
        let src2 = interpret_u32_as_signed(src2);
        if src2 == 0 {
            src1 as u32
        } else {
            // wrapping_rem returns 0 for INT_MIN % -1
            src1.wrapping_rem(src2) as u32
        }
    };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}

pub fn execute_remu(hart: &mut Hart, instr: u32) -> Result<(), Exception> {
    let (src1, src2, dest) = reg_reg_values(hart, instr);
    let value = if src2 == 0 { src1 } else { src1 % src2 };
    hart.set_x(dest, value);
    hart.increment_pc();
    Ok(())
}
