//! Instruction encoding
//!
//! Builders that assemble raw RV32IM instruction words from register
//! indices and (signed) immediates. The inverse of the decoding layer;
//! used by the tests to write guest programs directly into memory.

use crate::opcodes::*;
use crate::utils::{extract_field, interpret_i32_as_unsigned};

/// Make an I-type instruction. Only produces a valid word if the
/// arguments are in range.
pub fn itype(imm: u32, rs1: u8, funct3: u32, rd: u8, opcode: u32) -> u32 {
    imm << 20 | u32::from(rs1) << 15 | funct3 << 12 | u32::from(rd) << 7 | opcode
}

/// Make an R- or S-type instruction. These formats have the same
/// field layout; the meaning of a and b is:
///
/// R-type: a = funct7, b = rd
/// S-type: a = imm[11:5], b = imm[4:0]
pub fn rstype(a: u32, rs2: u8, rs1: u8, funct3: u32, b: u32, opcode: u32) -> u32 {
    a << 25 | u32::from(rs2) << 20 | u32::from(rs1) << 15 | funct3 << 12 | b << 7 | opcode
}

/// Make a U- or J-type instruction (for J-type, scramble the
/// immediate field first with jtype_imm_field)
pub fn ujtype(imm: u32, rd: u8, opcode: u32) -> u32 {
    imm << 12 | u32::from(rd) << 7 | opcode
}

/// Split a branch offset into the a/b fields of an S/B-format word:
/// a = imm[12|10:5], b = imm[4:1|11]
fn btype_imm_fields(offset: i32) -> (u32, u32) {
    let imm = interpret_i32_as_unsigned(offset);
    let a = (extract_field(imm, 12, 12) << 6) | extract_field(imm, 10, 5);
    let b = (extract_field(imm, 4, 1) << 1) | extract_field(imm, 11, 11);
    (a, b)
}

/// Scramble a jump offset into the 20-bit J-type immediate field:
/// imm[20|10:1|11|19:12]
fn jtype_imm_field(offset: i32) -> u32 {
    let imm = interpret_i32_as_unsigned(offset);
    (extract_field(imm, 20, 20) << 19)
        | (extract_field(imm, 10, 1) << 9)
        | (extract_field(imm, 11, 11) << 8)
        | extract_field(imm, 19, 12)
}

/// The shift-by-immediate instructions use I-type with the lower 5
/// bits as the shift amount and the upper bits distinguishing
/// arithmetic from logical right shift
fn shift_imm_field(shamt: u8, funct7: u32) -> u32 {
    (funct7 << 5) | u32::from(shamt & 0x1f)
}

fn itype_imm(imm: i32) -> u32 {
    extract_field(interpret_i32_as_unsigned(imm), 11, 0)
}

pub fn lui(rd: u8, imm: u32) -> u32 {
    ujtype(imm, rd, OP_LUI)
}

pub fn auipc(rd: u8, imm: u32) -> u32 {
    ujtype(imm, rd, OP_AUIPC)
}

pub fn jal(rd: u8, offset: i32) -> u32 {
    ujtype(jtype_imm_field(offset), rd, OP_JAL)
}

pub fn jalr(rd: u8, rs1: u8, offset: i32) -> u32 {
    itype(itype_imm(offset), rs1, 0, rd, OP_JALR)
}

fn branch(funct3: u32, rs1: u8, rs2: u8, offset: i32) -> u32 {
    let (a, b) = btype_imm_fields(offset);
    rstype(a, rs2, rs1, funct3, b, OP_BRANCH)
}

pub fn beq(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BEQ, rs1, rs2, offset)
}

pub fn bne(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BNE, rs1, rs2, offset)
}

pub fn blt(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BLT, rs1, rs2, offset)
}

pub fn bge(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BGE, rs1, rs2, offset)
}

pub fn bltu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BLTU, rs1, rs2, offset)
}

pub fn bgeu(rs1: u8, rs2: u8, offset: i32) -> u32 {
    branch(FUNCT3_BGEU, rs1, rs2, offset)
}

fn load(funct3: u32, rd: u8, base: u8, offset: i32) -> u32 {
    itype(itype_imm(offset), base, funct3, rd, OP_LOAD)
}

pub fn lb(rd: u8, base: u8, offset: i32) -> u32 {
    load(FUNCT3_B, rd, base, offset)
}

pub fn lh(rd: u8, base: u8, offset: i32) -> u32 {
    load(FUNCT3_H, rd, base, offset)
}

pub fn lw(rd: u8, base: u8, offset: i32) -> u32 {
    load(FUNCT3_W, rd, base, offset)
}

pub fn lbu(rd: u8, base: u8, offset: i32) -> u32 {
    load(FUNCT3_BU, rd, base, offset)
}

pub fn lhu(rd: u8, base: u8, offset: i32) -> u32 {
    load(FUNCT3_HU, rd, base, offset)
}

fn store(funct3: u32, src: u8, base: u8, offset: i32) -> u32 {
    let imm = interpret_i32_as_unsigned(offset);
    let imm11_5 = extract_field(imm, 11, 5);
    let imm4_0 = extract_field(imm, 4, 0);
    rstype(imm11_5, src, base, funct3, imm4_0, OP_STORE)
}

pub fn sb(src: u8, base: u8, offset: i32) -> u32 {
    store(FUNCT3_B, src, base, offset)
}

pub fn sh(src: u8, base: u8, offset: i32) -> u32 {
    store(FUNCT3_H, src, base, offset)
}

pub fn sw(src: u8, base: u8, offset: i32) -> u32 {
    store(FUNCT3_W, src, base, offset)
}

pub fn addi(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_ADDI, rd, OP_IMM)
}

pub fn slti(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_SLTI, rd, OP_IMM)
}

pub fn sltiu(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_SLTIU, rd, OP_IMM)
}

pub fn xori(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_XORI, rd, OP_IMM)
}

pub fn ori(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_ORI, rd, OP_IMM)
}

pub fn andi(rd: u8, rs1: u8, imm: i32) -> u32 {
    itype(itype_imm(imm), rs1, FUNCT3_ANDI, rd, OP_IMM)
}

pub fn slli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    itype(shift_imm_field(shamt, FUNCT7_SLLI), rs1, FUNCT3_SLLI, rd, OP_IMM)
}

pub fn srli(rd: u8, rs1: u8, shamt: u8) -> u32 {
    itype(shift_imm_field(shamt, FUNCT7_SRLI), rs1, FUNCT3_SRLI, rd, OP_IMM)
}

pub fn srai(rd: u8, rs1: u8, shamt: u8) -> u32 {
    itype(shift_imm_field(shamt, FUNCT7_SRAI), rs1, FUNCT3_SRAI, rd, OP_IMM)
}

fn regreg(funct7: u32, funct3: u32, rd: u8, rs1: u8, rs2: u8) -> u32 {
    rstype(funct7, rs2, rs1, funct3, u32::from(rd), OP)
}

pub fn add(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_ADD, FUNCT3_ADD, rd, rs1, rs2)
}

pub fn sub(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SUB, FUNCT3_SUB, rd, rs1, rs2)
}

pub fn sll(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SLL, FUNCT3_SLL, rd, rs1, rs2)
}

pub fn slt(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SLT, FUNCT3_SLT, rd, rs1, rs2)
}

pub fn sltu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SLTU, FUNCT3_SLTU, rd, rs1, rs2)
}

pub fn xor(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_XOR, FUNCT3_XOR, rd, rs1, rs2)
}

pub fn srl(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SRL, FUNCT3_SRL, rd, rs1, rs2)
}

pub fn sra(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_SRA, FUNCT3_SRA, rd, rs1, rs2)
}

pub fn or(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_OR, FUNCT3_OR, rd, rs1, rs2)
}

pub fn and(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_AND, FUNCT3_AND, rd, rs1, rs2)
}

pub fn mul(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_MUL, rd, rs1, rs2)
}

pub fn mulh(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_MULH, rd, rs1, rs2)
}

pub fn mulhsu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_MULHSU, rd, rs1, rs2)
}

pub fn mulhu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_MULHU, rd, rs1, rs2)
}

pub fn div(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_DIV, rd, rs1, rs2)
}

pub fn divu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_DIVU, rd, rs1, rs2)
}

pub fn rem(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_REM, rd, rs1, rs2)
}

pub fn remu(rd: u8, rs1: u8, rs2: u8) -> u32 {
    regreg(FUNCT7_MULDIV, FUNCT3_REMU, rd, rs1, rs2)
}

pub fn ecall() -> u32 {
    itype(IMM_ECALL, 0, FUNCT3_PRIV, 0, OP_SYSTEM)
}

pub fn ebreak() -> u32 {
    itype(IMM_EBREAK, 0, FUNCT3_PRIV, 0, OP_SYSTEM)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Words cross-checked against an external assembler
    #[test]
    fn check_known_words() {
        // add t2, t0, t1
        assert_eq!(add(7, 5, 6), 0x006283b3);
        // sub t2, t0, t1
        assert_eq!(sub(7, 5, 6), 0x406283b3);
        // sra t2, t0, t1
        assert_eq!(sra(7, 5, 6), 0x4062d3b3);
        // jal t0, 0x100
        assert_eq!(jal(5, 0x100), 0x100002ef);
        // beq t0, t1, 0x20
        assert_eq!(beq(5, 6, 0x20), 0x02628063);
        // blt t0, t1, 0x20
        assert_eq!(blt(5, 6, 0x20), 0x0262c063);
        // ecall
        assert_eq!(ecall(), 0x00000073);
        // ebreak
        assert_eq!(ebreak(), 0x00100073);
    }

    #[test]
    fn check_negative_offsets() {
        // jal x4, -4: sign bit set, imm10_1 = 0b1111111110
        let word = jal(4, -4);
        assert_eq!(word & 0x7f, 0x6f);
        assert_eq!(crate::fields::imm_jtype!(word), 0x1ffffc);
        // sw x1, -15(x2)
        let word = sw(1, 2, -15);
        assert_eq!(crate::fields::imm_stype!(word), 0xff1);
    }
}
