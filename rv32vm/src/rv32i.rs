//! RV32I base integer instruction set
//!
//! Registration of the base-ISA decodings, defined in chapter 2 of
//! the unprivileged specification version 20191213. Execution
//! functions live in the `exec` submodule.

use crate::{
    decode::{Decoder, DecoderError, MaskWithValue},
    hart::ExecFn,
    opcodes::*,
    utils::mask,
};

use self::exec::*;

pub mod exec;

/// Register an instruction fully determined by its opcode
pub fn opcode_determined(
    decoder: &mut Decoder<ExecFn>,
    opcode: u32,
    exec: ExecFn,
) -> Result<(), DecoderError> {
    let masks_with_values = vec![MaskWithValue {
        mask: mask(7),
        value: opcode,
    }];
    decoder.push_instruction(masks_with_values, exec)
}

/// Register an instruction determined by its opcode and funct3
pub fn opcode_funct3_determined(
    decoder: &mut Decoder<ExecFn>,
    opcode: u32,
    funct3: u32,
    exec: ExecFn,
) -> Result<(), DecoderError> {
    let masks_with_values = vec![
        MaskWithValue {
            mask: mask::<u32>(3) << 12,
            value: funct3 << 12,
        },
        MaskWithValue {
            mask: mask(7),
            value: opcode,
        },
    ];
    decoder.push_instruction(masks_with_values, exec)
}

/// Register an instruction determined by opcode, funct3 and funct7.
/// This also covers the shift-immediate instructions, which use the
/// upper bits of the I-type immediate the way R-type uses funct7.
pub fn opcode_funct3_funct7_determined(
    decoder: &mut Decoder<ExecFn>,
    opcode: u32,
    funct3: u32,
    funct7: u32,
    exec: ExecFn,
) -> Result<(), DecoderError> {
    let masks_with_values = vec![
        MaskWithValue {
            mask: mask::<u32>(7) << 25,
            value: funct7 << 25,
        },
        MaskWithValue {
            mask: mask::<u32>(3) << 12,
            value: funct3 << 12,
        },
        MaskWithValue {
            mask: mask(7),
            value: opcode,
        },
    ];
    decoder.push_instruction(masks_with_values, exec)
}

pub fn make_rv32i(decoder: &mut Decoder<ExecFn>) -> Result<(), DecoderError> {
    // Opcode determines instruction
    opcode_determined(decoder, OP_LUI, execute_lui)?;
    opcode_determined(decoder, OP_AUIPC, execute_auipc)?;
    opcode_determined(decoder, OP_JAL, execute_jal)?;

    // Opcode and funct3 determine instruction
    opcode_funct3_determined(decoder, OP_JALR, FUNCT3_JALR, execute_jalr)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BEQ, execute_beq)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BNE, execute_bne)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BLT, execute_blt)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BGE, execute_bge)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BLTU, execute_bltu)?;
    opcode_funct3_determined(decoder, OP_BRANCH, FUNCT3_BGEU, execute_bgeu)?;
    opcode_funct3_determined(decoder, OP_LOAD, FUNCT3_B, execute_lb)?;
    opcode_funct3_determined(decoder, OP_LOAD, FUNCT3_H, execute_lh)?;
    opcode_funct3_determined(decoder, OP_LOAD, FUNCT3_W, execute_lw)?;
    opcode_funct3_determined(decoder, OP_LOAD, FUNCT3_BU, execute_lbu)?;
    opcode_funct3_determined(decoder, OP_LOAD, FUNCT3_HU, execute_lhu)?;
    opcode_funct3_determined(decoder, OP_STORE, FUNCT3_B, execute_sb)?;
    opcode_funct3_determined(decoder, OP_STORE, FUNCT3_H, execute_sh)?;
    opcode_funct3_determined(decoder, OP_STORE, FUNCT3_W, execute_sw)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_ADDI, execute_addi)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_SLTI, execute_slti)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_SLTIU, execute_sltiu)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_XORI, execute_xori)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_ORI, execute_ori)?;
    opcode_funct3_determined(decoder, OP_IMM, FUNCT3_ANDI, execute_andi)?;

    // Shift instructions (opcode, funct3 and upper immediate bits)
    opcode_funct3_funct7_determined(decoder, OP_IMM, FUNCT3_SLLI, FUNCT7_SLLI, execute_slli)?;
    opcode_funct3_funct7_determined(decoder, OP_IMM, FUNCT3_SRLI, FUNCT7_SRLI, execute_srli)?;
    opcode_funct3_funct7_determined(decoder, OP_IMM, FUNCT3_SRAI, FUNCT7_SRAI, execute_srai)?;

    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_ADD, FUNCT7_ADD, execute_add)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SUB, FUNCT7_SUB, execute_sub)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SLL, FUNCT7_SLL, execute_sll)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SLT, FUNCT7_SLT, execute_slt)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SLTU, FUNCT7_SLTU, execute_sltu)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_XOR, FUNCT7_XOR, execute_xor)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SRL, FUNCT7_SRL, execute_srl)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_SRA, FUNCT7_SRA, execute_sra)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_OR, FUNCT7_OR, execute_or)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_AND, FUNCT7_AND, execute_and)
}
