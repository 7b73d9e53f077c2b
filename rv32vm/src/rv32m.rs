//! RV32M standard extension for integer multiplication and division
//!
//! Instructions defined in chapter 7 of the unprivileged
//! specification version 20191213. All eight share the OP opcode
//! with funct7 = 0b0000001.

use crate::{
    decode::{Decoder, DecoderError},
    hart::ExecFn,
    opcodes::*,
    rv32i::opcode_funct3_funct7_determined,
};

use self::exec::*;

pub mod exec;

pub fn make_rv32m(decoder: &mut Decoder<ExecFn>) -> Result<(), DecoderError> {
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_MUL, FUNCT7_MULDIV, execute_mul)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_MULH, FUNCT7_MULDIV, execute_mulh)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_MULHSU, FUNCT7_MULDIV, execute_mulhsu)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_MULHU, FUNCT7_MULDIV, execute_mulhu)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_DIV, FUNCT7_MULDIV, execute_div)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_DIVU, FUNCT7_MULDIV, execute_divu)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_REM, FUNCT7_MULDIV, execute_rem)?;
    opcode_funct3_funct7_determined(decoder, OP, FUNCT3_REMU, FUNCT7_MULDIV, execute_remu)
}
