//! Instruction field extraction
//!
//! Accessors for the fixed fields of a 32-bit instruction word
//! (register indices, function codes) and gathers for the scattered
//! immediates of the I, U, B and J formats. Immediates come back
//! sign-extended to i64, ready for RV64 arithmetic.

use crate::utils::{extract_field, interpret_u32_as_signed, interpret_u64_as_signed, sign_extend};

pub fn opcode(insn: u32) -> u32 {
    extract_field(insn, 6, 0)
}

pub fn rd(insn: u32) -> u32 {
    extract_field(insn, 11, 7)
}

pub fn funct3(insn: u32) -> u32 {
    extract_field(insn, 14, 12)
}

pub fn rs1(insn: u32) -> u32 {
    extract_field(insn, 19, 15)
}

pub fn rs2(insn: u32) -> u32 {
    extract_field(insn, 24, 20)
}

pub fn funct7(insn: u32) -> u32 {
    extract_field(insn, 31, 25)
}

/// The RV64 shift amount of a shift-by-immediate, insn[25:20]
pub fn shamt(insn: u32) -> u32 {
    extract_field(insn, 25, 20)
}

/// The I-type immediate, insn[31:20], sign-extended
pub fn imm_itype(insn: u32) -> i64 {
    interpret_u64_as_signed(sign_extend(extract_field(insn, 31, 20).into(), 11))
}

/// The U-type immediate already in its final position (insn[31:12]
/// with the low 12 bits zero), sign-extended from bit 31
pub fn imm_utype(insn: u32) -> i64 {
    interpret_u32_as_signed(insn & 0xffff_f000).into()
}

/// The B-type branch offset (always a multiple of two)
pub fn imm_btype(insn: u32) -> i64 {
    let imm12 = extract_field(insn, 31, 31);
    let imm11 = extract_field(insn, 7, 7);
    let imm10_5 = extract_field(insn, 30, 25);
    let imm4_1 = extract_field(insn, 11, 8);
    let unsigned = imm12 << 12 | imm11 << 11 | imm10_5 << 5 | imm4_1 << 1;
    interpret_u64_as_signed(sign_extend(unsigned.into(), 12))
}

/// The J-type jump offset (always a multiple of two)
pub fn imm_jtype(insn: u32) -> i64 {
    let imm20 = extract_field(insn, 31, 31);
    let imm19_12 = extract_field(insn, 19, 12);
    let imm11 = extract_field(insn, 20, 20);
    let imm10_1 = extract_field(insn, 30, 21);
    let unsigned = imm20 << 20 | imm19_12 << 12 | imm11 << 11 | imm10_1 << 1;
    interpret_u64_as_signed(sign_extend(unsigned.into(), 20))
}
