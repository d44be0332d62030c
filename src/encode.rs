//! Instruction encoding
//!
//! Pure functions assembling 32-bit RISC-V encodings from their
//! operand fields. Every field is masked to its width before being
//! placed, so out-of-range operands are truncated rather than able
//! to corrupt neighbouring fields; range checking is the caller's
//! concern. The decompressor leans on these to express each
//! compressed form as its full-width equivalent.

use crate::utils::{extract_field, interpret_i32_as_unsigned};

use crate::opcodes::*;

/// Make an I-type instruction
pub fn itype(imm: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
    extract_field(imm, 11, 0) << 20
        | extract_field(rs1, 4, 0) << 15
        | extract_field(funct3, 2, 0) << 12
        | extract_field(rd, 4, 0) << 7
        | extract_field(opcode, 6, 0)
}

/// Make an U- or J-type instruction (if you are making a J-type
/// instruction, make sure to construct the immediate field
/// correctly using jtype_imm_field)
pub fn ujtype(imm: u32, rd: u32, opcode: u32) -> u32 {
    extract_field(imm, 19, 0) << 12
        | extract_field(rd, 4, 0) << 7
        | extract_field(opcode, 6, 0)
}

/// Make an R- or S-type instruction. These instructions have the
/// same number of fields of the same size. The meaning of a and b
/// is:
///
/// R-type: a = funct7, b = rd
/// S-type: a = imm[11:5], b = imm[4:0]
pub fn rstype(a: u32, rs2: u32, rs1: u32, funct3: u32, b: u32, opcode: u32) -> u32 {
    extract_field(a, 6, 0) << 25
        | extract_field(rs2, 4, 0) << 20
        | extract_field(rs1, 4, 0) << 15
        | extract_field(funct3, 2, 0) << 12
        | extract_field(b, 4, 0) << 7
        | extract_field(opcode, 6, 0)
}

/// The shift-by-immediate instructions use I-type, but with a
/// special encoding of the immediate that uses the lower 6 bits for
/// the shift amount (shamt, 0..63 on RV64) and the upper 6 bits to
/// distinguish between arithmetical and logical right shift
pub fn shifts_imm_field(shamt: u32, upper: u32) -> u32 {
    let shamt = extract_field(shamt, 5, 0);
    (upper << 6) | shamt
}

/// Takes an immediate and shuffles it into the format required for
/// the 20-bit field of the U-type instruction (making it J-type)
pub fn jtype_imm_field(imm: i32) -> u32 {
    let imm = interpret_i32_as_unsigned(imm);
    let imm20 = extract_field(imm, 20, 20);
    let imm19_12 = extract_field(imm, 19, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_1 = extract_field(imm, 10, 1);
    (imm20 << 19) | (imm10_1 << 9) | (imm11 << 8) | imm19_12
}

/// Returns (a, b) suitable for use with rstype for the conditional
/// branch instructions (btype)
pub fn btype_imm_fields(imm: i32) -> (u32, u32) {
    let imm = interpret_i32_as_unsigned(imm);
    let imm12 = extract_field(imm, 12, 12);
    let imm11 = extract_field(imm, 11, 11);
    let imm10_5 = extract_field(imm, 10, 5);
    let imm4_1 = extract_field(imm, 4, 1);
    let a = (imm12 << 6) | imm10_5;
    let b = (imm4_1 << 1) | imm11;
    (a, b)
}

// === RV64I base instructions ===
// (One constructor per instruction a simulator family covers.)

/// Note: in LUI and AUIPC, the immediate imm is already the upper
/// 20 bits that will be loaded -- it will not be shifted up.
pub fn lui(rd: u32, imm: u32) -> u32 {
    ujtype(imm, rd, OP_LUI)
}

pub fn auipc(rd: u32, imm: u32) -> u32 {
    ujtype(imm, rd, OP_AUIPC)
}

pub fn jal(rd: u32, offset: i32) -> u32 {
    ujtype(jtype_imm_field(offset), rd, OP_JAL)
}

pub fn jalr(rd: u32, rs1: u32, offset: i32) -> u32 {
    itype(interpret_i32_as_unsigned(offset), rs1, 0b000, rd, OP_JALR)
}

// Conditional branches

fn btype(rs1: u32, rs2: u32, funct3: u32, offset: i32) -> u32 {
    let (a, b) = btype_imm_fields(offset);
    rstype(a, rs2, rs1, funct3, b, OP_BRANCH)
}

pub fn beq(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BEQ, offset)
}

pub fn bne(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BNE, offset)
}

pub fn blt(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BLT, offset)
}

pub fn bge(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BGE, offset)
}

pub fn bltu(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BLTU, offset)
}

pub fn bgeu(rs1: u32, rs2: u32, offset: i32) -> u32 {
    btype(rs1, rs2, FUNCT3_BGEU, offset)
}

// Integer register-immediate instructions

pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_ADDI, rd, OP_IMM)
}

pub fn slti(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_SLTI, rd, OP_IMM)
}

pub fn sltiu(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_SLTIU, rd, OP_IMM)
}

pub fn xori(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_XORI, rd, OP_IMM)
}

pub fn ori(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_ORI, rd, OP_IMM)
}

pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_ANDI, rd, OP_IMM)
}

/// Add-word: the only OP_IMM_32 instruction the decompressor needs
/// (c.addiw expands to it)
pub fn addiw(rd: u32, rs1: u32, imm: i32) -> u32 {
    itype(interpret_i32_as_unsigned(imm), rs1, FUNCT3_ADDI, rd, OP_IMM_32)
}

// Shift-by-immediate instructions (64-bit shift amounts)

pub fn slli(rd: u32, rs1: u32, shamt: u32) -> u32 {
    itype(shifts_imm_field(shamt, 0b000000), rs1, FUNCT3_SLLI, rd, OP_IMM)
}

pub fn srli(rd: u32, rs1: u32, shamt: u32) -> u32 {
    itype(shifts_imm_field(shamt, 0b000000), rs1, FUNCT3_SRLI, rd, OP_IMM)
}

pub fn srai(rd: u32, rs1: u32, shamt: u32) -> u32 {
    itype(shifts_imm_field(shamt, 0b010000), rs1, FUNCT3_SRAI, rd, OP_IMM)
}

// Integer register-register instructions

pub fn add(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_ADD, rd, OP)
}

pub fn sub(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(FUNCT7_SUB, rs2, rs1, FUNCT3_SUB, rd, OP)
}

pub fn sll(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_SLL, rd, OP)
}

pub fn slt(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_SLT, rd, OP)
}

pub fn sltu(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_SLTU, rd, OP)
}

pub fn xor(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_XOR, rd, OP)
}

pub fn srl(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_SRL, rd, OP)
}

pub fn sra(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(FUNCT7_SRA, rs2, rs1, FUNCT3_SRA, rd, OP)
}

pub fn or(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_OR, rd, OP)
}

pub fn and(rd: u32, rs1: u32, rs2: u32) -> u32 {
    rstype(0b0000000, rs2, rs1, FUNCT3_AND, rd, OP)
}
