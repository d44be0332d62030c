//! Probe-site instruction decoding
//!
//! This file is where the raw word found at a candidate probe site
//! is turned into a [`ProbeDescriptor`] ready for arming, or
//! rejected. The low two bits of the word pick the path: 0b11 is a
//! standard 32-bit instruction, classified by its opcode field;
//! anything else is a 16-bit compressed instruction, which is
//! expanded through the [`encode`](crate::encode) module into the
//! equivalent full-width form so the simulator only ever sees one
//! encoding family.
//!
//! Rejection is the common case by design: any instruction whose
//! effect the simulator cannot reproduce exactly (loads, stores,
//! atomics, system instructions, reserved and hint encodings, forms
//! with RV32-only or RV128-only meaning) is refused, and the host
//! must not arm a probe there.

use log::debug;
use thiserror::Error;

use crate::abi;
use crate::encode;
use crate::opcodes::*;
use crate::registers::RegisterSnapshot;
use crate::simulate::Simulator;
use crate::utils::{extract_field, interpret_i32_as_unsigned, interpret_u32_as_signed, relocate_bit};

/// Refusal to probe an instruction
///
/// Every variant carries the same instruction to the host -- do not
/// probe here -- and exists only so the reason lands in the log. The
/// host surfaces any of them as a registration failure; nothing is
/// retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction {0:#010x} has an unsupported opcode")]
    UnsupportedOpcode(u32),
    #[error("compressed instruction {0:#06x} has no simulatable expansion")]
    UnsupportedCompressed(u32),
    #[error("compressed instruction {0:#06x} is reserved or hint space")]
    ReservedCompressed(u32),
    #[error("compressed instruction {0:#06x} only has meaning on rv32")]
    Rv32OnlyCompressed(u32),
    #[error("compressed shift by zero in {0:#06x} is an rv128 form")]
    Rv128ShiftCompressed(u32),
}

/// Everything the host needs to arm and later simulate one probe
///
/// Built once by [`decode`] before the probe is armed, never mutated
/// afterwards, and read-only during simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    /// Code address being probed (2-byte aligned)
    pub address: u64,
    /// Raw word read from the probe site; upper half zero for a
    /// compressed instruction
    pub original_encoding: u32,
    /// The 32-bit encoding the simulator executes. Identical to the
    /// original for standard instructions, the expanded equivalent
    /// for compressed ones.
    pub synthetic_encoding: u32,
    /// Which simulator family understands synthetic_encoding
    pub simulator: Simulator,
    /// True iff simulation may set the pc to a value unrelated to
    /// the natural next instruction. The host must not overwrite the
    /// pc with restore_address after a jump.
    pub is_jump: bool,
    /// Where the host advances the pc after simulating a non-jump:
    /// the instruction following the probe site (address + 2 or + 4
    /// by original width). None for jumps.
    pub restore_address: Option<u64>,
}

impl ProbeDescriptor {
    /// True if the word at the probe site was a 16-bit instruction
    ///
    /// Decides whether the host patches a 2- or 4-byte breakpoint.
    pub fn is_compressed(&self) -> bool {
        self.original_encoding & C_QUADRANT_MASK != C_QUADRANT_MASK
    }

    /// Apply the probed instruction's effect to the interrupted
    /// register state
    pub fn simulate<R: RegisterSnapshot>(&self, regs: &mut R) {
        self.simulator
            .simulate(self.synthetic_encoding, self.address, regs);
    }

    fn new(address: u64, original: u32, synthetic: u32, simulator: Simulator) -> Self {
        let is_jump = simulator.is_jump();
        let width = if original & C_QUADRANT_MASK == C_QUADRANT_MASK {
            4
        } else {
            2
        };
        let restore_address = if is_jump {
            None
        } else {
            Some(address.wrapping_add(width))
        };
        Self {
            address,
            original_encoding: original,
            synthetic_encoding: synthetic,
            simulator,
            is_jump,
            restore_address,
        }
    }
}

/// Classify the word found at a candidate probe site
///
/// The word is the little-endian u32 read from address; only the low
/// 16 bits are meaningful when they announce a compressed
/// instruction. Returns the populated descriptor, or the rejection
/// to surface to whoever asked for the probe. No state is touched
/// either way.
pub fn decode(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    let result = if insn & C_QUADRANT_MASK == C_QUADRANT_MASK {
        decode_standard(address, insn)
    } else {
        decompress(address, insn & 0xffff)
    };
    if let Err(ref err) = result {
        debug!("cannot probe {address:#x}: {err}");
    }
    result
}

/// Standard 32-bit instructions: the opcode alone selects the
/// simulator family
fn decode_standard(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    let simulator = match insn & OPCODE_MASK {
        OP_IMM => Simulator::RegImm,
        OP => Simulator::RegReg,
        OP_BRANCH => Simulator::Branch,
        OP_LUI => Simulator::Lui,
        OP_AUIPC => Simulator::Auipc,
        OP_JAL => Simulator::Jal,
        OP_JALR => Simulator::Jalr,
        // Loads, stores, atomics, fences, system, floating point and
        // everything else
        _ => return Err(DecodeError::UnsupportedOpcode(insn)),
    };
    Ok(ProbeDescriptor::new(address, insn, insn, simulator))
}

// === Compressed instruction fields ===

fn c_funct3(insn: u32) -> u32 {
    extract_field(insn, 15, 13)
}

/// Full-width rd/rs1 field, insn[11:7]
fn c_rd(insn: u32) -> u32 {
    extract_field(insn, 11, 7)
}

/// Full-width rs2 field, insn[6:2]
fn c_rs2(insn: u32) -> u32 {
    extract_field(insn, 6, 2)
}

/// Three-bit register field at insn[9:7], offset into x8..x15
fn c_rd_prime(insn: u32) -> u32 {
    extract_field(insn, 9, 7) + 8
}

/// Three-bit register field at insn[4:2], offset into x8..x15
fn c_rs2_prime(insn: u32) -> u32 {
    extract_field(insn, 4, 2) + 8
}

/// The six immediate bits {insn[12], insn[6:2]}, not interpreted
fn c_imm6_raw(insn: u32) -> u32 {
    relocate_bit(insn, 12, 5) | extract_field(insn, 6, 2)
}

/// The common 6-bit immediate, sign-extended
fn c_imm6(insn: u32) -> i32 {
    sign_extend_gathered(c_imm6_raw(insn), 5)
}

/// Sign-extend a gathered immediate from the given bit position
fn sign_extend_gathered(value: u32, sign_bit_position: u32) -> i32 {
    let shift = 31 - sign_bit_position;
    interpret_u32_as_signed(value << shift) >> shift
}

// The compressed formats scatter their immediates; each gather below
// names the destination bit for each instruction bit, reading
// left-to-right from instruction bit 12 downwards.

/// c.addi4spn: zero-extended nzuimm{5:4|9:6|2|3} from insn[12:5],
/// scaled in units of 4
fn c_addi4spn_imm(insn: u32) -> u32 {
    relocate_bit(insn, 12, 5)
        | relocate_bit(insn, 11, 4)
        | relocate_bit(insn, 10, 9)
        | relocate_bit(insn, 9, 8)
        | relocate_bit(insn, 8, 7)
        | relocate_bit(insn, 7, 6)
        | relocate_bit(insn, 6, 2)
        | relocate_bit(insn, 5, 3)
}

/// c.addi16sp: sign-extended nzimm{9|4|6|8:7|5} from insn[12|6:2],
/// scaled in units of 16
fn c_addi16sp_imm(insn: u32) -> i32 {
    let unsigned = relocate_bit(insn, 12, 9)
        | relocate_bit(insn, 6, 4)
        | relocate_bit(insn, 5, 6)
        | relocate_bit(insn, 4, 8)
        | relocate_bit(insn, 3, 7)
        | relocate_bit(insn, 2, 5);
    sign_extend_gathered(unsigned, 9)
}

/// c.j: sign-extended offset{11|4|9:8|10|6|7|3:1|5} from insn[12:2]
fn c_j_imm(insn: u32) -> i32 {
    let unsigned = relocate_bit(insn, 12, 11)
        | relocate_bit(insn, 11, 4)
        | relocate_bit(insn, 10, 9)
        | relocate_bit(insn, 9, 8)
        | relocate_bit(insn, 8, 10)
        | relocate_bit(insn, 7, 6)
        | relocate_bit(insn, 6, 7)
        | relocate_bit(insn, 5, 3)
        | relocate_bit(insn, 4, 2)
        | relocate_bit(insn, 3, 1)
        | relocate_bit(insn, 2, 5);
    sign_extend_gathered(unsigned, 11)
}

/// c.beqz/c.bnez: sign-extended offset{8|4:3|7:6|2:1|5} from
/// insn[12:10] and insn[6:2]
fn c_branch_imm(insn: u32) -> i32 {
    let unsigned = relocate_bit(insn, 12, 8)
        | relocate_bit(insn, 11, 4)
        | relocate_bit(insn, 10, 3)
        | relocate_bit(insn, 6, 7)
        | relocate_bit(insn, 5, 6)
        | relocate_bit(insn, 4, 2)
        | relocate_bit(insn, 3, 1)
        | relocate_bit(insn, 2, 5);
    sign_extend_gathered(unsigned, 8)
}

/// Expand a compressed instruction to its full-width equivalent, or
/// reject it
fn decompress(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    match insn & C_QUADRANT_MASK {
        C_QUADRANT0 => decompress_quadrant0(address, insn),
        C_QUADRANT1 => decompress_quadrant1(address, insn),
        _ => decompress_quadrant2(address, insn),
    }
}

fn decompress_quadrant0(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    // A zero low byte is the canonical illegal instruction region
    if insn & 0xff == 0 {
        return Err(DecodeError::ReservedCompressed(insn));
    }
    if c_funct3(insn) != 0b000 {
        // The rest of quadrant 0 is loads and stores
        return Err(DecodeError::UnsupportedCompressed(insn));
    }
    // c.addi4spn; the destination sits in the rs2' slot
    let imm = c_addi4spn_imm(insn);
    if imm == 0 {
        return Err(DecodeError::ReservedCompressed(insn));
    }
    let synthetic = encode::addi(c_rs2_prime(insn), abi::SP, interpret_u32_as_signed(imm));
    Ok(ProbeDescriptor::new(
        address,
        insn,
        synthetic,
        Simulator::RegImm,
    ))
}

fn decompress_quadrant1(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    let rd = c_rd(insn);
    let synthetic = match c_funct3(insn) {
        // c.nop and c.addi share an encoding; both expand cleanly
        0b000 => encode::addi(rd, rd, c_imm6(insn)),
        0b001 => {
            // c.addiw; the rd=0 slot is c.jal on rv32 only
            if rd == abi::ZERO {
                return Err(DecodeError::Rv32OnlyCompressed(insn));
            }
            encode::addiw(rd, rd, c_imm6(insn))
        }
        0b010 => {
            // c.li with rd=0 is hint space
            if rd == abi::ZERO {
                return Err(DecodeError::ReservedCompressed(insn));
            }
            encode::addi(rd, abi::ZERO, c_imm6(insn))
        }
        0b011 => {
            if rd == abi::SP {
                let imm = c_addi16sp_imm(insn);
                if imm == 0 {
                    return Err(DecodeError::ReservedCompressed(insn));
                }
                encode::addi(abi::SP, abi::SP, imm)
            } else if rd != abi::ZERO {
                // c.lui: the sign-extended 6-bit immediate becomes
                // the low bits of the 20-bit upper-immediate field;
                // the encoder masks it down
                let imm = c_imm6(insn);
                if imm == 0 {
                    return Err(DecodeError::ReservedCompressed(insn));
                }
                let synthetic = encode::lui(rd, interpret_i32_as_unsigned(imm));
                return Ok(ProbeDescriptor::new(
                    address,
                    insn,
                    synthetic,
                    Simulator::Lui,
                ));
            } else {
                return Err(DecodeError::ReservedCompressed(insn));
            }
        }
        0b100 => return decompress_quadrant1_alu(address, insn),
        0b101 => {
            let synthetic = encode::jal(abi::ZERO, c_j_imm(insn));
            return Ok(ProbeDescriptor::new(
                address,
                insn,
                synthetic,
                Simulator::Jal,
            ));
        }
        0b110 => {
            let synthetic = encode::beq(c_rd_prime(insn), abi::ZERO, c_branch_imm(insn));
            return Ok(ProbeDescriptor::new(
                address,
                insn,
                synthetic,
                Simulator::Branch,
            ));
        }
        _ => {
            let synthetic = encode::bne(c_rd_prime(insn), abi::ZERO, c_branch_imm(insn));
            return Ok(ProbeDescriptor::new(
                address,
                insn,
                synthetic,
                Simulator::Branch,
            ));
        }
    };
    Ok(ProbeDescriptor::new(
        address,
        insn,
        synthetic,
        Simulator::RegImm,
    ))
}

/// Quadrant 1, funct3=100: the shift/andi/register-register group,
/// distinguished by the two bits at insn[11:10]
fn decompress_quadrant1_alu(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    let rd = c_rd_prime(insn);
    let synthetic = match extract_field(insn, 11, 10) {
        0b00 => {
            let shamt = c_imm6_raw(insn);
            if shamt == 0 {
                // c.srli64, which only shifts on rv128
                return Err(DecodeError::Rv128ShiftCompressed(insn));
            }
            encode::srli(rd, rd, shamt)
        }
        0b01 => {
            let shamt = c_imm6_raw(insn);
            if shamt == 0 {
                return Err(DecodeError::Rv128ShiftCompressed(insn));
            }
            encode::srai(rd, rd, shamt)
        }
        0b10 => encode::andi(rd, rd, c_imm6(insn)),
        _ => {
            if extract_field(insn, 12, 12) == 1 {
                // c.subw and c.addw: no word-sized register-register
                // simulator, so no probe
                return Err(DecodeError::UnsupportedCompressed(insn));
            }
            // register-register expansions
            let rs2 = c_rs2_prime(insn);
            let synthetic = match extract_field(insn, 6, 5) {
                0b00 => encode::sub(rd, rd, rs2),
                0b01 => encode::xor(rd, rd, rs2),
                0b10 => encode::or(rd, rd, rs2),
                _ => encode::and(rd, rd, rs2),
            };
            return Ok(ProbeDescriptor::new(
                address,
                insn,
                synthetic,
                Simulator::RegReg,
            ));
        }
    };
    Ok(ProbeDescriptor::new(
        address,
        insn,
        synthetic,
        Simulator::RegImm,
    ))
}

fn decompress_quadrant2(address: u64, insn: u32) -> Result<ProbeDescriptor, DecodeError> {
    match c_funct3(insn) {
        0b000 => {
            let rd = c_rd(insn);
            let shamt = c_imm6_raw(insn);
            if shamt == 0 {
                // c.slli64
                return Err(DecodeError::Rv128ShiftCompressed(insn));
            }
            let synthetic = encode::slli(rd, rd, shamt);
            Ok(ProbeDescriptor::new(
                address,
                insn,
                synthetic,
                Simulator::RegImm,
            ))
        }
        0b100 => {
            let imm = c_imm6_raw(insn);
            let rd = c_rd(insn);
            let rs2 = c_rs2(insn);
            if imm == 0 {
                // c.jr; the rs1=0 slot is reserved
                if rd == abi::ZERO {
                    return Err(DecodeError::ReservedCompressed(insn));
                }
                let synthetic = encode::jalr(abi::ZERO, rd, 0);
                Ok(ProbeDescriptor::new(
                    address,
                    insn,
                    synthetic,
                    Simulator::Jalr,
                ))
            } else if imm < 0x20 {
                // c.mv (the immediate's low five bits are rs2, known
                // non-zero here)
                let synthetic = encode::addi(rd, rs2, 0);
                Ok(ProbeDescriptor::new(
                    address,
                    insn,
                    synthetic,
                    Simulator::RegImm,
                ))
            } else if imm & 0x1f != 0 {
                let synthetic = encode::add(rd, rd, rs2);
                Ok(ProbeDescriptor::new(
                    address,
                    insn,
                    synthetic,
                    Simulator::RegReg,
                ))
            } else {
                // c.ebreak (the word the patcher plants) and c.jalr
                Err(DecodeError::UnsupportedCompressed(insn))
            }
        }
        // Stack-pointer-relative loads and stores
        _ => Err(DecodeError::UnsupportedCompressed(insn)),
    }
}
