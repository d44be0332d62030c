//! Instruction simulation
//!
//! One function per supported instruction family. Each takes a
//! 32-bit encoding the decoder accepted into that family, the probe
//! address, and the interrupted register state, and applies the
//! exact register and control-flow effect the hardware would have
//! produced. The functions are total: given an encoding the decoder
//! accepted, they cannot fail, allocate or block, so they are safe
//! to call from a trap handler with interrupts disabled.
//!
//! The program counter contract mirrors the decoder's jump
//! classification. Jumps (jal, jalr) always write the pc. Taken
//! branches add their offset to the pc; non-taken branches leave it
//! alone, and every other family never touches it -- for those the
//! host advances the pc to the descriptor's restore address after
//! simulation.
//!
//! Behaviour of the instructions is defined in the RISC-V
//! unprivileged specification version 20191213.

use crate::fields::{funct3, funct7, imm_btype, imm_itype, imm_jtype, imm_utype, rd, rs1, rs2, shamt};
use crate::opcodes::*;
use crate::registers::RegisterSnapshot;
use crate::utils::{interpret_i64_as_unsigned, interpret_u64_as_signed};

/// Selects the simulator family for one accepted encoding
///
/// Stored in the probe descriptor as plain data; dispatch is an
/// exhaustive match in [`Simulator::simulate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Simulator {
    /// addi/slti/sltiu/xori/ori/andi/slli/srli/srai and addiw
    RegImm,
    /// add/sub/sll/slt/sltu/xor/srl/sra/or/and
    RegReg,
    /// beq/bne/blt/bge/bltu/bgeu
    Branch,
    Lui,
    Auipc,
    Jal,
    Jalr,
}

impl Simulator {
    /// Apply the architectural effect of insn to regs
    pub fn simulate<R: RegisterSnapshot>(self, insn: u32, addr: u64, regs: &mut R) {
        match self {
            Self::RegImm => simulate_reg_imm(insn, addr, regs),
            Self::RegReg => simulate_reg_reg(insn, addr, regs),
            Self::Branch => simulate_branch(insn, addr, regs),
            Self::Lui => simulate_lui(insn, addr, regs),
            Self::Auipc => simulate_auipc(insn, addr, regs),
            Self::Jal => simulate_jal(insn, addr, regs),
            Self::Jalr => simulate_jalr(insn, addr, regs),
        }
    }

    /// True for the families that may set the pc to a value
    /// unrelated to the natural next instruction
    pub fn is_jump(self) -> bool {
        matches!(self, Self::Jal | Self::Jalr)
    }
}

// Reads and writes of the register file go through these wrappers,
// which enforce the x0 semantics (reads yield 0, writes are
// discarded) regardless of what the snapshot stores in slot 0.

fn get_register<R: RegisterSnapshot>(regs: &R, reg: u32) -> u64 {
    if reg == 0 {
        return 0;
    }
    regs.read_gpr(reg as usize)
}

fn set_register<R: RegisterSnapshot>(regs: &mut R, reg: u32, value: u64) {
    if reg != 0 {
        regs.write_gpr(reg as usize, value);
    }
}

/// Integer register-immediate instructions (OP_IMM and the lone
/// OP_IMM_32 form addiw, whose 32-bit fold is selected by opcode)
pub fn simulate_reg_imm<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let imm = imm_itype(insn);
    let src = get_register(regs, rs1(insn));
    let value = match funct3(insn) {
        FUNCT3_ADDI => {
            let sum = src.wrapping_add(interpret_i64_as_unsigned(imm));
            if opcode_is_word_sized(insn) {
                // addiw truncates to 32 bits and sign-extends
                sign_extend_word(sum)
            } else {
                sum
            }
        }
        FUNCT3_SLLI => src << shamt(insn),
        FUNCT3_SLTI => u64::from(interpret_u64_as_signed(src) < imm),
        FUNCT3_SLTIU => u64::from(src < interpret_i64_as_unsigned(imm)),
        FUNCT3_XORI => src ^ interpret_i64_as_unsigned(imm),
        FUNCT3_SRLI => {
            // Bit 10 of the immediate picks the arithmetic shift
            if imm & 0x400 == 0x400 {
                interpret_i64_as_unsigned(interpret_u64_as_signed(src) >> shamt(insn))
            } else {
                src >> shamt(insn)
            }
        }
        FUNCT3_ORI => src | interpret_i64_as_unsigned(imm),
        FUNCT3_ANDI => src & interpret_i64_as_unsigned(imm),
        // Only three bits of funct3 exist
        _ => return,
    };
    set_register(regs, rd(insn), value);
}

/// Integer register-register instructions (OP)
pub fn simulate_reg_reg<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let src1 = get_register(regs, rs1(insn));
    let src2 = get_register(regs, rs2(insn));
    // RV64 register shifts take their amount from the low six bits
    // of rs2
    let shift = src2 & 0x3f;
    let value = match funct3(insn) {
        FUNCT3_ADD => {
            if funct7(insn) == FUNCT7_SUB {
                src1.wrapping_sub(src2)
            } else {
                src1.wrapping_add(src2)
            }
        }
        FUNCT3_SLL => src1 << shift,
        FUNCT3_SLT => u64::from(interpret_u64_as_signed(src1) < interpret_u64_as_signed(src2)),
        FUNCT3_SLTU => u64::from(src1 < src2),
        FUNCT3_XOR => src1 ^ src2,
        FUNCT3_SRL => {
            if funct7(insn) == FUNCT7_SRA {
                interpret_i64_as_unsigned(interpret_u64_as_signed(src1) >> shift)
            } else {
                src1 >> shift
            }
        }
        FUNCT3_OR => src1 | src2,
        FUNCT3_AND => src1 & src2,
        _ => return,
    };
    set_register(regs, rd(insn), value);
}

/// Conditional branches (OP_BRANCH)
///
/// Only a taken branch touches the pc; a branch that falls through
/// leaves the snapshot untouched and the host advances the pc to
/// the restore address.
pub fn simulate_branch<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let src1 = get_register(regs, rs1(insn));
    let src2 = get_register(regs, rs2(insn));
    let taken = match funct3(insn) {
        FUNCT3_BEQ => src1 == src2,
        FUNCT3_BNE => src1 != src2,
        FUNCT3_BLT => interpret_u64_as_signed(src1) < interpret_u64_as_signed(src2),
        FUNCT3_BGE => interpret_u64_as_signed(src1) >= interpret_u64_as_signed(src2),
        FUNCT3_BLTU => src1 < src2,
        FUNCT3_BGEU => src1 >= src2,
        // 0b010 and 0b011 do not encode branches
        _ => false,
    };
    if taken {
        let offset = interpret_i64_as_unsigned(imm_btype(insn));
        regs.set_pc(regs.pc().wrapping_add(offset));
    }
}

/// Load upper immediate
pub fn simulate_lui<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let value = interpret_i64_as_unsigned(imm_utype(insn));
    set_register(regs, rd(insn), value);
}

/// Add upper immediate to pc
pub fn simulate_auipc<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let offset = interpret_i64_as_unsigned(imm_utype(insn));
    let value = regs.pc().wrapping_add(offset);
    set_register(regs, rd(insn), value);
}

/// Jump and link
pub fn simulate_jal<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let pc = regs.pc();
    let offset = interpret_i64_as_unsigned(imm_jtype(insn));
    set_register(regs, rd(insn), pc.wrapping_add(4));
    regs.set_pc(pc.wrapping_add(offset));
}

/// Jump and link register
///
/// The base register is read before the link register is written:
/// rd and rs1 may be the same register.
pub fn simulate_jalr<R: RegisterSnapshot>(insn: u32, _addr: u64, regs: &mut R) {
    let pc = regs.pc();
    let base = get_register(regs, rs1(insn));
    let offset = interpret_i64_as_unsigned(imm_itype(insn));
    set_register(regs, rd(insn), pc.wrapping_add(4));
    // The ISA clears the low bit of the computed target
    regs.set_pc(base.wrapping_add(offset) & !1);
}

fn opcode_is_word_sized(insn: u32) -> bool {
    insn & OPCODE_MASK == OP_IMM_32
}

/// Truncate to 32 bits, then sign-extend back to 64
fn sign_extend_word(value: u64) -> u64 {
    interpret_i64_as_unsigned(interpret_u64_as_signed(value << 32) >> 32)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::abi::*;
    use crate::encode;
    use crate::registers::TrapFrame;

    fn frame_with(values: &[(u32, u64)], pc: u64) -> TrapFrame {
        let mut frame = TrapFrame::default();
        for &(reg, value) in values {
            frame.gpr[reg as usize] = value;
        }
        frame.pc = pc;
        frame
    }

    #[test]
    fn check_addi_nop_is_no_op() {
        let mut frame = frame_with(&[(A0, 7), (SP, 0x100)], 0x20);
        let before = frame.clone();
        simulate_reg_imm(encode::addi(ZERO, ZERO, 0), 0x20, &mut frame);
        assert_eq!(frame, before);
    }

    #[test]
    fn check_addi_same_register_identity() {
        for reg in 1..32 {
            let mut frame = frame_with(&[(reg, 0xdead_beef)], 0);
            let before = frame.clone();
            simulate_reg_imm(encode::addi(reg, reg, 0), 0, &mut frame);
            assert_eq!(frame, before);
        }
    }

    #[test]
    fn check_addi_wraps() {
        let mut frame = frame_with(&[(A0, u64::MAX)], 0);
        simulate_reg_imm(encode::addi(A1, A0, 2), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], 1);
    }

    #[test]
    fn check_addi_negative_immediate() {
        let mut frame = frame_with(&[(SP, 0x1000)], 0);
        simulate_reg_imm(encode::addi(SP, SP, -16), 0, &mut frame);
        assert_eq!(frame.gpr[SP as usize], 0xff0);
    }

    #[test]
    fn check_addiw_truncates_and_sign_extends() {
        let mut frame = frame_with(&[(A0, 0x7fff_ffff)], 0);
        simulate_reg_imm(encode::addiw(A1, A0, 1), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], 0xffff_ffff_8000_0000);
    }

    #[test]
    fn check_slti_signed_sltiu_unsigned() {
        let mut frame = frame_with(&[(A0, u64::MAX)], 0);
        // -1 < 0 signed
        simulate_reg_imm(encode::slti(A1, A0, 0), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], 1);
        // 0xffff.. is the largest unsigned value
        simulate_reg_imm(encode::sltiu(A2, A0, 0), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 0);
        // but sltiu sign-extends its immediate before comparing
        simulate_reg_imm(encode::sltiu(A3, ZERO, -1), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], 1);
    }

    #[test]
    fn check_bitwise_immediates() {
        let mut frame = frame_with(&[(A0, 0b1100)], 0);
        simulate_reg_imm(encode::xori(A1, A0, 0b1010), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], 0b0110);
        simulate_reg_imm(encode::ori(A2, A0, 0b0011), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 0b1111);
        simulate_reg_imm(encode::andi(A3, A0, 0b0110), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], 0b0100);
        // andi with a negative immediate masks nothing off the top
        let mut frame = frame_with(&[(A0, u64::MAX)], 0);
        simulate_reg_imm(encode::andi(A1, A0, -1), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], u64::MAX);
    }

    #[test]
    fn check_immediate_shifts() {
        let mut frame = frame_with(&[(T3, 0x8000_0000_0000_0000)], 0);
        simulate_reg_imm(encode::srai(T0, T3, 3), 0, &mut frame);
        assert_eq!(frame.gpr[T0 as usize], 0xf000_0000_0000_0000);
        simulate_reg_imm(encode::srli(T1, T3, 3), 0, &mut frame);
        assert_eq!(frame.gpr[T1 as usize], 0x1000_0000_0000_0000);
        let mut frame = frame_with(&[(A0, 1)], 0);
        simulate_reg_imm(encode::slli(A1, A0, 63), 0, &mut frame);
        assert_eq!(frame.gpr[A1 as usize], 0x8000_0000_0000_0000);
    }

    #[test]
    fn check_reg_reg_add_sub() {
        let mut frame = frame_with(&[(A0, 5), (A1, 3)], 0);
        simulate_reg_reg(encode::add(A2, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 8);
        simulate_reg_reg(encode::sub(A3, A1, A0), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], interpret_i64_as_unsigned(-2));
    }

    #[test]
    fn check_reg_reg_compare() {
        let mut frame = frame_with(&[(A0, u64::MAX), (A1, 1)], 0);
        // -1 < 1 signed
        simulate_reg_reg(encode::slt(A2, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 1);
        // 0xffff.. > 1 unsigned
        simulate_reg_reg(encode::sltu(A3, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], 0);
    }

    #[test]
    fn check_reg_reg_shifts_use_low_six_bits() {
        let mut frame = frame_with(&[(A0, 0x8000_0000_0000_0000), (A1, 64 + 1)], 0);
        // shift amount 65 folds to 1
        simulate_reg_reg(encode::srl(A2, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 0x4000_0000_0000_0000);
        simulate_reg_reg(encode::sra(A3, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], 0xc000_0000_0000_0000);
        let mut frame = frame_with(&[(A0, 1), (A1, 63)], 0);
        simulate_reg_reg(encode::sll(A2, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 0x8000_0000_0000_0000);
    }

    #[test]
    fn check_reg_reg_bitwise() {
        let mut frame = frame_with(&[(A0, 0b1100), (A1, 0b1010)], 0);
        simulate_reg_reg(encode::xor(A2, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A2 as usize], 0b0110);
        simulate_reg_reg(encode::or(A3, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A3 as usize], 0b1110);
        simulate_reg_reg(encode::and(A4, A0, A1), 0, &mut frame);
        assert_eq!(frame.gpr[A4 as usize], 0b1000);
    }

    #[test]
    fn check_branch_taken_adds_offset() {
        // beq sp, t0, +6 with sp == t0 == 0 lands the pc on 6
        let mut frame = frame_with(&[], 0);
        simulate_branch(encode::beq(SP, T0, 6), 0, &mut frame);
        assert_eq!(frame.pc, 6);
    }

    #[test]
    fn check_branch_not_taken_leaves_pc() {
        let mut frame = frame_with(&[(T0, 1)], 0x40);
        let before = frame.clone();
        simulate_branch(encode::beq(SP, T0, 6), 0x40, &mut frame);
        assert_eq!(frame, before);
    }

    #[test]
    fn check_branch_backwards() {
        let mut frame = frame_with(&[(A0, 3), (A1, 5)], 0x100);
        simulate_branch(encode::blt(A0, A1, -0x20), 0x100, &mut frame);
        assert_eq!(frame.pc, 0xe0);
    }

    #[test]
    fn check_branch_signedness() {
        let mut frame = frame_with(&[(A0, u64::MAX), (A1, 1)], 0);
        // unsigned: 0xffff.. >= 1
        simulate_branch(encode::bgeu(A0, A1, 8), 0, &mut frame);
        assert_eq!(frame.pc, 8);
        // signed: -1 < 1
        frame.pc = 0;
        simulate_branch(encode::bge(A0, A1, 8), 0, &mut frame);
        assert_eq!(frame.pc, 0);
    }

    #[test]
    fn check_lui() {
        let mut frame = frame_with(&[], 0);
        simulate_lui(encode::lui(T0, 6), 0, &mut frame);
        assert_eq!(frame.gpr[T0 as usize], 6 << 12);
        // sign bit of the upper immediate extends through bit 63
        simulate_lui(encode::lui(T1, 0xfffff), 0, &mut frame);
        assert_eq!(frame.gpr[T1 as usize], interpret_i64_as_unsigned(-4096));
    }

    #[test]
    fn check_auipc_uses_pc_snapshot() {
        let mut frame = frame_with(&[], 0x8000_1000);
        simulate_auipc(encode::auipc(A0, 1), 0x8000_1000, &mut frame);
        assert_eq!(frame.gpr[A0 as usize], 0x8000_2000);
        assert_eq!(frame.pc, 0x8000_1000);
    }

    #[test]
    fn check_jal_links_and_jumps() {
        let mut frame = frame_with(&[], 0x100);
        simulate_jal(encode::jal(RA, 0x34), 0x100, &mut frame);
        assert_eq!(frame.gpr[RA as usize], 0x104);
        assert_eq!(frame.pc, 0x134);
    }

    #[test]
    fn check_jalr_masks_low_bit() {
        // jalr t0, t1, 4 with t1 = 3: target (3 + 4) & ~1 = 6
        let mut frame = frame_with(&[(T1, 3)], 0);
        simulate_jalr(encode::jalr(T0, T1, 4), 0, &mut frame);
        assert_eq!(frame.pc, 6);
        assert_eq!(frame.gpr[T0 as usize], 4);
    }

    #[test]
    fn check_jalr_reads_base_before_linking() {
        // rd == rs1: the old value of the register is the jump base
        let mut frame = frame_with(&[(A0, 0x200)], 0x100);
        simulate_jalr(encode::jalr(A0, A0, 0x10), 0x100, &mut frame);
        assert_eq!(frame.pc, 0x210);
        assert_eq!(frame.gpr[A0 as usize], 0x104);
    }

    #[test]
    fn check_x0_never_written() {
        let mut frame = frame_with(&[(A0, 5)], 0x40);
        simulate_reg_imm(encode::addi(ZERO, A0, 1), 0x40, &mut frame);
        assert_eq!(frame.gpr[0], 0);
        simulate_reg_reg(encode::add(ZERO, A0, A0), 0x40, &mut frame);
        assert_eq!(frame.gpr[0], 0);
        simulate_lui(encode::lui(ZERO, 0x123), 0x40, &mut frame);
        assert_eq!(frame.gpr[0], 0);
        simulate_jal(encode::jal(ZERO, 0x20), 0x40, &mut frame);
        assert_eq!(frame.gpr[0], 0);
    }

    #[test]
    fn check_x0_reads_zero_even_if_slot_dirty() {
        // the wrapper, not the snapshot, enforces the zero register
        let mut frame = frame_with(&[], 0);
        frame.gpr[0] = 0x5555;
        simulate_reg_imm(encode::addi(A0, ZERO, 1), 0, &mut frame);
        assert_eq!(frame.gpr[A0 as usize], 1);
    }

    #[test]
    fn check_non_jump_families_leave_pc() {
        let pc = 0x8000_0000;
        let mut frame = frame_with(&[(A0, 1), (A1, 2)], pc);
        simulate_reg_imm(encode::addi(A2, A0, 1), pc, &mut frame);
        simulate_reg_reg(encode::add(A3, A0, A1), pc, &mut frame);
        simulate_lui(encode::lui(A4, 1), pc, &mut frame);
        simulate_auipc(encode::auipc(A5, 1), pc, &mut frame);
        assert_eq!(frame.pc, pc);
    }

    #[test]
    fn check_selector_dispatch() {
        let mut frame = frame_with(&[(T1, 3)], 0);
        Simulator::Jalr.simulate(encode::jalr(T0, T1, 4), 0, &mut frame);
        assert_eq!(frame.pc, 6);
        assert_eq!(frame.gpr[T0 as usize], 4);
        assert!(Simulator::Jal.is_jump());
        assert!(Simulator::Jalr.is_jump());
        assert!(!Simulator::Branch.is_jump());
        assert!(!Simulator::RegImm.is_jump());
    }
}
