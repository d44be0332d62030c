//! Integer register indices by ABI name
//!
//! The standard RISC-V calling convention names for x0..x31, usable
//! wherever an encoder or snapshot accessor wants a register index.

/// The constant value 0
pub const ZERO: u32 = 0;
/// Return address
pub const RA: u32 = 1;
/// Stack pointer
pub const SP: u32 = 2;
/// Global pointer
pub const GP: u32 = 3;
/// Thread pointer
pub const TP: u32 = 4;
// Temporaries
pub const T0: u32 = 5;
pub const T1: u32 = 6;
pub const T2: u32 = 7;
/// Frame pointer (alias s0)
pub const FP: u32 = 8;
pub const S0: u32 = 8;
pub const S1: u32 = 9;
// Function arguments / return values
pub const A0: u32 = 10;
pub const A1: u32 = 11;
pub const A2: u32 = 12;
pub const A3: u32 = 13;
pub const A4: u32 = 14;
pub const A5: u32 = 15;
pub const A6: u32 = 16;
pub const A7: u32 = 17;
// Saved registers
pub const S2: u32 = 18;
pub const S3: u32 = 19;
pub const S4: u32 = 20;
pub const S5: u32 = 21;
pub const S6: u32 = 22;
pub const S7: u32 = 23;
pub const S8: u32 = 24;
pub const S9: u32 = 25;
pub const S10: u32 = 26;
pub const S11: u32 = 27;
// Temporaries
pub const T3: u32 = 28;
pub const T4: u32 = 29;
pub const T5: u32 = 30;
pub const T6: u32 = 31;
