//! Simulator CPU registers.
//!
//! The machine has:
//! - D0, D1: signed 32-bit data registers
//! - A0, A1: unsigned 16-bit address registers
//! - PC: 16-bit program counter
//! - Status bits C, V, Z, N and H (halt)

use serde::{Serialize, Deserialize};

/// Condition flags.
///
/// Halt is monotonic: once set it stays set until [`Flags::reset`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// C: carry out of (or borrow into) the most significant bit
    pub carry: bool,
    /// V: two's-complement overflow
    pub overflow: bool,
    /// Z: result is zero
    pub zero: bool,
    /// N: result sign bit
    pub negative: bool,
    halt: bool,
}

impl Flags {
    /// Check the H bit.
    pub fn halted(&self) -> bool {
        self.halt
    }

    /// Set the H bit. There is no way to clear it short of a reset.
    pub fn set_halt(&mut self) {
        self.halt = true;
    }

    /// Clear every flag, including Halt.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Set V and C together; logic and move instructions force both false.
    pub fn set_vc(&mut self, overflow: bool, carry: bool) {
        self.overflow = overflow;
        self.carry = carry;
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn bit(value: bool) -> &'static str {
            if value { "TRUE" } else { "FALSE" }
        }
        write!(
            f,
            "H:{} N:{} Z:{} V:{} C:{}",
            bit(self.halt),
            bit(self.negative),
            bit(self.zero),
            bit(self.overflow),
            bit(self.carry)
        )
    }
}

/// The register file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Registers {
    /// D0, D1
    pub d: [i32; 2],
    /// A0, A1
    pub a: [u16; 2],
    /// Program counter
    pub pc: u16,
    /// Status bits
    pub flags: Flags,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all registers and flags to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance the program counter past one 16-bit word.
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(2);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u16) {
        self.pc = addr;
    }

    /// Signed "greater or equal" condition: `!(N xor V)`.
    pub fn greater_or_equal(&self) -> bool {
        !(self.flags.negative ^ self.flags.overflow)
    }
}
