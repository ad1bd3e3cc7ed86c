//! Fault taxonomy and diagnostics.
//!
//! Every fault is fatal for the current run: the controller reports a
//! [`Diagnostic`] through the console and sets the Halt flag.

use crate::cpu::decode::Opcode;
use crate::cpu::memory::MemoryError;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Faults raised inside a fetch-execute cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Fault {
    #[error("invalid address ${address:04X} for a {len}-byte access")]
    OutOfRange { address: usize, len: usize },

    #[error("invalid addressing mode {0}")]
    InvalidAddressingMode(u8),

    #[error("invalid data size {0}")]
    InvalidDataSize(u8),

    #[error("invalid number of operands {0}")]
    InvalidOperandCount(u8),

    #[error("invalid instruction {0}")]
    InvalidInstruction(u8),

    #[error("division by zero")]
    DivisionByZero,

    #[error("no input value: {0}")]
    InputUnavailable(String),
}

impl From<MemoryError> for Fault {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfRange { address, len } => Fault::OutOfRange { address, len },
        }
    }
}

/// What the controller reports when a cycle faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub fault: Fault,
    /// Decoded opcode, if the fault happened after decode.
    pub opcode: Option<Opcode>,
    /// Address of the faulting instruction's opcode word.
    pub pc: u16,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "*** ERROR: {} at PC = ${:04X}", self.fault, self.pc)?;
        if let Some(opcode) = self.opcode {
            write!(f, " for operation {}", opcode)?;
        }
        Ok(())
    }
}
