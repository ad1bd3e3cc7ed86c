//! CPU emulation for the simplified 68k-style machine.
//!
//! This module implements the complete architecture:
//! - 0x1001 bytes of big-endian, byte-addressed memory
//! - D0/D1 (32-bit), A0/A1 (16-bit), PC and the H/N/Z/V/C flags
//! - 32 opcodes in two encoding formats, addressing modes 0-7

pub mod alu;
pub mod decode;
pub mod execute;
pub mod fault;
pub mod memory;
pub mod operand;
pub mod registers;

pub use decode::{decode, encode, AddrMode, DataSize, Instruction, Opcode, Operand, Slot};
pub use execute::{Cpu, CpuState, Snapshot};
pub use fault::{Diagnostic, Fault};
pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use operand::OperandResolver;
pub use registers::{Flags, Registers};
