//! # Sim68k
//!
//! A cycle-level simulator of a simplified 68000-style CPU.
//!
//! The machine fetches, decodes and executes one instruction per cycle
//! against a small register file and 4 KiB of memory. Faults halt the
//! machine and are reported through a [`io::Console`].

pub mod cpu;
pub mod asm;
pub mod io;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, Diagnostic, Fault, Instruction, Memory, Opcode, Registers, Snapshot};
pub use asm::{disassemble, load_image, ImageError, ProgramImage};
pub use io::{Console, ScriptedConsole, StdConsole};
