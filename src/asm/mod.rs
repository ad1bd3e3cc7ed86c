//! Program-image tooling.
//!
//! This module provides:
//! - A loader for the `.68b` text image format
//! - A disassembler (image bytes → readable text)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, ImageError, ProgramImage};
