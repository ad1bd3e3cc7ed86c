//! Simulator memory subsystem.
//!
//! A flat, byte-addressable store of 0x1001 cells covering addresses
//! `$0000..=$1000`. Multi-byte values are big-endian.

use crate::cpu::decode::DataSize;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The number of addressable memory cells.
pub const MEMORY_SIZE: usize = 0x1001;

/// Direction of a memory transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Copy an element from memory into the CPU.
    Read,
    /// Copy an element from the CPU into memory.
    Write,
}

/// Simulator memory: `MEMORY_SIZE` byte cells.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u8>,
    /// Number of bytes deposited by the program loader.
    image_len: usize,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
            image_len: 0,
        }
    }

    /// Total number of cells.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Copy an element between memory and `data`.
    ///
    /// On `Read`, `data` receives the 1, 2 or 4 bytes starting at `address`
    /// composed big-endian and zero-extended. On `Write`, the low 1, 2 or 4
    /// bytes of `data` are stored big-endian. The whole range is validated
    /// before any cell is touched, so a failed write leaves memory unchanged.
    pub fn access(
        &mut self,
        size: DataSize,
        address: u16,
        direction: Direction,
        data: &mut u32,
    ) -> Result<(), MemoryError> {
        match direction {
            Direction::Read => *data = self.read(size, address)?,
            Direction::Write => self.write(size, address, *data)?,
        }
        Ok(())
    }

    /// Read a big-endian element of `size` bytes.
    pub fn read(&self, size: DataSize, address: u16) -> Result<u32, MemoryError> {
        let range = self.span(size, address)?;
        Ok(self.cells[range]
            .iter()
            .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte)))
    }

    /// Write the low `size` bytes of `value` big-endian.
    pub fn write(&mut self, size: DataSize, address: u16, value: u32) -> Result<(), MemoryError> {
        let range = self.span(size, address)?;
        let bytes = value.to_be_bytes();
        let skip = bytes.len() - size.bytes();
        self.cells[range].copy_from_slice(&bytes[skip..]);
        Ok(())
    }

    /// Deposit one byte of a program image.
    ///
    /// This is the loader's only write path; it bypasses the transfer
    /// direction and never halts the machine.
    pub fn load(&mut self, address: u16, byte: u8) -> Result<(), MemoryError> {
        let index = usize::from(address);
        if index >= self.cells.len() {
            return Err(MemoryError::OutOfRange { address: index, len: 1 });
        }
        self.cells[index] = byte;
        self.image_len = self.image_len.max(index + 1);
        Ok(())
    }

    /// Length of the loaded program image in bytes.
    pub fn image_len(&self) -> usize {
        self.image_len
    }

    /// Clear all memory to zeros and forget the loaded image.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.image_len = 0;
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u8)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }

    fn span(&self, size: DataSize, address: u16) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = usize::from(address);
        let end = start + size.bytes();
        if end > self.cells.len() {
            return Err(MemoryError::OutOfRange { address: start, len: size.bytes() });
        }
        Ok(start..end)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .field("image_len", &self.image_len)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MemoryError {
    /// Some byte of the element lies outside `[0, MEMORY_SIZE)`.
    #[error("invalid address ${address:04X} for a {len}-byte access")]
    OutOfRange { address: usize, len: usize },
}
