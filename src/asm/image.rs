//! Program image format (`.68b`).
//!
//! A simple text format:
//! - `$` followed by hex digits deposits one byte at the next address,
//!   starting at 0
//! - `/` opens or closes a comment; a comment also ends at end of line
//! - Everything else is ignored

use crate::cpu::Cpu;
use crate::cpu::memory::MemoryError;
use crate::io::Console;
use std::path::Path;
use thiserror::Error;

const COMMENT_MARKER: char = '/';
const HEX_MARKER: char = '$';

/// A parsed program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    /// Bytes in load order, first byte at address 0.
    pub bytes: Vec<u8>,
}

impl ProgramImage {
    /// Parse image text.
    pub fn parse(text: &str) -> Result<Self, ImageError> {
        let mut bytes = Vec::new();

        for (line_num, line) in text.lines().enumerate() {
            let mut in_comment = false;
            let mut chars = line.chars().peekable();

            while let Some(ch) = chars.next() {
                if ch == COMMENT_MARKER {
                    in_comment = !in_comment;
                    continue;
                }
                if in_comment || ch != HEX_MARKER {
                    continue;
                }

                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_hexdigit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }

                let byte = u8::from_str_radix(&digits, 16).map_err(|_| ImageError::ParseError {
                    line: line_num + 1,
                    message: if digits.is_empty() {
                        "expected hex digits after '$'".to_string()
                    } else {
                        format!("${} does not fit in a byte", digits)
                    },
                })?;
                bytes.push(byte);
            }
        }

        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Deposit the image into a machine's memory.
    ///
    /// Returns the number of bytes loaded.
    pub fn load_into<C: Console>(&self, cpu: &mut Cpu<C>) -> Result<usize, ImageError> {
        Ok(cpu.load_program(&self.bytes)?)
    }
}

/// Read and parse an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    ProgramImage::parse(&text)
}

/// Errors that can occur while loading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("image does not fit in memory: {0}")]
    TooLarge(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ScriptedConsole;

    #[test]
    fn test_parse_bytes_and_comments() {
        let text = "\
/ ADD.W D0,D1 / $40 $01
$F8 $00 / HLT $00 $00
/ whole line comment $12
$AB
";
        let image = ProgramImage::parse(text).unwrap();
        assert_eq!(image.bytes, vec![0x40, 0x01, 0xF8, 0x00, 0xAB]);
    }

    #[test]
    fn test_comment_ends_at_line_end() {
        let image = ProgramImage::parse("/ open comment $11\n$22").unwrap();
        assert_eq!(image.bytes, vec![0x22]);
    }

    #[test]
    fn test_single_digit_and_lowercase() {
        let image = ProgramImage::parse("$7 $ff").unwrap();
        assert_eq!(image.bytes, vec![0x07, 0xFF]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            ProgramImage::parse("$00\n$ 12"),
            Err(ImageError::ParseError {
                line: 2,
                message: "expected hex digits after '$'".to_string(),
            })
        );
        assert!(matches!(
            ProgramImage::parse("$123"),
            Err(ImageError::ParseError { line: 1, .. })
        ));
    }

    #[test]
    fn test_load_into() {
        let image = ProgramImage::parse("$F8 $00").unwrap();
        let mut cpu = Cpu::with_console(ScriptedConsole::default());

        assert_eq!(image.load_into(&mut cpu), Ok(2));
        assert_eq!(cpu.mem.image_len(), 2);

        let oversized = ProgramImage { bytes: vec![0; 0x2000] };
        assert!(matches!(oversized.load_into(&mut cpu), Err(ImageError::TooLarge(_))));
        assert!(!cpu.is_halted());
    }
}
