//! Console ports for the interactive opcodes.
//!
//! INP reads a value, DSP and DSR print lines, and the controller reports
//! faults. The CPU only talks to a [`Console`]; where the text comes from or
//! goes to is up to the implementation.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::cpu::decode::DataSize;
use crate::cpu::fault::Diagnostic;
use thiserror::Error;

/// A pending INP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub size: DataSize,
    /// Where the value will be stored, e.g. `the register DR0`.
    pub target: String,
}

impl std::fmt::Display for InputRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Enter a value ({}) for {}: ", self.size.name(), self.target)
    }
}

/// Errors a console can report back to INP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("end of input")]
    EndOfInput,

    #[error("cannot parse {0:?} as a number")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Input/output collaborator of the CPU.
pub trait Console {
    /// Block until a numeric value is supplied for `request`.
    fn read_value(&mut self, request: &InputRequest) -> Result<i32, ConsoleError>;

    /// Emit one line of DSP/DSR output.
    fn write_line(&mut self, line: &str);

    /// Fault side channel.
    fn report_fault(&mut self, diagnostic: &Diagnostic) {
        self.write_line(&diagnostic.to_string());
    }
}

/// Parse a number the way C's `strtol(text, NULL, 0)` reads it: optional
/// sign, then `0x` hex, leading-zero octal or decimal, up to the first
/// character that is not a digit of that radix. Values beyond the 64-bit
/// range saturate, then the result is truncated to 32 bits, so `0xFFFFFFFF`
/// reads as `-1`.
///
/// Unlike `strtol`, text with no digits at all is an error rather than 0.
pub fn parse_value(text: &str) -> Result<i32, ConsoleError> {
    const LIMIT: i128 = i64::MAX as i128 + 1;

    let trimmed = text.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let hex_digit_follows = body.as_bytes().get(2).is_some_and(u8::is_ascii_hexdigit);
    let (radix, digits) = if (body.starts_with("0x") || body.starts_with("0X")) && hex_digit_follows {
        (16, &body[2..])
    } else if body.starts_with('0') {
        (8, body)
    } else {
        (10, body)
    };

    let mut magnitude: Option<i128> = None;
    for digit in digits.chars().map_while(|ch| ch.to_digit(radix)) {
        let acc = magnitude.unwrap_or(0) * i128::from(radix) + i128::from(digit);
        magnitude = Some(acc.min(LIMIT));
    }
    let magnitude = magnitude.ok_or_else(|| ConsoleError::Parse(trimmed.to_string()))?;

    let value = if negative { -magnitude } else { magnitude };
    let value = value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;

    Ok(value as u32 as i32)
}

/// Console on the process's stdin/stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_value(&mut self, request: &InputRequest) -> Result<i32, ConsoleError> {
        let mut stdout = std::io::stdout();
        write!(stdout, "{}", request).map_err(|e| ConsoleError::Io(e.to_string()))?;
        stdout.flush().map_err(|e| ConsoleError::Io(e.to_string()))?;

        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| ConsoleError::Io(e.to_string()))?;
        if read == 0 {
            return Err(ConsoleError::EndOfInput);
        }
        parse_value(&line)
    }

    fn write_line(&mut self, line: &str) {
        println!("{}", line);
    }

    fn report_fault(&mut self, diagnostic: &Diagnostic) {
        eprintln!("{}", diagnostic);
    }
}

/// Console fed from a fixed list of replies; records everything printed.
#[derive(Debug, Default, Clone)]
pub struct ScriptedConsole {
    replies: VecDeque<String>,
    /// Prompts seen by INP, in order.
    pub prompts: Vec<String>,
    /// Lines written by DSP/DSR.
    pub lines: Vec<String>,
    /// Reported faults.
    pub faults: Vec<Diagnostic>,
}

impl ScriptedConsole {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

impl Console for ScriptedConsole {
    fn read_value(&mut self, request: &InputRequest) -> Result<i32, ConsoleError> {
        self.prompts.push(request.to_string());
        let reply = self.replies.pop_front().ok_or(ConsoleError::EndOfInput)?;
        parse_value(&reply)
    }

    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn report_fault(&mut self, diagnostic: &Diagnostic) {
        self.faults.push(diagnostic.clone());
    }
}
