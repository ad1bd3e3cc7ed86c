//! Instruction decoder.
//!
//! Every instruction starts with a 16-bit opcode word:
//!
//! ```text
//!  15    11 10  9  8  7   5  4  3   1  0
//! [ opcode ][size][P][ M1  ][R1][ M2  ][R2]   Format 1
//! [ opcode ][size][P][ data    ][ M2  ][R2]   Format 2 ("quick")
//! ```
//!
//! `P + 1` is the operand count. Operands in RelativeAbsolute mode are
//! followed by one extension word holding the operand address.

use crate::cpu::fault::Fault;
use serde::{Serialize, Deserialize};

/// Extract the bits `first..=last` of `word`, right-aligned.
///
/// `extract_bits(0x1234, 3, 9) == 0x46`.
pub fn extract_bits(word: u16, first: u8, last: u8) -> u16 {
    debug_assert!(first <= last && last < 16);
    let mask = (2u32 << (last - first)) - 1;
    ((u32::from(word) >> first) & mask) as u16
}

/// Operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSize {
    Byte,
    Word,
    Long,
}

impl DataSize {
    /// Decode the two-bit size field.
    pub fn from_code(code: u8) -> Result<Self, Fault> {
        match code {
            0 => Ok(DataSize::Byte),
            1 => Ok(DataSize::Word),
            2 => Ok(DataSize::Long),
            _ => Err(Fault::InvalidDataSize(code)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Number of bytes moved by one access.
    pub fn bytes(self) -> usize {
        match self {
            DataSize::Byte => 1,
            DataSize::Word => 2,
            DataSize::Long => 4,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    /// Mask selecting the low `bits()` bits.
    pub fn mask(self) -> u32 {
        match self {
            DataSize::Byte => 0xFF,
            DataSize::Word => 0xFFFF,
            DataSize::Long => 0xFFFF_FFFF,
        }
    }

    /// Sign (most significant) bit of `value` at this width.
    pub fn msb(self, value: u32) -> bool {
        (value >> (self.bits() - 1)) & 1 == 1
    }

    /// Suffix used in listings.
    pub fn suffix(self) -> &'static str {
        match self {
            DataSize::Byte => "B",
            DataSize::Word => "W",
            DataSize::Long => "L",
        }
    }

    /// Name used in console messages.
    pub fn name(self) -> &'static str {
        match self {
            DataSize::Byte => "byte",
            DataSize::Word => "word",
            DataSize::Long => "long",
        }
    }
}

/// Addressing mode of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddrMode {
    /// `Dn` (code 0)
    #[default]
    DataRegisterDirect,
    /// `An` (code 1)
    AddressRegisterDirect,
    /// `$addr` taken from an extension word (code 3)
    RelativeAbsolute,
    /// `(An)` (code 4)
    AddressRegisterIndirect,
    /// `(An)+` (code 6)
    PostIncrement,
    /// `-(An)` (code 7)
    PreDecrement,
    /// Codes 2 and 5 have no meaning; using one faults.
    Reserved(u8),
}

impl AddrMode {
    /// Decode the three-bit mode field.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => AddrMode::DataRegisterDirect,
            1 => AddrMode::AddressRegisterDirect,
            3 => AddrMode::RelativeAbsolute,
            4 => AddrMode::AddressRegisterIndirect,
            6 => AddrMode::PostIncrement,
            7 => AddrMode::PreDecrement,
            other => AddrMode::Reserved(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            AddrMode::DataRegisterDirect => 0,
            AddrMode::AddressRegisterDirect => 1,
            AddrMode::RelativeAbsolute => 3,
            AddrMode::AddressRegisterIndirect => 4,
            AddrMode::PostIncrement => 6,
            AddrMode::PreDecrement => 7,
            AddrMode::Reserved(code) => code,
        }
    }

    /// Register-direct modes (no memory access).
    pub fn is_register_direct(self) -> bool {
        matches!(self, AddrMode::DataRegisterDirect | AddrMode::AddressRegisterDirect)
    }
}

/// Instruction encoding family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    /// Two explicit mode/register fields.
    Full,
    /// One mode/register field plus a 4-bit immediate.
    Quick,
}

/// The 32 opcode ids, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Arithmetic ====================
    Add, Addq, Sub, Subq, Muls, Divs, Neg,
    // ==================== Logic ====================
    Clr, Not, And, Or, Eor,
    // ==================== Shift / Rotate ====================
    Lsl, Lsr, Rol, Ror,
    // ==================== Compare ====================
    Cmp, Tst,
    // ==================== Control Flow ====================
    Bra, Bvs, Beq, Bcs, Bge, Ble,
    // ==================== Data Transfer ====================
    Mov, Movq, Exg, Mova,
    // ==================== Console ====================
    Inp, Dsp, Dsr,
    Hlt,
}

impl Opcode {
    /// Every opcode, indexed by id.
    pub const ALL: [Opcode; 32] = [
        Opcode::Add, Opcode::Addq, Opcode::Sub, Opcode::Subq,
        Opcode::Muls, Opcode::Divs, Opcode::Neg, Opcode::Clr,
        Opcode::Not, Opcode::And, Opcode::Or, Opcode::Eor,
        Opcode::Lsl, Opcode::Lsr, Opcode::Rol, Opcode::Ror,
        Opcode::Cmp, Opcode::Tst, Opcode::Bra, Opcode::Bvs,
        Opcode::Beq, Opcode::Bcs, Opcode::Bge, Opcode::Ble,
        Opcode::Mov, Opcode::Movq, Opcode::Exg, Opcode::Mova,
        Opcode::Inp, Opcode::Dsp, Opcode::Dsr, Opcode::Hlt,
    ];

    /// Look up an opcode by its 5-bit id.
    pub fn from_id(id: u8) -> Result<Self, Fault> {
        Self::ALL
            .get(usize::from(id))
            .copied()
            .ok_or(Fault::InvalidInstruction(id))
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Encoding family; a pure function of the id.
    pub fn format(self) -> Format {
        match self {
            Opcode::Addq
            | Opcode::Subq
            | Opcode::Lsl
            | Opcode::Lsr
            | Opcode::Rol
            | Opcode::Ror
            | Opcode::Movq => Format::Quick,
            _ => Format::Full,
        }
    }

    /// Opcodes from DSR on take no operands.
    pub fn has_operands(self) -> bool {
        self < Opcode::Dsr
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Addq => "ADDQ",
            Opcode::Sub => "SUB",
            Opcode::Subq => "SUBQ",
            Opcode::Muls => "MULS",
            Opcode::Divs => "DIVS",
            Opcode::Neg => "NEG",
            Opcode::Clr => "CLR",
            Opcode::Not => "NOT",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Eor => "EOR",
            Opcode::Lsl => "LSL",
            Opcode::Lsr => "LSR",
            Opcode::Rol => "ROL",
            Opcode::Ror => "ROR",
            Opcode::Cmp => "CMP",
            Opcode::Tst => "TST",
            Opcode::Bra => "BRA",
            Opcode::Bvs => "BVS",
            Opcode::Beq => "BEQ",
            Opcode::Bcs => "BCS",
            Opcode::Bge => "BGE",
            Opcode::Ble => "BLE",
            Opcode::Mov => "MOVE",
            Opcode::Movq => "MOVEQ",
            Opcode::Exg => "EXG",
            Opcode::Mova => "MOVEA",
            Opcode::Inp => "INP",
            Opcode::Dsp => "DSP",
            Opcode::Dsr => "DSR",
            Opcode::Hlt => "HLT",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand slot: the source field (M1/R1) or the destination field (M2/R2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }
}

/// One addressing-mode/register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operand {
    pub mode: AddrMode,
    /// Register number for `Dn`/`An` based modes (0 or 1).
    pub reg: usize,
    /// Operand address from the extension word (RelativeAbsolute only),
    /// filled in during operand fetch.
    pub address: u16,
}

impl Operand {
    pub fn new(mode: AddrMode, reg: usize) -> Self {
        Self { mode, reg, address: 0 }
    }

    /// An operand located at an absolute address.
    pub fn absolute(address: u16) -> Self {
        Self { mode: AddrMode::RelativeAbsolute, reg: 0, address }
    }

    pub fn data_reg(reg: usize) -> Self {
        Self::new(AddrMode::DataRegisterDirect, reg)
    }

    pub fn addr_reg(reg: usize) -> Self {
        Self::new(AddrMode::AddressRegisterDirect, reg)
    }
}

/// Decoded operand fields, by encoding family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operands {
    /// Format 1.
    Full { src: Operand, dst: Operand },
    /// Format 2: zero-extended 4-bit immediate and the destination field.
    Quick { data: u8, dst: Operand },
}

/// A decoded instruction; lives for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub size: DataSize,
    /// 1 or 2.
    pub operand_count: u8,
    pub operands: Operands,
}

impl Instruction {
    /// A Format 1 instruction.
    pub fn full(opcode: Opcode, size: DataSize, src: Operand, dst: Operand) -> Self {
        Self { opcode, size, operand_count: 2, operands: Operands::Full { src, dst } }
    }

    /// A Format 1 instruction whose only operand is the first slot.
    pub fn unary(opcode: Opcode, size: DataSize, operand: Operand) -> Self {
        Self {
            opcode,
            size,
            operand_count: 1,
            operands: Operands::Full { src: operand, dst: Operand::default() },
        }
    }

    /// A Format 2 instruction.
    pub fn quick(opcode: Opcode, size: DataSize, data: u8, dst: Operand) -> Self {
        Self { opcode, size, operand_count: 1, operands: Operands::Quick { data: data & 0xF, dst } }
    }

    /// An instruction without operands (DSR, HLT).
    pub fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            size: DataSize::Byte,
            operand_count: 1,
            operands: Operands::Full { src: Operand::default(), dst: Operand::default() },
        }
    }

    /// Operand in `slot`. Format 2 has no first slot.
    pub fn operand(&self, slot: Slot) -> Option<&Operand> {
        match (&self.operands, slot) {
            (Operands::Full { src, .. }, Slot::First) => Some(src),
            (Operands::Full { dst, .. }, Slot::Second) => Some(dst),
            (Operands::Quick { .. }, Slot::First) => None,
            (Operands::Quick { dst, .. }, Slot::Second) => Some(dst),
        }
    }

    pub fn operand_mut(&mut self, slot: Slot) -> Option<&mut Operand> {
        match (&mut self.operands, slot) {
            (Operands::Full { src, .. }, Slot::First) => Some(src),
            (Operands::Full { dst, .. }, Slot::Second) => Some(dst),
            (Operands::Quick { .. }, Slot::First) => None,
            (Operands::Quick { dst, .. }, Slot::Second) => Some(dst),
        }
    }

    /// The quick immediate, 0 for Format 1.
    pub fn data(&self) -> u8 {
        match self.operands {
            Operands::Quick { data, .. } => data,
            Operands::Full { .. } => 0,
        }
    }

    /// Number of RelativeAbsolute extension words following the opcode word.
    pub fn extension_words(&self) -> usize {
        [Slot::First, Slot::Second]
            .into_iter()
            .filter_map(|slot| self.operand(slot))
            .filter(|op| op.mode == AddrMode::RelativeAbsolute)
            .count()
    }
}

/// Decode an opcode word.
///
/// Extension words are not read here; `address` fields are left at zero.
/// DSR and HLT ignore their size field.
pub fn decode(word: u16) -> Result<Instruction, Fault> {
    let opcode = Opcode::from_id(extract_bits(word, 11, 15) as u8)?;
    let size = match DataSize::from_code(extract_bits(word, 9, 10) as u8) {
        Ok(size) => size,
        Err(_) if !opcode.has_operands() => DataSize::Byte,
        Err(fault) => return Err(fault),
    };
    let operand_count = extract_bits(word, 8, 8) as u8 + 1;
    if !(1..=2).contains(&operand_count) {
        return Err(Fault::InvalidOperandCount(operand_count));
    }

    let second = Operand::new(
        AddrMode::from_code(extract_bits(word, 1, 3) as u8),
        usize::from(extract_bits(word, 0, 0)),
    );

    let operands = match opcode.format() {
        Format::Full if opcode.has_operands() => Operands::Full {
            src: Operand::new(
                AddrMode::from_code(extract_bits(word, 5, 7) as u8),
                usize::from(extract_bits(word, 4, 4)),
            ),
            dst: second,
        },
        Format::Full => Operands::Full {
            src: Operand::default(),
            dst: Operand::default(),
        },
        Format::Quick => Operands::Quick {
            data: extract_bits(word, 4, 7) as u8,
            dst: second,
        },
    };

    Ok(Instruction { opcode, size, operand_count, operands })
}

/// Encode an instruction back to its opcode word.
pub fn encode(instr: &Instruction) -> u16 {
    let mut word = u16::from(instr.opcode.id()) << 11
        | u16::from(instr.size.code()) << 9
        | u16::from(instr.operand_count.saturating_sub(1) & 1) << 8;

    let field = |op: &Operand| u16::from(op.mode.code() & 0x7) << 1 | (op.reg as u16 & 1);

    match &instr.operands {
        Operands::Full { src, dst } => {
            word |= field(src) << 4 | field(dst);
        }
        Operands::Quick { data, dst } => {
            word |= u16::from(data & 0xF) << 4 | field(dst);
        }
    }

    word
}
