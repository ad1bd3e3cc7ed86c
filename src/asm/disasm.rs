//! Disassembler for program images.
//!
//! Converts opcode words (and their extension words) back to readable
//! assembly, e.g. `ADD.W D0,$0100`.

use crate::cpu::decode::{decode, AddrMode, Instruction, Operand, Operands, Slot};

/// Format one decoded instruction. Extension-word addresses must already
/// be filled in.
pub fn disassemble_instruction(instr: &Instruction) -> String {
    let opcode = instr.opcode;
    if !opcode.has_operands() {
        return opcode.mnemonic().to_string();
    }

    let head = format!("{}.{}", opcode.mnemonic(), instr.size.suffix());
    match &instr.operands {
        Operands::Quick { data, dst } => format!("{} #{},{}", head, data, format_operand(dst)),
        Operands::Full { src, dst } if instr.operand_count == 2 => {
            format!("{} {},{}", head, format_operand(src), format_operand(dst))
        }
        Operands::Full { src, .. } => format!("{} {}", head, format_operand(src)),
    }
}

/// Disassemble an image, one instruction per line, prefixed with its
/// address.
pub fn disassemble(image: &[u8]) -> String {
    let word_at = |addr: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*image.get(addr)?, *image.get(addr + 1)?]))
    };

    let mut output = String::new();
    let mut addr = 0;

    while addr < image.len() {
        let Some(word) = word_at(addr) else {
            output.push_str(&format!("{:04X}: ??? ${:02X}\n", addr, image[addr]));
            break;
        };

        let start = addr;
        addr += 2;

        let line = match decode(word) {
            Ok(mut instr) => {
                for slot in [Slot::First, Slot::Second] {
                    if let Some(op) = instr.operand_mut(slot) {
                        if op.mode == AddrMode::RelativeAbsolute {
                            op.address = word_at(addr).unwrap_or(0);
                            addr += 2;
                        }
                    }
                }
                disassemble_instruction(&instr)
            }
            Err(_) => format!("??? ${:04X}", word),
        };

        output.push_str(&format!("{:04X}: {}\n", start, line));
    }

    output
}

/// Format an operand in assembler syntax.
fn format_operand(op: &Operand) -> String {
    let reg = op.reg & 1;
    match op.mode {
        AddrMode::DataRegisterDirect => format!("D{}", reg),
        AddrMode::AddressRegisterDirect => format!("A{}", reg),
        AddrMode::RelativeAbsolute => format!("${:04X}", op.address),
        AddrMode::AddressRegisterIndirect => format!("(A{})", reg),
        AddrMode::PostIncrement => format!("(A{})+", reg),
        AddrMode::PreDecrement => format!("-(A{})", reg),
        AddrMode::Reserved(code) => format!("<mode {}>", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, DataSize, Opcode};

    #[test]
    fn test_disassemble_hlt() {
        assert_eq!(disassemble_instruction(&Instruction::bare(Opcode::Hlt)), "HLT");
    }

    #[test]
    fn test_disassemble_add() {
        let add = Instruction::full(
            Opcode::Add,
            DataSize::Word,
            Operand::data_reg(0),
            Operand::absolute(0x0100),
        );
        assert_eq!(disassemble_instruction(&add), "ADD.W D0,$0100");
    }

    #[test]
    fn test_disassemble_quick_and_modes() {
        let addq = Instruction::quick(
            Opcode::Addq,
            DataSize::Long,
            3,
            Operand::new(AddrMode::PostIncrement, 1),
        );
        assert_eq!(disassemble_instruction(&addq), "ADDQ.L #3,(A1)+");

        let clr = Instruction::unary(Opcode::Clr, DataSize::Byte, Operand::new(AddrMode::PreDecrement, 0));
        assert_eq!(disassemble_instruction(&clr), "CLR.B -(A0)");
    }

    #[test]
    fn test_disassemble_image() {
        let bra = Instruction::unary(Opcode::Bra, DataSize::Word, Operand::absolute(0x0006));
        let mut image = encode(&bra).to_be_bytes().to_vec();
        image.extend_from_slice(&[0x00, 0x06]);
        image.extend_from_slice(&[0x06, 0x00]); // ADD with size code 3
        image.extend_from_slice(&encode(&Instruction::bare(Opcode::Hlt)).to_be_bytes());

        let text = disassemble(&image);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, ["0000: BRA.W $0006", "0004: ??? $0600", "0006: HLT"]);
    }

    #[test]
    fn test_trailing_odd_byte() {
        let text = disassemble(&[0xF8, 0x00, 0x12]);
        assert!(text.ends_with("0002: ??? $12\n"));
    }
}
