//! Whole-program runs through the public API.

use sim68k::cpu::decode::{encode, AddrMode, DataSize, Instruction, Opcode, Operand, Slot};
use sim68k::{Cpu, CpuState, Fault, ProgramImage, ScriptedConsole};

/// Sum 1..=n, with n read by INP and the sum shown by DSP.
const SUM_PROGRAM: &str = "\
/ 0000 / $E2 $00          / INP.W D0
/ 0002 / $3C $10          / CLR.L D1
/ 0004 / $03 $01          / ADD.W D0,D1
/ 0006 / $1A $10          / SUBQ.W #1,D0
/ 0008 / $A2 $60 $00 $10  / BEQ.W $0010
/ 000C / $92 $60 $00 $04  / BRA.W $0004
/ 0010 / $EA $10          / DSP.W D1
/ 0012 / $F8 $00          / HLT
";

fn assemble(instructions: &[Instruction]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for instr in instructions {
        bytes.extend_from_slice(&encode(instr).to_be_bytes());
        for slot in [Slot::First, Slot::Second] {
            if let Some(op) = instr.operand(slot) {
                if op.mode == AddrMode::RelativeAbsolute {
                    bytes.extend_from_slice(&op.address.to_be_bytes());
                }
            }
        }
    }
    bytes
}

fn machine(replies: &[&str], image: &[u8]) -> Cpu<ScriptedConsole> {
    let mut cpu = Cpu::with_console(ScriptedConsole::new(replies.iter().copied()));
    cpu.load_program(image).unwrap();
    cpu
}

#[test]
fn sum_program_from_image_text() {
    let image = ProgramImage::parse(SUM_PROGRAM).unwrap();
    assert_eq!(image.len(), 0x14);

    let mut cpu = Cpu::with_console(ScriptedConsole::new(["5"]));
    assert_eq!(image.load_into(&mut cpu), Ok(0x14));

    let cycles = cpu.run();

    assert_eq!(cycles, 23);
    assert_eq!(cpu.state(), CpuState::Halted);
    assert!(cpu.last_fault().is_none());
    assert_eq!(cpu.regs.d[1], 15);
    assert_eq!(cpu.console().prompts, ["Enter a value (word) for the register DR0: "]);
    assert_eq!(cpu.console().lines, ["[ DR1 ] = $F (word)"]);
}

#[test]
fn sum_program_runs_again_after_reset() {
    let image = ProgramImage::parse(SUM_PROGRAM).unwrap();
    let mut cpu = Cpu::with_console(ScriptedConsole::new(["3", "4"]));
    image.load_into(&mut cpu).unwrap();

    cpu.run();
    assert_eq!(cpu.regs.d[1], 6);

    cpu.reset();
    cpu.run();
    assert_eq!(cpu.regs.d[1], 10);
    assert_eq!(cpu.console().lines, ["[ DR1 ] = $6 (word)", "[ DR1 ] = $A (word)"]);
}

#[test]
fn post_increment_walks_an_array() {
    let a0_post = Operand::new(AddrMode::PostIncrement, 0);
    let program = assemble(&[
        Instruction::full(Opcode::Mova, DataSize::Word, Operand::absolute(0x0100), Operand::addr_reg(0)),
        Instruction::full(Opcode::Mov, DataSize::Word, a0_post, Operand::data_reg(0)),
        Instruction::full(Opcode::Add, DataSize::Word, a0_post, Operand::data_reg(0)),
        Instruction::full(Opcode::Add, DataSize::Word, a0_post, Operand::data_reg(0)),
        Instruction::full(Opcode::Mov, DataSize::Word, Operand::data_reg(0), a0_post),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);
    for (i, value) in [10u32, 20, 30].into_iter().enumerate() {
        cpu.mem.write(DataSize::Word, 0x0100 + 2 * i as u16, value).unwrap();
    }

    cpu.run();

    assert_eq!(cpu.regs.d[0], 60);
    assert_eq!(cpu.regs.a[0], 0x0108);
    assert_eq!(cpu.mem.read(DataSize::Word, 0x0106).unwrap(), 60);
}

#[test]
fn read_modify_write_through_post_increment() {
    let program = assemble(&[
        Instruction::quick(Opcode::Addq, DataSize::Long, 1, Operand::new(AddrMode::PostIncrement, 1)),
        Instruction::unary(Opcode::Clr, DataSize::Byte, Operand::new(AddrMode::PostIncrement, 1)),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);
    cpu.regs.a[1] = 0x0200;
    cpu.mem.write(DataSize::Long, 0x0200, 0x0000_00FF).unwrap();
    cpu.mem.write(DataSize::Byte, 0x0204, 0x55).unwrap();

    cpu.run();

    assert_eq!(cpu.mem.read(DataSize::Long, 0x0200).unwrap(), 0x0000_0100);
    assert_eq!(cpu.mem.read(DataSize::Byte, 0x0204).unwrap(), 0);
    assert_eq!(cpu.regs.a[1], 0x0205);
}

#[test]
fn pre_decrement_pushes_like_a_stack() {
    let push = Operand::new(AddrMode::PreDecrement, 1);
    let program = assemble(&[
        Instruction::full(Opcode::Mov, DataSize::Long, Operand::data_reg(0), push),
        Instruction::full(Opcode::Mov, DataSize::Word, Operand::data_reg(1), push),
        Instruction::unary(Opcode::Dsp, DataSize::Word, Operand::new(AddrMode::AddressRegisterIndirect, 1)),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);
    cpu.regs.a[1] = 0x0300;
    cpu.regs.d[0] = 0x0102_0304;
    cpu.regs.d[1] = 0x0000_BEEF;

    cpu.run();

    assert_eq!(cpu.regs.a[1], 0x02FA);
    assert_eq!(cpu.mem.read(DataSize::Long, 0x02FC).unwrap(), 0x0102_0304);
    assert_eq!(cpu.console().lines, ["[$02FA] = $BEEF (word)"]);
}

#[test]
fn invalid_size_faults_before_decode_completes() {
    let mut cpu = machine(&[], &[0x06, 0x00]);

    assert_eq!(cpu.step(), CpuState::Halted);

    let fault = cpu.last_fault().unwrap();
    assert_eq!(fault.fault, Fault::InvalidDataSize(3));
    assert_eq!(fault.opcode, None);
    assert_eq!(fault.to_string(), "*** ERROR: invalid data size 3 at PC = $0000");
    assert_eq!(cpu.console().faults.len(), 1);
}

#[test]
fn reserved_mode_faults_at_operand_access() {
    let program = assemble(&[
        Instruction::quick(Opcode::Movq, DataSize::Byte, 1, Operand::data_reg(0)),
        Instruction::unary(Opcode::Tst, DataSize::Byte, Operand::new(AddrMode::Reserved(5), 0)),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);

    cpu.run();

    let fault = cpu.last_fault().unwrap();
    assert_eq!(fault.fault, Fault::InvalidAddressingMode(5));
    assert_eq!(fault.opcode, Some(Opcode::Tst));
    assert_eq!(fault.pc, 2);
    assert_eq!(
        fault.to_string(),
        "*** ERROR: invalid addressing mode 5 at PC = $0002 for operation TST"
    );
    assert_eq!(cpu.regs.d[0], 1);
}

#[test]
fn operand_out_of_range_halts() {
    let program = assemble(&[
        Instruction::full(Opcode::Mov, DataSize::Long, Operand::data_reg(0), Operand::absolute(0x0FFE)),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);

    cpu.run();

    assert_eq!(
        cpu.last_fault().unwrap().fault,
        Fault::OutOfRange { address: 0x0FFE, len: 4 }
    );
    assert_eq!(cpu.mem.read(DataSize::Word, 0x0FFE).unwrap(), 0);
}

#[test]
fn running_off_the_end_of_memory_halts() {
    // BRA to the last cell; the opcode word would straddle the end.
    let program = assemble(&[Instruction::unary(Opcode::Bra, DataSize::Word, Operand::absolute(0x1000))]);
    let mut cpu = machine(&[], &program);

    assert_eq!(cpu.run(), 2);
    assert_eq!(
        cpu.last_fault().unwrap().fault,
        Fault::OutOfRange { address: 0x1000, len: 2 }
    );
}

#[test]
fn halt_is_sticky() {
    let program = assemble(&[Instruction::bare(Opcode::Hlt), Instruction::bare(Opcode::Dsr)]);
    let mut cpu = machine(&[], &program);

    cpu.run();
    for _ in 0..3 {
        assert_eq!(cpu.step(), CpuState::Halted);
    }
    assert_eq!(cpu.run_limited(10), 0);
    assert!(cpu.console().lines.is_empty());
    assert_eq!(cpu.cycles(), 1);
}

#[test]
fn inp_into_memory_and_dsr() {
    let program = assemble(&[
        Instruction::unary(Opcode::Inp, DataSize::Long, Operand::absolute(0x0400)),
        Instruction::bare(Opcode::Dsr),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&["-2"], &program);

    cpu.run();

    assert_eq!(cpu.mem.read(DataSize::Long, 0x0400).unwrap(), 0xFFFF_FFFE);
    assert_eq!(
        cpu.console().prompts,
        ["Enter a value (long) for the memory address $0400: "]
    );
    assert_eq!(
        cpu.console().lines,
        ["Status Bits = H:FALSE N:TRUE Z:FALSE V:FALSE C:FALSE"]
    );
}

#[test]
fn unparsable_input_faults() {
    let program = assemble(&[Instruction::unary(Opcode::Inp, DataSize::Byte, Operand::data_reg(0))]);
    let mut cpu = machine(&["twelve"], &program);

    cpu.run();

    assert!(matches!(
        cpu.last_fault().unwrap().fault,
        Fault::InputUnavailable(_)
    ));
    assert_eq!(cpu.regs.d[0], 0);
}

#[test]
fn snapshot_serializes_to_json() {
    let program = assemble(&[
        Instruction::quick(Opcode::Movq, DataSize::Long, 7, Operand::data_reg(1)),
        Instruction::bare(Opcode::Hlt),
    ]);
    let mut cpu = machine(&[], &program);
    cpu.run();

    let json = serde_json::to_value(cpu.snapshot()).unwrap();

    assert_eq!(json["state"], "Halted");
    assert_eq!(json["pc"], 4);
    assert_eq!(json["d"][1], 7);
    assert_eq!(json["flags"]["zero"], false);
    assert!(json["fault"].is_null());
}
