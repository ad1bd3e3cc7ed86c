//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Each opcode id indexes a micro-program in [`Cpu::HANDLERS`]; the
//! micro-programs stage values in scratch variables (source, destination,
//! result), update the flags through [`alu`], and store the result.

use crate::cpu::alu::{self, sign_extend_word};
use crate::cpu::decode::{self, AddrMode, DataSize, Format, Instruction, Opcode, Operand, Slot};
use crate::cpu::fault::{Diagnostic, Fault};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::operand::OperandResolver;
use crate::cpu::registers::{Flags, Registers};
use crate::io::{Console, InputRequest, StdConsole};
use serde::{Serialize, Deserialize};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// The Halt flag is clear.
    Running,
    /// The Halt flag is set, by HLT, a fault, or an external request.
    Halted,
}

/// A micro-program.
type Handler<C> = fn(&mut Cpu<C>, &Instruction) -> Result<(), Fault>;

/// The simulated machine: register file, memory and the console it talks to.
pub struct Cpu<C = StdConsole> {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Completed fetch-execute cycles, including faulted ones.
    pub cycles: u64,
    resolver: OperandResolver,
    /// Instruction decoded in the most recent cycle.
    last_instr: Option<Instruction>,
    last_fault: Option<Diagnostic>,
    console: C,
}

impl Cpu<StdConsole> {
    /// Create a new CPU with zeroed state, talking to stdin/stdout.
    pub fn new() -> Self {
        Self::with_console(StdConsole)
    }
}

impl Default for Cpu<StdConsole> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Console> Cpu<C> {
    /// Create a new CPU with zeroed state and the given console.
    pub fn with_console(console: C) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            cycles: 0,
            resolver: OperandResolver::new(),
            last_instr: None,
            last_fault: None,
            console,
        }
    }

    /// Reset registers and flags (PC = 0, Halt clear). Memory is kept, so a
    /// loaded program can be run again.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.resolver.begin_cycle();
        self.cycles = 0;
        self.last_instr = None;
        self.last_fault = None;
    }

    /// Deposit a program image at address 0 through `Memory::load`.
    ///
    /// Memory is cleared first, so nothing of a previous image survives.
    /// Returns the number of bytes loaded. Nothing is written if the image
    /// does not fit, and the machine is never halted by a failed load.
    pub fn load_program(&mut self, image: &[u8]) -> Result<usize, MemoryError> {
        if image.len() > self.mem.capacity() {
            return Err(MemoryError::OutOfRange {
                address: self.mem.capacity(),
                len: image.len() - self.mem.capacity(),
            });
        }
        self.mem.clear();
        for (address, &byte) in image.iter().enumerate() {
            self.mem.load(address as u16, byte)?;
        }
        Ok(self.mem.image_len())
    }

    /// Run exactly one fetch-execute cycle.
    ///
    /// A fault is reported through the console, recorded as
    /// [`Cpu::last_fault`], and halts the machine. Stepping a halted
    /// machine does nothing.
    pub fn step(&mut self) -> CpuState {
        if self.is_halted() {
            return CpuState::Halted;
        }

        let pc = self.regs.pc;
        self.resolver.begin_cycle();
        self.last_instr = None;

        let outcome = self.cycle();
        self.cycles += 1;

        if let Err(fault) = outcome {
            let diagnostic = Diagnostic {
                fault,
                opcode: self.last_instr.map(|instr| instr.opcode),
                pc,
            };
            self.console.report_fault(&diagnostic);
            self.last_fault = Some(diagnostic);
            self.regs.flags.set_halt();
        }

        self.state()
    }

    /// Run until halt.
    ///
    /// Returns the number of cycles executed.
    pub fn run(&mut self) -> u64 {
        let start_cycles = self.cycles;

        while !self.is_halted() {
            self.step();
        }

        self.cycles - start_cycles
    }

    /// Run for at most `max_cycles` cycles.
    pub fn run_limited(&mut self, max_cycles: u64) -> u64 {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while !self.is_halted() && self.cycles < limit {
            self.step();
        }

        self.cycles - start_cycles
    }

    /// Set Halt from outside; the controller stops at the next phase
    /// boundary.
    pub fn request_halt(&mut self) {
        self.regs.flags.set_halt();
    }

    /// The phases of one cycle. Halt is re-checked after every phase.
    fn cycle(&mut self) -> Result<(), Fault> {
        let word = self.fetch_opcode()?;
        if self.is_halted() {
            return Ok(());
        }

        let mut instr = decode::decode(word)?;
        self.last_instr = Some(instr);
        if self.is_halted() {
            return Ok(());
        }

        self.fetch_operands(&mut instr)?;
        self.last_instr = Some(instr);
        if self.is_halted() {
            return Ok(());
        }

        self.execute(&instr)
    }

    fn fetch_opcode(&mut self) -> Result<u16, Fault> {
        let pc = self.regs.advance_pc();
        Ok(self.mem.read(DataSize::Word, pc)? as u16)
    }

    /// Read the extension word of every RelativeAbsolute operand, first
    /// slot first.
    fn fetch_operands(&mut self, instr: &mut Instruction) -> Result<(), Fault> {
        if instr.operand_count == 2 && instr.opcode.format() == Format::Quick {
            return Err(Fault::InvalidOperandCount(instr.operand_count));
        }

        for slot in [Slot::First, Slot::Second] {
            if let Some(op) = instr.operand_mut(slot) {
                if op.mode == AddrMode::RelativeAbsolute {
                    let pc = self.regs.advance_pc();
                    op.address = self.mem.read(DataSize::Word, pc)? as u16;
                }
            }
        }

        Ok(())
    }

    /// Dispatch a decoded instruction to its micro-program.
    fn execute(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let handler = Self::HANDLERS[usize::from(instr.opcode.id())];
        handler(self, instr)
    }

    /// Micro-programs, indexed by opcode id.
    const HANDLERS: [Handler<C>; 32] = [
        Self::exec_add,    // ADD
        Self::exec_addq,   // ADDQ
        Self::exec_sub,    // SUB
        Self::exec_subq,   // SUBQ
        Self::exec_muls,   // MULS
        Self::exec_divs,   // DIVS
        Self::exec_neg,    // NEG
        Self::exec_clr,    // CLR
        Self::exec_not,    // NOT
        Self::exec_logic,  // AND
        Self::exec_logic,  // OR
        Self::exec_logic,  // EOR
        Self::exec_shift,  // LSL
        Self::exec_shift,  // LSR
        Self::exec_shift,  // ROL
        Self::exec_shift,  // ROR
        Self::exec_cmp,    // CMP
        Self::exec_tst,    // TST
        Self::exec_branch, // BRA
        Self::exec_branch, // BVS
        Self::exec_branch, // BEQ
        Self::exec_branch, // BCS
        Self::exec_branch, // BGE
        Self::exec_branch, // BLE
        Self::exec_mov,    // MOVE
        Self::exec_movq,   // MOVEQ
        Self::exec_exg,    // EXG
        Self::exec_mova,   // MOVEA
        Self::exec_inp,    // INP
        Self::exec_dsp,    // DSP
        Self::exec_dsr,    // DSR
        Self::exec_hlt,    // HLT
    ];

    // ==================== Operand transfer ====================

    fn operand(instr: &Instruction, slot: Slot) -> Result<Operand, Fault> {
        instr
            .operand(slot)
            .copied()
            .ok_or(Fault::InvalidOperandCount(instr.operand_count))
    }

    fn fill(&mut self, instr: &Instruction, slot: Slot, size: DataSize) -> Result<u32, Fault> {
        let op = Self::operand(instr, slot)?;
        self.resolver.fill_temp(&mut self.regs, &self.mem, slot, &op, size)
    }

    fn store(&mut self, instr: &Instruction, slot: Slot, size: DataSize, value: u32) -> Result<(), Fault> {
        let op = Self::operand(instr, slot)?;
        self.resolver.store_result(&mut self.regs, &mut self.mem, slot, &op, size, value)
    }

    fn require_size(instr: &Instruction, size: DataSize) -> Result<(), Fault> {
        if instr.size == size {
            Ok(())
        } else {
            Err(Fault::InvalidDataSize(instr.size.code()))
        }
    }

    fn require_mode(op: &Operand, allowed: impl Fn(AddrMode) -> bool) -> Result<(), Fault> {
        if allowed(op.mode) {
            Ok(())
        } else {
            Err(Fault::InvalidAddressingMode(op.mode.code()))
        }
    }

    // ==================== Arithmetic ====================

    fn exec_add(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = self.fill(instr, Slot::First, size)?;
        let dst = self.fill(instr, Slot::Second, size)?;
        let result = alu::add(&mut self.regs.flags, src, dst, size);
        self.store(instr, Slot::Second, size, result)
    }

    fn exec_addq(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = u32::from(instr.data());
        let dst = self.fill(instr, Slot::Second, size)?;
        let result = alu::add(&mut self.regs.flags, src, dst, size);
        self.store(instr, Slot::Second, size, result)
    }

    fn exec_sub(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = self.fill(instr, Slot::First, size)?;
        let dst = self.fill(instr, Slot::Second, size)?;
        let result = alu::sub(&mut self.regs.flags, src, dst, size);
        self.store(instr, Slot::Second, size, result)
    }

    fn exec_subq(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = u32::from(instr.data());
        let dst = self.fill(instr, Slot::Second, size)?;
        let result = alu::sub(&mut self.regs.flags, src, dst, size);
        self.store(instr, Slot::Second, size, result)
    }

    /// Word x word -> long. Z and N follow the low word.
    fn exec_muls(&mut self, instr: &Instruction) -> Result<(), Fault> {
        Self::require_size(instr, DataSize::Word)?;
        let src = sign_extend_word(self.fill(instr, Slot::First, DataSize::Word)?);
        let dst = sign_extend_word(self.fill(instr, Slot::Second, DataSize::Word)?);
        let result = src.wrapping_mul(dst) as u32;
        alu::logic(&mut self.regs.flags, result, instr.size);
        self.store(instr, Slot::Second, DataSize::Long, result)
    }

    /// Long / word -> remainder in the high word, quotient in the low word.
    ///
    /// A negative divisor is handled by negating both operands, so the
    /// remainder takes the sign of the negated dividend unless the quotient
    /// is zero. A quotient outside 16 bits sets V; the result is stored
    /// regardless.
    fn exec_divs(&mut self, instr: &Instruction) -> Result<(), Fault> {
        Self::require_size(instr, DataSize::Long)?;
        let divisor = sign_extend_word(self.fill(instr, Slot::First, DataSize::Word)?);
        if divisor == 0 {
            return Err(Fault::DivisionByZero);
        }
        let dividend = self.fill(instr, Slot::Second, DataSize::Long)? as i32;

        let (num, den) = if divisor < 0 {
            (dividend.wrapping_neg(), -divisor)
        } else {
            (dividend, divisor)
        };
        let quotient = num.wrapping_div(den);
        let remainder = if divisor < 0 && quotient == 0 {
            dividend % den
        } else {
            num % den
        };

        let result = (remainder as u32 & 0xFFFF) << 16 | (quotient as u32 & 0xFFFF);
        alu::set_zero_negative(&mut self.regs.flags, result, DataSize::Long);
        self.regs.flags.set_vc(i16::try_from(quotient).is_err(), false);
        self.store(instr, Slot::Second, DataSize::Long, result)
    }

    fn exec_neg(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let dst = self.fill(instr, Slot::First, size)?;
        let result = alu::neg(&mut self.regs.flags, dst, size);
        self.store(instr, Slot::First, size, result)
    }

    // ==================== Logic ====================

    fn exec_clr(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let result = alu::logic(&mut self.regs.flags, 0, instr.size);
        self.store(instr, Slot::First, instr.size, result)
    }

    fn exec_not(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let dst = self.fill(instr, Slot::First, size)?;
        let result = alu::logic(&mut self.regs.flags, !dst, size);
        self.store(instr, Slot::First, size, result)
    }

    /// AND, OR, EOR.
    fn exec_logic(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = self.fill(instr, Slot::First, size)?;
        let dst = self.fill(instr, Slot::Second, size)?;
        let value = match instr.opcode {
            Opcode::And => dst & src,
            Opcode::Or => dst | src,
            _ => dst ^ src,
        };
        let result = alu::logic(&mut self.regs.flags, value, size);
        self.store(instr, Slot::Second, size, result)
    }

    // ==================== Shift / Rotate ====================

    /// LSL, LSR, ROL, ROR by the quick immediate.
    fn exec_shift(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let count = u32::from(instr.data());
        let dst = self.fill(instr, Slot::Second, size)?;
        let flags = &mut self.regs.flags;
        let result = match instr.opcode {
            Opcode::Lsl => alu::lsl(flags, dst, count, size),
            Opcode::Lsr => alu::lsr(flags, dst, count, size),
            Opcode::Rol => alu::rol(flags, dst, count, size),
            _ => alu::ror(flags, dst, count, size),
        };
        self.store(instr, Slot::Second, size, result)
    }

    // ==================== Compare ====================

    /// Flags of `dst - src`; the difference is discarded.
    fn exec_cmp(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let src = self.fill(instr, Slot::First, size)?;
        let dst = self.fill(instr, Slot::Second, size)?;
        alu::sub(&mut self.regs.flags, src, dst, size);
        Ok(())
    }

    fn exec_tst(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let dst = self.fill(instr, Slot::First, instr.size)?;
        alu::logic(&mut self.regs.flags, dst, instr.size);
        Ok(())
    }

    // ==================== Control Flow ====================

    /// BRA and the conditional branches. The target must be a word-sized
    /// RelativeAbsolute operand.
    fn exec_branch(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let target = Self::operand(instr, Slot::First)?;
        Self::require_mode(&target, |mode| mode == AddrMode::RelativeAbsolute)?;
        Self::require_size(instr, DataSize::Word)?;

        let Flags { carry, overflow, zero, .. } = self.regs.flags;
        let taken = match instr.opcode {
            Opcode::Bvs => overflow,
            Opcode::Beq => zero,
            Opcode::Bcs => carry,
            Opcode::Bge => self.regs.greater_or_equal(),
            Opcode::Ble => !self.regs.greater_or_equal(),
            _ => true,
        };
        if taken {
            self.regs.jump(target.address);
        }
        Ok(())
    }

    // ==================== Data Transfer ====================

    fn exec_mov(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let src = self.fill(instr, Slot::First, instr.size)?;
        self.store(instr, Slot::Second, instr.size, src)
    }

    fn exec_movq(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let result = alu::logic(&mut self.regs.flags, u32::from(instr.data()), instr.size);
        self.store(instr, Slot::Second, instr.size, result)
    }

    /// Swap two register-direct operands.
    fn exec_exg(&mut self, instr: &Instruction) -> Result<(), Fault> {
        for slot in [Slot::First, Slot::Second] {
            Self::require_mode(&Self::operand(instr, slot)?, AddrMode::is_register_direct)?;
        }
        let size = instr.size;
        let src = self.fill(instr, Slot::First, size)?;
        let dst = self.fill(instr, Slot::Second, size)?;
        self.store(instr, Slot::Second, size, src)?;
        self.store(instr, Slot::First, size, dst)?;
        self.regs.flags.set_vc(false, false);
        Ok(())
    }

    /// Load the first operand's absolute address into an address register.
    fn exec_mova(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let src = Self::operand(instr, Slot::First)?;
        Self::require_mode(&src, |mode| mode == AddrMode::RelativeAbsolute)?;
        Self::require_mode(&Self::operand(instr, Slot::Second)?, |mode| {
            mode == AddrMode::AddressRegisterDirect
        })?;
        Self::require_size(instr, DataSize::Word)?;
        self.store(instr, Slot::Second, DataSize::Word, u32::from(src.address))
    }

    // ==================== Console ====================

    /// Human-readable target of an operand, without applying side effects.
    fn describe_target(&self, op: &Operand, size: DataSize) -> Result<String, Fault> {
        let reg = op.reg & 1;
        let address = match op.mode {
            AddrMode::DataRegisterDirect => return Ok(format!("the register DR{}", reg)),
            AddrMode::AddressRegisterDirect => return Ok(format!("the register AR{}", reg)),
            AddrMode::RelativeAbsolute => op.address,
            AddrMode::AddressRegisterIndirect | AddrMode::PostIncrement => self.regs.a[reg],
            AddrMode::PreDecrement => self.regs.a[reg].wrapping_sub(size.bytes() as u16),
            AddrMode::Reserved(code) => return Err(Fault::InvalidAddressingMode(code)),
        };
        Ok(format!("the memory address ${:04X}", address))
    }

    fn exec_inp(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let target = Self::operand(instr, Slot::First)?;
        let request = InputRequest {
            size: instr.size,
            target: self.describe_target(&target, instr.size)?,
        };
        let value = self
            .console
            .read_value(&request)
            .map_err(|e| Fault::InputUnavailable(e.to_string()))?;

        let result = alu::logic(&mut self.regs.flags, value as u32, instr.size);
        self.store(instr, Slot::First, instr.size, result)
    }

    fn exec_dsp(&mut self, instr: &Instruction) -> Result<(), Fault> {
        let size = instr.size;
        let op = Self::operand(instr, Slot::First)?;
        let value = self.fill(instr, Slot::First, size)?;

        let reg = op.reg & 1;
        let label = match op.mode {
            AddrMode::DataRegisterDirect => format!("[ DR{} ]", reg),
            AddrMode::AddressRegisterDirect => format!("[ AR{} ]", reg),
            AddrMode::RelativeAbsolute => format!("[${:04X}]", op.address),
            AddrMode::AddressRegisterIndirect => format!("[${:04X}]", self.regs.a[reg]),
            AddrMode::PostIncrement | AddrMode::PreDecrement | AddrMode::Reserved(_) => {
                let address = self.resolver.adjusted_address(Slot::First).unwrap_or(self.regs.a[reg]);
                format!("[${:04X}]", address)
            }
        };

        let line = format!("{} = ${:X} ({})", label, value & size.mask(), size.name());
        self.console.write_line(&line);
        Ok(())
    }

    fn exec_dsr(&mut self, _instr: &Instruction) -> Result<(), Fault> {
        let line = format!("Status Bits = {}", self.regs.flags);
        self.console.write_line(&line);
        Ok(())
    }

    fn exec_hlt(&mut self, _instr: &Instruction) -> Result<(), Fault> {
        self.regs.flags.set_halt();
        Ok(())
    }

    // ==================== Queries ====================

    /// Get the instruction decoded in the most recent cycle.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// The fault that halted the machine, if any.
    pub fn last_fault(&self) -> Option<&Diagnostic> {
        self.last_fault.as_ref()
    }

    /// Cycles run since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.regs.flags.halted()
    }

    pub fn state(&self) -> CpuState {
        if self.is_halted() {
            CpuState::Halted
        } else {
            CpuState::Running
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Capture the programmer-visible state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state(),
            cycles: self.cycles,
            pc: self.regs.pc,
            d: self.regs.d,
            a: self.regs.a,
            flags: self.regs.flags,
            fault: self.last_fault.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Cpu<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("last_fault", &self.last_fault)
            .finish()
    }
}

/// Programmer-visible machine state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: CpuState,
    pub cycles: u64,
    pub pc: u16,
    pub d: [i32; 2],
    pub a: [u16; 2],
    pub flags: Flags,
    pub fault: Option<Diagnostic>,
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "State:  {:?} after {} cycles", self.state, self.cycles)?;
        writeln!(f, "PC:     ${:04X}", self.pc)?;
        for (n, value) in self.d.iter().enumerate() {
            writeln!(f, "DR{}:    ${:08X} ({})", n, *value as u32, value)?;
        }
        for (n, value) in self.a.iter().enumerate() {
            writeln!(f, "AR{}:    ${:04X}", n, value)?;
        }
        write!(f, "Status: {}", self.flags)?;
        if let Some(fault) = &self.fault {
            write!(f, "\nFault:  {}", fault)?;
        }
        Ok(())
    }
}
