//! Operand resolution.
//!
//! Moves values between the scratch registers of the execution unit and
//! the register file or memory, according to an operand's addressing mode.
//!
//! Post-increment and pre-decrement adjust the address register once per
//! slot and cycle. The first access through a slot (read or write) applies
//! the adjustment and remembers the effective address; a later access
//! through the same slot in the same cycle reuses it. So `ADD D0,(A0)+`
//! reads and writes the same cell and leaves `A0` advanced by exactly one
//! operand width.

use crate::cpu::decode::{AddrMode, DataSize, Operand, Slot};
use crate::cpu::fault::Fault;
use crate::cpu::memory::Memory;
use crate::cpu::registers::Registers;
use serde::{Serialize, Deserialize};

/// Where an operand lives once its mode has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    DataRegister(usize),
    AddressRegister(usize),
    Memory(u16),
}

/// Per-cycle operand bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperandResolver {
    /// Effective address of each slot whose address register has already
    /// been adjusted in this cycle.
    adjusted: [Option<u16>; 2],
}

impl OperandResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous instruction's adjustments.
    pub fn begin_cycle(&mut self) {
        self.adjusted = [None; 2];
    }

    /// Effective memory address `slot` resolved to in this cycle, if its
    /// address register was adjusted.
    pub fn adjusted_address(&self, slot: Slot) -> Option<u16> {
        self.adjusted[slot.index()]
    }

    /// Resolve `op` to a location, applying its address-register side
    /// effect the first time `slot` is resolved in this cycle.
    pub fn locate(
        &mut self,
        regs: &mut Registers,
        slot: Slot,
        op: &Operand,
        size: DataSize,
    ) -> Result<Location, Fault> {
        let reg = op.reg & 1;
        let width = size.bytes() as u16;

        let location = match op.mode {
            AddrMode::DataRegisterDirect => Location::DataRegister(reg),
            AddrMode::AddressRegisterDirect => Location::AddressRegister(reg),
            AddrMode::RelativeAbsolute => Location::Memory(op.address),
            AddrMode::AddressRegisterIndirect => Location::Memory(regs.a[reg]),
            AddrMode::PostIncrement => match self.adjusted[slot.index()] {
                Some(address) => Location::Memory(address),
                None => {
                    let address = regs.a[reg];
                    regs.a[reg] = address.wrapping_add(width);
                    self.adjusted[slot.index()] = Some(address);
                    Location::Memory(address)
                }
            },
            AddrMode::PreDecrement => match self.adjusted[slot.index()] {
                Some(address) => Location::Memory(address),
                None => {
                    let address = regs.a[reg].wrapping_sub(width);
                    regs.a[reg] = address;
                    self.adjusted[slot.index()] = Some(address);
                    Location::Memory(address)
                }
            },
            AddrMode::Reserved(code) => return Err(Fault::InvalidAddressingMode(code)),
        };

        Ok(location)
    }

    /// Read an operand into a scratch value.
    ///
    /// Data registers are zero-filled above `size`; address registers are
    /// always read at full width.
    pub fn fill_temp(
        &mut self,
        regs: &mut Registers,
        mem: &Memory,
        slot: Slot,
        op: &Operand,
        size: DataSize,
    ) -> Result<u32, Fault> {
        let value = match self.locate(regs, slot, op, size)? {
            Location::DataRegister(reg) => regs.d[reg] as u32 & size.mask(),
            Location::AddressRegister(reg) => u32::from(regs.a[reg]),
            Location::Memory(address) => mem.read(size, address)?,
        };
        Ok(value)
    }

    /// Write a scratch value back to an operand.
    ///
    /// Data registers only change in their low `size` bits; address
    /// registers take the low word whatever the size.
    pub fn store_result(
        &mut self,
        regs: &mut Registers,
        mem: &mut Memory,
        slot: Slot,
        op: &Operand,
        size: DataSize,
        value: u32,
    ) -> Result<(), Fault> {
        match self.locate(regs, slot, op, size)? {
            Location::DataRegister(reg) => {
                let old = regs.d[reg] as u32;
                regs.d[reg] = ((old & !size.mask()) | (value & size.mask())) as i32;
            }
            Location::AddressRegister(reg) => regs.a[reg] = value as u16,
            Location::Memory(address) => mem.write(size, address, value)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (OperandResolver, Registers, Memory) {
        (OperandResolver::new(), Registers::new(), Memory::new())
    }

    #[test]
    fn test_data_register_partial_widths() {
        let (mut res, mut regs, mut mem) = setup();
        regs.d[1] = 0x1234_5678;
        let op = Operand::data_reg(1);

        assert_eq!(res.fill_temp(&mut regs, &mem, Slot::First, &op, DataSize::Byte).unwrap(), 0x78);
        assert_eq!(res.fill_temp(&mut regs, &mem, Slot::First, &op, DataSize::Word).unwrap(), 0x5678);

        res.store_result(&mut regs, &mut mem, Slot::First, &op, DataSize::Byte, 0xFFFF_FFAB).unwrap();
        assert_eq!(regs.d[1], 0x1234_56AB);

        res.store_result(&mut regs, &mut mem, Slot::First, &op, DataSize::Word, 0xCDEF).unwrap();
        assert_eq!(regs.d[1], 0x1234_CDEF);
    }

    #[test]
    fn test_address_register_full_width() {
        let (mut res, mut regs, mut mem) = setup();
        regs.a[0] = 0xABCD;
        let op = Operand::addr_reg(0);

        assert_eq!(res.fill_temp(&mut regs, &mem, Slot::Second, &op, DataSize::Byte).unwrap(), 0xABCD);

        res.store_result(&mut regs, &mut mem, Slot::Second, &op, DataSize::Long, 0x1111_2222).unwrap();
        assert_eq!(regs.a[0], 0x2222);
    }

    #[test]
    fn test_post_increment_applies_once() {
        let (mut res, mut regs, mut mem) = setup();
        regs.a[0] = 0x0100;
        mem.write(DataSize::Word, 0x0100, 0x0005).unwrap();
        let op = Operand::new(AddrMode::PostIncrement, 0);

        let value = res.fill_temp(&mut regs, &mem, Slot::Second, &op, DataSize::Word).unwrap();
        assert_eq!(value, 5);
        assert_eq!(regs.a[0], 0x0102);

        res.store_result(&mut regs, &mut mem, Slot::Second, &op, DataSize::Word, 6).unwrap();
        assert_eq!(regs.a[0], 0x0102);
        assert_eq!(mem.read(DataSize::Word, 0x0100).unwrap(), 6);
        assert_eq!(res.adjusted_address(Slot::Second), Some(0x0100));

        res.begin_cycle();
        res.fill_temp(&mut regs, &mem, Slot::Second, &op, DataSize::Word).unwrap();
        assert_eq!(regs.a[0], 0x0104);
    }

    #[test]
    fn test_pre_decrement_write() {
        let (mut res, mut regs, mut mem) = setup();
        regs.a[1] = 0x0200;
        let op = Operand::new(AddrMode::PreDecrement, 1);

        res.store_result(&mut regs, &mut mem, Slot::Second, &op, DataSize::Long, 0xDEAD_BEEF).unwrap();
        assert_eq!(regs.a[1], 0x01FC);
        assert_eq!(mem.read(DataSize::Long, 0x01FC).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_slots_are_tracked_separately() {
        let (mut res, mut regs, mem) = setup();
        regs.a[0] = 0x0100;
        let op = Operand::new(AddrMode::PostIncrement, 0);

        res.fill_temp(&mut regs, &mem, Slot::First, &op, DataSize::Byte).unwrap();
        res.fill_temp(&mut regs, &mem, Slot::Second, &op, DataSize::Byte).unwrap();
        assert_eq!(regs.a[0], 0x0102);
    }

    #[test]
    fn test_indirect_and_absolute() {
        let (mut res, mut regs, mut mem) = setup();
        regs.a[1] = 0x0300;
        mem.write(DataSize::Byte, 0x0300, 0x42).unwrap();

        let indirect = Operand::new(AddrMode::AddressRegisterIndirect, 1);
        assert_eq!(res.fill_temp(&mut regs, &mem, Slot::First, &indirect, DataSize::Byte).unwrap(), 0x42);
        assert_eq!(regs.a[1], 0x0300);

        let absolute = Operand::absolute(0x0300);
        res.store_result(&mut regs, &mut mem, Slot::Second, &absolute, DataSize::Byte, 0x99).unwrap();
        assert_eq!(mem.read(DataSize::Byte, 0x0300).unwrap(), 0x99);
    }

    #[test]
    fn test_reserved_mode_faults() {
        let (mut res, mut regs, mem) = setup();
        let op = Operand::new(AddrMode::Reserved(5), 0);

        assert_eq!(
            res.fill_temp(&mut regs, &mem, Slot::First, &op, DataSize::Word),
            Err(Fault::InvalidAddressingMode(5))
        );
    }

    #[test]
    fn test_out_of_range_operand() {
        let (mut res, mut regs, mem) = setup();
        regs.a[0] = 0x1000;
        let op = Operand::new(AddrMode::AddressRegisterIndirect, 0);

        assert_eq!(
            res.fill_temp(&mut regs, &mem, Slot::First, &op, DataSize::Word),
            Err(Fault::OutOfRange { address: 0x1000, len: 2 })
        );
    }
}
