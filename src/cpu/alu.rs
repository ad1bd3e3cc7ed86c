//! Flag derivation and width-aware ALU primitives.
//!
//! All values are raw 32-bit patterns; `DataSize` selects which low bits
//! are meaningful.

use crate::cpu::decode::DataSize;
use crate::cpu::registers::Flags;

/// Sign bits of source, destination and result at one operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignBits {
    pub sm: bool,
    pub dm: bool,
    pub rm: bool,
}

impl SignBits {
    pub fn new(src: u32, dst: u32, result: u32, size: DataSize) -> Self {
        Self {
            sm: size.msb(src),
            dm: size.msb(dst),
            rm: size.msb(result),
        }
    }

    /// V for `dst + src`.
    pub fn add_overflow(self) -> bool {
        let SignBits { sm, dm, rm } = self;
        (sm && dm && !rm) || (!sm && !dm && rm)
    }

    /// C for `dst + src`.
    pub fn add_carry(self) -> bool {
        let SignBits { sm, dm, rm } = self;
        (sm && dm) || (!rm && dm) || (sm && !rm)
    }

    /// V for `dst - src`.
    pub fn sub_overflow(self) -> bool {
        let SignBits { sm, dm, rm } = self;
        (!sm && dm && !rm) || (sm && !dm && rm)
    }

    /// C (borrow) for `dst - src`.
    pub fn sub_carry(self) -> bool {
        let SignBits { sm, dm, rm } = self;
        (sm && !dm) || (rm && !dm) || (sm && rm)
    }
}

/// Z and N from the size-masked result.
pub fn set_zero_negative(flags: &mut Flags, result: u32, size: DataSize) {
    flags.zero = result & size.mask() == 0;
    flags.negative = size.msb(result);
}

/// `dst + src`, setting Z, N, V and C.
pub fn add(flags: &mut Flags, src: u32, dst: u32, size: DataSize) -> u32 {
    let result = dst.wrapping_add(src);
    set_zero_negative(flags, result, size);
    let signs = SignBits::new(src, dst, result, size);
    flags.set_vc(signs.add_overflow(), signs.add_carry());
    result
}

/// `dst - src`, setting Z, N, V and C.
pub fn sub(flags: &mut Flags, src: u32, dst: u32, size: DataSize) -> u32 {
    let result = dst.wrapping_sub(src);
    set_zero_negative(flags, result, size);
    let signs = SignBits::new(src, dst, result, size);
    flags.set_vc(signs.sub_overflow(), signs.sub_carry());
    result
}

/// `0 - dst`, setting Z, N, V and C.
pub fn neg(flags: &mut Flags, dst: u32, size: DataSize) -> u32 {
    let result = 0u32.wrapping_sub(dst);
    set_zero_negative(flags, result, size);
    let signs = SignBits::new(0, dst, result, size);
    flags.set_vc(signs.dm && signs.rm, signs.dm || signs.rm);
    result
}

/// Bitwise result with V and C forced false.
pub fn logic(flags: &mut Flags, result: u32, size: DataSize) -> u32 {
    set_zero_negative(flags, result, size);
    flags.set_vc(false, false);
    result
}

fn bit(value: u32, n: u32) -> bool {
    n < 32 && (value >> n) & 1 == 1
}

/// Logical shift left by `count`; C is the last bit shifted out.
pub fn lsl(flags: &mut Flags, dst: u32, count: u32, size: DataSize) -> u32 {
    let dst = dst & size.mask();
    let result = (if count >= 32 { 0 } else { dst << count }) & size.mask();
    set_zero_negative(flags, result, size);
    let carry = count > 0 && count <= size.bits() && bit(dst, size.bits() - count);
    flags.set_vc(false, carry);
    result
}

/// Logical shift right by `count`; zeros enter from the top regardless of
/// the operand's sign.
pub fn lsr(flags: &mut Flags, dst: u32, count: u32, size: DataSize) -> u32 {
    let dst = dst & size.mask();
    let result = if count >= 32 { 0 } else { dst >> count };
    set_zero_negative(flags, result, size);
    let carry = count > 0 && bit(dst, count - 1);
    flags.set_vc(false, carry);
    result
}

/// Rotate left by `count` modulo the width; C is the bit rotated out.
pub fn rol(flags: &mut Flags, dst: u32, count: u32, size: DataSize) -> u32 {
    let width = size.bits();
    let dst = dst & size.mask();
    let count = count % width;
    let result = if count == 0 {
        dst
    } else {
        ((dst << count) | (dst >> (width - count))) & size.mask()
    };
    set_zero_negative(flags, result, size);
    let carry = count > 0 && bit(dst, width - count);
    flags.set_vc(false, carry);
    result
}

/// Rotate right by `count` modulo the width; C is the bit rotated out.
pub fn ror(flags: &mut Flags, dst: u32, count: u32, size: DataSize) -> u32 {
    let width = size.bits();
    let dst = dst & size.mask();
    let count = count % width;
    let result = if count == 0 {
        dst
    } else {
        ((dst >> count) | (dst << (width - count))) & size.mask()
    };
    set_zero_negative(flags, result, size);
    let carry = count > 0 && bit(dst, count - 1);
    flags.set_vc(false, carry);
    result
}

/// Sign-extend the low 16 bits.
pub fn sign_extend_word(value: u32) -> i32 {
    i32::from(value as u16 as i16)
}
