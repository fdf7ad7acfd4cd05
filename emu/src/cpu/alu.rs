//! # Flags and the Barrel Shifter
//!
//! Pure helpers shared by the ARM and Thumb executors: NZCV for additions
//! and subtractions, the four shift kinds with every encoding special case,
//! rotated immediates and the multiplier early-termination count.
//!
//! ```text
//!                      immediate amount        register amount (Rs[7:0])
//! LSL  #0 / 0          value, C unchanged      value, C unchanged
//! LSR  #0 / 32         LSR #32: 0, C=b31       0, C=b31
//! ASR  #0 / >=32       ASR #32: sign, C=b31    sign, C=b31
//! ROR  #0 / 32*k       RRX: C>>b31, C=b0       value, C=b31
//! LSL/LSR  >32                 -               0, C=0
//! ```

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

/// `first + second + carry_in`.
#[must_use]
pub fn add_inner_op(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    let (partial, carry_a) = first.overflowing_add(second);
    let (result, carry_b) = partial.overflowing_add(u32::from(carry_in));

    ArithmeticOpResult {
        result,
        carry: carry_a || carry_b,
        // Both operands share a sign that the result does not.
        overflow: ((first ^ result) & (second ^ result)).get_bit(31),
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

/// `first - second - !carry_in`. The carry out is NOT borrow.
#[must_use]
pub fn sub_inner_op(first: u32, second: u32, carry_in: bool) -> ArithmeticOpResult {
    add_inner_op(first, !second, carry_in)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShifterOutput {
    pub value: u32,
    pub carry: bool,
}

const fn out(value: u32, carry: bool) -> ShifterOutput {
    ShifterOutput { value, carry }
}

/// Shift encoded in the instruction (`amount` in `0..=31`).
#[must_use]
pub fn shift_by_immediate(kind: ShiftKind, amount: u32, value: u32, carry_in: bool) -> ShifterOutput {
    debug_assert!(amount < 32);
    let n = amount as u8;

    match (kind, amount) {
        (ShiftKind::Lsl, 0) => out(value, carry_in),
        (ShiftKind::Lsl, _) => out(value << amount, value.get_bit(32 - n)),
        (ShiftKind::Lsr, 0) => out(0, value.get_bit(31)),
        (ShiftKind::Lsr, _) => out(value >> amount, value.get_bit(n - 1)),
        (ShiftKind::Asr, 0) => out(((value as i32) >> 31) as u32, value.get_bit(31)),
        (ShiftKind::Asr, _) => out(((value as i32) >> amount) as u32, value.get_bit(n - 1)),
        // RRX
        (ShiftKind::Ror, 0) => out((u32::from(carry_in) << 31) | (value >> 1), value.get_bit(0)),
        (ShiftKind::Ror, _) => out(value.rotate_right(amount), value.get_bit(n - 1)),
    }
}

/// Shift by the bottom byte of a register.
#[must_use]
pub fn shift_by_register(kind: ShiftKind, amount: u32, value: u32, carry_in: bool) -> ShifterOutput {
    let amount = amount & 0xFF;
    if amount == 0 {
        return out(value, carry_in);
    }

    match kind {
        ShiftKind::Lsl => match amount {
            1..=31 => out(value << amount, value.get_bit(32 - amount as u8)),
            32 => out(0, value.get_bit(0)),
            _ => out(0, false),
        },
        ShiftKind::Lsr => match amount {
            1..=31 => out(value >> amount, value.get_bit(amount as u8 - 1)),
            32 => out(0, value.get_bit(31)),
            _ => out(0, false),
        },
        ShiftKind::Asr => match amount {
            1..=31 => out(((value as i32) >> amount) as u32, value.get_bit(amount as u8 - 1)),
            _ => out(((value as i32) >> 31) as u32, value.get_bit(31)),
        },
        ShiftKind::Ror => match amount % 32 {
            0 => out(value, value.get_bit(31)),
            r => out(value.rotate_right(r), value.get_bit(r as u8 - 1)),
        },
    }
}

/// 8-bit immediate rotated right by an even amount. C only changes when
/// the rotation is non-zero.
#[must_use]
pub fn rotated_immediate(base: u32, rotate: u32, carry_in: bool) -> ShifterOutput {
    let value = base.rotate_right(rotate);
    if rotate == 0 {
        out(value, carry_in)
    } else {
        out(value, value.get_bit(31))
    }
}

/// Internal cycles the multiplier spends on `rs` before terminating.
///
/// Signed multiplies also stop early when the top bits are all ones.
#[must_use]
pub const fn multiply_cycles(rs: u32, signed: bool) -> u32 {
    let mut m = 1;
    while m < 4 {
        let top = rs >> (8 * m);
        if top == 0 || (signed && top == u32::MAX >> (8 * m)) {
            return m;
        }
        m += 1;
    }
    4
}
