use std::ops::RangeInclusive;

/// Bit manipulation helpers used all over the decoder and executor.
///
/// Indexes go from lsb to msb (right to left). Out of range indexes are a
/// programming error and trip a `debug_assert!`.
pub trait Bits: Copy {
    /// Width of the implementing type in bits.
    const WIDTH: u8;

    fn get_bit(self, bit_idx: u8) -> bool;

    fn set_bit(&mut self, bit_idx: u8, value: bool);

    /// Extracts the inclusive range and moves it down to bit 0.
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self;

    /// Returns a sign-extended copy of the lowest `number_of_bits` bits.
    fn sign_extended(self, number_of_bits: u8) -> Self;

    fn is_bit_on(self, bit_idx: u8) -> bool {
        self.get_bit(bit_idx)
    }

    fn is_bit_off(self, bit_idx: u8) -> bool {
        !self.get_bit(bit_idx)
    }

    fn set_bit_on(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, true);
    }

    fn set_bit_off(&mut self, bit_idx: u8) {
        self.set_bit(bit_idx, false);
    }

    /// True only when every bit of the range is set.
    fn are_bits_on(self, bits_range: RangeInclusive<u8>) -> bool {
        bits_range.into_iter().all(|idx| self.get_bit(idx))
    }
}

macro_rules! impl_bits {
    ($t:ty, $signed:ty) => {
        impl Bits for $t {
            const WIDTH: u8 = <$t>::BITS as u8;

            fn get_bit(self, bit_idx: u8) -> bool {
                debug_assert!(bit_idx < Self::WIDTH);
                (self >> bit_idx) & 1 == 1
            }

            fn set_bit(&mut self, bit_idx: u8, value: bool) {
                debug_assert!(bit_idx < Self::WIDTH);
                if value {
                    *self |= 1 << bit_idx;
                } else {
                    *self &= !(1 << bit_idx);
                }
            }

            fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
                let start = *bits_range.start();
                let end = *bits_range.end();
                debug_assert!(start <= end && end < Self::WIDTH);

                let length = end - start + 1;
                let mask = if length == Self::WIDTH {
                    <$t>::MAX
                } else {
                    (1 << length) - 1
                };

                (self >> start) & mask
            }

            fn sign_extended(self, number_of_bits: u8) -> Self {
                debug_assert!(number_of_bits > 0 && number_of_bits <= Self::WIDTH);
                // Moves the sign bit to the msb, then an arithmetic shift
                // drags it back down over the unused high bits.
                let unused = Self::WIDTH - number_of_bits;
                (((self << unused) as $signed) >> unused) as $t
            }
        }
    };
}

impl_bits!(u32, i32);
impl_bits!(u16, i16);
impl_bits!(u8, i8);
