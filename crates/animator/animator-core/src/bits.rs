//! Bit-field accessors over fixed-width unsigned integers.
//!
//! Every packed flag and sub-byte enum in the controller blob goes through these
//! helpers instead of language-level bit fields so the layout stays identical on
//! every target. Offsets and widths are constants at the call sites; overflowing
//! the container is a programming error and trips a debug assertion.

/// Unsigned integers usable as bit-field containers.
pub trait BitContainer: Copy {
    const BITS: u32;
    fn to_u64(self) -> u64;
    fn from_u64(v: u64) -> Self;
}

macro_rules! impl_bit_container {
    ($($t:ty),*) => {
        $(
            impl BitContainer for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn to_u64(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_u64(v: u64) -> Self {
                    v as $t
                }
            }
        )*
    };
}

impl_bit_container!(u8, u16, u32, u64);

#[inline]
fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Read `width` bits starting at bit `offset`.
#[inline]
pub fn get_bits<T: BitContainer>(container: T, offset: u32, width: u32) -> T {
    debug_assert!(width >= 1, "bit field width must be at least 1");
    debug_assert!(
        offset + width <= T::BITS,
        "bit field [{offset}, {}) overflows a {}-bit container",
        offset + width,
        T::BITS
    );
    T::from_u64((container.to_u64() >> offset) & mask(width))
}

/// Write the low `width` bits of `value` at bit `offset`, leaving every other bit untouched.
#[inline]
pub fn set_bits<T: BitContainer>(container: &mut T, offset: u32, width: u32, value: T) {
    debug_assert!(width >= 1, "bit field width must be at least 1");
    debug_assert!(
        offset + width <= T::BITS,
        "bit field [{offset}, {}) overflows a {}-bit container",
        offset + width,
        T::BITS
    );
    let m = mask(width) << offset;
    let cleared = container.to_u64() & !m;
    *container = T::from_u64(cleared | ((value.to_u64() << offset) & m));
}

#[inline]
pub fn get_bit<T: BitContainer>(container: T, offset: u32) -> bool {
    get_bits(container, offset, 1).to_u64() != 0
}

#[inline]
pub fn set_bit<T: BitContainer>(container: &mut T, offset: u32, value: bool) {
    set_bits(container, offset, 1, T::from_u64(value as u64));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_every_width() {
        for width in 1..=16u32 {
            for offset in 0..=(32 - width) {
                let max = (1u32 << width) - 1;
                for v in [0, 1, max / 2, max] {
                    let mut c = 0u32;
                    set_bits(&mut c, offset, width, v);
                    assert_eq!(get_bits(c, offset, width), v, "w={width} o={offset}");
                }
            }
        }
    }

    #[test]
    fn set_bits_leaves_outside_bits_alone() {
        for width in 1..=16u32 {
            for offset in 0..=(32 - width) {
                let field = (((1u64 << width) - 1) << offset) as u32;
                let mut c = u32::MAX;
                set_bits(&mut c, offset, width, 0);
                assert_eq!(c, !field);
                let mut z = 0u32;
                set_bits(&mut z, offset, width, u32::MAX);
                assert_eq!(z, field);
            }
        }
    }

    #[test]
    fn single_bits_on_u8_and_u16() {
        let mut flags = 0u8;
        set_bit(&mut flags, 3, true);
        assert_eq!(flags, 0b1000);
        assert!(get_bit(flags, 3));
        assert!(!get_bit(flags, 2));
        set_bit(&mut flags, 3, false);
        assert_eq!(flags, 0);

        let mut packed = 0u16;
        set_bits(&mut packed, 0, 15, 0x7fff);
        set_bit(&mut packed, 15, true);
        assert_eq!(packed, 0xffff);
        set_bits(&mut packed, 0, 15, 12);
        assert_eq!(get_bits(packed, 0, 15), 12);
        assert!(get_bit(packed, 15));
    }

    #[test]
    fn value_wider_than_field_is_truncated() {
        let mut c = 0u16;
        set_bits(&mut c, 4, 2, 0b111);
        assert_eq!(c, 0b11_0000);
    }
}
