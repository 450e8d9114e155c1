//! Fixed-point encodings shared by every parameter block.
//!
//! | Format | Storage | Fractional bits | Range |
//! |--------|---------|-----------------|-------|
//! | s1615  | `i32`   | 15              | ±65536 |
//! | u032   | `u32`   | 32              | [0, 1] |
//! | weight | `u16`/`i16` | per matrix (see `WeightRange`) | format-dependent |
//!
//! Encoding rounds to the nearest representable value. Values outside the
//! storage range are *not* clamped: the encoders return `None` and the
//! caller decides how to report it.

/// Fractional bits of the s1615 format.
pub const S1615_FRACTIONAL_BITS: u32 = 15;

/// Fractional bits of the u032 format.
pub const U032_FRACTIONAL_BITS: u32 = 32;

/// Encode `value` with `fractional_bits` fractional bits.
///
/// Returns `None` for non-finite input or results outside `i64`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn to_fixed(value: f64, fractional_bits: u32) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let scaled = (value * 2f64.powi(fractional_bits as i32)).round();
    if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return None;
    }
    Some(scaled as i64)
}

/// Decode a fixed-point value with `fractional_bits` fractional bits.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn from_fixed(raw: i64, fractional_bits: u32) -> f64 {
    raw as f64 / 2f64.powi(fractional_bits as i32)
}

/// Encode as signed Q16.15.
#[must_use]
pub fn to_s1615(value: f64) -> Option<i32> {
    to_fixed(value, S1615_FRACTIONAL_BITS).and_then(|raw| i32::try_from(raw).ok())
}

/// Decode signed Q16.15.
#[must_use]
pub fn from_s1615(raw: i32) -> f64 {
    from_fixed(i64::from(raw), S1615_FRACTIONAL_BITS)
}

/// Encode as unsigned 0.32.
///
/// 1.0 itself is not representable; it rounds to the largest u032 value.
#[must_use]
pub fn to_u032(value: f64) -> Option<u32> {
    if !(0.0..=1.0).contains(&value) {
        return None;
    }
    let raw = to_fixed(value, U032_FRACTIONAL_BITS)?;
    Some(u32::try_from(raw).unwrap_or(u32::MAX))
}

/// Decode unsigned 0.32.
#[must_use]
pub fn from_u032(raw: u32) -> f64 {
    from_fixed(i64::from(raw), U032_FRACTIONAL_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1615_round_trip() {
        for v in [-65535.5, -1.0, 0.0, 0.000_030_517_578_125, 1.5, 3.3, 1234.567] {
            let raw = to_s1615(v).unwrap();
            assert!((from_s1615(raw) - v).abs() <= 1.0 / 32768.0);
        }
    }

    #[test]
    fn s1615_rounds_to_nearest() {
        // 1.5 LSB rounds away from zero, 1.4 LSB rounds down
        assert_eq!(to_s1615(1.5 / 32768.0), Some(2));
        assert_eq!(to_s1615(1.4 / 32768.0), Some(1));
        assert_eq!(to_s1615(1.0), Some(32768));
    }

    #[test]
    fn s1615_out_of_range() {
        assert_eq!(to_s1615(70_000.0), None);
        assert_eq!(to_s1615(f64::NAN), None);
    }

    #[test]
    fn u032_bounds() {
        assert_eq!(to_u032(0.0), Some(0));
        assert_eq!(to_u032(0.5), Some(1 << 31));
        assert_eq!(to_u032(1.0), Some(u32::MAX));
        assert_eq!(to_u032(1.01), None);
        assert_eq!(to_u032(-0.1), None);
    }
}
