//! Byte codec for device values.
//!
//! Every scalar on the wire is a little-endian integer of one or two bytes,
//! optionally two's-complement signed, multiplied by a scale factor to get
//! the engineering value. Both directions are pure and never truncate: an
//! unrepresentable value is a [`Error::Validation`].

use crate::error::Error;
use crate::model::ByteWidth;

/// Reject scales that would make decoding meaningless or encoding divide by zero.
pub(crate) fn check_scale(scale: f64) -> Result<(), Error> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "scale_factor must be finite and > 0, got {scale}"
        )))
    }
}

const fn full_range(width: ByteWidth) -> i64 {
    match width {
        ByteWidth::One => 0x100,
        ByteWidth::Two => 0x1_0000,
    }
}

/// Decode one or two little-endian bytes into a scaled value.
///
/// When `signed` is set and the unsigned value is at or above half the
/// representable range, the full range is subtracted (two's complement).
pub fn decode(raw: &[u8], signed: bool, scale: f64) -> Result<f64, Error> {
    check_scale(scale)?;

    let (unsigned, range) = match *raw {
        [b0] => (i64::from(b0), full_range(ByteWidth::One)),
        [b0, b1] => (
            i64::from(u16::from_le_bytes([b0, b1])),
            full_range(ByteWidth::Two),
        ),
        _ => {
            return Err(Error::validation(format!(
                "expected 1 or 2 raw bytes, got {}",
                raw.len()
            )));
        }
    };

    let value = if signed && unsigned >= range / 2 {
        unsigned - range
    } else {
        unsigned
    };

    // |value| <= 0xFFFF, exactly representable.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let value = value as f64;
    Ok(value * scale)
}

/// Encode a scaled value into `byte_count` little-endian bytes.
///
/// Exact inverse of [`decode`]: divide by `scale`, round to the nearest
/// integer, re-bias negatives by the full range, split little-endian.
pub fn encode(value: f64, byte_count: u8, signed: bool, scale: f64) -> Result<Vec<u8>, Error> {
    let width = ByteWidth::try_from(byte_count)?;
    check_scale(scale)?;
    if !value.is_finite() {
        return Err(Error::validation(format!("cannot encode {value}")));
    }

    let range = full_range(width);
    let (min, max) = if signed {
        (-(range / 2), range / 2 - 1)
    } else {
        (0, range - 1)
    };

    let scaled = (value / scale).round();
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    let in_range = scaled >= min as f64 && scaled <= max as f64;
    if !in_range {
        return Err(Error::validation(format!(
            "{value} (raw {scaled}) does not fit a {} {byte_count}-byte integer ({min}..={max}) at scale {scale}",
            if signed { "signed" } else { "unsigned" },
        )));
    }

    // Bounds were checked above, so the cast is exact.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    let mut raw = scaled as i64;
    if raw < 0 {
        raw += range;
    }

    let word = u16::try_from(raw)
        .map_err(|_| Error::validation(format!("raw value {raw} exceeds two bytes")))?;
    let bytes = word.to_le_bytes();
    Ok(bytes[..width.len()].to_vec())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn signed_two_byte_boundaries() {
        assert_eq!(decode(&[0xFF, 0x7F], true, 1.0).unwrap(), 32767.0);
        assert_eq!(decode(&[0x00, 0x80], true, 1.0).unwrap(), -32768.0);
        assert_eq!(decode(&[0x00, 0x80], false, 1.0).unwrap(), 32768.0);
        assert_eq!(decode(&[0xFF, 0xFF], true, 1.0).unwrap(), -1.0);
    }

    #[test]
    fn signed_one_byte_boundaries() {
        assert_eq!(decode(&[0x7F], true, 1.0).unwrap(), 127.0);
        assert_eq!(decode(&[0x80], true, 1.0).unwrap(), -128.0);
        assert_eq!(decode(&[0x80], false, 1.0).unwrap(), 128.0);
    }

    #[test]
    fn scale_factor_applies_after_sign() {
        assert!(close(decode(&[215, 0], true, 0.1).unwrap(), 21.5));
        // -5.0 °C as 0.1-scaled int16: -50 = 0xFFCE
        assert!(close(decode(&[0xCE, 0xFF], true, 0.1).unwrap(), -5.0));
    }

    #[test]
    fn decode_rejects_bad_lengths_and_scales() {
        assert!(matches!(decode(&[], true, 1.0), Err(Error::Validation(_))));
        assert!(matches!(
            decode(&[1, 2, 3], true, 1.0),
            Err(Error::Validation(_))
        ));
        assert!(matches!(decode(&[1], true, -1.0), Err(Error::Validation(_))));
    }

    #[test]
    fn encode_is_little_endian_with_twos_complement() {
        assert_eq!(encode(21.5, 2, true, 0.1).unwrap(), vec![215, 0]);
        assert_eq!(encode(-5.0, 2, true, 0.1).unwrap(), vec![0xCE, 0xFF]);
        assert_eq!(encode(-1.0, 1, true, 1.0).unwrap(), vec![0xFF]);
        assert_eq!(encode(300.0, 2, false, 1.0).unwrap(), vec![0x2C, 0x01]);
    }

    #[test]
    fn encode_never_truncates() {
        assert!(matches!(encode(128.0, 1, true, 1.0), Err(Error::Validation(_))));
        assert!(matches!(encode(-129.0, 1, true, 1.0), Err(Error::Validation(_))));
        assert!(matches!(encode(256.0, 1, false, 1.0), Err(Error::Validation(_))));
        assert!(matches!(encode(-1.0, 2, false, 1.0), Err(Error::Validation(_))));
        assert!(matches!(encode(3276.8, 2, true, 0.1), Err(Error::Validation(_))));
        assert!(matches!(encode(f64::NAN, 2, true, 1.0), Err(Error::Validation(_))));
    }

    #[test]
    fn encode_rejects_unsupported_widths() {
        assert!(matches!(encode(1.0, 0, false, 1.0), Err(Error::Validation(_))));
        assert!(matches!(encode(1.0, 4, false, 1.0), Err(Error::Validation(_))));
    }

    #[test]
    fn decode_inverts_encode_across_representable_values() {
        let cases: &[(u8, bool, f64, &[f64])] = &[
            (1, false, 1.0, &[0.0, 1.0, 127.0, 128.0, 255.0]),
            (1, true, 1.0, &[-128.0, -1.0, 0.0, 127.0]),
            (1, true, 0.5, &[-64.0, -0.5, 0.0, 63.5]),
            (2, false, 0.01, &[0.0, 0.01, 327.68, 655.35]),
            (2, true, 0.1, &[-3276.8, -21.5, -0.1, 0.0, 21.5, 3276.7]),
            (2, true, 10.0, &[-327_680.0, 10.0, 327_670.0]),
        ];

        for &(bytes, signed, scale, values) in cases {
            for &v in values {
                let raw = encode(v, bytes, signed, scale).unwrap();
                assert_eq!(raw.len(), usize::from(bytes));
                let back = decode(&raw, signed, scale).unwrap();
                assert!(
                    close(back, v),
                    "{v} -> {raw:?} -> {back} (bytes={bytes}, signed={signed}, scale={scale})"
                );
            }
        }
    }
}
