/*!
Conversions between wire integers and physical quantities.

Positions travel as 24-bit big-endian fractions of a full rotation. Altitude
may legitimately sit slightly below the horizon, so it is read as a signed
(two's complement) 24-bit value; azimuth is always unsigned.
*/

use crate::protocol::{ARCSEC_PER_ROTATION, GUIDE_RATE_SCALE, POSITION_SCALE};

const U24_MASK: i64 = 0xFF_FFFF;
const U24_SIGN: u32 = 0x80_0000;

/// Read a big-endian 24-bit value from the first three bytes
pub fn decode_u24(bytes: &[u8]) -> Option<u32> {
    match bytes {
        [a, b, c, ..] => Some(u32::from_be_bytes([0, *a, *b, *c])),
        _ => None,
    }
}

/// Write the low 24 bits of `value` big-endian
pub fn encode_u24(value: u32) -> [u8; 3] {
    let [_, a, b, c] = value.to_be_bytes();
    [a, b, c]
}

/// Decode an unsigned position (fraction of a rotation in [0, 1))
pub fn decode_position(bytes: &[u8]) -> Option<f64> {
    decode_u24(bytes).map(|raw| raw as f64 / POSITION_SCALE)
}

/// Decode a signed position (fraction of a rotation in [-0.5, 0.5))
pub fn decode_signed_position(bytes: &[u8]) -> Option<f64> {
    decode_u24(bytes).map(|raw| {
        let signed = if raw & U24_SIGN != 0 {
            raw as i64 - (1 << 24)
        } else {
            raw as i64
        };
        signed as f64 / POSITION_SCALE
    })
}

/// Encode a position, negative values wrap to two's complement
pub fn encode_position(fraction: f64) -> [u8; 3] {
    let counts = (fraction * POSITION_SCALE).round() as i64 & U24_MASK;
    encode_u24(counts as u32)
}

/// Convert a wire guide rate (1/1024 arcsec/s) to rotations per second
pub fn guide_rate_to_rotations(raw: u32) -> f64 {
    raw as f64 / GUIDE_RATE_SCALE / ARCSEC_PER_ROTATION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u24_roundtrip() {
        assert_eq!(decode_u24(&[0x12, 0x34, 0x56]), Some(0x123456));
        assert_eq!(encode_u24(0x123456), [0x12, 0x34, 0x56]);
        assert_eq!(decode_u24(&[0x12, 0x34]), None);
    }

    #[test]
    fn test_position_encoding() {
        assert_eq!(encode_position(0.5), [0x80, 0x00, 0x00]);
        assert_eq!(encode_position(0.0), [0x00, 0x00, 0x00]);
        assert_eq!(decode_position(&[0x40, 0x00, 0x00]), Some(0.25));
    }

    #[test]
    fn test_negative_altitude() {
        let bytes = encode_position(-0.01);
        assert_eq!(bytes[0], 0xFD);
        let decoded = decode_signed_position(&bytes).unwrap();
        assert!((decoded + 0.01).abs() < 1e-6);

        // The same bytes read unsigned land near the top of the circle
        let unsigned = decode_position(&bytes).unwrap();
        assert!((unsigned - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_guide_rate_units() {
        // Sidereal rate, roughly 15 arcsec/s
        let rate = guide_rate_to_rotations(15 * 1024);
        assert!((rate - 15.0 / ARCSEC_PER_ROTATION).abs() < 1e-15);
    }
}
