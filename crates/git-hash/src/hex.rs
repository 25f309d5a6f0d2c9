//! Lowercase hex encoding for object ids.

use crate::HashError;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

pub fn hex_to_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Decode `hex` into `buf`; the input must be exactly `buf.len() * 2` chars.
pub fn hex_decode(hex: &str, buf: &mut [u8]) -> Result<(), HashError> {
    let hex = hex.as_bytes();
    if hex.len() != buf.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: buf.len() * 2,
            actual: hex.len(),
        });
    }
    for (i, out) in buf.iter_mut().enumerate() {
        let digit = |pos: usize| {
            nibble(hex[pos]).ok_or(HashError::InvalidHex {
                position: pos,
                character: hex[pos] as char,
            })
        };
        *out = (digit(i * 2)? << 4) | digit(i * 2 + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        assert_eq!(hex_to_string(&[0xde, 0xad, 0x00, 0xff]), "dead00ff");
    }

    #[test]
    fn decode_reports_position() {
        let mut buf = [0u8; 4];
        match hex_decode("deadgoof", &mut buf) {
            Err(HashError::InvalidHex { position: 4, character: 'g' }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_mixed_case() {
        let mut buf = [0u8; 4];
        hex_decode("DeAdBeEf", &mut buf).unwrap();
        assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef]);
    }
}
