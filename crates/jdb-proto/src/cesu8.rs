//! Modified UTF-8 used by the engine for every string on the wire.
//!
//! Each UTF-16 code unit is encoded on its own, surrogate halves included,
//! so a sequence is at most three bytes long and no pairing takes place.

use crate::error::{ProtocolError, Result};

/// Number of bytes `units` occupies once encoded.
pub fn encoded_len(units: &[u16]) -> usize {
    units.iter().map(|u| unit_len(*u)).sum()
}

fn unit_len(unit: u16) -> usize {
    if unit >= 0x7ff {
        3
    } else if unit >= 0x7f {
        2
    } else {
        1
    }
}

/// Encode UTF-16 code units.
///
/// # Errors
///
/// [`ProtocolError::EmptyPayload`] if `units` is empty.
pub fn encode(units: &[u16]) -> Result<Vec<u8>> {
    if units.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    let mut out = Vec::with_capacity(encoded_len(units));
    for &unit in units {
        match unit_len(unit) {
            3 => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            2 => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => out.push(unit as u8),
        }
    }
    Ok(out)
}

/// Encode a Rust string through its UTF-16 representation.
pub fn encode_str(text: &str) -> Result<Vec<u8>> {
    let units: Vec<u16> = text.encode_utf16().collect();
    encode(&units)
}

/// Decode bytes into UTF-16 code units.
///
/// A lead byte of `0x7f` or above starts a multi-byte sequence; bit `0x20`
/// of the lead selects the three-byte form.
///
/// # Errors
///
/// [`ProtocolError::TruncatedText`] when a sequence runs past the input.
pub fn decode(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let lead = u16::from(bytes[i]);
        if lead < 0x7f {
            units.push(lead);
            i += 1;
            continue;
        }

        let len = if lead & 0x20 != 0 { 3 } else { 2 };
        let tail = bytes
            .get(i + 1..i + len)
            .ok_or(ProtocolError::TruncatedText(i))?;
        let unit = if len == 3 {
            ((lead & 0x0f) << 12) | ((u16::from(tail[0]) & 0x3f) << 6) | (u16::from(tail[1]) & 0x3f)
        } else {
            ((lead & 0x1f) << 6) | (u16::from(tail[0]) & 0x3f)
        };
        units.push(unit);
        i += len;
    }
    Ok(units)
}

/// Decode bytes into a `String`.
///
/// Unpaired surrogates become U+FFFD; use [`decode`] when the exact code
/// units matter.
pub fn decode_string(bytes: &[u8]) -> Result<String> {
    Ok(String::from_utf16_lossy(&decode(bytes)?))
}
