use crate::domain::model::{CastSequence, HexagramCode, HexagramEncoding};
use crate::utils::error::Result;

/// Maps six cast lines to a hexagram code and the changing-line positions.
///
/// Bits are assembled in casting order (solid lines as '1', broken as '0')
/// and the string is then reversed, so the emitted code reads top line
/// first. Changing lines stay in casting order: 1-based, bottom-up.
pub fn encode(cast: &CastSequence) -> HexagramEncoding {
    let mut bits = String::with_capacity(6);
    let mut changing_lines = Vec::new();

    for (i, line) in cast.lines().iter().enumerate() {
        bits.push(if line.is_solid() { '1' } else { '0' });
        if line.is_changing() {
            changing_lines.push(i as u8 + 1);
        }
    }

    let code: String = bits.chars().rev().collect();
    HexagramEncoding {
        code: HexagramCode::new_unchecked(code),
        changing_lines,
    }
}

/// Same as [`encode`] for raw line values, e.g. reconstructed from persisted
/// history. Fails with `InvalidCast` on malformed input.
pub fn encode_values(values: &[u8]) -> Result<HexagramEncoding> {
    Ok(encode(&CastSequence::from_values(values)?))
}
