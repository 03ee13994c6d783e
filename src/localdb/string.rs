//! DeviceSQL's length-prefixed string encoding, as found inline in PDB rows.
//!
//! No file in the retrieved pack carries this format's own decoder (the
//! rekordcrate reference imports it from a sibling `pdb::string` module that
//! wasn't part of the retrieved set), so this is reconstructed from the
//! publicly documented DeviceSQL string shape rather than copied: a single
//! tagged length byte selects a short ASCII form or a longer
//! length-prefixed form, the latter used for anything containing non-ASCII
//! text.

/// Decode one DeviceSQL string starting at `offset` within `row`. Returns
/// the decoded text and the offset just past it, so callers can keep
/// reading fields sequentially if needed.
///
/// Short form: a single byte `b` with `b & 1 == 1` encodes
/// `length = (b >> 1) - 1` ASCII bytes immediately following. Long form: a
/// byte with the low bit clear is followed by a little-endian `u16` total
/// length (including these three header bytes), then UTF-16LE text filling
/// the rest.
pub fn decode(row: &[u8], offset: usize) -> (String, usize) {
    let Some(&tag) = row.get(offset) else {
        return (String::new(), offset);
    };

    if tag & 1 == 1 {
        let len = (tag >> 1).saturating_sub(1) as usize;
        let start = offset + 1;
        let end = (start + len).min(row.len());
        let text = String::from_utf8_lossy(&row[start..end]).into_owned();
        (text, end)
    } else {
        let Some(len_bytes) = row.get(offset + 1..offset + 3) else {
            return (String::new(), offset + 1);
        };
        let total_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let start = offset + 3;
        let end = (offset + total_len).max(start).min(row.len());
        let units: Vec<u16> = row[start..end].chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        let text = String::from_utf16_lossy(&units);
        (text, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_short_ascii_form() {
        let mut row = vec![0u8; 4];
        row.push(((b"Hi".len() + 1) as u8) << 1 | 1);
        row.extend_from_slice(b"Hi");
        let (text, end) = decode(&row, 4);
        assert_eq!(text, "Hi");
        assert_eq!(end, row.len());
    }

    #[test]
    fn decodes_long_utf16_form() {
        let mut row = vec![0u8; 2];
        let payload: Vec<u16> = "Zoë".encode_utf16().collect();
        let total_len = 3 + payload.len() * 2;
        row.push(0);
        row.extend_from_slice(&(total_len as u16).to_le_bytes());
        for unit in &payload {
            row.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, end) = decode(&row, 2);
        assert_eq!(text, "Zoë");
        assert_eq!(end, row.len());
    }
}
