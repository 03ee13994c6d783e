//! Minimal XDR (RFC 1014) primitives (spec.md §4.6): just enough to frame
//! the portmap/mount/NFSv2 calls this client issues, not a general-purpose
//! codec. Opaque data and strings both use XDR's "4-byte length then
//! zero-pad to a 4-byte boundary" shape; Pioneer's own deviation is that
//! paths and filenames on this wire are UTF-16LE rather than ASCII.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

pub fn write_u32(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    BigEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    if data.len() < *offset + 4 {
        return Err(Error::Protocol { reason: "xdr: truncated u32".to_string() });
    }
    let value = BigEndian::read_u32(&data[*offset..*offset + 4]);
    *offset += 4;
    Ok(value)
}

const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn pad_to_boundary(buf: &mut Vec<u8>, unpadded_len: usize) {
    buf.resize(buf.len() + (padded_len(unpadded_len) - unpadded_len), 0);
}

/// Classic ASCII XDR string — used only for the RPC credential envelope
/// (machine name), never for NFS/mount payload strings.
pub fn write_str_ascii(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
    pad_to_boundary(buf, s.len());
}

/// Length-prefixed opaque data, zero-padded to a 4-byte boundary.
pub fn write_opaque(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
    pad_to_boundary(buf, bytes.len());
}

/// Length-prefixed opaque data — NFS file read payloads.
pub fn read_opaque(data: &[u8], offset: &mut usize) -> Result<Vec<u8>> {
    let len = read_u32(data, offset)? as usize;
    if data.len() < *offset + len {
        return Err(Error::Protocol { reason: "xdr: truncated opaque".to_string() });
    }
    let bytes = data[*offset..*offset + len].to_vec();
    *offset += padded_len(len);
    Ok(bytes)
}

/// Fixed-length opaque data with no length prefix — NFS file handles.
pub fn write_fixed_opaque(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(bytes);
}

pub fn read_fixed_opaque<const N: usize>(data: &[u8], offset: &mut usize) -> Result<[u8; N]> {
    if data.len() < *offset + N {
        return Err(Error::Protocol { reason: "xdr: truncated fixed opaque".to_string() });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&data[*offset..*offset + N]);
    *offset += N;
    Ok(out)
}

/// Pioneer's NFS/mount strings: length-prefixed (in bytes, like standard
/// XDR opaque) UTF-16LE, zero-padded to a 4-byte boundary (spec.md §4.6).
pub fn write_str_utf16le(buf: &mut Vec<u8>, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let byte_len = units.len() * 2;
    write_u32(buf, byte_len as u32);
    for unit in units {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    pad_to_boundary(buf, byte_len);
}

pub fn read_str_utf16le(data: &[u8], offset: &mut usize) -> Result<String> {
    let byte_len = read_u32(data, offset)? as usize;
    if data.len() < *offset + byte_len {
        return Err(Error::Protocol { reason: "xdr: truncated utf16le string".to_string() });
    }
    let bytes = &data[*offset..*offset + byte_len];
    *offset += padded_len(byte_len);
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|e| Error::Protocol { reason: format!("xdr: invalid utf16le string: {e}") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16le_string_roundtrips_with_padding() {
        let mut buf = Vec::new();
        write_str_utf16le(&mut buf, "/PIONEER/rekordbox/export.pdb");
        assert_eq!(buf.len() % 4, 0);
        let mut offset = 0;
        assert_eq!(read_str_utf16le(&buf, &mut offset).unwrap(), "/PIONEER/rekordbox/export.pdb");
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn fixed_opaque_roundtrips() {
        let mut buf = Vec::new();
        write_fixed_opaque(&mut buf, &[1u8; 32]);
        let mut offset = 0;
        assert_eq!(read_fixed_opaque::<32>(&buf, &mut offset).unwrap(), [1u8; 32]);
    }
}
