use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// One-byte tag that precedes every field on the remote database wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    Binary,
    Str,
}

impl FieldKind {
    pub const fn tag(self) -> u8 {
        match self {
            FieldKind::U8 => 0x0F,
            FieldKind::U16 => 0x10,
            FieldKind::U32 => 0x11,
            FieldKind::Binary => 0x14,
            FieldKind::Str => 0x26,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x0F => Some(FieldKind::U8),
            0x10 => Some(FieldKind::U16),
            0x11 => Some(FieldKind::U32),
            0x14 => Some(FieldKind::Binary),
            0x26 => Some(FieldKind::Str),
            _ => None,
        }
    }
}

/// A decoded argument value. Numeric variants expose `.value` via the plain
/// tuple field; [`Field::Str`] has already had its trailing null stripped and
/// its byte order swapped to native.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    U8(u8),
    U16(u16),
    U32(u32),
    Binary(Vec<u8>),
    Str(String),
}

impl Field {
    pub const fn kind(&self) -> FieldKind {
        match self {
            Field::U8(_) => FieldKind::U8,
            Field::U16(_) => FieldKind::U16,
            Field::U32(_) => FieldKind::U32,
            Field::Binary(_) => FieldKind::Binary,
            Field::Str(_) => FieldKind::Str,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Field::U8(v) => Some(*v as u32),
            Field::U16(v) => Some(*v as u32),
            Field::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Field::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Encode a UTF-16BE, null-terminated, length-prefixed string payload
/// (length is in code units, including the terminator).
fn encode_str_payload(s: &str) -> Vec<u8> {
    let units: Vec<u16> = s.encode_utf16().chain(std::iter::once(0u16)).collect();
    let mut payload = Vec::with_capacity(4 + units.len() * 2);
    payload.extend_from_slice(&(units.len() as u32).to_be_bytes());
    for unit in units {
        payload.extend_from_slice(&unit.to_be_bytes());
    }
    payload
}

fn decode_str_payload(units_incl_null: u32, bytes: &[u8]) -> Result<String> {
    let count = units_incl_null as usize;
    if bytes.len() != count * 2 {
        return Err(Error::Protocol {
            reason: format!(
                "string payload length mismatch: expected {} bytes for {count} code units, got {}",
                count * 2,
                bytes.len()
            ),
        });
    }
    let mut units: Vec<u16> = bytes.chunks_exact(2).map(BigEndian::read_u16).collect();
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|e| Error::Protocol {
        reason: format!("string payload is not valid UTF-16: {e}"),
    })
}

/// Write `field`'s tag byte followed by its payload.
pub async fn write_field<W: AsyncWrite + Unpin>(writer: &mut W, field: &Field) -> Result<()> {
    writer.write_u8(field.kind().tag()).await?;
    match field {
        Field::U8(v) => writer.write_u8(*v).await?,
        Field::U16(v) => writer.write_u16(*v).await?,
        Field::U32(v) => writer.write_u32(*v).await?,
        Field::Binary(bytes) => {
            writer.write_u32(bytes.len() as u32).await?;
            writer.write_all(bytes).await?;
        }
        Field::Str(s) => writer.write_all(&encode_str_payload(s)).await?,
    }
    Ok(())
}

/// Read one field, failing unless its tag matches `expected`.
pub async fn read_field<R: AsyncRead + Unpin>(
    reader: &mut R,
    expected: FieldKind,
) -> Result<Field> {
    let tag = reader.read_u8().await?;
    let kind = FieldKind::from_tag(tag).ok_or(Error::Protocol {
        reason: format!("unknown field tag 0x{tag:02x}"),
    })?;
    if kind != expected {
        return Err(Error::Protocol {
            reason: format!("expected field kind {expected:?}, got {kind:?}"),
        });
    }
    read_field_payload(reader, kind).await
}

/// Read a field's payload, having already consumed and validated its tag.
pub async fn read_field_payload<R: AsyncRead + Unpin>(
    reader: &mut R,
    kind: FieldKind,
) -> Result<Field> {
    Ok(match kind {
        FieldKind::U8 => Field::U8(reader.read_u8().await?),
        FieldKind::U16 => Field::U16(reader.read_u16().await?),
        FieldKind::U32 => Field::U32(reader.read_u32().await?),
        FieldKind::Binary => {
            let len = reader.read_u32().await?;
            let mut buf = vec![0u8; len as usize];
            reader.read_exact(&mut buf).await?;
            Field::Binary(buf)
        }
        FieldKind::Str => {
            let units = reader.read_u32().await?;
            let mut buf = vec![0u8; units as usize * 2];
            reader.read_exact(&mut buf).await?;
            Field::Str(decode_str_payload(units, &buf)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(field: Field) -> Field {
        let mut buf = Vec::new();
        write_field(&mut buf, &field).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        read_field(&mut cursor, field.kind()).await.unwrap()
    }

    #[tokio::test]
    async fn roundtrips_u32() {
        assert_eq!(roundtrip(Field::U32(0xDEAD_BEEF)).await, Field::U32(0xDEAD_BEEF));
    }

    #[tokio::test]
    async fn roundtrips_binary() {
        let field = Field::Binary(vec![1, 2, 3, 4, 5]);
        assert_eq!(roundtrip(field.clone()).await, field);
    }

    #[tokio::test]
    async fn roundtrips_empty_binary() {
        let field = Field::Binary(Vec::new());
        assert_eq!(roundtrip(field.clone()).await, field);
    }

    #[tokio::test]
    async fn roundtrips_string_with_null_terminator() {
        let field = Field::Str("CDJ-2000nexus".to_string());
        let mut buf = Vec::new();
        write_field(&mut buf, &field).await.unwrap();
        // "CDJ-2000nexus" is 13 code units + null terminator = 14.
        assert_eq!(BigEndian::read_u32(&buf[1..5]), 14);
        let mut cursor = std::io::Cursor::new(buf);
        assert_eq!(read_field(&mut cursor, FieldKind::Str).await.unwrap(), field);
    }

    #[tokio::test]
    async fn rejects_mismatched_kind() {
        let mut buf = Vec::new();
        write_field(&mut buf, &Field::U32(1)).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_field(&mut cursor, FieldKind::U16).await.is_err());
    }
}
