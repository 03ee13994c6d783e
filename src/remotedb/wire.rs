//! Remote database message framing (spec.md §4.5): magic, transaction id,
//! message type, typed argument list — one layer above the bare field codec
//! in [`crate::wire::field`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::wire::field::{self, Field, FieldKind};

pub const MAGIC: u32 = 0x872349AE;
const MAX_ARGS: usize = 12;

/// Tag used inside the 12-byte argument-kind array. Distinct from
/// [`FieldKind`]'s own tag byte — this is a second, independent encoding for
/// the same five-ish shapes, used only to describe what follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKindTag {
    Unused,
    Str,
    Binary,
    U32,
}

impl ArgKindTag {
    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ArgKindTag::Unused),
            0x02 => Some(ArgKindTag::Str),
            0x03 => Some(ArgKindTag::Binary),
            0x06 => Some(ArgKindTag::U32),
            _ => None,
        }
    }

    const fn to_byte(self) -> u8 {
        match self {
            ArgKindTag::Unused => 0x00,
            ArgKindTag::Str => 0x02,
            ArgKindTag::Binary => 0x03,
            ArgKindTag::U32 => 0x06,
        }
    }

    const fn from_field_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Str => ArgKindTag::Str,
            FieldKind::Binary => ArgKindTag::Binary,
            FieldKind::U8 | FieldKind::U16 | FieldKind::U32 => ArgKindTag::U32,
        }
    }

    const fn field_kind(self) -> FieldKind {
        match self {
            ArgKindTag::Str => FieldKind::Str,
            ArgKindTag::Binary | ArgKindTag::Unused => FieldKind::Binary,
            ArgKindTag::U32 => FieldKind::U32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub txid: u32,
    pub msg_type: u16,
    pub args: Vec<Field>,
}

impl Message {
    pub fn new(txid: u32, msg_type: u16, args: Vec<Field>) -> Self {
        Self { txid, msg_type, args }
    }
}

/// A zero-length binary argument immediately preceded by a zero-valued u32
/// argument is never written to the wire; its slot in the argument-kind
/// array is marked unused instead. Real CDJs omit it this way, and peers
/// that don't know the quirk misparse the rest of the message.
fn is_elided(args: &[Field], index: usize) -> bool {
    let Field::Binary(bytes) = &args[index] else { return false };
    if !bytes.is_empty() || index == 0 {
        return false;
    }
    matches!(args[index - 1], Field::U32(0))
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    if message.args.len() > MAX_ARGS {
        return Err(Error::Protocol {
            reason: format!("{} args exceeds max {MAX_ARGS}", message.args.len()),
        });
    }

    writer.write_u32(MAGIC).await?;
    writer.write_u32(message.txid).await?;
    writer.write_u16(message.msg_type).await?;
    writer.write_u8(message.args.len() as u8).await?;

    let mut kinds = [ArgKindTag::Unused.to_byte(); MAX_ARGS];
    for (i, arg) in message.args.iter().enumerate() {
        kinds[i] = if is_elided(&message.args, i) {
            ArgKindTag::Unused.to_byte()
        } else {
            ArgKindTag::from_field_kind(arg.kind()).to_byte()
        };
    }
    field::write_field(writer, &Field::Binary(kinds.to_vec())).await?;

    for (i, arg) in message.args.iter().enumerate() {
        if is_elided(&message.args, i) {
            continue;
        }
        field::write_field(writer, arg).await?;
    }
    Ok(())
}

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    let magic = reader.read_u32().await?;
    if magic != MAGIC {
        return Err(Error::Protocol {
            reason: format!("bad remote-database magic 0x{magic:08x}"),
        });
    }
    let txid = reader.read_u32().await?;
    let msg_type = reader.read_u16().await?;
    let arg_count = reader.read_u8().await? as usize;
    if arg_count > MAX_ARGS {
        return Err(Error::Protocol {
            reason: format!("arg count {arg_count} exceeds max {MAX_ARGS}"),
        });
    }

    let kinds_field = field::read_field(reader, FieldKind::Binary).await?;
    let kinds = kinds_field.as_binary().ok_or_else(|| Error::Protocol {
        reason: "arg-kind field decoded as non-binary".to_string(),
    })?;
    if kinds.len() != MAX_ARGS {
        return Err(Error::Protocol {
            reason: format!("arg-kind array length {} != {MAX_ARGS}", kinds.len()),
        });
    }

    let mut args = Vec::with_capacity(arg_count);
    for &raw_tag in kinds.iter().take(arg_count) {
        let tag = ArgKindTag::from_byte(raw_tag).ok_or_else(|| Error::Protocol {
            reason: format!("unknown arg-kind tag 0x{raw_tag:02x}"),
        })?;
        if tag == ArgKindTag::Unused {
            args.push(Field::Binary(Vec::new()));
            continue;
        }
        args.push(field::read_field(reader, tag.field_kind()).await?);
    }

    Ok(Message { txid, msg_type, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(message: Message) -> Message {
        let mut buf = Vec::new();
        write_message(&mut buf, &message).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        read_message(&mut cursor).await.unwrap()
    }

    #[tokio::test]
    async fn roundtrips_plain_args() {
        let message = Message::new(5, 0x2002, vec![Field::U32(42)]);
        assert_eq!(roundtrip(message.clone()).await, message);
    }

    #[tokio::test]
    async fn roundtrips_string_and_binary_args() {
        let message = Message::new(
            6,
            0x4101,
            vec![Field::U32(1), Field::Str("Track Title".to_string()), Field::Binary(vec![1, 2, 3])],
        );
        assert_eq!(roundtrip(message.clone()).await, message);
    }

    #[tokio::test]
    async fn elides_empty_binary_following_zero_u32() {
        let message = Message::new(7, 0x2004, vec![Field::U32(0), Field::Binary(Vec::new())]);

        let mut buf = Vec::new();
        write_message(&mut buf, &message).await.unwrap();

        // magic(4) + txid(4) + type(2) + argc(1) + kind-field-tag(1) +
        // kind-field-len(4) + kinds(12) + one U32 arg (tag+4 bytes) = 33;
        // the empty binary contributes nothing further.
        assert_eq!(buf.len(), 4 + 4 + 2 + 1 + 1 + 4 + 12 + 5);

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn non_elided_empty_binary_is_written_explicitly() {
        // An empty binary NOT preceded by a zero u32 is transmitted normally.
        let message = Message::new(8, 0x2004, vec![Field::U32(7), Field::Binary(Vec::new())]);
        assert_eq!(roundtrip(message.clone()).await, message);
    }

    #[tokio::test]
    async fn rejects_bad_magic() {
        let message = Message::new(1, 0x4000, vec![]);
        let mut buf = Vec::new();
        write_message(&mut buf, &message).await.unwrap();
        buf[0] ^= 0xFF;
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_message(&mut cursor).await.is_err());
    }
}
