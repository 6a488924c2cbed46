// Length-prefixed binary encoding for blocks, transactions and messages

use crate::core::Hash256;
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

/// Upper bound on a single length-prefixed field, guards against
/// allocating from a corrupted length
const MAX_FIELD_LENGTH: u64 = 32 * 1024 * 1024;

/// Errors raised while decoding persisted or received bytes
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("I/O error while decoding: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed data: {0}")]
    Invalid(String),
}

/// Types with a canonical binary form
pub trait Serializable: Sized {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    fn decode<R: Read>(reader: &mut R) -> Result<Self, SerializeError>;

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf).expect("writing to a Vec cannot fail");
        buf
    }

    /// Decode a complete value; trailing bytes are rejected
    fn deserialize(data: &[u8]) -> Result<Self, SerializeError> {
        let mut cursor = Cursor::new(data);
        let value = Self::decode(&mut cursor)?;
        if cursor.position() as usize != data.len() {
            return Err(SerializeError::Invalid(format!(
                "{} trailing bytes",
                data.len() - cursor.position() as usize
            )));
        }
        Ok(value)
    }
}

/// Write a variable-length integer (VarInt)
pub fn write_varint<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    match value {
        0..=0xfc => writer.write_all(&[value as u8]),
        0xfd..=0xffff => {
            writer.write_all(&[0xfd])?;
            writer.write_all(&(value as u16).to_le_bytes())
        }
        0x10000..=0xffff_ffff => {
            writer.write_all(&[0xfe])?;
            writer.write_all(&(value as u32).to_le_bytes())
        }
        _ => {
            writer.write_all(&[0xff])?;
            writer.write_all(&value.to_le_bytes())
        }
    }
}

/// Read a variable-length integer (VarInt)
pub fn read_varint<R: Read + ?Sized>(reader: &mut R) -> io::Result<u64> {
    let mut first_byte = [0u8; 1];
    reader.read_exact(&mut first_byte)?;

    match first_byte[0] {
        0xfd => {
            let mut bytes = [0u8; 2];
            reader.read_exact(&mut bytes)?;
            Ok(u16::from_le_bytes(bytes) as u64)
        }
        0xfe => {
            let mut bytes = [0u8; 4];
            reader.read_exact(&mut bytes)?;
            Ok(u32::from_le_bytes(bytes) as u64)
        }
        0xff => {
            let mut bytes = [0u8; 8];
            reader.read_exact(&mut bytes)?;
            Ok(u64::from_le_bytes(bytes))
        }
        small => Ok(small as u64),
    }
}

/// Read a collection length, bounded so corrupt data cannot force a huge allocation
pub fn read_length<R: Read + ?Sized>(reader: &mut R) -> Result<usize, SerializeError> {
    let len = read_varint(reader)?;
    if len > MAX_FIELD_LENGTH {
        return Err(SerializeError::Invalid(format!("length {} exceeds limit", len)));
    }
    Ok(len as usize)
}

/// Write bytes with length prefix (VarInt length + data)
pub fn write_var_bytes<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    write_varint(writer, data.len() as u64)?;
    writer.write_all(data)
}

/// Read bytes with length prefix
pub fn read_var_bytes<R: Read + ?Sized>(reader: &mut R) -> Result<Vec<u8>, SerializeError> {
    let len = read_length(reader)?;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

pub fn write_var_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    write_var_bytes(writer, value.as_bytes())
}

pub fn read_var_str<R: Read + ?Sized>(reader: &mut R) -> Result<String, SerializeError> {
    let bytes = read_var_bytes(reader)?;
    String::from_utf8(bytes).map_err(|e| SerializeError::Invalid(format!("invalid UTF-8: {}", e)))
}

pub fn read_hash<R: Read + ?Sized>(reader: &mut R) -> Result<Hash256, SerializeError> {
    let mut bytes = [0u8; 32];
    reader.read_exact(&mut bytes)?;
    Ok(Hash256::new(bytes))
}

pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32, SerializeError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64, SerializeError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_widths() {
        for (value, width) in [(100u64, 1usize), (1000, 3), (100_000, 5), (1 << 40, 9)] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            assert_eq!(buf.len(), width);

            let mut cursor = Cursor::new(buf);
            assert_eq!(read_varint(&mut cursor).unwrap(), value);
        }
    }

    #[test]
    fn test_var_bytes() {
        let data = b"hello world";
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, data).unwrap();

        let mut cursor = Cursor::new(buf);
        let decoded = read_var_bytes(&mut cursor).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_var_bytes_truncated() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, b"hello").unwrap();
        buf.truncate(3);

        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_var_bytes(&mut cursor), Err(SerializeError::Io(_))));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, u64::MAX).unwrap();

        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_var_bytes(&mut cursor), Err(SerializeError::Invalid(_))));
    }
}
