//! Data element tags and payload decoding
//!
//! Everything after the header of a MAT-file is a sequence of data elements: an 8-byte tag
//! (type and byte count) followed by the payload, padded to a multiple of 8 bytes. Payloads
//! of at most 4 bytes may use the "small data element" format, where type and count are
//! packed into the first 4 bytes of the tag and the payload takes up the other 4.

use super::{header::Endian, value::NumericData};
use std::io::{self, Cursor, Read};

/// The type of a data element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Single = 7,
    Double = 9,
    Int64 = 12,
    UInt64 = 13,
    Matrix = 14,
    Compressed = 15,
    Utf8 = 16,
    Utf16 = 17,
    Utf32 = 18,
}

impl DataType {
    /// Look up the data type belonging to a tag value
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => DataType::Int8,
            2 => DataType::UInt8,
            3 => DataType::Int16,
            4 => DataType::UInt16,
            5 => DataType::Int32,
            6 => DataType::UInt32,
            7 => DataType::Single,
            9 => DataType::Double,
            12 => DataType::Int64,
            13 => DataType::UInt64,
            14 => DataType::Matrix,
            15 => DataType::Compressed,
            16 => DataType::Utf8,
            17 => DataType::Utf16,
            18 => DataType::Utf32,
            _ => return None,
        })
    }
}

/// A single data element, with its payload read into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub data_type: DataType,
    pub bytes: Vec<u8>,
}

/// The result of trying to read the next data element
pub(crate) enum Next {
    Element(Element),
    UnknownType(u32),
    End,
}

/// Read the next data element from an in-memory cursor
///
/// Returns [`Next::End`] when the cursor is exhausted exactly at an element boundary.
pub(crate) fn read_element(cursor: &mut Cursor<&[u8]>, endian: Endian) -> io::Result<Next> {
    if remaining(cursor) == 0 {
        return Ok(Next::End);
    }

    let first = read_u32(cursor, endian)?;

    let (raw_type, bytes) = if first >> 16 != 0 {
        let size = (first >> 16) as usize;
        let mut payload = [0; 4];
        cursor.read_exact(&mut payload)?;

        if size > 4 {
            return Err(invalid_data("small data element larger than 4 bytes"));
        }

        (first & 0xFFFF, payload[..size].to_vec())
    } else {
        let size = read_u32(cursor, endian)? as usize;
        if size as u64 > remaining(cursor) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "data element runs past the end of the file",
            ));
        }

        let mut bytes = vec![0; size];
        cursor.read_exact(&mut bytes)?;

        // Compressed elements are written back to back, without padding
        if first != DataType::Compressed as u32 {
            skip_padding(cursor, size);
        }

        (first, bytes)
    };

    Ok(match DataType::from_u32(raw_type) {
        Some(data_type) => Next::Element(Element { data_type, bytes }),
        None => Next::UnknownType(raw_type),
    })
}

/// Read the next element and require it to exist and be of a known type
pub(crate) fn expect_element(cursor: &mut Cursor<&[u8]>, endian: Endian) -> io::Result<Element> {
    match read_element(cursor, endian)? {
        Next::Element(element) => Ok(element),
        Next::UnknownType(raw) => Err(invalid_data(&format!("unknown data type {raw}"))),
        Next::End => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "expected another data element",
        )),
    }
}

/// Bytes left between the cursor and the end of its buffer
pub(crate) fn remaining(cursor: &Cursor<&[u8]>) -> u64 {
    (cursor.get_ref().len() as u64).saturating_sub(cursor.position())
}

fn skip_padding(cursor: &mut Cursor<&[u8]>, size: usize) {
    let padding = (8 - size % 8) % 8;
    let end = cursor.get_ref().len() as u64;
    cursor.set_position((cursor.position() + padding as u64).min(end));
}

fn read_u32(cursor: &mut Cursor<&[u8]>, endian: Endian) -> io::Result<u32> {
    let mut bytes = [0; 4];
    cursor.read_exact(&mut bytes)?;
    Ok(endian.u32(bytes))
}

pub(crate) fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_owned())
}

/// Decode fixed-size primitives from raw bytes
macro_rules! decode {
    ($bytes:expr, $endian:expr, $t:ty) => {{
        const N: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(N)
            .map(|chunk| {
                let mut raw = [0; N];
                raw.copy_from_slice(chunk);
                match $endian {
                    Endian::Little => <$t>::from_le_bytes(raw),
                    Endian::Big => <$t>::from_be_bytes(raw),
                }
            })
            .collect::<Vec<$t>>()
    }};
}

impl Element {
    /// Decode the payload as numbers of the element's storage type
    ///
    /// Returns [`None`] for non-numeric element types.
    pub fn numeric(&self, endian: Endian) -> Option<NumericData> {
        let bytes = &self.bytes;

        Some(match self.data_type {
            DataType::Int8 => NumericData::Int8(decode!(bytes, endian, i8)),
            DataType::UInt8 | DataType::Utf8 => NumericData::UInt8(bytes.clone()),
            DataType::Int16 => NumericData::Int16(decode!(bytes, endian, i16)),
            DataType::UInt16 | DataType::Utf16 => NumericData::UInt16(decode!(bytes, endian, u16)),
            DataType::Int32 => NumericData::Int32(decode!(bytes, endian, i32)),
            DataType::UInt32 | DataType::Utf32 => NumericData::UInt32(decode!(bytes, endian, u32)),
            DataType::Single => NumericData::Single(decode!(bytes, endian, f32)),
            DataType::Double => NumericData::Double(decode!(bytes, endian, f64)),
            DataType::Int64 => NumericData::Int64(decode!(bytes, endian, i64)),
            DataType::UInt64 => NumericData::UInt64(decode!(bytes, endian, u64)),
            DataType::Matrix | DataType::Compressed => return None,
        })
    }

    /// Decode the payload as 32-bit signed integers (dimensions, field name lengths)
    pub(crate) fn int32s(&self, endian: Endian) -> io::Result<Vec<i32>> {
        match self.data_type {
            DataType::Int32 => Ok(decode!(&self.bytes, endian, i32)),
            DataType::UInt32 => Ok(decode!(&self.bytes, endian, u32)
                .into_iter()
                .map(|value| value as i32)
                .collect()),
            other => Err(invalid_data(&format!(
                "expected 32-bit integers, found {other:?}"
            ))),
        }
    }
}
