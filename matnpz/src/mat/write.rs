//! Encoding of [`Value`]s into matrix (`miMATRIX`) elements
//!
//! Everything is written little endian, with each numeric class stored in its own type
//! (no MATLAB-style compaction into smaller integer types).

use super::{
    element::DataType,
    value::{ArrayClass, CellArray, CharArray, NumericArray, NumericData, StructArray, Value},
};
use flate2::{write::ZlibEncoder, Compression};
use std::io::{self, Write};
use thiserror::Error;

const FLAG_LOGICAL: u32 = 0x0200;

/// The length struct field names are padded to
const FIELD_NAME_LEN: usize = 64;

/// Encode a named value into a complete top-level element
pub(crate) fn encode_variable(
    name: &str,
    value: &Value,
    compressed: bool,
) -> Result<Vec<u8>, EncodeError> {
    let matrix = encode_matrix(name, value)?;
    if !compressed {
        return Ok(matrix);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&matrix)?;
    let deflated = encoder.finish()?;

    let mut element = Vec::with_capacity(deflated.len() + 8);
    element.extend_from_slice(&(DataType::Compressed as u32).to_le_bytes());
    element.extend_from_slice(&element_len(deflated.len())?.to_le_bytes());
    element.extend_from_slice(&deflated);
    Ok(element)
}

fn encode_matrix(name: &str, value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut payload = Vec::new();

    match value {
        Value::Numeric(array) => encode_numeric(&mut payload, name, array)?,
        Value::Char(array) => encode_char(&mut payload, name, array)?,
        Value::Struct(array) => encode_struct(&mut payload, name, array)?,
        Value::Cell(array) => encode_cell(&mut payload, name, array)?,
        Value::Unsupported(unsupported) => {
            return Err(EncodeError::Unsupported(unsupported.description))
        }
    }

    let mut element = Vec::new();
    push_element(&mut element, DataType::Matrix, &payload)?;
    Ok(element)
}

fn push_header(
    payload: &mut Vec<u8>,
    class: ArrayClass,
    flags: u32,
    dims: &[usize],
    name: &str,
) -> Result<(), EncodeError> {
    let mut array_flags = (class as u32 | flags).to_le_bytes().to_vec();
    array_flags.extend_from_slice(&[0; 4]);
    push_element(payload, DataType::UInt32, &array_flags)?;

    let mut bytes = Vec::with_capacity(dims.len() * 4);
    for dim in dims {
        let dim = i32::try_from(*dim).map_err(|_| EncodeError::DimensionTooLarge(*dim))?;
        bytes.extend_from_slice(&dim.to_le_bytes());
    }
    push_element(payload, DataType::Int32, &bytes)?;

    push_element(payload, DataType::Int8, name.as_bytes())
}

fn encode_numeric(payload: &mut Vec<u8>, name: &str, array: &NumericArray) -> Result<(), EncodeError> {
    let flags = match array.data {
        NumericData::Logical(_) => FLAG_LOGICAL,
        _ => 0,
    };
    push_header(payload, array.data.class(), flags, &array.dims, name)?;

    let (data_type, bytes): (DataType, Vec<u8>) = match &array.data {
        NumericData::Double(v) => (DataType::Double, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::Single(v) => (DataType::Single, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::Int8(v) => (DataType::Int8, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::UInt8(v) => (DataType::UInt8, v.clone()),
        NumericData::Int16(v) => (DataType::Int16, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::UInt16(v) => (DataType::UInt16, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::Int32(v) => (DataType::Int32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::UInt32(v) => (DataType::UInt32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::Int64(v) => (DataType::Int64, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::UInt64(v) => (DataType::UInt64, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        NumericData::Logical(v) => (DataType::UInt8, v.iter().map(|x| *x as u8).collect()),
    };
    push_element(payload, data_type, &bytes)
}

fn encode_char(payload: &mut Vec<u8>, name: &str, array: &CharArray) -> Result<(), EncodeError> {
    // Rows are padded with spaces to equal width, like MATLAB's char()
    let rows: Vec<Vec<u16>> = array.rows.iter().map(|row| row.encode_utf16().collect()).collect();
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);

    let mut units = Vec::with_capacity(rows.len() * columns);
    for column in 0..columns {
        for row in &rows {
            units.push(row.get(column).copied().unwrap_or(b' ' as u16));
        }
    }

    push_header(payload, ArrayClass::Char, 0, &[rows.len(), columns], name)?;

    let bytes: Vec<u8> = units.iter().flat_map(|unit| unit.to_le_bytes()).collect();
    push_element(payload, DataType::UInt16, &bytes)
}

fn encode_struct(payload: &mut Vec<u8>, name: &str, array: &StructArray) -> Result<(), EncodeError> {
    push_header(payload, ArrayClass::Struct, 0, &array.dims, name)?;
    push_element(
        payload,
        DataType::Int32,
        &(FIELD_NAME_LEN as i32).to_le_bytes(),
    )?;

    let mut names = Vec::with_capacity(array.fields.len() * FIELD_NAME_LEN);
    for field in &array.fields {
        if field.len() >= FIELD_NAME_LEN {
            return Err(EncodeError::FieldNameTooLong(field.clone()));
        }

        let mut bytes = field.as_bytes().to_vec();
        bytes.resize(FIELD_NAME_LEN, 0);
        names.extend_from_slice(&bytes);
    }
    push_element(payload, DataType::Int8, &names)?;

    for element in &array.elements {
        for value in element {
            payload.extend_from_slice(&encode_matrix("", value)?);
        }
    }

    Ok(())
}

fn encode_cell(payload: &mut Vec<u8>, name: &str, array: &CellArray) -> Result<(), EncodeError> {
    push_header(payload, ArrayClass::Cell, 0, &array.dims, name)?;

    for cell in &array.cells {
        payload.extend_from_slice(&encode_matrix("", cell)?);
    }

    Ok(())
}

/// Append a data element, using the small format for payloads up to 4 bytes
fn push_element(buffer: &mut Vec<u8>, data_type: DataType, bytes: &[u8]) -> Result<(), EncodeError> {
    let data_type = data_type as u32;

    if !bytes.is_empty() && bytes.len() <= 4 && data_type != DataType::Matrix as u32 {
        let packed = (bytes.len() as u32) << 16 | data_type;
        buffer.extend_from_slice(&packed.to_le_bytes());

        let mut data = [0; 4];
        data[..bytes.len()].copy_from_slice(bytes);
        buffer.extend_from_slice(&data);
        return Ok(());
    }

    buffer.extend_from_slice(&data_type.to_le_bytes());
    buffer.extend_from_slice(&element_len(bytes.len())?.to_le_bytes());
    buffer.extend_from_slice(bytes);
    buffer.resize(buffer.len() + (8 - bytes.len() % 8) % 8, 0);
    Ok(())
}

/// Element sizes are stored as 32-bit values
fn element_len(len: usize) -> Result<u32, EncodeError> {
    u32::try_from(len).map_err(|_| EncodeError::ElementTooLarge(len))
}

/// Errors that might occur encoding a [`Value`]
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Values that were skipped while reading cannot be written back
    #[error("Cannot write a value of class {0}")]
    Unsupported(&'static str),

    /// Struct field names are limited in length
    #[error("Field name {0} is too long")]
    FieldNameTooLong(String),

    /// Dimensions are stored as 32-bit signed integers
    #[error("Dimension {0} does not fit a MAT-file")]
    DimensionTooLarge(usize),

    #[error("A data element of {0} bytes does not fit a MAT-file")]
    ElementTooLarge(usize),

    /// Compressing the element failed
    #[error("Compressing a data element failed")]
    Compress(#[from] io::Error),
}
