//! Decoding of matrix (`miMATRIX`) elements into [`Value`]s

use super::{
    element::{expect_element, invalid_data, read_element, remaining, DataType, Element, Next},
    header::Endian,
    value::{
        ArrayClass, CellArray, CharArray, NumericArray, NumericData, StructArray, Unsupported,
        Value,
    },
    Variable,
};
use flate2::read::ZlibDecoder;
use std::io::{self, Cursor, Read};

const FLAG_COMPLEX: u32 = 0x0800;
const FLAG_LOGICAL: u32 = 0x0200;

/// The smallest nested matrix element: a tag without payload
const MIN_NESTED_LEN: usize = 8;

/// Structs without fields carry no data per element, so their size has to be capped separately
const MAX_FIELDLESS_ELEMENTS: usize = 1 << 20;

/// Decode a top-level element into a named variable
///
/// Compressed elements are inflated first. Returns [`None`] for top-level elements that do
/// not hold a variable (MATLAB never writes those, but other tools might).
pub(crate) fn read_variable(element: Element, endian: Endian) -> io::Result<Option<Variable>> {
    match element.data_type {
        DataType::Matrix => {
            let (name, value) = read_matrix(&element.bytes, endian)?;
            Ok(Some(Variable { name, value }))
        }
        DataType::Compressed => {
            let mut inflated = Vec::new();
            ZlibDecoder::new(element.bytes.as_slice()).read_to_end(&mut inflated)?;

            let mut cursor = Cursor::new(inflated.as_slice());
            match read_element(&mut cursor, endian)? {
                Next::Element(inner) => read_variable(inner, endian),
                Next::UnknownType(_) | Next::End => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// Decode the payload of a matrix element into its name and value
fn read_matrix(bytes: &[u8], endian: Endian) -> io::Result<(String, Value)> {
    // Empty struct fields and cells are written as matrix elements without payload
    if bytes.is_empty() {
        return Ok((String::new(), Value::empty()));
    }

    let mut cursor = Cursor::new(bytes);

    let flags = expect_element(&mut cursor, endian)?;
    let flags = match flags.numeric(endian) {
        Some(NumericData::UInt32(words)) if !words.is_empty() => words[0],
        _ => return Err(invalid_data("malformed array flags")),
    };

    let dims = expect_element(&mut cursor, endian)?
        .int32s(endian)?
        .into_iter()
        .map(|dim| usize::try_from(dim).map_err(|_| invalid_data("negative dimension")))
        .collect::<io::Result<Vec<_>>>()?;

    let name = expect_element(&mut cursor, endian)?;
    let name = String::from_utf8_lossy(&name.bytes).into_owned();

    let class = ArrayClass::try_from((flags & 0xFF) as u8)
        .map_err(|class| invalid_data(&format!("unknown array class {class}")))?;

    let value = match class {
        ArrayClass::Char => Value::Char(read_char(&mut cursor, endian, dims)?),
        ArrayClass::Struct => Value::Struct(read_struct(&mut cursor, endian, dims)?),
        ArrayClass::Cell => Value::Cell(read_cell(&mut cursor, endian, dims)?),
        ArrayClass::Sparse | ArrayClass::Object | ArrayClass::Function | ArrayClass::Opaque => {
            Value::Unsupported(Unsupported {
                dims,
                description: class.name(),
            })
        }
        _ if flags & FLAG_COMPLEX != 0 => Value::Unsupported(Unsupported {
            dims,
            description: "complex",
        }),
        numeric => {
            let real = expect_element(&mut cursor, endian)?;
            let data = real
                .numeric(endian)
                .and_then(|data| data.cast(numeric, flags & FLAG_LOGICAL != 0))
                .ok_or_else(|| invalid_data("numeric array without numeric data"))?;

            check_len(&dims, data.len())?;
            Value::Numeric(NumericArray::new(dims, data))
        }
    };

    Ok((name, value))
}

fn read_char(cursor: &mut Cursor<&[u8]>, endian: Endian, dims: Vec<usize>) -> io::Result<CharArray> {
    let element = expect_element(cursor, endian)?;

    let chars: Vec<char> = match element.data_type {
        DataType::Utf8 => String::from_utf8_lossy(&element.bytes).chars().collect(),
        _ => match element.numeric(endian) {
            Some(NumericData::UInt8(units)) => units.into_iter().map(char::from).collect(),
            Some(NumericData::Int8(units)) => units.into_iter().map(|unit| unit as u8 as char).collect(),
            Some(NumericData::UInt16(units)) => units
                .into_iter()
                .map(|unit| char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
            Some(NumericData::UInt32(units)) => units
                .into_iter()
                .map(|unit| char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect(),
            _ => return Err(invalid_data("char array with non-character data")),
        },
    };

    check_len(&dims, chars.len())?;

    // Characters are stored column-major, rows are what people mean by "strings"
    let rows = dims.first().copied().unwrap_or(0);
    let columns = if rows == 0 { 0 } else { chars.len() / rows };
    let rows = (0..rows)
        .map(|row| (0..columns).map(|column| chars[column * rows + row]).collect())
        .collect();

    Ok(CharArray { dims, rows })
}

fn read_struct(
    cursor: &mut Cursor<&[u8]>,
    endian: Endian,
    dims: Vec<usize>,
) -> io::Result<StructArray> {
    let name_len = expect_element(cursor, endian)?
        .int32s(endian)?
        .first()
        .copied()
        .filter(|len| *len > 0)
        .ok_or_else(|| invalid_data("invalid struct field name length"))? as usize;

    let names = expect_element(cursor, endian)?;
    let fields: Vec<String> = names
        .bytes
        .chunks(name_len)
        .map(|chunk| {
            let end = chunk.iter().position(|byte| *byte == 0).unwrap_or(chunk.len());
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        })
        .collect();

    let count = element_count(&dims)?;
    if fields.is_empty() {
        if count > MAX_FIELDLESS_ELEMENTS {
            return Err(invalid_data(&format!(
                "struct without fields declares {count} elements"
            )));
        }
    } else {
        let nested = count
            .checked_mul(fields.len())
            .ok_or_else(|| invalid_data("struct dimensions overflow"))?;
        check_nested(cursor, nested)?;
    }

    let elements = (0..count)
        .map(|_| {
            fields
                .iter()
                .map(|_| read_nested(cursor, endian))
                .collect::<io::Result<Vec<_>>>()
        })
        .collect::<io::Result<Vec<_>>>()?;

    Ok(StructArray {
        dims,
        fields,
        elements,
    })
}

fn read_cell(cursor: &mut Cursor<&[u8]>, endian: Endian, dims: Vec<usize>) -> io::Result<CellArray> {
    let count = element_count(&dims)?;
    check_nested(cursor, count)?;

    let cells = (0..count)
        .map(|_| read_nested(cursor, endian))
        .collect::<io::Result<Vec<_>>>()?;

    Ok(CellArray { dims, cells })
}

/// Read an unnamed matrix element nested inside a struct or cell
fn read_nested(cursor: &mut Cursor<&[u8]>, endian: Endian) -> io::Result<Value> {
    let element = expect_element(cursor, endian)?;
    if element.data_type != DataType::Matrix {
        return Err(invalid_data("expected a nested matrix element"));
    }

    let (_, value) = read_matrix(&element.bytes, endian)?;
    Ok(value)
}

/// The number of elements the dimensions describe
fn element_count(dims: &[usize]) -> io::Result<usize> {
    dims.iter()
        .try_fold(1_usize, |count, dim| count.checked_mul(*dim))
        .ok_or_else(|| invalid_data(&format!("dimensions {dims:?} overflow")))
}

/// Fail early when the remaining payload cannot hold `count` nested matrices
fn check_nested(cursor: &Cursor<&[u8]>, count: usize) -> io::Result<()> {
    let needed = count
        .checked_mul(MIN_NESTED_LEN)
        .and_then(|needed| u64::try_from(needed).ok());

    match needed {
        Some(needed) if needed <= remaining(cursor) => Ok(()),
        _ => Err(invalid_data(&format!(
            "{count} nested elements do not fit the {} remaining bytes",
            remaining(cursor)
        ))),
    }
}

fn check_len(dims: &[usize], len: usize) -> io::Result<()> {
    let expected = element_count(dims)?;
    if expected != len {
        return Err(invalid_data(&format!(
            "dimensions {dims:?} hold {expected} elements, found {len}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Append a (padded, non-small) data element to a buffer
    fn push(buffer: &mut Vec<u8>, data_type: u32, bytes: &[u8]) {
        buffer.extend_from_slice(&data_type.to_le_bytes());
        buffer.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buffer.extend_from_slice(bytes);
        buffer.resize(buffer.len() + (8 - bytes.len() % 8) % 8, 0);
    }

    fn header(class: u32, dims: &[i32], name: &str) -> Vec<u8> {
        let mut buffer = Vec::new();

        let mut flags = class.to_le_bytes().to_vec();
        flags.extend_from_slice(&[0; 4]);
        push(&mut buffer, 6, &flags);

        let dims: Vec<u8> = dims.iter().flat_map(|dim| dim.to_le_bytes()).collect();
        push(&mut buffer, 5, &dims);
        push(&mut buffer, 1, name.as_bytes());

        buffer
    }

    #[test]
    fn double_stored_as_uint8() {
        let mut matrix = header(6, &[1, 3], "Fs");
        push(&mut matrix, 2, &[1, 2, 3]);

        let (name, value) = read_matrix(&matrix, Endian::Little).unwrap();
        assert_eq!(name, "Fs");
        assert_eq!(
            value,
            Value::Numeric(NumericArray::new(
                vec![1, 3],
                NumericData::Double(vec![1.0, 2.0, 3.0])
            ))
        );
    }

    #[test]
    fn char_matrix_rows() {
        // ["ab"; "cd"] stored column-major as "acbd"
        let mut matrix = header(4, &[2, 2], "labels");
        let units: Vec<u8> = "acbd".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        push(&mut matrix, 4, &units);

        let (_, value) = read_matrix(&matrix, Endian::Little).unwrap();
        match value {
            Value::Char(array) => assert_eq!(array.rows, vec!["ab", "cd"]),
            other => panic!("expected a char array, got {other:?}"),
        }
    }

    #[test]
    fn complex_is_unsupported() {
        let mut matrix = header(6 | FLAG_COMPLEX, &[1, 1], "z");
        push(&mut matrix, 9, &1.0_f64.to_le_bytes());
        push(&mut matrix, 9, &2.0_f64.to_le_bytes());

        let (_, value) = read_matrix(&matrix, Endian::Little).unwrap();
        assert_eq!(value.class_name(), "complex");
    }

    #[test]
    fn dimension_mismatch() {
        let mut matrix = header(6, &[1, 4], "short");
        push(&mut matrix, 9, &1.0_f64.to_le_bytes());

        let error = read_matrix(&matrix, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn huge_struct_dimensions() {
        // Field name length 8, but no names: a struct without fields
        let mut fieldless = header(2, &[i32::MAX, i32::MAX], "meas");
        push(&mut fieldless, 5, &8_i32.to_le_bytes());
        push(&mut fieldless, 1, &[]);

        let error = read_matrix(&fieldless, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);

        let mut fieldless = header(2, &[1, i32::MAX], "meas");
        push(&mut fieldless, 5, &8_i32.to_le_bytes());
        push(&mut fieldless, 1, &[]);

        let error = read_matrix(&fieldless, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);

        // One field, far more elements than the payload holds
        let mut matrix = header(2, &[1, i32::MAX], "meas");
        push(&mut matrix, 5, &8_i32.to_le_bytes());
        push(&mut matrix, 1, b"Voltage\0");
        push(&mut matrix, 14, &[]);

        let error = read_matrix(&matrix, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn huge_cell_dimensions() {
        let matrix = header(1, &[i32::MAX, i32::MAX, i32::MAX, i32::MAX], "cells");
        let error = read_matrix(&matrix, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);

        let mut matrix = header(1, &[1, 3], "cells");
        push(&mut matrix, 14, &[]);

        let error = read_matrix(&matrix, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn fieldless_struct() {
        let mut matrix = header(2, &[1, 2], "empty");
        push(&mut matrix, 5, &8_i32.to_le_bytes());
        push(&mut matrix, 1, &[]);

        let (_, value) = read_matrix(&matrix, Endian::Little).unwrap();
        match value {
            Value::Struct(array) => {
                assert!(array.fields.is_empty());
                assert_eq!(array.elements, vec![Vec::<Value>::new(); 2]);
            }
            other => panic!("expected a struct array, got {other:?}"),
        }
    }

    #[test]
    fn overflowing_numeric_dimensions() {
        let mut matrix = header(6, &[i32::MAX, i32::MAX, i32::MAX, i32::MAX], "x");
        push(&mut matrix, 9, &1.0_f64.to_le_bytes());

        let error = read_matrix(&matrix, Endian::Little).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
