//! Writing NumPy `.npz` archives
//!
//! An `.npz` file is a zip archive with one `.npy` entry per array, exactly what
//! `numpy.savez_compressed` produces. Entries carry a fixed timestamp so converting the same
//! input twice produces byte-identical archives.

use crate::flatten::{text_width, Array, ArrayData};
use crate::mat::NumericData;
use ndarray::{ArrayD, IxDyn, ShapeBuilder, ShapeError};
use ndarray_npy::{WriteNpyError, WriteNpyExt};
use std::io::{self, Seek, Write};
use thiserror::Error;
use zip::{result::ZipError, write::FileOptions, CompressionMethod, DateTime, ZipWriter};

/// Writes arrays into a compressed `.npz` archive
pub struct NpzWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: FileOptions,
}

impl<W: Write + Seek> NpzWriter<W> {
    /// Start a new archive, deflating every entry
    pub fn new(writer: W) -> Self {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        Self {
            zip: ZipWriter::new(writer),
            options,
        }
    }

    /// Add an array as `<name>.npy`
    pub fn add(&mut self, name: &str, array: &Array) -> Result<(), WriteNpzError> {
        self.zip.start_file(format!("{name}.npy"), self.options)?;

        match &array.data {
            ArrayData::Numeric(data) => write_numeric(&mut self.zip, &array.shape, data)?,
            ArrayData::Text(values) => write_text(&mut self.zip, &array.shape, values)?,
        }

        Ok(())
    }

    /// Write the central directory and hand back the underlying writer
    pub fn finish(mut self) -> Result<W, WriteNpzError> {
        Ok(self.zip.finish()?)
    }
}

/// Write numbers (column-major, as read from MATLAB) as a `.npy`
fn write_numeric<W: Write>(writer: W, shape: &[usize], data: &NumericData) -> Result<(), WriteNpzError> {
    fn array<T: Clone>(shape: &[usize], values: &[T]) -> Result<ArrayD<T>, ShapeError> {
        ArrayD::from_shape_vec(IxDyn(shape).f(), values.to_vec())
    }

    match data {
        NumericData::Double(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Single(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Int8(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::UInt8(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Int16(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::UInt16(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Int32(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::UInt32(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Int64(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::UInt64(v) => array(shape, v)?.write_npy(writer)?,
        NumericData::Logical(v) => array(shape, v)?.write_npy(writer)?,
    }

    Ok(())
}

/// Write strings as a little endian unicode (`<U{n}`) `.npy`
///
/// `ndarray-npy` has no fixed-width string element, so the (version 1.0) header is written
/// by hand. Every element takes `n` UTF-32 code units, zero padded.
fn write_text<W: Write>(mut writer: W, shape: &[usize], values: &[String]) -> io::Result<()> {
    let width = text_width(values);

    let shape = match shape {
        [] => "()".to_owned(),
        [len] => format!("({len},)"),
        dims => format!(
            "({})",
            dims.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ),
    };

    let mut header = format!("{{'descr': '<U{width}', 'fortran_order': False, 'shape': {shape}, }}");

    // Magic, version and header length take 10 bytes, the total must align to 64
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    writer.write_all(b"\x93NUMPY")?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;

    for value in values {
        let mut units: Vec<u32> = value.chars().map(u32::from).collect();
        units.resize(width, 0);

        for unit in units {
            writer.write_all(&unit.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Errors that might occur writing an `.npz` archive
#[derive(Debug, Error)]
pub enum WriteNpzError {
    /// Something failed with I/O
    #[error("Something failed with I/O")]
    Io(#[from] io::Error),

    /// The zip container could not be written
    #[error("Writing the zip container failed")]
    Zip(#[from] ZipError),

    /// An array could not be encoded as `.npy`
    #[error("Writing an .npy entry failed")]
    Npy(#[from] WriteNpyError),

    /// The number of elements does not match the shape
    #[error("The array data does not match its shape")]
    Shape(#[from] ShapeError),
}
