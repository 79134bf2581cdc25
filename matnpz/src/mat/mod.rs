//! MATLAB Level 5 MAT-file handling
//!
//! This module reads (and writes) the binary `.mat` format MATLAB uses for `save` with the
//! `-v6` and `-v7` flags, which covers the vast majority of recordings in the wild. The
//! HDF5-based `-v7.3` format is rejected with a descriptive error.
//!
//! Numeric, logical, char, struct and cell arrays are decoded. Sparse matrices, objects,
//! function handles and complex numbers are recognised, but surface as
//! [`Value::Unsupported`] so that the rest of the file can still be used.

pub mod element;
pub mod header;
pub mod value;

mod read;
mod write;

pub use header::{Endian, Header, HeaderReadError};
pub use value::{
    ArrayClass, CellArray, CharArray, NumericArray, NumericData, StructArray, Unsupported, Value,
};
pub use write::EncodeError;

use element::{read_element, Next};
use std::{
    fs::{create_dir_all, File},
    io::{self, BufWriter, Cursor, Read, Write},
    path::Path,
};
use thiserror::Error;

/// A named top-level variable
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Whether variables are zlib-compressed when serializing a [`MatFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain matrix elements, like `save -v6`
    None,

    /// Every variable is deflated, like `save -v7` (MATLAB's default)
    #[default]
    Zlib,
}

/// A full MAT-file: a header followed by named variables
///
/// ```no_run
/// # use matnpz::mat::{MatFile, Variable};
/// // Load a recording from disk
/// let file = MatFile::from_path("pinknoise_5Hz-2000Hz_8Vrms.mat")?;
///
/// for variable in &file.variables {
///     println!("{} ({})", variable.name, variable.value.class_name());
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MatFile {
    pub header: Header,
    pub variables: Vec<Variable>,
}

impl MatFile {
    /// Construct a file holding the given variables, with a default header
    pub fn new(variables: Vec<Variable>) -> Self {
        Self {
            header: Header::default(),
            variables,
        }
    }

    /// Find a top-level variable by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| &variable.value)
    }

    /// Deserialize a [`MatFile`] from an arbitrary I/O reader
    pub fn from_reader<R>(mut reader: R) -> Result<Self, FromReaderError>
    where
        R: Read,
    {
        let header = Header::from_reader(&mut reader)?;

        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let mut cursor = Cursor::new(bytes.as_slice());
        let mut variables = Vec::new();

        loop {
            match read_element(&mut cursor, header.endian)? {
                Next::Element(element) => {
                    if let Some(variable) = read::read_variable(element, header.endian)? {
                        variables.push(variable);
                    }
                }
                Next::UnknownType(data_type) => {
                    log::debug!("Skipping top-level element of unknown type {data_type}");
                }
                Next::End => break,
            }
        }

        Ok(Self { header, variables })
    }

    /// Deserialize a [`MatFile`] from a path on disk (.mat)
    pub fn from_path<P>(path: P) -> Result<Self, FromPathError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Ok(Self::from_reader(io::BufReader::new(file))?)
    }

    /// Serialize the [`MatFile`] to an arbitrary I/O writer
    pub fn to_writer<W>(&self, mut writer: W, compression: Compression) -> Result<(), ToWriterError>
    where
        W: Write,
    {
        self.header.to_writer(&mut writer)?;

        for variable in &self.variables {
            let element = write::encode_variable(
                &variable.name,
                &variable.value,
                compression == Compression::Zlib,
            )?;
            writer.write_all(&element)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Serialize the [`MatFile`] to a path on disk (.mat)
    pub fn to_path<P>(&self, path: P, compression: Compression) -> Result<(), ToWriterError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        self.to_writer(BufWriter::new(File::create(path)?), compression)
    }
}

/// Errors that might be returned from [`MatFile::from_reader()`]
#[derive(Debug, Error)]
pub enum FromReaderError {
    /// The header is missing or describes an unsupported file
    #[error("Reading the header failed")]
    Header(#[from] HeaderReadError),

    /// The data elements are truncated or malformed
    #[error("Reading the data elements failed")]
    Elements(#[from] io::Error),
}

/// Errors that might be returned from [`MatFile::from_path()`]
#[derive(Debug, Error)]
pub enum FromPathError {
    /// Could not open the file for reading
    #[error("Could not open the file for reading")]
    FileOpen(#[from] io::Error),

    /// Deserialization from the file failed
    #[error("Reading the MAT-file failed")]
    Read(#[from] FromReaderError),
}

/// Errors that might be returned from [`MatFile::to_writer()`]
#[derive(Debug, Error)]
pub enum ToWriterError {
    /// Something failed with I/O
    #[error("Something failed with I/O")]
    Write(#[from] io::Error),

    /// A variable could not be encoded
    #[error("Encoding a variable failed")]
    Encode(#[from] EncodeError),
}
