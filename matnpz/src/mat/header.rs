use std::io::{self, Read, Write};
use thiserror::Error;

/// Byte order of the data elements in a MAT-file
///
/// Level 5 MAT-files can be written in either byte order. The writing machine stores the
/// characters `MI` as a 16-bit value in the header, so reading them back as `IM` means
/// the file was written little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        }
    }

    pub(crate) fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }
}

/// The 128-byte header every Level 5 MAT-file starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Human readable description (platform, creation date)
    pub text: String,

    /// The MAT-file version, always `0x0100` for Level 5 files
    pub version: u16,

    /// The byte order used for the rest of the file
    pub endian: Endian,
}

impl Header {
    /// The number of bytes taken up by the header
    pub const LEN: usize = 128;

    const TEXT_LEN: usize = 116;
    const VERSION: u16 = 0x0100;

    /// Construct a little endian header with a descriptive text
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            version: Self::VERSION,
            endian: Endian::Little,
        }
    }

    /// Deserialize a [`Header`] from an arbitrary I/O reader
    pub fn from_reader<R>(mut reader: R) -> Result<Self, HeaderReadError>
    where
        R: Read,
    {
        let mut bytes = [0; Self::LEN];
        reader.read_exact(&mut bytes)?;

        // MATLAB 7.3 files are HDF5 containers sharing only the descriptive text
        let text = String::from_utf8_lossy(&bytes[..Self::TEXT_LEN])
            .trim_end_matches(&['\0', ' '][..])
            .to_owned();
        if text.starts_with("MATLAB 7.3") {
            return Err(HeaderReadError::Hdf5);
        }

        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            _ => return Err(HeaderReadError::EndianIndicator),
        };

        // Level 4 files have no text header at all
        if !text.starts_with("MATLAB") {
            return Err(HeaderReadError::NotLevel5);
        }

        let version = endian.u16([bytes[124], bytes[125]]);
        if version != Self::VERSION {
            return Err(HeaderReadError::Version(version));
        }

        Ok(Self {
            text,
            version,
            endian,
        })
    }

    /// Serialize the [`Header`] to an arbitrary I/O writer
    ///
    /// Only little endian output is supported, the `endian` field is ignored.
    pub fn to_writer<W>(&self, mut writer: W) -> Result<(), io::Error>
    where
        W: Write,
    {
        let mut bytes = [b' '; Self::LEN];

        let text = self.text.as_bytes();
        let len = text.len().min(Self::TEXT_LEN);
        bytes[..len].copy_from_slice(&text[..len]);

        // No subsystem data
        bytes[116..124].fill(0);
        bytes[124..126].copy_from_slice(&self.version.to_le_bytes());
        bytes[126..128].copy_from_slice(b"IM");

        writer.write_all(&bytes)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new("MATLAB 5.0 MAT-file, Platform: matnpz")
    }
}

/// Errors that might be returned from [`Header::from_reader()`]
#[derive(Debug, Error)]
pub enum HeaderReadError {
    /// The header could not be read in full
    #[error("Could not read the 128-byte header")]
    Read(#[from] io::Error),

    /// The file is a MATLAB 7.3 (HDF5-based) file
    #[error("MATLAB 7.3 (HDF5) files are not supported")]
    Hdf5,

    /// The file does not start with a Level 5 descriptive text
    #[error("Not a Level 5 MAT-file")]
    NotLevel5,

    /// The endian indicator is neither `IM` nor `MI`
    #[error("Invalid endian indicator")]
    EndianIndicator,

    /// The header version is not `0x0100`
    #[error("Unsupported MAT-file version {0:#06x}")]
    Version(u16),
}
