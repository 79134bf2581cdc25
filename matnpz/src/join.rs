//! Reassembling archives that were split into parts
//!
//! Large recording archives are distributed as numbered chunks (`data.zip.001`, `data.zip.002`,
//! ...) or as `split` output with alphabetic suffixes (`data.zip.aa`, `data.zip.ab`, ...).
//! [`SplitArchive::discover()`] finds and validates the parts, [`SplitArchive::join_to()`]
//! concatenates them, after which the result can be [`verify()`]d and [`extract()`]ed.

use std::{
    fs::{create_dir_all, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;
use zip::{result::ZipError, ZipArchive};

const SEPARATORS: &[char] = &['.', '-', '_'];

/// How the parts of an archive are numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixStyle {
    /// `000`, `001`, ... (counting may start at zero or one)
    Numeric,

    /// `aa`, `ab`, ... `az`, `ba`, ... as produced by `split`
    Alphabetic,
}

/// One part of a split archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub path: PathBuf,

    /// Everything in the file name before the suffix, including the separator
    pub stem: String,

    pub style: SuffixStyle,
    pub width: usize,
    pub index: u64,
}

impl Part {
    /// Recognise a part from its file name
    ///
    /// Numeric suffixes need at least two digits, alphabetic suffixes are exactly two lowercase
    /// letters following a `.`, `-` or `_`. That makes `notes.txt` no part, but `README.md` is
    /// one by name alone; [`SplitArchive::discover()`] weeds those out.
    pub fn parse(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;

        let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        if digits >= 2 && digits < name.len() {
            let (stem, suffix) = name.split_at(name.len() - digits);
            return Some(Part {
                path: path.to_owned(),
                stem: stem.to_owned(),
                style: SuffixStyle::Numeric,
                width: digits,
                index: suffix.parse().ok()?,
            });
        }

        let at = name.len().checked_sub(2)?;
        if !name.is_char_boundary(at) {
            return None;
        }

        let (stem, suffix) = name.split_at(at);
        let separated = stem.ends_with(SEPARATORS) && stem.len() > 1;
        if separated && suffix.bytes().all(|byte| byte.is_ascii_lowercase()) {
            let index = suffix
                .bytes()
                .fold(0, |index, byte| index * 26 + u64::from(byte - b'a'));

            return Some(Part {
                path: path.to_owned(),
                stem: stem.to_owned(),
                style: SuffixStyle::Alphabetic,
                width: 2,
                index,
            });
        }

        None
    }

    /// The file name another part in the same series would have
    pub fn sibling_name(&self, index: u64) -> String {
        let suffix = match self.style {
            SuffixStyle::Numeric => format!("{index:0width$}", width = self.width),
            SuffixStyle::Alphabetic => {
                let mut letters = vec![b'a'; self.width];
                let mut rest = index;
                for letter in letters.iter_mut().rev() {
                    *letter = b'a' + (rest % 26) as u8;
                    rest /= 26;
                }
                String::from_utf8_lossy(&letters).into_owned()
            }
        };

        format!("{}{suffix}", self.stem)
    }

    /// Whether this is the first part of its series (`00`/`01` or `aa`)
    pub fn is_first(&self) -> bool {
        match self.style {
            SuffixStyle::Numeric => self.index <= 1,
            SuffixStyle::Alphabetic => self.index == 0,
        }
    }

    fn same_series(&self, other: &Part) -> bool {
        self.stem == other.stem && self.style == other.style && self.width == other.width
    }
}

/// A validated, complete sequence of archive parts
#[derive(Debug, Clone)]
pub struct SplitArchive {
    parts: Vec<Part>,
}

impl SplitArchive {
    /// Find the parts in a directory
    ///
    /// Only regular, non-hidden files directly inside `dir` are considered. When a prefix is
    /// given, files not starting with it are ignored.
    ///
    /// Candidates are grouped into series by name and numbering. A lone file with a two-letter
    /// extension that is not `aa` (`README.md`, `archive.tar.gz`) is not taken for a part. Of the
    /// remaining series, the one with a first part is picked, preferring numbered parts over
    /// lettered ones. Two complete archives in one folder are [`JoinError::MixedParts`].
    pub fn discover(dir: &Path, prefix: Option<&str>) -> Result<Self, JoinError> {
        if !dir.is_dir() {
            return Err(JoinError::Io {
                path: dir.to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut parts: Vec<Part> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                !name.starts_with('.') && prefix.map_or(true, |prefix| name.starts_with(prefix))
            })
            .filter_map(|entry| Part::parse(entry.path()))
            .collect();

        parts.sort_by(|a, b| a.path.cmp(&b.path));
        Self::new(select(parts)?)
    }

    /// Validate that the parts form a single, gapless sequence
    pub fn new(parts: Vec<Part>) -> Result<Self, JoinError> {
        let first = parts.first().ok_or(JoinError::NoParts)?;

        if let Some(other) = parts.iter().find(|part| !first.same_series(part)) {
            return Err(JoinError::MixedParts {
                first: first.path.clone(),
                other: other.path.clone(),
            });
        }

        if !first.is_first() {
            return Err(JoinError::OutOfSequence(first.path.clone()));
        }

        for (expected, part) in (first.index..).zip(&parts) {
            if part.index != expected {
                return Err(JoinError::MissingPart(
                    first.path.with_file_name(first.sibling_name(expected)),
                ));
            }
        }

        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// The name of the joined archive, e.g. `data.zip` for parts named `data.zip.001`
    pub fn joined_name(&self) -> String {
        let stem = self.parts.first().map_or("", |part| part.stem.as_str());
        match stem.trim_end_matches(SEPARATORS) {
            "" => "joined".to_owned(),
            stem => stem.to_owned(),
        }
    }

    /// Concatenate every part, in order, into a single file
    ///
    /// Returns the number of bytes written.
    pub fn join_to(&self, archive: &Path) -> Result<u64, JoinError> {
        let io_error = |path: &Path| {
            let path = path.to_owned();
            move |source| JoinError::Io { path, source }
        };

        if let Some(parent) = archive.parent() {
            create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut writer = BufWriter::new(File::create(archive).map_err(io_error(archive))?);
        let mut total = 0;

        for part in &self.parts {
            let mut reader = File::open(&part.path).map_err(io_error(&part.path))?;
            total += io::copy(&mut reader, &mut writer).map_err(io_error(&part.path))?;
        }

        writer.flush().map_err(io_error(archive))?;
        Ok(total)
    }
}

/// Pick the one series of parts to join from everything that parsed as a part
fn select(candidates: Vec<Part>) -> Result<Vec<Part>, JoinError> {
    let mut series: Vec<Vec<Part>> = Vec::new();
    for part in candidates {
        match series.iter_mut().find(|parts| parts[0].same_series(&part)) {
            Some(parts) => parts.push(part),
            None => series.push(vec![part]),
        }
    }

    series.retain(|parts| {
        let stray = parts.len() == 1
            && parts[0].style == SuffixStyle::Alphabetic
            && !parts[0].is_first();

        if stray {
            log::debug!("Ignoring {}", parts[0].path.display());
        }

        !stray
    });

    let started: Vec<&Vec<Part>> = series
        .iter()
        .filter(|parts| parts.iter().any(Part::is_first))
        .collect();

    let mut pool = if started.is_empty() {
        series.iter().collect()
    } else {
        started
    };

    if pool.iter().any(|parts| parts[0].style == SuffixStyle::Numeric) {
        pool.retain(|parts| parts[0].style == SuffixStyle::Numeric);
    }

    match pool.as_slice() {
        [] => Ok(Vec::new()),
        [parts] => {
            for part in series.iter().flatten().filter(|part| !parts[0].same_series(part)) {
                log::debug!("Ignoring {}", part.path.display());
            }
            for part in parts.iter() {
                log::debug!("Found part {}", part.path.display());
            }

            Ok(parts.to_vec())
        }
        [first, other, ..] => Err(JoinError::MixedParts {
            first: first[0].path.clone(),
            other: other[0].path.clone(),
        }),
    }
}

/// Read every entry of a zip archive to the end, checking CRCs
///
/// Returns the number of entries.
pub fn verify(archive: &Path) -> Result<usize, JoinError> {
    let mut zip = open(archive)?;
    let corrupt = |source| JoinError::Corrupt {
        path: archive.to_owned(),
        source,
    };

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(corrupt)?;
        io::copy(&mut entry, &mut io::sink()).map_err(|error| corrupt(ZipError::Io(error)))?;
    }

    Ok(zip.len())
}

/// Extract every entry of a zip archive into a directory
pub fn extract(archive: &Path, output: &Path) -> Result<(), JoinError> {
    create_dir_all(output).map_err(|source| JoinError::Io {
        path: output.to_owned(),
        source,
    })?;

    open(archive)?
        .extract(output)
        .map_err(|source| JoinError::Corrupt {
            path: archive.to_owned(),
            source,
        })
}

fn open(archive: &Path) -> Result<ZipArchive<BufReader<File>>, JoinError> {
    let file = File::open(archive).map_err(|source| JoinError::Io {
        path: archive.to_owned(),
        source,
    })?;

    ZipArchive::new(BufReader::new(file)).map_err(|source| JoinError::Corrupt {
        path: archive.to_owned(),
        source,
    })
}

/// Errors that might occur joining split archives
#[derive(Debug, Error)]
pub enum JoinError {
    /// No parts were found
    #[error("No archive parts were found")]
    NoParts,

    /// A part in the middle of the sequence is missing
    #[error("Missing archive part {}", .0.display())]
    MissingPart(PathBuf),

    /// The sequence does not start at the first part
    #[error("{} is not the first part of an archive", .0.display())]
    OutOfSequence(PathBuf),

    /// Parts of different archives, or differently numbered parts, were found
    #[error("{} and {} do not belong to the same archive", .first.display(), .other.display())]
    MixedParts { first: PathBuf, other: PathBuf },

    /// The joined archive is not a valid zip file
    #[error("{} is corrupt", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    /// A file could not be read or written
    #[error("Could not access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
