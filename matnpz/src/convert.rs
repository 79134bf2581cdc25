//! Converting MAT-files into `.npz` archives with a JSON sidecar
//!
//! ```no_run
//! # use matnpz::convert::{Conversion, ConvertOptions};
//! let conversion = Conversion::new(
//!     "ExpD/pinknoise_5Hz-2000Hz_8Vrms.mat",
//!     "numpy_datasets",
//!     "ExpD",
//!     "pinknoise_5Hz-2000Hz_8Vrms",
//! );
//!
//! // Writes numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.{npz,json}
//! let converted = conversion.run(&ConvertOptions::default())?;
//! println!("Wrote {} arrays", converted.sidecar.arrays.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::{
    canonical::{Naming, Quantity},
    flatten::{flatten, Array, FlattenError, Skipped},
    mat::{self, FromPathError, MatFile},
    npz::{NpzWriter, WriteNpzError},
    sidecar::{ArrayInfo, ExperimentMetadata, Sidecar},
};
use glob::{Pattern, PatternError};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs::{create_dir_all, remove_file},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tempfile::{NamedTempFile, PersistError};
use thiserror::Error;
use walkdir::WalkDir;

/// Settings shared by every conversion
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Replace existing outputs instead of refusing to touch them
    pub force: bool,

    /// Extra experiment metadata (e.g. calibration constants) stored in the sidecar
    pub metadata: BTreeMap<String, String>,

    /// Quantities that must be present in the source file
    pub required: Vec<Quantity>,
}

/// A single MAT-file to convert, and where to put the result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub experiment: String,
    pub dataset_name: String,
}

/// The outcome of a successful [`Conversion::run()`]
#[derive(Debug, Clone)]
pub struct Converted {
    pub npz_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub sidecar: Sidecar,

    /// Source values that could not be converted
    pub skipped: Vec<Skipped>,
}

impl Conversion {
    pub fn new(
        input: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        experiment: impl Into<String>,
        dataset_name: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            experiment: experiment.into(),
            dataset_name: dataset_name.into(),
        }
    }

    /// `<output-dir>/<experiment>`
    pub fn destination_dir(&self) -> PathBuf {
        self.output_dir.join(&self.experiment)
    }

    /// `<output-dir>/<experiment>/<dataset-name>.npz`
    pub fn npz_path(&self) -> PathBuf {
        self.destination_dir()
            .join(format!("{}.npz", self.dataset_name))
    }

    /// The archive path with a `.json` extension
    pub fn sidecar_path(&self) -> PathBuf {
        self.npz_path().with_extension("json")
    }

    /// The first output (archive or sidecar) that already exists, if any
    pub fn existing_output(&self) -> Option<PathBuf> {
        [self.npz_path(), self.sidecar_path()]
            .into_iter()
            .find(|path| path.exists())
    }

    /// Load, flatten, rename and write the archive plus its sidecar
    pub fn run(&self, options: &ConvertOptions) -> Result<Converted, ConvertError> {
        if let Some(key) = options
            .metadata
            .keys()
            .find(|key| ExperimentMetadata::is_reserved(key))
        {
            return Err(ConvertError::ReservedMetadata { key: key.clone() });
        }

        if !options.force {
            if let Some(path) = self.existing_output() {
                return Err(ConvertError::AlreadyExists { path });
            }
        }

        let file = MatFile::from_path(&self.input).map_err(|error| match error {
            FromPathError::FileOpen(source) => ConvertError::Io {
                path: self.input.clone(),
                source,
            },
            FromPathError::Read(source) => ConvertError::Parse {
                path: self.input.clone(),
                source: ParseError::Mat(source),
            },
        })?;

        let (arrays, skipped) = prepare(&file, options).map_err(|source| ConvertError::Parse {
            path: self.input.clone(),
            source,
        })?;

        let mut metadata = ExperimentMetadata::new(&self.experiment, &self.dataset_name);
        metadata.extra = options.metadata.clone();

        let sidecar = Sidecar {
            arrays: arrays
                .iter()
                .map(|(array, unit)| {
                    let info = ArrayInfo {
                        dtype: array.data.dtype(),
                        shape: array.shape.clone(),
                        source_field: array.source.clone(),
                        unit: unit.map(str::to_owned),
                    };
                    (array.name.clone(), info)
                })
                .collect(),
            converted_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            experiment_metadata: metadata,
            npz_file: self.npz_path(),
            source_file: self.input.clone(),
        };

        self.write(&arrays, &sidecar, options.force)?;

        Ok(Converted {
            npz_path: self.npz_path(),
            sidecar_path: self.sidecar_path(),
            sidecar,
            skipped,
        })
    }

    /// Write both outputs to temporary files first, then move them into place
    fn write(
        &self,
        arrays: &[(Array, Option<&'static str>)],
        sidecar: &Sidecar,
        force: bool,
    ) -> Result<(), ConvertError> {
        let destination = self.destination_dir();
        create_dir_all(&destination).map_err(|source| ConvertError::Io {
            path: destination.clone(),
            source,
        })?;

        let npz_path = self.npz_path();
        let sidecar_path = self.sidecar_path();

        let npz = write_npz(&destination, arrays).map_err(|source| ConvertError::Write {
            path: npz_path.clone(),
            source,
        })?;
        let json = write_sidecar(&destination, sidecar).map_err(|source| ConvertError::Write {
            path: sidecar_path.clone(),
            source,
        })?;

        persist(npz, &npz_path, force)?;
        if let Err(error) = persist(json, &sidecar_path, force) {
            // Never leave an archive behind without its sidecar
            if !force {
                let _ = remove_file(&npz_path);
            }
            return Err(error);
        }

        Ok(())
    }
}

/// Flatten the file, apply the naming convention and check the expected fields are there
fn prepare(
    file: &MatFile,
    options: &ConvertOptions,
) -> Result<(Vec<(Array, Option<&'static str>)>, Vec<Skipped>), ParseError> {
    let flattened = flatten(file)?;

    let mut arrays: Vec<(Array, Option<&'static str>)> = Vec::with_capacity(flattened.arrays.len());
    let mut quantities = Vec::new();

    for mut array in flattened.arrays {
        let naming = Naming::of(&array.name);
        match &naming {
            Naming::Canonical(quantity) => quantities.push(*quantity),
            Naming::Inferred { name, unit } => {
                log::debug!("Storing {} as {name} ({unit})", array.source)
            }
            Naming::Original(name) => {
                log::warn!("{} has no canonical name, keeping it as {name}", array.source)
            }
        }

        let name = naming.name().to_owned();
        if let Some((existing, _)) = arrays.iter().find(|(existing, _)| existing.name == name) {
            return Err(ParseError::DuplicateName {
                name,
                first: existing.source.clone(),
                second: array.source,
            });
        }

        array.name = name;
        arrays.push((array, naming.unit()));
    }

    if arrays.is_empty() {
        return Err(ParseError::NoArrays);
    }

    if !quantities.iter().any(|quantity| quantity.is_measurement()) {
        return Err(ParseError::MissingMeasurement);
    }

    if let Some(missing) = options
        .required
        .iter()
        .find(|quantity| !quantities.contains(quantity))
    {
        return Err(ParseError::MissingRequired(*missing));
    }

    Ok((arrays, flattened.skipped))
}

fn write_npz(
    directory: &Path,
    arrays: &[(Array, Option<&'static str>)],
) -> Result<NamedTempFile, WriteError> {
    let temp = NamedTempFile::new_in(directory)?;
    let mut writer = NpzWriter::new(BufWriter::new(temp));

    let mut sorted: Vec<&Array> = arrays.iter().map(|(array, _)| array).collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    for array in sorted {
        writer.add(&array.name, array)?;
    }

    let temp = writer
        .finish()?
        .into_inner()
        .map_err(|error| WriteError::Io(error.into_error()))?;
    Ok(temp)
}

fn write_sidecar(directory: &Path, sidecar: &Sidecar) -> Result<NamedTempFile, WriteError> {
    let mut json = Vec::new();
    sidecar.to_writer(&mut json)?;
    json.push(b'\n');

    let mut temp = NamedTempFile::new_in(directory)?;
    temp.write_all(&json)?;
    temp.flush()?;
    Ok(temp)
}

fn persist(temp: NamedTempFile, path: &Path, force: bool) -> Result<(), ConvertError> {
    let result = if force {
        temp.persist(path)
    } else {
        temp.persist_noclobber(path)
    };

    result.map(|_| ()).map_err(|PersistError { error, .. }| {
        if error.kind() == io::ErrorKind::AlreadyExists {
            ConvertError::AlreadyExists {
                path: path.to_owned(),
            }
        } else {
            ConvertError::Io {
                path: path.to_owned(),
                source: error,
            }
        }
    })
}

/// The broad category of a [`ConvertError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unreadable inputs, unwritable outputs
    Io,

    /// Malformed input or missing expected fields
    Parse,

    /// An output exists and overwriting was not requested
    AlreadyExists,

    /// The conversion options cannot be honoured
    Usage,
}

/// Errors that might be returned from [`Conversion::run()`]
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A file or directory could not be accessed
    #[error("Could not access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input could not be interpreted
    #[error("Could not parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// An output already exists
    #[error("{} already exists, use --force to overwrite it", .path.display())]
    AlreadyExists { path: PathBuf },

    /// Extra metadata would replace one of the sidecar's own fields
    #[error("The metadata key '{key}' is reserved")]
    ReservedMetadata { key: String },

    /// An output could not be written
    #[error("Could not write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Io { .. } | ConvertError::Write { .. } => ErrorKind::Io,
            ConvertError::Parse { .. } => ErrorKind::Parse,
            ConvertError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            ConvertError::ReservedMetadata { .. } => ErrorKind::Usage,
        }
    }
}

/// Reasons a MAT-file cannot be converted
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file is not a (supported) MAT-file
    #[error("Reading the MAT-file failed")]
    Mat(#[from] mat::FromReaderError),

    /// Flattening produced the same name twice
    #[error("Flattening the variables failed")]
    Flatten(#[from] FlattenError),

    /// Two fields map onto the same canonical name
    #[error("Both {first} and {second} map to the array name '{name}'")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    /// Nothing in the file could be converted
    #[error("No usable arrays were found")]
    NoArrays,

    /// None of the measured signals are present
    #[error("None of voltage, current, velocity or displacement were found")]
    MissingMeasurement,

    /// A quantity listed in [`ConvertOptions::required`] is missing
    #[error("Required quantity {0} was not found")]
    MissingRequired(Quantity),
}

/// Errors that might occur writing the outputs
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Something failed with I/O")]
    Io(#[from] io::Error),

    #[error("Writing the archive failed")]
    Npz(#[from] WriteNpzError),

    #[error("Writing the sidecar failed")]
    Sidecar(#[from] serde_json::Error),
}

/// Every MAT-file in a directory that matches a glob pattern
#[derive(Debug, Clone)]
pub struct Batch {
    pub input_dir: PathBuf,

    /// Matched against file names, or against paths relative to `input_dir` when the
    /// pattern contains a `/` (which also makes the search recursive)
    pub pattern: String,

    pub output_dir: PathBuf,
    pub experiment: String,
}

/// The outcome of [`Batch::run()`]
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub converted: Vec<Converted>,

    /// Inputs left alone because their outputs exist
    pub skipped: Vec<PathBuf>,

    pub failed: Vec<(PathBuf, ConvertError)>,
}

impl BatchSummary {
    /// Did every attempted conversion succeed?
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Batch {
    /// The matched input files, sorted by path
    pub fn inputs(&self) -> Result<Vec<PathBuf>, BatchError> {
        if !self.input_dir.is_dir() {
            return Err(BatchError::InputDir(self.input_dir.clone()));
        }

        let pattern = Pattern::new(&self.pattern)?;
        let recursive = self.pattern.contains('/');

        let mut walk_dir = WalkDir::new(&self.input_dir).min_depth(1);
        if !recursive {
            walk_dir = walk_dir.max_depth(1);
        }

        let mut inputs: Vec<PathBuf> = walk_dir
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                if recursive {
                    entry
                        .path()
                        .strip_prefix(&self.input_dir)
                        .map(|relative| pattern.matches_path(relative))
                        .unwrap_or(false)
                } else {
                    pattern.matches(&entry.file_name().to_string_lossy())
                }
            })
            .map(|entry| entry.into_path())
            .collect();

        if inputs.is_empty() {
            return Err(BatchError::NoMatches {
                pattern: self.pattern.clone(),
                input_dir: self.input_dir.clone(),
            });
        }

        inputs.sort();
        Ok(inputs)
    }

    /// Convert every matched input, carrying on past failures
    pub fn run(&self, options: &ConvertOptions) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary::default();

        for input in self.inputs()? {
            let dataset_name = input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            let conversion = Conversion::new(
                &input,
                &self.output_dir,
                &self.experiment,
                dataset_name,
            );

            if !options.force && conversion.existing_output().is_some() {
                log::info!(
                    "Skipping {} (output exists). Use --force to rebuild.",
                    conversion.dataset_name
                );
                summary.skipped.push(input);
                continue;
            }

            match conversion.run(options) {
                Ok(converted) => {
                    log::info!(
                        "Converted {} -> {}",
                        input.display(),
                        converted.npz_path.display()
                    );
                    summary.converted.push(converted);
                }
                Err(error) => {
                    log::error!("{}", error_chain(&error));
                    summary.failed.push((input, error));
                }
            }
        }

        Ok(summary)
    }
}

/// Errors that prevent a [`Batch`] from starting at all
#[derive(Debug, Error)]
pub enum BatchError {
    /// The input directory does not exist
    #[error("Input directory does not exist: {}", .0.display())]
    InputDir(PathBuf),

    /// The glob pattern is malformed
    #[error("Invalid pattern")]
    Pattern(#[from] PatternError),

    /// Nothing matched the pattern
    #[error("No files matching '{pattern}' found in {}", .input_dir.display())]
    NoMatches { pattern: String, input_dir: PathBuf },
}

/// Render an error and all of its sources on one line
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();

    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(message, ": {cause}");
        source = cause.source();
    }

    message
}
