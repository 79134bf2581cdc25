//! The JSON sidecar describing a converted archive

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

/// Metadata written next to every `.npz` archive
///
/// ```json
/// {
///   "arrays": {
///     "current": { "dtype": "float64", "shape": [2], "source_field": "Current", "unit": "A" },
///     "sample_rate": { "dtype": "float64", "shape": [], "source_field": "Fs", "unit": "Hz" },
///     "voltage": { "dtype": "float64", "shape": [2], "source_field": "Voltage", "unit": "V" }
///   },
///   "converted_at": "2024-05-01T12:00:00Z",
///   "experiment_metadata": {
///     "dataset_name": "pinknoise_5Hz-2000Hz_8Vrms",
///     "excitation": { "band_hz": [5.0, 2000.0], "level_vrms": 8.0, "signal": "pinknoise" },
///     "experiment": "ExpD"
///   },
///   "npz_file": "numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.npz",
///   "source_file": "ExpD/pinknoise_5Hz-2000Hz_8Vrms.mat"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Every array in the archive, by name
    pub arrays: BTreeMap<String, ArrayInfo>,

    /// When the conversion happened (RFC 3339, UTC)
    pub converted_at: String,

    pub experiment_metadata: ExperimentMetadata,

    /// The archive this sidecar describes
    pub npz_file: PathBuf,

    /// The MAT-file the archive was converted from
    pub source_file: PathBuf,
}

/// Shape, type and provenance of a single array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayInfo {
    /// NumPy dtype string, e.g. `float64`
    pub dtype: String,

    /// Dimensions, empty for scalars
    pub shape: Vec<usize>,

    /// The field the array was read from, in MATLAB syntax
    pub source_field: String,

    /// The unit, if known from the naming convention
    pub unit: Option<String>,
}

/// Experiment-level context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    pub dataset_name: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub excitation: Option<Excitation>,

    pub experiment: String,

    /// User-supplied entries, e.g. calibration constants
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ExperimentMetadata {
    /// Keys of the fields above, which user-supplied entries may not replace
    pub const RESERVED_KEYS: &'static [&'static str] = &["dataset_name", "excitation", "experiment"];

    pub fn new(experiment: &str, dataset_name: &str) -> Self {
        Self {
            dataset_name: dataset_name.to_owned(),
            excitation: Excitation::from_dataset_name(dataset_name),
            experiment: experiment.to_owned(),
            extra: BTreeMap::new(),
        }
    }

    /// Whether `key` names one of the fixed fields
    pub fn is_reserved(key: &str) -> bool {
        Self::RESERVED_KEYS.contains(&key)
    }
}

/// The excitation signal, as encoded in a dataset name
///
/// Dataset names follow `<signal>_<lo>Hz-<hi>Hz_<level>Vrms`, e.g.
/// `pinknoise_5Hz-2000Hz_8Vrms`. Every part is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Excitation {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub band_hz: Option<[f64; 2]>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level_vrms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signal: Option<String>,
}

impl Excitation {
    /// Parse the excitation from a dataset name, if it follows the convention at all
    pub fn from_dataset_name(name: &str) -> Option<Self> {
        let mut excitation = Excitation {
            band_hz: None,
            level_vrms: None,
            signal: None,
        };

        for (index, token) in name.split('_').enumerate() {
            if let Some(band) = parse_band(token) {
                excitation.band_hz = Some(band);
            } else if let Some(level) = token.strip_suffix("Vrms").and_then(parse_number) {
                excitation.level_vrms = Some(level);
            } else if index == 0 && !token.is_empty() {
                excitation.signal = Some(token.to_owned());
            }
        }

        // A bare name is not an excitation description
        if excitation.band_hz.is_none() && excitation.level_vrms.is_none() {
            return None;
        }

        Some(excitation)
    }
}

fn parse_band(token: &str) -> Option<[f64; 2]> {
    let (low, high) = token.split_once('-')?;
    let low = parse_number(low.strip_suffix("Hz")?)?;
    let high = parse_number(high.strip_suffix("Hz")?)?;
    Some([low, high])
}

/// Parse a number, allowing `p` as decimal separator (`0p5Vrms`)
fn parse_number(text: &str) -> Option<f64> {
    text.replace('p', ".").parse().ok()
}

impl Sidecar {
    /// Serialize as pretty-printed JSON with sorted keys
    pub fn to_writer<W>(&self, writer: W) -> Result<(), serde_json::Error>
    where
        W: Write,
    {
        // Going through `Value` sorts the flattened extra metadata in with the fixed keys
        let value = serde_json::to_value(self)?;
        serde_json::to_writer_pretty(writer, &value)
    }

    /// Deserialize from JSON
    pub fn from_reader<R>(reader: R) -> Result<Self, serde_json::Error>
    where
        R: Read,
    {
        serde_json::from_reader(reader)
    }

    /// Deserialize from a path on disk (.json)
    pub fn from_path<P>(path: P) -> Result<Self, serde_json::Error>
    where
        P: AsRef<Path>,
    {
        let file = std::fs::File::open(path).map_err(serde_json::Error::io)?;
        Self::from_reader(io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excitation_from_name() {
        let excitation = Excitation::from_dataset_name("pinknoise_5Hz-2000Hz_8Vrms").unwrap();
        assert_eq!(excitation.signal.as_deref(), Some("pinknoise"));
        assert_eq!(excitation.band_hz, Some([5.0, 2000.0]));
        assert_eq!(excitation.level_vrms, Some(8.0));

        let excitation = Excitation::from_dataset_name("sine_0p5Vrms").unwrap();
        assert_eq!(excitation.level_vrms, Some(0.5));
        assert_eq!(excitation.band_hz, None);

        assert_eq!(Excitation::from_dataset_name("recording"), None);
    }

    #[test]
    fn reserved_keys() {
        let metadata = ExperimentMetadata::new("ExpD", "recording");
        let json = serde_json::to_value(&metadata).unwrap();

        for key in json.as_object().unwrap().keys() {
            assert!(ExperimentMetadata::is_reserved(key), "{key}");
        }

        assert!(ExperimentMetadata::is_reserved("excitation"));
        assert!(!ExperimentMetadata::is_reserved("amplifier_gain"));
    }

    #[test]
    fn keys_are_sorted() {
        let mut metadata = ExperimentMetadata::new("ExpD", "recording");
        metadata.extra.insert("amplifier".to_owned(), "AE Techron".to_owned());
        metadata.extra.insert("zz_note".to_owned(), "last".to_owned());

        let sidecar = Sidecar {
            arrays: BTreeMap::new(),
            converted_at: "2024-05-01T12:00:00Z".to_owned(),
            experiment_metadata: metadata,
            npz_file: "out/ExpD/recording.npz".into(),
            source_file: "recording.mat".into(),
        };

        let mut bytes = Vec::new();
        sidecar.to_writer(&mut bytes).unwrap();
        let json = String::from_utf8(bytes).unwrap();

        let amplifier = json.find("\"amplifier\"").unwrap();
        let dataset = json.find("\"dataset_name\"").unwrap();
        let note = json.find("\"zz_note\"").unwrap();
        assert!(amplifier < dataset && dataset < note);

        let read = Sidecar::from_reader(json.as_bytes()).unwrap();
        assert_eq!(read, sidecar);
    }
}
