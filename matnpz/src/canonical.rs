//! The canonical naming convention for converted archives
//!
//! Recordings from different rigs name the same signal differently (`Voltage`, `U`, `Vin`,
//! ...). Converted archives always use one name per [`Quantity`], so analysis code can load
//! any dataset the same way:
//!
//! | Name           | Unit  | Recognised source names (case and `_`/`-` insensitive)  |
//! |----------------|-------|----------------------------------------------------------|
//! | `voltage`      | V     | `voltage`, `volt`, `u`, `uin`, `vin`                     |
//! | `current`      | A     | `current`, `curr`, `i`, `iin`                            |
//! | `velocity`     | m/s   | `velocity`, `vel`                                        |
//! | `displacement` | m     | `displacement`, `disp`, `excursion`, `x`                 |
//! | `sample_rate`  | Hz    | `fs`, `sample_rate`, `sampling_rate`, `sampling_frequency`, `sr` |
//!
//! Each name is also recognised with its unit appended, e.g. `voltage_V`.
//!
//! Any other field is an "extra". Extras whose name ends in `_<unit>` for a known unit keep
//! that unit and get their quantity lowercased (`Force_N` becomes `force_N`). All other extras
//! keep their name as-is.

use std::{fmt, str::FromStr};
use thiserror::Error;

/// A measured quantity with a canonical archive name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quantity {
    Voltage,
    Current,
    Velocity,
    Displacement,
    SampleRate,
}

impl Quantity {
    /// Every canonical quantity
    pub const ALL: [Quantity; 5] = [
        Quantity::Voltage,
        Quantity::Current,
        Quantity::Velocity,
        Quantity::Displacement,
        Quantity::SampleRate,
    ];

    /// The array name used in converted archives
    pub fn name(self) -> &'static str {
        match self {
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::Velocity => "velocity",
            Quantity::Displacement => "displacement",
            Quantity::SampleRate => "sample_rate",
        }
    }

    /// The SI unit the quantity is recorded in
    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current => "A",
            Quantity::Velocity => "m/s",
            Quantity::Displacement => "m",
            Quantity::SampleRate => "Hz",
        }
    }

    /// Is this a measured signal (as opposed to acquisition settings)?
    pub fn is_measurement(self) -> bool {
        self != Quantity::SampleRate
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Quantity::Voltage => &["voltage", "volt", "u", "uin", "vin"],
            Quantity::Current => &["current", "curr", "i", "iin"],
            Quantity::Velocity => &["velocity", "vel"],
            Quantity::Displacement => &["displacement", "disp", "excursion", "x"],
            Quantity::SampleRate => &[
                "fs",
                "samplerate",
                "samplingrate",
                "samplefrequency",
                "samplingfrequency",
                "sr",
            ],
        }
    }

    /// Recognise a source field name
    pub fn from_source(field: &str) -> Option<Self> {
        let key = normalize(field);

        Self::ALL.into_iter().find(|quantity| {
            quantity.aliases().contains(&key.as_str())
                || key == normalize(&format!("{}{}", quantity.name(), quantity.unit()))
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Quantity {
    type Err = UnknownQuantity;

    fn from_str(str: &str) -> Result<Self, Self::Err> {
        Self::from_source(str).ok_or_else(|| UnknownQuantity(str.to_owned()))
    }
}

/// A string did not name any [`Quantity`]
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown quantity '{0}', expected one of voltage, current, velocity, displacement or sample_rate")]
pub struct UnknownQuantity(pub String);

/// Units recognised as a `_<unit>` suffix on extra fields
const UNITS: &[&str] = &[
    "V", "mV", "uV", "Vrms", "A", "mA", "uA", "Hz", "kHz", "m", "mm", "um", "s", "ms", "us", "N",
    "Pa", "kPa", "Ohm", "ohm", "W", "K", "degC", "dB", "dBV", "kg", "g", "rad", "deg", "T", "H",
    "mH", "Tm",
];

/// How a flattened source name ends up in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Naming {
    /// One of the canonical quantities
    Canonical(Quantity),

    /// An extra whose unit could be read from its name
    Inferred { name: String, unit: &'static str },

    /// An extra kept under its original name
    Original(String),
}

impl Naming {
    /// Decide the archive name for a flattened source name
    pub fn of(source: &str) -> Self {
        if let Some(quantity) = Quantity::from_source(source) {
            return Naming::Canonical(quantity);
        }

        if let Some((quantity, unit)) = source.rsplit_once('_') {
            if let Some(unit) = UNITS.iter().copied().find(|known| *known == unit) {
                if !quantity.is_empty() {
                    return Naming::Inferred {
                        name: format!("{}_{unit}", quantity.to_lowercase()),
                        unit,
                    };
                }
            }
        }

        Naming::Original(source.to_owned())
    }

    /// The name of the array in the archive
    pub fn name(&self) -> &str {
        match self {
            Naming::Canonical(quantity) => quantity.name(),
            Naming::Inferred { name, .. } => name,
            Naming::Original(name) => name,
        }
    }

    /// The unit of the array, if known
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Naming::Canonical(quantity) => Some(quantity.unit()),
            Naming::Inferred { unit, .. } => Some(unit),
            Naming::Original(_) => None,
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.' | '/'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases() {
        assert_eq!(Quantity::from_source("Voltage"), Some(Quantity::Voltage));
        assert_eq!(Quantity::from_source("U"), Some(Quantity::Voltage));
        assert_eq!(Quantity::from_source("I"), Some(Quantity::Current));
        assert_eq!(Quantity::from_source("Fs"), Some(Quantity::SampleRate));
        assert_eq!(Quantity::from_source("sample-rate"), Some(Quantity::SampleRate));
        assert_eq!(Quantity::from_source("Vel"), Some(Quantity::Velocity));
        assert_eq!(Quantity::from_source("Gain"), None);
    }

    #[test]
    fn canonical_names_with_units() {
        assert_eq!(Quantity::from_source("voltage_V"), Some(Quantity::Voltage));
        assert_eq!(Quantity::from_source("velocity_m/s"), Some(Quantity::Velocity));
        assert_eq!(Quantity::from_source("sample_rate_Hz"), Some(Quantity::SampleRate));
    }

    #[test]
    fn parse_quantity() {
        assert_eq!("displacement".parse(), Ok(Quantity::Displacement));
        assert_eq!(
            "pressure".parse::<Quantity>(),
            Err(UnknownQuantity("pressure".to_owned()))
        );
    }

    #[test]
    fn naming() {
        assert_eq!(Naming::of("Current"), Naming::Canonical(Quantity::Current));
        assert_eq!(Naming::of("Current").name(), "current");
        assert_eq!(Naming::of("Current").unit(), Some("A"));

        let force = Naming::of("Force_N");
        assert_eq!(force.name(), "force_N");
        assert_eq!(force.unit(), Some("N"));

        let gain = Naming::of("Settings_Gain");
        assert_eq!(gain, Naming::Original("Settings_Gain".to_owned()));
        assert_eq!(gain.unit(), None);

        assert_eq!(Naming::of("_V"), Naming::Original("_V".to_owned()));
    }
}
