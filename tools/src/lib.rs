//! # matnpz
//!
//! Loudspeaker measurement campaigns record their signals (voltage, current, cone velocity
//! and displacement) with MATLAB, and distribute them as `.mat` files, frequently inside large
//! archives split into parts. This crate provides a command-line utility that reassembles
//! those archives and converts the recordings into NumPy `.npz` archives with a JSON sidecar,
//! using one naming convention for every dataset.
//!
//! Log output goes to stderr and can be tuned with `RUST_LOG` (defaults to `info`).
//!
//! ## Join
//!
//! ```console
//! matnpz-join 0.1.0
//! Join split archive parts, verify the result and extract it
//!
//! USAGE:
//!     matnpz join [OPTIONS] <DIR>
//!
//! ARGS:
//!     <DIR>    The folder holding the parts
//!
//! OPTIONS:
//!     -a, --archive <ARCHIVE>    Where to write the joined archive. Defaults to the parts' common name, inside DIR
//!     -h, --help                 Print help information
//!     -o, --output <OUTPUT>      The folder to extract into. Defaults to DIR
//!     -p, --prefix <PREFIX>      Only consider parts whose file name starts with this prefix
//!     -V, --version              Print version information
//! ```
//!
//! ### Example
//!
//! ```console
//! $ matnpz join downloads
//! downloads/dtu_34871-NL-Transducers.zip.001
//! downloads/dtu_34871-NL-Transducers.zip.002
//! downloads/dtu_34871-NL-Transducers.zip.003
//! Joined 3 parts => downloads/dtu_34871-NL-Transducers.zip (3145728000 bytes)
//! Extracted 212 entries => downloads
//! ```
//!
//! ## Convert
//!
//! ```console
//! matnpz-convert 0.1.0
//! Convert a MAT-file into an .npz archive with a JSON sidecar
//!
//! USAGE:
//!     matnpz convert [OPTIONS]
//!
//! OPTIONS:
//!     -d, --dataset-name <DATASET_NAME>    The dataset name. Defaults to the input's file name, without extension
//!     -e, --experiment <EXPERIMENT>        The experiment label, also used as subfolder of the output folder [default: ExpD]
//!     -f, --force                          Overwrite existing outputs
//!     -h, --help                           Print help information
//!     -i, --input <INPUT>                  The MAT-file to convert [default: dtu_34871-NL-Transducers/ExpD/pinknoise_5Hz-2000Hz_8Vrms.mat]
//!         --meta <KEY=VALUE>               Extra experiment metadata for the sidecar, e.g. --meta amplifier_gain=20
//!     -o, --output-dir <OUTPUT_DIR>        The root folder for converted datasets [default: numpy_datasets]
//!         --require <QUANTITY>             Fail unless the recording holds this quantity (voltage, current, velocity, ...)
//!     -V, --version                        Print version information
//! ```
//!
//! ### Example
//!
//! ```console
//! $ matnpz convert --meta amplifier_gain=20
//! current                  <= meas.Current             float64  [262144]
//! displacement             <= meas.Displacement        float64  [262144]
//! sample_rate              <= meas.Fs                  float64  []
//! voltage                  <= meas.Voltage             float64  [262144]
//! Wrote numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.npz
//! Wrote numpy_datasets/ExpD/pinknoise_5Hz-2000Hz_8Vrms.json
//! ```
//!
//! ## Batch
//!
//! ```console
//! matnpz-batch 0.1.0
//! Convert every matching MAT-file in a folder
//!
//! USAGE:
//!     matnpz batch [OPTIONS]
//!
//! OPTIONS:
//!     -e, --experiment <EXPERIMENT>    The experiment label, also used as subfolder of the output folder [default: ExpD]
//!     -f, --force                      Overwrite existing outputs instead of skipping them
//!     -h, --help                       Print help information
//!     -i, --input-dir <INPUT_DIR>      The folder holding the MAT-files [default: dtu_34871-NL-Transducers/ExpD]
//!     -o, --output-dir <OUTPUT_DIR>    The root folder for converted datasets [default: numpy_datasets]
//!     -p, --pattern <PATTERN>          Which files to convert. Patterns containing a '/' are matched recursively [default: *.mat]
//!     -V, --version                    Print version information
//! ```
//!
//! ### Example
//!
//! ```console
//! $ matnpz batch
//! [INFO  matnpz::convert] Skipping pinknoise_5Hz-2000Hz_8Vrms (output exists). Use --force to rebuild.
//! [ERROR matnpz::convert] Could not parse dtu_34871-NL-Transducers/ExpD/sine_1kHz_2Vrms.mat: Reading the MAT-file failed: Reading the header failed: MATLAB 7.3 (HDF5) files are not supported
//! pinknoise_20Hz-200Hz_4Vrms               => numpy_datasets/ExpD/pinknoise_20Hz-200Hz_4Vrms.npz
//! Converted 1, skipped 1, failed 1
//! Failed: dtu_34871-NL-Transducers/ExpD/sine_1kHz_2Vrms.mat
//! Error: 1 conversion(s) failed
//! ```
//!
//! ## Inspect
//!
//! ```console
//! matnpz-inspect 0.1.0
//! Inspect MAT-files, or even entire directories, for their contents
//!
//! USAGE:
//!     matnpz inspect [OPTIONS] [PATH]...
//!
//! ARGS:
//!     <PATH>...    The path(s) to inspect
//!
//! OPTIONS:
//!     -h, --help         Print help information
//!     -r, --recursive    Search the folder recursively
//!     -V, --version      Print version information
//! ```

pub mod batch;
pub mod convert;
pub mod inspect;
pub mod join;
pub(crate) mod utils;
