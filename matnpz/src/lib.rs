//! Tooling for turning MATLAB loudspeaker measurement recordings into NumPy archives.
//!
//! The [`mat`] module reads (and writes) Level 5 MAT-files. Their variables are [flattened](flatten)
//! into named arrays, renamed following a [canonical](canonical) convention and written to an
//! [`.npz`](npz) archive with a JSON [sidecar](sidecar) describing every array. The
//! [`convert`] module ties these together for single files and whole directories.
//!
//! Raw recordings are often distributed as split archives, which [`join`] reassembles.
//!
//! MAT-files in the HDF5 based 7.3 format are not supported.

pub mod canonical;
pub mod convert;
pub mod flatten;
pub mod join;
pub mod mat;
pub mod npz;
pub mod sidecar;
