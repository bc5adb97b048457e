//! camea-io: Calibration-table and HDF5/NeXus I/O for CAMEA data reduction.
//!
//! The plain-text `.calib` format is always available; raw scan files and
//! converted artifacts need the `hdf5` feature.

mod calib_text;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;

pub use calib_text::{read_calibration, write_calibration};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{read_converted, read_scan, write_converted, Provenance, SchemaMap};
