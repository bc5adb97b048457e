//! camea-core: Core types for CAMEA multiplexing-spectrometer data reduction.
//!
//! This crate provides the data model shared by the reduction pipeline:
//! validated sample/unit-cell descriptions, calibration tables, the raw
//! scan-file model, and the converted (Qx, Qy, dE) point cloud.

pub mod calibration;
pub mod error;
pub mod points;
pub mod sample;
pub mod scan;

pub use calibration::{CalibrationSlice, CalibrationTable};
pub use error::{Error, Result};
pub use points::{ConvertedData, ScanMeta};
pub use sample::{Sample, UnitCell};
pub use scan::ScanFile;

/// Conversion factor from sqrt(meV) to 1/Å for neutron wavenumbers,
/// `k = 0.694692 * sqrt(E)`.
///
/// Fixed historical constant of the reduction chain; reproduced bit-for-bit
/// rather than re-derived from CODATA values.
pub const FACTOR_SQRT_E_TO_K: f64 = 0.694692;
