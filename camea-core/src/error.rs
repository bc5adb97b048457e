//! Error types for camea-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for camea operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Lattice parameter outside its physical range.
    #[error("invalid lattice parameter {parameter}: {value} (lengths must be > 0, angles in (0, 180))")]
    InvalidLatticeParameter {
        /// Name of the offending parameter (`a`, `b`, `c`, `alpha`, `beta`, `gamma`).
        parameter: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The two orientation vectors are parallel, so no 2D projection exists.
    #[error("degenerate sample orientation: projection vectors are parallel")]
    DegenerateOrientation,

    /// No calibration slice exists for the requested binning resolution.
    #[error("no calibration present for binning {binning}")]
    CalibrationMissing {
        /// The requested binning resolution (software pixels per energy channel).
        binning: usize,
    },

    /// Calibration table violates its structural invariants.
    #[error("invalid calibration table: {0}")]
    InvalidCalibration(String),

    /// Raw data geometry disagrees with the instrument/calibration geometry.
    #[error("geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Shape mismatch between raw data and calibration during conversion.
    #[error("conversion failed: {0}")]
    ConversionError(String),

    /// Input arrays to a binning or cutting operation disagree in length.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Bin step or tolerance that must be strictly positive.
    #[error("invalid bin step {name}: {value} (must be > 0)")]
    InvalidStep {
        /// Name of the offending parameter.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Unknown Q-plane binning mode string.
    #[error("unsupported binning mode '{0}' (expected 'xy' or 'polar')")]
    UnsupportedBinningMode(String),
}
