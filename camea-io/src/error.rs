//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error with the offending path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// Underlying cause.
        source: std::io::Error,
    },

    /// Malformed calibration table.
    #[error("malformed calibration table {path}, line {line}: {message}")]
    MalformedCalibration {
        /// The file being parsed.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A dataset named by the schema map is absent from the file.
    #[error("missing dataset '{dataset}' in {path}")]
    MissingDataset {
        /// The file being read.
        path: PathBuf,
        /// Schema-map dataset path.
        dataset: String,
    },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] camea_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Invalid string for an HDF5 variable-length field.
    #[cfg(feature = "hdf5")]
    #[error("invalid HDF5 string: {0}")]
    InvalidString(String),
}
