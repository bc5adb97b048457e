//! camea-algorithms: Conversion, binning, and cutting engines.
//!
//! This crate holds the numerical core of the reduction chain:
//! pixel-to-reciprocal-space conversion, the regular/adaptive binning
//! engine, oriented 1D line cuts, powder |Q| cuts, and Q-plane binning.
//! Everything operates synchronously on in-memory arrays.

pub mod binning;
pub mod convert;
pub mod cut;
pub mod powder;

pub use binning::{bin_3d, bin_edges, Binned3D, GridEdges};
pub use convert::convert;
pub use cut::{cut_1d, CutResult1D};
pub use powder::{bin_q_plane, cut_powder, PowderCut, QPlaneMode, QPlaneResult};
