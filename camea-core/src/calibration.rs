//! Calibration tables: per-software-pixel energy, angle, and efficiency data.
//!
//! A [`CalibrationSlice`] holds the fitted Gaussian parameters and active
//! raw-pixel ranges for one binning resolution; a [`CalibrationTable`] maps
//! binning resolutions to slices.

use crate::error::{Error, Result};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Calibration data for one binning resolution.
///
/// All arrays are shaped `(detectors, e_pr_detector * binning)`: one entry
/// per software pixel. The Gaussian parameters come from fitting the
/// vanadium energy scan per software pixel; `a4` already folds in the
/// per-detector offset found in the powder A4 scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSlice {
    binning: usize,
    e_pr_detector: usize,
    amplitude: Array2<f64>,
    ef: Array2<f64>,
    width: Array2<f64>,
    background: Array2<f64>,
    a4: Array2<f64>,
    lower: Array2<usize>,
    upper: Array2<usize>,
}

impl CalibrationSlice {
    /// Assembles a slice and checks its structural invariants.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCalibration`] if array shapes disagree, the
    /// software-pixel count is not `e_pr_detector * binning`, or any
    /// detector's raw-pixel edges are empty, decreasing, or overlapping.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        binning: usize,
        e_pr_detector: usize,
        amplitude: Array2<f64>,
        ef: Array2<f64>,
        width: Array2<f64>,
        background: Array2<f64>,
        a4: Array2<f64>,
        lower: Array2<usize>,
        upper: Array2<usize>,
    ) -> Result<Self> {
        let dim = amplitude.dim();
        for (name, d) in [
            ("ef", ef.dim()),
            ("width", width.dim()),
            ("background", background.dim()),
            ("a4", a4.dim()),
            ("lower", lower.dim()),
            ("upper", upper.dim()),
        ] {
            if d != dim {
                return Err(Error::InvalidCalibration(format!(
                    "array '{name}' has shape {d:?}, expected {dim:?}"
                )));
            }
        }
        if dim.1 != e_pr_detector * binning {
            return Err(Error::InvalidCalibration(format!(
                "{} software pixels per detector, expected e_pr_detector * binning = {}",
                dim.1,
                e_pr_detector * binning
            )));
        }
        for det in 0..dim.0 {
            for pix in 0..dim.1 {
                if lower[[det, pix]] >= upper[[det, pix]] {
                    return Err(Error::InvalidCalibration(format!(
                        "detector {det}, software pixel {pix}: empty edge range [{}, {})",
                        lower[[det, pix]],
                        upper[[det, pix]]
                    )));
                }
                if pix > 0 && lower[[det, pix]] < upper[[det, pix - 1]] {
                    return Err(Error::InvalidCalibration(format!(
                        "detector {det}: software pixels {} and {pix} overlap",
                        pix - 1
                    )));
                }
            }
        }
        Ok(Self {
            binning,
            e_pr_detector,
            amplitude,
            ef,
            width,
            background,
            a4,
            lower,
            upper,
        })
    }

    /// Binning resolution (software pixels per energy channel).
    #[inline]
    pub fn binning(&self) -> usize {
        self.binning
    }

    /// Analyser energies per detector.
    #[inline]
    pub fn e_pr_detector(&self) -> usize {
        self.e_pr_detector
    }

    /// Number of detectors.
    #[inline]
    pub fn detectors(&self) -> usize {
        self.amplitude.dim().0
    }

    /// Software pixels per detector.
    #[inline]
    pub fn software_pixels(&self) -> usize {
        self.amplitude.dim().1
    }

    /// Fitted peak amplitudes.
    #[inline]
    pub fn amplitude(&self) -> &Array2<f64> {
        &self.amplitude
    }

    /// Effective analyser energy per software pixel (meV).
    #[inline]
    pub fn ef(&self) -> &Array2<f64> {
        &self.ef
    }

    /// Fitted Gaussian widths.
    #[inline]
    pub fn width(&self) -> &Array2<f64> {
        &self.width
    }

    /// Fitted backgrounds.
    #[inline]
    pub fn background(&self) -> &Array2<f64> {
        &self.background
    }

    /// Scattering angle per software pixel (degrees, detector offset folded in).
    #[inline]
    pub fn a4(&self) -> &Array2<f64> {
        &self.a4
    }

    /// Lower raw-pixel edge (inclusive) per software pixel.
    #[inline]
    pub fn lower(&self) -> &Array2<usize> {
        &self.lower
    }

    /// Upper raw-pixel edge (exclusive) per software pixel.
    #[inline]
    pub fn upper(&self) -> &Array2<usize> {
        &self.upper
    }

    /// Integrated Gaussian peak area, `amplitude * sqrt(2 pi) * width`.
    ///
    /// This is the efficiency normalization applied during conversion; dead
    /// pixels carry NaN or 0 here and must be filtered downstream.
    pub fn norm_area(&self) -> Array2<f64> {
        let factor = (2.0 * std::f64::consts::PI).sqrt();
        &self.amplitude * &self.width * factor
    }
}

/// Calibration slices keyed by binning resolution.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    slices: BTreeMap<usize, CalibrationSlice>,
}

impl CalibrationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a slice under its own binning resolution.
    pub fn insert(&mut self, slice: CalibrationSlice) {
        self.slices.insert(slice.binning(), slice);
    }

    /// Looks up the slice for a binning resolution.
    ///
    /// # Errors
    /// Returns [`Error::CalibrationMissing`] if no slice is present.
    pub fn get(&self, binning: usize) -> Result<&CalibrationSlice> {
        self.slices
            .get(&binning)
            .ok_or(Error::CalibrationMissing { binning })
    }

    /// Whether a slice exists for the binning resolution.
    #[inline]
    pub fn contains(&self, binning: usize) -> bool {
        self.slices.contains_key(&binning)
    }

    /// Available binning resolutions, ascending.
    pub fn binnings(&self) -> Vec<usize> {
        self.slices.keys().copied().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    pub(crate) fn simple_slice(binning: usize) -> CalibrationSlice {
        // One detector, one analyser energy, `binning` software pixels.
        let n = binning;
        let amplitude = Array2::from_elem((1, n), 10.0);
        let ef = Array2::from_elem((1, n), 4.0);
        let width = Array2::from_elem((1, n), 0.5);
        let background = Array2::zeros((1, n));
        let a4 = Array2::zeros((1, n));
        let lower = Array2::from_shape_fn((1, n), |(_, p)| p * 2);
        let upper = Array2::from_shape_fn((1, n), |(_, p)| p * 2 + 2);
        CalibrationSlice::new(
            binning, 1, amplitude, ef, width, background, a4, lower, upper,
        )
        .unwrap()
    }

    #[test]
    fn test_norm_area() {
        let slice = simple_slice(1);
        let area = slice.norm_area();
        assert_relative_eq!(
            area[[0, 0]],
            10.0 * 0.5 * (2.0 * std::f64::consts::PI).sqrt()
        );
    }

    #[test]
    fn test_pixel_count_invariant() {
        let amplitude = Array2::zeros((1, 3));
        let result = CalibrationSlice::new(
            2, // e_pr_detector * binning = 2 != 3
            1,
            amplitude.clone(),
            amplitude.clone(),
            amplitude.clone(),
            amplitude.clone(),
            amplitude,
            Array2::zeros((1, 3)),
            Array2::ones((1, 3)),
        );
        assert!(matches!(result, Err(Error::InvalidCalibration(_))));
    }

    #[test]
    fn test_overlapping_edges_rejected() {
        let a = Array2::zeros((1, 2));
        let lower = arr2(&[[0usize, 3]]);
        let upper = arr2(&[[4usize, 6]]); // [0,4) overlaps [3,6)
        let result =
            CalibrationSlice::new(2, 1, a.clone(), a.clone(), a.clone(), a.clone(), a, lower, upper);
        assert!(matches!(result, Err(Error::InvalidCalibration(_))));
    }

    #[test]
    fn test_table_lookup() {
        let mut table = CalibrationTable::new();
        table.insert(simple_slice(1));
        table.insert(simple_slice(3));
        assert!(table.get(1).is_ok());
        assert!(table.contains(3));
        assert_eq!(table.binnings(), vec![1, 3]);
        match table.get(8) {
            Err(Error::CalibrationMissing { binning }) => assert_eq!(binning, 8),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
