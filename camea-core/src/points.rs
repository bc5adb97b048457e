//! Converted point cloud: the (Qx, Qy, dE) data produced by conversion.

use crate::error::{Error, Result};
use crate::sample::Sample;
use ndarray::{Array1, Array3};

/// Conversion result: six arrays of identical shape
/// `(scan points, detectors, software pixels)` plus copied scan metadata.
///
/// `normalization` is NaN or 0 exactly where a pixel is dead; such points
/// must be excluded from downstream denominators by the caller.
#[derive(Debug, Clone)]
pub struct ConvertedData {
    qx: Array3<f64>,
    qy: Array3<f64>,
    energy: Array3<f64>,
    intensity: Array3<f64>,
    normalization: Array3<f64>,
    monitor: Array3<f64>,
    meta: ScanMeta,
}

/// Raw metadata copied into the converted artifact.
#[derive(Debug, Clone)]
pub struct ScanMeta {
    /// Source file name.
    pub name: String,
    /// Incident energy, one value or one per scan point (meV).
    pub ei: Array1<f64>,
    /// Sample rotation per scan point (degrees, uncorrected).
    pub a3: Array1<f64>,
    /// Detector polar angle per detector (degrees).
    pub a4: Array1<f64>,
    /// Monitor counts per scan point.
    pub monitor: Array1<f64>,
    /// A3 zero offset (degrees).
    pub a3_offset: f64,
    /// A4 zero offset (degrees).
    pub a4_offset: f64,
    /// Calibration binning resolution used for the conversion.
    pub binning: usize,
    /// Sample description.
    pub sample: Sample,
    /// Scan command string.
    pub scan_command: String,
}

impl ConvertedData {
    /// Bundles the six conversion arrays, checking that they share a shape.
    ///
    /// # Errors
    /// Returns [`Error::ConversionError`] on any shape disagreement.
    pub fn new(
        qx: Array3<f64>,
        qy: Array3<f64>,
        energy: Array3<f64>,
        intensity: Array3<f64>,
        normalization: Array3<f64>,
        monitor: Array3<f64>,
        meta: ScanMeta,
    ) -> Result<Self> {
        let dim = qx.dim();
        for (name, d) in [
            ("qy", qy.dim()),
            ("energy", energy.dim()),
            ("intensity", intensity.dim()),
            ("normalization", normalization.dim()),
            ("monitor", monitor.dim()),
        ] {
            if d != dim {
                return Err(Error::ConversionError(format!(
                    "converted array '{name}' has shape {d:?}, expected {dim:?}"
                )));
            }
        }
        Ok(Self {
            qx,
            qy,
            energy,
            intensity,
            normalization,
            monitor,
            meta,
        })
    }

    /// Qx per point (1/Å, lab frame).
    #[inline]
    pub fn qx(&self) -> &Array3<f64> {
        &self.qx
    }

    /// Qy per point (1/Å, lab frame).
    #[inline]
    pub fn qy(&self) -> &Array3<f64> {
        &self.qy
    }

    /// Energy transfer Ei - Ef per point (meV).
    #[inline]
    pub fn energy(&self) -> &Array3<f64> {
        &self.energy
    }

    /// Summed counts per software pixel.
    #[inline]
    pub fn intensity(&self) -> &Array3<f64> {
        &self.intensity
    }

    /// Detector/analyser efficiency normalization per point.
    #[inline]
    pub fn normalization(&self) -> &Array3<f64> {
        &self.normalization
    }

    /// Monitor counts broadcast per point.
    #[inline]
    pub fn monitor(&self) -> &Array3<f64> {
        &self.monitor
    }

    /// Copied raw metadata.
    #[inline]
    pub fn meta(&self) -> &ScanMeta {
        &self.meta
    }

    /// Shape shared by all arrays, `(scan points, detectors, software pixels)`.
    #[inline]
    pub fn dim(&self) -> (usize, usize, usize) {
        self.qx.dim()
    }

    /// Total number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.qx.len()
    }

    /// Whether the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.qx.is_empty()
    }

    /// Mask of live pixels: true where the normalization is finite and
    /// nonzero, so the point is safe to use in a denominator.
    pub fn nonzero_mask(&self) -> Array3<bool> {
        self.normalization.mapv(|v| v.is_finite() && v != 0.0)
    }

    /// Flattened `[qx, qy, energy]` position arrays for the cutting engines.
    pub fn flat_positions(&self) -> [Array1<f64>; 3] {
        [
            self.qx.iter().copied().collect(),
            self.qy.iter().copied().collect(),
            self.energy.iter().copied().collect(),
        ]
    }

    /// Flattened `[intensity, normalization, monitor]` weight arrays.
    pub fn flat_weights(&self) -> [Array1<f64>; 3] {
        [
            self.intensity.iter().copied().collect(),
            self.normalization.iter().copied().collect(),
            self.monitor.iter().copied().collect(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::UnitCell;
    use ndarray::arr1;

    fn meta() -> ScanMeta {
        let cell = UnitCell::new(4.0, 4.0, 4.0, 90.0, 90.0, 90.0).unwrap();
        ScanMeta {
            name: "scan.h5".into(),
            ei: arr1(&[5.0]),
            a3: arr1(&[0.0]),
            a4: arr1(&[0.0]),
            monitor: arr1(&[1000.0]),
            a3_offset: 0.0,
            a4_offset: 0.0,
            binning: 1,
            sample: Sample::new("s", cell, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).unwrap(),
            scan_command: String::new(),
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let a = Array3::zeros((1, 1, 2));
        let b = Array3::zeros((1, 2, 2));
        let result = ConvertedData::new(
            a.clone(),
            b,
            a.clone(),
            a.clone(),
            a.clone(),
            a,
            meta(),
        );
        assert!(matches!(result, Err(Error::ConversionError(_))));
    }

    #[test]
    fn test_nonzero_mask_flags_dead_pixels() {
        let a = Array3::ones((1, 1, 3));
        let mut norm = a.clone();
        norm[[0, 0, 1]] = 0.0;
        norm[[0, 0, 2]] = f64::NAN;
        let data = ConvertedData::new(
            a.clone(),
            a.clone(),
            a.clone(),
            a.clone(),
            norm,
            a,
            meta(),
        )
        .unwrap();
        let mask = data.nonzero_mask();
        assert!(mask[[0, 0, 0]]);
        assert!(!mask[[0, 0, 1]]);
        assert!(!mask[[0, 0, 2]]);
    }

    #[test]
    fn test_flat_views() {
        let a = Array3::from_shape_fn((1, 1, 3), |(_, _, p)| p as f64);
        let data = ConvertedData::new(
            a.clone(),
            a.clone(),
            a.clone(),
            a.clone(),
            a.clone(),
            a,
            meta(),
        )
        .unwrap();
        assert_eq!(data.len(), 3);
        let [qx, _, _] = data.flat_positions();
        assert_eq!(qx.to_vec(), vec![0.0, 1.0, 2.0]);
    }
}
