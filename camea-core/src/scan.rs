//! Raw scan-file model: one measurement sequence as loaded from disk.

use crate::calibration::CalibrationTable;
use crate::error::{Error, Result};
use crate::sample::Sample;
use ndarray::{Array1, Array3};

/// One raw measurement sequence.
///
/// Immutable after construction except for the binning selector, which is
/// re-validated against the calibration table on every change.
///
/// The zero offsets are kept separately for A3 and A4; the original
/// reduction code accumulated the A3 offset into its A4 offset list, which
/// is treated as a bug here and not reproduced.
#[derive(Debug, Clone)]
pub struct ScanFile {
    name: String,
    ei: Array1<f64>,
    a3: Array1<f64>,
    a4: Array1<f64>,
    counts: Array3<u32>,
    monitor: Array1<f64>,
    a3_offset: f64,
    a4_offset: f64,
    binning: usize,
    sample: Sample,
    calibration: CalibrationTable,
    scan_command: String,
    temperature: Option<f64>,
}

impl ScanFile {
    /// Assembles a scan file, validating per-point and per-detector lengths.
    ///
    /// `ei` may hold a single value (constant incident energy) or one value
    /// per scan point. `counts` is `(scan points, detectors, raw pixels)`.
    ///
    /// # Errors
    /// Returns [`Error::GeometryMismatch`] on any length disagreement and
    /// [`Error::CalibrationMissing`] if the requested binning has no
    /// calibration slice.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        ei: Array1<f64>,
        a3: Array1<f64>,
        a4: Array1<f64>,
        counts: Array3<u32>,
        monitor: Array1<f64>,
        a3_offset: f64,
        a4_offset: f64,
        binning: usize,
        sample: Sample,
        calibration: CalibrationTable,
        scan_command: impl Into<String>,
        temperature: Option<f64>,
    ) -> Result<Self> {
        let (points, detectors, _pixels) = counts.dim();
        if a3.len() != points {
            return Err(Error::GeometryMismatch(format!(
                "{} A3 values for {points} scan points",
                a3.len()
            )));
        }
        if monitor.len() != points {
            return Err(Error::GeometryMismatch(format!(
                "{} monitor values for {points} scan points",
                monitor.len()
            )));
        }
        if ei.len() != 1 && ei.len() != points {
            return Err(Error::GeometryMismatch(format!(
                "{} Ei values for {points} scan points (expected 1 or {points})",
                ei.len()
            )));
        }
        if a4.len() != detectors {
            return Err(Error::GeometryMismatch(format!(
                "{} A4 values for {detectors} detectors",
                a4.len()
            )));
        }
        calibration.get(binning)?;
        Ok(Self {
            name: name.into(),
            ei,
            a3,
            a4,
            counts,
            monitor,
            a3_offset,
            a4_offset,
            binning,
            sample,
            calibration,
            scan_command: scan_command.into(),
            temperature,
        })
    }

    /// Selects a new binning resolution.
    ///
    /// # Errors
    /// Returns [`Error::CalibrationMissing`] if no calibration slice exists
    /// for `binning`; the previous selection is kept in that case.
    pub fn set_binning(&mut self, binning: usize) -> Result<()> {
        self.calibration.get(binning)?;
        self.binning = binning;
        Ok(())
    }

    /// File name (without directory).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Incident energy, one value or one per scan point (meV).
    #[inline]
    pub fn ei(&self) -> &Array1<f64> {
        &self.ei
    }

    /// Incident energy at a scan point (meV).
    #[inline]
    pub fn ei_at(&self, point: usize) -> f64 {
        if self.ei.len() == 1 {
            self.ei[0]
        } else {
            self.ei[point]
        }
    }

    /// Sample rotation angles, one per scan point (degrees, uncorrected).
    #[inline]
    pub fn a3(&self) -> &Array1<f64> {
        &self.a3
    }

    /// Detector-bank polar angles, one per detector (degrees).
    #[inline]
    pub fn a4(&self) -> &Array1<f64> {
        &self.a4
    }

    /// Raw counts, `(scan points, detectors, raw pixels)`.
    #[inline]
    pub fn counts(&self) -> &Array3<u32> {
        &self.counts
    }

    /// Monitor counts per scan point.
    #[inline]
    pub fn monitor(&self) -> &Array1<f64> {
        &self.monitor
    }

    /// A3 zero offset (degrees).
    #[inline]
    pub fn a3_offset(&self) -> f64 {
        self.a3_offset
    }

    /// A4 zero offset (degrees).
    #[inline]
    pub fn a4_offset(&self) -> f64 {
        self.a4_offset
    }

    /// Selected calibration binning resolution.
    #[inline]
    pub fn binning(&self) -> usize {
        self.binning
    }

    /// Sample description.
    #[inline]
    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    /// Calibration table loaded with the file.
    #[inline]
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Scan command string recorded by the instrument control software.
    #[inline]
    pub fn scan_command(&self) -> &str {
        &self.scan_command
    }

    /// Sample temperature (K), if recorded.
    #[inline]
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Number of scan points.
    #[inline]
    pub fn scan_points(&self) -> usize {
        self.counts.dim().0
    }

    /// Number of detectors.
    #[inline]
    pub fn detectors(&self) -> usize {
        self.counts.dim().1
    }

    /// Raw pixels per detector.
    #[inline]
    pub fn raw_pixels(&self) -> usize {
        self.counts.dim().2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::tests::simple_slice;
    use crate::sample::UnitCell;
    use ndarray::{arr1, Array3};

    fn sample() -> Sample {
        let cell = UnitCell::new(4.0, 4.0, 4.0, 90.0, 90.0, 90.0).unwrap();
        Sample::new("s", cell, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).unwrap()
    }

    fn table() -> CalibrationTable {
        let mut t = CalibrationTable::new();
        t.insert(simple_slice(1));
        t
    }

    fn scan() -> ScanFile {
        ScanFile::new(
            "scan.h5",
            arr1(&[5.0]),
            arr1(&[0.0, 90.0]),
            arr1(&[0.0]),
            Array3::zeros((2, 1, 2)),
            arr1(&[1000.0, 1000.0]),
            0.0,
            0.0,
            1,
            sample(),
            table(),
            "a3 scan",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_ei_broadcast() {
        let s = scan();
        assert_eq!(s.ei_at(0), 5.0);
        assert_eq!(s.ei_at(1), 5.0);
    }

    #[test]
    fn test_length_validation() {
        let result = ScanFile::new(
            "bad.h5",
            arr1(&[5.0]),
            arr1(&[0.0]), // 1 A3 value for 2 scan points
            arr1(&[0.0]),
            Array3::zeros((2, 1, 2)),
            arr1(&[1000.0, 1000.0]),
            0.0,
            0.0,
            1,
            sample(),
            table(),
            "",
            None,
        );
        assert!(matches!(result, Err(Error::GeometryMismatch(_))));
    }

    #[test]
    fn test_set_binning() {
        let mut s = scan();
        assert!(matches!(
            s.set_binning(8),
            Err(Error::CalibrationMissing { binning: 8 })
        ));
        assert_eq!(s.binning(), 1);
        s.set_binning(1).unwrap();
    }
}
