//! Pixel-to-reciprocal-space conversion.
//!
//! Maps raw detector counts, instrument angles, and the calibration tables
//! into one (Qx, Qy, dE, intensity, normalization, monitor) point per
//! (scan point, detector, software pixel).

use camea_core::{ConvertedData, Error, Result, ScanFile, ScanMeta, FACTOR_SQRT_E_TO_K};
use ndarray::{Array2, Array3};

/// Converts a raw scan file into a (Qx, Qy, dE) point cloud.
///
/// Raw per-pixel counts are integrated (summed, not interpolated) into
/// software pixels over the calibration's `[lower, upper)` raw-pixel
/// ranges. Per software pixel, the scattering angle is the calibrated A4
/// plus the file-level zero offset, and the analyser energy Ef comes from
/// the calibration. With `ki = 0.694692 * sqrt(Ei)` and
/// `kf = 0.694692 * sqrt(Ef)` the in-plane momentum transfer is
///
/// ```text
/// qx_local = ki - kf cos(a4)        qx = qx_local cos(a3) - qy_local sin(a3)
/// qy_local =    - kf sin(a4)        qy = qx_local sin(a3) + qy_local cos(a3)
/// ```
///
/// with a3 the offset-corrected sample rotation of the scan point, and
/// `dE = Ei - Ef`. Monitor and the integrated-peak-area normalization are
/// broadcast to the full per-point shape; dead pixels propagate NaN/0
/// normalization for downstream filtering.
///
/// # Errors
/// - [`Error::CalibrationMissing`] if the file's selected binning has no
///   calibration slice.
/// - [`Error::GeometryMismatch`] if the detector count or the raw pixels
///   per detector disagree with the calibration geometry.
/// - [`Error::ConversionError`] on any other raw/calibration shape
///   disagreement; fatal, never retried.
pub fn convert(scan: &ScanFile) -> Result<ConvertedData> {
    let slice = scan.calibration().get(scan.binning())?;

    let points = scan.scan_points();
    let detectors = scan.detectors();
    let raw_pixels = scan.raw_pixels();
    let soft_pixels = slice.software_pixels();

    if slice.detectors() != detectors {
        return Err(Error::GeometryMismatch(format!(
            "data has {detectors} detectors, calibration has {}",
            slice.detectors()
        )));
    }
    let edge_span = slice.upper().iter().copied().max().unwrap_or(0);
    if edge_span > raw_pixels {
        return Err(Error::GeometryMismatch(format!(
            "data has {raw_pixels} raw pixels per detector, calibration edges reach {edge_span}"
        )));
    }

    // Integrate raw pixels into software pixels over the edge ranges.
    let counts = scan.counts();
    let mut intensity = Array3::<f64>::zeros((points, detectors, soft_pixels));
    for p in 0..points {
        for d in 0..detectors {
            for s in 0..soft_pixels {
                let lower = slice.lower()[[d, s]];
                let upper = slice.upper()[[d, s]];
                let mut sum = 0.0;
                for raw in lower..upper {
                    sum += f64::from(counts[[p, d, raw]]);
                }
                intensity[[p, d, s]] = sum;
            }
        }
    }

    // Per-software-pixel kinematics, shared across scan points.
    let a4_offset = scan.a4_offset().to_radians();
    let a4 = slice.a4().mapv(|deg| deg.to_radians() + a4_offset);
    let kf: Array2<f64> = slice.ef().mapv(|ef| FACTOR_SQRT_E_TO_K * ef.sqrt());
    let norm_area = slice.norm_area();

    let mut qx = Array3::<f64>::zeros((points, detectors, soft_pixels));
    let mut qy = Array3::<f64>::zeros((points, detectors, soft_pixels));
    let mut energy = Array3::<f64>::zeros((points, detectors, soft_pixels));
    let mut normalization = Array3::<f64>::zeros((points, detectors, soft_pixels));
    let mut monitor = Array3::<f64>::zeros((points, detectors, soft_pixels));

    for p in 0..points {
        let ei = scan.ei_at(p);
        let ki = FACTOR_SQRT_E_TO_K * ei.sqrt();
        let a3 = (scan.a3()[p] + scan.a3_offset()).to_radians();
        let (sin_a3, cos_a3) = a3.sin_cos();
        let mon = scan.monitor()[p];
        for d in 0..detectors {
            for s in 0..soft_pixels {
                let (sin_a4, cos_a4) = a4[[d, s]].sin_cos();
                let qx_local = ki - kf[[d, s]] * cos_a4;
                let qy_local = -kf[[d, s]] * sin_a4;
                qx[[p, d, s]] = qx_local * cos_a3 - qy_local * sin_a3;
                qy[[p, d, s]] = qx_local * sin_a3 + qy_local * cos_a3;
                energy[[p, d, s]] = ei - slice.ef()[[d, s]];
                normalization[[p, d, s]] = norm_area[[d, s]];
                monitor[[p, d, s]] = mon;
            }
        }
    }

    let meta = ScanMeta {
        name: scan.name().to_owned(),
        ei: scan.ei().clone(),
        a3: scan.a3().clone(),
        a4: scan.a4().clone(),
        monitor: scan.monitor().clone(),
        a3_offset: scan.a3_offset(),
        a4_offset: scan.a4_offset(),
        binning: scan.binning(),
        sample: scan.sample().clone(),
        scan_command: scan.scan_command().to_owned(),
    };

    ConvertedData::new(qx, qy, energy, intensity, normalization, monitor, meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use camea_core::{CalibrationSlice, CalibrationTable, Sample, UnitCell};
    use ndarray::{arr1, Array2, Array3};

    fn sample() -> Sample {
        let cell = UnitCell::new(4.0, 4.0, 4.0, 90.0, 90.0, 90.0).unwrap();
        Sample::new("s", cell, [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]).unwrap()
    }

    /// One detector, one analyser, one software pixel covering raw pixels [0, 2).
    fn calibration(ef: f64, a4_deg: f64) -> CalibrationTable {
        let slice = CalibrationSlice::new(
            1,
            1,
            Array2::from_elem((1, 1), 10.0),
            Array2::from_elem((1, 1), ef),
            Array2::from_elem((1, 1), 0.5),
            Array2::zeros((1, 1)),
            Array2::from_elem((1, 1), a4_deg),
            Array2::zeros((1, 1)),
            Array2::from_elem((1, 1), 2usize),
        )
        .unwrap();
        let mut table = CalibrationTable::new();
        table.insert(slice);
        table
    }

    fn scan(a3: &[f64], counts: Array3<u32>) -> ScanFile {
        let points = a3.len();
        ScanFile::new(
            "scan.h5",
            arr1(&[5.0]),
            arr1(a3),
            arr1(&[0.0]),
            counts,
            arr1(&vec![1000.0; points]),
            0.0,
            0.0,
            1,
            sample(),
            calibration(4.0, 0.0),
            "a3 scan",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_forward_scattering_qx_is_ki_minus_kf() {
        // Ei = 5, Ef = 4, A3 = A4 = 0: Qx = ki - kf exactly, Qy = 0.
        let data = convert(&scan(&[0.0], Array3::ones((1, 1, 2)))).unwrap();
        let ki = FACTOR_SQRT_E_TO_K * 5.0_f64.sqrt();
        let kf = FACTOR_SQRT_E_TO_K * 4.0_f64.sqrt();
        assert_relative_eq!(data.qx()[[0, 0, 0]], ki - kf);
        assert_relative_eq!(data.qy()[[0, 0, 0]], 0.0);
        assert_relative_eq!(data.energy()[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_a3_rotation_end_to_end() {
        // Two scan points at A3 = 0 and 90 degrees.
        let data = convert(&scan(&[0.0, 90.0], Array3::ones((2, 1, 2)))).unwrap();
        let ki = FACTOR_SQRT_E_TO_K * 5.0_f64.sqrt();
        let kf = FACTOR_SQRT_E_TO_K * 4.0_f64.sqrt();
        let qx_local = ki - kf;
        let qy_local = 0.0;
        assert_relative_eq!(data.qx()[[0, 0, 0]], qx_local);
        // 90 degree rotation swaps the local components.
        assert_relative_eq!(data.qx()[[1, 0, 0]], -qy_local, epsilon = 1e-12);
        assert_relative_eq!(data.qy()[[1, 0, 0]], qx_local, epsilon = 1e-12);
    }

    #[test]
    fn test_software_pixel_integration() {
        // Raw pixels [0, 2) sum into the single software pixel.
        let mut counts = Array3::zeros((1, 1, 3));
        counts[[0, 0, 0]] = 3;
        counts[[0, 0, 1]] = 4;
        counts[[0, 0, 2]] = 100; // outside the edge range
        let data = convert(&scan(&[0.0], counts)).unwrap();
        assert_relative_eq!(data.intensity()[[0, 0, 0]], 7.0);
    }

    #[test]
    fn test_normalization_and_monitor_broadcast() {
        let data = convert(&scan(&[0.0, 90.0], Array3::ones((2, 1, 2)))).unwrap();
        let area = 10.0 * 0.5 * (2.0 * std::f64::consts::PI).sqrt();
        assert_relative_eq!(data.normalization()[[1, 0, 0]], area);
        assert_relative_eq!(data.monitor()[[1, 0, 0]], 1000.0);
    }

    #[test]
    fn test_geometry_mismatch_on_short_raw_axis() {
        // Calibration edges reach raw pixel 2 but the data has only 1.
        let result = convert(&scan(&[0.0], Array3::ones((1, 1, 1))));
        assert!(matches!(result, Err(Error::GeometryMismatch(_))));
    }

    #[test]
    fn test_missing_binning_is_calibration_missing() {
        let mut file = scan(&[0.0], Array3::ones((1, 1, 2)));
        assert!(matches!(
            file.set_binning(8),
            Err(Error::CalibrationMissing { binning: 8 })
        ));
    }
}
