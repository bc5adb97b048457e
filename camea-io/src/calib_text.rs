//! Plain-text calibration table format.
//!
//! Three header lines (description with pixel count and source files,
//! generation timestamp, column header), then one CSV row per
//! (detector, analyser, pixel):
//!
//! ```text
//! Detector,Energy,Pixel,Amplitude,Center,Width,Background,lowerBin,upperBin[,A4Offset]
//! ```
//!
//! The `Center` column is the fitted analyser energy Ef in meV; the optional
//! trailing column is the per-detector A4 offset in degrees, repeated on
//! every row of the detector.

use crate::error::{Error, Result};
use camea_core::CalibrationSlice;
use ndarray::Array2;
use std::fmt::Write as _;
use std::path::Path;

const HEADER_LINES: usize = 3;

/// Reads a calibration table from a `.calib` file.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be read,
/// [`Error::MalformedCalibration`] on any malformed row, and
/// [`Error::Core`] if the assembled table violates its invariants.
pub fn read_calibration(path: impl AsRef<Path>) -> Result<CalibrationSlice> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_calibration(&text, path)
}

struct Row {
    detector: usize,
    analyser: usize,
    pixel: usize,
    amplitude: f64,
    ef: f64,
    width: f64,
    background: f64,
    lower: usize,
    upper: usize,
    a4_offset: f64,
}

fn parse_calibration(text: &str, path: &Path) -> Result<CalibrationSlice> {
    let malformed = |line: usize, message: String| Error::MalformedCalibration {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut rows: Vec<Row> = Vec::new();
    for (index, line) in text.lines().enumerate().skip(HEADER_LINES) {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 9 && fields.len() != 10 {
            return Err(malformed(
                line_no,
                format!("{} columns, expected 9 or 10", fields.len()),
            ));
        }
        let int = |i: usize| -> Result<usize> {
            fields[i]
                .parse()
                .map_err(|e| malformed(line_no, format!("column {}: {e}", i + 1)))
        };
        let float = |i: usize| -> Result<f64> {
            fields[i]
                .parse()
                .map_err(|e| malformed(line_no, format!("column {}: {e}", i + 1)))
        };
        // The edge columns are written as floats by the fit code but must be
        // non-negative raw-pixel indices.
        let edge = |i: usize| -> Result<usize> {
            let value = float(i)?;
            if !(value >= 0.0) {
                return Err(malformed(
                    line_no,
                    format!("column {}: negative edge {value}", i + 1),
                ));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let index = value as usize;
            Ok(index)
        };
        rows.push(Row {
            detector: int(0)?,
            analyser: int(1)?,
            pixel: int(2)?,
            amplitude: float(3)?,
            ef: float(4)?,
            width: float(5)?,
            background: float(6)?,
            lower: edge(7)?,
            upper: edge(8)?,
            a4_offset: if fields.len() == 10 { float(9)? } else { 0.0 },
        });
    }
    if rows.is_empty() {
        return Err(malformed(HEADER_LINES + 1, "no data rows".into()));
    }

    let detectors = rows.iter().map(|r| r.detector).max().unwrap_or(0) + 1;
    let analysers = rows.iter().map(|r| r.analyser).max().unwrap_or(0) + 1;
    let binning = rows.iter().map(|r| r.pixel).max().unwrap_or(0) + 1;
    let soft_pixels = analysers * binning;

    let mut amplitude = Array2::from_elem((detectors, soft_pixels), f64::NAN);
    let mut ef = Array2::from_elem((detectors, soft_pixels), f64::NAN);
    let mut width = Array2::from_elem((detectors, soft_pixels), f64::NAN);
    let mut background = Array2::from_elem((detectors, soft_pixels), f64::NAN);
    let mut a4 = Array2::zeros((detectors, soft_pixels));
    let mut lower = Array2::zeros((detectors, soft_pixels));
    let mut upper = Array2::zeros((detectors, soft_pixels));
    for row in &rows {
        let s = row.analyser * binning + row.pixel;
        amplitude[[row.detector, s]] = row.amplitude;
        ef[[row.detector, s]] = row.ef;
        width[[row.detector, s]] = row.width;
        background[[row.detector, s]] = row.background;
        a4[[row.detector, s]] = row.a4_offset;
        lower[[row.detector, s]] = row.lower;
        upper[[row.detector, s]] = row.upper;
    }

    Ok(CalibrationSlice::new(
        binning, analysers, amplitude, ef, width, background, a4, lower, upper,
    )?)
}

/// Writes a calibration table in the `.calib` format.
///
/// `source` names the measurement files the table was fitted from and
/// `performed` is the generation timestamp, both free-form strings copied
/// into the header.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be written.
pub fn write_calibration(
    path: impl AsRef<Path>,
    slice: &CalibrationSlice,
    source: &str,
    performed: &str,
) -> Result<()> {
    let path = path.as_ref();
    let binning = slice.binning();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Normalization for {binning} pixel(s) using {source}"
    );
    let _ = writeln!(out, "Performed {performed}");
    let _ = writeln!(
        out,
        "Detector,Energy,Pixel,Amplitude,Center,Width,Background,lowerBin,upperBin,A4Offset"
    );
    for det in 0..slice.detectors() {
        for s in 0..slice.software_pixels() {
            let analyser = s / binning;
            let pixel = s % binning;
            let _ = writeln!(
                out,
                "{det},{analyser},{pixel},{},{},{},{},{},{},{}",
                slice.amplitude()[[det, s]],
                slice.ef()[[det, s]],
                slice.width()[[det, s]],
                slice.background()[[det, s]],
                slice.lower()[[det, s]],
                slice.upper()[[det, s]],
                slice.a4()[[det, s]],
            );
        }
    }
    std::fs::write(path, out).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
