//! Powder |Q| cuts and Q-plane binning.

use crate::binning::{bin_edges, check_step, count_1d, histogram_1d};
use camea_core::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use std::str::FromStr;

/// Powder cut result: one entry per energy slice.
#[derive(Debug, Clone, Default)]
pub struct PowderCut {
    /// Summed intensity per |Q| bin, per energy slice.
    pub intensity: Vec<Array1<f64>>,
    /// Summed monitor per |Q| bin, per energy slice.
    pub monitor: Vec<Array1<f64>>,
    /// Summed normalization per |Q| bin, per energy slice.
    pub normalization: Vec<Array1<f64>>,
    /// Number of raw points per |Q| bin, per energy slice.
    pub counts: Vec<Array1<u64>>,
    /// Adaptive |Q| edges per energy slice.
    pub q_edges: Vec<Array1<f64>>,
}

/// Cuts the point cloud into powder-averaged |Q| spectra, one per energy slice.
///
/// For each consecutive pair of `e_bin_edges` (lower-exclusive,
/// upper-inclusive, so consecutive slices partition the points), |Q| is
/// computed for the points inside the slice and binned against adaptive
/// edges with `q_min_bin` as the minimum bin size. Slices with fewer than
/// two distinct |Q| values get empty arrays.
///
/// # Errors
/// Returns [`Error::InvalidStep`] if `q_min_bin` is not strictly positive,
/// and [`Error::ShapeMismatch`] on input length disagreements or fewer than
/// two energy edges.
pub fn cut_powder(
    pos: [ArrayView1<'_, f64>; 3],
    intensity: ArrayView1<'_, f64>,
    normalization: ArrayView1<'_, f64>,
    monitor: ArrayView1<'_, f64>,
    e_bin_edges: ArrayView1<'_, f64>,
    q_min_bin: f64,
) -> Result<PowderCut> {
    check_step("q_min_bin", q_min_bin)?;
    let n = check_lengths(&pos, intensity, normalization, monitor)?;
    if e_bin_edges.len() < 2 {
        return Err(Error::ShapeMismatch(format!(
            "{} energy edges given, need at least 2",
            e_bin_edges.len()
        )));
    }

    let q: Vec<f64> = (0..n)
        .map(|i| (pos[0][i] * pos[0][i] + pos[1][i] * pos[1][i]).sqrt())
        .collect();

    let mut out = PowderCut::default();
    for w in e_bin_edges.windows(2) {
        let (e_low, e_high) = (w[0], w[1]);
        let mut q_inside = Vec::new();
        let mut sel = [Vec::new(), Vec::new(), Vec::new()];
        for i in 0..n {
            let e = pos[2][i];
            if e > e_low && e <= e_high {
                q_inside.push(q[i]);
                sel[0].push(intensity[i]);
                sel[1].push(monitor[i]);
                sel[2].push(normalization[i]);
            }
        }
        let q_inside = Array1::from_vec(q_inside);
        let edges = bin_edges(q_inside.view(), q_min_bin);
        out.intensity.push(histogram_1d(
            q_inside.view(),
            &edges,
            Array1::from_vec(sel[0].clone()).view(),
        ));
        out.monitor.push(histogram_1d(
            q_inside.view(),
            &edges,
            Array1::from_vec(sel[1].clone()).view(),
        ));
        out.normalization.push(histogram_1d(
            q_inside.view(),
            &edges,
            Array1::from_vec(sel[2].clone()).view(),
        ));
        out.counts.push(count_1d(q_inside.view(), &edges));
        out.q_edges.push(edges);
    }
    Ok(out)
}

/// Coordinate system for Q-plane binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QPlaneMode {
    /// Bin directly in (Qx, Qy).
    Xy,
    /// Bin in (angle, |Q|).
    Polar,
}

impl FromStr for QPlaneMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xy" => Ok(Self::Xy),
            "polar" => Ok(Self::Polar),
            other => Err(Error::UnsupportedBinningMode(other.to_owned())),
        }
    }
}

/// Q-plane binning result.
#[derive(Debug, Clone)]
pub struct QPlaneResult {
    /// Summed intensity per cell.
    pub intensity: Array2<f64>,
    /// Summed monitor per cell.
    pub monitor: Array2<f64>,
    /// Summed normalization per cell.
    pub normalization: Array2<f64>,
    /// Number of raw points per cell.
    pub counts: Array2<u64>,
    /// Edges along the first binning coordinate (Qx, or angle in polar mode).
    pub x_edges: Array1<f64>,
    /// Edges along the second binning coordinate (Qy, or |Q| in polar mode).
    pub y_edges: Array1<f64>,
}

/// Bins the points inside one energy window onto the Q plane.
///
/// `mode` selects the coordinates: `"xy"` bins (Qx, Qy) directly, `"polar"`
/// bins (atan2(Qy, Qx), |Q|); anything else is rejected with
/// [`Error::UnsupportedBinningMode`]. With `enlargen` the edges adapt to
/// point density (minimum bin sizes `x_tol`/`y_tol`); otherwise fixed-step
/// edges of exactly those sizes span the data. The energy window is
/// inclusive on both bounds.
///
/// # Errors
/// [`Error::UnsupportedBinningMode`] for an unknown mode string,
/// [`Error::InvalidStep`] if `x_tol` or `y_tol` is not strictly positive,
/// [`Error::ShapeMismatch`] on input length disagreements.
#[allow(clippy::too_many_arguments)]
pub fn bin_q_plane(
    pos: [ArrayView1<'_, f64>; 3],
    intensity: ArrayView1<'_, f64>,
    normalization: ArrayView1<'_, f64>,
    monitor: ArrayView1<'_, f64>,
    emin: f64,
    emax: f64,
    mode: &str,
    x_tol: f64,
    y_tol: f64,
    enlargen: bool,
) -> Result<QPlaneResult> {
    let mode = QPlaneMode::from_str(mode)?;
    check_step("x_tol", x_tol)?;
    check_step("y_tol", y_tol)?;
    let n = check_lengths(&pos, intensity, normalization, monitor)?;

    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut sel = [Vec::new(), Vec::new(), Vec::new()];
    for i in 0..n {
        let e = pos[2][i];
        if !(e >= emin && e <= emax) {
            continue;
        }
        let (qx, qy) = (pos[0][i], pos[1][i]);
        match mode {
            QPlaneMode::Xy => {
                x.push(qx);
                y.push(qy);
            }
            QPlaneMode::Polar => {
                x.push(qy.atan2(qx));
                y.push((qx * qx + qy * qy).sqrt());
            }
        }
        sel[0].push(intensity[i]);
        sel[1].push(monitor[i]);
        sel[2].push(normalization[i]);
    }

    let x = Array1::from_vec(x);
    let y = Array1::from_vec(y);
    let (x_edges, y_edges) = if enlargen {
        (bin_edges(x.view(), x_tol), bin_edges(y.view(), y_tol))
    } else {
        (fixed_edges(x.view(), x_tol), fixed_edges(y.view(), y_tol))
    };

    let shape = (
        x_edges.len().saturating_sub(1),
        y_edges.len().saturating_sub(1),
    );
    let mut out = QPlaneResult {
        intensity: Array2::zeros(shape),
        monitor: Array2::zeros(shape),
        normalization: Array2::zeros(shape),
        counts: Array2::zeros(shape),
        x_edges,
        y_edges,
    };
    for i in 0..x.len() {
        let (Some(a), Some(b)) = (
            crate::binning::find_bin(&out.x_edges, x[i]),
            crate::binning::find_bin(&out.y_edges, y[i]),
        ) else {
            continue;
        };
        out.intensity[[a, b]] += sel[0][i];
        out.monitor[[a, b]] += sel[1][i];
        out.normalization[[a, b]] += sel[2][i];
        out.counts[[a, b]] += 1;
    }
    Ok(out)
}

/// Fixed-step edges from the data minimum to just past the maximum.
fn fixed_edges(values: ArrayView1<'_, f64>, step: f64) -> Array1<f64> {
    if values.is_empty() {
        return Array1::from_vec(Vec::new());
    }
    let vmin = values.iter().copied().fold(f64::INFINITY, f64::min);
    let vmax = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let stop = vmax + 0.999 * step;
    let mut edges = Vec::new();
    let mut i = 0usize;
    loop {
        let edge = step.mul_add(i as f64, vmin);
        if edge >= stop {
            break;
        }
        edges.push(edge);
        i += 1;
    }
    Array1::from_vec(edges)
}

fn check_lengths(
    pos: &[ArrayView1<'_, f64>; 3],
    intensity: ArrayView1<'_, f64>,
    normalization: ArrayView1<'_, f64>,
    monitor: ArrayView1<'_, f64>,
) -> Result<usize> {
    let n = pos[0].len();
    if pos[1].len() != n || pos[2].len() != n {
        return Err(Error::ShapeMismatch(format!(
            "position arrays have lengths {}, {}, {}",
            pos[0].len(),
            pos[1].len(),
            pos[2].len()
        )));
    }
    for (name, len) in [
        ("intensity", intensity.len()),
        ("normalization", normalization.len()),
        ("monitor", monitor.len()),
    ] {
        if len != n {
            return Err(Error::ShapeMismatch(format!(
                "{name} has {len} values for {n} points"
            )));
        }
    }
    Ok(n)
}
