//! Oriented 1D line cuts through the (Qx, Qy, dE) point cloud.

use crate::binning::{bin_edges, check_step, find_bin};
use camea_core::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};

/// Result of a 1D line cut.
///
/// The four data grids share the shape `(bins along the cut, 1)`: the single
/// trailing bin is the fixed orthogonal acceptance window. An empty result
/// (no points inside the energy window, or too few for adaptive edges) has
/// zero rows; this is the "nothing found" convention, not a failure.
#[derive(Debug, Clone)]
pub struct CutResult1D {
    /// Summed intensity per bin.
    pub intensity: Array2<f64>,
    /// Summed monitor per bin.
    pub monitor: Array2<f64>,
    /// Summed normalization per bin.
    pub normalization: Array2<f64>,
    /// Number of raw points per bin.
    pub counts: Array2<u64>,
    /// Bin edge positions in (Qx, Qy, E), one row per edge; E is the window center.
    pub bin_positions: Array2<f64>,
    /// The two orthogonal acceptance edges in (Qx, Qy), one row per edge.
    pub ortho_positions: Array2<f64>,
    /// The energy window `[emin, emax]`.
    pub energy_window: [f64; 2],
    /// Adaptive edges along the projected cut direction, relative to `q1`.
    pub edges: Array1<f64>,
}

impl CutResult1D {
    fn empty(
        bin_positions: Array2<f64>,
        ortho_positions: Array2<f64>,
        energy_window: [f64; 2],
        edges: Array1<f64>,
    ) -> Self {
        Self {
            intensity: Array2::zeros((0, 1)),
            monitor: Array2::zeros((0, 1)),
            normalization: Array2::zeros((0, 1)),
            counts: Array2::zeros((0, 1)),
            bin_positions,
            ortho_positions,
            energy_window,
            edges,
        }
    }

    /// Number of bins along the cut.
    #[inline]
    pub fn len(&self) -> usize {
        self.intensity.dim().0
    }

    /// Whether the cut caught no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cuts the point cloud along the line from `q1` to `q2`.
///
/// Points inside the energy window `[emin, emax]` (inclusive on both bounds)
/// are projected onto the orthonormal basis `{direction(q1 -> q2),
/// orthogonal}`; those within `width / 2` of the line transversely are
/// histogrammed along the cut against adaptive edges generated with
/// `min_pixel` as the minimum bin size.
///
/// The caller computes physical intensity as
/// `intensity * counts / (monitor * normalization)`; zero denominators
/// propagate as IEEE NaN/inf and are not masked here.
///
/// # Errors
/// Returns [`Error::InvalidStep`] if `min_pixel` is not strictly positive,
/// and [`Error::ShapeMismatch`] if the weight arrays do not match the
/// position arrays in length, or `q1 == q2`.
#[allow(clippy::too_many_arguments)]
pub fn cut_1d(
    pos: [ArrayView1<'_, f64>; 3],
    intensity: ArrayView1<'_, f64>,
    normalization: ArrayView1<'_, f64>,
    monitor: ArrayView1<'_, f64>,
    q1: [f64; 2],
    q2: [f64; 2],
    width: f64,
    min_pixel: f64,
    emin: f64,
    emax: f64,
) -> Result<CutResult1D> {
    check_step("min_pixel", min_pixel)?;
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

    let mut dir = [q2[0] - q1[0], q2[1] - q1[1]];
    let dir_len = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
    if dir_len == 0.0 {
        return Err(Error::ShapeMismatch(
            "cut endpoints q1 and q2 coincide".into(),
        ));
    }
    dir = [dir[0] / dir_len, dir[1] / dir_len];
    let ortho = [dir[1], -dir[0]];

    let ortho_positions = Array2::from_shape_fn((2, 2), |(i, j)| {
        let edge = if i == 0 { -width / 2.0 } else { width / 2.0 };
        edge * ortho[j]
    });

    // Energy filter, inclusive on both bounds.
    let mut along = Vec::new();
    let mut across = Vec::new();
    let mut sel_intensity = Vec::new();
    let mut sel_norm = Vec::new();
    let mut sel_monitor = Vec::new();
    for i in 0..n {
        let e = pos[2][i];
        if !(e >= emin && e <= emax) {
            continue;
        }
        let rel = [pos[0][i] - q1[0], pos[1][i] - q1[1]];
        along.push(rel[0] * dir[0] + rel[1] * dir[1]);
        across.push(rel[0] * ortho[0] + rel[1] * ortho[1]);
        sel_intensity.push(intensity[i]);
        sel_norm.push(normalization[i]);
        sel_monitor.push(monitor[i]);
    }
    if along.is_empty() {
        return Ok(CutResult1D::empty(
            Array2::zeros((0, 3)),
            ortho_positions,
            [emin, emax],
            Array1::from_vec(Vec::new()),
        ));
    }

    // Adaptive edges along the cut, from points inside the transverse window.
    let inside: Vec<f64> = along
        .iter()
        .zip(across.iter())
        .filter(|(_, o)| o.abs() < width / 2.0)
        .map(|(a, _)| *a)
        .collect();
    let edges = bin_edges(Array1::from_vec(inside).view(), min_pixel);

    let e_mean = 0.5 * (emin + emax);
    let bin_positions = Array2::from_shape_fn((edges.len(), 3), |(i, j)| match j {
        0 => edges[i] * dir[0] + q1[0],
        1 => edges[i] * dir[1] + q1[1],
        _ => e_mean,
    });
    if edges.is_empty() {
        return Ok(CutResult1D::empty(
            bin_positions,
            ortho_positions,
            [emin, emax],
            edges,
        ));
    }

    let n_bins = edges.len() - 1;
    let mut out = CutResult1D {
        intensity: Array2::zeros((n_bins, 1)),
        monitor: Array2::zeros((n_bins, 1)),
        normalization: Array2::zeros((n_bins, 1)),
        counts: Array2::zeros((n_bins, 1)),
        bin_positions,
        ortho_positions,
        energy_window: [emin, emax],
        edges,
    };
    // Same acceptance predicate as the edge generation above, so boundary
    // points cannot land in bins whose edges were built without them.
    for i in 0..along.len() {
        if across[i].abs() >= width / 2.0 {
            continue;
        }
        let Some(bin) = find_bin(&out.edges, along[i]) else {
            continue;
        };
        out.intensity[[bin, 0]] += sel_intensity[i];
        out.monitor[[bin, 0]] += sel_monitor[i];
        out.normalization[[bin, 0]] += sel_norm[i];
        out.counts[[bin, 0]] += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    /// Points along the Qx axis at E = 1, plus one off-axis and one at E = 3.
    fn cloud() -> ([Array1<f64>; 3], Array1<f64>, Array1<f64>, Array1<f64>) {
        let qx = arr1(&[0.0, 0.5, 1.0, 0.5, 0.5]);
        let qy = arr1(&[0.0, 0.0, 0.0, 0.9, 0.0]);
        let e = arr1(&[1.0, 1.0, 1.0, 1.0, 3.0]);
        let intensity = arr1(&[1.0, 2.0, 4.0, 100.0, 1000.0]);
        let norm = arr1(&[1.0; 5]);
        let monitor = arr1(&[10.0; 5]);
        ([qx, qy, e], intensity, norm, monitor)
    }

    #[test]
    fn test_cut_along_qx() {
        let (pos, i, n, m) = cloud();
        let result = cut_1d(
            [pos[0].view(), pos[1].view(), pos[2].view()],
            i.view(),
            n.view(),
            m.view(),
            [0.0, 0.0],
            [1.0, 0.0],
            0.2,
            0.4,
            0.5,
            1.5,
        )
        .unwrap();
        // Off-axis (|qy| = 0.9) and out-of-window (E = 3) points are excluded.
        assert_relative_eq!(result.intensity.sum(), 7.0);
        assert_eq!(result.counts.sum(), 3);
        assert_eq!(result.intensity.dim().1, 1);
        // Bin positions sit on the cut line at the window-center energy.
        for row in result.bin_positions.rows() {
            assert_relative_eq!(row[1], 0.0, epsilon = 1e-12);
            assert_relative_eq!(row[2], 1.0);
        }
    }

    #[test]
    fn test_energy_window_bounds_inclusive() {
        let qx = arr1(&[0.0, 0.5, 1.0]);
        let qy = arr1(&[0.0, 0.0, 0.0]);
        let e = arr1(&[0.5, 1.0, 1.5]); // exactly Emin, inside, exactly Emax
        let w = arr1(&[1.0, 1.0, 1.0]);
        let result = cut_1d(
            [qx.view(), qy.view(), e.view()],
            w.view(),
            w.view(),
            w.view(),
            [0.0, 0.0],
            [1.0, 0.0],
            0.5,
            0.4,
            0.5,
            1.5,
        )
        .unwrap();
        assert_eq!(result.counts.sum(), 3);
    }

    #[test]
    fn test_empty_energy_window_returns_empty() {
        let (pos, i, n, m) = cloud();
        let result = cut_1d(
            [pos[0].view(), pos[1].view(), pos[2].view()],
            i.view(),
            n.view(),
            m.view(),
            [0.0, 0.0],
            [1.0, 0.0],
            0.2,
            0.4,
            10.0,
            20.0,
        )
        .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.intensity.dim(), (0, 1));
        assert_eq!(result.counts.dim(), (0, 1));
        assert_eq!(result.energy_window, [10.0, 20.0]);
    }

    #[test]
    fn test_point_on_transverse_boundary_excluded() {
        // A point sitting exactly at |across| = width / 2 must be rejected by
        // the histogram just as it is by the edge generation.
        let qx = arr1(&[0.0, 0.5, 1.0, 0.5]);
        let qy = arr1(&[0.0, 0.0, 0.0, 0.5]);
        let e = arr1(&[1.0, 1.0, 1.0, 1.0]);
        let intensity = arr1(&[1.0, 2.0, 4.0, 100.0]);
        let ones = arr1(&[1.0; 4]);
        let result = cut_1d(
            [qx.view(), qy.view(), e.view()],
            intensity.view(),
            ones.view(),
            ones.view(),
            [0.0, 0.0],
            [1.0, 0.0],
            1.0,
            0.4,
            0.5,
            1.5,
        )
        .unwrap();
        assert_eq!(result.counts.sum(), 3);
        assert_relative_eq!(result.intensity.sum(), 7.0);
    }

    #[test]
    fn test_zero_min_pixel_rejected() {
        let (pos, i, n, m) = cloud();
        let result = cut_1d(
            [pos[0].view(), pos[1].view(), pos[2].view()],
            i.view(),
            n.view(),
            m.view(),
            [0.0, 0.0],
            [1.0, 0.0],
            0.2,
            0.0,
            0.5,
            1.5,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidStep {
                name: "min_pixel",
                ..
            })
        ));
    }

    #[test]
    fn test_coincident_endpoints_rejected() {
        let (pos, i, n, m) = cloud();
        let result = cut_1d(
            [pos[0].view(), pos[1].view(), pos[2].view()],
            i.view(),
            n.view(),
            m.view(),
            [0.5, 0.5],
            [0.5, 0.5],
            0.2,
            0.4,
            0.5,
            1.5,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
