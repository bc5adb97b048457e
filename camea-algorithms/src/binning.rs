//! Histogram and tolerance-binning engine.
//!
//! Two binning schemes operate on flattened point clouds: a regular 3D voxel
//! histogram with center-first grid construction, and a greedy adaptive 1D
//! edge generator with a guaranteed minimum edge separation.

use camea_core::{Error, Result};
use ndarray::{Array1, Array3, ArrayView1};

/// Regular 3D histogram result. All grids share the voxel shape.
#[derive(Debug, Clone)]
pub struct Binned3D {
    /// Summed intensity per voxel.
    pub intensity: Array3<f64>,
    /// Summed monitor per voxel, if monitor weights were given.
    pub monitor: Option<Array3<f64>>,
    /// Summed normalization per voxel, if normalization weights were given.
    pub normalization: Option<Array3<f64>>,
    /// Number of raw points per voxel.
    pub counts: Array3<u64>,
}

/// Bin edges of a regular 3D grid, one array per axis.
#[derive(Debug, Clone)]
pub struct GridEdges {
    /// Edges along the first axis (length = cells + 1).
    pub x: Array1<f64>,
    /// Edges along the second axis.
    pub y: Array1<f64>,
    /// Edges along the third axis.
    pub z: Array1<f64>,
}

/// Bins a point cloud onto a regular 3D grid with the given step sizes.
///
/// The grid is built center-first: per axis, `round(range/step) + 1` evenly
/// spaced centers between the data extremes, with edges at the midpoints
/// between adjacent centers and the first/last edge extrapolated
/// symmetrically. This keeps the centers exactly representable grid points
/// under floating-point rounding, unlike an edges-first construction.
///
/// Intensity is always histogrammed; monitor and normalization are optional.
/// A separate unit-weight count grid records how many raw points each voxel
/// aggregates, which downstream averaging needs.
///
/// # Errors
/// Returns [`Error::InvalidStep`] if a step is not strictly positive, and
/// [`Error::ShapeMismatch`] if the weight arrays do not match the position
/// arrays in length, or the position arrays are empty.
pub fn bin_3d(
    dx: f64,
    dy: f64,
    dz: f64,
    pos: [ArrayView1<'_, f64>; 3],
    intensity: ArrayView1<'_, f64>,
    normalization: Option<ArrayView1<'_, f64>>,
    monitor: Option<ArrayView1<'_, f64>>,
) -> Result<(Binned3D, GridEdges)> {
    check_step("dx", dx)?;
    check_step("dy", dy)?;
    check_step("dz", dz)?;
    let n = pos[0].len();
    if pos[1].len() != n || pos[2].len() != n {
        return Err(Error::ShapeMismatch(format!(
            "position arrays have lengths {}, {}, {}",
            pos[0].len(),
            pos[1].len(),
            pos[2].len()
        )));
    }
    if n == 0 {
        return Err(Error::ShapeMismatch(
            "cannot bin an empty point cloud".into(),
        ));
    }
    for (name, len) in [
        ("intensity", Some(intensity.len())),
        ("normalization", normalization.as_ref().map(ArrayView1::len)),
        ("monitor", monitor.as_ref().map(ArrayView1::len)),
    ] {
        if let Some(len) = len {
            if len != n {
                return Err(Error::ShapeMismatch(format!(
                    "{name} has {len} values for {n} points"
                )));
            }
        }
    }

    let x_edges = axis_edges(pos[0], dx);
    let y_edges = axis_edges(pos[1], dy);
    let z_edges = axis_edges(pos[2], dz);
    let shape = (x_edges.len() - 1, y_edges.len() - 1, z_edges.len() - 1);

    let mut out = Binned3D {
        intensity: Array3::zeros(shape),
        monitor: monitor.map(|_| Array3::zeros(shape)),
        normalization: normalization.map(|_| Array3::zeros(shape)),
        counts: Array3::zeros(shape),
    };

    for idx in 0..n {
        let (Some(i), Some(j), Some(k)) = (
            find_bin(&x_edges, pos[0][idx]),
            find_bin(&y_edges, pos[1][idx]),
            find_bin(&z_edges, pos[2][idx]),
        ) else {
            continue;
        };
        out.intensity[[i, j, k]] += intensity[idx];
        if let (Some(grid), Some(w)) = (out.monitor.as_mut(), monitor.as_ref()) {
            grid[[i, j, k]] += w[idx];
        }
        if let (Some(grid), Some(w)) = (out.normalization.as_mut(), normalization.as_ref()) {
            grid[[i, j, k]] += w[idx];
        }
        out.counts[[i, j, k]] += 1;
    }

    Ok((
        out,
        GridEdges {
            x: x_edges,
            y: y_edges,
            z: z_edges,
        },
    ))
}

/// Builds the edge array for one axis: centers first, midpoint edges after.
fn axis_edges(values: ArrayView1<'_, f64>, step: f64) -> Array1<f64> {
    let vmin = values.iter().copied().fold(f64::INFINITY, f64::min);
    let vmax = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let n = ((vmax - vmin) / step).round() as usize + 1;
    if n == 1 {
        return Array1::from_vec(vec![vmin - 0.5 * step, vmin + 0.5 * step]);
    }
    let centers = Array1::linspace(vmin, vmax, n);
    let spacing = (vmax - vmin) / (n - 1) as f64;
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centers[0] - 0.5 * spacing);
    for w in centers.windows(2) {
        edges.push(0.5 * (w[0] + w[1]));
    }
    edges.push(centers[n - 1] + 0.5 * spacing);
    Array1::from_vec(edges)
}

/// Rejects a bin step or tolerance that is zero, negative, or NaN.
///
/// A non-positive step would make the grid construction loop forever or
/// overflow the bin count, so it is a configuration error.
pub(crate) fn check_step(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidStep { name, value })
    }
}

/// Locates the bin of `value` in an ascending edge array.
///
/// Half-open bins `[edges[i], edges[i+1])`; the final edge is inclusive so
/// the data maximum lands in the last bin.
pub(crate) fn find_bin(edges: &Array1<f64>, value: f64) -> Option<usize> {
    let n_bins = edges.len().checked_sub(2)? + 1;
    if !(value >= edges[0] && value <= edges[edges.len() - 1]) {
        return None;
    }
    let idx = edges
        .as_slice()
        .map_or_else(
            || edges.iter().take_while(|e| **e <= value).count(),
            |s| s.partition_point(|e| *e <= value),
        )
        .saturating_sub(1);
    Some(idx.min(n_bins - 1))
}

/// Histograms `weights` against an ascending edge array.
pub(crate) fn histogram_1d(
    values: ArrayView1<'_, f64>,
    edges: &Array1<f64>,
    weights: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let mut out = Array1::zeros(edges.len().saturating_sub(1));
    for (v, w) in values.iter().zip(weights.iter()) {
        if let Some(i) = find_bin(edges, *v) {
            out[i] += *w;
        }
    }
    out
}

/// Counts values per bin of an ascending edge array.
pub(crate) fn count_1d(values: ArrayView1<'_, f64>, edges: &Array1<f64>) -> Array1<u64> {
    let mut out = Array1::zeros(edges.len().saturating_sub(1));
    for v in values {
        if let Some(i) = find_bin(edges, *v) {
            out[i] += 1;
        }
    }
    out
}

/// Generates adaptive 1D bin edges with a minimum separation `tolerance`.
///
/// Greedy forward scan over the sorted unique values: consecutive values
/// closer than `tolerance` are merged into one bin, and each boundary falls
/// at the midpoint between the last value of one group and the first value
/// of the next. The outer edges sit `tolerance / 2` beyond the extremes.
/// Bin widths adapt to local point density while every gap between
/// consecutive edges stays at or above `tolerance`.
///
/// Fewer than two unique values yield an empty edge list.
#[must_use]
pub fn bin_edges(values: ArrayView1<'_, f64>, tolerance: f64) -> Array1<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    if sorted.len() < 2 {
        return Array1::from_vec(Vec::new());
    }
    let mut edges = Vec::with_capacity(sorted.len() + 1);
    edges.push(sorted[0] - 0.5 * tolerance);
    for w in sorted.windows(2) {
        if w[1] - w[0] >= tolerance {
            edges.push(0.5 * (w[0] + w[1]));
        }
    }
    edges.push(sorted[sorted.len() - 1] + 0.5 * tolerance);
    Array1::from_vec(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn test_bin_edges_outer_edges() {
        let values = arr1(&[0.0, 0.3, 1.0, 2.5, 2.6]);
        let edges = bin_edges(values.view(), 0.5);
        assert_relative_eq!(edges[0], 0.0 - 0.25);
        assert_relative_eq!(edges[edges.len() - 1], 2.6 + 0.25);
        for w in edges.windows(2) {
            assert!(w[1] - w[0] >= 0.5, "gap {} below tolerance", w[1] - w[0]);
        }
    }

    #[test]
    fn test_bin_edges_merges_dense_groups() {
        // Two groups separated by more than the tolerance.
        let values = arr1(&[0.0, 0.1, 0.2, 5.0, 5.1]);
        let edges = bin_edges(values.view(), 1.0);
        assert_eq!(edges.len(), 3);
        assert_relative_eq!(edges[1], 0.5 * (0.2 + 5.0));
    }

    #[test]
    fn test_bin_edges_count_bound() {
        let values = Array1::linspace(0.0, 10.0, 1000);
        let tol = 0.5;
        let edges = bin_edges(values.view(), tol);
        let bound = ((10.0 - 0.0) / tol) as usize + 2;
        assert!(edges.len() <= bound);
    }

    #[test]
    fn test_bin_edges_degenerate() {
        assert!(bin_edges(arr1(&[] as &[f64]).view(), 0.1).is_empty());
        assert!(bin_edges(arr1(&[1.0]).view(), 0.1).is_empty());
        assert!(bin_edges(arr1(&[1.0, 1.0, 1.0]).view(), 0.1).is_empty());
    }

    #[test]
    fn test_axis_edges_centers_are_grid_points() {
        let values = arr1(&[0.0, 0.25, 0.5, 0.75, 1.0]);
        let edges = axis_edges(values.view(), 0.25);
        // 5 centers, 6 edges.
        assert_eq!(edges.len(), 6);
        assert_relative_eq!(edges[0], -0.125);
        assert_relative_eq!(edges[5], 1.125);
        for (i, c) in [0.0, 0.25, 0.5, 0.75, 1.0].iter().enumerate() {
            assert!(edges[i] < *c && *c < edges[i + 1]);
        }
    }

    #[test]
    fn test_bin_3d_shapes_and_counts() {
        let x = arr1(&[0.0, 0.1, 0.9, 1.0]);
        let y = arr1(&[0.0, 0.0, 0.5, 0.5]);
        let z = arr1(&[0.0, 1.0, 2.0, 2.0]);
        let intensity = arr1(&[1.0, 2.0, 3.0, 4.0]);
        let norm = arr1(&[1.0; 4]);
        let mon = arr1(&[10.0; 4]);

        let (binned, edges) = bin_3d(
            0.5,
            0.5,
            1.0,
            [x.view(), y.view(), z.view()],
            intensity.view(),
            Some(norm.view()),
            Some(mon.view()),
        )
        .unwrap();

        // round(range/step)+1 centers per axis.
        let expected = (
            ((1.0 - 0.0) / 0.5_f64).round() as usize + 1,
            ((0.5 - 0.0) / 0.5_f64).round() as usize + 1,
            ((2.0 - 0.0) / 1.0_f64).round() as usize + 1,
        );
        assert_eq!(binned.intensity.dim(), expected);
        assert_eq!(binned.counts.dim(), expected);
        assert_eq!(edges.x.len(), expected.0 + 1);

        // Every input point lands somewhere.
        assert_eq!(binned.counts.sum(), 4);
        assert_relative_eq!(binned.intensity.sum(), 10.0);
        assert_relative_eq!(binned.monitor.unwrap().sum(), 40.0);
    }

    #[test]
    fn test_bin_3d_rejects_mismatched_weights() {
        let x = arr1(&[0.0, 1.0]);
        let result = bin_3d(
            1.0,
            1.0,
            1.0,
            [x.view(), x.view(), x.view()],
            arr1(&[1.0]).view(),
            None,
            None,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_bin_3d_rejects_non_positive_step() {
        let x = arr1(&[0.0, 1.0]);
        let w = arr1(&[1.0, 1.0]);
        // A zero step would blow up the bin count instead of gridding.
        let result = bin_3d(
            0.0,
            0.5,
            0.5,
            [x.view(), x.view(), x.view()],
            w.view(),
            None,
            None,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidStep { name: "dx", .. })
        ));
        let result = bin_3d(
            0.5,
            0.5,
            -1.0,
            [x.view(), x.view(), x.view()],
            w.view(),
            None,
            None,
        );
        assert!(matches!(
            result,
            Err(Error::InvalidStep { name: "dz", .. })
        ));
    }

    #[test]
    fn test_find_bin_boundaries() {
        let edges = arr1(&[0.0, 1.0, 2.0]);
        assert_eq!(find_bin(&edges, 0.0), Some(0));
        assert_eq!(find_bin(&edges, 1.0), Some(1));
        assert_eq!(find_bin(&edges, 2.0), Some(1)); // last edge inclusive
        assert_eq!(find_bin(&edges, -0.1), None);
        assert_eq!(find_bin(&edges, 2.1), None);
    }
}
