//! Sample description: unit cell, orientation, and the oblique 2D projection
//! used for reciprocal-space axis labeling.
//!
//! The projection maps scattering-plane coordinates (h, k) expressed in the
//! two orientation vectors onto rectilinear plot coordinates (x, y) and back.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Validated unit-cell parameters (lengths in Å, angles in degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnitCell {
    a: f64,
    b: f64,
    c: f64,
    alpha: f64,
    beta: f64,
    gamma: f64,
}

impl UnitCell {
    /// Creates a unit cell, validating physical ranges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLatticeParameter`] if a length is not positive
    /// or an angle is outside the open interval (0, 180) degrees.
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<Self> {
        for (parameter, value) in [("a", a), ("b", b), ("c", c)] {
            if !(value > 0.0) {
                return Err(Error::InvalidLatticeParameter { parameter, value });
            }
        }
        for (parameter, value) in [("alpha", alpha), ("beta", beta), ("gamma", gamma)] {
            if !(value > 0.0 && value < 180.0) {
                return Err(Error::InvalidLatticeParameter { parameter, value });
            }
        }
        Ok(Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        })
    }

    /// Lattice length a (Å).
    #[inline]
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Lattice length b (Å).
    #[inline]
    pub fn b(&self) -> f64 {
        self.b
    }

    /// Lattice length c (Å).
    #[inline]
    pub fn c(&self) -> f64 {
        self.c
    }

    /// Lattice angle alpha (degrees).
    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Lattice angle beta (degrees).
    #[inline]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Lattice angle gamma (degrees).
    #[inline]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// The six parameters as `[a, b, c, alpha, beta, gamma]`.
    #[inline]
    pub fn as_array(&self) -> [f64; 6] {
        [self.a, self.b, self.c, self.alpha, self.beta, self.gamma]
    }
}

/// Sample with a validated unit cell and a two-row orientation matrix.
///
/// All derived projection quantities are computed once at construction;
/// the object is immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    name: String,
    cell: UnitCell,
    orientation: [[f64; 3]; 2],
    projection_vector1: [f64; 3],
    projection_vector2: [f64; 3],
    projection_angle: f64,
    projection_matrix: [[f64; 2]; 2],
    inverse_projection: [[f64; 2]; 2],
}

impl Sample {
    /// Creates a sample and computes its reciprocal-space projection.
    ///
    /// `orientation` holds the two scattering-plane vectors in reciprocal
    /// lattice units, one per row.
    ///
    /// # Errors
    /// Returns [`Error::InvalidLatticeParameter`] for an unphysical cell and
    /// [`Error::DegenerateOrientation`] if the two orientation vectors are
    /// parallel.
    pub fn new(name: impl Into<String>, cell: UnitCell, orientation: [[f64; 3]; 2]) -> Result<Self> {
        let gamma = cell.gamma.to_radians();
        let beta = cell.beta.to_radians();

        // Real-space vectors; a along +x, b and c placed by the cell angles.
        let real_a = [cell.a, 0.0, 0.0];
        let real_b = row_mul([-cell.b, 0.0, 0.0], rotation_matrix(0.0, 0.0, gamma));
        let real_c = row_mul([cell.c, 0.0, 0.0], rotation_matrix(0.0, beta, 0.0));

        let volume = dot(real_a, cross(real_b, real_c)).abs();
        let two_pi = 2.0 * std::f64::consts::PI;
        let mut recip_a = scale(cross(real_b, real_c), two_pi / volume);
        let mut recip_b = scale(cross(real_c, real_a), two_pi / volume);
        let mut recip_c = scale(cross(real_a, real_b), two_pi / volume);

        // Rotate the reciprocal basis so a* lies along +x.
        let rot = rotate_to_x(recip_a);
        recip_a = row_mul(recip_a, rot);
        recip_b = row_mul(recip_b, rot);
        recip_c = row_mul(recip_c, rot);

        let recip = [recip_a, recip_b, recip_c];
        let p1 = row_mul(orientation[0], recip);
        let p2 = row_mul(orientation[1], recip);

        let angle = vector_angle(p1, p2);
        if !angle.is_finite() || angle.abs() < 1e-10 {
            return Err(Error::DegenerateOrientation);
        }

        let projection_matrix = [
            [norm(p1), angle.cos() * norm(p2)],
            [0.0, angle.sin() * norm(p2)],
        ];
        let det = projection_matrix[0][0] * projection_matrix[1][1]
            - projection_matrix[0][1] * projection_matrix[1][0];
        if det.abs() < 1e-12 {
            return Err(Error::DegenerateOrientation);
        }
        let inverse_projection = [
            [projection_matrix[1][1] / det, -projection_matrix[0][1] / det],
            [-projection_matrix[1][0] / det, projection_matrix[0][0] / det],
        ];

        Ok(Self {
            name: name.into(),
            cell,
            orientation,
            projection_vector1: p1,
            projection_vector2: p2,
            projection_angle: angle,
            projection_matrix,
            inverse_projection,
        })
    }

    /// Sample name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated unit cell.
    #[inline]
    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    /// The two orientation-matrix rows.
    #[inline]
    pub fn orientation(&self) -> &[[f64; 3]; 2] {
        &self.orientation
    }

    /// Angle between the two projection vectors (radians).
    #[inline]
    pub fn projection_angle(&self) -> f64 {
        self.projection_angle
    }

    /// The oblique-to-rectilinear projection matrix.
    #[inline]
    pub fn projection_matrix(&self) -> &[[f64; 2]; 2] {
        &self.projection_matrix
    }

    /// Converts curved (h, k) coordinates to rectilinear plot coordinates.
    #[inline]
    pub fn tr(&self, h: f64, k: f64) -> (f64, f64) {
        let p = &self.projection_matrix;
        (p[0][0] * h + p[0][1] * k, p[1][0] * h + p[1][1] * k)
    }

    /// Converts rectilinear plot coordinates back to curved (h, k).
    #[inline]
    pub fn inv_tr(&self, x: f64, y: f64) -> (f64, f64) {
        let p = &self.inverse_projection;
        (p[0][0] * x + p[0][1] * y, p[1][0] * x + p[1][1] * y)
    }

    /// Formats a plot coordinate as reciprocal-lattice units for axis labels.
    pub fn format_coord(&self, x: f64, y: f64) -> String {
        let (h, k) = self.inv_tr(x, y);
        let rlu = [
            self.orientation[0][0] * h + self.orientation[1][0] * k,
            self.orientation[0][1] * h + self.orientation[1][1] * k,
            self.orientation[0][2] * h + self.orientation[1][2] * k,
        ];
        format!("h = {:.3}, k = {:.3}, l = {:.3}", rlu[0], rlu[1], rlu[2])
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(v: [f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

fn scale(v: [f64; 3], s: f64) -> [f64; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// Row-vector times matrix, `v^T M`.
fn row_mul(v: [f64; 3], m: [[f64; 3]; 3]) -> [f64; 3] {
    [
        v[0] * m[0][0] + v[1] * m[1][0] + v[2] * m[2][0],
        v[0] * m[0][1] + v[1] * m[1][1] + v[2] * m[2][1],
        v[0] * m[0][2] + v[1] * m[1][2] + v[2] * m[2][2],
    ]
}

fn vector_angle(v1: [f64; 3], v2: [f64; 3]) -> f64 {
    (dot(v1, v2) / (norm(v1) * norm(v2))).clamp(-1.0, 1.0).acos()
}

/// Intrinsic rotation Rz(gamma)·Ry(beta)·Rx(alpha), angles in radians.
fn rotation_matrix(alpha: f64, beta: f64, gamma: f64) -> [[f64; 3]; 3] {
    let (sa, ca) = alpha.sin_cos();
    let (sb, cb) = beta.sin_cos();
    let (sg, cg) = gamma.sin_cos();
    let rx = [[1.0, 0.0, 0.0], [0.0, ca, -sa], [0.0, sa, ca]];
    let ry = [[cb, 0.0, sb], [0.0, 1.0, 0.0], [-sb, 0.0, cb]];
    let rz = [[cg, -sg, 0.0], [sg, cg, 0.0], [0.0, 0.0, 1.0]];
    mat_mul(rz, mat_mul(ry, rx))
}

fn mat_mul(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in a.iter().enumerate() {
        for j in 0..3 {
            out[i][j] = row[0] * b[0][j] + row[1] * b[1][j] + row[2] * b[2][j];
        }
    }
    out
}

/// Axis-angle (Rodrigues) rotation matrix about unit axis `v`.
fn axis_angle(v: [f64; 3], theta: f64) -> [[f64; 3]; 3] {
    let v = scale(v, 1.0 / norm(v));
    let (s, c) = theta.sin_cos();
    let omc = 1.0 - c;
    [
        [
            c + v[0] * v[0] * omc,
            v[0] * v[1] * omc - v[2] * s,
            v[0] * v[2] * omc + v[1] * s,
        ],
        [
            v[0] * v[1] * omc + v[2] * s,
            c + v[1] * v[1] * omc,
            v[1] * v[2] * omc - v[0] * s,
        ],
        [
            v[0] * v[2] * omc - v[1] * s,
            v[1] * v[2] * omc + v[0] * s,
            c + v[2] * v[2] * omc,
        ],
    ]
}

/// Rotation carrying `v` into the x-axis.
fn rotate_to_x(v: [f64; 3]) -> [[f64; 3]; 3] {
    if ((v[2] / norm(v)) - 1.0).abs() < 1e-8 {
        // v is along z
        return axis_angle([0.0, 1.0, 0.0], std::f64::consts::FRAC_PI_2);
    }
    // Rotate v into the x-y plane about the in-plane perpendicular, then to x.
    let v_rot_axis = [-v[1], v[0], 0.0];
    let v_plane = [v[0], v[1], 0.0];
    let theta = vector_angle(v, v_plane);
    let r = axis_angle(v_rot_axis, theta);
    let v2 = [
        dot(r[0], v),
        dot(r[1], v),
        dot(r[2], v),
    ];
    let theta2 = vector_angle(v2, [1.0, 0.0, 0.0]);
    let r2 = axis_angle([0.0, 0.0, 1.0], -theta2);
    mat_mul(r2, r)
}
