//! The complex ABCD ray matrix.
//!
//! Composition follows the ray-optics convention: for a beam traversing
//! element 1 then element 2, the combined transform is `M2 · M1`. Chains are
//! therefore accumulated with the matrices listed in *reverse* traversal
//! order, `acc *= m`, which is how the round-trip assembler feeds them.

use std::fmt;
use std::ops::{Mul, MulAssign};

use num_complex::Complex64;

/// A 2×2 complex ray transfer matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: Complex64,
    pub b: Complex64,
    pub c: Complex64,
    pub d: Complex64,
}

impl Matrix {
    /// The identity matrix `(1, 0, 0, 1)`.
    pub fn unity() -> Self {
        Self {
            a: Complex64::new(1.0, 0.0),
            b: Complex64::new(0.0, 0.0),
            c: Complex64::new(0.0, 0.0),
            d: Complex64::new(1.0, 0.0),
        }
    }

    /// A matrix with purely real entries.
    pub fn real(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self {
            a: Complex64::new(a, 0.0),
            b: Complex64::new(b, 0.0),
            c: Complex64::new(c, 0.0),
            d: Complex64::new(d, 0.0),
        }
    }

    pub fn complex(a: Complex64, b: Complex64, c: Complex64, d: Complex64) -> Self {
        Self { a, b, c, d }
    }

    /// Overwrite all four entries with real values.
    pub fn assign(&mut self, a: f64, b: f64, c: f64, d: f64) {
        *self = Self::real(a, b, c, d);
    }

    /// Overwrite all four entries with complex values.
    pub fn assign_complex(&mut self, a: Complex64, b: Complex64, c: Complex64, d: Complex64) {
        *self = Self::complex(a, b, c, d);
    }

    /// Reset to the identity matrix.
    pub fn set_unity(&mut self) {
        *self = Self::unity();
    }

    /// Determinant `A·D − B·C`.
    ///
    /// For a matrix spanning media of refractive index `n1` (input) and `n2`
    /// (output) the determinant equals `n1/n2`; 1 for index-preserving
    /// elements.
    pub fn det(&self) -> Complex64 {
        self.a * self.d - self.b * self.c
    }

    /// Whether every entry has a zero imaginary part.
    pub fn is_real(&self) -> bool {
        self.a.im == 0.0 && self.b.im == 0.0 && self.c.im == 0.0 && self.d.im == 0.0
    }

    /// Transform the complex beam parameter: `q' = (A·q + B) / (C·q + D)`.
    pub fn mult_complex_beam(&self, q: Complex64) -> Complex64 {
        (self.a * q + self.b) / (self.c * q + self.d)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::unity()
    }
}

impl Mul for Matrix {
    type Output = Matrix;

    fn mul(self, m: Matrix) -> Matrix {
        Matrix {
            a: self.a * m.a + self.b * m.c,
            b: self.a * m.b + self.b * m.d,
            c: self.c * m.a + self.d * m.c,
            d: self.c * m.b + self.d * m.d,
        }
    }
}

impl Mul<&Matrix> for Matrix {
    type Output = Matrix;

    fn mul(self, m: &Matrix) -> Matrix {
        self * *m
    }
}

impl MulAssign for Matrix {
    fn mul_assign(&mut self, m: Matrix) {
        *self = *self * m;
    }
}

impl MulAssign<&Matrix> for Matrix {
    fn mul_assign(&mut self, m: &Matrix) {
        *self = *self * *m;
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[A={}; B={}; C={}; D={}]",
            self.a, self.b, self.c, self.d
        )
    }
}

/// A geometric ray: transverse offset `y` and slope `v`.
///
/// Propagation uses only the real parts of the matrix; complex-valued
/// elements (Gaussian apertures) are meaningful for the complex beam
/// parameter, not for geometric rays.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RayVector {
    pub y: f64,
    pub v: f64,
}

impl RayVector {
    pub fn new(y: f64, v: f64) -> Self {
        Self { y, v }
    }

    /// `(y', v') = M · (y, v)`.
    pub fn propagate(&self, m: &Matrix) -> RayVector {
        RayVector {
            y: self.y * m.a.re + self.v * m.b.re,
            v: self.y * m.c.re + self.v * m.d.re,
        }
    }
}

impl fmt::Display for RayVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Y: {}; V: {}]", self.y, self.v)
    }
}
