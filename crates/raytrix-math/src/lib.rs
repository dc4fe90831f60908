//! # Raytrix Math
//!
//! The algebraic backbone of the raytrix workspace: complex 2×2 ABCD ray
//! matrices, geometric ray vectors and the complex beam parameter transform.
//!
//! All matrix entries are [`Complex64`]; purely geometric elements keep the
//! imaginary parts at zero and [`Matrix::is_real`] reports whether a matrix
//! is physically real.
//!
//! [`Complex64`]: num_complex::Complex64

pub mod matrix;

pub use matrix::{Matrix, RayVector};

/// Physical constants.
pub mod consts {
    /// Speed of light in vacuum, m/s.
    pub const LIGHT_SPEED: f64 = 299_792_458.0;
}
