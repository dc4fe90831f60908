//! Whole-system informational computations: total optical path and
//! pulse repetition rate.

use thiserror::Error;

use raytrix_math::consts::LIGHT_SPEED;

use crate::system::{OpticalSystem, TripType};

/// Errors from informational computations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfoError {
    #[error(
        "the system does not contain elements having length \
         (ranges, crystals, etc.), or their total length is zero"
    )]
    ZeroOpticalPath,
}

/// Total optical path over all active range-like elements, SI.
///
/// Each range contributes its axis length times its index of refraction;
/// mirrors, lenses and interfaces have no length and do not contribute.
pub fn total_optical_path_si(system: &OpticalSystem) -> f64 {
    system
        .active_elements()
        .iter()
        .filter(|e| e.kind().is_range())
        .map(|e| e.optical_path_si())
        .sum()
}

/// Pulse repetition rate of the cavity, Hz.
///
/// `c / L` over the total optical path; a standing-wave cavity is traversed
/// forth and back, which halves the rate. A system with zero total optical
/// length has no repetition rate — that is a domain error, not a division
/// by zero.
pub fn repetition_rate(system: &OpticalSystem) -> Result<f64, InfoError> {
    let length = total_optical_path_si(system);
    if length == 0.0 {
        return Err(InfoError::ZeroOpticalPath);
    }
    let mut rate = LIGHT_SPEED / length;
    if system.trip_type() == TripType::SW {
        rate /= 2.0;
    }
    Ok(rate)
}
