//! # Raytrix Units
//!
//! Units of measurement for the raytrix workspace. The engine stores and
//! computes everything in SI internally; units exist only at the boundary
//! where parameter values are read or written.
//!
//! ## Modules
//!
//! - [`unit`] — process-wide unit and dimension singletons with SI conversion.
//! - [`value`] — a scalar bound to a unit, plus tangential/sagittal pairs.

pub mod unit;
pub mod value;

pub use unit::{dims, units, Dim, Prefix, Unit};
pub use value::{PairTS, Plane, Value, ValueTS};
