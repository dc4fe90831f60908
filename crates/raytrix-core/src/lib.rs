//! # Raytrix Core
//!
//! The optical system matrix engine: an ordered sequence of elements, each
//! described by a 2×2 complex ABCD matrix per transverse plane, with
//! automatic recalculation on every parameter change and round-trip
//! stability analysis on top.
//!
//! ## Architecture
//!
//! Elements form a closed catalog ([`elements::ElemKind`]) dispatched
//! through a single matrix derivation per element — there is no inheritance
//! hierarchy. Parameters carry stable ids; cross-element dependencies
//! (links driving interface refraction indices, formulas driving arbitrary
//! parameters) live in tables owned by the [`system::OpticalSystem`], never
//! inside the elements themselves.
//!
//! Everything is single-threaded and synchronous: a parameter change
//! recalculates the owning element, settles the dependency graph and
//! notifies listeners before the setter returns.
//!
//! ## Modules
//!
//! - [`param`] — dimensioned parameter values, ids, links, value checks.
//! - [`formula`] — formula-driven parameters over an injected evaluator.
//! - [`element`] — the element base: matrices, lock discipline, labels.
//! - [`elements`] — the element catalog and every matrix derivation.
//! - [`system`] — the element sequence and its dependency graph.
//! - [`roundtrip`] — round-trip assembly and stability analysis.
//! - [`info`] — total optical path and repetition rate.

pub mod element;
pub mod elements;
pub mod formula;
pub mod info;
pub mod param;
pub mod roundtrip;
pub mod system;

pub use element::{ElemId, ElemOptions, Element, MatrixEvaluator, MatrixFormula};
pub use elements::ElemKind;
pub use formula::{ExprEvaluator, Formula, PlainEvaluator};
pub use info::{repetition_rate, total_optical_path_si, InfoError};
pub use param::{ParamError, ParamId, ParamLink, Parameter, ValueCheck, ValueDriver};
pub use roundtrip::{
    is_system_stable, MatrixInfo, MatrixRole, RoundTripCalculator, RoundTripError, StabilityMode,
};
pub use system::{OpticalSystem, SystemEvent, TripType};
