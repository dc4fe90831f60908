//! Round-trip assembly and stability analysis.
//!
//! Given a reference element, the calculator lists the matrices of one full
//! cavity traversal and folds them into the per-plane round-trip matrix.
//! The matrix array is kept in *reverse* traversal order, so the fold
//! `acc *= m[i]` applies the last listed matrix first — the convention the
//! matrix algebra documents.
//!
//! The product is recomputed from scratch on every request: for realistic
//! cavity sizes a full O(n) accumulation is cheap, and it keeps the result
//! always consistent with the current element matrices.
//!
//! In a standing-wave cavity the beam passes every element but the two
//! endings twice; the second pass uses the backward matrices of
//! asymmetrical elements. A ring traverses the closed loop once; a
//! single-pass system simply folds from the entry to the reference.

use num_complex::Complex64;
use thiserror::Error;

use raytrix_math::Matrix;
use raytrix_units::PairTS;

use crate::element::{ElemId, Element};
use crate::system::{OpticalSystem, TripType};

/// Why a round trip could not be assembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundTripError {
    #[error("reference element is not set")]
    NoReference,
    #[error("reference element {0} is disabled")]
    DisabledReference(String),
    #[error("there are no active elements in the system")]
    NoActiveElements,
}

/// How the stability parameter is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StabilityMode {
    /// `P = (A + D) / 2`; stable iff `-1 < P < 1`.
    #[default]
    Normal,
    /// `P' = 1 - ((A + D) / 2)²`; stable iff `0 < P' < 1`.
    Squared,
}

/// Which matrix of its owner a round-trip entry contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRole {
    Whole,
    BackPass,
    LeftHalf,
    RightHalf,
}

/// One matrix of the assembled round trip, with its owning element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixInfo {
    pub owner: ElemId,
    pub role: MatrixRole,
}

#[derive(Debug, Clone, Copy)]
struct RoundTripElem {
    element: ElemId,
    /// In SW cavities the beam passes interior elements twice; the second
    /// pass picks the backward matrix of asymmetrical elements.
    second_pass: bool,
}

/// Assembles and folds the round-trip matrix for one reference element.
pub struct RoundTripCalculator<'a> {
    system: &'a OpticalSystem,
    reference: ElemId,
    stability_mode: StabilityMode,
    split_range: bool,
    round_trip: Vec<RoundTripElem>,
    matrs_t: Vec<Matrix>,
    matrs_s: Vec<Matrix>,
    info: Vec<MatrixInfo>,
    mt: Matrix,
    ms: Matrix,
}

impl<'a> RoundTripCalculator<'a> {
    pub fn new(system: &'a OpticalSystem, reference: ElemId) -> Self {
        Self {
            system,
            reference,
            stability_mode: StabilityMode::default(),
            split_range: false,
            round_trip: Vec::new(),
            matrs_t: Vec::new(),
            matrs_s: Vec::new(),
            info: Vec::new(),
            mt: Matrix::unity(),
            ms: Matrix::unity(),
        }
    }

    pub fn reference(&self) -> ElemId {
        self.reference
    }

    pub fn system(&self) -> &OpticalSystem {
        self.system
    }

    pub fn stability_mode(&self) -> StabilityMode {
        self.stability_mode
    }

    pub fn set_stability_mode(&mut self, mode: StabilityMode) {
        self.stability_mode = mode;
    }

    /// Whether the last assembly split the reference range at its sub-range
    /// point.
    pub fn split_range(&self) -> bool {
        self.split_range
    }

    pub fn is_empty(&self) -> bool {
        self.round_trip.is_empty()
    }

    fn reset(&mut self) {
        self.round_trip.clear();
        self.matrs_t.clear();
        self.matrs_s.clear();
        self.info.clear();
        self.mt = Matrix::unity();
        self.ms = Matrix::unity();
    }

    /// Assemble the round-trip matrix lists for the current topology.
    ///
    /// With `split_range` set and a range-like reference, the reference
    /// element contributes its two half-matrices (as calculated for its
    /// current sub-range point) instead of the whole matrix, so the fold
    /// yields the round trip as seen from the interior point.
    pub fn calc_round_trip(&mut self, split_range: bool) -> Result<(), RoundTripError> {
        self.split_range = split_range;
        self.reset();

        let reference = self
            .system
            .element(self.reference)
            .ok_or(RoundTripError::NoReference)?;
        if reference.disabled() {
            return Err(RoundTripError::DisabledReference(
                self.system.display_label(self.reference),
            ));
        }

        let elems = self.system.active_elements();
        if elems.is_empty() {
            return Err(RoundTripError::NoActiveElements);
        }

        match self.system.trip_type() {
            TripType::SW => self.calc_round_trip_sw(&elems),
            TripType::RR => self.calc_round_trip_rr(&elems),
            TripType::SP => self.calc_round_trip_sp(&elems),
        }
        Ok(())
    }

    fn ref_index(&self, elems: &[&Element]) -> usize {
        elems
            .iter()
            .position(|e| e.id() == self.reference)
            .unwrap_or_default()
    }

    fn calc_round_trip_sw(&mut self, elems: &[&Element]) {
        let reference = self.ref_index(elems) as isize;
        let len = elems.len() as isize;

        // from the reference element back to the first one
        let mut i = reference;
        while i > 0 {
            self.push(elems[i as usize], false);
            i -= 1;
        }

        // from the first element to the last one; if the last is the
        // reference it is already listed
        let mut c = len;
        if reference == c - 1 {
            c -= 1;
        }
        while i < c {
            // the end elements of a SW cavity are passed only once
            let second_pass = i != 0 && i != len - 1;
            self.push(elems[i as usize], second_pass);
            i += 1;
        }

        // from the last element back to the reference one
        i -= 2;
        while i > reference {
            self.push(elems[i as usize], false);
            i -= 1;
        }

        self.collect_matrices();
    }

    fn calc_round_trip_rr(&mut self, elems: &[&Element]) {
        let reference = self.ref_index(elems) as isize;

        // from the reference element back to the first one
        let mut i = reference;
        while i >= 0 {
            self.push(elems[i as usize], false);
            i -= 1;
        }

        // from the last element back to the reference one
        i = elems.len() as isize - 1;
        while i > reference {
            self.push(elems[i as usize], false);
            i -= 1;
        }

        self.collect_matrices();
    }

    fn calc_round_trip_sp(&mut self, elems: &[&Element]) {
        // from the reference element back to the entry
        let mut i = self.ref_index(elems) as isize;
        while i >= 0 {
            self.push(elems[i as usize], false);
            i -= 1;
        }

        self.collect_matrices_sp();
    }

    fn push(&mut self, elem: &Element, second_pass: bool) {
        self.round_trip.push(RoundTripElem {
            element: elem.id(),
            second_pass,
        });
    }

    fn elem(&self, id: ElemId) -> &'a Element {
        // ids in round_trip come from the system's own element list
        self.system.element(id).expect("round trip holds live ids")
    }

    fn collect_matrices(&mut self) {
        let mut i = 0;
        let c = self.round_trip.len();

        let split_ref = self.split_range && {
            let reference = self.elem(self.reference);
            reference.kind().is_range()
        };

        // the part of the reference range from the sub-range point back to
        // its entry closes the trip, so its left half leads the array
        if split_ref {
            let reference = self.elem(self.reference);
            self.info.push(MatrixInfo {
                owner: self.reference,
                role: MatrixRole::LeftHalf,
            });
            self.matrs_t.push(*reference.mt1());
            self.matrs_s.push(*reference.ms1());
            i = 1;
        }

        while i < c {
            let item = self.round_trip[i];
            let elem = self.elem(item.element);
            if item.second_pass {
                self.matrs_t.push(*elem.mt_inv());
                self.matrs_s.push(*elem.ms_inv());
                self.info.push(MatrixInfo {
                    owner: item.element,
                    role: if elem.options().asymmetrical {
                        MatrixRole::BackPass
                    } else {
                        MatrixRole::Whole
                    },
                });
            } else {
                self.matrs_t.push(*elem.mt());
                self.matrs_s.push(*elem.ms());
                self.info.push(MatrixInfo {
                    owner: item.element,
                    role: MatrixRole::Whole,
                });
            }
            i += 1;
        }

        // the remaining part of the range under investigation
        if split_ref {
            let reference = self.elem(self.reference);
            self.info.push(MatrixInfo {
                owner: self.reference,
                role: MatrixRole::RightHalf,
            });
            self.matrs_t.push(*reference.mt2());
            self.matrs_s.push(*reference.ms2());
        }
    }

    fn collect_matrices_sp(&mut self) {
        let mut i = 0;
        let c = self.round_trip.len();

        // the part of the reference range from its entry to the sub-range point
        if self.split_range && c > 0 {
            let first = self.elem(self.round_trip[0].element);
            if first.kind().is_range() {
                self.info.push(MatrixInfo {
                    owner: first.id(),
                    role: MatrixRole::LeftHalf,
                });
                self.matrs_t.push(*first.mt1());
                self.matrs_s.push(*first.ms1());
                i = 1;
            }
        }

        while i < c {
            let item = self.round_trip[i];
            let elem = self.elem(item.element);
            self.info.push(MatrixInfo {
                owner: item.element,
                role: MatrixRole::Whole,
            });
            self.matrs_t.push(*elem.mt());
            self.matrs_s.push(*elem.ms());
            i += 1;
        }
    }

    /// Fold the collected matrix arrays into the round-trip matrices.
    pub fn mult_matrix(&mut self) {
        self.mt = Matrix::unity();
        self.ms = Matrix::unity();
        for i in 0..self.matrs_t.len() {
            self.mt *= self.matrs_t[i];
            self.ms *= self.matrs_s[i];
        }
    }

    pub fn mt(&self) -> &Matrix {
        &self.mt
    }

    pub fn ms(&self) -> &Matrix {
        &self.ms
    }

    pub fn matrs_t(&self) -> &[Matrix] {
        &self.matrs_t
    }

    pub fn matrs_s(&self) -> &[Matrix] {
        &self.matrs_s
    }

    /// One entry per collected matrix, naming its owner and role.
    pub fn matrix_info(&self) -> &[MatrixInfo] {
        &self.info
    }

    /// The elements of the round trip, in assembly order.
    pub fn round_trip(&self) -> Vec<ElemId> {
        self.round_trip.iter().map(|e| e.element).collect()
    }

    /// Display labels of the round trip, for diagnostics.
    pub fn round_trip_str(&self) -> String {
        self.round_trip
            .iter()
            .map(|e| self.system.display_label(e.element))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn stability_cplx_of(&self, m: &Matrix) -> Complex64 {
        let half_of_a_plus_d = (m.a + m.d) * 0.5;
        match self.stability_mode {
            StabilityMode::Normal => half_of_a_plus_d,
            StabilityMode::Squared => {
                Complex64::new(1.0, 0.0) - half_of_a_plus_d * half_of_a_plus_d
            }
        }
    }

    /// Per-plane stability parameter in the current mode, as a real number.
    ///
    /// For systems with complex matrices the real part carries the same
    /// stability condition as in purely real systems, so only it is
    /// reported here; see [`RoundTripCalculator::stability_cplx`] for the
    /// full value. A marginal cavity (`|P| == 1`) is reported as-is.
    pub fn stability(&self) -> PairTS<f64> {
        PairTS::new(
            self.stability_cplx_of(&self.mt).re,
            self.stability_cplx_of(&self.ms).re,
        )
    }

    /// Per-plane stability parameter in the current mode, complex-valued.
    pub fn stability_cplx(&self) -> PairTS<Complex64> {
        PairTS::new(
            self.stability_cplx_of(&self.mt),
            self.stability_cplx_of(&self.ms),
        )
    }

    /// Per-plane geometric stability: `-1 < (A + D)/2 < 1`, regardless of
    /// the reporting mode.
    pub fn is_stable(&self) -> PairTS<bool> {
        let stable = |m: &Matrix| {
            let p = ((m.a + m.d) * 0.5).re;
            p > -1.0 && p < 1.0
        };
        PairTS::new(stable(&self.mt), stable(&self.ms))
    }
}

/// Whole-system stability, computed from the first active element.
pub fn is_system_stable(system: &OpticalSystem) -> Option<PairTS<bool>> {
    let first = system.active_elements().first().map(|e| e.id())?;
    let mut calc = RoundTripCalculator::new(system, first);
    calc.calc_round_trip(false).ok()?;
    calc.mult_matrix();
    Some(calc.is_stable())
}
