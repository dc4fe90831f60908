//! The optical element: identity, parameters, matrices, lock discipline.
//!
//! Every element carries two pairs of ABCD matrices — forward (`mt`, `ms`)
//! and, for asymmetrical elements, backward (`mt_inv`, `ms_inv`) — plus, for
//! range-like kinds, a pair of half-matrices split at an interior offset.
//!
//! ```text
//!        \|      forward propagation            |/
//!    end \| ===================================>|/ end
//! mirror \|-----[//]------[\]----()----[\\]-----|/ mirror
//!        \| <===================================|/
//!        \|      backward propagation           |/
//! ```
//!
//! Most elements are symmetrical and keep both sets equal; interfaces and
//! thick lenses differ (see [`ElemOptions::asymmetrical`]).
//!
//! A disabled element is optically transparent: all its matrices are forced
//! to identity while its parameters stay untouched.

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use raytrix_math::Matrix;
use raytrix_units::Value;

use crate::param::{ParamError, Parameter};

/// Stable element identity, assigned monotonically at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElemId(pub(crate) u32);

impl ElemId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        ElemId(COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Behavioral flags of an element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElemOptions {
    /// The element calculates separate matrices for backward propagation.
    pub asymmetrical: bool,
    /// The element changes the wavefront, so beam parameters differ before
    /// and after it. Not set for range-like or interface elements, which
    /// downstream functions treat separately.
    pub changes_wavefront: bool,
    /// The element needs the system wavelength to calculate its matrices
    /// and provides a `Lambda` parameter to receive it.
    pub requires_wavelength: bool,
    /// The element produces complex-valued matrices.
    pub complex: bool,
}

/// The full matrix set of an element. All default to identity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Matrices {
    pub t: Matrix,
    pub s: Matrix,
    pub t_inv: Matrix,
    pub s_inv: Matrix,
    pub t1: Matrix,
    pub s1: Matrix,
    pub t2: Matrix,
    pub s2: Matrix,
}

impl Matrices {
    pub(crate) fn set_unity(&mut self) {
        *self = Matrices::default();
    }
}

/// Opaque strategy producing an element's matrices from user code.
///
/// `params` carries the element's parameters as `(alias, SI value)` pairs.
/// Returns the `(tangential, sagittal)` matrix pair or an error message.
pub trait MatrixEvaluator {
    fn calc_matrices(
        &self,
        code: &str,
        params: &[(&str, f64)],
    ) -> Result<(Matrix, Matrix), String>;
}

/// User code attached to a [`crate::elements::ElemKind::CustomFormula`] element.
#[derive(Clone)]
pub struct MatrixFormula {
    pub code: String,
    pub evaluator: Rc<dyn MatrixEvaluator>,
}

impl std::fmt::Debug for MatrixFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixFormula")
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

/// An optical element: a kind tag, owned parameters and current matrices.
#[derive(Debug)]
pub struct Element {
    pub(crate) id: ElemId,
    pub(crate) kind: crate::elements::ElemKind,
    pub(crate) label: String,
    pub(crate) title: String,
    pub(crate) disabled: bool,
    pub(crate) params: Vec<Parameter>,
    pub(crate) m: Matrices,
    pub(crate) options: ElemOptions,
    pub(crate) sub_range_si: f64,
    pub(crate) matrix_locked: bool,
    pub(crate) matrix_dirty: bool,
    pub(crate) matrix_rev: u64,
    pub(crate) pending: Vec<String>,
    pub(crate) error: Option<String>,
    pub(crate) matrix_formula: Option<MatrixFormula>,
}

impl Element {
    pub fn id(&self) -> ElemId {
        self.id
    }

    pub fn kind(&self) -> crate::elements::ElemKind {
        self.kind
    }

    pub fn options(&self) -> ElemOptions {
        self.options
    }

    /// Short identifier chosen by the user, e.g. `"M1"`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// User title, e.g. `"Output coupler"`.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// The label, or the element type name when no label is set. The owning
    /// system substitutes a positional `#N` for unlabeled elements.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            self.kind.type_name()
        } else {
            &self.label
        }
    }

    /// The title, or [`Element::display_label`] when no title is set.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            self.display_label()
        } else {
            &self.title
        }
    }

    /// `"label (title)"`, or whichever of the two is set.
    pub fn display_label_title(&self) -> String {
        match (self.label.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} ({})", self.label, self.title),
            (false, true) => self.label.clone(),
            (true, false) => self.title.clone(),
            (true, true) => self.kind.type_name().to_string(),
        }
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    /// Enable or disable the element. Disabled elements keep their
    /// parameters but contribute identity matrices.
    pub fn set_disabled(&mut self, disabled: bool) {
        if self.disabled != disabled {
            self.disabled = disabled;
            self.calc_matrix();
        }
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param(&self, alias: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.alias() == alias)
    }

    pub(crate) fn param_mut(&mut self, alias: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.alias() == alias)
    }

    /// Attach an extra parameter (custom-formula elements build their
    /// parameter list at run time).
    pub fn add_param(&mut self, param: Parameter) {
        self.params.push(param);
    }

    /// Detach a parameter by alias.
    pub fn remove_param(&mut self, alias: &str) -> Option<Parameter> {
        let idx = self.params.iter().position(|p| p.alias() == alias)?;
        Some(self.params.remove(idx))
    }

    /// Assign a parameter value. Unless the element is locked, a changed
    /// value triggers an immediate matrix recalculation.
    ///
    /// Returns whether the stored value actually changed.
    pub fn set_param(&mut self, alias: &str, value: Value) -> Result<bool, ParamError> {
        let param = self
            .param_mut(alias)
            .ok_or_else(|| ParamError::NoSuchParam(alias.to_string()))?;
        let changed = param.set_value(value);
        if changed {
            if self.matrix_locked {
                self.matrix_dirty = true;
                self.pending.push(alias.to_string());
            } else {
                self.calc_matrix();
            }
        }
        Ok(changed)
    }

    /// Parameter value in SI; NaN for a missing alias, which propagates
    /// visibly through any matrix derivation.
    pub(crate) fn p(&self, alias: &str) -> f64 {
        self.param(alias)
            .map(|p| p.value().to_si())
            .unwrap_or(f64::NAN)
    }

    pub fn mt(&self) -> &Matrix {
        &self.m.t
    }

    pub fn ms(&self) -> &Matrix {
        &self.m.s
    }

    pub fn mt_inv(&self) -> &Matrix {
        &self.m.t_inv
    }

    pub fn ms_inv(&self) -> &Matrix {
        &self.m.s_inv
    }

    /// Left half-matrix pair: propagation from the entry up to the interior
    /// point set by [`Element::set_sub_range`].
    pub fn mt1(&self) -> &Matrix {
        &self.m.t1
    }

    pub fn ms1(&self) -> &Matrix {
        &self.m.s1
    }

    /// Right half-matrix pair: from the interior point to the exit.
    pub fn mt2(&self) -> &Matrix {
        &self.m.t2
    }

    pub fn ms2(&self) -> &Matrix {
        &self.m.s2
    }

    /// Number of matrix recalculations since construction. Views use this
    /// to detect stale captures of the matrix set.
    pub fn matrix_rev(&self) -> u64 {
        self.matrix_rev
    }

    /// Recompute the matrix set from the current parameter values.
    /// Idempotent; a disabled element yields identity matrices.
    pub fn calc_matrix(&mut self) {
        self.matrix_rev += 1;
        if self.disabled {
            self.m.set_unity();
        } else {
            self.calc_matrix_internal();
        }
    }

    /// Lock the element for a batch of parameter edits: recalculation is
    /// deferred until the guard drops, then performed exactly once.
    pub fn lock(&mut self) -> MatrixLock<'_> {
        self.matrix_locked = true;
        MatrixLock { elem: self }
    }

    pub(crate) fn unlock_matrix(&mut self) -> bool {
        self.matrix_locked = false;
        if self.matrix_dirty {
            self.matrix_dirty = false;
            self.calc_matrix();
            true
        } else {
            false
        }
    }

    /// Aliases of parameters changed during the current lock, drained on
    /// release by the owning system for link/formula propagation.
    pub(crate) fn take_pending(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }

    /// Whether the element failed to produce valid matrices (broken formula
    /// code or a failed parameter driver).
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.params.iter().any(|p| p.failed())
    }

    pub fn fail_reason(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        self.params.iter().find(|p| p.failed()).map(|p| {
            format!(
                "parameter {} failed: {}",
                p.display_label(),
                p.error().unwrap_or_default()
            )
        })
    }

    /// Install or replace the user matrix code of a custom-formula element.
    pub fn set_matrix_formula(&mut self, formula: MatrixFormula) {
        self.matrix_formula = Some(formula);
        self.calc_matrix();
    }

    pub fn matrix_formula(&self) -> Option<&MatrixFormula> {
        self.matrix_formula.as_ref()
    }
}

/// Drop guard for batched element edits; see [`Element::lock`].
pub struct MatrixLock<'a> {
    elem: &'a mut Element,
}

impl std::ops::Deref for MatrixLock<'_> {
    type Target = Element;
    fn deref(&self) -> &Element {
        self.elem
    }
}

impl std::ops::DerefMut for MatrixLock<'_> {
    fn deref_mut(&mut self) -> &mut Element {
        self.elem
    }
}

impl Drop for MatrixLock<'_> {
    fn drop(&mut self) {
        self.elem.unlock_matrix();
    }
}

/// Copy parameter values between two elements of the same shape, as one
/// batched edit. Parameters are matched positionally.
pub fn copy_param_values(source: &Element, target: &mut Element) {
    if source.params.len() != target.params.len() {
        log::warn!(
            "copy_param_values: elements have different parameter counts ({} vs {})",
            source.params.len(),
            target.params.len()
        );
        return;
    }
    let values: Vec<Value> = source.params.iter().map(|p| p.value()).collect();
    let mut locked = target.lock();
    for (i, value) in values.into_iter().enumerate() {
        let alias = locked.params[i].alias().to_string();
        let _ = locked.set_param(&alias, value);
    }
}

/// Copy parameter values between elements of possibly different kinds,
/// matching parameters by alias and dimension.
pub fn copy_param_values_by_name(source: &Element, target: &mut Element) {
    let values: Vec<(String, Value, raytrix_units::Dim)> = source
        .params
        .iter()
        .map(|p| (p.alias().to_string(), p.value(), p.dim()))
        .collect();
    let mut locked = target.lock();
    for (alias, value, dim) in values {
        let matches = locked
            .param(&alias)
            .map(|p| p.dim() == dim)
            .unwrap_or(false);
        if matches {
            let _ = locked.set_param(&alias, value);
        }
    }
}
