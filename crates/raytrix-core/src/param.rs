//! Named, dimensioned, mutable parameter values.
//!
//! A [`Parameter`] owns a [`Value`] and knows its [`Dim`]; the dimension is
//! fixed at construction, the unit may change freely as long as the SI
//! magnitude is carried over. Parameters are identified across the whole
//! process by a stable [`ParamId`], which is what links and formulas store —
//! never positions or references.
//!
//! The engine performs no dimension validation on assignment: feeding a
//! value of the wrong dimension is a caller bug that the editing layer is
//! expected to catch (see [`ValueCheck`] for the checks it can consult).

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use raytrix_units::{Dim, Value};

/// Stable process-wide parameter identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u32);

impl ParamId {
    fn next() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        ParamId(COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// How a parameter's value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ValueDriver {
    /// The parameter has its own, directly assigned value.
    #[default]
    None,
    /// The value is copied from another parameter.
    Link,
    /// The value is calculated by a formula.
    Formula,
}

/// Closed set of value checks an editing layer should run before assignment.
///
/// The engine itself never rejects a value: a zero radius still reaches the
/// matrix derivation and produces a visibly infinite entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCheck {
    /// Curvature radii and focal lengths must not be zero.
    NonZero(&'static str),
}

impl ValueCheck {
    pub fn verify(&self, value: &Value) -> Result<(), String> {
        match self {
            ValueCheck::NonZero(what) => {
                if value.value() == 0.0 {
                    Err(format!("{what} can not be zero"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Errors from parameter access on elements and systems.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("element has no parameter {0}")]
    NoSuchParam(String),
    #[error("no element with id {0}")]
    NoSuchElement(u32),
}

/// A named, dimensioned, mutable value.
#[derive(Debug, Clone)]
pub struct Parameter {
    id: ParamId,
    alias: String,
    label: String,
    name: String,
    description: String,
    dim: Dim,
    value: Value,
    visible: bool,
    driver: ValueDriver,
    check: Option<ValueCheck>,
    error: Option<String>,
}

impl Parameter {
    pub fn new(dim: Dim, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: ParamId::next(),
            label: alias.clone(),
            name: String::new(),
            description: String::new(),
            alias,
            dim,
            value: Value::new(0.0, dim.si_unit()),
            visible: true,
            driver: ValueDriver::None,
            check: None,
            error: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn check(mut self, check: ValueCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn initial(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Storable name, e.g. `"L"`.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Short display label; falls back to the alias.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.alias
        } else {
            &self.label
        }
    }

    /// Human-readable name, e.g. `"Length"`.
    pub fn param_name(&self) -> &str {
        &self.name
    }

    pub fn param_description(&self) -> &str {
        &self.description
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn value(&self) -> Value {
        self.value
    }

    /// Whether the parameter shows up in editors. Internal and driven
    /// parameters are hidden.
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn driver(&self) -> ValueDriver {
        self.driver
    }

    pub fn set_driver(&mut self, driver: ValueDriver) {
        self.driver = driver;
    }

    /// Assign a new value. Returns `true` when the stored value actually
    /// changed; assigning a value equal (by SI magnitude) to the current
    /// one is a no-op.
    pub fn set_value(&mut self, value: Value) -> bool {
        if self.value == value && self.value.unit() == value.unit() {
            return false;
        }
        let changed = self.value != value;
        self.value = value;
        changed
    }

    /// Assign an SI magnitude, keeping the current display unit.
    pub fn set_si(&mut self, value_si: f64) -> bool {
        self.set_value(Value::from_si(value_si, self.value.unit()))
    }

    /// Run the attached value check, if any. Editors call this before
    /// assignment; the engine does not.
    pub fn verify(&self, value: &Value) -> Result<(), String> {
        match &self.check {
            Some(check) => check.verify(value),
            None => Ok(()),
        }
    }

    /// Failure state of the parameter's driver (e.g. a broken formula).
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.alias, self.value)
    }
}

/// A directed value link: the target parameter mirrors the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLink {
    pub source: ParamId,
    pub target: ParamId,
    /// Structural links (interface refraction indices) are rebuilt from the
    /// element sequence and never persisted.
    pub storable: bool,
}
