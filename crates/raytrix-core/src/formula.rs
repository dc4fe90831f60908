//! Formula-driven parameters.
//!
//! A [`Formula`] binds an expression string to a target parameter and a list
//! of dependency parameters. Evaluation is delegated to an injected
//! [`ExprEvaluator`] strategy — the engine never parses expressions itself,
//! so any scripting runtime can be plugged in behind the trait.
//!
//! A failing formula leaves the target parameter at its last good value and
//! records the error; it never substitutes a default.

use crate::param::{ParamId, Parameter};

/// Opaque expression evaluation strategy.
///
/// `bindings` carries the dependency parameters as `(alias, SI value)`
/// pairs. Implementations return the numeric result, or a human-readable
/// error message when the expression cannot be evaluated.
pub trait ExprEvaluator {
    fn evaluate(&self, code: &str, bindings: &[(&str, f64)]) -> Result<f64, String>;
}

/// The built-in fallback evaluator: accepts plain numeric literals only.
///
/// Useful for tests and for systems loaded without a scripting runtime.
#[derive(Debug, Default)]
pub struct PlainEvaluator;

impl ExprEvaluator for PlainEvaluator {
    fn evaluate(&self, code: &str, _bindings: &[(&str, f64)]) -> Result<f64, String> {
        let code = code.trim();
        if code.is_empty() {
            return Err("formula is empty".into());
        }
        code.parse::<f64>()
            .map_err(|_| format!("invalid numeric value: {code}"))
    }
}

/// An expression over other parameters driving one target parameter.
#[derive(Debug)]
pub struct Formula {
    target: ParamId,
    code: String,
    deps: Vec<ParamId>,
    error: Option<String>,
}

impl Formula {
    pub fn new(target: ParamId) -> Self {
        Self {
            target,
            code: String::new(),
            deps: Vec::new(),
            error: None,
        }
    }

    pub fn target(&self) -> ParamId {
        self.target
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }

    pub fn deps(&self) -> &[ParamId] {
        &self.deps
    }

    pub fn add_dep(&mut self, param: ParamId) {
        if !self.deps.contains(&param) {
            self.deps.push(param);
        }
    }

    pub fn remove_dep(&mut self, param: ParamId) {
        self.deps.retain(|d| *d != param);
    }

    pub fn depends_on(&self, param: ParamId) -> bool {
        self.deps.contains(&param)
    }

    /// `true` when the last evaluation succeeded.
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Evaluate the expression and assign the result to the target, keeping
    /// the target's display unit. On failure the target keeps its previous
    /// value and its failure flag is raised.
    ///
    /// Returns whether the target value actually changed.
    pub fn calculate(
        &mut self,
        target: &mut Parameter,
        bindings: &[(&str, f64)],
        evaluator: &dyn ExprEvaluator,
    ) -> bool {
        match evaluator.evaluate(&self.code, bindings) {
            Ok(result) => {
                self.error = None;
                target.set_error(None);
                target.set_si(result)
            }
            Err(message) => {
                target.set_error(Some(message.clone()));
                self.error = Some(message);
                false
            }
        }
    }
}
