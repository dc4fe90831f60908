//! The optical system: an ordered element sequence with cross-element
//! dependencies.
//!
//! The system owns the elements, the link table, the formulas and the
//! wavelength parameter. It routes every mutation: a parameter change
//! recalculates the owning element, then follows links and formulas
//! breadth-first until the dependency graph settles, emitting one event per
//! affected element.
//!
//! Listeners are plain registered closures, invoked synchronously after the
//! mutation that caused the event has settled. A listener must not mutate
//! the system from inside the callback; the engine does not guard against
//! re-entrancy.
//!
//! The driver graph is assumed to be acyclic — the layer that manages links
//! is responsible for refusing cycles. If a cycle does slip in, propagation
//! visits every parameter at most once per mutation, so the engine goes
//! stale rather than looping forever.

use std::collections::{HashSet, VecDeque};

use raytrix_units::{dims, units, Value};

use crate::element::{ElemId, Element};
use crate::elements::ElemKind;
use crate::formula::{ExprEvaluator, Formula, PlainEvaluator};
use crate::param::{ParamError, ParamId, ParamLink, Parameter, ValueDriver};

/// Cavity topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TripType {
    /// Standing-wave resonator: the beam travels the sequence forth and back.
    #[default]
    SW,
    /// Ring resonator: the beam travels the closed loop in one direction.
    RR,
    /// Single-pass system: no cavity, one traversal.
    SP,
}

impl TripType {
    /// Whether the topology forms a closed cavity with a stability notion.
    pub fn is_resonator(&self) -> bool {
        matches!(self, TripType::SW | TripType::RR)
    }
}

/// Notifications emitted to registered listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// An element recalculated its matrices. `param` names the changed
    /// parameter, or is `None` for batched edits and label/flag changes.
    ElementChanged {
        elem: ElemId,
        param: Option<String>,
    },
    /// The element sequence itself changed (insert, remove, move).
    Rebuilt,
    /// A global custom parameter changed.
    CustomParamChanged { param: ParamId },
    /// The system wavelength changed.
    WavelengthChanged,
}

enum ParamLoc {
    Elem(usize, String),
    Custom(usize),
    Wavelength,
}

/// An ordered sequence of optical elements plus their dependency graph.
pub struct OpticalSystem {
    elements: Vec<Element>,
    trip_type: TripType,
    wavelength: Parameter,
    custom_params: Vec<Parameter>,
    links: Vec<ParamLink>,
    formulas: Vec<Formula>,
    evaluator: Box<dyn ExprEvaluator>,
    listeners: Vec<Box<dyn FnMut(&SystemEvent)>>,
    events_locked: bool,
}

impl Default for OpticalSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl OpticalSystem {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            trip_type: TripType::default(),
            wavelength: Parameter::new(dims::linear(), "Lambda")
                .label("λ")
                .name("Wavelength")
                .initial(Value::new(980.0, units::nm())),
            custom_params: Vec::new(),
            links: Vec::new(),
            formulas: Vec::new(),
            evaluator: Box::new(PlainEvaluator),
            listeners: Vec::new(),
            events_locked: false,
        }
    }

    /// Replace the expression evaluation strategy used by formulas.
    pub fn set_evaluator(&mut self, evaluator: Box<dyn ExprEvaluator>) {
        self.evaluator = evaluator;
    }

    /// Register a change listener.
    pub fn add_listener(&mut self, listener: impl FnMut(&SystemEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: SystemEvent) {
        if self.events_locked {
            return;
        }
        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            listener(&event);
        }
        // keep listeners registered from inside a callback
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    // ---- sequence access -------------------------------------------------

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn count(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, id: ElemId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn index_of(&self, id: ElemId) -> Option<usize> {
        self.elements.iter().position(|e| e.id() == id)
    }

    fn idx(&self, id: ElemId) -> Result<usize, ParamError> {
        self.index_of(id)
            .ok_or(ParamError::NoSuchElement(id.raw()))
    }

    /// Enabled elements, in sequence order.
    pub fn active_elements(&self) -> Vec<&Element> {
        self.elements.iter().filter(|e| !e.disabled()).collect()
    }

    /// Element label for display: the user label, or `#N` by position.
    pub fn display_label(&self, id: ElemId) -> String {
        match self.element(id) {
            Some(elem) if !elem.label().is_empty() => elem.label().to_string(),
            Some(elem) => match self.index_of(id) {
                Some(i) => format!("#{}", i + 1),
                None => elem.kind().type_name().to_string(),
            },
            None => String::new(),
        }
    }

    // ---- sequence mutation ----------------------------------------------

    /// Append an element to the sequence.
    pub fn add_element(&mut self, elem: Element) -> ElemId {
        let at = self.elements.len();
        self.insert_element(at, elem)
    }

    /// Insert an element at a position.
    pub fn insert_element(&mut self, index: usize, mut elem: Element) -> ElemId {
        let id = elem.id();
        if elem.options().requires_wavelength {
            let _ = elem.set_param("Lambda", self.wavelength.value());
        }
        let index = index.min(self.elements.len());
        self.elements.insert(index, elem);
        self.relink_interfaces();
        self.emit(SystemEvent::Rebuilt);
        id
    }

    /// Remove an element, dropping every link and formula that touches its
    /// parameters.
    pub fn remove_element(&mut self, id: ElemId) -> Option<Element> {
        let index = self.index_of(id)?;
        let elem = self.elements.remove(index);
        let ids: HashSet<ParamId> = elem.params().iter().map(|p| p.id()).collect();
        self.links
            .retain(|l| !ids.contains(&l.source) && !ids.contains(&l.target));
        self.formulas.retain(|f| !ids.contains(&f.target()));
        for formula in &mut self.formulas {
            for pid in &ids {
                formula.remove_dep(*pid);
            }
        }
        self.relink_interfaces();
        self.emit(SystemEvent::Rebuilt);
        Some(elem)
    }

    /// Move an element one position towards the start, wrapping around.
    pub fn move_element_up(&mut self, id: ElemId) {
        if let Some(index) = self.index_of(id) {
            let target = if index == 0 {
                self.elements.len() - 1
            } else {
                index - 1
            };
            self.elements.swap(index, target);
            self.relink_interfaces();
            self.emit(SystemEvent::Rebuilt);
        }
    }

    /// Move an element one position towards the end, wrapping around.
    pub fn move_element_down(&mut self, id: ElemId) {
        if let Some(index) = self.index_of(id) {
            let target = if index == self.elements.len() - 1 {
                0
            } else {
                index + 1
            };
            self.elements.swap(index, target);
            self.relink_interfaces();
            self.emit(SystemEvent::Rebuilt);
        }
    }

    // ---- topology and wavelength ----------------------------------------

    pub fn trip_type(&self) -> TripType {
        self.trip_type
    }

    /// Change the cavity topology. Interface links depend on it (a ring
    /// wraps the neighbor lookup), so the sequence is re-linked.
    pub fn set_trip_type(&mut self, trip_type: TripType) {
        if self.trip_type != trip_type {
            self.trip_type = trip_type;
            self.relink_interfaces();
            self.emit(SystemEvent::Rebuilt);
        }
    }

    pub fn wavelength(&self) -> &Parameter {
        &self.wavelength
    }

    pub fn wavelength_si(&self) -> f64 {
        self.wavelength.value().to_si()
    }

    /// Change the system wavelength and push it into every element that
    /// requires it for matrix calculation.
    pub fn set_wavelength(&mut self, value: Value) {
        if !self.wavelength.set_value(value) {
            return;
        }
        let value = self.wavelength.value();
        let targets: Vec<ElemId> = self
            .elements
            .iter()
            .filter(|e| e.options().requires_wavelength)
            .map(|e| e.id())
            .collect();
        for id in targets {
            if let Ok(i) = self.idx(id) {
                match self.elements[i].set_param("Lambda", value) {
                    Ok(true) => self.emit(SystemEvent::ElementChanged {
                        elem: id,
                        param: Some("Lambda".into()),
                    }),
                    Ok(false) => {}
                    Err(_) => log::warn!(
                        "element {} requires the wavelength but has no Lambda parameter",
                        self.display_label(id)
                    ),
                }
            }
        }
        self.emit(SystemEvent::WavelengthChanged);
    }

    // ---- parameter mutation ---------------------------------------------

    /// Assign an element parameter. The owning element recalculates its
    /// matrices immediately, then the change propagates through links and
    /// formulas.
    pub fn set_param(
        &mut self,
        elem: ElemId,
        alias: &str,
        value: Value,
    ) -> Result<bool, ParamError> {
        let i = self.idx(elem)?;
        let pid = self.elements[i]
            .param(alias)
            .ok_or_else(|| ParamError::NoSuchParam(alias.to_string()))?
            .id();
        let changed = self.elements[i].set_param(alias, value)?;
        if changed {
            self.emit(SystemEvent::ElementChanged {
                elem,
                param: Some(alias.to_string()),
            });
            self.propagate(vec![pid]);
        }
        Ok(changed)
    }

    /// Batch-edit an element: any number of parameter changes inside the
    /// closure produce exactly one matrix recalculation and exactly one
    /// [`SystemEvent::ElementChanged`] notification.
    pub fn update_element(
        &mut self,
        elem: ElemId,
        edit: impl FnOnce(&mut Element),
    ) -> Result<(), ParamError> {
        let i = self.idx(elem)?;
        {
            let mut lock = self.elements[i].lock();
            edit(&mut lock);
        }
        let pending = self.elements[i].take_pending();
        if !pending.is_empty() {
            let pids: Vec<ParamId> = pending
                .iter()
                .filter_map(|alias| self.elements[i].param(alias).map(|p| p.id()))
                .collect();
            self.emit(SystemEvent::ElementChanged { elem, param: None });
            self.propagate(pids);
        }
        Ok(())
    }

    /// Enable or disable an element.
    pub fn set_elem_disabled(&mut self, elem: ElemId, disabled: bool) -> Result<(), ParamError> {
        let i = self.idx(elem)?;
        if self.elements[i].disabled() != disabled {
            self.elements[i].set_disabled(disabled);
            self.relink_interfaces();
            self.emit(SystemEvent::ElementChanged { elem, param: None });
        }
        Ok(())
    }

    pub fn set_elem_label(&mut self, elem: ElemId, label: &str) -> Result<(), ParamError> {
        let i = self.idx(elem)?;
        self.elements[i].set_label(label);
        self.emit(SystemEvent::ElementChanged { elem, param: None });
        Ok(())
    }

    pub fn set_elem_title(&mut self, elem: ElemId, title: &str) -> Result<(), ParamError> {
        let i = self.idx(elem)?;
        self.elements[i].set_title(title);
        self.emit(SystemEvent::ElementChanged { elem, param: None });
        Ok(())
    }

    // ---- custom parameters ----------------------------------------------

    /// Add a global parameter that elements can link to or formulas can
    /// depend on.
    pub fn add_custom_param(&mut self, param: Parameter) -> ParamId {
        let id = param.id();
        self.custom_params.push(param);
        id
    }

    pub fn custom_params(&self) -> &[Parameter] {
        &self.custom_params
    }

    pub fn custom_param(&self, alias: &str) -> Option<&Parameter> {
        self.custom_params.iter().find(|p| p.alias() == alias)
    }

    /// Assign a global custom parameter and propagate the change. A
    /// parameter nothing depends on notifies no element.
    pub fn set_custom_param(&mut self, alias: &str, value: Value) -> Result<bool, ParamError> {
        let i = self
            .custom_params
            .iter()
            .position(|p| p.alias() == alias)
            .ok_or_else(|| ParamError::NoSuchParam(alias.to_string()))?;
        let pid = self.custom_params[i].id();
        let changed = self.custom_params[i].set_value(value);
        if changed {
            self.emit(SystemEvent::CustomParamChanged { param: pid });
            self.propagate(vec![pid]);
        }
        Ok(changed)
    }

    // ---- links and formulas ---------------------------------------------

    pub fn links(&self) -> &[ParamLink] {
        &self.links
    }

    /// Link `target` to mirror `source`. The link is applied immediately.
    pub fn add_link(&mut self, source: ParamId, target: ParamId) {
        self.add_link_impl(source, target, true);
    }

    fn add_link_impl(&mut self, source: ParamId, target: ParamId, storable: bool) {
        self.links.push(ParamLink {
            source,
            target,
            storable,
        });
        if let Some(param) = self.param_mut_by_id(target) {
            param.set_driver(ValueDriver::Link);
        }
        if let Some(value) = self.param_value(source) {
            self.apply_link_value(target, value);
        }
    }

    /// Remove the link driving `target`, if any.
    pub fn remove_link(&mut self, target: ParamId) {
        let had = self.links.iter().any(|l| l.target == target);
        self.links.retain(|l| l.target != target);
        if had {
            if let Some(param) = self.param_mut_by_id(target) {
                param.set_driver(ValueDriver::None);
            }
        }
    }

    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    pub fn formula(&self, target: ParamId) -> Option<&Formula> {
        self.formulas.iter().find(|f| f.target() == target)
    }

    /// Attach a formula driving its target parameter; any previous formula
    /// for the same target is replaced. The formula is calculated
    /// immediately.
    pub fn add_formula(&mut self, formula: Formula) {
        let target = formula.target();
        self.formulas.retain(|f| f.target() != target);
        if let Some(param) = self.param_mut_by_id(target) {
            param.set_driver(ValueDriver::Formula);
        }
        self.formulas.push(formula);
        self.recalc_formula(target);
    }

    /// Detach the formula driving `target`.
    pub fn remove_formula(&mut self, target: ParamId) {
        let had = self.formulas.iter().any(|f| f.target() == target);
        self.formulas.retain(|f| f.target() != target);
        if had {
            if let Some(param) = self.param_mut_by_id(target) {
                param.set_driver(ValueDriver::None);
            }
        }
    }

    /// Whether `which` is driven, directly or transitively, by `on`.
    pub fn depends_on(&self, which: ParamId, on: ParamId) -> bool {
        let mut queue = VecDeque::from([which]);
        let mut seen = HashSet::new();
        while let Some(pid) = queue.pop_front() {
            if !seen.insert(pid) {
                continue;
            }
            if pid == on && pid != which {
                return true;
            }
            for link in self.links.iter().filter(|l| l.target == pid) {
                queue.push_back(link.source);
            }
            if let Some(formula) = self.formula(pid) {
                queue.extend(formula.deps().iter().copied());
            }
        }
        false
    }

    /// Edit the formula driving `target` (e.g. change its code or
    /// dependencies), then recalculate it and propagate the result.
    pub fn update_formula(&mut self, target: ParamId, edit: impl FnOnce(&mut Formula)) {
        let Some(fi) = self.formulas.iter().position(|f| f.target() == target) else {
            return;
        };
        edit(&mut self.formulas[fi]);
        if self.recalc_formula(target) {
            self.propagate(vec![target]);
        }
    }

    // ---- dependency propagation -----------------------------------------

    fn locate(&self, pid: ParamId) -> Option<ParamLoc> {
        if self.wavelength.id() == pid {
            return Some(ParamLoc::Wavelength);
        }
        if let Some(i) = self.custom_params.iter().position(|p| p.id() == pid) {
            return Some(ParamLoc::Custom(i));
        }
        for (i, elem) in self.elements.iter().enumerate() {
            if let Some(p) = elem.params().iter().find(|p| p.id() == pid) {
                return Some(ParamLoc::Elem(i, p.alias().to_string()));
            }
        }
        None
    }

    fn param_value(&self, pid: ParamId) -> Option<Value> {
        match self.locate(pid)? {
            ParamLoc::Wavelength => Some(self.wavelength.value()),
            ParamLoc::Custom(i) => Some(self.custom_params[i].value()),
            ParamLoc::Elem(i, alias) => self.elements[i].param(&alias).map(|p| p.value()),
        }
    }

    fn param_mut_by_id(&mut self, pid: ParamId) -> Option<&mut Parameter> {
        if self.wavelength.id() == pid {
            return Some(&mut self.wavelength);
        }
        if let Some(i) = self.custom_params.iter().position(|p| p.id() == pid) {
            return Some(&mut self.custom_params[i]);
        }
        for elem in &mut self.elements {
            if let Some(p) = elem.params.iter_mut().find(|p| p.id() == pid) {
                return Some(p);
            }
        }
        None
    }

    /// Copy a linked value onto its target, recalculating and notifying the
    /// owning element. Returns whether the target changed.
    fn apply_link_value(&mut self, target: ParamId, value: Value) -> bool {
        let Some(loc) = self.locate(target) else {
            log::warn!("link target parameter no longer exists");
            return false;
        };
        match loc {
            ParamLoc::Elem(i, alias) => {
                let verify = self.elements[i]
                    .param(&alias)
                    .map(|p| p.verify(&value))
                    .unwrap_or(Ok(()));
                if let Err(reason) = verify {
                    log::warn!("unable to apply link to {alias}: {reason}");
                    return false;
                }
                let elem = self.elements[i].id();
                let changed = self.elements[i].set_param(&alias, value).unwrap_or(false);
                if changed {
                    self.emit(SystemEvent::ElementChanged {
                        elem,
                        param: Some(alias),
                    });
                }
                changed
            }
            ParamLoc::Custom(i) => {
                let pid = self.custom_params[i].id();
                let changed = self.custom_params[i].set_value(value);
                if changed {
                    self.emit(SystemEvent::CustomParamChanged { param: pid });
                }
                changed
            }
            ParamLoc::Wavelength => false,
        }
    }

    /// Recalculate the formula driving `target`. Returns whether the target
    /// value changed.
    fn recalc_formula(&mut self, target: ParamId) -> bool {
        let Some(fi) = self.formulas.iter().position(|f| f.target() == target) else {
            return false;
        };
        let deps = self.formulas[fi].deps().to_vec();
        let bindings_owned: Vec<(String, f64)> = deps
            .iter()
            .filter_map(|d| {
                let loc = self.locate(*d)?;
                let (alias, value) = match loc {
                    ParamLoc::Wavelength => (
                        self.wavelength.alias().to_string(),
                        self.wavelength.value().to_si(),
                    ),
                    ParamLoc::Custom(i) => (
                        self.custom_params[i].alias().to_string(),
                        self.custom_params[i].value().to_si(),
                    ),
                    ParamLoc::Elem(i, alias) => {
                        let p = self.elements[i].param(&alias)?;
                        (alias, p.value().to_si())
                    }
                };
                Some((alias, value))
            })
            .collect();
        let bindings: Vec<(&str, f64)> = bindings_owned
            .iter()
            .map(|(a, v)| (a.as_str(), *v))
            .collect();

        let mut formula = self.formulas.remove(fi);
        let changed = match self.locate(target) {
            Some(ParamLoc::Elem(i, alias)) => {
                let elem = self.elements[i].id();
                let changed = match self.elements[i].param_mut(&alias) {
                    Some(param) => formula.calculate(param, &bindings, &*self.evaluator),
                    None => false,
                };
                if changed {
                    self.elements[i].calc_matrix();
                }
                if changed || !formula.ok() {
                    // a failed driver leaves the value but the error state
                    // must still reach the listeners
                    self.emit(SystemEvent::ElementChanged {
                        elem,
                        param: Some(alias),
                    });
                }
                changed
            }
            Some(ParamLoc::Custom(i)) => {
                let pid = self.custom_params[i].id();
                let changed =
                    formula.calculate(&mut self.custom_params[i], &bindings, &*self.evaluator);
                if changed || !formula.ok() {
                    self.emit(SystemEvent::CustomParamChanged { param: pid });
                }
                changed
            }
            _ => false,
        };
        self.formulas.insert(fi.min(self.formulas.len()), formula);
        changed
    }

    /// Breadth-first settlement of the dependency graph after the given
    /// parameters changed. Each parameter is visited at most once.
    fn propagate(&mut self, changed: Vec<ParamId>) {
        let mut queue: VecDeque<ParamId> = changed.into();
        let mut seen: HashSet<ParamId> = queue.iter().copied().collect();
        while let Some(pid) = queue.pop_front() {
            let targets: Vec<ParamId> = self
                .links
                .iter()
                .filter(|l| l.source == pid)
                .map(|l| l.target)
                .collect();
            for target in targets {
                if let Some(value) = self.param_value(pid) {
                    if self.apply_link_value(target, value) && seen.insert(target) {
                        queue.push_back(target);
                    }
                }
            }

            let dependents: Vec<ParamId> = self
                .formulas
                .iter()
                .filter(|f| f.depends_on(pid))
                .map(|f| f.target())
                .collect();
            for target in dependents {
                if self.recalc_formula(target) && seen.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }

    // ---- interface linking ----------------------------------------------

    /// Rebuild the structural links that drive interface refraction indices
    /// from their neighboring range elements. Called after every sequence
    /// edit; the links are positional and never persisted.
    fn relink_interfaces(&mut self) {
        // Structural re-linking is part of a sequence rebuild; the single
        // Rebuilt event that follows covers it.
        self.events_locked = true;
        self.relink_interfaces_impl();
        self.events_locked = false;
    }

    fn relink_interfaces_impl(&mut self) {
        let active: Vec<usize> = (0..self.elements.len())
            .filter(|&i| !self.elements[i].disabled())
            .collect();

        for (k, &i) in active.iter().enumerate() {
            if !self.elements[i].kind().is_interface() {
                continue;
            }

            let ior1 = self.elements[i].param("n1").map(|p| p.id());
            let ior2 = self.elements[i].param("n2").map(|p| p.id());
            let (Some(ior1), Some(ior2)) = (ior1, ior2) else {
                continue;
            };

            self.links
                .retain(|l| l.target != ior1 && l.target != ior2);

            let left = if k == 0 {
                match self.trip_type {
                    TripType::RR => active.last().copied().filter(|&j| j != i),
                    _ => None,
                }
            } else {
                Some(active[k - 1])
            }
            .filter(|&j| self.elements[j].kind().is_range());

            match left {
                Some(j) => {
                    let source = self.elements[j].param("n").map(|p| p.id());
                    if let Some(source) = source {
                        self.add_link_impl(source, ior1, false);
                    }
                }
                None => {
                    if let Some(p) = self.param_mut_by_id(ior1) {
                        p.set_driver(ValueDriver::None);
                    }
                    self.apply_link_value(ior1, Value::none(1.0));
                }
            }

            let right = if k == active.len() - 1 {
                match self.trip_type {
                    TripType::RR => active.first().copied().filter(|&j| j != i),
                    _ => None,
                }
            } else {
                Some(active[k + 1])
            }
            .filter(|&j| self.elements[j].kind().is_range());

            match right {
                Some(j) => {
                    let source = self.elements[j].param("n").map(|p| p.id());
                    if let Some(source) = source {
                        self.add_link_impl(source, ior2, false);
                    }
                }
                None => {
                    if let Some(p) = self.param_mut_by_id(ior2) {
                        p.set_driver(ValueDriver::None);
                    }
                    self.apply_link_value(ior2, Value::none(1.0));
                }
            }
        }
    }

    /// Create and append a fresh element of the given kind.
    pub fn add_new(&mut self, kind: ElemKind) -> ElemId {
        self.add_element(Element::new(kind))
    }
}
