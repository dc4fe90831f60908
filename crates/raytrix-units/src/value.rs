//! Valued quantities: a scalar bound to a unit, and tangential/sagittal pairs.
//!
//! Many quantities in an anisotropic optical system are non-degenerate
//! between the two transverse planes; [`PairTS`] and [`ValueTS`] carry the
//! paired variants.

use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::unit::{units, Unit};

/// Transverse work plane: tangential or sagittal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    T,
    S,
}

/// A scalar together with its unit of measurement.
///
/// Comparisons are performed on the SI magnitudes, so `88 mm == 0.088 m`.
#[derive(Debug, Clone, Copy)]
pub struct Value {
    value: f64,
    unit: Unit,
}

impl Value {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// A dimensionless value.
    pub fn none(value: f64) -> Self {
        Self::new(value, units::none())
    }

    /// Construct from an SI magnitude, expressed in the given unit.
    pub fn from_si(value_si: f64, unit: Unit) -> Self {
        Self::new(unit.from_si(value_si), unit)
    }

    /// The raw scalar, in this value's own unit.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// The magnitude converted to SI.
    pub fn to_si(&self) -> f64 {
        self.unit.to_si(self.value)
    }

    /// The same quantity re-expressed in another unit of the same dimension.
    pub fn to_unit(&self, unit: Unit) -> Value {
        Value::new(unit.from_si(self.to_si()), unit)
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::none(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == units::none() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit.name())
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.to_si() == other.to_si()
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.to_si().partial_cmp(&other.to_si())
    }
}

impl std::ops::Neg for Value {
    type Output = Value;
    fn neg(self) -> Value {
        Value::new(-self.value, self.unit)
    }
}

impl std::ops::Mul<f64> for Value {
    type Output = Value;
    fn mul(self, rhs: f64) -> Value {
        Value::new(self.value * rhs, self.unit)
    }
}

impl std::ops::Div<f64> for Value {
    type Output = Value;
    fn div(self, rhs: f64) -> Value {
        Value::new(self.value / rhs, self.unit)
    }
}

// Persisted as `{ "value": …, "unit": "mm" }`; an unknown unit alias is a
// data error rather than a silent fallback.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Value", 2)?;
        s.serialize_field("value", &self.value)?;
        s.serialize_field("unit", self.unit.alias())?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            value: f64,
            unit: String,
        }
        let raw = Raw::deserialize(deserializer)?;
        for dim in crate::unit::dims::all() {
            if let Some(unit) = dim.unit_by_alias(&raw.unit) {
                return Ok(Value::new(raw.value, unit));
            }
        }
        Err(D::Error::custom(format!("unknown unit alias: {}", raw.unit)))
    }
}

/// A pair of per-plane values of any type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PairTS<T> {
    pub t: T,
    pub s: T,
}

impl<T> PairTS<T> {
    pub fn new(t: T, s: T) -> Self {
        Self { t, s }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PairTS<U> {
        PairTS {
            t: f(self.t),
            s: f(self.s),
        }
    }
}

impl<T: Clone> PairTS<T> {
    /// The same value in both planes.
    pub fn both(v: T) -> Self {
        Self {
            t: v.clone(),
            s: v,
        }
    }
}

impl<T> std::ops::Index<Plane> for PairTS<T> {
    type Output = T;
    fn index(&self, plane: Plane) -> &T {
        match plane {
            Plane::T => &self.t,
            Plane::S => &self.s,
        }
    }
}

impl<T> std::ops::IndexMut<Plane> for PairTS<T> {
    fn index_mut(&mut self, plane: Plane) -> &mut T {
        match plane {
            Plane::T => &mut self.t,
            Plane::S => &mut self.s,
        }
    }
}

/// Two per-plane scalars sharing one unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueTS {
    value_t: f64,
    value_s: f64,
    unit: Unit,
}

impl ValueTS {
    pub fn new(value_t: f64, value_s: f64, unit: Unit) -> Self {
        Self {
            value_t,
            value_s,
            unit,
        }
    }

    /// A degenerate pair: the same value in both planes.
    pub fn symmetric(value: f64, unit: Unit) -> Self {
        Self::new(value, value, unit)
    }

    pub fn value_t(&self) -> Value {
        Value::new(self.value_t, self.unit)
    }

    pub fn value_s(&self) -> Value {
        Value::new(self.value_s, self.unit)
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn to_si(&self) -> PairTS<f64> {
        PairTS::new(self.unit.to_si(self.value_t), self.unit.to_si(self.value_s))
    }
}

impl From<Value> for ValueTS {
    fn from(v: Value) -> Self {
        Self::symmetric(v.value(), v.unit())
    }
}
