//! Unit and dimension registry.
//!
//! Units are immutable process-wide singletons: a [`Unit`] is a cheap `Copy`
//! handle to a static descriptor. Conversions `to_si`/`from_si` are pure and
//! mutually inverse up to ordinary floating rounding (angular units go
//! through a multiplication by π/180 and back, so round-trips are exact only
//! to within one ulp).
//!
//! A [`Dim`] groups the units that measure the same kind of quantity. The
//! first unit with conversion factor 1 is the dimension's SI unit.

use std::fmt;

struct UnitDef {
    alias: &'static str,
    name: &'static str,
    to_si: fn(f64) -> f64,
    from_si: fn(f64) -> f64,
    si: fn() -> Unit,
}

/// Handle to a unit of measurement (`mm`, `deg`, …).
///
/// Two handles are equal iff they point at the same registered unit.
#[derive(Clone, Copy)]
pub struct Unit(&'static UnitDef);

impl Unit {
    /// Storable identifier of the unit, e.g. `"mm"`.
    pub fn alias(&self) -> &'static str {
        self.0.alias
    }

    /// Display name of the unit, e.g. `"µm"` for the `mkm` alias.
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Convert a value expressed in this unit into SI.
    pub fn to_si(&self, value: f64) -> f64 {
        (self.0.to_si)(value)
    }

    /// Convert an SI value into this unit.
    pub fn from_si(&self, value: f64) -> f64 {
        (self.0.from_si)(value)
    }

    /// The unit of the same dimension whose conversion factor is 1.
    pub fn si_unit(&self) -> Unit {
        (self.0.si)()
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Unit {}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit({})", self.0.alias)
    }
}

struct DimDef {
    alias: &'static str,
    name: &'static str,
    si: fn() -> Unit,
    units: &'static [Unit],
}

/// Handle to a dimension — a family of mutually convertible units.
#[derive(Clone, Copy)]
pub struct Dim(&'static DimDef);

impl Dim {
    /// Storable identifier of the dimension, e.g. `"linear"`.
    pub fn alias(&self) -> &'static str {
        self.0.alias
    }

    /// Display name of the dimension.
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Units belonging to this dimension.
    pub fn units(&self) -> &'static [Unit] {
        self.0.units
    }

    /// The unit with conversion factor 1.
    pub fn si_unit(&self) -> Unit {
        (self.0.si)()
    }

    /// Find a unit of this dimension by its alias.
    pub fn unit_by_alias(&self, alias: &str) -> Option<Unit> {
        self.0.units.iter().copied().find(|u| u.alias() == alias)
    }

    /// Like [`Dim::unit_by_alias`] but falls back to the SI unit.
    pub fn unit_by_alias_or_si(&self, alias: &str) -> Unit {
        self.unit_by_alias(alias).unwrap_or_else(|| self.si_unit())
    }
}

impl PartialEq for Dim {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Dim {}

impl fmt::Debug for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dim({})", self.0.alias)
    }
}

macro_rules! define_unit {
    ($static_name:ident, $fn_name:ident, $alias:literal, $name:literal, $to_si:expr, $from_si:expr, $si:ident) => {
        static $static_name: UnitDef = UnitDef {
            alias: $alias,
            name: $name,
            to_si: $to_si,
            from_si: $from_si,
            si: $si,
        };

        pub fn $fn_name() -> Unit {
            Unit(&$static_name)
        }
    };
}

/// The unit singletons.
pub mod units {
    use super::{Unit, UnitDef};
    use std::f64::consts::PI;

    define_unit!(NONE, none, "none", "", |v| v, |v| v, none);

    // Linear units. SI unit is the metre.
    define_unit!(M, m, "m", "m", |v| v, |v| v, m);
    define_unit!(AO, ao, "Ao", "Å", |v| v * 1e-10, |v| v * 1e+10, m);
    define_unit!(NM, nm, "nm", "nm", |v| v * 1e-9, |v| v * 1e+9, m);
    define_unit!(MKM, mkm, "mkm", "µm", |v| v * 1e-6, |v| v * 1e+6, m);
    define_unit!(MM, mm, "mm", "mm", |v| v * 1e-3, |v| v * 1e+3, m);
    define_unit!(CM, cm, "cm", "cm", |v| v * 0.01, |v| v * 100.0, m);

    // Angular units. SI unit is the radian.
    define_unit!(RAD, rad, "rad", "rad", |v| v, |v| v, rad);
    define_unit!(MRAD, mrad, "mrad", "mrad", |v| v * 1e-3, |v| v * 1e+3, rad);
    define_unit!(
        AMIN,
        amin,
        "amin",
        "′",
        |v| v / 60.0 * PI / 180.0,
        |v| v * 180.0 / PI * 60.0,
        rad
    );
    define_unit!(
        DEG,
        deg,
        "deg",
        "°",
        |v| v * PI / 180.0,
        |v| v * 180.0 / PI,
        rad
    );

    // Fixed units: each is its own SI unit.
    define_unit!(HZ, hz, "Hz", "Hz", |v| v, |v| v, hz);
    define_unit!(INV_M, inv_m, "inv_m", "1/m", |v| v, |v| v, inv_m);
    define_unit!(INV_M2, inv_m2, "inv_m2", "1/m²", |v| v, |v| v, inv_m2);
    define_unit!(INV_M3, inv_m3, "inv_m3", "1/m³", |v| v, |v| v, inv_m3);

    /// Find a unit in any dimension by its alias, or fall back to `default`.
    pub fn find_by_alias(alias: &str, default: Unit) -> Unit {
        for dim in super::dims::all() {
            if let Some(unit) = dim.unit_by_alias(alias) {
                return unit;
            }
        }
        default
    }

    /// Returns the dimension a unit belongs to, `dims::none()` for unknown units.
    pub fn guess_dim(unit: Unit) -> super::Dim {
        for dim in super::dims::all() {
            if dim.units().contains(&unit) {
                return dim;
            }
        }
        super::dims::none()
    }
}

/// The dimension singletons.
pub mod dims {
    use super::{units, Dim, DimDef, Unit};

    // Unit handles are produced by constructors, so the per-dimension unit
    // tables are materialized lazily on first access.
    static NONE_UNITS: [fn() -> Unit; 1] = [units::none];
    static LINEAR_UNITS: [fn() -> Unit; 6] = [
        units::ao,
        units::nm,
        units::mkm,
        units::mm,
        units::cm,
        units::m,
    ];
    static ANGULAR_UNITS: [fn() -> Unit; 4] =
        [units::mrad, units::rad, units::amin, units::deg];
    static FIXED_UNITS: [fn() -> Unit; 4] =
        [units::hz, units::inv_m, units::inv_m2, units::inv_m3];

    macro_rules! dim_singleton {
        ($fn_name:ident, $alias:literal, $name:literal, $si:ident, $table:ident) => {
            pub fn $fn_name() -> Dim {
                use std::sync::OnceLock;
                static UNITS: OnceLock<Vec<Unit>> = OnceLock::new();
                static DEF: OnceLock<DimDef> = OnceLock::new();
                let units_list = UNITS.get_or_init(|| $table.iter().map(|f| f()).collect());
                let def = DEF.get_or_init(|| DimDef {
                    alias: $alias,
                    name: $name,
                    si: units::$si,
                    units: units_list,
                });
                Dim(def)
            }
        };
    }

    dim_singleton!(none, "none", "None", none, NONE_UNITS);
    dim_singleton!(linear, "linear", "Linear", m, LINEAR_UNITS);
    dim_singleton!(angular, "angular", "Angular", rad, ANGULAR_UNITS);
    dim_singleton!(fixed, "fixed", "Misc", none, FIXED_UNITS);

    /// All registered dimensions.
    pub fn all() -> [Dim; 4] {
        [none(), linear(), angular(), fixed()]
    }

    /// Find a dimension by its alias.
    pub fn find_by_alias(alias: &str) -> Option<Dim> {
        all().into_iter().find(|d| d.alias() == alias)
    }

    /// Like [`find_by_alias`] but falls back to the dimensionless dimension.
    pub fn find_by_alias_or_none(alias: &str) -> Dim {
        find_by_alias(alias).unwrap_or_else(none)
    }
}

/// Metric prefixes used when rendering large derived values (repetition
/// rates and the like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Prefix {
    None,
    Kilo,
    Mega,
    Giga,
    Tera,
}

impl Prefix {
    const VALUES: [(Prefix, f64); 5] = [
        (Prefix::None, 1.0),
        (Prefix::Kilo, 1e3),
        (Prefix::Mega, 1e6),
        (Prefix::Giga, 1e9),
        (Prefix::Tera, 1e12),
    ];

    /// Short prefix name, e.g. `"M"` for mega.
    pub fn name(&self) -> &'static str {
        match self {
            Prefix::None => "",
            Prefix::Kilo => "k",
            Prefix::Mega => "M",
            Prefix::Giga => "G",
            Prefix::Tera => "T",
        }
    }

    /// Extract the maximal prefix for a value, scaling the value down
    /// accordingly. E.g. `1.4e6` becomes `(Mega, 1.4)`.
    pub fn simplify(value: f64) -> (Prefix, f64) {
        for window in Self::VALUES.windows(2) {
            let (prefix, factor) = window[0];
            let (_, next_factor) = window[1];
            if value.abs() < next_factor {
                return (prefix, value / factor);
            }
        }
        let (prefix, factor) = Self::VALUES[Self::VALUES.len() - 1];
        (prefix, value / factor)
    }
}
