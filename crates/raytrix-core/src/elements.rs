//! The element catalog: every supported kind with its matrix derivation.
//!
//! Kinds form a closed sum type dispatched through
//! [`Element::calc_matrix_internal`] and [`Element::calc_submatrices`];
//! there is no per-kind vtable. Sign conventions: a positive curvature
//! radius means a concave mirror / left-bulged surface, a positive focal
//! length a collecting lens; zero incidence angle is normal incidence.
//!
//! Singular parameter values (zero focal length or radius) are not guarded:
//! the derivations divide through and the resulting ±∞ entries propagate
//! visibly into every product that includes them.

use num_complex::Complex64;
use raytrix_units::{dims, units, Value};

use crate::element::{ElemId, ElemOptions, Element, Matrices};
use crate::param::{Parameter, ValueCheck};

const RADIUS_CHECK: ValueCheck = ValueCheck::NonZero("Curvature radius");
const FOCUS_CHECK: ValueCheck = ValueCheck::NonZero("Focal length");

/// All supported element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ElemKind {
    EmptyRange,
    MediumRange,
    Plate,
    FlatMirror,
    CurveMirror,
    ThinLens,
    CylinderLensT,
    CylinderLensS,
    TiltedCrystal,
    TiltedPlate,
    BrewsterCrystal,
    BrewsterPlate,
    Matrix,
    Matrix1,
    Point,
    NormalInterface,
    BrewsterInterface,
    TiltedInterface,
    SphericalInterface,
    ThickLens,
    GrinLens,
    GrinMedium,
    GaussAperture,
    GaussApertureLens,
    CustomFormula,
}

impl ElemKind {
    /// The whole catalog, in the order element pickers present it.
    pub const ALL: [ElemKind; 25] = [
        ElemKind::EmptyRange,
        ElemKind::MediumRange,
        ElemKind::Plate,
        ElemKind::FlatMirror,
        ElemKind::CurveMirror,
        ElemKind::ThinLens,
        ElemKind::CylinderLensT,
        ElemKind::CylinderLensS,
        ElemKind::TiltedCrystal,
        ElemKind::TiltedPlate,
        ElemKind::BrewsterCrystal,
        ElemKind::BrewsterPlate,
        ElemKind::Matrix,
        ElemKind::Matrix1,
        ElemKind::Point,
        ElemKind::NormalInterface,
        ElemKind::BrewsterInterface,
        ElemKind::TiltedInterface,
        ElemKind::SphericalInterface,
        ElemKind::ThickLens,
        ElemKind::GrinLens,
        ElemKind::GrinMedium,
        ElemKind::GaussAperture,
        ElemKind::GaussApertureLens,
        ElemKind::CustomFormula,
    ];

    /// Human-friendly name of the kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElemKind::EmptyRange => "Empty space",
            ElemKind::MediumRange => "Space filled with medium",
            ElemKind::Plate => "Plate of matter",
            ElemKind::FlatMirror => "Flat mirror",
            ElemKind::CurveMirror => "Spherical mirror",
            ElemKind::ThinLens => "Thin lens",
            ElemKind::CylinderLensT => "Thin cylindrical tangential lens",
            ElemKind::CylinderLensS => "Thin cylindrical sagittal lens",
            ElemKind::TiltedCrystal => "Tilted plane-parallel crystal",
            ElemKind::TiltedPlate => "Tilted plane-parallel plate",
            ElemKind::BrewsterCrystal => "Brewster plane-parallel crystal",
            ElemKind::BrewsterPlate => "Brewster plane-parallel plate",
            ElemKind::Matrix => "Matrix element (T&S)",
            ElemKind::Matrix1 => "Matrix element (T=S)",
            ElemKind::Point => "Point",
            ElemKind::NormalInterface => "Normal interface",
            ElemKind::BrewsterInterface => "Brewster interface",
            ElemKind::TiltedInterface => "Tilted interface",
            ElemKind::SphericalInterface => "Spherical interface",
            ElemKind::ThickLens => "Thick lens",
            ElemKind::GrinLens => "GRIN lens",
            ElemKind::GrinMedium => "GRIN medium",
            ElemKind::GaussAperture => "Gaussian aperture",
            ElemKind::GaussApertureLens => "Gaussian aperture with thin lens",
            ElemKind::CustomFormula => "Formula element",
        }
    }

    /// Default prefix for auto-generated labels.
    pub fn label_prefix(&self) -> &'static str {
        match self {
            ElemKind::EmptyRange | ElemKind::MediumRange => "d",
            ElemKind::Plate
            | ElemKind::TiltedCrystal
            | ElemKind::TiltedPlate
            | ElemKind::BrewsterCrystal
            | ElemKind::BrewsterPlate => "G",
            ElemKind::FlatMirror | ElemKind::CurveMirror => "M",
            ElemKind::ThinLens
            | ElemKind::CylinderLensT
            | ElemKind::CylinderLensS
            | ElemKind::ThickLens => "F",
            ElemKind::Matrix | ElemKind::Matrix1 | ElemKind::CustomFormula => "C",
            ElemKind::Point => "P",
            ElemKind::NormalInterface
            | ElemKind::BrewsterInterface
            | ElemKind::TiltedInterface
            | ElemKind::SphericalInterface => "s",
            ElemKind::GrinLens => "GL",
            ElemKind::GrinMedium => "GM",
            ElemKind::GaussAperture | ElemKind::GaussApertureLens => "GA",
        }
    }

    /// Range-like kinds have a length and can be probed at an interior point.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            ElemKind::EmptyRange
                | ElemKind::MediumRange
                | ElemKind::Plate
                | ElemKind::TiltedCrystal
                | ElemKind::TiltedPlate
                | ElemKind::BrewsterCrystal
                | ElemKind::BrewsterPlate
                | ElemKind::ThickLens
                | ElemKind::GrinLens
                | ElemKind::GrinMedium
        )
    }

    /// Interface kinds separate two media and get their refraction indices
    /// from the neighboring range elements.
    pub fn is_interface(&self) -> bool {
        matches!(
            self,
            ElemKind::NormalInterface
                | ElemKind::BrewsterInterface
                | ElemKind::TiltedInterface
                | ElemKind::SphericalInterface
        )
    }
}

fn length_param() -> Parameter {
    Parameter::new(dims::linear(), "L")
        .name("Length")
        .initial(Value::new(100.0, units::mm()))
}

fn ior_param() -> Parameter {
    Parameter::new(dims::none(), "n")
        .name("Index of refraction")
        .initial(Value::none(1.0))
}

fn alpha_param() -> Parameter {
    Parameter::new(dims::angular(), "Alpha")
        .label("α")
        .name("Angle of incidence")
        .description("Zero angle is normal incidence.")
        .initial(Value::new(0.0, units::deg()))
}

fn lambda_param() -> Parameter {
    Parameter::new(dims::linear(), "Lambda")
        .label("λ")
        .name("Wavelength")
        .initial(Value::new(980.0, units::nm()))
        .hidden()
}

fn matrix_params(suffix: &str) -> [Parameter; 4] {
    [
        Parameter::new(dims::none(), format!("A{suffix}")).initial(Value::none(1.0)),
        Parameter::new(dims::linear(), format!("B{suffix}"))
            .initial(Value::new(0.0, units::m())),
        Parameter::new(dims::fixed(), format!("C{suffix}"))
            .initial(Value::new(0.0, units::inv_m())),
        Parameter::new(dims::none(), format!("D{suffix}")).initial(Value::none(1.0)),
    ]
}

impl Element {
    /// Create an element of the given kind with its default parameter set,
    /// matrices already calculated.
    pub fn new(kind: ElemKind) -> Element {
        let mut params: Vec<Parameter> = Vec::new();
        let mut options = ElemOptions::default();

        match kind {
            ElemKind::EmptyRange => {
                params.push(length_param());
                params.push(ior_param().hidden());
            }
            ElemKind::MediumRange | ElemKind::Plate | ElemKind::BrewsterCrystal
            | ElemKind::BrewsterPlate => {
                params.push(length_param());
                params.push(ior_param());
            }
            ElemKind::FlatMirror | ElemKind::Point => {}
            ElemKind::CurveMirror => {
                params.push(
                    Parameter::new(dims::linear(), "R")
                        .name("Radius of curvature")
                        .description(
                            "Positive for concave mirror, negative for convex mirror.",
                        )
                        .initial(Value::new(100.0, units::mm()))
                        .check(RADIUS_CHECK),
                );
                params.push(alpha_param());
                options.changes_wavefront = true;
            }
            ElemKind::ThinLens | ElemKind::CylinderLensT | ElemKind::CylinderLensS => {
                params.push(
                    Parameter::new(dims::linear(), "F")
                        .name("Focal length")
                        .description(
                            "Positive for collecting lens, negative for diverging lens.",
                        )
                        .initial(Value::new(100.0, units::mm()))
                        .check(FOCUS_CHECK),
                );
                params.push(alpha_param());
                options.changes_wavefront = true;
            }
            ElemKind::TiltedCrystal | ElemKind::TiltedPlate => {
                params.push(length_param());
                params.push(ior_param());
                params.push(alpha_param());
            }
            ElemKind::Matrix => {
                params.extend(matrix_params("t"));
                params.extend(matrix_params("s"));
            }
            ElemKind::Matrix1 => {
                params.extend(matrix_params(""));
            }
            ElemKind::NormalInterface
            | ElemKind::BrewsterInterface
            | ElemKind::TiltedInterface
            | ElemKind::SphericalInterface => {
                params.push(
                    Parameter::new(dims::none(), "n1")
                        .name("Index of refraction (left medium)")
                        .initial(Value::none(1.0))
                        .hidden(),
                );
                params.push(
                    Parameter::new(dims::none(), "n2")
                        .name("Index of refraction (right medium)")
                        .initial(Value::none(1.0))
                        .hidden(),
                );
                match kind {
                    ElemKind::TiltedInterface => params.push(
                        alpha_param().description(
                            "Zero angle is normal incidence. Negative value sets \
                             the angle from the side of medium n2.",
                        ),
                    ),
                    ElemKind::SphericalInterface => params.push(
                        Parameter::new(dims::linear(), "R")
                            .name("Radius of curvature")
                            .description(
                                "Negative value means right-bulged surface, positive \
                                 value means left-bulged surface. Set to Inf to get \
                                 the flat surface.",
                            )
                            .initial(Value::new(100.0, units::mm()))
                            .check(RADIUS_CHECK),
                    ),
                    _ => {}
                }
                options.asymmetrical = true;
                options.changes_wavefront = true;
            }
            ElemKind::ThickLens => {
                params.push(length_param());
                params.push(ior_param());
                params.push(
                    Parameter::new(dims::linear(), "R1")
                        .name("Left radius of curvature")
                        .initial(Value::new(100.0, units::mm()))
                        .check(RADIUS_CHECK),
                );
                params.push(
                    Parameter::new(dims::linear(), "R2")
                        .name("Right radius of curvature")
                        .initial(Value::new(-100.0, units::mm()))
                        .check(RADIUS_CHECK),
                );
                options.asymmetrical = true;
            }
            ElemKind::GrinLens | ElemKind::GrinMedium => {
                params.push(length_param().description("Thickness of material."));
                params.push(
                    ior_param()
                        .label("n0")
                        .description("Index of refraction at the optical axis.")
                        .initial(Value::none(2.0)),
                );
                params.push(
                    Parameter::new(dims::fixed(), "n2t")
                        .name("IOR gradient (T)")
                        .description(
                            "Radial gradient of index of refraction in tangential plane.",
                        )
                        .initial(Value::new(1.0, units::inv_m2())),
                );
                params.push(
                    Parameter::new(dims::fixed(), "n2s")
                        .name("IOR gradient (S)")
                        .description(
                            "Radial gradient of index of refraction in sagittal plane.",
                        )
                        .initial(Value::new(1.0, units::inv_m2())),
                );
            }
            ElemKind::GaussAperture => {
                params.push(lambda_param());
                params.push(
                    Parameter::new(dims::fixed(), "alpha2t")
                        .label("α2t")
                        .name("Loss factor (T)")
                        .initial(Value::new(1.0, units::inv_m2())),
                );
                params.push(
                    Parameter::new(dims::fixed(), "alpha2s")
                        .label("α2s")
                        .name("Loss factor (S)")
                        .initial(Value::new(1.0, units::inv_m2())),
                );
                options.changes_wavefront = true;
                options.requires_wavelength = true;
                options.complex = true;
            }
            ElemKind::GaussApertureLens => {
                params.push(lambda_param());
                params.push(
                    Parameter::new(dims::linear(), "Ft")
                        .name("Focal length (T)")
                        .initial(Value::new(100.0, units::mm()))
                        .check(FOCUS_CHECK),
                );
                params.push(
                    Parameter::new(dims::linear(), "Fs")
                        .name("Focal length (S)")
                        .initial(Value::new(100.0, units::mm()))
                        .check(FOCUS_CHECK),
                );
                params.push(
                    Parameter::new(dims::fixed(), "alpha2t")
                        .label("α2t")
                        .name("Loss factor (T)")
                        .initial(Value::new(1.0, units::inv_m2())),
                );
                params.push(
                    Parameter::new(dims::fixed(), "alpha2s")
                        .label("α2s")
                        .name("Loss factor (S)")
                        .initial(Value::new(1.0, units::inv_m2())),
                );
                options.changes_wavefront = true;
                options.requires_wavelength = true;
                options.complex = true;
            }
            ElemKind::CustomFormula => {}
        }

        let mut elem = Element {
            id: ElemId::next(),
            kind,
            label: String::new(),
            title: String::new(),
            disabled: false,
            params,
            m: Matrices::default(),
            options,
            sub_range_si: 0.0,
            matrix_locked: false,
            matrix_dirty: false,
            matrix_rev: 0,
            pending: Vec::new(),
            error: None,
            matrix_formula: None,
        };
        elem.calc_matrix();
        elem
    }

    /// Geometric length, SI.
    pub fn length_si(&self) -> f64 {
        self.p("L")
    }

    /// Index of refraction of the element's medium.
    pub fn ior(&self) -> f64 {
        self.p("n")
    }

    /// Refraction index of the medium at the left of an interface.
    pub fn ior1(&self) -> f64 {
        self.p("n1")
    }

    /// Refraction index of the medium at the right of an interface.
    pub fn ior2(&self) -> f64 {
        self.p("n2")
    }

    /// Geometric distance the beam travels along the optical axis inside
    /// the element. Differs from the `L` parameter for tilted and Brewster
    /// plates, where `L` is the plate thickness.
    pub fn axis_length_si(&self) -> f64 {
        match self.kind {
            ElemKind::TiltedPlate => {
                let n = self.ior();
                self.length_si() / f64::cos(f64::asin(f64::sin(self.p("Alpha")) / n))
            }
            ElemKind::BrewsterPlate => {
                // L / cos(asin(sin(atan(n))/n)) = L·√(n²+1)/n
                let n = self.ior();
                self.length_si() * (n * n + 1.0).sqrt() / n
            }
            _ => self.length_si(),
        }
    }

    /// Optical path: axis length times the index of refraction.
    pub fn optical_path_si(&self) -> f64 {
        let n = if self.kind.is_range() { self.ior() } else { 1.0 };
        self.axis_length_si() * n
    }

    /// Interior offset at which the half-matrices were last calculated, SI.
    pub fn sub_range_si(&self) -> f64 {
        self.sub_range_si
    }

    /// Set the interior probe point and recompute the half-matrix pairs.
    /// The offset is taken as-is; use [`Element::set_sub_range`] for the
    /// clamped variant.
    pub fn set_sub_range_si(&mut self, offset_si: f64) {
        self.sub_range_si = offset_si;
        self.calc_submatrices();
    }

    /// Set the interior probe point, clamped into `[0, axis_length]`.
    pub fn set_sub_range(&mut self, offset: Value) {
        let v = offset.to_si().clamp(0.0, self.axis_length_si());
        self.set_sub_range_si(v);
    }

    /// The left piece of the sub-range, in the length parameter's unit.
    pub fn sub_range_lf(&self) -> Value {
        let unit = self
            .param("L")
            .map(|p| p.value().unit())
            .unwrap_or(units::m());
        Value::from_si(self.sub_range_si, unit)
    }

    /// The right piece of the sub-range, in the length parameter's unit.
    pub fn sub_range_rt(&self) -> Value {
        let unit = self
            .param("L")
            .map(|p| p.value().unit())
            .unwrap_or(units::m());
        Value::from_si(self.axis_length_si() - self.sub_range_si, unit)
    }

    pub(crate) fn calc_matrix_internal(&mut self) {
        match self.kind {
            ElemKind::FlatMirror | ElemKind::Point => {
                self.m.set_unity();
            }

            ElemKind::EmptyRange | ElemKind::MediumRange => {
                self.m.t.assign(1.0, self.length_si(), 0.0, 1.0);
                self.m.s = self.m.t;
                self.set_inv_symmetric();
            }

            ElemKind::Plate => {
                self.m.t.assign(1.0, self.length_si() / self.ior(), 0.0, 1.0);
                self.m.s = self.m.t;
                self.set_inv_symmetric();
            }

            ElemKind::CurveMirror => {
                let r = self.p("R");
                let cos_a = self.p("Alpha").cos();
                self.m.t.assign(1.0, 0.0, -2.0 / r / cos_a, 1.0);
                self.m.s.assign(1.0, 0.0, -2.0 / r * cos_a, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::ThinLens => {
                let f = self.p("F");
                let cos_a = self.p("Alpha").cos();
                self.m.t.assign(1.0, 0.0, -1.0 / f / cos_a, 1.0);
                self.m.s.assign(1.0, 0.0, -1.0 / f * cos_a, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::CylinderLensT => {
                let f = self.p("F");
                let cos_a = self.p("Alpha").cos();
                self.m.t.assign(1.0, 0.0, -1.0 / f / cos_a, 1.0);
                self.m.s.set_unity();
                self.set_inv_symmetric();
            }

            ElemKind::CylinderLensS => {
                let f = self.p("F");
                let cos_a = self.p("Alpha").cos();
                self.m.t.set_unity();
                self.m.s.assign(1.0, 0.0, -1.0 / f * cos_a, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::TiltedCrystal => {
                let l = self.length_si();
                let a = self.p("Alpha");
                let n = self.ior();
                let cos2_a = a.cos() * a.cos();
                let sin2_a = a.sin() * a.sin();
                self.m
                    .t
                    .assign(1.0, l * n * cos2_a / (n * n - sin2_a), 0.0, 1.0);
                self.m.s.assign(1.0, l / n, 0.0, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::TiltedPlate => {
                let l = self.length_si();
                let n = self.ior();
                let sin_a = self.p("Alpha").sin();
                let s = n * n - sin_a * sin_a;
                self.m
                    .t
                    .assign(1.0, l * n * n * (1.0 - sin_a * sin_a) / (s * s * s).sqrt(), 0.0, 1.0);
                self.m.s.assign(1.0, l / s.sqrt(), 0.0, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::BrewsterCrystal => {
                let l = self.length_si();
                let n = self.ior();
                self.m.s.assign(1.0, l / n, 0.0, 1.0);
                self.m.t.assign(1.0, l / n / (n * n), 0.0, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::BrewsterPlate => {
                let n = self.ior();
                let axis = self.axis_length_si();
                self.m.s.assign(1.0, axis / n, 0.0, 1.0);
                self.m.t.assign(1.0, axis / n / (n * n), 0.0, 1.0);
                self.set_inv_symmetric();
            }

            ElemKind::Matrix => {
                self.m
                    .t
                    .assign(self.p("At"), self.p("Bt"), self.p("Ct"), self.p("Dt"));
                self.m
                    .s
                    .assign(self.p("As"), self.p("Bs"), self.p("Cs"), self.p("Ds"));
                self.set_inv_symmetric();
            }

            ElemKind::Matrix1 => {
                self.m
                    .t
                    .assign(self.p("A"), self.p("B"), self.p("C"), self.p("D"));
                self.m.s = self.m.t;
                self.set_inv_symmetric();
            }

            ElemKind::NormalInterface => {
                let n1 = self.ior1();
                let n2 = self.ior2();
                self.m.t.assign(1.0, 0.0, 0.0, n1 / n2);
                self.m.s = self.m.t;
                self.m.t_inv.assign(1.0, 0.0, 0.0, n2 / n1);
                self.m.s_inv = self.m.t_inv;
            }

            ElemKind::BrewsterInterface => {
                let n1 = self.ior1();
                let n2 = self.ior2();
                self.m
                    .t
                    .assign(n2 / n1, 0.0, 0.0, (n1 / n2) * (n1 / n2));
                self.m.s.assign(1.0, 0.0, 0.0, n1 / n2);
                self.m
                    .t_inv
                    .assign(n1 / n2, 0.0, 0.0, (n2 / n1) * (n2 / n1));
                self.m.s_inv.assign(1.0, 0.0, 0.0, n2 / n1);
            }

            ElemKind::TiltedInterface => {
                let n1 = self.ior1();
                let n2 = self.ior2();
                let angle = self.p("Alpha");
                //    \ |
                // n1  \| α      a positive angle is measured at the n1 side,
                // ------+-----  a negative one at the n2 side
                //  β   |\  n2
                let cos_a = if angle < 0.0 {
                    f64::cos(f64::asin(angle.sin() * n2 / n1))
                } else {
                    angle.cos()
                };
                let cos_b = if angle < 0.0 {
                    angle.abs().cos()
                } else {
                    f64::cos(f64::asin(angle.sin() * n1 / n2))
                };
                self.m
                    .t
                    .assign(cos_b / cos_a, 0.0, 0.0, (n1 / n2) * (cos_a / cos_b));
                self.m.s.assign(1.0, 0.0, 0.0, n1 / n2);
                self.m
                    .t_inv
                    .assign(cos_a / cos_b, 0.0, 0.0, (n2 / n1) * (cos_b / cos_a));
                self.m.s_inv.assign(1.0, 0.0, 0.0, n2 / n1);
            }

            ElemKind::SphericalInterface => {
                let n1 = self.ior1();
                let n2 = self.ior2();
                let r = self.p("R");
                if r.is_infinite() {
                    self.m.t.assign(1.0, 0.0, 0.0, n1 / n2);
                    self.m.t_inv.assign(1.0, 0.0, 0.0, n2 / n1);
                } else {
                    self.m.t.assign(1.0, 0.0, (n1 - n2) / r / n2, n1 / n2);
                    self.m.t_inv.assign(1.0, 0.0, (n2 - n1) / (-r) / n1, n2 / n1);
                }
                self.m.s = self.m.t;
                self.m.s_inv = self.m.t_inv;
            }

            ElemKind::ThickLens => self.calc_thick_lens(),

            ElemKind::GrinLens => {
                let l = self.length_si().abs();
                let n0 = self.ior().abs();
                let (t, s) = (self.p("n2t"), self.p("n2s"));
                self.m.t = grin_duct_slab(l, n0, t);
                self.m.s = grin_duct_slab(l, n0, s);
                self.set_inv_symmetric();
            }

            ElemKind::GrinMedium => {
                let l = self.length_si().abs();
                let n0 = self.ior().abs();
                let (t, s) = (self.p("n2t"), self.p("n2s"));
                self.m.t = grin_duct_medium(l, n0, t);
                self.m.s = grin_duct_medium(l, n0, s);
                self.set_inv_symmetric();
            }

            ElemKind::GaussAperture => {
                let wl = self.p("Lambda");
                let a2t = self.p("alpha2t");
                let a2s = self.p("alpha2s");
                let two_pi = 2.0 * std::f64::consts::PI;
                self.m.t.assign_complex(
                    Complex64::new(1.0, 0.0),
                    Complex64::new(0.0, 0.0),
                    Complex64::new(0.0, -wl * a2t / two_pi),
                    Complex64::new(1.0, 0.0),
                );
                self.m.s.assign_complex(
                    Complex64::new(1.0, 0.0),
                    Complex64::new(0.0, 0.0),
                    Complex64::new(0.0, -wl * a2s / two_pi),
                    Complex64::new(1.0, 0.0),
                );
                self.set_inv_symmetric();
            }

            ElemKind::GaussApertureLens => {
                let wl = self.p("Lambda");
                let ft = self.p("Ft");
                let fs = self.p("Fs");
                let a2t = self.p("alpha2t");
                let a2s = self.p("alpha2s");
                let two_pi = 2.0 * std::f64::consts::PI;
                self.m.t.assign_complex(
                    Complex64::new(1.0, 0.0),
                    Complex64::new(0.0, 0.0),
                    Complex64::new(-1.0 / ft, -wl * a2t / two_pi),
                    Complex64::new(1.0, 0.0),
                );
                self.m.s.assign_complex(
                    Complex64::new(1.0, 0.0),
                    Complex64::new(0.0, 0.0),
                    Complex64::new(-1.0 / fs, -wl * a2s / two_pi),
                    Complex64::new(1.0, 0.0),
                );
                self.set_inv_symmetric();
            }

            ElemKind::CustomFormula => self.calc_formula_matrix(),
        }
    }

    fn set_inv_symmetric(&mut self) {
        self.m.t_inv = self.m.t;
        self.m.s_inv = self.m.s;
    }

    fn calc_thick_lens(&mut self) {
        let l = self.length_si();
        let n = self.ior();
        let r1 = self.p("R1");
        let r2 = self.p("R2");
        // Flipping the lens swaps and negates the radii.
        let r1_inv = -r2;
        let r2_inv = -r1;

        let b = l / n;
        let (a, c, d);
        let (a_inv, c_inv, d_inv);

        match (r1.is_infinite(), r2.is_infinite()) {
            (true, true) => {
                a = 1.0;
                c = 0.0;
                d = 1.0;
                a_inv = 1.0;
                c_inv = 0.0;
                d_inv = 1.0;
            }
            (true, false) => {
                a = 1.0;
                c = (n - 1.0) / r2;
                d = 1.0 + l / r2 * (n - 1.0) / n;
                a_inv = 1.0 - l / r1_inv * (n - 1.0) / n;
                c_inv = -(n - 1.0) / r1_inv;
                d_inv = 1.0;
            }
            (false, true) => {
                a = 1.0 - l / r1 * (n - 1.0) / n;
                c = -(n - 1.0) / r1;
                d = 1.0;
                a_inv = 1.0;
                c_inv = (n - 1.0) / r2_inv;
                d_inv = 1.0 + l / r2_inv * (n - 1.0) / n;
            }
            (false, false) => {
                a = 1.0 - (l / r1) * (n - 1.0) / n;
                c = (n - 1.0) * (1.0 / r2 - 1.0 / r1)
                    - l / r1 / r2 * (n - 1.0) * (n - 1.0) / n;
                d = 1.0 + (l / r2) * (n - 1.0) / n;
                a_inv = 1.0 - (l / r1_inv) * (n - 1.0) / n;
                c_inv = (n - 1.0) * (1.0 / r2_inv - 1.0 / r1_inv)
                    - l / r1_inv / r2_inv * (n - 1.0) * (n - 1.0) / n;
                d_inv = 1.0 + (l / r2_inv) * (n - 1.0) / n;
            }
        }

        self.m.t.assign(a, b, c, d);
        self.m.t_inv.assign(a_inv, b, c_inv, d_inv);
        self.m.s = self.m.t;
        self.m.s_inv = self.m.t_inv;
    }

    fn calc_formula_matrix(&mut self) {
        let Some(formula) = self.matrix_formula.clone() else {
            self.m.set_unity();
            self.error = Some("no matrix evaluator is installed".into());
            return;
        };
        let bindings: Vec<(&str, f64)> = self
            .params
            .iter()
            .map(|p| (p.alias(), p.value().to_si()))
            .collect();
        match formula.evaluator.calc_matrices(&formula.code, &bindings) {
            Ok((mt, ms)) => {
                self.error = None;
                self.m.t = mt;
                self.m.s = ms;
                self.set_inv_symmetric();
            }
            Err(message) => {
                self.error = Some(message);
                self.m.set_unity();
            }
        }
    }

    pub(crate) fn calc_submatrices(&mut self) {
        match self.kind {
            ElemKind::EmptyRange | ElemKind::MediumRange => {
                self.m.t1.assign(1.0, self.sub_range_si, 0.0, 1.0);
                self.m.s1 = self.m.t1;
                self.m
                    .t2
                    .assign(1.0, self.length_si() - self.sub_range_si, 0.0, 1.0);
                self.m.s2 = self.m.t2;
            }

            ElemKind::Plate => {
                let n = self.ior();
                self.m
                    .t1
                    .assign(1.0, self.sub_range_si / n, 0.0, 1.0 / n);
                self.m.s1 = self.m.t1;
                self.m
                    .t2
                    .assign(1.0, self.length_si() - self.sub_range_si, 0.0, n);
                self.m.s2 = self.m.t2;
            }

            ElemKind::TiltedCrystal | ElemKind::TiltedPlate => {
                let n = self.ior();
                let cos_a = self.p("Alpha").cos();
                // cosine of the refraction angle inside the medium
                let cos_b = f64::cos(f64::asin(self.p("Alpha").sin() / n));
                let cos_ab = cos_a / cos_b;
                let cos_ba = cos_b / cos_a;
                let l1 = self.sub_range_si;
                let l2 = self.axis_length_si() - self.sub_range_si;

                //  --> /:: -->  entry into the medium, then half length
                self.m
                    .t1
                    .assign(cos_ba, l1 / n * cos_ab, 0.0, 1.0 / n * cos_ab);
                self.m.s1.assign(1.0, l1 / n, 0.0, 1.0 / n);

                //  --> ::/ -->  half length, then exit from the medium
                self.m.t2.assign(cos_ab, l2 * cos_ab, 0.0, n * cos_ba);
                self.m.s2.assign(1.0, l2, 0.0, n);
            }

            ElemKind::BrewsterCrystal | ElemKind::BrewsterPlate => {
                let n = self.ior();
                let l1 = self.sub_range_si;
                let l2 = self.axis_length_si() - l1;

                self.m.t1.assign(n, l1 / n / n, 0.0, 1.0 / n / n);
                self.m.s1.assign(1.0, l1 / n, 0.0, 1.0 / n);

                self.m.t2.assign(1.0 / n, l2 / n, 0.0, n * n);
                self.m.s2.assign(1.0, l2, 0.0, n);
            }

            ElemKind::ThickLens => self.calc_thick_lens_submatrices(),

            ElemKind::GrinLens => {
                let l1 = self.sub_range_si;
                let l2 = self.length_si().abs() - l1;
                let n0 = self.ior().abs();
                let (t, s) = (self.p("n2t"), self.p("n2s"));
                let (t1, t2) = grin_slab_halves(l1, l2, n0, t);
                let (s1, s2) = grin_slab_halves(l1, l2, n0, s);
                self.m.t1 = t1;
                self.m.t2 = t2;
                self.m.s1 = s1;
                self.m.s2 = s2;
            }

            ElemKind::GrinMedium => {
                let l1 = self.sub_range_si;
                let l2 = self.length_si().abs() - l1;
                let n0 = self.ior().abs();
                let (t, s) = (self.p("n2t"), self.p("n2s"));
                self.m.t1 = grin_duct_medium(l1, n0, t);
                self.m.t2 = grin_duct_medium(l2, n0, t);
                self.m.s1 = grin_duct_medium(l1, n0, s);
                self.m.s2 = grin_duct_medium(l2, n0, s);
            }

            // Not range-like: the half matrices stay identity.
            _ => {}
        }
    }

    fn calc_thick_lens_submatrices(&mut self) {
        let n = self.ior();
        let l1 = self.sub_range_si;
        let l2 = self.length_si() - l1;
        let r1 = self.p("R1");
        let r2 = self.p("R2");

        //  --> (:: -->  entry surface, then half length
        if r1.is_infinite() {
            self.m.t1.assign(1.0, l1 / n, 0.0, 1.0 / n);
        } else {
            self.m.t1.assign(
                1.0 - l1 * (n - 1.0) / r1 / n,
                l1 / n,
                -(n - 1.0) / r1 / n,
                1.0 / n,
            );
        }

        //  --> ::) -->  half length, then exit surface
        if r2.is_infinite() {
            self.m.t2.assign(1.0, l2, 0.0, n);
        } else {
            self.m.t2.assign(
                1.0,
                l2,
                (n - 1.0) / r2,
                l2 * (n - 1.0) / r2 + n,
            );
        }

        self.m.s1 = self.m.t1;
        self.m.s2 = self.m.t2;
    }
}

/// GRIN duct bounded by external planes: entry and exit refraction included
/// in the matrix (`B` carries a `1/n0` factor).
fn grin_duct_slab(l: f64, n0: f64, n2: f64) -> raytrix_math::Matrix {
    let mut m = raytrix_math::Matrix::unity();
    if n2 > 0.0 {
        let g = (n2 / n0).sqrt();
        m.assign(
            (g * l).cos(),
            (g * l).sin() / n0 / g,
            -n0 * g * (g * l).sin(),
            (g * l).cos(),
        );
    } else if n2 < 0.0 {
        let g = (-n2 / n0).sqrt();
        m.assign(
            (g * l).cosh(),
            (g * l).sinh() / n0 / g,
            n0 * g * (g * l).sinh(),
            (g * l).cosh(),
        );
    } else {
        // n2 = 0: B = 0/0 resolves to L/n0
        m.assign(1.0, l / n0, 0.0, 1.0);
    }
    m
}

/// GRIN duct measured inside the medium: no boundary refraction.
fn grin_duct_medium(l: f64, n0: f64, n2: f64) -> raytrix_math::Matrix {
    let mut m = raytrix_math::Matrix::unity();
    if n2 > 0.0 {
        let g = (n2 / n0).sqrt();
        m.assign(
            (g * l).cos(),
            (g * l).sin() / g,
            -g * (g * l).sin(),
            (g * l).cos(),
        );
    } else if n2 < 0.0 {
        let g = (-n2 / n0).sqrt();
        m.assign(
            (g * l).cosh(),
            (g * l).sinh() / g,
            g * (g * l).sinh(),
            (g * l).cosh(),
        );
    } else {
        m.assign(1.0, l, 0.0, 1.0);
    }
    m
}

/// Half-matrices of a slab-bounded GRIN duct: the left half includes the
/// entry refraction, the right half the exit refraction.
fn grin_slab_halves(
    l1: f64,
    l2: f64,
    n0: f64,
    n2: f64,
) -> (raytrix_math::Matrix, raytrix_math::Matrix) {
    let mut m1 = raytrix_math::Matrix::unity();
    let mut m2 = raytrix_math::Matrix::unity();
    if n2 > 0.0 {
        let g = (n2 / n0).sqrt();
        m1.assign(
            (g * l1).cos(),
            (g * l1).sin() / n0 / g,
            -g * (g * l1).sin(),
            (g * l1).cos() / n0,
        );
        m2.assign(
            (g * l2).cos(),
            (g * l2).sin() / g,
            -n0 * g * (g * l2).sin(),
            n0 * (g * l2).cos(),
        );
    } else if n2 < 0.0 {
        let g = (-n2 / n0).sqrt();
        m1.assign(
            (g * l1).cosh(),
            (g * l1).sinh() / n0 / g,
            g * (g * l1).sinh(),
            (g * l1).cosh() / n0,
        );
        m2.assign(
            (g * l2).cosh(),
            (g * l2).sinh() / g,
            n0 * g * (g * l2).sinh(),
            n0 * (g * l2).cosh(),
        );
    } else {
        m1.assign(1.0, l1 / n0, 0.0, 1.0 / n0);
        m2.assign(1.0, l2, 0.0, n0);
    }
    (m1, m2)
}
