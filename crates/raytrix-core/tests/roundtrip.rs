//! Round-trip assembly, stability analysis and whole-system info functions.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use raytrix_core::{
    repetition_rate, total_optical_path_si, ElemKind, Element, InfoError, MatrixRole,
    OpticalSystem, RoundTripCalculator, RoundTripError, StabilityMode, TripType,
};
use raytrix_math::consts::LIGHT_SPEED;
use raytrix_units::{units, Value};

fn curve_mirror(r_si: f64) -> Element {
    let mut e = Element::new(ElemKind::CurveMirror);
    e.set_param("R", Value::new(r_si, units::m())).unwrap();
    e
}

fn empty_range(l_si: f64) -> Element {
    let mut e = Element::new(ElemKind::EmptyRange);
    e.set_param("L", Value::new(l_si, units::m())).unwrap();
    e
}

fn medium_range(l_si: f64, n: f64) -> Element {
    let mut e = Element::new(ElemKind::MediumRange);
    e.set_param("L", Value::new(l_si, units::m())).unwrap();
    e.set_param("n", Value::none(n)).unwrap();
    e
}

/// A two-mirror standing-wave cavity: M1, space L, M2.
fn two_mirror_cavity(r1: f64, r2: f64, l: f64) -> (OpticalSystem, raytrix_core::ElemId) {
    let mut system = OpticalSystem::new();
    system.add_element(curve_mirror(r1));
    system.add_element(empty_range(l));
    let m2 = system.add_element(curve_mirror(r2));
    (system, m2)
}

#[test]
fn errors_on_unknown_reference() {
    let system = OpticalSystem::new();
    let stray = Element::new(ElemKind::FlatMirror);
    let mut calc = RoundTripCalculator::new(&system, stray.id());
    assert_eq!(calc.calc_round_trip(false), Err(RoundTripError::NoReference));
    assert!(calc.is_empty());
}

#[test]
fn errors_on_disabled_reference() {
    let mut system = OpticalSystem::new();
    let m = system.add_new(ElemKind::FlatMirror);
    system.set_elem_disabled(m, true).unwrap();

    let mut calc = RoundTripCalculator::new(&system, m);
    assert!(matches!(
        calc.calc_round_trip(false),
        Err(RoundTripError::DisabledReference(_))
    ));
}

#[test]
fn empty_round_trip_folds_to_unity() {
    let mut system = OpticalSystem::new();
    let m = system.add_new(ElemKind::FlatMirror);

    let mut calc = RoundTripCalculator::new(&system, m);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    assert_eq!(*calc.mt(), raytrix_math::Matrix::unity());
    assert_eq!(*calc.ms(), raytrix_math::Matrix::unity());
    // a unity round trip is marginal: P == 1 exactly, reported, not rounded
    assert_eq!(calc.stability().t, 1.0);
    assert!(!calc.is_stable().t);
}

#[test]
fn disabled_elements_are_skipped() {
    let mut system = OpticalSystem::new();
    system.add_element(curve_mirror(0.5));
    let d1 = system.add_element(empty_range(0.1));
    let d2 = system.add_element(empty_range(0.25));
    let m2 = system.add_element(curve_mirror(0.5));
    system.set_elem_disabled(d1, true).unwrap();

    let mut calc = RoundTripCalculator::new(&system, m2);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();
    let with_disabled = calc.stability().t;
    assert!(!calc.round_trip().contains(&d1));
    assert!(calc.round_trip().contains(&d2));

    // the disabled range contributes nothing: same as a cavity without it
    let (reduced, m2r) = two_mirror_cavity(0.5, 0.5, 0.25);
    let mut rcalc = RoundTripCalculator::new(&reduced, m2r);
    rcalc.calc_round_trip(false).unwrap();
    rcalc.mult_matrix();
    assert_abs_diff_eq!(with_disabled, rcalc.stability().t, epsilon = 1e-12);
}

#[test]
fn sw_round_trip_of_two_mirror_cavity() {
    let (system, m2) = two_mirror_cavity(0.5, 0.5, 0.1);
    let mut calc = RoundTripCalculator::new(&system, m2);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    // M2, d, M1, d — four matrices, all passed as wholes
    assert_eq!(calc.matrs_t().len(), 4);
    assert!(calc
        .matrix_info()
        .iter()
        .all(|i| i.role == MatrixRole::Whole));

    // round trip of a closed SW cavity preserves the determinant
    assert_relative_eq!(calc.mt().det().re, 1.0, max_relative = 1e-12);
}

#[test]
fn stability_matches_g1g2_criterion() {
    // P = (A+D)/2 of the SW round trip equals 2·g1·g2 − 1 with g = 1 − L/R.
    let radii = [0.2, 0.5, -0.3, 1.0];
    let lengths = [0.05, 0.1, 0.45, 0.9];
    for r1 in radii {
        for r2 in radii {
            for l in lengths {
                let (system, m2) = two_mirror_cavity(r1, r2, l);
                let mut calc = RoundTripCalculator::new(&system, m2);
                calc.calc_round_trip(false).unwrap();
                calc.mult_matrix();

                let g1 = 1.0 - l / r1;
                let g2 = 1.0 - l / r2;
                let expected = 2.0 * g1 * g2 - 1.0;

                let p = calc.stability();
                assert_abs_diff_eq!(p.t, expected, epsilon = 1e-9);
                assert_abs_diff_eq!(p.s, expected, epsilon = 1e-9);

                let stable = calc.is_stable();
                let geometric = g1 * g2 > 0.0 && g1 * g2 < 1.0;
                assert_eq!(
                    stable.t, geometric,
                    "R1={r1} R2={r2} L={l}: P={p:?} g1g2={}",
                    g1 * g2
                );
            }
        }
    }
}

#[test]
fn stability_is_independent_of_the_reference() {
    // (A+D)/2 is invariant under cyclic permutation of the round trip
    let (system, _) = two_mirror_cavity(0.5, 0.8, 0.3);
    let ids: Vec<_> = system.elements().iter().map(|e| e.id()).collect();

    let mut values = Vec::new();
    for id in ids {
        let mut calc = RoundTripCalculator::new(&system, id);
        calc.calc_round_trip(false).unwrap();
        calc.mult_matrix();
        values.push(calc.stability().t);
    }
    for v in &values[1..] {
        assert_abs_diff_eq!(*v, values[0], epsilon = 1e-12);
    }
}

#[test]
fn squared_stability_mode() {
    let (system, m2) = two_mirror_cavity(0.5, 0.5, 0.1);
    let mut calc = RoundTripCalculator::new(&system, m2);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    let p = calc.stability().t;
    calc.set_stability_mode(StabilityMode::Squared);
    assert_eq!(calc.stability_mode(), StabilityMode::Squared);
    assert_abs_diff_eq!(calc.stability().t, 1.0 - p * p, epsilon = 1e-12);
}

#[test]
fn split_range_reports_interior_point() {
    // single-pass: the fold up to the interior point of the only element
    let mut system = OpticalSystem::new();
    system.set_trip_type(TripType::SP);
    let d = system.add_element(empty_range(0.088));
    system
        .update_element(d, |elem| elem.set_sub_range_si(0.0176))
        .unwrap();

    let mut calc = RoundTripCalculator::new(&system, d);
    calc.calc_round_trip(true).unwrap();
    calc.mult_matrix();

    assert!(calc.split_range());
    assert_eq!(calc.matrs_t().len(), 1);
    assert_eq!(calc.matrix_info()[0].role, MatrixRole::LeftHalf);
    assert_abs_diff_eq!(calc.mt().b.re, 0.0176, epsilon = 1e-12);
}

#[test]
fn split_range_keeps_cavity_stability() {
    // splitting the reference range shifts the round-trip start inside the
    // element; the trace, and so the stability, must not move
    let mut system = OpticalSystem::new();
    system.add_element(curve_mirror(0.5));
    let d = system.add_element(medium_range(0.2, 1.5));
    system.add_element(curve_mirror(0.8));
    system
        .update_element(d, |elem| elem.set_sub_range_si(0.07))
        .unwrap();

    let mut whole = RoundTripCalculator::new(&system, d);
    whole.calc_round_trip(false).unwrap();
    whole.mult_matrix();

    let mut split = RoundTripCalculator::new(&system, d);
    split.calc_round_trip(true).unwrap();
    split.mult_matrix();

    let roles: Vec<_> = split.matrix_info().iter().map(|i| i.role).collect();
    assert_eq!(roles.first(), Some(&MatrixRole::LeftHalf));
    assert_eq!(roles.last(), Some(&MatrixRole::RightHalf));

    assert_abs_diff_eq!(split.stability().t, whole.stability().t, epsilon = 1e-9);
    assert_abs_diff_eq!(split.stability().s, whole.stability().s, epsilon = 1e-9);
}

#[test]
fn sw_uses_backward_matrices_on_the_second_pass() {
    // a cavity with an internal interface: the beam crosses it forward and
    // backward; the backward pass must use the inverse matrix so the
    // round-trip determinant returns to 1
    let mut system = OpticalSystem::new();
    system.add_element(curve_mirror(0.5));
    system.add_element(medium_range(0.05, 1.5));
    let iface = system.add_new(ElemKind::NormalInterface);
    system.add_element(empty_range(0.1));
    let m2 = system.add_element(curve_mirror(0.5));

    let mut calc = RoundTripCalculator::new(&system, m2);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    assert!(calc
        .matrix_info()
        .iter()
        .any(|i| i.owner == iface && i.role == MatrixRole::BackPass));
    assert_relative_eq!(calc.mt().det().re, 1.0, max_relative = 1e-9);
    assert_relative_eq!(calc.ms().det().re, 1.0, max_relative = 1e-9);
}

#[test]
fn ring_traverses_the_loop_once() {
    let mut system = OpticalSystem::new();
    system.set_trip_type(TripType::RR);
    system.add_element(curve_mirror(0.5));
    let d1 = system.add_element(empty_range(0.1));
    system.add_element(curve_mirror(0.5));
    let d2 = system.add_element(empty_range(0.1));

    let mut calc = RoundTripCalculator::new(&system, d1);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    // every element exactly once
    assert_eq!(calc.matrs_t().len(), 4);
    let trip = calc.round_trip();
    assert_eq!(trip.len(), 4);
    assert!(trip.contains(&d2));
}

#[test]
fn single_pass_folds_entry_to_reference() {
    let mut system = OpticalSystem::new();
    system.set_trip_type(TripType::SP);
    system.add_element(empty_range(0.1));
    let lens = {
        let mut e = Element::new(ElemKind::ThinLens);
        e.set_param("F", Value::new(0.05, units::m())).unwrap();
        e
    };
    let f = system.add_element(lens);
    system.add_element(empty_range(0.2));

    // reference in the middle: only the first range and the lens are folded
    let mut calc = RoundTripCalculator::new(&system, f);
    calc.calc_round_trip(false).unwrap();
    calc.mult_matrix();

    assert_eq!(calc.matrs_t().len(), 2);
    // M = M_lens · M_space
    assert_abs_diff_eq!(calc.mt().b.re, 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(calc.mt().c.re, -20.0, epsilon = 1e-9);
    assert_abs_diff_eq!(calc.mt().d.re, -1.0, epsilon = 1e-9);
}

#[test]
fn round_trip_listing_for_display() {
    let (system, m2) = two_mirror_cavity(0.5, 0.5, 0.1);
    let mut calc = RoundTripCalculator::new(&system, m2);
    calc.calc_round_trip(false).unwrap();

    // unlabeled elements are listed by position
    assert_eq!(calc.round_trip_str(), "#3 #2 #1 #2");
}

#[test]
fn optical_path_and_repetition_rate() {
    let mut system = OpticalSystem::new();
    let d = system.add_element(medium_range(0.1, 2.0));

    assert_abs_diff_eq!(total_optical_path_si(&system), 0.2, epsilon = 1e-12);

    // standing wave: the trip is there and back
    let sw = repetition_rate(&system).unwrap();
    assert_relative_eq!(sw, LIGHT_SPEED / 0.2 / 2.0, max_relative = 1e-12);

    // the same length of vacuum doubles the rate
    system.set_param(d, "n", Value::none(1.0)).unwrap();
    let sw_vacuum = repetition_rate(&system).unwrap();
    assert_relative_eq!(sw_vacuum, sw * 2.0, max_relative = 1e-12);

    // a ring traverses the loop only once
    system.set_param(d, "n", Value::none(2.0)).unwrap();
    system.set_trip_type(TripType::RR);
    let rr = repetition_rate(&system).unwrap();
    assert_relative_eq!(rr, sw * 2.0, max_relative = 1e-12);
}

#[test]
fn repetition_rate_needs_nonzero_length() {
    let mut system = OpticalSystem::new();
    system.add_new(ElemKind::FlatMirror);
    system.add_new(ElemKind::ThinLens);
    assert_eq!(repetition_rate(&system), Err(InfoError::ZeroOpticalPath));

    let d = system.add_new(ElemKind::EmptyRange);
    system.set_param(d, "L", Value::new(0.0, units::mm())).unwrap();
    assert_eq!(repetition_rate(&system), Err(InfoError::ZeroOpticalPath));
}

#[test]
fn whole_system_stability_helper() {
    let (system, _) = two_mirror_cavity(0.5, 0.5, 0.1);
    let stable = raytrix_core::is_system_stable(&system).unwrap();
    assert!(stable.t);
    assert!(stable.s);

    let empty = OpticalSystem::new();
    assert!(raytrix_core::is_system_stable(&empty).is_none());
}
