use std::f64::consts::PI;

use aem_transient::inversion::LaplaceInverter;
use aem_transient::prelude::*;
use aem_transient::special::{exp_integral_e1, k0};
use approx::assert_relative_eq;

const T: Scalar = 100.0;
const S: Scalar = 1.0e-3;

fn confined() -> AquiferSystem {
    AquiferSystem::build(vec![Layer::aquifer(0.0, -10.0, 10.0, 1.0e-4)], TopBoundary::Confined)
        .unwrap()
}

fn two_aquifers() -> AquiferSystem {
    AquiferSystem::maq(MaqParameters::new(
        vec![10.0, 20.0],
        vec![0.0, -10.0, -12.0, -22.0],
        vec![200.0],
        vec![1.0e-4, 1.0e-4],
    ))
    .unwrap()
}

fn theis(q: Scalar, r: Scalar, t: Scalar) -> Scalar {
    -q / (4.0 * PI * T) * exp_integral_e1(r * r * S / (4.0 * T * t))
}

fn pumping(q: Scalar) -> Model {
    let mut model = Model::new(confined());
    let well = Well::new("well", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(q)).unwrap();
    model.add_element(well).unwrap();
    model
}

#[test]
fn single_well_matches_theis() {
    let mut model = pumping(100.0);
    model.solve(&SolveConfig::new(0.1, 100.0).silent()).unwrap();
    for &t in &[0.1, 1.0, 7.5, 100.0] {
        let h = model.head_in_layer(10.0, 0.0, t, 0).unwrap();
        assert_relative_eq!(h, theis(100.0, 10.0, t), max_relative = 1.0e-3);
    }
}

#[test]
fn semi_confined_well_reaches_de_glee() {
    let system = AquiferSystem::maq(
        MaqParameters::new(vec![10.0], vec![2.0, 0.0, -10.0], vec![100.0], vec![1.0e-4])
            .with_top(TopBoundary::SemiConfined),
    )
    .unwrap();
    let mut model = Model::new(system);
    let well = Well::new("well", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(100.0));
    model.add_element(well.unwrap()).unwrap();
    model.solve(&SolveConfig::new(1.0, 1000.0).silent()).unwrap();
    let lambda = (T * 100.0).sqrt();
    let steady = -100.0 / (2.0 * PI * T) * k0(CScalar::new(50.0 / lambda, 0.0)).re;
    let h = model.head_in_layer(50.0, 0.0, 1000.0, 0).unwrap();
    assert_relative_eq!(h, steady, max_relative = 1.0e-3);
}

#[test]
fn queries_honour_the_solved_time_range() {
    let mut model = pumping(100.0);
    model.solve(&SolveConfig::new(1.0, 10.0).silent()).unwrap();
    assert!(model.head(10.0, 0.0, 1.0).is_ok());
    assert!(model.head(10.0, 0.0, 10.0).is_ok());
    assert!(matches!(model.head(10.0, 0.0, 0.999), Err(AemError::OutOfRange { .. })));
    assert!(matches!(model.head(10.0, 0.0, 10.01), Err(AemError::OutOfRange { .. })));
}

#[test]
fn queries_before_solving_fail() {
    let model = pumping(100.0);
    assert!(matches!(model.head(10.0, 0.0, 1.0), Err(AemError::NotSolved)));
}

#[test]
fn repeated_solves_give_identical_heads() {
    let mut model = pumping(100.0);
    let config = SolveConfig::new(1.0, 10.0).silent();
    model.solve(&config).unwrap();
    let first = model.head(25.0, 5.0, 3.0).unwrap();
    model.solve(&config).unwrap();
    assert_eq!(first, model.head(25.0, 5.0, 3.0).unwrap());
}

fn river_model(well_discharge: Option<Scalar>) -> Model {
    let mut model = Model::new(confined());
    let river = HeadLineSink::segment(
        "river",
        R2::new(-50.0, -100.0),
        R2::new(-50.0, 100.0),
        vec![0],
        StressSchedule::constant(1.0),
    )
    .unwrap();
    model.add_element(river).unwrap();
    if let Some(q) = well_discharge {
        let well = Well::new("well", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(q));
        model.add_element(well.unwrap()).unwrap();
    }
    model
}

#[test]
fn drawdown_scales_with_discharge() {
    let config = SolveConfig::new(1.0, 10.0).silent();
    let mut baseline = river_model(None);
    let mut single = river_model(Some(50.0));
    let mut double = river_model(Some(100.0));
    for model in [&mut baseline, &mut single, &mut double] {
        model.solve(&config).unwrap();
    }
    for &(x, y) in &[(20.0, 0.0), (-30.0, 15.0)] {
        let hb = baseline.head_in_layer(x, y, 5.0, 0).unwrap();
        let h1 = single.head_in_layer(x, y, 5.0, 0).unwrap();
        let h2 = double.head_in_layer(x, y, 5.0, 0).unwrap();
        assert!(hb > 0.0);
        assert!(h1 < hb);
        assert_relative_eq!(h2 - hb, 2.0 * (h1 - hb), max_relative = 1.0e-8);
    }
}

#[test]
fn earliest_time_inverts_the_first_decade() {
    let mut model = Model::new(confined());
    let id = model
        .add_element(
            HeadWell::new("fixed", 0.0, 0.0, 0.2, vec![0], StressSchedule::constant(-2.0)).unwrap(),
        )
        .unwrap();
    let min_time = 1.0;
    let solution = model.solve(&SolveConfig::new(min_time, 100.0).silent()).unwrap();
    let coefficients = solution.coefficients();
    let grid = coefficients.grid();
    let decade = &grid.decades()[0];
    assert_relative_eq!(decade.lower, min_time);

    let forcing = &coefficients.columns()[0];
    let (start, change) = forcing.increments[0];
    assert_relative_eq!(start, 0.0);
    let parameter = coefficients.layout().offsets[id.0];
    let samples: Vec<CScalar> = grid
        .decade_samples(decade)
        .iter()
        .map(|sample| coefficients.parameter(sample.index, parameter, forcing.column))
        .collect();
    let direct = change * LaplaceInverter::invert(decade, decade.lower, &samples);
    let queried = model.strength(id, min_time).unwrap()[0];
    assert!(direct > 0.0);
    assert_relative_eq!(queried, direct, max_relative = 1.0e-12);
    assert_relative_eq!(model.head_inside(id, min_time).unwrap()[0], -2.0, max_relative = 1.0e-3);
}

#[test]
fn schedule_steps_superpose_in_time() {
    let mut model = Model::new(confined());
    let schedule = StressSchedule::new(vec![(0.0, 100.0), (5.0, 0.0)]).unwrap();
    model.add_element(Well::new("well", 0.0, 0.0, 0.1, vec![0], schedule).unwrap()).unwrap();
    model.solve(&SolveConfig::new(0.1, 100.0).silent()).unwrap();
    let h = model.head_in_layer(10.0, 0.0, 50.0, 0).unwrap();
    let expected = theis(100.0, 10.0, 50.0) - theis(100.0, 10.0, 45.0);
    assert_relative_eq!(h, expected, max_relative = 1.0e-2);
}

#[test]
fn coincident_head_wells_are_singular() {
    let mut model = Model::new(confined());
    for label in ["a", "b"] {
        let well = HeadWell::new(label, 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(-1.0));
        model.add_element(well.unwrap()).unwrap();
    }
    match model.solve(&SolveConfig::new(1.0, 10.0).silent()) {
        Err(AemError::SingularSystem { element, .. }) => assert!(element.is_some()),
        other => panic!("expected a singular system, got {other:?}"),
    }
    assert!(!model.is_solved());
}

#[test]
fn head_well_holds_its_head() {
    let mut model = Model::new(confined());
    let id = model
        .add_element(
            HeadWell::new("fixed", 0.0, 0.0, 0.2, vec![0], StressSchedule::constant(-2.0)).unwrap(),
        )
        .unwrap();
    model.solve(&SolveConfig::new(1.0, 100.0).silent()).unwrap();
    for &t in &[1.0, 30.0, 100.0] {
        assert_relative_eq!(model.head_inside(id, t).unwrap()[0], -2.0, max_relative = 1.0e-3);
        let q = model.element_discharge(id, t).unwrap()[0];
        assert!(q > 0.0, "lowering the head extracts water, got {q}");
    }
}

#[test]
fn multi_screen_well_splits_its_discharge() {
    let mut model = Model::new(two_aquifers());
    let id = model
        .add_element(
            Well::new("well", 0.0, 0.0, 0.1, vec![0, 1], StressSchedule::constant(300.0)).unwrap(),
        )
        .unwrap();
    model.solve(&SolveConfig::new(1.0, 100.0).silent()).unwrap();
    let t = 10.0;
    let q = model.element_discharge(id, t).unwrap();
    assert_relative_eq!(q[0] + q[1], 300.0, max_relative = 1.0e-3);
    // the more transmissive aquifer carries more of the discharge
    assert!(q[1] > q[0]);
    let inside = model.head_inside(id, t).unwrap();
    assert_relative_eq!(inside[0], inside[1], max_relative = 1.0e-3);
}

#[test]
fn impermeable_wall_blocks_normal_flow() {
    let config = SolveConfig::new(1.0, 10.0).silent();
    let well = || {
        Well::new("well", 20.0, 0.0, 0.1, vec![0], StressSchedule::constant(100.0)).unwrap()
    };
    let mut free = Model::new(confined());
    free.add_element(well()).unwrap();
    free.solve(&config).unwrap();
    let (qx_free, _) = free.discharge(0.0, 0.0, 5.0).unwrap();

    let mut walled = Model::new(confined());
    walled.add_element(well()).unwrap();
    let wall =
        LeakyLineDoublet::segment("wall", R2::new(0.0, -50.0), R2::new(0.0, 50.0), vec![0], None)
            .unwrap();
    walled.add_element(wall).unwrap();
    walled.solve(&config).unwrap();
    let (qx, _) = walled.discharge(0.0, 0.0, 5.0).unwrap();
    assert!(qx_free[0].abs() > 0.0);
    assert!(qx[0].abs() < 1.0e-6 * qx_free[0].abs());
}

#[test]
fn casing_storage_delays_the_aquifer_response() {
    let config = SolveConfig::new(1.0e-3, 10.0).silent();
    let mut plain = pumping(100.0);
    plain.solve(&config).unwrap();
    let mut cased = Model::new(confined());
    let id = cased
        .add_element(
            Well::new("well", 0.0, 0.0, 0.1, vec![0], StressSchedule::constant(100.0))
                .unwrap()
                .with_casing_radius(0.5),
        )
        .unwrap();
    cased.solve(&config).unwrap();

    let early_plain = plain.head_in_layer(10.0, 0.0, 1.0e-3, 0).unwrap();
    let early_cased = cased.head_in_layer(10.0, 0.0, 1.0e-3, 0).unwrap();
    assert!(early_cased < 0.0);
    assert!(early_cased > early_plain);
    assert!(cased.element_discharge(id, 1.0e-3).unwrap()[0] < 100.0);

    let late_plain = plain.head_in_layer(10.0, 0.0, 10.0, 0).unwrap();
    let late_cased = cased.head_in_layer(10.0, 0.0, 10.0, 0).unwrap();
    assert_relative_eq!(late_cased, late_plain, max_relative = 1.0e-2);
}

#[test]
fn particles_move_towards_a_pumping_well() {
    let mut model = pumping(100.0);
    let solution = model.solve(&SolveConfig::new(0.1, 100.0).silent()).unwrap();
    let start = R3::new(30.0, 0.0, -5.0);
    let velocity = solution.velocity(&start, 1.0).unwrap();
    assert!(velocity.x < 0.0);
    assert_relative_eq!(velocity.z, 0.0, epsilon = 1.0e-12);

    let tracer = PathlineTracer::new(solution.as_ref(), TraceConfig::new(0.1, 0.5)).unwrap();
    let trajectory = tracer.trace(start, 1.0, 2.0).unwrap();
    assert_eq!(trajectory.stop, StopReason::EndTime);
    let first = &trajectory.points[0];
    assert_relative_eq!(first.velocity.x, velocity.x, max_relative = 1.0e-12);
    let last = trajectory.last().unwrap();
    assert_relative_eq!(last.time, 2.0, max_relative = 1.0e-9);
    assert!(last.position.x < 30.0 && last.position.x > 29.0);
    assert!(last.position.y.abs() < 1.0e-6);
    assert_relative_eq!(last.position.z, -5.0, epsilon = 1.0e-9);
}
