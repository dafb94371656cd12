use grouping::{
    check_assignment, telemetry, validate, Assignment, DispatchSolver, Group, GroupingSpec,
    Instance, PairPolarity, SolveError, SolveParams, SolveStatus, Solver, SolverKind, Strategy,
    Student, StudentPair, ValidationError,
};
use grouping_core::synthetic::{generate, SyntheticParams};
use proptest::prelude::*;
use solver_milp::model::{EngineRun, EngineSettings, EngineStatus, LinearModel, SolveEngine};

fn student(id: &str, gender: &str, prefs: &[&str]) -> Student {
    Student {
        id: id.into(),
        gender: gender.into(),
        grade: 1,
        care: vec![false],
        behavior: None,
        learning: None,
        combination: None,
        preferences: prefs.iter().map(|&p| p.into()).collect(),
    }
}

fn pair(a: &str, b: &str, polarity: PairPolarity) -> StudentPair {
    StudentPair {
        first: a.into(),
        second: b.into(),
        polarity,
    }
}

/// Six students, two groups of 2..=4; A+B together, C/D apart, A wants C, E wants F.
fn example() -> Instance {
    Instance {
        students: vec![
            student("A", "girl", &["C"]),
            student("B", "boy", &[]),
            student("C", "girl", &[]),
            student("D", "boy", &[]),
            student("E", "girl", &["F"]),
            student("F", "boy", &[]),
        ],
        groups: vec![Group { id: "G1".into() }, Group { id: "G2".into() }],
        student_pairs: vec![
            pair("A", "B", PairPolarity::Together),
            pair("C", "D", PairPolarity::Apart),
        ],
        group_bindings: vec![],
        spec: GroupingSpec {
            n_students: 6,
            n_groups: 2,
            min_group_size: 2,
            max_care: vec![1],
            max_group_size: Some(4),
        },
    }
}

fn heuristic_params() -> SolveParams {
    SolveParams {
        solver: SolverKind::Heuristic,
        ..SolveParams::default()
    }
}

struct NeverSolves;

impl SolveEngine for NeverSolves {
    fn name(&self) -> &'static str {
        "never"
    }

    fn solve(
        &self,
        _: &LinearModel,
        _: &EngineSettings,
        _: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun> {
        Ok(EngineRun {
            status: EngineStatus::Infeasible,
            values: Vec::new(),
        })
    }
}

struct Broken;

impl SolveEngine for Broken {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn solve(
        &self,
        _: &LinearModel,
        _: &EngineSettings,
        _: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun> {
        anyhow::bail!("solver binary missing")
    }
}

#[test]
fn heuristic_solves_example() {
    telemetry::init_for_tests();
    let inst = example();
    let r = DispatchSolver::heuristic_only()
        .solve_instance(&inst, &heuristic_params())
        .unwrap();
    assert_eq!(r.strategy, Strategy::Heuristic);
    assert_eq!(r.status, SolveStatus::Feasible);
    let p = validate(&inst).unwrap();
    let a = Assignment::from_placements(&p, &r.placements).unwrap();
    assert!(check_assignment(&p, &a).is_empty());
    let sizes = a.sizes(p.n_groups());
    assert!(sizes.iter().all(|&s| (2..=4).contains(&s)));
}

#[test]
fn milp_request_without_backend_uses_heuristic() {
    telemetry::init_for_tests();
    let solver = DispatchSolver::heuristic_only();
    let params = SolveParams::default();
    assert_eq!(solver.strategy(&params), Strategy::Heuristic);
    let r = solver.solve_instance(&example(), &params).unwrap();
    assert_eq!(r.strategy, Strategy::Heuristic);
}

#[test]
fn inseparable_apart_set_is_rejected_before_solving() {
    telemetry::init_for_tests();
    let mut inst = example();
    inst.student_pairs.push(pair("C", "E", PairPolarity::Apart));
    inst.student_pairs.push(pair("D", "E", PairPolarity::Apart));
    // a broken engine proves no solve was attempted
    let err = DispatchSolver::with_engine(Box::new(Broken))
        .solve_instance(&inst, &SolveParams::default())
        .unwrap_err();
    match &err {
        SolveError::Validation(ValidationError::NotSeparable { n_groups, .. }) => {
            assert_eq!(*n_groups, 2)
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().starts_with("invalid instance: must-apart students"));
}

#[test]
fn exhausted_phases_are_reported() {
    telemetry::init_for_tests();
    let err = DispatchSolver::with_engine(Box::new(NeverSolves))
        .solve_instance(&example(), &SolveParams::default())
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"ILP-style: no solution found, last attempt was min_prefs=0, deviation=unconstrained"
    );
    match err {
        // five threshold steps plus zero, once with and once without balance bounds
        SolveError::ExhaustedAllPhases { phases, .. } => assert_eq!(phases.len(), 12),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn exhausted_phases_fall_back_when_asked() {
    telemetry::init_for_tests();
    let params = SolveParams {
        heuristic_fallback: true,
        ..SolveParams::default()
    };
    let r = DispatchSolver::with_engine(Box::new(NeverSolves))
        .solve_instance(&example(), &params)
        .unwrap();
    assert_eq!(r.strategy, Strategy::Heuristic);
    assert_eq!(r.stats["fallbackFrom"], "ILP-style");
}

#[test]
fn engine_failure_is_never_masked_by_fallback() {
    telemetry::init_for_tests();
    let params = SolveParams {
        heuristic_fallback: true,
        ..SolveParams::default()
    };
    let err = DispatchSolver::with_engine(Box::new(Broken))
        .solve_instance(&example(), &params)
        .unwrap_err();
    assert!(matches!(err, SolveError::Engine { .. }));
    assert!(err.to_string().contains("solver binary missing"));
}

#[cfg(feature = "with-milp")]
mod with_backend {
    use super::*;
    use grouping::TogetherEncoding;

    #[test]
    fn example_scenario_solves_in_first_phase_that_fits() {
        telemetry::init_for_tests();
        for encoding in [TogetherEncoding::Aggregated, TogetherEncoding::PerGroup] {
            let params = SolveParams {
                encoding,
                time_limit_sec: 60,
                ..SolveParams::default()
            };
            let inst = example();
            let r = DispatchSolver::new().solve_instance(&inst, &params).unwrap();
            assert_ne!(r.strategy, Strategy::Heuristic);
            let p = validate(&inst).unwrap();
            let a = Assignment::from_placements(&p, &r.placements).unwrap();
            assert!(check_assignment(&p, &a).is_empty());
            // both preferences can be met together with the pair rules
            assert_eq!(r.scores.unwrap().satisfied_preferences, 2);
        }
    }

    #[test]
    fn same_seed_same_grouping() {
        telemetry::init_for_tests();
        let inst = generate(&SyntheticParams::default(), 11);
        let params = SolveParams {
            time_limit_sec: 60,
            relaxation: grouping::RelaxationConfig {
                mode: grouping::ConstraintMode::Soft,
                ..Default::default()
            },
            ..SolveParams::default()
        };
        let a = DispatchSolver::new().solve_instance(&inst, &params).unwrap();
        let b = DispatchSolver::new().solve_instance(&inst, &params).unwrap();
        assert_eq!(a.placements, b.placements);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn synthetic_instances_validate_and_heuristic_output_holds(seed in 0u64..5_000) {
        let synth = SyntheticParams { n_students: 22, ..SyntheticParams::default() };
        let inst = generate(&synth, seed);
        let p = validate(&inst).unwrap();
        match DispatchSolver::heuristic_only().solve(&p, &heuristic_params()) {
            Ok(r) => {
                let a = Assignment::from_placements(&p, &r.placements).unwrap();
                prop_assert!(check_assignment(&p, &a).is_empty());
                prop_assert_eq!(r.placements.len(), p.n_students());
            }
            Err(SolveError::HeuristicPlacement { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected {}", other),
        }
    }
}
