use crate::builder::BuiltModel;
use crate::model::{EngineSettings, EngineStatus, SolveEngine};
use anyhow::bail;
use grouping_core::problem::{Assignment, Problem};
use grouping_core::scoring::check_phase;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use types::{IncumbentSample, PhaseOutcome};

const FEASIBILITY_TOL: f64 = 1e-6;

/// Result of one engine invocation on one phase model.
#[derive(Clone, Debug)]
pub struct PhaseRun {
    pub outcome: PhaseOutcome,
    pub assignment: Option<Assignment>,
    pub objective: Option<f64>,
    /// Improving incumbents in wall-clock order.
    pub trajectory: Vec<IncumbentSample>,
    pub elapsed: Duration,
}

impl PhaseRun {
    pub fn has_solution(&self) -> bool {
        self.assignment.is_some()
    }
}

/// Wraps a single engine invocation: limit, seeding, incumbent log, status and extraction.
pub struct SolveDriver<'e, E: SolveEngine + ?Sized> {
    engine: &'e E,
    settings: EngineSettings,
}

impl<'e, E: SolveEngine + ?Sized> SolveDriver<'e, E> {
    pub fn new(engine: &'e E, settings: EngineSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// An `Err` is an engine failure and is fatal for the whole run.
    pub fn run(&self, problem: &Problem, built: &BuiltModel) -> anyhow::Result<PhaseRun> {
        let started = Instant::now();
        let mut trajectory: Vec<IncumbentSample> = Vec::new();
        let mut best: Option<f64> = None;
        let mut seen = 0u32;
        let model = &built.model;

        let run = {
            let mut on_improved = |objective: f64| {
                seen += 1;
                if best.map_or(true, |b| model.improves(objective, b)) {
                    best = Some(objective);
                    let elapsed_sec = started.elapsed().as_secs_f64();
                    debug!(solution = seen, objective, elapsed_sec, "improved incumbent");
                    trajectory.push(IncumbentSample {
                        elapsed_sec,
                        solution_index: seen,
                        objective,
                    });
                }
            };
            self.engine.solve(model, &self.settings, &mut on_improved)?
        };
        let elapsed = started.elapsed();

        let outcome = match run.status {
            EngineStatus::Optimal => PhaseOutcome::Optimal,
            EngineStatus::Feasible => PhaseOutcome::Feasible,
            EngineStatus::Infeasible => PhaseOutcome::Infeasible,
            EngineStatus::Unknown => PhaseOutcome::NoSolution,
        };
        info!(
            engine = self.engine.name(),
            phase = %built.phase,
            outcome = ?outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "engine returned"
        );

        if !matches!(outcome, PhaseOutcome::Optimal | PhaseOutcome::Feasible) {
            return Ok(PhaseRun {
                outcome,
                assignment: None,
                objective: None,
                trajectory,
                elapsed,
            });
        }

        if run.values.len() != model.vars().len() {
            bail!(
                "{} returned {} values for {} variables",
                self.engine.name(),
                run.values.len(),
                model.vars().len()
            );
        }
        if let Some((var, family)) = model.out_of_bounds(&run.values, FEASIBILITY_TOL) {
            bail!(
                "{} returned {} for {family} variable {}",
                self.engine.name(),
                run.values[var.0],
                var.0
            );
        }
        let assignment = built.extract_assignment(&run.values);
        let objective = model.evaluate(&built.complete_values(&assignment));
        let violations = check_phase(problem, &assignment, &built.phase, &built.categories);
        if !violations.is_empty() {
            let first = violations[0].to_string();
            if outcome == PhaseOutcome::Optimal {
                bail!(
                    "{} reported an optimal solution that breaks {} constraint(s), first: {first}",
                    self.engine.name(),
                    violations.len()
                );
            }
            warn!(violations = violations.len(), first = %first, "discarding unusable incumbent");
            return Ok(PhaseRun {
                outcome: PhaseOutcome::NoSolution,
                assignment: None,
                objective: None,
                trajectory,
                elapsed,
            });
        }

        // engines without an improvement hook still leave their final incumbent on record
        if best.map_or(true, |b| model.improves(objective, b)) {
            trajectory.push(IncumbentSample {
                elapsed_sec: elapsed.as_secs_f64(),
                solution_index: seen + 1,
                objective,
            });
        }

        Ok(PhaseRun {
            outcome,
            assignment: Some(assignment),
            objective: Some(objective),
            trajectory,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::model::{EngineRun, LinearModel};
    use crate::testing::{six_problem, ScriptedEngine, Step};
    use grouping_core::problem::Assignment;
    use types::{ObjectiveConfig, PhaseParams, TogetherEncoding};

    fn settings() -> EngineSettings {
        EngineSettings {
            time_limit: Duration::from_secs(1),
            seed: 42,
            threads: 1,
        }
    }

    const LOOSE: PhaseParams = PhaseParams {
        min_prefs: 0,
        deviation: None,
    };

    #[test]
    fn records_only_improving_incumbents() {
        let p = six_problem();
        let built = build(&p, &ObjectiveConfig::default(), TogetherEncoding::Aggregated, LOOSE);
        let good = Assignment::new(vec![0, 0, 0, 1, 1, 1]);
        let engine = ScriptedEngine::new(vec![Step::Solve {
            incumbents: vec![-3.0, -5.0, -1.0],
            assignment: good.clone(),
            optimal: true,
        }]);
        let run = SolveDriver::new(&engine, settings()).run(&p, &built).unwrap();
        assert_eq!(run.outcome, PhaseOutcome::Optimal);
        assert_eq!(run.assignment, Some(good));
        let indices: Vec<u32> = run.trajectory.iter().map(|s| s.solution_index).collect();
        // -3 then -1 improve, -5 does not; the final value beats -1 and is appended
        assert_eq!(indices, vec![1, 3, 4]);
        assert!(run
            .trajectory
            .windows(2)
            .all(|w| w[0].elapsed_sec <= w[1].elapsed_sec));
    }

    #[test]
    fn infeasible_and_timeout_carry_no_solution() {
        let p = six_problem();
        let built = build(&p, &ObjectiveConfig::default(), TogetherEncoding::Aggregated, LOOSE);
        let engine = ScriptedEngine::new(vec![Step::Infeasible, Step::Timeout]);
        let driver = SolveDriver::new(&engine, settings());
        let first = driver.run(&p, &built).unwrap();
        assert_eq!(first.outcome, PhaseOutcome::Infeasible);
        assert!(!first.has_solution());
        let second = driver.run(&p, &built).unwrap();
        assert_eq!(second.outcome, PhaseOutcome::NoSolution);
    }

    #[test]
    fn engine_failure_is_an_error() {
        let p = six_problem();
        let built = build(&p, &ObjectiveConfig::default(), TogetherEncoding::Aggregated, LOOSE);
        let engine = ScriptedEngine::new(vec![Step::Fail("license server unreachable")]);
        let err = SolveDriver::new(&engine, settings())
            .run(&p, &built)
            .unwrap_err();
        assert!(err.to_string().contains("license server unreachable"));
    }

    struct Garbage;

    impl SolveEngine for Garbage {
        fn name(&self) -> &'static str {
            "garbage"
        }

        fn solve(
            &self,
            model: &LinearModel,
            _: &EngineSettings,
            _: &mut dyn FnMut(f64),
        ) -> anyhow::Result<EngineRun> {
            Ok(EngineRun {
                status: EngineStatus::Optimal,
                values: vec![0.0; model.vars().len()],
            })
        }
    }

    #[test]
    fn optimal_claim_that_breaks_rules_is_fatal() {
        let p = six_problem();
        let built = build(&p, &ObjectiveConfig::default(), TogetherEncoding::Aggregated, LOOSE);
        // all zeros puts everyone in the last group, breaking sizes and the apart pair
        let err = SolveDriver::new(&Garbage, settings())
            .run(&p, &built)
            .unwrap_err();
        assert!(err.to_string().contains("garbage reported an optimal solution"));
    }
}
