//! MILP strategy: model building, the solve driver and phase relaxation.

pub mod builder;
pub mod driver;
pub mod model;
pub mod relax;

#[cfg(any(feature = "with-milp", feature = "microlp"))]
mod milp_core;
#[cfg(test)]
mod testing;

#[cfg(any(feature = "with-milp", feature = "microlp"))]
pub use milp_core::GoodLpEngine;

use driver::SolveDriver;
use grouping_core::problem::Problem;
use grouping_core::scoring::{compute_scores, fairness_base_dominates};
use grouping_core::{SolveError, Solver};
use model::{EngineSettings, SolveEngine};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use types::{GroupingResult, PhaseOutcome, SolveParams, SolveStatus, Strategy};

/// The production backend compiled into this build, if any.
///
/// Only CBC qualifies. microlp cannot honour a time limit, so a `microlp`-only build
/// hands back `None` and callers fall through to the heuristic.
pub fn default_engine() -> Option<Box<dyn SolveEngine>> {
    #[cfg(feature = "with-milp")]
    {
        Some(Box::new(GoodLpEngine))
    }
    #[cfg(not(feature = "with-milp"))]
    {
        None
    }
}

pub struct MilpSolver<E> {
    engine: E,
}

impl<E: SolveEngine> MilpSolver<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: SolveEngine> Solver for MilpSolver<E> {
    fn strategy(&self, params: &SolveParams) -> Strategy {
        params.strategy()
    }

    fn solve(&self, problem: &Problem, params: &SolveParams) -> Result<GroupingResult, SolveError> {
        let strategy = self.strategy(params);
        let started = Instant::now();
        info!(
            %strategy,
            engine = self.engine.name(),
            students = problem.n_students(),
            groups = problem.n_groups(),
            "milp solve started"
        );
        if !fairness_base_dominates(problem, params.objective.fairness_base) {
            warn!(
                base = params.objective.fairness_base,
                "fairness base is too small for strict layer priority"
            );
        }

        let driver = SolveDriver::new(
            &self.engine,
            EngineSettings {
                time_limit: Duration::from_secs(params.time_limit_sec),
                seed: params.seed,
                threads: 1,
            },
        );
        let solved = relax::solve_with_relaxation(problem, params, &driver)?;
        let Some(assignment) = solved.run.assignment.as_ref() else {
            return Err(SolveError::Engine {
                strategy,
                phase: solved.phase,
                source: anyhow::anyhow!("solved phase carried no assignment"),
            });
        };

        let scores = compute_scores(problem, assignment, &params.objective);
        let status = match solved.run.outcome {
            PhaseOutcome::Optimal => SolveStatus::Optimal,
            _ => SolveStatus::Feasible,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            %strategy,
            phase = %solved.phase,
            objective = scores.objective,
            satisfied = scores.satisfied_total,
            elapsed_ms,
            "milp solve finished"
        );

        Ok(GroupingResult {
            status,
            strategy,
            objective: scores.objective,
            placements: assignment.placements(problem),
            trajectory: solved.run.trajectory.clone(),
            stats: serde_json::json!({
                "method": "milp",
                "engine": self.engine.name(),
                "encoding": params.encoding,
                "phase": solved.phase,
                "phasesTried": solved.phases.len(),
                "vars": solved.vars,
                "constraints": solved.constraints,
                "elapsedMs": elapsed_ms,
            }),
            phases: solved.phases,
            scores: Some(scores.summary()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{six_problem, ScriptedEngine, Step};
    use grouping_core::problem::Assignment;
    use types::{RelaxationConfig, TogetherEncoding};

    fn params(encoding: TogetherEncoding) -> SolveParams {
        SolveParams {
            encoding,
            time_limit_sec: 5,
            relaxation: RelaxationConfig {
                min_prefs_start: 1,
                ..RelaxationConfig::default()
            },
            ..SolveParams::default()
        }
    }

    fn good_run() -> Step {
        Step::Solve {
            incumbents: vec![],
            assignment: Assignment::new(vec![0, 0, 0, 1, 1, 1]),
            optimal: true,
        }
    }

    #[test]
    fn reports_full_result() {
        let p = six_problem();
        let solver = MilpSolver::new(ScriptedEngine::new(vec![good_run()]));
        let r = solver.solve(&p, &params(TogetherEncoding::Aggregated)).unwrap();
        assert_eq!(r.status, SolveStatus::Optimal);
        assert_eq!(r.strategy, Strategy::Ilp);
        assert_eq!(r.placements.len(), 6);
        assert_eq!(r.phases.len(), 1);
        let scores = r.scores.unwrap();
        assert_eq!(scores.satisfied_preferences, 2);
        assert_eq!(scores.provided_preferences, 2);
        assert_eq!(r.stats["method"], "milp");
        assert_eq!(r.stats["engine"], "scripted");
        assert!((r.objective - scores.objective).abs() < 1e-9);
        assert_eq!(r.trajectory.len(), 1);
    }

    #[test]
    fn per_group_encoding_is_cp_style() {
        let p = six_problem();
        let solver = MilpSolver::new(ScriptedEngine::new(vec![Step::Infeasible, good_run()]));
        let r = solver.solve(&p, &params(TogetherEncoding::PerGroup)).unwrap();
        assert_eq!(r.strategy, Strategy::Cp);
        assert_eq!(r.phases.len(), 2);
        assert_eq!(r.phases[0].outcome, PhaseOutcome::Infeasible);
    }

    #[test]
    fn exhaustion_surfaces_as_error() {
        let p = six_problem();
        let solver = MilpSolver::new(ScriptedEngine::new(vec![]));
        let err = solver.solve(&p, &params(TogetherEncoding::Aggregated)).unwrap_err();
        assert!(matches!(err, SolveError::ExhaustedAllPhases { .. }));
    }

    #[test]
    fn default_engine_is_cbc_only() {
        assert_eq!(default_engine().is_some(), cfg!(feature = "with-milp"));
        if let Some(engine) = default_engine() {
            assert_eq!(engine.name(), "coin_cbc");
        }
    }
}
