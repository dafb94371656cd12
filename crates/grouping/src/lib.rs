//! Student grouping: validate an instance, then solve it with the MILP
//! relaxation or the constructive heuristic.

pub mod config;
pub mod telemetry;

pub use grouping_core::{
    check_assignment, compute_scores, validate, Assignment, Problem, SolveError, Solver,
    ValidationError,
};
pub use solver_heur::HeurSolver;
pub use solver_milp::model::SolveEngine;
pub use solver_milp::MilpSolver;
pub use types::*;

use tracing::{info, warn};

/// Picks the strategy named in [`SolveParams`] and applies the heuristic fallback.
pub struct DispatchSolver {
    milp: Option<MilpSolver<Box<dyn SolveEngine>>>,
    heuristic: HeurSolver,
}

impl Default for DispatchSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchSolver {
    /// Uses whichever MILP backend this build was compiled with.
    pub fn new() -> Self {
        Self {
            milp: solver_milp::default_engine().map(MilpSolver::new),
            heuristic: HeurSolver::new(),
        }
    }

    pub fn with_engine(engine: Box<dyn SolveEngine>) -> Self {
        Self {
            milp: Some(MilpSolver::new(engine)),
            heuristic: HeurSolver::new(),
        }
    }

    pub fn heuristic_only() -> Self {
        Self {
            milp: None,
            heuristic: HeurSolver::new(),
        }
    }

    pub fn has_milp(&self) -> bool {
        self.milp.is_some()
    }

    /// Validates, then solves. Validation failures abort before any solver time is spent.
    pub fn solve_instance(
        &self,
        instance: &Instance,
        params: &SolveParams,
    ) -> Result<GroupingResult, SolveError> {
        let problem = validate(instance)?;
        self.solve(&problem, params)
    }

    fn run_heuristic(
        &self,
        problem: &Problem,
        params: &SolveParams,
        fallback_from: Option<Strategy>,
    ) -> Result<GroupingResult, SolveError> {
        let mut result = self.heuristic.solve(problem, params)?;
        if let (Some(from), Some(stats)) = (fallback_from, result.stats.as_object_mut()) {
            stats.insert("fallbackFrom".into(), serde_json::json!(from.to_string()));
        }
        Ok(result)
    }
}

impl Solver for DispatchSolver {
    fn strategy(&self, params: &SolveParams) -> Strategy {
        match (&self.milp, params.solver) {
            (None, _) | (_, SolverKind::Heuristic) => Strategy::Heuristic,
            (Some(m), SolverKind::Milp) => m.strategy(params),
        }
    }

    fn solve(&self, problem: &Problem, params: &SolveParams) -> Result<GroupingResult, SolveError> {
        let milp = match (&self.milp, params.solver) {
            (_, SolverKind::Heuristic) => return self.run_heuristic(problem, params, None),
            (None, SolverKind::Milp) => {
                warn!("no MILP backend compiled in, using the constructive heuristic");
                return self.run_heuristic(problem, params, None);
            }
            (Some(m), SolverKind::Milp) => m,
        };

        match milp.solve(problem, params) {
            Err(SolveError::ExhaustedAllPhases {
                strategy,
                last_phase,
                ..
            }) if params.heuristic_fallback => {
                warn!(%strategy, %last_phase, "all phases failed, falling back to the heuristic");
                self.run_heuristic(problem, params, Some(strategy))
            }
            other => {
                if let Ok(r) = &other {
                    info!(strategy = %r.strategy, status = ?r.status, objective = r.objective, "solved");
                }
                other
            }
        }
    }
}
