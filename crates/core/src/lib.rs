pub mod graph;
pub mod preferences;
pub mod problem;
pub mod scoring;
pub mod synthetic;
pub mod validate;

use thiserror::Error;

pub use preferences::PreferenceMatrix;
pub use problem::{Assignment, Category, Problem};
pub use scoring::{check_assignment, check_phase, compute_scores, Scores, Violation};
pub use types::{
    GroupingResult, Instance, PhaseParams, Placement, SolveParams, SolveStatus, Strategy,
};
pub use validate::{validate, ValidationError};

/// Fatal outcomes of a run. A single infeasible phase is not an error.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid instance: {0}")]
    Validation(#[from] ValidationError),
    #[error("{strategy}: no solution found, last attempt was {last_phase}")]
    ExhaustedAllPhases {
        strategy: Strategy,
        last_phase: PhaseParams,
        /// Every attempted phase with its outcome.
        phases: Vec<types::PhaseRecord>,
    },
    #[error("{strategy}: solve engine failed at {phase}: {source:#}")]
    Engine {
        strategy: Strategy,
        phase: PhaseParams,
        #[source]
        source: anyhow::Error,
    },
    #[error("{strategy}: no valid grouping after {attempts} attempts: {diagnostic}")]
    HeuristicPlacement {
        strategy: Strategy,
        attempts: u32,
        diagnostic: String,
        /// Placements of the last attempt; incomplete or invalid.
        partial: Vec<Placement>,
    },
}

/// One solving strategy over a validated problem.
pub trait Solver {
    fn strategy(&self, params: &SolveParams) -> Strategy;

    fn solve(&self, problem: &Problem, params: &SolveParams) -> Result<GroupingResult, SolveError>;
}
