use crate::builder::build;
use crate::driver::{PhaseRun, SolveDriver};
use crate::model::SolveEngine;
use grouping_core::problem::Problem;
use grouping_core::SolveError;
use tracing::info;
use types::{ConstraintMode, PhaseOutcome, PhaseParams, PhaseRecord, RelaxationConfig, SolveParams};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RelaxState {
    NotStarted,
    /// Nominal deviation, carrying the current min-preferences threshold.
    TryingPhaseA(u32),
    /// Balance bounds dropped, carrying the current threshold.
    TryingPhaseB(u32),
    Succeeded,
    ExhaustedAllPhases,
}

/// Walks (threshold, deviation) pairs from strictest to loosest.
///
/// Phase A sweeps the threshold from its start value down to 0 at the nominal
/// deviation; phase B repeats the sweep without balance bounds. Soft mode has a
/// single attempt, the loosest phase B step.
#[derive(Clone, Debug)]
pub struct RelaxationController {
    config: RelaxationConfig,
    state: RelaxState,
}

impl RelaxationController {
    pub fn new(config: RelaxationConfig) -> Self {
        Self {
            config,
            state: RelaxState::NotStarted,
        }
    }

    pub fn state(&self) -> RelaxState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            RelaxState::Succeeded | RelaxState::ExhaustedAllPhases
        )
    }

    pub fn current_phase(&self) -> Option<PhaseParams> {
        match self.state {
            RelaxState::TryingPhaseA(m) => Some(PhaseParams {
                min_prefs: m,
                deviation: Some(self.config.deviation),
            }),
            RelaxState::TryingPhaseB(m) => Some(PhaseParams {
                min_prefs: m,
                deviation: None,
            }),
            _ => None,
        }
    }

    /// Moves out of `NotStarted` and returns the first phase to try.
    pub fn start(&mut self) -> Option<PhaseParams> {
        if self.state == RelaxState::NotStarted {
            self.state = match self.config.mode {
                ConstraintMode::Hard => RelaxState::TryingPhaseA(self.config.min_prefs_start),
                ConstraintMode::Soft => RelaxState::TryingPhaseB(0),
            };
        }
        self.current_phase()
    }

    /// Feeds the outcome of the current phase and returns the next phase, if any.
    pub fn advance(&mut self, outcome: PhaseOutcome) -> Option<PhaseParams> {
        let solved = matches!(outcome, PhaseOutcome::Optimal | PhaseOutcome::Feasible);
        self.state = match self.state {
            _ if solved && self.current_phase().is_some() => RelaxState::Succeeded,
            RelaxState::TryingPhaseA(m) if m > 0 => RelaxState::TryingPhaseA(m - 1),
            RelaxState::TryingPhaseA(_) => RelaxState::TryingPhaseB(self.config.min_prefs_start),
            RelaxState::TryingPhaseB(m) if m > 0 && self.config.mode == ConstraintMode::Hard => {
                RelaxState::TryingPhaseB(m - 1)
            }
            RelaxState::TryingPhaseB(_) => RelaxState::ExhaustedAllPhases,
            other => other,
        };
        self.current_phase()
    }

    /// Every phase in attempt order, assuming each one fails.
    pub fn schedule(config: &RelaxationConfig) -> Vec<PhaseParams> {
        let mut ctl = Self::new(config.clone());
        let mut out = Vec::new();
        let mut next = ctl.start();
        while let Some(p) = next {
            out.push(p);
            next = ctl.advance(PhaseOutcome::Infeasible);
        }
        out
    }
}

/// Final successful phase plus the record of every attempt.
#[derive(Clone, Debug)]
pub struct RelaxedSolve {
    pub phase: PhaseParams,
    pub run: PhaseRun,
    pub phases: Vec<PhaseRecord>,
    pub vars: usize,
    pub constraints: usize,
}

/// Runs phases strictly in sequence until one yields a solution.
pub fn solve_with_relaxation<E: SolveEngine + ?Sized>(
    problem: &Problem,
    params: &SolveParams,
    driver: &SolveDriver<'_, E>,
) -> Result<RelaxedSolve, SolveError> {
    let strategy = params.strategy();
    let mut ctl = RelaxationController::new(params.relaxation.clone());
    let mut phases: Vec<PhaseRecord> = Vec::new();
    let mut next = ctl.start();
    let mut last_phase = next;

    while let Some(phase) = next {
        last_phase = Some(phase);
        let built = build(problem, &params.objective, params.encoding, phase);
        let run = driver
            .run(problem, &built)
            .map_err(|source| SolveError::Engine {
                strategy,
                phase,
                source,
            })?;
        phases.push(PhaseRecord {
            phase,
            outcome: run.outcome,
            trajectory: run.trajectory.clone(),
        });
        next = ctl.advance(run.outcome);
        if ctl.state() == RelaxState::Succeeded {
            info!(%strategy, %phase, outcome = ?run.outcome, "phase solved");
            return Ok(RelaxedSolve {
                phase,
                vars: built.model.vars().len(),
                constraints: built.model.constraints().len(),
                run,
                phases,
            });
        }
        match next {
            Some(n) => info!(%strategy, %phase, outcome = ?run.outcome, next = %n, "phase failed, relaxing"),
            None => info!(%strategy, %phase, outcome = ?run.outcome, "last phase failed"),
        }
    }

    Err(SolveError::ExhaustedAllPhases {
        strategy,
        last_phase: last_phase.unwrap_or(PhaseParams {
            min_prefs: 0,
            deviation: None,
        }),
        phases,
    })
}
