//! Constructive heuristic: seed the hard bindings, then place whole
//! must-together components one at a time, retrying with a fresh order on failure.

use grouping_core::problem::{Assignment, Problem};
use grouping_core::scoring::{check_assignment, compute_scores};
use grouping_core::{SolveError, Solver};
use rand::seq::SliceRandom;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use tracing::{debug, info, warn};
use types::{GroupingResult, HeuristicVariant, Placement, SolveParams, SolveStatus, Strategy};

#[derive(Clone, Copy, Debug, Default)]
pub struct HeurSolver;

impl HeurSolver {
    pub fn new() -> Self {
        Self
    }
}

/// Why an attempt stopped, with whatever it had placed by then.
#[derive(Clone, Debug)]
struct Failure {
    diagnostic: String,
    partial: Vec<Placement>,
}

/// Group membership built up during one attempt. Rebuilt from scratch for every retry.
struct PartialAssignment<'p> {
    problem: &'p Problem,
    apart_of: &'p [Vec<usize>],
    group_of: Vec<Option<usize>>,
    sizes: Vec<usize>,
    /// `care_counts[g][f]`
    care_counts: Vec<Vec<usize>>,
    unplaced: usize,
}

impl<'p> PartialAssignment<'p> {
    fn new(problem: &'p Problem, apart_of: &'p [Vec<usize>]) -> Self {
        let k = problem.n_groups();
        Self {
            problem,
            apart_of,
            group_of: vec![None; problem.n_students()],
            sizes: vec![0; k],
            care_counts: vec![vec![0; problem.care.len()]; k],
            unplaced: problem.n_students(),
        }
    }

    fn flagged(&self, s: usize, f: usize) -> bool {
        self.problem.student(s).care.get(f).copied().unwrap_or(false)
    }

    /// Whether `unit` can join `g` without breaking a rule or starving another group below its minimum.
    fn fits(&self, unit: &[usize], g: usize) -> bool {
        let p = self.problem;
        if self.sizes[g] + unit.len() > p.max_group_size {
            return false;
        }
        for &s in unit {
            if p.is_excluded(s, g) || p.assigned[s].is_some_and(|a| a != g) {
                return false;
            }
            if self.apart_of[s]
                .iter()
                .any(|&t| !unit.contains(&t) && self.group_of[t] == Some(g))
            {
                return false;
            }
        }
        for (f, flag) in p.care.iter().enumerate() {
            let extra = unit.iter().filter(|&&s| self.flagged(s, f)).count();
            if self.care_counts[g][f] + extra > flag.cap {
                return false;
            }
        }
        let remaining = self.unplaced - unit.len();
        let deficit: usize = (0..p.n_groups())
            .map(|h| {
                let size = self.sizes[h] + if h == g { unit.len() } else { 0 };
                p.min_group_size.saturating_sub(size)
            })
            .sum();
        deficit <= remaining
    }

    fn place(&mut self, s: usize, g: usize) {
        self.group_of[s] = Some(g);
        self.sizes[g] += 1;
        self.unplaced -= 1;
        for f in 0..self.problem.care.len() {
            if self.flagged(s, f) {
                self.care_counts[g][f] += 1;
            }
        }
    }

    /// Preferences held by `unit` toward students already in `g`.
    fn preference_score(&self, unit: &[usize], g: usize) -> usize {
        unit.iter()
            .map(|&s| {
                self.problem
                    .preferences
                    .preferred(s)
                    .iter()
                    .filter(|&&t| self.group_of[t] == Some(g))
                    .count()
            })
            .sum()
    }

    fn fail(&self, diagnostic: String) -> Failure {
        let p = self.problem;
        let partial = self
            .group_of
            .iter()
            .enumerate()
            .filter_map(|(s, g)| {
                g.map(|g| Placement {
                    student: p.student_ids[s].clone(),
                    group: p.group_ids[g].clone(),
                })
            })
            .collect();
        Failure {
            diagnostic,
            partial,
        }
    }

    fn finish(self) -> Result<Assignment, Failure> {
        if self.unplaced > 0 {
            return Err(self.fail(format!("{} students left unplaced", self.unplaced)));
        }
        let assignment = Assignment::new(self.group_of.iter().map(|g| g.unwrap_or(0)).collect());
        let violations = check_assignment(self.problem, &assignment);
        match violations.first() {
            None => Ok(assignment),
            Some(first) => Err(self.fail(format!(
                "grouping breaks {} rule(s), first: {first}",
                violations.len()
            ))),
        }
    }
}

/// Must-assign students go first; must-together partners then follow until nothing changes.
fn seed(state: &mut PartialAssignment<'_>) -> Result<(), Failure> {
    let p = state.problem;
    for s in 0..p.n_students() {
        if let Some(g) = p.assigned[s] {
            if !state.fits(&[s], g) {
                return Err(state.fail(format!(
                    "{} cannot take must-assign student {}",
                    p.group_ids[g], p.student_ids[s]
                )));
            }
            state.place(s, g);
        }
    }
    loop {
        let mut changed = false;
        for &(a, b) in &p.together {
            let (from, to) = match (state.group_of[a], state.group_of[b]) {
                (Some(_), None) => (a, b),
                (None, Some(_)) => (b, a),
                _ => continue,
            };
            let Some(g) = state.group_of[from] else {
                continue;
            };
            if !state.fits(&[to], g) {
                return Err(state.fail(format!(
                    "{} cannot follow {} into {}",
                    p.student_ids[to], p.student_ids[from], p.group_ids[g]
                )));
            }
            state.place(to, g);
            changed = true;
        }
        if !changed {
            return Ok(());
        }
    }
}

/// Unplaced must-together components: care-flagged first, larger before smaller, shuffled otherwise.
fn placement_order(state: &PartialAssignment<'_>, rng: &mut ChaCha8Rng) -> Vec<Vec<usize>> {
    let p = state.problem;
    let mut units: Vec<Vec<usize>> = p
        .components
        .iter()
        .filter(|c| c.iter().all(|&s| state.group_of[s].is_none()))
        .cloned()
        .collect();
    units.shuffle(rng);
    units.sort_by_key(|u| {
        let care = u.iter().any(|&s| p.has_care_flag(s));
        (!care, std::cmp::Reverse(u.len()))
    });
    units
}

fn attempt(
    problem: &Problem,
    apart_of: &[Vec<usize>],
    variant: HeuristicVariant,
    rng: &mut ChaCha8Rng,
) -> Result<Assignment, Failure> {
    let mut state = PartialAssignment::new(problem, apart_of);
    seed(&mut state)?;
    let groups: Vec<usize> = (0..problem.n_groups()).collect();

    for unit in placement_order(&state, rng) {
        let chosen = match variant {
            HeuristicVariant::Greedy => {
                let mut best: Option<(usize, usize)> = None;
                for &g in &groups {
                    if !state.fits(&unit, g) {
                        continue;
                    }
                    let score = state.preference_score(&unit, g);
                    if best.map_or(true, |(_, b)| score > b) {
                        best = Some((g, score));
                    }
                }
                best.map(|(g, _)| g)
            }
            HeuristicVariant::Random => {
                let mut candidates = groups.clone();
                candidates.shuffle(rng);
                candidates.into_iter().find(|&g| state.fits(&unit, g))
            }
        };
        let Some(g) = chosen else {
            let names: Vec<&str> = unit.iter().map(|&s| problem.student_ids[s].0.as_str()).collect();
            return Err(state.fail(format!("no group can take [{}]", names.join(", "))));
        };
        for &s in &unit {
            state.place(s, g);
        }
    }
    state.finish()
}

impl Solver for HeurSolver {
    fn strategy(&self, _: &SolveParams) -> Strategy {
        Strategy::Heuristic
    }

    fn solve(&self, problem: &Problem, params: &SolveParams) -> Result<GroupingResult, SolveError> {
        let started = Instant::now();
        let variant = params.heuristic.variant;
        let max_attempts = params.heuristic.max_attempts.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let mut apart_of = vec![Vec::new(); problem.n_students()];
        for &(a, b) in &problem.apart {
            apart_of[a].push(b);
            apart_of[b].push(a);
        }

        info!(?variant, max_attempts, students = problem.n_students(), "heuristic started");
        let mut last = Failure {
            diagnostic: String::new(),
            partial: Vec::new(),
        };
        for n in 1..=max_attempts {
            match attempt(problem, &apart_of, variant, &mut rng) {
                Ok(assignment) => {
                    let scores = compute_scores(problem, &assignment, &params.objective);
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(
                        attempt = n,
                        objective = scores.objective,
                        satisfied = scores.satisfied_total,
                        elapsed_ms,
                        "heuristic placed every student"
                    );
                    return Ok(GroupingResult {
                        status: SolveStatus::Feasible,
                        strategy: Strategy::Heuristic,
                        objective: scores.objective,
                        placements: assignment.placements(problem),
                        trajectory: Vec::new(),
                        phases: Vec::new(),
                        stats: serde_json::json!({
                            "method": "heuristic",
                            "variant": variant,
                            "attempts": n,
                            "elapsedMs": elapsed_ms,
                        }),
                        scores: Some(scores.summary()),
                    });
                }
                Err(f) => {
                    debug!(attempt = n, diagnostic = %f.diagnostic, placed = f.partial.len(), "attempt failed");
                    last = f;
                }
            }
        }

        warn!(
            attempts = max_attempts,
            diagnostic = %last.diagnostic,
            "HEURISTIC FAILED: no valid grouping, returning last partial attempt"
        );
        Err(SolveError::HeuristicPlacement {
            strategy: Strategy::Heuristic,
            attempts: max_attempts,
            diagnostic: last.diagnostic,
            partial: last.partial,
        })
    }
}
