use crate::problem::{Assignment, Category, Problem};
use thiserror::Error;
use types::{GroupId, ObjectiveConfig, PhaseParams, ScoreSummary, StudentId};

/// A broken invariant found in a complete assignment.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Violation {
    #[error("student {student} is not placed in any group")]
    Unplaced { student: StudentId },
    #[error("group {group} has {size} students, allowed {min}..={max}")]
    GroupSize {
        group: GroupId,
        size: usize,
        min: usize,
        max: usize,
    },
    #[error("group {group} has {count} students with care flag {flag}, cap is {cap}")]
    CareCap {
        group: GroupId,
        flag: usize,
        count: usize,
        cap: usize,
    },
    #[error("must-together students {first} and {second} are split")]
    TogetherSplit { first: StudentId, second: StudentId },
    #[error("must-apart students {first} and {second} share {group}")]
    ApartJoined {
        first: StudentId,
        second: StudentId,
        group: GroupId,
    },
    #[error("student {student} must be in {group}")]
    AssignIgnored { student: StudentId, group: GroupId },
    #[error("student {student} may not be in {group}")]
    ExcludeIgnored { student: StudentId, group: GroupId },
    #[error("student {student} has {satisfied} satisfied preferences, phase requires {required}")]
    MinPreferences {
        student: StudentId,
        satisfied: usize,
        required: usize,
    },
    #[error("group {group} holds {count} of {category}, bounds {lower}..={upper}")]
    BalanceBound {
        group: GroupId,
        category: String,
        count: usize,
        lower: usize,
        upper: usize,
    },
}

/// Re-checks every hard invariant of a grouping.
pub fn check_assignment(problem: &Problem, assignment: &Assignment) -> Vec<Violation> {
    let n_groups = problem.n_groups();
    let sid = |s: usize| problem.student_ids[s].clone();
    let gid = |g: usize| problem.group_ids[g].clone();
    let mut out = Vec::new();

    for (s, &g) in assignment.group_of.iter().enumerate() {
        if g >= n_groups {
            out.push(Violation::Unplaced { student: sid(s) });
        }
    }
    if assignment.group_of.len() < problem.n_students() {
        for s in assignment.group_of.len()..problem.n_students() {
            out.push(Violation::Unplaced { student: sid(s) });
        }
    }
    let group_of = |s: usize| assignment.group_of.get(s).copied().filter(|&g| g < n_groups);

    for (g, size) in assignment.sizes(n_groups).into_iter().enumerate() {
        if size < problem.min_group_size || size > problem.max_group_size {
            out.push(Violation::GroupSize {
                group: gid(g),
                size,
                min: problem.min_group_size,
                max: problem.max_group_size,
            });
        }
    }
    for (flag, care) in problem.care.iter().enumerate() {
        let mut counts = vec![0usize; n_groups];
        for &s in &care.members {
            if let Some(g) = group_of(s) {
                counts[g] += 1;
            }
        }
        for (g, count) in counts.into_iter().enumerate() {
            if count > care.cap {
                out.push(Violation::CareCap {
                    group: gid(g),
                    flag,
                    count,
                    cap: care.cap,
                });
            }
        }
    }
    for &(a, b) in &problem.together {
        if group_of(a) != group_of(b) {
            out.push(Violation::TogetherSplit {
                first: sid(a),
                second: sid(b),
            });
        }
    }
    for &(a, b) in &problem.apart {
        if let (Some(ga), Some(gb)) = (group_of(a), group_of(b)) {
            if ga == gb {
                out.push(Violation::ApartJoined {
                    first: sid(a),
                    second: sid(b),
                    group: gid(ga),
                });
            }
        }
    }
    for s in 0..problem.n_students() {
        let placed = group_of(s);
        if let Some(g) = problem.assigned[s] {
            if placed != Some(g) {
                out.push(Violation::AssignIgnored {
                    student: sid(s),
                    group: gid(g),
                });
            }
        }
        for &g in &problem.excluded[s] {
            if placed == Some(g) {
                out.push(Violation::ExcludeIgnored {
                    student: sid(s),
                    group: gid(g),
                });
            }
        }
    }
    out
}

/// Lower and upper count of one category in one group at `deviation`.
pub fn balance_bounds(count: usize, n_groups: usize, deviation: f64) -> (usize, usize) {
    let target = count as f64 / n_groups as f64;
    let lower = ((1.0 - deviation) * target).floor().max(0.0) as usize;
    let upper = ((1.0 + deviation) * target).ceil() as usize;
    (lower, upper)
}

/// [`check_assignment`] plus the minimum-preferences threshold and balance bounds of a phase.
pub fn check_phase(
    problem: &Problem,
    assignment: &Assignment,
    phase: &PhaseParams,
    categories: &[Category],
) -> Vec<Violation> {
    let mut out = check_assignment(problem, assignment);
    if !out.is_empty() {
        return out;
    }
    let required = phase.min_prefs as usize;
    if required > 0 {
        for s in 0..problem.n_students() {
            if problem.preferences.count(s) == 0 {
                continue;
            }
            let satisfied = satisfied_count(problem, assignment, s);
            if satisfied < required {
                out.push(Violation::MinPreferences {
                    student: problem.student_ids[s].clone(),
                    satisfied,
                    required,
                });
            }
        }
    }
    if let Some(deviation) = phase.deviation {
        let n_groups = problem.n_groups();
        for cat in categories {
            let (lower, upper) = balance_bounds(cat.members.len(), n_groups, deviation);
            for (g, count) in category_counts(cat, assignment, n_groups)
                .into_iter()
                .enumerate()
            {
                if count < lower || count > upper {
                    out.push(Violation::BalanceBound {
                        group: problem.group_ids[g].clone(),
                        category: cat.label(),
                        count,
                        lower,
                        upper,
                    });
                }
            }
        }
    }
    out
}

pub fn satisfied_count(problem: &Problem, assignment: &Assignment, s: usize) -> usize {
    let g = assignment.group_of[s];
    problem
        .preferences
        .preferred(s)
        .iter()
        .filter(|&&j| assignment.group_of[j] == g)
        .count()
}

pub fn category_counts(cat: &Category, assignment: &Assignment, n_groups: usize) -> Vec<usize> {
    let mut counts = vec![0; n_groups];
    for &s in &cat.members {
        let g = assignment.group_of[s];
        if g < n_groups {
            counts[g] += 1;
        }
    }
    counts
}

/// Integer per-group target of a category.
pub fn category_target(cat: &Category, n_groups: usize) -> usize {
    cat.members.len() / n_groups
}

/// Weight of one preference edge leaving student `s`.
pub fn preference_weight(problem: &Problem, config: &ObjectiveConfig, s: usize) -> f64 {
    let count = problem.preferences.count(s);
    if config.weight_by_preference_count && count > 0 {
        1.0 / count as f64
    } else {
        1.0
    }
}

/// Weight of fairness layer `k` (1-based) given the largest preference count `k_max`.
pub fn layer_weight(base: f64, k_max: usize, k: usize) -> f64 {
    base.powi((k_max - k) as i32)
}

/// Whether one satisfied layer-`k` indicator outweighs every deeper layer combined.
///
/// With `n` students holding preferences, deeper layers sum to less than `n / (base - 1)`
/// units of the current layer, so `base > n + 1` suffices.
pub fn fairness_base_dominates(problem: &Problem, base: f64) -> bool {
    let n = (0..problem.n_students())
        .filter(|&s| problem.preferences.count(s) > 0)
        .count();
    n == 0 || base > (n + 1) as f64
}

/// Theoretical maxima used to bring the three objective terms onto one scale.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectiveScales {
    pub preference: f64,
    pub fairness: f64,
    pub balance: f64,
}

impl ObjectiveScales {
    pub fn new(problem: &Problem, config: &ObjectiveConfig, categories: &[Category]) -> Self {
        let n_groups = problem.n_groups();
        let preference: f64 = (0..problem.n_students())
            .map(|s| {
                preference_weight(problem, config, s)
                    * problem.preferences.count(s) as f64
                    * n_groups as f64
            })
            .sum();
        let k_max = problem.preferences.max_preferences();
        let fairness: f64 = (0..problem.n_students())
            .flat_map(|s| 1..=problem.preferences.count(s))
            .map(|k| layer_weight(config.fairness_base, k_max, k))
            .sum();
        let balance: f64 = categories
            .iter()
            .map(|c| {
                let count = c.members.len() as f64;
                (count - count / n_groups as f64).abs()
            })
            .sum();
        let or_one = |v: f64| if v > 0.0 { v } else { 1.0 };
        Self {
            preference: or_one(preference),
            fairness: or_one(fairness),
            balance: or_one(balance),
        }
    }

    pub fn combine(&self, config: &ObjectiveConfig, preference: f64, fairness: f64, balance: f64) -> f64 {
        config.preference_weight * preference / self.preference
            + config.fairness_weight * fairness / self.fairness
            - config.balance_weight * balance / self.balance
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scores {
    /// Satisfied preferences per student.
    pub satisfied: Vec<u32>,
    pub satisfied_total: u32,
    pub provided_total: u32,
    pub satisfaction_rate: f64,
    pub min_satisfied: Option<u32>,
    /// Weighted preference term before scaling.
    pub preference: f64,
    /// Layer-weighted fairness term before scaling.
    pub fairness: f64,
    pub fairness_layers_met: u32,
    pub balance_deviation: u32,
    pub objective: f64,
}

impl Scores {
    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary {
            satisfied_preferences: self.satisfied_total,
            provided_preferences: self.provided_total,
            satisfaction_rate: self.satisfaction_rate,
            min_satisfied: self.min_satisfied,
            fairness_layers_met: self.fairness_layers_met,
            balance_deviation: self.balance_deviation,
            objective: self.objective,
        }
    }
}

/// Quality metrics of a complete grouping, including the composite objective in closed form.
pub fn compute_scores(problem: &Problem, assignment: &Assignment, config: &ObjectiveConfig) -> Scores {
    let categories = problem.categories(&config.balance_attributes);
    let scales = ObjectiveScales::new(problem, config, &categories);
    let n_groups = problem.n_groups();
    let k_max = problem.preferences.max_preferences();

    let mut sc = Scores::default();
    for s in 0..problem.n_students() {
        let listed = problem.preferences.count(s);
        let satisfied = satisfied_count(problem, assignment, s);
        sc.satisfied.push(satisfied as u32);
        sc.satisfied_total += satisfied as u32;
        sc.provided_total += listed as u32;
        sc.preference += preference_weight(problem, config, s) * satisfied as f64;
        for k in 1..=satisfied.min(listed) {
            sc.fairness += layer_weight(config.fairness_base, k_max, k);
            sc.fairness_layers_met += 1;
        }
        if listed > 0 {
            let m = sc.min_satisfied.map_or(satisfied as u32, |m| m.min(satisfied as u32));
            sc.min_satisfied = Some(m);
        }
    }
    sc.satisfaction_rate = if sc.provided_total > 0 {
        sc.satisfied_total as f64 / sc.provided_total as f64
    } else {
        0.0
    };
    for cat in &categories {
        let target = category_target(cat, n_groups);
        for count in category_counts(cat, assignment, n_groups) {
            sc.balance_deviation += count.abs_diff(target) as u32;
        }
    }
    sc.objective = scales.combine(
        config,
        sc.preference,
        sc.fairness,
        sc.balance_deviation as f64,
    );
    sc
}
