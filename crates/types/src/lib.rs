use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash, PartialOrd, Ord,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}
id_newtype!(StudentId);
id_newtype!(GroupId);

/// Upper bound on the number of named peers a student may list.
pub const MAX_PREFERENCES: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Student {
    pub id: StudentId,
    pub gender: String,
    pub grade: u32,
    /// One entry per care flag configured in [`GroupingSpec::max_care`].
    #[serde(default)]
    pub care: Vec<bool>,
    #[serde(default)]
    pub behavior: Option<bool>,
    #[serde(default)]
    pub learning: Option<bool>,
    #[serde(default)]
    pub combination: Option<bool>,
    /// Ranked named peers, most wanted first.
    #[serde(default)]
    pub preferences: Vec<StudentId>,
}

/// A bucket receiving students. Groups are usually named after their teacher.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct Group {
    pub id: GroupId,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PairPolarity {
    Together,
    Apart,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct StudentPair {
    pub first: StudentId,
    pub second: StudentId,
    pub polarity: PairPolarity,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupPolarity {
    Assign,
    Exclude,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct GroupBinding {
    pub student: StudentId,
    pub group: GroupId,
    pub polarity: GroupPolarity,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupingSpec {
    pub n_students: u32,
    pub n_groups: u32,
    pub min_group_size: u32,
    /// Per-group cap for each care flag, indexed like [`Student::care`].
    pub max_care: Vec<u32>,
    /// Explicit upper bound; must not be below [`GroupingSpec::computed_max_group_size`].
    #[serde(default)]
    pub max_group_size: Option<u32>,
}

impl GroupingSpec {
    /// `min_group_size` plus the leftover students spread over the groups, rounded up.
    pub fn computed_max_group_size(&self) -> u32 {
        if self.n_groups == 0 {
            return self.min_group_size;
        }
        let reserved = self.min_group_size as u64 * self.n_groups as u64;
        let remaining = (self.n_students as u64).saturating_sub(reserved) as u32;
        let mut max_size = self.min_group_size.saturating_add(remaining / self.n_groups);
        if remaining % self.n_groups != 0 {
            max_size = max_size.saturating_add(1);
        }
        max_size
    }

    pub fn max_group_size(&self) -> u32 {
        self.max_group_size
            .unwrap_or_else(|| self.computed_max_group_size())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub students: Vec<Student>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub student_pairs: Vec<StudentPair>,
    #[serde(default)]
    pub group_bindings: Vec<GroupBinding>,
    pub spec: GroupingSpec,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    #[default]
    Milp,
    Heuristic,
}

/// How the "two students share a group" indicator is tied to the assignment variables.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TogetherEncoding {
    /// One indicator per pair with two inequalities per group.
    #[default]
    Aggregated,
    /// An explicit AND indicator per group, OR-ed into the pair indicator.
    PerGroup,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// Minimum preferences and balance bounds are hard constraints, relaxed phase by phase.
    #[default]
    Hard,
    /// Single attempt driven by the soft objective only.
    Soft,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeuristicVariant {
    #[default]
    Greedy,
    Random,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BalanceAttribute {
    Gender,
    Grade,
    /// Every configured care flag.
    Care,
    Behavior,
    Learning,
    Combination,
}

impl BalanceAttribute {
    pub const ALL: [BalanceAttribute; 6] = [
        BalanceAttribute::Gender,
        BalanceAttribute::Grade,
        BalanceAttribute::Care,
        BalanceAttribute::Behavior,
        BalanceAttribute::Learning,
        BalanceAttribute::Combination,
    ];
}

impl fmt::Display for BalanceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BalanceAttribute::Gender => "gender",
            BalanceAttribute::Grade => "grade",
            BalanceAttribute::Care => "care",
            BalanceAttribute::Behavior => "behavior",
            BalanceAttribute::Learning => "learning",
            BalanceAttribute::Combination => "combination",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaxationConfig {
    pub min_prefs_start: u32,
    /// Nominal balance deviation as a fraction of the per-group target (0.1 = ±10%).
    pub deviation: f64,
    pub mode: ConstraintMode,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            min_prefs_start: MAX_PREFERENCES as u32,
            deviation: 0.1,
            mode: ConstraintMode::Hard,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectiveConfig {
    pub preference_weight: f64,
    pub fairness_weight: f64,
    pub balance_weight: f64,
    /// Base `b` of the layer weight `b^(k_max - k)`.
    pub fairness_base: f64,
    /// Scale each preference edge by `1 / (number of preferences listed)`.
    pub weight_by_preference_count: bool,
    pub balance_attributes: Vec<BalanceAttribute>,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            preference_weight: 1.0,
            fairness_weight: 1.0,
            balance_weight: 2.0,
            fairness_base: 10.0,
            weight_by_preference_count: true,
            balance_attributes: BalanceAttribute::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct HeuristicParams {
    pub max_attempts: u32,
    pub variant: HeuristicVariant,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            variant: HeuristicVariant::Greedy,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveParams {
    pub solver: SolverKind,
    pub encoding: TogetherEncoding,
    pub time_limit_sec: u64,
    pub seed: u64,
    pub relaxation: RelaxationConfig,
    pub objective: ObjectiveConfig,
    pub heuristic: HeuristicParams,
    /// Run the constructive heuristic when every relaxation phase fails.
    pub heuristic_fallback: bool,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            solver: SolverKind::Milp,
            encoding: TogetherEncoding::Aggregated,
            time_limit_sec: 30 * 60,
            seed: 42,
            relaxation: RelaxationConfig::default(),
            objective: ObjectiveConfig::default(),
            heuristic: HeuristicParams::default(),
            heuristic_fallback: false,
        }
    }
}

impl SolveParams {
    pub fn strategy(&self) -> Strategy {
        match (self.solver, self.encoding) {
            (SolverKind::Heuristic, _) => Strategy::Heuristic,
            (SolverKind::Milp, TogetherEncoding::Aggregated) => Strategy::Ilp,
            (SolverKind::Milp, TogetherEncoding::PerGroup) => Strategy::Cp,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Ilp,
    Cp,
    Heuristic,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Ilp => "ILP-style",
            Strategy::Cp => "CP-style",
            Strategy::Heuristic => "heuristic",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Error,
}

/// Strictness of one solve attempt.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseParams {
    pub min_prefs: u32,
    /// `None` drops the balance bounds entirely.
    pub deviation: Option<f64>,
}

impl fmt::Display for PhaseParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deviation {
            Some(d) => write!(f, "min_prefs={}, deviation={}", self.min_prefs, d),
            None => write!(f, "min_prefs={}, deviation=unconstrained", self.min_prefs),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Optimal,
    Feasible,
    Infeasible,
    /// The time limit expired before any incumbent was found.
    NoSolution,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncumbentSample {
    pub elapsed_sec: f64,
    pub solution_index: u32,
    pub objective: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub phase: PhaseParams,
    pub outcome: PhaseOutcome,
    #[serde(default)]
    pub trajectory: Vec<IncumbentSample>,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, Eq, PartialEq)]
pub struct Placement {
    pub student: StudentId,
    pub group: GroupId,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    pub satisfied_preferences: u32,
    pub provided_preferences: u32,
    pub satisfaction_rate: f64,
    /// Lowest satisfied count over students that listed at least one preference.
    pub min_satisfied: Option<u32>,
    pub fairness_layers_met: u32,
    pub balance_deviation: u32,
    pub objective: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupingResult {
    pub status: SolveStatus,
    pub strategy: Strategy,
    pub objective: f64,
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub trajectory: Vec<IncumbentSample>,
    #[serde(default)]
    pub phases: Vec<PhaseRecord>,
    #[serde(default)]
    pub scores: Option<ScoreSummary>,
    pub stats: serde_json::Value,
}
