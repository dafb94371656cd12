use crate::model::{Cmp, LinExpr, LinearModel, Sense, VarId};
use grouping_core::problem::{Assignment, Category, Problem};
use grouping_core::scoring::{
    balance_bounds, category_target, layer_weight, preference_weight, ObjectiveScales,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use types::{ObjectiveConfig, PhaseParams, TogetherEncoding};

/// Indicator that two students with a preference edge between them share a group.
#[derive(Clone, Debug)]
pub(crate) struct TogetherVar {
    pub a: usize,
    pub b: usize,
    pub var: VarId,
    /// Per-group AND indicators; empty for the aggregated encoding.
    pub per_group: Vec<VarId>,
}

/// `met` is 1 iff `student` has at least `k` satisfied preferences.
#[derive(Clone, Debug)]
pub(crate) struct Layer {
    pub student: usize,
    pub k: usize,
    pub var: VarId,
}

#[derive(Clone, Debug)]
pub(crate) struct Slack {
    pub category: usize,
    pub group: usize,
    pub over: VarId,
    pub under: VarId,
}

/// A phase model together with the handles needed to read a solution back.
#[derive(Clone, Debug)]
pub struct BuiltModel {
    pub model: LinearModel,
    pub phase: PhaseParams,
    pub scales: ObjectiveScales,
    pub categories: Vec<Category>,
    n_groups: usize,
    x: Vec<VarId>,
    together: Vec<TogetherVar>,
    together_of: HashMap<(usize, usize), usize>,
    layers: Vec<Layer>,
    slacks: Vec<Slack>,
    preferred: Vec<Vec<usize>>,
}

impl BuiltModel {
    pub fn x(&self, s: usize, g: usize) -> VarId {
        self.x[s * self.n_groups + g]
    }

    pub fn together_var(&self, a: usize, b: usize) -> Option<VarId> {
        let key = (a.min(b), a.max(b));
        self.together_of.get(&key).map(|&i| self.together[i].var)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Reads the assignment variables back; each student goes to its highest-valued group.
    pub fn extract_assignment(&self, values: &[f64]) -> Assignment {
        let n_students = self.x.len() / self.n_groups.max(1);
        let group_of = (0..n_students)
            .map(|s| {
                (0..self.n_groups)
                    .max_by(|&g, &h| {
                        values[self.x(s, g).0]
                            .partial_cmp(&values[self.x(s, h).0])
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0)
            })
            .collect();
        Assignment::new(group_of)
    }

    /// Variable values implied by a grouping, with slacks at their tightest.
    pub fn complete_values(&self, assignment: &Assignment) -> Vec<f64> {
        let mut values = vec![0.0; self.model.vars().len()];
        for (s, &g) in assignment.group_of.iter().enumerate() {
            if g < self.n_groups {
                values[self.x(s, g).0] = 1.0;
            }
        }
        let same = |a: usize, b: usize| assignment.group_of[a] == assignment.group_of[b];
        for t in &self.together {
            if same(t.a, t.b) {
                values[t.var.0] = 1.0;
                if let Some(&y) = t.per_group.get(assignment.group_of[t.a]) {
                    values[y.0] = 1.0;
                }
            }
        }
        let satisfied: HashSet<(usize, usize)> = self
            .together_of
            .iter()
            .filter(|(_, &i)| values[self.together[i].var.0] > 0.5)
            .map(|(key, _)| *key)
            .collect();
        for l in &self.layers {
            let count = self.preferred[l.student]
                .iter()
                .copied()
                .filter(|&j| satisfied.contains(&(l.student.min(j), l.student.max(j))))
                .count();
            if count >= l.k {
                values[l.var.0] = 1.0;
            }
        }
        for sl in &self.slacks {
            let cat = &self.categories[sl.category];
            let assigned = cat
                .members
                .iter()
                .filter(|&&s| assignment.group_of[s] == sl.group)
                .count() as f64;
            let diff = assigned - category_target(cat, self.n_groups) as f64;
            values[sl.over.0] = diff.max(0.0);
            values[sl.under.0] = (-diff).max(0.0);
        }
        values
    }
}

/// Emits variables, hard constraints and the composite objective for one phase.
///
/// Never fails: every input was checked by the validator. Infeasibility surfaces at solve time.
pub fn build(
    problem: &Problem,
    objective: &ObjectiveConfig,
    encoding: TogetherEncoding,
    phase: PhaseParams,
) -> BuiltModel {
    let n = problem.n_students();
    let k = problem.n_groups();
    let prefs = &problem.preferences;
    let categories = problem.categories(&objective.balance_attributes);
    let scales = ObjectiveScales::new(problem, objective, &categories);
    let mut model = LinearModel::new();

    let x: Vec<VarId> = (0..n * k).map(|_| model.add_binary("assign")).collect();
    let xv = |s: usize, g: usize| x[s * k + g];

    for s in 0..n {
        model.add_constraint("one_group", LinExpr::sum((0..k).map(|g| xv(s, g))), Cmp::Eq, 1.0);
    }
    for g in 0..k {
        let size = LinExpr::sum((0..n).map(|s| xv(s, g)));
        model.add_constraint("min_size", size.clone(), Cmp::Ge, problem.min_group_size as f64);
        model.add_constraint("max_size", size, Cmp::Le, problem.max_group_size as f64);
        for care in &problem.care {
            model.add_constraint(
                "care_cap",
                LinExpr::sum(care.members.iter().map(|&s| xv(s, g))),
                Cmp::Le,
                care.cap as f64,
            );
        }
    }
    for &(a, b) in &problem.together {
        for g in 0..k {
            model.add_constraint("together", LinExpr::var(xv(a, g)).term(xv(b, g), -1.0), Cmp::Eq, 0.0);
        }
    }
    for &(a, b) in &problem.apart {
        for g in 0..k {
            model.add_constraint("apart", LinExpr::sum([xv(a, g), xv(b, g)]), Cmp::Le, 1.0);
        }
    }
    for s in 0..n {
        if let Some(g) = problem.assigned[s] {
            model.add_constraint("must_assign", LinExpr::var(xv(s, g)), Cmp::Eq, 1.0);
        }
        for &g in &problem.excluded[s] {
            model.add_constraint("must_exclude", LinExpr::var(xv(s, g)), Cmp::Eq, 0.0);
        }
    }

    // together indicators, one per unordered pair joined by a preference edge
    let mut together = Vec::new();
    let mut together_of = HashMap::new();
    for (a, b) in prefs.interest_pairs() {
        let t = model.add_binary("together");
        let mut per_group = Vec::new();
        match encoding {
            TogetherEncoding::Aggregated => {
                for g in 0..k {
                    // t <= 1 - x_a + x_b keeps t at 0 whenever a sits in g without b
                    model.add_constraint(
                        "together_upper",
                        LinExpr::var(t).term(xv(a, g), 1.0).term(xv(b, g), -1.0),
                        Cmp::Le,
                        1.0,
                    );
                    model.add_constraint(
                        "together_lower",
                        LinExpr::var(t).term(xv(a, g), -1.0).term(xv(b, g), -1.0),
                        Cmp::Ge,
                        -1.0,
                    );
                }
            }
            TogetherEncoding::PerGroup => {
                for g in 0..k {
                    let y = model.add_binary("together_in_group");
                    model.add_constraint("and_left", LinExpr::var(y).term(xv(a, g), -1.0), Cmp::Le, 0.0);
                    model.add_constraint("and_right", LinExpr::var(y).term(xv(b, g), -1.0), Cmp::Le, 0.0);
                    model.add_constraint(
                        "and_both",
                        LinExpr::var(y).term(xv(a, g), -1.0).term(xv(b, g), -1.0),
                        Cmp::Ge,
                        -1.0,
                    );
                    per_group.push(y);
                }
                let mut or = LinExpr::var(t);
                for &y in &per_group {
                    or.add_term(y, -1.0);
                }
                model.add_constraint("or_groups", or, Cmp::Eq, 0.0);
            }
        }
        together_of.insert((a, b), together.len());
        together.push(TogetherVar {
            a,
            b,
            var: t,
            per_group,
        });
    }
    let tv = |a: usize, b: usize| together[together_of[&(a.min(b), a.max(b))]].var;

    let satisfied = |s: usize| LinExpr::sum(prefs.preferred(s).iter().map(|&j| tv(s, j)));

    let mut objective_expr = LinExpr::new();
    let pref_coef = objective.preference_weight / scales.preference;
    for (i, j) in prefs.edges() {
        objective_expr.add_term(tv(i, j), pref_coef * preference_weight(problem, objective, i));
    }

    // fairness layers: met_k <=> satisfied >= k
    let k_max = prefs.max_preferences();
    let fair_coef = objective.fairness_weight / scales.fairness;
    let mut layers = Vec::new();
    for s in 0..n {
        let listed = prefs.count(s);
        for level in 1..=listed {
            let met = model.add_binary("layer");
            model.add_constraint(
                "layer_on",
                satisfied(s).term(met, -(level as f64)),
                Cmp::Ge,
                0.0,
            );
            model.add_constraint(
                "layer_off",
                satisfied(s).term(met, -((listed - level + 1) as f64)),
                Cmp::Le,
                (level - 1) as f64,
            );
            objective_expr.add_term(met, fair_coef * layer_weight(objective.fairness_base, k_max, level));
            layers.push(Layer {
                student: s,
                k: level,
                var: met,
            });
        }
    }

    // balance slacks: over - under = assigned - floor(target)
    let bal_coef = objective.balance_weight / scales.balance;
    let mut slacks = Vec::new();
    for (ci, cat) in categories.iter().enumerate() {
        let target = category_target(cat, k) as f64;
        for g in 0..k {
            let over = model.add_integer("over", 0.0, n as f64);
            let under = model.add_integer("under", 0.0, n as f64);
            let expr = LinExpr::sum(cat.members.iter().map(|&s| xv(s, g)))
                .term(over, -1.0)
                .term(under, 1.0);
            model.add_constraint("balance_slack", expr, Cmp::Eq, target);
            objective_expr.add_term(over, -bal_coef);
            objective_expr.add_term(under, -bal_coef);
            slacks.push(Slack {
                category: ci,
                group: g,
                over,
                under,
            });
        }
    }

    // phase constraints
    if phase.min_prefs > 0 {
        for s in (0..n).filter(|&s| prefs.count(s) > 0) {
            model.add_constraint("min_prefs", satisfied(s), Cmp::Ge, phase.min_prefs as f64);
        }
    }
    if let Some(deviation) = phase.deviation {
        for cat in &categories {
            let (lower, upper) = balance_bounds(cat.members.len(), k, deviation);
            for g in 0..k {
                let count = LinExpr::sum(cat.members.iter().map(|&s| xv(s, g)));
                model.add_constraint("balance_min", count.clone(), Cmp::Ge, lower as f64);
                model.add_constraint("balance_max", count, Cmp::Le, upper as f64);
            }
        }
    }

    model.set_objective(Sense::Maximise, objective_expr);
    debug!(
        %phase,
        vars = model.vars().len(),
        constraints = model.constraints().len(),
        together = together.len(),
        layers = layers.len(),
        "model built"
    );

    BuiltModel {
        model,
        phase,
        scales,
        categories,
        n_groups: k,
        x,
        together,
        together_of,
        layers,
        slacks,
        preferred: (0..n).map(|s| prefs.preferred(s).to_vec()).collect(),
    }
}
