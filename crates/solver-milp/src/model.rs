//! Backend-neutral linear model and the boundary every solve engine implements.

use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VarKind {
    Binary,
    Integer { lower: f64, upper: f64 },
}

#[derive(Clone, Debug)]
pub struct VarDef {
    pub kind: VarKind,
    pub family: &'static str,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(v: VarId) -> Self {
        Self {
            terms: vec![(v, 1.0)],
            constant: 0.0,
        }
    }

    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        Self {
            terms: vars.into_iter().map(|v| (v, 1.0)).collect(),
            constant: 0.0,
        }
    }

    pub fn term(mut self, v: VarId, coef: f64) -> Self {
        self.terms.push((v, coef));
        self
    }

    pub fn add_term(&mut self, v: VarId, coef: f64) {
        self.terms.push((v, coef));
    }

    pub fn constant(mut self, c: f64) -> Self {
        self.constant += c;
        self
    }

    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values[v.0])
            .sum::<f64>()
            + self.constant
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Le,
    Ge,
    Eq,
}

#[derive(Clone, Debug)]
pub struct LinConstraint {
    pub expr: LinExpr,
    pub cmp: Cmp,
    pub rhs: f64,
    pub family: &'static str,
}

impl LinConstraint {
    pub fn holds(&self, values: &[f64], tol: f64) -> bool {
        let lhs = self.expr.eval(values);
        match self.cmp {
            Cmp::Le => lhs <= self.rhs + tol,
            Cmp::Ge => lhs >= self.rhs - tol,
            Cmp::Eq => (lhs - self.rhs).abs() <= tol,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Maximise,
    Minimise,
}

#[derive(Clone, Debug, Default)]
pub struct LinearModel {
    vars: Vec<VarDef>,
    constraints: Vec<LinConstraint>,
    objective: LinExpr,
    sense: Sense,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binary(&mut self, family: &'static str) -> VarId {
        self.vars.push(VarDef {
            kind: VarKind::Binary,
            family,
        });
        VarId(self.vars.len() - 1)
    }

    pub fn add_integer(&mut self, family: &'static str, lower: f64, upper: f64) -> VarId {
        self.vars.push(VarDef {
            kind: VarKind::Integer { lower, upper },
            family,
        });
        VarId(self.vars.len() - 1)
    }

    pub fn add_constraint(&mut self, family: &'static str, expr: LinExpr, cmp: Cmp, rhs: f64) {
        self.constraints.push(LinConstraint {
            expr,
            cmp,
            rhs,
            family,
        });
    }

    pub fn set_objective(&mut self, sense: Sense, expr: LinExpr) {
        self.sense = sense;
        self.objective = expr;
    }

    pub fn vars(&self) -> &[VarDef] {
        &self.vars
    }

    pub fn constraints(&self) -> &[LinConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.objective.eval(values)
    }

    /// Whether `a` is a strictly better objective value than `b` under the model sense.
    pub fn improves(&self, a: f64, b: f64) -> bool {
        match self.sense {
            Sense::Maximise => a > b,
            Sense::Minimise => a < b,
        }
    }

    pub fn violated_constraints(&self, values: &[f64], tol: f64) -> Vec<&LinConstraint> {
        self.constraints
            .iter()
            .filter(|c| !c.holds(values, tol))
            .collect()
    }

    /// First variable whose value lies outside its domain.
    pub fn out_of_bounds(&self, values: &[f64], tol: f64) -> Option<(VarId, &'static str)> {
        self.vars.iter().enumerate().find_map(|(i, def)| {
            let v = values[i];
            let ok = match def.kind {
                VarKind::Binary => v >= -tol && v <= 1.0 + tol,
                VarKind::Integer { lower, upper } => v >= lower - tol && v <= upper + tol,
            };
            (!ok).then_some((VarId(i), def.family))
        })
    }

    /// Constraint count per family, in first-seen order.
    pub fn family_counts(&self) -> Vec<(&'static str, usize)> {
        let mut out: Vec<(&'static str, usize)> = Vec::new();
        for c in &self.constraints {
            match out.iter_mut().find(|(f, _)| *f == c.family) {
                Some((_, n)) => *n += 1,
                None => out.push((c.family, 1)),
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub time_limit: Duration,
    pub seed: u64,
    pub threads: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineStatus {
    Optimal,
    /// An incumbent exists but optimality was not proven within the time limit.
    Feasible,
    Infeasible,
    /// The time limit expired without an incumbent.
    Unknown,
}

#[derive(Clone, Debug)]
pub struct EngineRun {
    pub status: EngineStatus,
    /// One value per model variable; empty unless `status` carries a solution.
    pub values: Vec<f64>,
}

/// Opaque optimisation capability the driver submits models to.
///
/// Implementations own the wall-clock limit and seeding, and call
/// `on_improved` with the objective of each improving incumbent they observe.
/// An `Err` means the engine itself failed and is never retried.
pub trait SolveEngine {
    fn name(&self) -> &'static str;

    fn solve(
        &self,
        model: &LinearModel,
        settings: &EngineSettings,
        on_improved: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun>;
}

impl<E: SolveEngine + ?Sized> SolveEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn solve(
        &self,
        model: &LinearModel,
        settings: &EngineSettings,
        on_improved: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun> {
        (**self).solve(model, settings, on_improved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_checks_respect_tolerance() {
        let mut m = LinearModel::new();
        let a = m.add_binary("x");
        let b = m.add_binary("x");
        m.add_constraint("pick_one", LinExpr::sum([a, b]), Cmp::Eq, 1.0);
        m.add_constraint("cap", LinExpr::var(a).term(b, 2.0), Cmp::Le, 1.0);
        m.set_objective(Sense::Maximise, LinExpr::var(a).term(b, 3.0));

        assert!(m.violated_constraints(&[1.0, 0.0], 1e-6).is_empty());
        let bad = m.violated_constraints(&[0.0, 1.0], 1e-6);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].family, "cap");
        assert_eq!(m.evaluate(&[0.0, 1.0]), 3.0);
        assert_eq!(m.out_of_bounds(&[0.0, 2.0], 1e-6), Some((b, "x")));
        assert!(m.improves(3.0, 1.0));
        assert_eq!(m.family_counts(), vec![("pick_one", 1), ("cap", 1)]);
    }
}
