use crate::model::{
    Cmp, EngineRun, EngineSettings, EngineStatus, LinExpr, LinearModel, Sense, SolveEngine,
    VarKind,
};
use anyhow::anyhow;
use good_lp::{variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use std::time::Instant;
use tracing::{debug, info};

#[cfg(feature = "with-milp")]
const BACKEND: &str = "coin_cbc";
#[cfg(not(feature = "with-milp"))]
const BACKEND: &str = "microlp";

/// `good_lp` adapter. CBC when built with `with-milp`, the pure-Rust microlp otherwise.
///
/// microlp ignores the time limit and is meant for small models only; it is never
/// returned by [`crate::default_engine`]. Neither backend exposes an incumbent hook
/// through `good_lp`, so `on_improved` is never called and the driver records the
/// final incumbent alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoodLpEngine;

fn to_expression(e: &LinExpr, vars: &[Variable]) -> Expression {
    let mut out = Expression::with_capacity(e.terms.len());
    for &(v, c) in &e.terms {
        out.add_mul(c, vars[v.0]);
    }
    out += e.constant;
    out
}

impl SolveEngine for GoodLpEngine {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn solve(
        &self,
        model: &LinearModel,
        settings: &EngineSettings,
        _on_improved: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun> {
        let mut pv = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .vars()
            .iter()
            .map(|d| match d.kind {
                VarKind::Binary => pv.add(variable().binary()),
                VarKind::Integer { lower, upper } => {
                    pv.add(variable().integer().min(lower).max(upper))
                }
            })
            .collect();
        let objective = to_expression(model.objective(), &vars);
        let unsolved = match model.sense() {
            Sense::Maximise => pv.maximise(objective),
            Sense::Minimise => pv.minimise(objective),
        };

        #[cfg(feature = "with-milp")]
        let mut problem = {
            let mut p = unsolved.using(good_lp::solvers::coin_cbc::coin_cbc);
            p.set_parameter("log", "0");
            p.set_parameter("timeMode", "elapsed");
            p.set_parameter("seconds", &settings.time_limit.as_secs().max(1).to_string());
            p.set_parameter("threads", &settings.threads.max(1).to_string());
            p.set_parameter("randomCbcSeed", &(settings.seed % i32::MAX as u64).to_string());
            p
        };
        #[cfg(not(feature = "with-milp"))]
        let mut problem = {
            tracing::warn!(
                time_limit_sec = settings.time_limit.as_secs(),
                "microlp has no time limit or seed; running to completion"
            );
            unsolved.using(good_lp::solvers::microlp::microlp)
        };

        for c in model.constraints() {
            let lhs = to_expression(&c.expr, &vars);
            let constraint = match c.cmp {
                Cmp::Le => lhs.leq(c.rhs),
                Cmp::Ge => lhs.geq(c.rhs),
                Cmp::Eq => lhs.eq(c.rhs),
            };
            problem = problem.with(constraint);
        }

        info!(
            backend = BACKEND,
            vars = vars.len(),
            constraints = model.constraints().len(),
            "submitting model"
        );
        debug!("backend exposes no incumbent hook; only the final solution is reported");
        let started = Instant::now();
        let result = problem.solve();
        let timed_out = started.elapsed() >= settings.time_limit;

        match result {
            Ok(sol) => Ok(EngineRun {
                status: if timed_out {
                    EngineStatus::Feasible
                } else {
                    EngineStatus::Optimal
                },
                values: vars.iter().map(|&v| sol.value(v)).collect(),
            }),
            Err(ResolutionError::Infeasible) => Ok(EngineRun {
                status: EngineStatus::Infeasible,
                values: Vec::new(),
            }),
            Err(_) if timed_out => Ok(EngineRun {
                status: EngineStatus::Unknown,
                values: Vec::new(),
            }),
            Err(e) => Err(anyhow!(e).context(format!("{BACKEND} failed"))),
        }
    }
}
