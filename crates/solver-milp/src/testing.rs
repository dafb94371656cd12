use crate::model::{EngineRun, EngineSettings, EngineStatus, LinearModel, SolveEngine};
use grouping_core::problem::{Assignment, Problem};
use grouping_core::validate;
use std::cell::RefCell;
use std::collections::VecDeque;
use types::{Group, GroupingSpec, Instance, PairPolarity, Student, StudentPair};

pub(crate) enum Step {
    Solve {
        incumbents: Vec<f64>,
        assignment: Assignment,
        optimal: bool,
    },
    Infeasible,
    Timeout,
    Fail(&'static str),
}

/// Plays back one step per call; an exhausted script answers infeasible.
pub(crate) struct ScriptedEngine {
    steps: RefCell<VecDeque<Step>>,
    /// `(min_prefs rows, balance_min rows)` of every submitted model.
    pub seen: RefCell<Vec<(usize, usize)>>,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: RefCell::new(steps.into()),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl SolveEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn solve(
        &self,
        model: &LinearModel,
        _: &EngineSettings,
        on_improved: &mut dyn FnMut(f64),
    ) -> anyhow::Result<EngineRun> {
        let rows = |fam: &str| model.constraints().iter().filter(|c| c.family == fam).count();
        self.seen
            .borrow_mut()
            .push((rows("min_prefs"), rows("balance_min")));
        let step = self.steps.borrow_mut().pop_front().unwrap_or(Step::Infeasible);
        match step {
            Step::Solve {
                incumbents,
                assignment,
                optimal,
            } => {
                for v in incumbents {
                    on_improved(v);
                }
                let n = assignment.group_of.len();
                let k = model.vars().iter().filter(|v| v.family == "assign").count() / n;
                let mut values = vec![0.0; model.vars().len()];
                for (s, &g) in assignment.group_of.iter().enumerate() {
                    values[s * k + g] = 1.0;
                }
                Ok(EngineRun {
                    status: if optimal {
                        EngineStatus::Optimal
                    } else {
                        EngineStatus::Feasible
                    },
                    values,
                })
            }
            Step::Infeasible => Ok(EngineRun {
                status: EngineStatus::Infeasible,
                values: vec![],
            }),
            Step::Timeout => Ok(EngineRun {
                status: EngineStatus::Unknown,
                values: vec![],
            }),
            Step::Fail(msg) => anyhow::bail!("{msg}"),
        }
    }
}

fn student(id: &str, gender: &str, prefs: &[&str]) -> Student {
    Student {
        id: id.into(),
        gender: gender.into(),
        grade: 1,
        care: vec![false],
        behavior: None,
        learning: None,
        combination: None,
        preferences: prefs.iter().map(|&p| p.into()).collect(),
    }
}

/// A and B together, C and D apart, A prefers C, E prefers F; two groups, sizes 2..=4.
pub(crate) fn six_instance() -> Instance {
    Instance {
        students: vec![
            student("A", "girl", &["C"]),
            student("B", "boy", &[]),
            student("C", "girl", &[]),
            student("D", "boy", &[]),
            student("E", "girl", &["F"]),
            student("F", "boy", &[]),
        ],
        groups: vec![Group { id: "G1".into() }, Group { id: "G2".into() }],
        student_pairs: vec![
            StudentPair {
                first: "A".into(),
                second: "B".into(),
                polarity: PairPolarity::Together,
            },
            StudentPair {
                first: "C".into(),
                second: "D".into(),
                polarity: PairPolarity::Apart,
            },
        ],
        group_bindings: vec![],
        spec: GroupingSpec {
            n_students: 6,
            n_groups: 2,
            min_group_size: 2,
            max_care: vec![1],
            max_group_size: Some(4),
        },
    }
}

pub(crate) fn six_problem() -> Problem {
    validate(&six_instance()).expect("fixture is valid")
}
