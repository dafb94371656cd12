use crate::preferences::PreferenceMatrix;
use std::collections::BTreeMap;
use types::{BalanceAttribute, GroupId, Instance, Placement, Student, StudentId};

/// Per-group cap on students carrying one care flag.
#[derive(Clone, Debug)]
pub struct CareFlag {
    pub cap: usize,
    pub members: Vec<usize>,
}

/// Students sharing one value of a balanced attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub attribute: BalanceAttribute,
    pub value: String,
    pub members: Vec<usize>,
}

impl Category {
    pub fn label(&self) -> String {
        format!("{}={}", self.attribute, self.value)
    }
}

/// Validated instance rewritten over dense indices.
///
/// Built once by [`crate::validate`] and shared read-only by every phase and attempt.
#[derive(Clone, Debug)]
pub struct Problem {
    pub student_ids: Vec<StudentId>,
    pub group_ids: Vec<GroupId>,
    pub min_group_size: usize,
    pub max_group_size: usize,
    pub care: Vec<CareFlag>,
    /// Must-together pairs, `(lo, hi)`.
    pub together: Vec<(usize, usize)>,
    /// Must-apart pairs, `(lo, hi)`.
    pub apart: Vec<(usize, usize)>,
    /// Forced group per student.
    pub assigned: Vec<Option<usize>>,
    /// `excluded[s]` lists the groups `s` may not join.
    pub excluded: Vec<Vec<usize>>,
    /// Must-together components, singletons included.
    pub components: Vec<Vec<usize>>,
    pub component_of: Vec<usize>,
    pub preferences: PreferenceMatrix,
    students: Vec<Student>,
}

impl Problem {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        inst: &Instance,
        max_group_size: usize,
        together: Vec<(usize, usize)>,
        apart: Vec<(usize, usize)>,
        assigned: Vec<Option<usize>>,
        excluded: Vec<Vec<usize>>,
        components: Vec<Vec<usize>>,
        preferences: PreferenceMatrix,
    ) -> Self {
        let care = inst
            .spec
            .max_care
            .iter()
            .enumerate()
            .map(|(f, &cap)| CareFlag {
                cap: cap as usize,
                members: inst
                    .students
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.care.get(f).copied().unwrap_or(false))
                    .map(|(i, _)| i)
                    .collect(),
            })
            .collect();
        let mut component_of = vec![0; inst.students.len()];
        for (c, members) in components.iter().enumerate() {
            for &s in members {
                component_of[s] = c;
            }
        }
        Self {
            student_ids: inst.students.iter().map(|s| s.id.clone()).collect(),
            group_ids: inst.groups.iter().map(|g| g.id.clone()).collect(),
            min_group_size: inst.spec.min_group_size as usize,
            max_group_size,
            care,
            together,
            apart,
            assigned,
            excluded,
            components,
            component_of,
            preferences,
            students: inst.students.clone(),
        }
    }

    pub fn n_students(&self) -> usize {
        self.student_ids.len()
    }

    pub fn n_groups(&self) -> usize {
        self.group_ids.len()
    }

    pub fn student(&self, s: usize) -> &Student {
        &self.students[s]
    }

    pub fn has_care_flag(&self, s: usize) -> bool {
        self.students[s].care.iter().any(|&c| c)
    }

    pub fn is_excluded(&self, s: usize, g: usize) -> bool {
        self.excluded[s].contains(&g)
    }

    /// Category partition for the requested attributes.
    ///
    /// Values are listed in sorted order; optional flags contribute only the students
    /// that carry them, and an attribute nobody carries yields no categories.
    pub fn categories(&self, attributes: &[BalanceAttribute]) -> Vec<Category> {
        let mut out = Vec::new();
        for &attribute in attributes {
            if attribute == BalanceAttribute::Care {
                for f in 0..self.care.len() {
                    let values = self.students.iter().map(|s| s.care.get(f).copied());
                    push_categories(&mut out, attribute, values, |v| format!("{f}:{v}"));
                }
                continue;
            }
            let values: Vec<Option<String>> = self
                .students
                .iter()
                .map(|s| match attribute {
                    BalanceAttribute::Gender => Some(s.gender.clone()),
                    BalanceAttribute::Grade => Some(s.grade.to_string()),
                    BalanceAttribute::Behavior => s.behavior.map(|b| b.to_string()),
                    BalanceAttribute::Learning => s.learning.map(|b| b.to_string()),
                    BalanceAttribute::Combination => s.combination.map(|b| b.to_string()),
                    BalanceAttribute::Care => None,
                })
                .collect();
            push_categories(&mut out, attribute, values.into_iter(), |v| v);
        }
        out
    }

    /// Group index by id.
    pub fn group_index(&self, id: &GroupId) -> Option<usize> {
        self.group_ids.iter().position(|g| g == id)
    }

    pub fn student_index(&self, id: &StudentId) -> Option<usize> {
        self.student_ids.iter().position(|s| s == id)
    }
}

fn push_categories<V: Ord, I: Iterator<Item = Option<V>>>(
    out: &mut Vec<Category>,
    attribute: BalanceAttribute,
    values: I,
    label: impl Fn(V) -> String,
) {
    let mut by_value: BTreeMap<V, Vec<usize>> = BTreeMap::new();
    for (s, v) in values.enumerate() {
        if let Some(v) = v {
            by_value.entry(v).or_default().push(s);
        }
    }
    out.extend(by_value.into_iter().map(|(v, members)| Category {
        attribute,
        value: label(v),
        members,
    }));
}

/// Total map from student index to group index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub group_of: Vec<usize>,
}

impl Assignment {
    pub fn new(group_of: Vec<usize>) -> Self {
        Self { group_of }
    }

    pub fn members(&self, n_groups: usize) -> Vec<Vec<usize>> {
        let mut out = vec![Vec::new(); n_groups];
        for (s, &g) in self.group_of.iter().enumerate() {
            if g < n_groups {
                out[g].push(s);
            }
        }
        out
    }

    pub fn sizes(&self, n_groups: usize) -> Vec<usize> {
        let mut out = vec![0; n_groups];
        for &g in &self.group_of {
            if g < n_groups {
                out[g] += 1;
            }
        }
        out
    }

    /// Student-to-group records ordered by group, then by student.
    pub fn placements(&self, problem: &Problem) -> Vec<Placement> {
        let mut order: Vec<usize> = (0..self.group_of.len()).collect();
        order.sort_by_key(|&s| (self.group_of[s], s));
        order
            .into_iter()
            .filter_map(|s| {
                problem.group_ids.get(self.group_of[s]).map(|g| Placement {
                    student: problem.student_ids[s].clone(),
                    group: g.clone(),
                })
            })
            .collect()
    }

    /// Inverse of [`Assignment::placements`]; `None` when a student is missing or unknown.
    pub fn from_placements(problem: &Problem, placements: &[Placement]) -> Option<Self> {
        let mut group_of = vec![usize::MAX; problem.n_students()];
        for p in placements {
            let s = problem.student_index(&p.student)?;
            group_of[s] = problem.group_index(&p.group)?;
        }
        if group_of.iter().any(|&g| g == usize::MAX) {
            return None;
        }
        Some(Self { group_of })
    }
}
