use crate::graph::{self, Coloring};
use crate::preferences::PreferenceMatrix;
use crate::problem::Problem;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};
use types::{GroupId, GroupPolarity, Instance, PairPolarity, StudentId, MAX_PREFERENCES};

fn join(ids: &[StudentId]) -> String {
    ids.iter()
        .map(|s| s.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("n_groups must be positive")]
    NoGroups,
    #[error("expected {expected} students, found {found}")]
    StudentCountMismatch { expected: u32, found: usize },
    #[error("expected {expected} groups, found {found}")]
    GroupCountMismatch { expected: u32, found: usize },
    #[error("min_group_size {min_group_size} x {n_groups} groups exceeds {n_students} students")]
    MinimumSizeTooLarge {
        min_group_size: u32,
        n_groups: u32,
        n_students: u32,
    },
    #[error("max_group_size {given} is below the computed bound {computed}")]
    MaxGroupSizeTooSmall { given: u32, computed: u32 },
    #[error("duplicate student id: {0}")]
    DuplicateStudent(StudentId),
    #[error("duplicate group id: {0}")]
    DuplicateGroup(GroupId),
    #[error("student {student} has {found} care flags, expected {expected}")]
    CareFlagCountMismatch {
        student: StudentId,
        expected: usize,
        found: usize,
    },
    #[error("{context} references unknown student {student}")]
    UnknownStudent {
        student: StudentId,
        context: String,
    },
    #[error("{context} references unknown group {group}")]
    UnknownGroup { group: GroupId, context: String },
    #[error("care flag {flag}: {total} flagged students exceed {capacity} places ({cap} per group)")]
    CareCapacityExceeded {
        flag: usize,
        total: usize,
        cap: u32,
        capacity: usize,
    },
    #[error("student {0} lists itself as a preference")]
    SelfPreference(StudentId),
    #[error("student {student} lists {peer} more than once")]
    DuplicatePreference { student: StudentId, peer: StudentId },
    #[error("student {student} lists {count} preferences, at most {max} allowed")]
    TooManyPreferences {
        student: StudentId,
        count: usize,
        max: usize,
    },
    #[error("pair constraint names {0} twice")]
    SelfPair(StudentId),
    #[error("students {first} and {second} are both must-together and must-apart")]
    ConflictingPair { first: StudentId, second: StudentId },
    #[error("student {student} is both assigned to and excluded from {group}")]
    ConflictingGroupBinding { student: StudentId, group: GroupId },
    #[error("student {student} has several must-assign targets: {first}, {second}")]
    MultipleAssignTargets {
        student: StudentId,
        first: GroupId,
        second: GroupId,
    },
    #[error("must-together students {first} ({first_group}) and {second} ({second_group}) are assigned to different groups")]
    TogetherTargetsDiffer {
        first: StudentId,
        first_group: GroupId,
        second: StudentId,
        second_group: GroupId,
    },
    #[error("student {student} must join {group} with {peer}, who is excluded from it")]
    TogetherTargetExcluded {
        student: StudentId,
        peer: StudentId,
        group: GroupId,
    },
    #[error("must-together set [{}] has {size} students, max group size is {max}", join(.students))]
    ComponentTooLarge {
        students: Vec<StudentId>,
        size: usize,
        max: usize,
    },
    #[error("must-together set [{}] holds {count} students with care flag {flag}, cap is {cap}", join(.students))]
    ComponentCareExceeded {
        students: Vec<StudentId>,
        flag: usize,
        count: usize,
        cap: u32,
    },
    #[error("students {first} and {second} must be apart but are linked by must-together constraints")]
    ApartWithinTogether { first: StudentId, second: StudentId },
    #[error("must-apart students [{}] cannot be separated into {n_groups} groups", join(.students))]
    NotSeparable {
        students: Vec<StudentId>,
        n_groups: u32,
    },
}

/// Proves or disproves that the hard constraints admit a grouping, then indexes the instance.
///
/// Checks run in a fixed order and the first failure is returned.
pub fn validate(inst: &Instance) -> Result<Problem, ValidationError> {
    let result = run_checks(inst);
    match &result {
        Ok(p) => info!(
            students = p.n_students(),
            groups = p.n_groups(),
            max_group_size = p.max_group_size,
            together = p.together.len(),
            apart = p.apart.len(),
            "instance validated"
        ),
        Err(e) => info!(error = %e, "instance rejected"),
    }
    result
}

fn run_checks(inst: &Instance) -> Result<Problem, ValidationError> {
    let spec = &inst.spec;

    // 1. structure
    if spec.n_groups == 0 {
        return Err(ValidationError::NoGroups);
    }
    if inst.students.len() != spec.n_students as usize {
        return Err(ValidationError::StudentCountMismatch {
            expected: spec.n_students,
            found: inst.students.len(),
        });
    }
    let reserved = spec.min_group_size.checked_mul(spec.n_groups);
    if reserved.map_or(true, |r| r > spec.n_students) {
        return Err(ValidationError::MinimumSizeTooLarge {
            min_group_size: spec.min_group_size,
            n_groups: spec.n_groups,
            n_students: spec.n_students,
        });
    }
    if inst.groups.len() != spec.n_groups as usize {
        return Err(ValidationError::GroupCountMismatch {
            expected: spec.n_groups,
            found: inst.groups.len(),
        });
    }
    let computed = spec.computed_max_group_size();
    if let Some(given) = spec.max_group_size {
        if given < computed {
            return Err(ValidationError::MaxGroupSizeTooSmall { given, computed });
        }
    }

    let mut student_idx: HashMap<&StudentId, usize> = HashMap::new();
    for (i, s) in inst.students.iter().enumerate() {
        if student_idx.insert(&s.id, i).is_some() {
            return Err(ValidationError::DuplicateStudent(s.id.clone()));
        }
    }
    let mut group_idx: HashMap<&GroupId, usize> = HashMap::new();
    for (i, g) in inst.groups.iter().enumerate() {
        if group_idx.insert(&g.id, i).is_some() {
            return Err(ValidationError::DuplicateGroup(g.id.clone()));
        }
    }

    let n_flags = spec.max_care.len();
    for s in &inst.students {
        if s.care.len() != n_flags {
            return Err(ValidationError::CareFlagCountMismatch {
                student: s.id.clone(),
                expected: n_flags,
                found: s.care.len(),
            });
        }
    }

    let lookup_student = |id: &StudentId, context: &str| {
        student_idx
            .get(id)
            .copied()
            .ok_or_else(|| ValidationError::UnknownStudent {
                student: id.clone(),
                context: context.to_string(),
            })
    };

    let mut pairs: Vec<(usize, usize, PairPolarity)> = Vec::with_capacity(inst.student_pairs.len());
    for p in &inst.student_pairs {
        let a = lookup_student(&p.first, "student pair")?;
        let b = lookup_student(&p.second, "student pair")?;
        pairs.push((a, b, p.polarity));
    }
    let mut bindings: Vec<(usize, usize, GroupPolarity)> =
        Vec::with_capacity(inst.group_bindings.len());
    for b in &inst.group_bindings {
        let s = lookup_student(&b.student, "group binding")?;
        let g = group_idx
            .get(&b.group)
            .copied()
            .ok_or_else(|| ValidationError::UnknownGroup {
                group: b.group.clone(),
                context: format!("group binding for {}", b.student),
            })?;
        bindings.push((s, g, b.polarity));
    }

    for (flag, &cap) in spec.max_care.iter().enumerate() {
        let total = inst.students.iter().filter(|s| s.care[flag]).count();
        let capacity = spec.n_groups as usize * cap as usize;
        if total > capacity {
            return Err(ValidationError::CareCapacityExceeded {
                flag,
                total,
                cap,
                capacity,
            });
        }
    }

    // 2. preferences
    let mut pref_lists: Vec<Vec<usize>> = Vec::with_capacity(inst.students.len());
    for (i, s) in inst.students.iter().enumerate() {
        if s.preferences.len() > MAX_PREFERENCES {
            return Err(ValidationError::TooManyPreferences {
                student: s.id.clone(),
                count: s.preferences.len(),
                max: MAX_PREFERENCES,
            });
        }
        let mut row = Vec::with_capacity(s.preferences.len());
        for peer in &s.preferences {
            let j = lookup_student(peer, &format!("preference of {}", s.id))?;
            if j == i {
                return Err(ValidationError::SelfPreference(s.id.clone()));
            }
            if row.contains(&j) {
                return Err(ValidationError::DuplicatePreference {
                    student: s.id.clone(),
                    peer: peer.clone(),
                });
            }
            row.push(j);
        }
        pref_lists.push(row);
    }
    let preferences = PreferenceMatrix::from_lists(&pref_lists);

    // 3. consistency
    let id = |i: usize| inst.students[i].id.clone();
    let gid = |g: usize| inst.groups[g].id.clone();

    let mut together: HashSet<(usize, usize)> = HashSet::new();
    let mut apart: HashSet<(usize, usize)> = HashSet::new();
    for &(a, b, polarity) in &pairs {
        if a == b {
            return Err(ValidationError::SelfPair(id(a)));
        }
        let key = (a.min(b), a.max(b));
        match polarity {
            PairPolarity::Together => together.insert(key),
            PairPolarity::Apart => apart.insert(key),
        };
    }
    let mut together: Vec<(usize, usize)> = together.into_iter().collect();
    together.sort_unstable();
    let mut apart: Vec<(usize, usize)> = apart.into_iter().collect();
    apart.sort_unstable();
    if let Some(&(a, b)) = together.iter().find(|k| apart.binary_search(k).is_ok()) {
        return Err(ValidationError::ConflictingPair {
            first: id(a),
            second: id(b),
        });
    }

    let n = inst.students.len();
    let mut assigned: Vec<Option<usize>> = vec![None; n];
    let mut excluded: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(s, g, polarity) in &bindings {
        match polarity {
            GroupPolarity::Assign => match assigned[s] {
                Some(prev) if prev != g => {
                    return Err(ValidationError::MultipleAssignTargets {
                        student: id(s),
                        first: gid(prev),
                        second: gid(g),
                    })
                }
                _ => assigned[s] = Some(g),
            },
            GroupPolarity::Exclude => {
                if !excluded[s].contains(&g) {
                    excluded[s].push(g);
                }
            }
        }
    }
    for s in 0..n {
        if let Some(g) = assigned[s] {
            if excluded[s].contains(&g) {
                return Err(ValidationError::ConflictingGroupBinding {
                    student: id(s),
                    group: gid(g),
                });
            }
        }
    }
    for &(a, b) in &together {
        if let (Some(ga), Some(gb)) = (assigned[a], assigned[b]) {
            if ga != gb {
                return Err(ValidationError::TogetherTargetsDiffer {
                    first: id(a),
                    first_group: gid(ga),
                    second: id(b),
                    second_group: gid(gb),
                });
            }
        }
    }

    let components = graph::connected_components(n, &together);
    let max_group_size = spec.max_group_size() as usize;
    for comp in components.iter().filter(|c| c.len() > 1) {
        let ids = || comp.iter().map(|&s| id(s)).collect::<Vec<_>>();
        if comp.len() > max_group_size {
            return Err(ValidationError::ComponentTooLarge {
                students: ids(),
                size: comp.len(),
                max: max_group_size,
            });
        }
        for (flag, &cap) in spec.max_care.iter().enumerate() {
            let count = comp.iter().filter(|&&s| inst.students[s].care[flag]).count();
            if count > cap as usize {
                return Err(ValidationError::ComponentCareExceeded {
                    students: ids(),
                    flag,
                    count,
                    cap,
                });
            }
        }
        let mut target: Option<(usize, usize)> = None;
        for &s in comp {
            let Some(g) = assigned[s] else { continue };
            match target {
                Some((first, tg)) if tg != g => {
                    return Err(ValidationError::TogetherTargetsDiffer {
                        first: id(first),
                        first_group: gid(tg),
                        second: id(s),
                        second_group: gid(g),
                    })
                }
                None => target = Some((s, g)),
                _ => {}
            }
        }
        if let Some((anchor, g)) = target {
            if let Some(&peer) = comp.iter().find(|&&s| excluded[s].contains(&g)) {
                return Err(ValidationError::TogetherTargetExcluded {
                    student: id(anchor),
                    peer: id(peer),
                    group: gid(g),
                });
            }
        }
    }

    let mut component_of = vec![0; n];
    for (c, members) in components.iter().enumerate() {
        for &s in members {
            component_of[s] = c;
        }
    }
    if let Some(&(a, b)) = apart
        .iter()
        .find(|&&(a, b)| component_of[a] == component_of[b])
    {
        return Err(ValidationError::ApartWithinTogether {
            first: id(a),
            second: id(b),
        });
    }

    // 4. separability, on the quotient graph so must-together students share a colour
    let quotient: Vec<(usize, usize)> = apart
        .iter()
        .map(|&(a, b)| (component_of[a], component_of[b]))
        .collect();
    let adj = graph::adjacency(components.len(), &quotient);
    debug!(
        nodes = components.len(),
        edges = quotient.len(),
        k = spec.n_groups,
        "checking must-apart separability"
    );
    if let Coloring::NotColorable { witness } = graph::is_colorable(&adj, spec.n_groups as usize) {
        let mut students: Vec<StudentId> = witness
            .iter()
            .flat_map(|&c| components[c].iter().map(|&s| id(s)))
            .collect();
        students.sort();
        return Err(ValidationError::NotSeparable {
            students,
            n_groups: spec.n_groups,
        });
    }

    Ok(Problem::new(
        inst,
        max_group_size,
        together,
        apart,
        assigned,
        excluded,
        components,
        preferences,
    ))
}
