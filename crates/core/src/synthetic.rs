//! Reproducible random instances for tests and benchmarking.
//!
//! Hard constraints and the care cap are derived from a hidden planted
//! grouping, which stays a witness of feasibility.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use types::{
    Group, GroupBinding, GroupPolarity, GroupingSpec, Instance, PairPolarity, Student, StudentPair,
    MAX_PREFERENCES,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyntheticParams {
    pub n_students: u32,
    pub n_groups: u32,
    pub min_group_size: u32,
    pub grades: u32,
    pub care_rate: f64,
    /// Share of students listing at least one preference.
    pub prefs_rate: f64,
    pub together_pairs: usize,
    pub apart_pairs: usize,
    pub assign_bindings: usize,
    pub exclude_bindings: usize,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            n_students: 24,
            n_groups: 3,
            min_group_size: 6,
            grades: 2,
            care_rate: 0.15,
            prefs_rate: 0.8,
            together_pairs: 2,
            apart_pairs: 2,
            assign_bindings: 1,
            exclude_bindings: 1,
        }
    }
}

pub fn generate(params: &SyntheticParams, seed: u64) -> Instance {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = params.n_students as usize;
    let k = params.n_groups.max(1) as usize;
    let min_group_size = params.min_group_size.min(params.n_students / k as u32);

    let mut students: Vec<Student> = (0..n)
        .map(|i| Student {
            id: format!("S_{:02}", i + 1).as_str().into(),
            gender: if rng.gen_bool(0.5) { "boy" } else { "girl" }.to_string(),
            grade: rng.gen_range(1..=params.grades.max(1)),
            care: vec![rng.gen_bool(params.care_rate.clamp(0.0, 1.0))],
            behavior: None,
            learning: None,
            combination: None,
            preferences: Vec::new(),
        })
        .collect();
    let groups: Vec<Group> = (0..k)
        .map(|g| Group {
            id: format!("T_{:02}", g + 1).as_str().into(),
        })
        .collect();

    // planted grouping: shuffled students dealt round-robin
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let mut planted = vec![0usize; n];
    for (pos, &s) in order.iter().enumerate() {
        planted[s] = pos % k;
    }
    let mut care_per_group = vec![0u32; k];
    for s in 0..n {
        if students[s].care[0] {
            care_per_group[planted[s]] += 1;
        }
    }
    let max_care = care_per_group.iter().copied().max().unwrap_or(0).max(1);

    for i in 0..n {
        if n < 2 || !rng.gen_bool(params.prefs_rate.clamp(0.0, 1.0)) {
            continue;
        }
        let count = rng.gen_range(1..=MAX_PREFERENCES.min(n - 1));
        let mut peers: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        peers.shuffle(&mut rng);
        let prefs = peers[..count]
            .iter()
            .map(|&j| students[j].id.clone())
            .collect();
        students[i].preferences = prefs;
    }

    let mut student_pairs = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut draw_pair = |rng: &mut ChaCha8Rng, same: bool| -> Option<(usize, usize)> {
        for _ in 0..64 {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            if a == b || (planted[a] == planted[b]) != same {
                continue;
            }
            let key = (a.min(b), a.max(b));
            if seen.insert(key) {
                return Some(key);
            }
        }
        None
    };
    if n >= 2 {
        for _ in 0..params.together_pairs {
            if let Some((a, b)) = draw_pair(&mut rng, true) {
                student_pairs.push(pair(&students, a, b, PairPolarity::Together));
            }
        }
        if k > 1 {
            for _ in 0..params.apart_pairs {
                if let Some((a, b)) = draw_pair(&mut rng, false) {
                    student_pairs.push(pair(&students, a, b, PairPolarity::Apart));
                }
            }
        }
    }
    let mut group_bindings = Vec::new();
    let mut bound = std::collections::HashSet::new();
    for _ in 0..params.assign_bindings.min(n) {
        let s = rng.gen_range(0..n);
        if bound.insert(s) {
            group_bindings.push(GroupBinding {
                student: students[s].id.clone(),
                group: groups[planted[s]].id.clone(),
                polarity: GroupPolarity::Assign,
            });
        }
    }
    if k > 1 {
        for _ in 0..params.exclude_bindings.min(n) {
            let s = rng.gen_range(0..n);
            if !bound.insert(s) {
                continue;
            }
            let other = (planted[s] + rng.gen_range(1..k)) % k;
            group_bindings.push(GroupBinding {
                student: students[s].id.clone(),
                group: groups[other].id.clone(),
                polarity: GroupPolarity::Exclude,
            });
        }
    }

    Instance {
        spec: GroupingSpec {
            n_students: n as u32,
            n_groups: k as u32,
            min_group_size,
            max_care: vec![max_care],
            max_group_size: None,
        },
        students,
        groups,
        student_pairs,
        group_bindings,
    }
}

fn pair(students: &[Student], a: usize, b: usize, polarity: PairPolarity) -> StudentPair {
    StudentPair {
        first: students[a].id.clone(),
        second: students[b].id.clone(),
        polarity,
    }
}
