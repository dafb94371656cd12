/// Directed "wants to be with" relation over student indices.
///
/// Entry `(i, j)` is set iff student `i` listed student `j`. No symmetry is assumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreferenceMatrix {
    n: usize,
    cells: Vec<bool>,
    rows: Vec<Vec<usize>>,
}

impl PreferenceMatrix {
    /// Builds the matrix from per-student lists of preferred indices.
    /// Self references and repeats are dropped.
    pub fn from_lists(lists: &[Vec<usize>]) -> Self {
        let n = lists.len();
        let mut cells = vec![false; n * n];
        let mut rows = vec![Vec::new(); n];
        for (i, prefs) in lists.iter().enumerate() {
            for &j in prefs {
                if j == i || j >= n || cells[i * n + j] {
                    continue;
                }
                cells[i * n + j] = true;
                rows[i].push(j);
            }
        }
        Self { n, cells, rows }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.n + j]
    }

    /// Preferred peers of `i`, in the order they were listed.
    pub fn preferred(&self, i: usize) -> &[usize] {
        &self.rows[i]
    }

    pub fn count(&self, i: usize) -> usize {
        self.rows[i].len()
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().map(move |&j| (i, j)))
    }

    pub fn edge_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Largest number of preferences listed by any student (`k_max`).
    pub fn max_preferences(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Unordered pairs joined by an edge in at least one direction, each reported once as `(lo, hi)`.
    pub fn interest_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = self
            .edges()
            .map(|(i, j)| if i < j { (i, j) } else { (j, i) })
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sided_entries() {
        let m = PreferenceMatrix::from_lists(&[vec![2], vec![], vec![0, 1], vec![]]);
        assert!(m.get(0, 2));
        assert!(m.get(2, 0));
        assert!(m.get(2, 1));
        assert!(!m.get(1, 2));
        assert_eq!(m.edge_count(), 3);
        assert_eq!(m.max_preferences(), 2);
        assert_eq!(m.interest_pairs(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn drops_self_and_repeats() {
        let m = PreferenceMatrix::from_lists(&[vec![0, 1, 1], vec![]]);
        assert_eq!(m.preferred(0), &[1]);
        assert!(!m.get(0, 0));
    }
}
