//! Union-find components and k-colouring over small undirected graphs.
//!
//! Nodes are dense indices `0..n`. Edges are unordered pairs; duplicates and
//! self-loops are tolerated and ignored where they carry no information.

/// Disjoint-set forest with union by size and path halving.
#[derive(Clone, Debug)]
pub struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns `false` when both nodes were already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

/// Partition of `0..n` induced by `pairs`.
///
/// Every node appears exactly once; isolated nodes form singleton sets.
/// Members are ascending and sets are ordered by their smallest member.
pub fn connected_components(n: usize, pairs: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut sets = DisjointSets::new(n);
    for &(a, b) in pairs {
        sets.union(a, b);
    }
    let mut slot_of_root = vec![usize::MAX; n];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for v in 0..n {
        let r = sets.find(v);
        if slot_of_root[r] == usize::MAX {
            slot_of_root[r] = components.len();
            components.push(Vec::new());
        }
        components[slot_of_root[r]].push(v);
    }
    components
}

/// Adjacency lists for an undirected graph on `0..n`, without self-loops or repeats.
pub fn adjacency(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut adj = vec![Vec::new(); n];
    for &(a, b) in edges {
        if a == b {
            continue;
        }
        adj[a].push(b);
        adj[b].push(a);
    }
    for list in &mut adj {
        list.sort_unstable();
        list.dedup();
    }
    adj
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coloring {
    /// A proper colouring, one colour in `0..k` per node.
    Colorable(Vec<usize>),
    /// Nodes of the connected component on which the search ran out of colourings.
    /// Diagnostic only; not a minimal core.
    NotColorable { witness: Vec<usize> },
}

impl Coloring {
    pub fn is_colorable(&self) -> bool {
        matches!(self, Coloring::Colorable(_))
    }
}

/// Decides whether the graph admits a proper `k`-colouring.
///
/// Backtracking with forward checking, most-constrained node first, and
/// colour symmetry breaking (a node may only open the next unused colour).
/// Components are searched independently.
pub fn is_colorable(adjacency: &[Vec<usize>], k: usize) -> Coloring {
    let n = adjacency.len();
    let edges: Vec<(usize, usize)> = adjacency
        .iter()
        .enumerate()
        .flat_map(|(v, ns)| ns.iter().map(move |&u| (v, u)))
        .collect();
    let components = connected_components(n, &edges);

    if k == 0 {
        return match components.into_iter().next() {
            Some(first) => Coloring::NotColorable { witness: first },
            None => Coloring::Colorable(Vec::new()),
        };
    }

    let mut search = Search {
        adjacency,
        k,
        colors: vec![None; n],
        forbidden: vec![vec![0; k]; n],
    };
    for comp in &components {
        if !search.run(comp, 0) {
            tracing::debug!(size = comp.len(), k, "component is not colorable");
            return Coloring::NotColorable {
                witness: comp.clone(),
            };
        }
    }
    Coloring::Colorable(search.colors.into_iter().map(|c| c.unwrap_or(0)).collect())
}

struct Search<'a> {
    adjacency: &'a [Vec<usize>],
    k: usize,
    colors: Vec<Option<usize>>,
    /// `forbidden[v][c]` counts coloured neighbours of `v` holding colour `c`.
    forbidden: Vec<Vec<u32>>,
}

impl Search<'_> {
    fn available(&self, v: usize) -> usize {
        self.forbidden[v].iter().filter(|&&f| f == 0).count()
    }

    fn pick(&self, nodes: &[usize]) -> Option<usize> {
        nodes
            .iter()
            .copied()
            .filter(|&v| self.colors[v].is_none())
            .min_by_key(|&v| (self.available(v), usize::MAX - self.adjacency[v].len()))
    }

    /// Colours `v` and reports whether every uncoloured neighbour kept a colour.
    fn assign(&mut self, v: usize, c: usize) -> bool {
        self.colors[v] = Some(c);
        let mut ok = true;
        for &u in &self.adjacency[v] {
            self.forbidden[u][c] += 1;
            if self.colors[u].is_none() && self.forbidden[u][c] == 1 && self.available(u) == 0 {
                ok = false;
            }
        }
        ok
    }

    fn unassign(&mut self, v: usize, c: usize) {
        self.colors[v] = None;
        for &u in &self.adjacency[v] {
            self.forbidden[u][c] -= 1;
        }
    }

    fn run(&mut self, nodes: &[usize], used: usize) -> bool {
        let Some(v) = self.pick(nodes) else {
            return true;
        };
        let limit = (used + 1).min(self.k);
        for c in 0..limit {
            if self.forbidden[v][c] != 0 {
                continue;
            }
            let ok = self.assign(v, c);
            if ok && self.run(nodes, used.max(c + 1)) {
                return true;
            }
            self.unassign(v, c);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cycle(n: usize) -> Vec<(usize, usize)> {
        (0..n).map(|i| (i, (i + 1) % n)).collect()
    }

    fn proper(adj: &[Vec<usize>], colors: &[usize], k: usize) -> bool {
        adj.iter().enumerate().all(|(v, ns)| {
            colors[v] < k && ns.iter().all(|&u| colors[u] != colors[v])
        })
    }

    #[test]
    fn singletons_are_components() {
        let comps = connected_components(5, &[(0, 3), (3, 4)]);
        assert_eq!(comps, vec![vec![0, 3, 4], vec![1], vec![2]]);
    }

    #[test]
    fn odd_cycle_needs_three_colours() {
        let adj = adjacency(5, &cycle(5));
        match is_colorable(&adj, 2) {
            Coloring::NotColorable { witness } => assert_eq!(witness, vec![0, 1, 2, 3, 4]),
            other => panic!("expected failure, got {other:?}"),
        }
        let Coloring::Colorable(colors) = is_colorable(&adj, 3) else {
            panic!("5-cycle is 3-colorable");
        };
        assert!(proper(&adj, &colors, 3));
    }

    #[test]
    fn witness_is_the_failing_component_only() {
        // 0-1 edge plus triangle 2-3-4
        let adj = adjacency(5, &[(0, 1), (2, 3), (3, 4), (4, 2)]);
        assert_eq!(
            is_colorable(&adj, 2),
            Coloring::NotColorable {
                witness: vec![2, 3, 4]
            }
        );
    }

    #[test]
    fn complete_graph_bound() {
        let mut edges = Vec::new();
        for a in 0..4 {
            for b in a + 1..4 {
                edges.push((a, b));
            }
        }
        let adj = adjacency(4, &edges);
        assert!(!is_colorable(&adj, 3).is_colorable());
        assert!(is_colorable(&adj, 4).is_colorable());
    }

    #[test]
    fn zero_colours() {
        assert!(is_colorable(&[], 0).is_colorable());
        assert!(!is_colorable(&[vec![]], 0).is_colorable());
    }

    fn brute_force(n: usize, edges: &[(usize, usize)], k: usize) -> bool {
        let total = k.pow(n as u32);
        (0..total).any(|mut code| {
            let mut colors = vec![0; n];
            for c in colors.iter_mut() {
                *c = code % k;
                code /= k;
            }
            edges.iter().all(|&(a, b)| a == b || colors[a] != colors[b])
        })
    }

    proptest! {
        #[test]
        fn components_partition_and_respect_pairs(
            n in 1usize..20,
            raw in prop::collection::vec((0usize..20, 0usize..20), 0..30),
        ) {
            let pairs: Vec<_> = raw.into_iter().map(|(a, b)| (a % n, b % n)).collect();
            let comps = connected_components(n, &pairs);
            let mut seen = vec![0; n];
            let mut comp_of = vec![0; n];
            for (i, c) in comps.iter().enumerate() {
                for &v in c {
                    seen[v] += 1;
                    comp_of[v] = i;
                }
            }
            prop_assert!(seen.iter().all(|&s| s == 1));
            for (a, b) in pairs {
                prop_assert_eq!(comp_of[a], comp_of[b]);
            }
        }

        #[test]
        fn colouring_agrees_with_brute_force(
            n in 1usize..7,
            k in 1usize..4,
            raw in prop::collection::vec((0usize..7, 0usize..7), 0..14),
        ) {
            let edges: Vec<_> = raw.into_iter().map(|(a, b)| (a % n, b % n)).collect();
            let adj = adjacency(n, &edges);
            let expected = brute_force(n, &edges, k);
            match is_colorable(&adj, k) {
                Coloring::Colorable(colors) => {
                    prop_assert!(expected);
                    prop_assert!(proper(&adj, &colors, k));
                }
                Coloring::NotColorable { witness } => {
                    prop_assert!(!expected);
                    prop_assert!(!witness.is_empty());
                }
            }
        }
    }
}
