/* standard use */
use std::collections::BTreeMap;

/* crate use */
use rustc_hash::FxHashMap;

/* private use */
use crate::NodeId;

/// Half-open copying interval [left, right) in site coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub left: usize,
    pub right: usize,
    pub parent: NodeId,
    pub child: NodeId,
    marked: bool,
}

impl Edge {
    pub fn new(left: usize, right: usize, parent: NodeId, child: NodeId) -> Edge {
        Edge {
            left,
            right,
            parent,
            child,
            marked: false,
        }
    }
}

/// Append-only store of nodes, edges and founding mutations, indexed for
/// left-to-right and right-to-left streaming of the trees it encodes.
pub struct TreeSequenceBuilder {
    num_sites: usize,
    time: Vec<f64>,
    flags: Vec<u32>,
    edges: Vec<Edge>,
    mutations: FxHashMap<usize, NodeId>,
    insertion_order: Vec<usize>,
    removal_order: Vec<usize>,
    break_polytomies: bool,
    replace_shared_recombinations: bool,
}

impl TreeSequenceBuilder {
    pub fn new(
        num_sites: usize,
        break_polytomies: bool,
        replace_shared_recombinations: bool,
    ) -> TreeSequenceBuilder {
        TreeSequenceBuilder {
            num_sites,
            time: Vec::new(),
            flags: Vec::new(),
            edges: Vec::new(),
            mutations: FxHashMap::default(),
            insertion_order: Vec::new(),
            removal_order: Vec::new(),
            break_polytomies,
            replace_shared_recombinations,
        }
    }

    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    pub fn num_nodes(&self) -> usize {
        self.time.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_mutations(&self) -> usize {
        self.mutations.len()
    }

    pub fn node_time(&self, u: NodeId) -> f64 {
        self.time[u as usize]
    }

    pub fn node_flags(&self, u: NodeId) -> u32 {
        self.flags[u as usize]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Node holding the founding '1' mutation of `site`, if any.
    pub fn mutation_at(&self, site: usize) -> Option<NodeId> {
        self.mutations.get(&site).copied()
    }

    pub(crate) fn insertion_order(&self) -> &[usize] {
        &self.insertion_order
    }

    pub(crate) fn removal_order(&self) -> &[usize] {
        &self.removal_order
    }

    pub fn add_node(&mut self, time: f64, is_sample: bool) -> NodeId {
        self.time.push(time);
        self.flags.push(is_sample as u32);
        (self.time.len() - 1) as NodeId
    }

    /// Batch insertion for one frequency class: `num_new_nodes` nodes at a
    /// common `age`, their copying edges, and the founding mutation of each
    /// focal site. Re-sorts the two edge orderings afterwards.
    pub fn update(
        &mut self,
        num_new_nodes: usize,
        age: f64,
        edges: Vec<Edge>,
        mutations: &[(usize, NodeId)],
    ) {
        for _ in 0..num_new_nodes {
            self.add_node(age, true);
        }
        self.edges.extend(edges);
        for &(s, u) in mutations {
            debug_assert!(!self.mutations.contains_key(&s));
            self.mutations.insert(s, u);
        }
        if self.break_polytomies {
            self.do_break_polytomies();
        }
        if self.replace_shared_recombinations && self.edges.len() > 1 {
            self.do_replace_shared_recombinations();
        }
        self.index_edges();
    }

    fn index_edges(&mut self) {
        let edges = &self.edges;
        let time = &self.time;
        let mut ins: Vec<usize> = (0..edges.len()).collect();
        ins.sort_by(|&a, &b| {
            edges[a].left.cmp(&edges[b].left).then(
                time[edges[a].parent as usize]
                    .partial_cmp(&time[edges[b].parent as usize])
                    .unwrap(),
            )
        });
        let mut rem: Vec<usize> = (0..edges.len()).collect();
        rem.sort_by(|&a, &b| {
            edges[a].right.cmp(&edges[b].right).then(
                time[edges[b].parent as usize]
                    .partial_cmp(&time[edges[a].parent as usize])
                    .unwrap(),
            )
        });
        self.insertion_order = ins;
        self.removal_order = rem;
    }

    /* a parent with several spans where one span carries two or more edges
     * gets an intermediate node for each such span */
    fn do_break_polytomies(&mut self) {
        let mut parents: BTreeMap<NodeId, BTreeMap<(usize, usize), Vec<usize>>> = BTreeMap::new();
        for (i, e) in self.edges.iter().enumerate() {
            parents
                .entry(e.parent)
                .or_insert_with(BTreeMap::new)
                .entry((e.left, e.right))
                .or_insert_with(Vec::new)
                .push(i);
        }
        for (parent, spans) in parents {
            if spans.len() < 2 {
                continue;
            }
            for ((left, right), group) in spans {
                if group.len() < 2 {
                    continue;
                }
                let children_time = group
                    .iter()
                    .map(|&i| self.time[self.edges[i].child as usize])
                    .fold(f64::NEG_INFINITY, f64::max);
                let parent_time = self.time[parent as usize];
                let node = self.add_node(children_time + (parent_time - children_time) / 2.0, true);
                self.edges.push(Edge::new(left, right, parent, node));
                for &i in &group {
                    self.edges[i].parent = node;
                }
                log::debug!(
                    "polytomy under node {} on [{}, {}) broken with node {}",
                    parent,
                    left,
                    right,
                    node
                );
            }
        }
    }

    /* children sharing an identical chain of (left, right, parent) segments
     * across contiguous breakpoints are factored through one new node */
    fn do_replace_shared_recombinations(&mut self) {
        let num_sites = self.num_sites;
        let mut order: Vec<usize> = (0..self.edges.len()).collect();
        order.sort_by_key(|&i| {
            let e = &self.edges[i];
            (e.left, e.right, e.parent, e.child)
        });

        /* maximal runs sharing (left, right, parent); spans covering the
         * whole sequence are never factored */
        let mut candidates: Vec<usize> = Vec::new();
        let mut start = 0;
        for j in 1..=order.len() {
            let boundary = j == order.len() || {
                let (a, b) = (&self.edges[order[j - 1]], &self.edges[order[j]]);
                (a.left, a.right, a.parent) != (b.left, b.right, b.parent)
            };
            if boundary {
                let e = &self.edges[order[start]];
                if j - start > 1 && !(e.left == 0 && e.right == num_sites) {
                    candidates.extend_from_slice(&order[start..j]);
                }
                start = j;
            }
        }
        if candidates.is_empty() {
            return;
        }

        /* contiguous breakpoint chains per child */
        candidates.sort_by_key(|&i| {
            let e = &self.edges[i];
            (e.child, e.left, e.right)
        });
        let mut chains: Vec<(usize, usize)> = Vec::new();
        let mut start = 0;
        for j in 1..=candidates.len() {
            let boundary = j == candidates.len() || {
                let (a, b) = (&self.edges[candidates[j - 1]], &self.edges[candidates[j]]);
                a.child != b.child || a.right != b.left
            };
            if boundary {
                if j - start > 1 {
                    chains.push((start, j));
                }
                start = j;
            }
        }

        type ChainKey = (Vec<usize>, Vec<usize>, Vec<NodeId>);
        let mut shared: BTreeMap<ChainKey, Vec<(usize, usize)>> = BTreeMap::new();
        for &(s, e) in &chains {
            let lefts = candidates[s..e].iter().map(|&i| self.edges[i].left).collect();
            let rights = candidates[s..e].iter().map(|&i| self.edges[i].right).collect();
            let parents = candidates[s..e].iter().map(|&i| self.edges[i].parent).collect();
            shared
                .entry((lefts, rights, parents))
                .or_insert_with(Vec::new)
                .push((s, e));
        }

        for (_, group) in &shared {
            if group.len() < 2 {
                continue;
            }
            for &(s, e) in group {
                for &i in &candidates[s..e] {
                    debug_assert!(!self.edges[i].marked);
                    self.edges[i].marked = true;
                }
            }
        }

        let before = self.edges.len();
        let mut kept: Vec<Edge> = self.edges.iter().filter(|e| !e.marked).copied().collect();
        for (_, group) in &shared {
            if group.len() < 2 {
                continue;
            }
            let mut children_time = f64::NEG_INFINITY;
            let mut parent_time = f64::INFINITY;
            for &(s, e) in group {
                for &i in &candidates[s..e] {
                    parent_time = parent_time.min(self.time[self.edges[i].parent as usize]);
                    children_time = children_time.max(self.time[self.edges[i].child as usize]);
                }
            }
            let node = self.add_node(children_time + (parent_time - children_time) / 2.0, true);
            let (s0, e0) = group[0];
            let left = self.edges[candidates[s0]].left;
            let right = self.edges[candidates[e0 - 1]].right;
            /* one edge per segment above the new node */
            for &i in &candidates[s0..e0] {
                let seg = self.edges[i];
                kept.push(Edge::new(seg.left, seg.right, seg.parent, node));
            }
            /* one edge per child over the chain's full span */
            for &(s, _) in group {
                kept.push(Edge::new(left, right, node, self.edges[candidates[s]].child));
            }
        }
        if kept.len() != before {
            log::debug!("shared recombination replacement: {} -> {} edges", before, kept.len());
        }
        self.edges = kept;
    }

    pub fn dump_nodes(&self, flags: &mut [u32], time: &mut [f64]) {
        flags.copy_from_slice(&self.flags);
        time.copy_from_slice(&self.time);
    }

    pub fn dump_edges(
        &self,
        left: &mut [f64],
        right: &mut [f64],
        parent: &mut [NodeId],
        child: &mut [NodeId],
    ) {
        for (j, e) in self.edges.iter().enumerate() {
            left[j] = e.left as f64;
            right[j] = e.right as f64;
            parent[j] = e.parent;
            child[j] = e.child;
        }
    }

    /// Founding mutations in site order; the derived state is always '1'.
    pub fn dump_mutations(&self, site: &mut [i32], node: &mut [NodeId], derived_state: &mut [u8]) {
        let mut sites: Vec<usize> = self.mutations.keys().copied().collect();
        sites.sort_unstable();
        for (j, s) in sites.iter().enumerate() {
            site[j] = *s as i32;
            node[j] = self.mutations[s];
            derived_state[j] = b'1';
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_appends_nodes_edges_mutations() {
        let mut tsb = TreeSequenceBuilder::new(4, false, false);
        tsb.update(1, 3.0, Vec::new(), &[]);
        assert_eq!(tsb.num_nodes(), 1);
        assert_eq!(tsb.num_edges(), 0);

        tsb.update(2, 2.0, vec![Edge::new(0, 4, 0, 1), Edge::new(0, 4, 0, 2)], &[(1, 1), (2, 2)]);
        assert_eq!(tsb.num_nodes(), 3);
        assert_eq!(tsb.num_edges(), 2);
        assert_eq!(tsb.num_mutations(), 2);
        assert_eq!(tsb.mutation_at(1), Some(1));
        assert_eq!(tsb.mutation_at(0), None);
        assert_eq!(tsb.node_time(0), 3.0);
        assert_eq!(tsb.node_time(2), 2.0);
        assert_eq!(tsb.node_flags(2), 1);
    }

    #[test]
    fn orderings_follow_coordinates_and_parent_times() {
        let mut tsb = TreeSequenceBuilder::new(4, false, false);
        tsb.add_node(3.0, true); /* 0 */
        tsb.add_node(2.0, true); /* 1 */
        tsb.add_node(1.0, true); /* 2 */
        tsb.update(
            0,
            0.0,
            vec![
                Edge::new(0, 4, 0, 1), /* 0: old parent */
                Edge::new(0, 2, 1, 2), /* 1: young parent */
                Edge::new(2, 4, 0, 2), /* 2 */
            ],
            &[],
        );
        /* insertion: left asc, parent time asc */
        assert_eq!(tsb.insertion_order(), &[1, 0, 2]);
        /* removal: right asc, parent time desc */
        assert_eq!(tsb.removal_order(), &[1, 0, 2]);
    }

    #[test]
    fn polytomies_get_intermediate_nodes() {
        let mut tsb = TreeSequenceBuilder::new(2, true, false);
        tsb.add_node(3.0, true); /* 0 */
        tsb.add_node(1.0, true); /* 1 */
        tsb.add_node(1.0, true); /* 2 */
        tsb.add_node(1.0, true); /* 3 */
        tsb.update(
            0,
            0.0,
            vec![
                Edge::new(0, 2, 0, 1),
                Edge::new(0, 2, 0, 2),
                Edge::new(0, 1, 0, 3),
                Edge::new(1, 2, 0, 3),
            ],
            &[],
        );
        /* the (0,2) span of parent 0 is redirected through a new node */
        assert_eq!(tsb.num_nodes(), 5);
        assert_eq!(tsb.node_time(4), 2.0);
        assert_eq!(tsb.num_edges(), 5);
        let redirected: Vec<_> = tsb
            .edges()
            .iter()
            .filter(|e| e.child == 1 || e.child == 2)
            .collect();
        assert!(redirected.iter().all(|e| e.parent == 4));
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (0, 2, 0, 4)));
        /* the single-edge spans of child 3 are untouched */
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (0, 1, 0, 3)));
    }

    #[test]
    fn shared_recombinations_are_factored() {
        let mut tsb = TreeSequenceBuilder::new(3, false, true);
        tsb.add_node(5.0, true); /* 0 */
        tsb.add_node(4.0, true); /* 1 */
        tsb.add_node(4.0, true); /* 2 */
        tsb.add_node(4.0, true); /* 3 */
        tsb.add_node(1.0, true); /* 4 */
        tsb.add_node(1.0, true); /* 5 */
        tsb.add_node(1.0, true); /* 6 */
        tsb.update(
            0,
            0.0,
            vec![
                /* ancestors copy from the root across the whole sequence */
                Edge::new(0, 3, 0, 1),
                Edge::new(0, 3, 0, 2),
                Edge::new(0, 3, 0, 3),
                /* children 4 and 5 share the breakpoint chain 1|2, child 6
                 * recombines onto a different right-hand parent */
                Edge::new(0, 1, 1, 4),
                Edge::new(1, 3, 2, 4),
                Edge::new(0, 1, 1, 5),
                Edge::new(1, 3, 2, 5),
                Edge::new(0, 1, 1, 6),
                Edge::new(1, 3, 3, 6),
            ],
            &[],
        );
        assert_eq!(tsb.num_nodes(), 8);
        let w = 7;
        assert_eq!(tsb.node_time(w), 2.5);
        /* 9 edges, minus 4 chain edges, plus 2 segments and 2 spans */
        assert_eq!(tsb.num_edges(), 9);
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (0, 1, 1, w)));
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (1, 3, 2, w)));
        for child in [4, 5] {
            assert!(tsb
                .edges()
                .iter()
                .any(|e| (e.left, e.right, e.parent, e.child) == (0, 3, w, child)));
            /* span coverage of the rerouted children is preserved */
            let total: usize = tsb
                .edges()
                .iter()
                .filter(|e| e.child == child)
                .map(|e| e.right - e.left)
                .sum();
            assert_eq!(total, 3);
        }
        /* child 6 keeps its own chain */
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (0, 1, 1, 6)));
        assert!(tsb
            .edges()
            .iter()
            .any(|e| (e.left, e.right, e.parent, e.child) == (1, 3, 3, 6)));
    }
}
