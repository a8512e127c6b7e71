/* crate use */
use rustc_hash::FxHashMap;

/* private use */
use crate::builder::{Edge, TreeSequenceBuilder};
use crate::error::InferError;
use crate::{NodeId, NULL_NODE};

/// A copying path through the current tree sequence: the edges partition
/// [0, num_sites) and `matched` is the haplotype the path implies, so the
/// caller can diff it against the target to place mutations.
#[derive(Clone, Debug)]
pub struct PathMatch {
    pub edges: Vec<Edge>,
    pub matched: Vec<u8>,
}

/// Viterbi decoder for the Li-Stephens copying model over the trees held
/// by a [`TreeSequenceBuilder`].
///
/// Likelihoods are kept sparsely: a node carries an entry only where its
/// value differs from its nearest ancestor's, so per-site work scales with
/// the tree structure rather than the node count.
pub struct AncestorMatcher<'a> {
    builder: &'a TreeSequenceBuilder,
    recombination_rate: &'a [f64],
    error_rate: f64,
}

/// True iff `v` lies on the path from `u` to its root.
fn is_descendant(pi: &[NodeId], mut u: NodeId, v: NodeId) -> bool {
    while u != v && u != NULL_NODE {
        u = pi[u as usize];
    }
    u == v
}

/* value of u, inheriting from the nearest ancestor holding an entry */
fn lookup(lk: &FxHashMap<NodeId, f64>, pi: &[NodeId], mut u: NodeId) -> f64 {
    while !lk.contains_key(&u) {
        u = pi[u as usize];
    }
    lk[&u]
}

/* lowest node id at the likelihood maximum */
fn best_node(lk: &FxHashMap<NodeId, f64>) -> NodeId {
    lk.iter()
        .filter(|&(_, &v)| v == 1.0)
        .map(|(&u, _)| u)
        .min()
        .unwrap()
}

impl<'a> AncestorMatcher<'a> {
    pub fn new(
        builder: &'a TreeSequenceBuilder,
        recombination_rate: &'a [f64],
        error_rate: f64,
    ) -> AncestorMatcher<'a> {
        assert_eq!(recombination_rate.len(), builder.num_sites());
        AncestorMatcher {
            builder,
            recombination_rate,
            error_rate,
        }
    }

    fn emission(&self, observed: u8, descendant: bool) -> f64 {
        let hit = (observed == 1) == descendant;
        if self.error_rate == 0.0 {
            if hit {
                1.0
            } else {
                0.0
            }
        } else if hit {
            1.0 - self.error_rate
        } else {
            self.error_rate
        }
    }

    /// Find a maximum-likelihood copying path for `h`, to be recorded as
    /// edges with child `child`. `h` must hold one value per site.
    pub fn find_path(&self, child: NodeId, h: &[u8]) -> Result<PathMatch, InferError> {
        let num_sites = self.builder.num_sites();
        assert_eq!(h.len(), num_sites);
        let num_nodes = self.builder.num_nodes();
        let num_edges = self.builder.num_edges();
        let edges = self.builder.edges();
        let ins = self.builder.insertion_order();
        let rem = self.builder.removal_order();

        let mut pi: Vec<NodeId> = vec![NULL_NODE; num_nodes];
        let mut lk: FxHashMap<NodeId, f64> =
            (0..num_nodes as NodeId).map(|u| (u, 1.0)).collect();
        let mut traceback: Vec<FxHashMap<NodeId, f64>> = vec![FxHashMap::default(); num_sites];

        /* forward pass: stream the trees left to right */
        let mut j = 0;
        let mut k = 0;
        while j < num_edges {
            let left = edges[ins[j]].left;
            while k < num_edges && edges[rem[k]].right == left {
                let e = &edges[rem[k]];
                k += 1;
                pi[e.child as usize] = NULL_NODE;
                /* leaving the tree must not change the child's value */
                if !lk.contains_key(&e.child) {
                    let value = lookup(&lk, &pi, e.parent);
                    lk.insert(e.child, value);
                }
            }
            let right = edges[rem[k]].right;
            while j < num_edges && edges[ins[j]].left == left {
                let e = &edges[ins[j]];
                pi[e.child as usize] = e.parent;
                j += 1;
                /* the child's entry is redundant once it matches what it
                 * now inherits */
                if lk[&e.child] == lookup(&lk, &pi, e.parent) {
                    lk.remove(&e.child);
                }
            }

            for site in left..right {
                let mutation_node = match self.builder.mutation_at(site) {
                    Some(u) => u,
                    None => {
                        traceback[site] = lk.clone();
                        continue;
                    }
                };
                if !lk.contains_key(&mutation_node) {
                    let value = lookup(&lk, &pi, mutation_node);
                    lk.insert(mutation_node, value);
                }
                traceback[site] = lk.clone();

                let n = num_nodes as f64;
                let r = 1.0 - (-self.recombination_rate[site] / n).exp();
                let recomb = r / n;
                let no_recomb = 1.0 - r + recomb;

                let mut max_lk = -1.0;
                for (&v, value) in lk.iter_mut() {
                    let x = *value * no_recomb;
                    let z = if x > recomb { x } else { recomb };
                    *value = z * self.emission(h[site], is_descendant(&pi, v, mutation_node));
                    if *value > max_lk {
                        max_lk = *value;
                    }
                }
                if max_lk <= 0.0 {
                    return Err(InferError::MatchingCollapse { site });
                }
                for value in lk.values_mut() {
                    *value /= max_lk;
                }

                /* re-compress; entries at detached nodes always stay */
                let mut compressed = FxHashMap::default();
                for (&u, &value) in lk.iter() {
                    if pi[u as usize] == NULL_NODE || lookup(&lk, &pi, pi[u as usize]) != value {
                        compressed.insert(u, value);
                    }
                }
                lk = compressed;
            }
        }

        log::trace!(
            "find_path: child {}, mean traceback size {:.1}",
            child,
            traceback.iter().map(|t| t.len()).sum::<usize>() as f64 / num_sites as f64
        );

        /* backward pass: stream the trees right to left, switching parents
         * wherever the stored likelihood of the current one drops below
         * the maximum */
        for p in pi.iter_mut() {
            *p = NULL_NODE;
        }
        let mut matched = vec![0u8; num_sites];
        let mut out: Vec<Edge> = Vec::new();
        let mut cur = Edge::new(0, num_sites, best_node(&lk), child);

        let mut j = num_edges as isize - 1;
        let mut k = num_edges as isize - 1;
        while j >= 0 {
            let right = edges[rem[j as usize]].right;
            while k >= 0 && edges[ins[k as usize]].left == right {
                pi[edges[ins[k as usize]].child as usize] = NULL_NODE;
                k -= 1;
            }
            let left = edges[ins[k as usize]].left;
            while j >= 0 && edges[rem[j as usize]].right == right {
                let e = &edges[rem[j as usize]];
                pi[e.child as usize] = e.parent;
                j -= 1;
            }
            for site in (left.max(1)..right).rev() {
                let u = cur.parent;
                if let Some(mutation_node) = self.builder.mutation_at(site) {
                    matched[site] = is_descendant(&pi, u, mutation_node) as u8;
                }
                let tb = &traceback[site];
                if lookup(tb, &pi, u) != 1.0 {
                    /* the copied-from parent changes between site - 1 and
                     * site; the old one keeps this site */
                    cur.left = site;
                    out.push(cur);
                    cur = Edge::new(0, site, best_node(tb), child);
                }
            }
        }
        cur.left = 0;
        if let Some(mutation_node) = self.builder.mutation_at(0) {
            matched[0] = is_descendant(&pi, cur.parent, mutation_node) as u8;
        }
        out.push(cur);

        Ok(PathMatch { edges: out, matched })
    }
}
