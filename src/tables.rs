/* crate use */
use ndarray::Array2;

/* private use */
use crate::builder::{Edge, TreeSequenceBuilder};
use crate::{NodeId, NULL_NODE};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRow {
    pub flags: u32,
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeRow {
    pub left: f64,
    pub right: f64,
    pub parent: NodeId,
    pub child: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SiteRow {
    pub position: f64,
    pub ancestral_state: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MutationRow {
    pub site: i32,
    pub node: NodeId,
    pub derived_state: u8,
    pub parent: i32,
}

/// One decoded site: the alleles carried by the sample nodes.
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    pub index: usize,
    pub position: f64,
    pub genotypes: Vec<u8>,
}

/// The finalised table set, with edge coordinates mapped onto the genome
/// through the site positions.
pub struct TreeSequence {
    pub sequence_length: f64,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
    pub sites: Vec<SiteRow>,
    pub mutations: Vec<MutationRow>,
    samples: Vec<NodeId>,
    /* site-coordinate topology kept for genotype extraction */
    idx_edges: Vec<Edge>,
    insertion_order: Vec<usize>,
    removal_order: Vec<usize>,
}

impl TreeSequence {
    pub(crate) fn new(
        tsb: &TreeSequenceBuilder,
        positions: &[f64],
        sequence_length: f64,
        samples: Vec<NodeId>,
        extra_mutations: &[(usize, NodeId, u8)],
    ) -> TreeSequence {
        let num_sites = tsb.num_sites();

        let nodes = (0..tsb.num_nodes())
            .map(|u| NodeRow {
                flags: tsb.node_flags(u as NodeId),
                time: tsb.node_time(u as NodeId),
            })
            .collect();

        /* canonical order: parent time, parent, child, left */
        let mut sorted: Vec<Edge> = tsb.edges().to_vec();
        sorted.sort_by(|a, b| {
            tsb.node_time(a.parent)
                .partial_cmp(&tsb.node_time(b.parent))
                .unwrap()
                .then(a.parent.cmp(&b.parent))
                .then(a.child.cmp(&b.child))
                .then(a.left.cmp(&b.left))
        });
        let edges = sorted
            .iter()
            .map(|e| EdgeRow {
                left: positions[e.left],
                right: if e.right == num_sites {
                    sequence_length
                } else {
                    positions[e.right]
                },
                parent: e.parent,
                child: e.child,
            })
            .collect();

        let sites = positions
            .iter()
            .map(|&p| SiteRow {
                position: p,
                ancestral_state: b'0',
            })
            .collect();

        /* each site's founding '1' first, then the recurrent and back
         * mutations discovered while matching against it */
        let mut extra_by_site: Vec<Vec<(NodeId, u8)>> = vec![Vec::new(); num_sites];
        for &(s, u, d) in extra_mutations {
            extra_by_site[s].push((u, d));
        }
        let mut mutations: Vec<MutationRow> = Vec::new();
        for s in 0..num_sites {
            let first = mutations.len() as i32;
            let founded = tsb.mutation_at(s).is_some();
            if let Some(u) = tsb.mutation_at(s) {
                mutations.push(MutationRow {
                    site: s as i32,
                    node: u,
                    derived_state: b'1',
                    parent: -1,
                });
            }
            for &(u, d) in &extra_by_site[s] {
                debug_assert!(founded);
                mutations.push(MutationRow {
                    site: s as i32,
                    node: u,
                    derived_state: d,
                    parent: if d == b'0' { first } else { -1 },
                });
            }
        }

        TreeSequence {
            sequence_length,
            nodes,
            edges,
            sites,
            mutations,
            samples,
            idx_edges: tsb.edges().to_vec(),
            insertion_order: tsb.insertion_order().to_vec(),
            removal_order: tsb.removal_order().to_vec(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn num_mutations(&self) -> usize {
        self.mutations.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Node ids of the input sample rows, in row order.
    pub fn samples(&self) -> &[NodeId] {
        &self.samples
    }

    /// Decode the allele of every sample at every site by streaming the
    /// trees left to right. A sample's allele is the derived state of the
    /// nearest mutation on its path to the root, if any.
    pub fn variants(&self) -> Vec<Variant> {
        let num_sites = self.sites.len();
        let mut site_mutations: Vec<Vec<(NodeId, u8)>> = vec![Vec::new(); num_sites];
        for m in &self.mutations {
            site_mutations[m.site as usize].push((m.node, m.derived_state - b'0'));
        }

        let edges = &self.idx_edges;
        let ins = &self.insertion_order;
        let rem = &self.removal_order;
        let num_edges = edges.len();
        let mut pi: Vec<NodeId> = vec![NULL_NODE; self.nodes.len()];
        let mut out = Vec::with_capacity(num_sites);

        let mut j = 0;
        let mut k = 0;
        while j < num_edges {
            let left = edges[ins[j]].left;
            while k < num_edges && edges[rem[k]].right == left {
                pi[edges[rem[k]].child as usize] = NULL_NODE;
                k += 1;
            }
            let right = edges[rem[k]].right;
            while j < num_edges && edges[ins[j]].left == left {
                pi[edges[ins[j]].child as usize] = edges[ins[j]].parent;
                j += 1;
            }
            for site in left..right {
                let muts = &site_mutations[site];
                let genotypes = self
                    .samples
                    .iter()
                    .map(|&sample| {
                        let mut u = sample;
                        while u != NULL_NODE {
                            if let Some(&(_, d)) = muts.iter().find(|&&(n, _)| n == u) {
                                return d;
                            }
                            u = pi[u as usize];
                        }
                        0
                    })
                    .collect();
                out.push(Variant {
                    index: site,
                    position: self.sites[site].position,
                    genotypes,
                });
            }
        }
        out
    }

    /// Sample alleles as a num_samples x num_sites matrix, the counterpart
    /// of the panel handed to [`crate::infer`].
    pub fn genotype_matrix(&self) -> Array2<u8> {
        let mut g = Array2::zeros((self.samples.len(), self.sites.len()));
        for v in self.variants() {
            for (j, &x) in v.genotypes.iter().enumerate() {
                g[[j, v.index]] = x;
            }
        }
        g
    }
}
