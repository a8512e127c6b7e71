/* crate use */
use ndarray::Array2;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

/* private use */
use crate::ancestor::AncestorBuilder;
use crate::builder::{Edge, TreeSequenceBuilder};
use crate::error::InferError;
use crate::matcher::{AncestorMatcher, PathMatch};
use crate::tables::TreeSequence;
use crate::NodeId;

/// Recombination probability, shared by every site or given per site.
#[derive(Clone, Debug)]
pub enum RecombinationRate {
    Uniform(f64),
    PerSite(Vec<f64>),
}

impl RecombinationRate {
    fn per_site(&self, num_sites: usize) -> Result<Vec<f64>, InferError> {
        let rho = match self {
            RecombinationRate::Uniform(r) => vec![*r; num_sites],
            RecombinationRate::PerSite(v) => {
                if v.len() != num_sites {
                    return Err(InferError::ShapeMismatch {
                        what: "recombination rate",
                        expected: num_sites,
                        got: v.len(),
                    });
                }
                v.clone()
            }
        };
        for &r in &rho {
            if !(r >= 0.0) {
                return Err(InferError::OutOfRange {
                    what: "recombination rate",
                    value: r,
                });
            }
        }
        Ok(rho)
    }
}

/// Inference knobs beyond the sample panel itself.
#[derive(Clone, Debug)]
pub struct InferOpts {
    pub recombination_rate: RecombinationRate,
    pub error_rate: f64,
    pub num_threads: usize,
    pub break_polytomies: bool,
    pub replace_shared_recombinations: bool,
}

impl Default for InferOpts {
    fn default() -> InferOpts {
        InferOpts {
            recombination_rate: RecombinationRate::Uniform(1e-8),
            error_rate: 0.0,
            num_threads: 1,
            break_polytomies: false,
            replace_shared_recombinations: false,
        }
    }
}

/// Infer a tree sequence reconstructing every row of `samples`, an N x M
/// panel of 0/1 alleles over sites at the given `positions` on a genome of
/// length `sequence_length`.
///
/// Ancestors are synthesised per frequency class, oldest class first, and
/// matched against everything inserted before their class; the samples
/// themselves are matched last as one age-0 class. Matching within a class
/// runs on `opts.num_threads` threads and the result does not depend on
/// the thread count.
pub fn infer(
    samples: &Array2<u8>,
    positions: &[f64],
    sequence_length: f64,
    opts: &InferOpts,
) -> Result<TreeSequence, InferError> {
    let (num_samples, num_sites) = samples.dim();
    let builder = AncestorBuilder::new(samples.clone(), positions)?;
    if !(opts.error_rate >= 0.0 && opts.error_rate <= 1.0) {
        return Err(InferError::OutOfRange {
            what: "error rate",
            value: opts.error_rate,
        });
    }
    if sequence_length <= positions[num_sites - 1] {
        return Err(InferError::OutOfRange {
            what: "sequence length (must exceed the last position)",
            value: sequence_length,
        });
    }
    if opts.num_threads < 1 {
        return Err(InferError::OutOfRange {
            what: "num_threads",
            value: opts.num_threads as f64,
        });
    }
    let rho = opts.recombination_rate.per_site(num_sites)?;

    let classes = builder.frequency_classes().to_vec();
    let num_ancestors: usize = classes.iter().map(|c| c.bundles.len()).sum();
    log::info!(
        "infer: {} samples, {} sites, {} ancestors in {} frequency classes",
        num_samples,
        num_sites,
        num_ancestors,
        classes.len()
    );

    let mut tsb = TreeSequenceBuilder::new(
        num_sites,
        opts.break_polytomies,
        opts.replace_shared_recombinations,
    );
    let top_frequency = classes.first().map(|c| c.frequency).unwrap_or(1);
    tsb.update(1, (top_frequency + 1) as f64, Vec::new(), &[]);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.num_threads)
        .build()
        .unwrap();
    let mut extra_mutations: Vec<(usize, NodeId, u8)> = Vec::new();

    for class in &classes {
        let base = tsb.num_nodes() as NodeId;
        let ancestors: Vec<Vec<u8>> = class
            .bundles
            .iter()
            .map(|bundle| {
                let mut a = vec![0u8; num_sites];
                builder.make_ancestor(bundle, &mut a);
                a
            })
            .collect();
        /* synthetic ancestors always match exactly; the error model only
         * describes the observed samples */
        let paths = match_batch(&pool, &tsb, &rho, 0.0, base, &ancestors, Some(&class.bundles))?;
        apply_batch(
            &mut tsb,
            class.frequency as f64,
            base,
            &ancestors,
            Some(&class.bundles),
            paths,
            &mut extra_mutations,
        );
        log::debug!(
            "class of frequency {}: {} ancestors in, {} edges, {} mutations total",
            class.frequency,
            class.bundles.len(),
            tsb.num_edges(),
            tsb.num_mutations()
        );
    }

    /* the samples are one final implicit class of age 0, with no focal
     * sites of their own */
    let base = tsb.num_nodes() as NodeId;
    let rows: Vec<Vec<u8>> = (0..num_samples).map(|j| samples.row(j).to_vec()).collect();
    let paths = match_batch(&pool, &tsb, &rho, opts.error_rate, base, &rows, None)?;
    apply_batch(&mut tsb, 0.0, base, &rows, None, paths, &mut extra_mutations);
    debug_assert!(extra_mutations.iter().all(|&(_, u, _)| u >= base));

    let sample_ids: Vec<NodeId> = (0..num_samples).map(|j| base + j as NodeId).collect();
    log::info!(
        "infer done: {} nodes, {} edges, {} mutations",
        tsb.num_nodes(),
        tsb.num_edges(),
        tsb.num_mutations() + extra_mutations.len()
    );
    Ok(TreeSequence::new(
        &tsb,
        positions,
        sequence_length,
        sample_ids,
        &extra_mutations,
    ))
}

fn match_batch(
    pool: &rayon::ThreadPool,
    tsb: &TreeSequenceBuilder,
    rho: &[f64],
    error_rate: f64,
    base: NodeId,
    haplotypes: &[Vec<u8>],
    bundles: Option<&[Vec<usize>]>,
) -> Result<Vec<PathMatch>, InferError> {
    let matcher = AncestorMatcher::new(tsb, rho, error_rate);
    pool.install(|| {
        haplotypes
            .par_iter()
            .enumerate()
            .map(|(i, h)| {
                let child = base + i as NodeId;
                match bundles {
                    /* focal states come back as mutations, not copying */
                    Some(bundles) => {
                        let mut target = h.clone();
                        for &s in &bundles[i] {
                            target[s] = 0;
                        }
                        matcher.find_path(child, &target)
                    }
                    None => matcher.find_path(child, h),
                }
            })
            .collect()
    })
}

/* turn one batch of matches into an update: focal sites found a mutation on
 * their new node; any disagreement between a haplotype and its copying path
 * founds the site's mutation if it has none yet, and is otherwise kept back
 * as a recurrent or back mutation for finalisation */
fn apply_batch(
    tsb: &mut TreeSequenceBuilder,
    age: f64,
    base: NodeId,
    haplotypes: &[Vec<u8>],
    bundles: Option<&[Vec<usize>]>,
    paths: Vec<PathMatch>,
    extras: &mut Vec<(usize, NodeId, u8)>,
) {
    let mut edges: Vec<Edge> = Vec::new();
    let mut mutations: Vec<(usize, NodeId)> = Vec::new();
    let mut claimed: FxHashSet<usize> = FxHashSet::default();
    for (i, (h, path)) in haplotypes.iter().zip(paths).enumerate() {
        let node = base + i as NodeId;
        if let Some(bundles) = bundles {
            for &s in &bundles[i] {
                mutations.push((s, node));
                claimed.insert(s);
            }
        }
        for (s, (&want, &got)) in h.iter().zip(&path.matched).enumerate() {
            if want == got {
                continue;
            }
            if bundles.map_or(false, |bundles| bundles[i].binary_search(&s).is_ok()) {
                continue;
            }
            if want == 1 && tsb.mutation_at(s).is_none() && !claimed.contains(&s) {
                mutations.push((s, node));
                claimed.insert(s);
            } else {
                extras.push((s, node, if want == 1 { b'1' } else { b'0' }));
            }
        }
        edges.extend(path.edges);
    }
    tsb.update(haplotypes.len(), age, edges, &mutations);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn validates_inputs() {
        let h = arr2(&[[1, 0], [0, 1]]);
        let positions = vec![0.0, 1.0];
        let mut opts = InferOpts::default();

        opts.error_rate = 1.5;
        assert!(matches!(
            infer(&h, &positions, 2.0, &opts),
            Err(InferError::OutOfRange { .. })
        ));

        opts.error_rate = 0.0;
        assert!(matches!(
            infer(&h, &positions, 1.0, &opts),
            Err(InferError::OutOfRange { .. })
        ));

        opts.recombination_rate = RecombinationRate::PerSite(vec![1.0]);
        assert!(matches!(
            infer(&h, &positions, 2.0, &opts),
            Err(InferError::ShapeMismatch { .. })
        ));

        opts.recombination_rate = RecombinationRate::PerSite(vec![1.0, -1.0]);
        assert!(matches!(
            infer(&h, &positions, 2.0, &opts),
            Err(InferError::OutOfRange { .. })
        ));

        opts.recombination_rate = RecombinationRate::Uniform(1.0);
        opts.num_threads = 0;
        assert!(matches!(
            infer(&h, &positions, 2.0, &opts),
            Err(InferError::OutOfRange { .. })
        ));
    }

    #[test]
    fn root_sits_above_the_oldest_class() {
        let h = arr2(&[
            [1, 1, 1],
            [1, 1, 1],
            [1, 1, 0],
            [1, 0, 0],
            [0, 0, 0],
        ]);
        let positions = vec![0.0, 1.0, 2.0];
        let ts = infer(&h, &positions, 3.0, &InferOpts::default()).unwrap();
        /* root, one ancestor per class, then the five samples */
        let times: Vec<f64> = ts.nodes.iter().map(|n| n.time).collect();
        assert_eq!(times, vec![5.0, 4.0, 3.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
