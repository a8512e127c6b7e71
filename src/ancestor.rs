/* standard use */
use std::collections::BTreeMap;

/* crate use */
use itertools::Itertools;
use ndarray::Array2;
use rustc_hash::FxHashMap;

/* private use */
use crate::error::InferError;

/// Sites sharing one derived-allele count, grouped into focal bundles.
/// A bundle holds sites whose sample columns are bitwise identical; all
/// sites of a bundle belong to the same ancestor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrequencyClass {
    pub frequency: usize,
    pub bundles: Vec<Vec<usize>>,
}

/// Synthesises putative ancestral haplotypes from the sample panel.
pub struct AncestorBuilder {
    haplotypes: Array2<u8>,
    frequency: Vec<usize>,
    classes: Vec<FrequencyClass>,
}

impl AncestorBuilder {
    pub fn new(haplotypes: Array2<u8>, positions: &[f64]) -> Result<AncestorBuilder, InferError> {
        let (num_samples, num_sites) = haplotypes.dim();
        if num_samples == 0 || num_sites == 0 {
            return Err(InferError::ShapeMismatch {
                what: "sample panel",
                expected: 1,
                got: 0,
            });
        }
        if positions.len() != num_sites {
            return Err(InferError::ShapeMismatch {
                what: "positions",
                expected: num_sites,
                got: positions.len(),
            });
        }
        for (a, b) in positions.iter().tuple_windows() {
            if b <= a {
                return Err(InferError::OutOfRange {
                    what: "positions (must be strictly increasing)",
                    value: *b,
                });
            }
        }

        let mut frequency = vec![0usize; num_sites];
        for l in 0..num_sites {
            let f = haplotypes.column(l).iter().filter(|&&x| x == 1).count();
            if f == 0 || f == num_samples {
                return Err(InferError::InvariantSite { site: l });
            }
            frequency[l] = f;
        }

        /* sites with f <= 1 seed no ancestors */
        let mut by_frequency: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for l in 0..num_sites {
            if frequency[l] > 1 {
                by_frequency.entry(frequency[l]).or_insert_with(Vec::new).push(l);
            }
        }

        let mut classes = Vec::with_capacity(by_frequency.len());
        for (&f, sites) in by_frequency.iter().rev() {
            /* bundle identical columns, ordered by first focal site */
            let mut patterns: FxHashMap<Vec<u8>, usize> = FxHashMap::default();
            let mut bundles: Vec<Vec<usize>> = Vec::new();
            for &l in sites {
                let key: Vec<u8> = haplotypes.column(l).to_vec();
                match patterns.get(&key) {
                    Some(&i) => bundles[i].push(l),
                    None => {
                        patterns.insert(key, bundles.len());
                        bundles.push(vec![l]);
                    }
                }
            }
            classes.push(FrequencyClass { frequency: f, bundles });
        }

        log::debug!(
            "ancestor builder: {} samples, {} sites, {} frequency classes",
            num_samples,
            num_sites,
            classes.len()
        );
        Ok(AncestorBuilder {
            haplotypes,
            frequency,
            classes,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.haplotypes.nrows()
    }

    pub fn num_sites(&self) -> usize {
        self.haplotypes.ncols()
    }

    pub fn site_frequency(&self, l: usize) -> usize {
        self.frequency[l]
    }

    /// Frequency classes in descending order of frequency.
    pub fn frequency_classes(&self) -> &[FrequencyClass] {
        &self.classes
    }

    fn carriers(&self, focal: usize) -> Vec<usize> {
        (0..self.num_samples())
            .filter(|&j| self.haplotypes[[j, focal]] == 1)
            .collect()
    }

    /* majority vote over sigma at site l; ties resolve to the derived state */
    fn majority(&self, sigma: &[usize], l: usize) -> bool {
        let ones = sigma
            .iter()
            .filter(|&&j| self.haplotypes[[j, l]] == 1)
            .count();
        2 * ones >= sigma.len()
    }

    /// Estimate the haplotype of the ancestor whose focal sites are
    /// `bundle`, writing the result into `a` (length num_sites).
    ///
    /// Outward from the bundle the carrier set votes on every site that is
    /// older (higher frequency) than the focal sites, and is then narrowed
    /// to the samples consistent with the chosen state; younger sites stay
    /// ancestral. The sweep stops once a single carrier remains.
    pub fn make_ancestor(&self, bundle: &[usize], a: &mut [u8]) {
        assert!(!bundle.is_empty());
        assert_eq!(a.len(), self.num_sites());
        let focal_frequency = self.frequency[bundle[0]];
        assert!(focal_frequency > 1);

        for x in a.iter_mut() {
            *x = 0;
        }
        for &s in bundle {
            a[s] = 1;
        }
        let first = bundle[0];
        let last = *bundle.last().unwrap();
        self.sweep(focal_frequency, first, last + 1..self.num_sites(), a);
        self.sweep(focal_frequency, last, (0..first).rev(), a);

        /* sites spanned by the bundle take the same vote, but the carrier
         * set is not narrowed since the focal sites pin them */
        let carriers = self.carriers(last);
        for l in first + 1..last {
            if a[l] == 0 && self.frequency[l] > focal_frequency && self.majority(&carriers, l) {
                a[l] = 1;
            }
        }
    }

    fn sweep<I>(&self, focal_frequency: usize, anchor: usize, sites: I, a: &mut [u8])
    where
        I: Iterator<Item = usize>,
    {
        let mut sigma = self.carriers(anchor);
        for l in sites {
            if self.frequency[l] > focal_frequency {
                if self.majority(&sigma, l) {
                    a[l] = 1;
                    sigma.retain(|&j| self.haplotypes[[j, l]] == 1);
                } else {
                    sigma.retain(|&j| self.haplotypes[[j, l]] == 0);
                }
            }
            if sigma.len() == 1 {
                break;
            }
        }
    }
}
