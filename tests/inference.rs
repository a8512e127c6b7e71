/* crate use */
use ndarray::{arr2, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/* private use */
use ancestree::{infer, InferOpts, RecombinationRate, TreeSequence};

fn random_panel(num_samples: usize, num_sites: usize, seed: u64) -> Array2<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut panel = Array2::zeros((num_samples, num_sites));
    for x in panel.iter_mut() {
        *x = rng.gen_bool(0.5) as u8;
    }
    /* patch invariant columns */
    for l in 0..num_sites {
        let ones = panel.column(l).iter().filter(|&&x| x == 1).count();
        if ones == 0 {
            panel[[0, l]] = 1;
        } else if ones == num_samples {
            panel[[0, l]] = 0;
        }
    }
    panel
}

fn index_positions(num_sites: usize) -> Vec<f64> {
    (0..num_sites).map(|l| l as f64).collect()
}

fn run_opts(samples: &Array2<u8>, opts: &InferOpts) -> TreeSequence {
    let num_sites = samples.ncols();
    infer(samples, &index_positions(num_sites), num_sites as f64, opts).unwrap()
}

fn run(samples: &Array2<u8>, rho: f64, error_rate: f64) -> TreeSequence {
    run_opts(
        samples,
        &InferOpts {
            recombination_rate: RecombinationRate::Uniform(rho),
            error_rate,
            ..Default::default()
        },
    )
}

/* every child's edge intervals tile [0, num_sites) and every edge points
 * upwards in time */
fn check_table_invariants(ts: &TreeSequence) {
    for e in &ts.edges {
        assert!(e.left < e.right);
        assert!(
            ts.nodes[e.parent as usize].time > ts.nodes[e.child as usize].time,
            "edge from time {} down to {}",
            ts.nodes[e.parent as usize].time,
            ts.nodes[e.child as usize].time
        );
    }
    for &sample in ts.samples() {
        let mut intervals: Vec<(f64, f64)> = ts
            .edges
            .iter()
            .filter(|e| e.child == sample)
            .map(|e| (e.left, e.right))
            .collect();
        intervals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!(!intervals.is_empty());
        assert_eq!(intervals[0].0, 0.0);
        assert_eq!(intervals.last().unwrap().1, ts.num_sites() as f64);
        for w in intervals.windows(2) {
            assert_eq!(w[0].1, w[1].0);
        }
    }
}

#[test]
fn single_site_two_samples() {
    let panel = arr2(&[[1], [0]]);
    let ts = run(&panel, 0.0, 0.0);
    assert_eq!(ts.num_sites(), 1);
    assert_eq!(ts.num_mutations(), 1);
    assert_eq!(ts.mutations[0].derived_state, b'1');
    assert_eq!(ts.sites[0].ancestral_state, b'0');
    assert_eq!(ts.genotype_matrix(), panel);
    check_table_invariants(&ts);
}

#[test]
fn round_trip_random_data() {
    for seed in 1..=5 {
        let panel = random_panel(5, 10, seed);
        let ts = run(&panel, 0.5, 0.0);
        assert_eq!(ts.num_sites(), 10);
        assert_eq!(ts.genotype_matrix(), panel, "seed {}", seed);
        /* without errors every site carries exactly its founding mutation */
        assert_eq!(ts.num_mutations(), 10);
        for (l, m) in ts.mutations.iter().enumerate() {
            assert_eq!(m.site, l as i32);
            assert_eq!(m.derived_state, b'1');
            assert_eq!(m.parent, -1);
        }
        check_table_invariants(&ts);
    }
}

#[test]
fn round_trip_high_recombination() {
    let panel = random_panel(20, 30, 7);
    let ts = run(&panel, 1.0, 0.0);
    assert_eq!(ts.genotype_matrix(), panel);
    check_table_invariants(&ts);
}

#[test]
fn error_matching_emits_recurrent_and_back_mutations() {
    let mut saw_recurrent = false;
    let mut saw_back = false;
    for seed in 1..=10 {
        let panel = random_panel(5, 20, seed);
        /* recombination this unlikely makes mismatches do the matching */
        let ts = run(&panel, 1e-9, 0.1);
        assert_eq!(ts.genotype_matrix(), panel, "seed {}", seed);
        assert!(ts.num_mutations() >= ts.num_sites());
        for l in 0..ts.num_sites() {
            let muts: Vec<_> = ts.mutations.iter().filter(|m| m.site == l as i32).collect();
            assert_eq!(muts[0].derived_state, b'1');
            assert_eq!(muts[0].parent, -1);
            if muts.iter().filter(|m| m.derived_state == b'1').count() > 1 {
                saw_recurrent = true;
            }
            for m in &muts[1..] {
                if m.derived_state == b'0' {
                    assert!(m.parent >= 0);
                    assert_eq!(ts.mutations[m.parent as usize].site, m.site);
                    saw_back = true;
                }
            }
        }
        check_table_invariants(&ts);
    }
    assert!(saw_recurrent);
    assert!(saw_back);
}

#[test]
fn thread_count_does_not_change_the_result() {
    let panel = random_panel(10, 30, 3);
    let single = run_opts(
        &panel,
        &InferOpts {
            recombination_rate: RecombinationRate::Uniform(1.0),
            num_threads: 1,
            ..Default::default()
        },
    );
    let threaded = run_opts(
        &panel,
        &InferOpts {
            recombination_rate: RecombinationRate::Uniform(1.0),
            num_threads: 5,
            ..Default::default()
        },
    );
    assert_eq!(single.nodes, threaded.nodes);
    assert_eq!(single.edges, threaded.edges);
    assert_eq!(single.sites, threaded.sites);
    assert_eq!(single.mutations, threaded.mutations);
}

#[test]
fn ages_follow_descending_frequency() {
    let panel = arr2(&[
        [1, 1, 1],
        [1, 1, 1],
        [1, 1, 0],
        [1, 0, 0],
        [0, 0, 0],
    ]);
    let ts = run(&panel, 1e-8, 0.0);
    let times: Vec<f64> = ts.nodes.iter().map(|n| n.time).collect();
    assert_eq!(times, vec![5.0, 4.0, 3.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(ts.genotype_matrix(), panel);
    check_table_invariants(&ts);
}

#[test]
fn positions_carry_through_to_sites_and_edges() {
    let panel = random_panel(5, 8, 11);
    let positions: Vec<f64> = (0..8).map(|l| 10.0 + 3.0 * l as f64).collect();
    let ts = infer(
        &panel,
        &positions,
        100.0,
        &InferOpts {
            recombination_rate: RecombinationRate::Uniform(0.5),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(ts.sequence_length, 100.0);
    for (v, p) in ts.variants().iter().zip(&positions) {
        assert_eq!(v.position, *p);
    }
    for e in &ts.edges {
        assert!(positions.contains(&e.left));
        assert!(e.right == 100.0 || positions.contains(&e.right));
    }
}

#[test]
fn rewrites_preserve_round_trips() {
    for seed in [2, 9] {
        let panel = random_panel(10, 20, seed);
        let ts = run_opts(
            &panel,
            &InferOpts {
                recombination_rate: RecombinationRate::Uniform(1.0),
                break_polytomies: true,
                replace_shared_recombinations: true,
                ..Default::default()
            },
        );
        assert_eq!(ts.genotype_matrix(), panel, "seed {}", seed);
        for e in &ts.edges {
            assert!(ts.nodes[e.parent as usize].time > ts.nodes[e.child as usize].time);
        }
    }
}

#[test]
fn per_site_recombination_rates_are_accepted() {
    let panel = random_panel(5, 10, 4);
    let ts = run_opts(
        &panel,
        &InferOpts {
            recombination_rate: RecombinationRate::PerSite(vec![0.5; 10]),
            ..Default::default()
        },
    );
    assert_eq!(ts.genotype_matrix(), panel);
}
