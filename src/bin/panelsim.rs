/* standard use */
use std::io::{self, Write};

/* crate use */
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(clap::Parser, Debug)]
#[clap(
    version = "0.1",
    about = "Generate a random biallelic haplotype panel with no invariant columns"
)]
struct Args {
    #[clap(short = 'n', long = "nsamples", default_value = "10", help = "number of haplotypes")]
    nsamples: usize,

    #[clap(short = 'm', long = "nsites", default_value = "20", help = "number of sites")]
    nsites: usize,

    #[clap(
        short = 'd',
        long = "density",
        default_value = "0.5",
        help = "per-cell probability of the derived allele, (0;1)"
    )]
    density: f64,

    #[clap(short = 's', long = "seed", default_value = "1")]
    seed: u64,
}

fn main() -> Result<(), io::Error> {
    env_logger::init();
    let args = Args::parse();

    if args.nsamples < 2 {
        panic!("need at least two haplotypes");
    }
    if args.density <= 0.0 || args.density >= 1.0 {
        panic!("invalid allele density");
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut panel = vec![vec![0u8; args.nsites]; args.nsamples];
    for row in panel.iter_mut() {
        for x in row.iter_mut() {
            *x = rng.gen_bool(args.density) as u8;
        }
    }
    /* patch invariant columns rather than rejecting whole draws */
    for l in 0..args.nsites {
        let ones = panel.iter().filter(|row| row[l] == 1).count();
        if ones == 0 {
            panel[0][l] = 1;
        } else if ones == args.nsamples {
            panel[0][l] = 0;
        }
    }

    let mut out = io::BufWriter::new(io::stdout());
    for row in &panel {
        for &x in row {
            write!(out, "{}", x)?;
        }
        writeln!(out)?;
    }
    out.flush()?;

    log::info!(
        "wrote {} haplotypes over {} sites (seed {})",
        args.nsamples,
        args.nsites,
        args.seed
    );
    Ok(())
}
