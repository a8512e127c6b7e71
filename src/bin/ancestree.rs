/* standard use */
use std::fs;
use std::io::{self, BufRead, Write};

/* crate use */
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use ndarray::Array2;

/* private use */
use ancestree as at;

#[derive(clap::Parser, Debug)]
#[clap(
    version = "0.1",
    about = "Infer a genealogical tree sequence from a binary haplotype panel and print its node, edge, site and mutation tables"
)]
struct Args {
    #[clap(index = 1, required = true, help = "panel file, one 0/1 haplotype row per line")]
    panel: String,

    #[clap(
        short = 'p',
        long = "positions",
        default_value = "",
        help = "site positions, one per line (default 0..M)"
    )]
    positions: String,

    #[clap(
        short = 'L',
        long = "length",
        help = "sequence length (default last position + 1)"
    )]
    sequence_length: Option<f64>,

    #[clap(
        short = 'r',
        long = "rho",
        default_value = "1e-8",
        help = "recombination rate per site"
    )]
    rho: f64,

    #[clap(short = 'e', long = "error", default_value = "0", help = "sample error rate")]
    error_rate: f64,

    #[clap(short = 't', long = "threads", default_value = "1", help = "matching threads")]
    threads: usize,

    #[clap(long = "break-polytomies", help = "insert intermediate nodes under polytomies")]
    break_polytomies: bool,

    #[clap(
        long = "replace-recombinations",
        help = "factor shared recombination breakpoint chains through new nodes"
    )]
    replace_shared_recombinations: bool,
}

fn read_panel(path: &str) -> Result<Array2<u8>> {
    let f = fs::File::open(path).with_context(|| format!("cannot open panel {}", path))?;
    let mut rows: Vec<Vec<u8>> = Vec::new();
    for line in io::BufReader::new(f).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(0u8),
                '1' => Ok(1u8),
                _ => Err(anyhow!("unexpected character {:?} in {}", c, path)),
            })
            .collect::<Result<Vec<u8>>>()?;
        if let Some(prev) = rows.last() {
            if prev.len() != row.len() {
                bail!("ragged panel rows in {}", path);
            }
        }
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("no haplotype rows in {}", path);
    }
    let (n, m) = (rows.len(), rows[0].len());
    Ok(Array2::from_shape_vec((n, m), rows.concat())?)
}

fn read_positions(path: &str) -> Result<Vec<f64>> {
    let f = fs::File::open(path).with_context(|| format!("cannot open positions {}", path))?;
    let mut positions = Vec::new();
    for line in io::BufReader::new(f).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        positions.push(line.parse::<f64>().with_context(|| format!("bad position {:?}", line))?);
    }
    Ok(positions)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let samples = read_panel(&args.panel)?;
    let (num_samples, num_sites) = samples.dim();
    log::info!("read {} haplotypes over {} sites", num_samples, num_sites);

    let positions = if args.positions.is_empty() {
        (0..num_sites).map(|l| l as f64).collect()
    } else {
        read_positions(&args.positions)?
    };
    let sequence_length = args
        .sequence_length
        .unwrap_or_else(|| positions.last().copied().unwrap_or(0.0) + 1.0);

    let opts = at::InferOpts {
        recombination_rate: at::RecombinationRate::Uniform(args.rho),
        error_rate: args.error_rate,
        num_threads: args.threads,
        break_polytomies: args.break_polytomies,
        replace_shared_recombinations: args.replace_shared_recombinations,
    };
    let ts = at::infer(&samples, &positions, sequence_length, &opts)?;

    let mut out = io::BufWriter::new(io::stdout());
    writeln!(out, "# sequence_length\t{}", ts.sequence_length)?;
    for (id, n) in ts.nodes.iter().enumerate() {
        writeln!(out, "node\t{}\t{}\t{}", id, n.flags, n.time)?;
    }
    for e in &ts.edges {
        writeln!(out, "edge\t{}\t{}\t{}\t{}", e.left, e.right, e.parent, e.child)?;
    }
    for (id, s) in ts.sites.iter().enumerate() {
        writeln!(out, "site\t{}\t{}\t{}", id, s.position, s.ancestral_state as char)?;
    }
    for m in &ts.mutations {
        writeln!(
            out,
            "mutation\t{}\t{}\t{}\t{}",
            m.site, m.node, m.derived_state as char, m.parent
        )?;
    }
    out.flush()?;

    log::info!(
        "inferred {} nodes, {} edges, {} mutations",
        ts.num_nodes(),
        ts.num_edges(),
        ts.num_mutations()
    );
    Ok(())
}
