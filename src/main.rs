use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use csidx::container::INDEX_MAGIC;
use csidx::{FmIndexConfig, MappedIndex};

const SENTINEL: u8 = b'$';
const LOCATE_LIMIT: usize = 100;

#[derive(Parser)]
#[command(name = "csidx")]
#[command(about = "Compressed full-text self-index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index container from a text file
    Build {
        /// Input text file
        input: PathBuf,

        /// Don't append a $ terminator (use if the file already ends with one)
        #[arg(long)]
        no_terminator: bool,

        /// Show detailed statistics after building
        #[arg(long)]
        stats: bool,

        /// Answer occurrence queries through the learned rank backend
        #[arg(long)]
        learned: bool,

        /// Pack the wavelet levels into a page-aligned vEB section
        #[arg(long)]
        veb: bool,

        /// Output path (default: <input>.csidx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Query an index container or a plain text file for a pattern
    Query {
        /// Index container or text file (detected by magic)
        source: PathBuf,

        /// Pattern to search for
        pattern: String,
    },
    /// Measure query throughput and latency on a text file
    Bench {
        /// Input text file
        input: PathBuf,

        /// Number of queries to run
        #[arg(long, default_value_t = 2000)]
        iterations: usize,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    // usage errors are exit code 1 by contract, not clap's default 2
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let requested = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = err.print();
            return if requested {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build {
            input,
            no_terminator,
            stats,
            learned,
            veb,
            output,
        } => build(&input, no_terminator, stats, learned, veb, output),
        Commands::Query { source, pattern } => query(&source, pattern.as_bytes()),
        Commands::Bench { input, iterations } => bench(&input, iterations),
    }
}

fn build(
    input: &Path,
    no_terminator: bool,
    stats: bool,
    learned: bool,
    veb: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let text = slurp(input)?;
    log::info!("read {} bytes from {}", text.len(), input.display());

    let text = terminated(text, no_terminator);

    let config = FmIndexConfig::new().learned_occ(learned).veb_layout(veb);
    let start = Instant::now();
    let index = config
        .build(text)
        .with_context(|| format!("building index for {}", input.display()))?;
    log::info!("built index in {:.2?}", start.elapsed());

    let output = output.unwrap_or_else(|| {
        let mut path = input.as_os_str().to_owned();
        path.push(".csidx");
        PathBuf::from(path)
    });
    index
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    println!("indexed {} bytes -> {}", index.text_len(), output.display());

    if stats {
        let file_len = fs::metadata(&output)?.len();
        println!("text length:    {}", index.text_len());
        println!("sampling rate:  {}", index.suffix_array_sampling_rate());
        println!("flags:          {:#06x}", index.config().flags());
        println!("container size: {file_len} bytes");
        println!(
            "overhead:       {:.2}x",
            file_len as f64 / index.text_len() as f64
        );
    }

    Ok(())
}

fn query(source: &Path, pattern: &[u8]) -> Result<()> {
    let (count, positions) = if is_index_container(source)? {
        let index = MappedIndex::open(source)
            .with_context(|| format!("opening index {}", source.display()))?;
        (
            index.count(pattern),
            index.locate(pattern, LOCATE_LIMIT)?,
        )
    } else {
        let text = terminated(slurp(source)?, false);
        let index = FmIndexConfig::new().build(text)?;
        (
            index.count(pattern),
            index.locate(pattern, LOCATE_LIMIT)?,
        )
    };

    println!("count={count}");
    let positions: Vec<String> = positions.iter().map(u64::to_string).collect();
    println!("positions: {}", positions.join(" "));

    Ok(())
}

fn bench(input: &Path, iterations: usize) -> Result<()> {
    let text = terminated(slurp(input)?, false);
    if text.len() < 32 {
        bail!("input too small to benchmark");
    }

    let start = Instant::now();
    let index = FmIndexConfig::new().build(text.clone())?;
    log::info!("built index in {:.2?}", start.elapsed());

    // patterns drawn from the text itself, fixed seed for comparable runs
    let mut rng = StdRng::seed_from_u64(42);
    let patterns: Vec<&[u8]> = (0..iterations)
        .map(|_| {
            let len = rng.random_range(3..=12);
            let pos = rng.random_range(0..text.len() - len);
            &text[pos..pos + len]
        })
        .collect();

    let mut latencies = Vec::with_capacity(iterations);
    let mut aggregate: u64 = 0;
    let run_start = Instant::now();

    for pattern in &patterns {
        let query_start = Instant::now();
        aggregate += index.count(pattern) as u64;
        latencies.push(query_start.elapsed());
    }

    let elapsed = run_start.elapsed();
    latencies.sort_unstable();

    println!("queries:   {iterations}");
    println!("aggregate: {aggregate}");
    println!(
        "qps:       {:.0}",
        iterations as f64 / elapsed.as_secs_f64()
    );
    println!(
        "latency:   p50 {:?}  p95 {:?}  p99 {:?}",
        percentile(&latencies, 50),
        percentile(&latencies, 95),
        percentile(&latencies, 99)
    );

    Ok(())
}

fn slurp(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

fn terminated(mut text: Vec<u8>, no_terminator: bool) -> Vec<u8> {
    if !no_terminator && text.last() != Some(&SENTINEL) {
        text.push(SENTINEL);
    }
    text
}

fn is_index_container(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut magic = [0u8; 8];
    let mut file =
        fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    Ok(file.read_exact(&mut magic).is_ok() && magic == INDEX_MAGIC)
}

fn percentile(sorted: &[Duration], p: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (sorted.len() * p / 100).min(sorted.len() - 1);
    sorted[rank]
}
