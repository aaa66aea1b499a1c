//! Seedmix CLI
//!
//! Draws a key seed from the aggregate of the OS CSPRNG, keyboard entropy
//! typed on stdin and, if configured, a hardware RNG.

use clap::Parser;
use seedmix::{
    collector::{completion_channel, EntropyPool, Feed, InteractiveEntropyCollector},
    config::FileConfig,
    source::{PooledCsprngSource, StretchedPoolSource},
    Aggregator, SupervisedHardwareStream,
};
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "seedmix", version, about = "Aggregate entropy sources into a key seed")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hardware RNG device, e.g. /dev/hwrng.
    #[arg(long, conflicts_with = "command")]
    device: Option<PathBuf>,

    /// External command producing random bytes on stdout.
    #[arg(long, num_args = 1.., allow_hyphen_values = true)]
    command: Vec<String>,

    /// Skip keyboard entropy collection.
    #[arg(long)]
    no_interactive: bool,

    /// Number of output bytes.
    #[arg(long, default_value_t = 32)]
    bytes: usize,

    /// Print a diagnostic sample of each source before generating.
    #[arg(long)]
    diagnostic: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Seedmix v{}", seedmix::VERSION);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(device) = args.device {
        config.hardware.device = Some(device);
    }
    if !args.command.is_empty() {
        config.hardware.device = None;
        config.hardware.command = args.command;
    }

    let mut aggregator = Aggregator::new(config.aggregate.clone());
    let mut os = PooledCsprngSource::with_buffer_size(config.sources.buffer_size);

    if !args.no_interactive {
        let pool = EntropyPool::from_bytes(os.draw(config.collector.seed_size)?);
        match collect_keyboard(pool, &config)? {
            Some(pool) => {
                let stretched = StretchedPoolSource::from_pool(
                    pool,
                    config.sources.stretch_hash,
                    config.sources.buffer_size,
                )?;
                aggregator.add_source(Box::new(stretched));
            }
            None => warn!("Keyboard input ended early; continuing without stretched pool"),
        }
    }
    aggregator.add_source(Box::new(os));

    if config.hardware.opener().is_some() {
        let mut hardware = SupervisedHardwareStream::from_config(&config.hardware)?;
        match hardware.start() {
            Ok(()) => aggregator.add_source(Box::new(hardware)),
            Err(e) => warn!("Continuing without hardware source: {}", e),
        }
    }

    if args.diagnostic {
        for sample in aggregator.run_diagnostic()? {
            print!("{}", sample);
        }
    }

    let mut output = vec![0u8; args.bytes];
    let filled = aggregator.fill(&mut output);
    if let Err(e) = aggregator.close() {
        warn!("Error while closing sources: {}", e);
    }
    filled?;

    println!(
        "{}",
        output
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
    );
    info!("Done. Sources: {}", aggregator.source_names().join(", "));
    Ok(())
}

/// Folds typed lines into `pool` until the quota is met.
///
/// Returns `None` if stdin closes first.
fn collect_keyboard(
    pool: EntropyPool,
    config: &FileConfig,
) -> Result<Option<EntropyPool>, Box<dyn std::error::Error>> {
    let collector_config = seedmix::CollectorConfig {
        min_interval_ms: 0,
        ..config.collector.clone()
    };
    let (sink, done) = completion_channel();
    let mut collector = InteractiveEntropyCollector::new(pool, &collector_config, sink)?;

    eprintln!(
        "Type random text and press enter ({} keystrokes needed).",
        collector_config.samples
    );
    for line in std::io::stdin().lock().lines() {
        match collector.feed_text(&line?) {
            Feed::Completed(_) | Feed::AlreadyComplete => break,
            _ => eprintln!("  {}% collected", collector.progress().percent()),
        }
    }

    Ok(done.try_recv())
}
