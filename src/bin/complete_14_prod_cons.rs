//==============================================================================
// Producer / Consumer - bounded buffer demo
//==============================================================================
//
// Run with: cargo run --bin complete_14_patterns -- --strategy monitor --iterations 10

use std::path::PathBuf;

use anyhow::{Context, Result};
use bounded_buffer::{logging, run, CancellationToken, DemoConfig, RunReport, Strategy, ValueSource};
use clap::Parser;
use colored::Colorize;

#[derive(Parser, Debug)]
#[command(about = "Producer/consumer over a bounded buffer, three synchronization strategies")]
struct Cli {
    /// TOML file with the run configuration; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum)]
    strategy: Option<Strategy>,

    #[arg(long)]
    capacity: Option<usize>,

    #[arg(long)]
    producers: Option<usize>,

    #[arg(long)]
    consumers: Option<usize>,

    /// Values per producer. Without it (or --duration-ms) the demo runs until killed.
    #[arg(long)]
    iterations: Option<u64>,

    #[arg(long)]
    delay_ms: Option<u64>,

    #[arg(long)]
    duration_ms: Option<u64>,

    #[arg(long, value_enum)]
    values: Option<ValueSource>,

    /// Print the report as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<(DemoConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DemoConfig::default(),
        };

        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(producers) = self.producers {
            config.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            config.consumers = consumers;
        }
        if self.iterations.is_some() {
            config.iterations = self.iterations;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.delay_ms = delay_ms;
        }
        if self.duration_ms.is_some() {
            config.duration_ms = self.duration_ms;
        }
        if let Some(values) = self.values {
            config.values = values;
        }

        config.validate().context("invalid configuration")?;
        Ok((config, self.json))
    }
}

fn print_summary(report: &RunReport) {
    println!("\n{}", "=== Run summary ===".bold());
    println!("  strategy   : {}", report.strategy.to_string().cyan());
    println!(
        "  threads    : {} producer(s), {} consumer(s), capacity {}",
        report.producers, report.consumers, report.capacity
    );
    println!("  produced   : {}", report.produced.to_string().green());
    println!("  consumed   : {}", report.consumed.to_string().green());
    println!("  peak length: {}", report.stats.peak_len);
    println!("  wake-ups   : {}", report.stats.wakeups);
    println!("  elapsed    : {} ms", report.elapsed_ms);

    if report.cancelled {
        println!("  {}", "stopped by cancellation".yellow());
    }
    if report.stats.peak_len > report.capacity {
        println!("  {}", "capacity exceeded!".red().bold());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let (config, json) = cli.into_config()?;

    let token = CancellationToken::new();
    let report = run(&config, &token).context("producer/consumer run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}
