//! Weekcap CLI: harvest, rebuild and checkpoint status commands.
//!
//! Commands:
//! - `harvest`: fetch every day in the range (resuming from a checkpoint),
//!   then write the smoothed weekly ranking
//! - `rebuild`: recompute the output from a checkpoint without fetching
//! - `status`: report what a checkpoint holds

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use weekcap_core::data::{
    synthetic_listings, CoinMarketCapFetcher, HttpImageSource, ImageStore, ScriptedFetcher,
    SourceFetcher, ThreadSleeper,
};
use weekcap_runner::config::{DEFAULT_CHECKPOINT_FILE, DEFAULT_OUTPUT_FILE};
use weekcap_runner::{
    rebuild, run_pipeline, CheckpointStore, FailurePolicy, HarvestConfig, PipelineSummary,
};

#[derive(Parser)]
#[command(
    name = "weekcap",
    about = "Weekcap CLI: resumable daily ranking harvester with weekly smoothing"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest daily rankings and write the smoothed weekly output.
    Harvest {
        /// Path to a TOML config file. Flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Start date (YYYY-MM-DD). Defaults to 2016-01-01.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to 2025-05-20.
        #[arg(long)]
        end: Option<String>,

        /// Checkpoint file.
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Output file for the smoothed weekly ranking.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Record failed days as missing and keep going instead of aborting.
        #[arg(long, default_value_t = false)]
        continue_on_error: bool,

        /// Also download entity logos into this directory.
        #[arg(long)]
        images: Option<PathBuf>,

        /// Use a deterministic synthetic source instead of the network.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Recompute weekly and smoothed output from a checkpoint.
    Rebuild {
        /// Checkpoint file to read.
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,

        /// Output file.
        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Entities kept per week.
        #[arg(long)]
        top_k: Option<usize>,

        /// TOML config supplying smoothing weights and top_k.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report run range, committed day and missing days of a checkpoint.
    Status {
        /// Checkpoint file to inspect.
        #[arg(long, default_value = DEFAULT_CHECKPOINT_FILE)]
        checkpoint: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Harvest {
            config,
            start,
            end,
            checkpoint,
            output,
            continue_on_error,
            images,
            synthetic,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(s) = start.as_deref() {
                cfg.run.start_date = parse_date(s)?;
            }
            if let Some(e) = end.as_deref() {
                cfg.run.end_date = parse_date(e)?;
            }
            if let Some(path) = checkpoint {
                cfg.paths.checkpoint = path;
            }
            if let Some(path) = output {
                cfg.paths.output = path;
            }
            if continue_on_error {
                cfg.run.failure_policy = FailurePolicy::Continue;
            }
            if images.is_some() {
                cfg.paths.image_dir = images;
            }
            cfg.validate()?;
            run_harvest(&cfg, synthetic)
        }
        Commands::Rebuild {
            checkpoint,
            output,
            top_k,
            config,
        } => {
            let cfg = load_config(config.as_deref())?;
            let top_k = top_k.unwrap_or(cfg.run.top_k);
            if top_k == 0 {
                bail!("--top-k must be at least 1");
            }
            let out = rebuild(&checkpoint, &output, top_k, &cfg.smoothing.weights)?;
            println!(
                "Rebuilt {} smoothed weeks from {} days ({} to {})",
                out.metadata.total_weeks,
                out.metadata.total_days,
                out.metadata.run_start,
                out.metadata.run_end
            );
            println!("Output written to: {}", output.display());
            Ok(())
        }
        Commands::Status { checkpoint } => run_status(&checkpoint),
    }
}

fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    match path {
        Some(p) => HarvestConfig::from_file(p)
            .with_context(|| format!("loading config from {}", p.display())),
        None => Ok(HarvestConfig::default()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn run_harvest(cfg: &HarvestConfig, synthetic: bool) -> Result<()> {
    let fetcher: Box<dyn SourceFetcher> = if synthetic {
        let depth = cfg.source.listing_depth;
        Box::new(ScriptedFetcher::with_generator(move |day| synthetic_listings(day, depth)))
    } else {
        Box::new(CoinMarketCapFetcher::new(cfg.source_timeout(), cfg.source.listing_depth)?)
    };

    let images = match &cfg.paths.image_dir {
        Some(dir) if synthetic => {
            warn!(dir = %dir.display(), "logo download is disabled for synthetic runs");
            None
        }
        Some(dir) => Some(ImageStore::new(
            dir,
            Box::new(HttpImageSource::new(cfg.source_timeout())?),
        )),
        None => None,
    };

    let summary = run_pipeline(cfg, fetcher.as_ref(), &ThreadSleeper, images.as_ref())?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PipelineSummary) {
    let r = &summary.report;
    println!();
    println!("=== Harvest Summary ===");
    println!("Range:          {} to {}", r.run_start, r.run_end);
    match r.resumed_from {
        Some(day) => println!("Resumed from:   {day}"),
        None => println!("Resumed from:   (fresh run)"),
    }
    println!("Days:           {}", r.total_days);
    println!("Fetched now:    {}", r.fetched_this_run);
    println!("Missing days:   {}", r.missing_days);
    println!("Success rate:   {:.1}%", r.success_rate() * 100.0);
    if r.dropped_records > 0 {
        println!("Dropped rows:   {}", r.dropped_records);
    }
    if r.flush_failures > 0 {
        println!("Failed saves:   {}", r.flush_failures);
    }
    if let Some(img) = r.images {
        println!(
            "Logos:          {} downloaded, {} reused, {} failed",
            img.downloaded, img.reused, img.failed
        );
    }
    println!("Weekly buckets: {}", summary.weekly_buckets);
    println!("Smoothed weeks: {}", summary.smoothed_weeks);
    println!("Output:         {}", summary.output.display());
}

fn run_status(path: &Path) -> Result<()> {
    let store = CheckpointStore::new(path);
    let Some(cp) = store.load()? else {
        println!("No checkpoint at {}", path.display());
        return Ok(());
    };

    let total_span = (cp.run_end - cp.run_start).num_days() + 1;
    println!("Checkpoint:     {}", path.display());
    println!("Run range:      {} to {} ({total_span} days)", cp.run_start, cp.run_end);
    match cp.last_committed_date {
        Some(day) => println!("Committed:      {day}"),
        None => println!("Committed:      (nothing yet)"),
    }
    if let Some(day) = cp.last_attempted_date {
        println!("Last attempted: {day}");
    }
    println!("Day count:      {}", cp.day_count);
    println!("Missing days:   {}", cp.missing_days());
    if let Some(saved) = cp.saved_at {
        println!("Saved at:       {}", saved.to_rfc3339());
    }
    let remaining = total_span - cp.day_count as i64;
    if remaining > 0 {
        println!("Next day:       {} ({remaining} remaining)", cp.resume_date());
    } else {
        println!("Next day:       (range complete)");
    }
    Ok(())
}
