use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, error::ErrorKind};
use serde::Serialize;

use crate::cache::CachedSource;
use crate::config::CacheConfig;
use crate::metrics::CacheStats;
use crate::slicing::{FileSliceMetadataStore, SliceByTime, SlicedSource};
use crate::source::{SampleSource, SyntheticRecordings};
use crate::types::Timestamp;

#[derive(Debug, Parser)]
#[command(
    name = "cache_walkthrough",
    disable_help_subcommand = true,
    about = "Slice synthetic event recordings and cache the slices on disk",
    long_about = "Generate synthetic event recordings, slice them into fixed time windows, wrap the slices in a disk cache, and time a cold pass against a warm pass.",
    after_help = "Set RUST_LOG=slicecache=debug to see individual cache misses."
)]
struct CacheWalkthroughCli {
    #[arg(
        long = "cache-dir",
        value_name = "PATH",
        default_value = "cache/walkthrough",
        help = "Directory holding cache entries"
    )]
    cache_dir: PathBuf,
    #[arg(
        long = "metadata-path",
        value_name = "PATH",
        help = "Optional slice metadata store file (reused across runs)"
    )]
    metadata_path: Option<PathBuf>,
    #[arg(long, default_value_t = 16, help = "Number of synthetic recordings")]
    recordings: usize,
    #[arg(
        long = "events-per-recording",
        default_value_t = 20_000,
        help = "Events generated per recording"
    )]
    events_per_recording: usize,
    #[arg(
        long = "time-window",
        default_value_t = 250_000,
        help = "Slice window length in microseconds"
    )]
    time_window: Timestamp,
    #[arg(long, default_value_t = 0, help = "Slice overlap in microseconds")]
    overlap: Timestamp,
    #[arg(
        long = "num-copies",
        default_value_t = 1,
        help = "Cached copies kept per slice"
    )]
    num_copies: usize,
    #[arg(long, default_value_t = 99, help = "Seed for the synthetic recordings")]
    seed: u64,
    #[arg(long, help = "Clear existing cache entries before the first pass")]
    reset: bool,
    #[arg(long, help = "Fill the cache in parallel before the timed passes")]
    warm: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

/// Summary printed at the end of a walkthrough run.
#[derive(Debug, Serialize)]
struct WalkthroughReport {
    recordings: usize,
    slices: usize,
    warmed_entries: usize,
    first_pass_ms: u128,
    second_pass_ms: u128,
    entries_on_disk: usize,
    stats: CacheStats,
}

/// Run the slicing + caching walkthrough with CLI-style arguments.
pub fn run_cache_walkthrough<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<CacheWalkthroughCli, _>(
        std::iter::once("cache_walkthrough".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let recordings =
        SyntheticRecordings::new("synthetic", cli.recordings, cli.events_per_recording, cli.seed);
    let slicer = SliceByTime::new(cli.time_window).with_overlap(cli.overlap);
    let sliced = match &cli.metadata_path {
        Some(path) => {
            let store = FileSliceMetadataStore::open(path)?;
            println!(
                "Persisting slice metadata to {}",
                store.path().display()
            );
            SlicedSource::with_metadata_store(recordings, slicer, &store)?
        }
        None => SlicedSource::new(recordings, slicer)?,
    };
    let slices = sliced.len();
    println!(
        "Sliced {} recordings into {} windows of {}us",
        cli.recordings, slices, cli.time_window
    );

    let config = CacheConfig::at(&cli.cache_dir)
        .with_reset(cli.reset)
        .with_num_copies(cli.num_copies);
    let cache = CachedSource::new(sliced, config)?;
    println!("Caching slices under {}", cache.cache_root().display());

    let warmed_entries = if cli.warm { cache.warm()? } else { 0 };
    let first_pass = timed_pass(&cache)?;
    let second_pass = timed_pass(&cache)?;

    let report = WalkthroughReport {
        recordings: cli.recordings,
        slices,
        warmed_entries,
        first_pass_ms: first_pass.as_millis(),
        second_pass_ms: second_pass.as_millis(),
        entries_on_disk: cache.entry_count()?,
        stats: cache.stats(),
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn timed_pass(cache: &CachedSource) -> Result<Duration, Box<dyn Error>> {
    let start = Instant::now();
    let mut events = 0usize;
    for index in 0..cache.len() {
        let sample = cache.get(index)?;
        events += sample.events().map(<[_]>::len).unwrap_or(0);
    }
    let elapsed = start.elapsed();
    println!(
        "Read {} slices ({} events) in {:.2}s",
        cache.len(),
        events,
        elapsed.as_secs_f64()
    );
    Ok(elapsed)
}

fn print_report(report: &WalkthroughReport) {
    println!("=== cache walkthrough ===");
    println!("recordings      : {}", report.recordings);
    println!("slices          : {}", report.slices);
    if report.warmed_entries > 0 {
        println!("warmed entries  : {}", report.warmed_entries);
    }
    println!("first pass      : {} ms", report.first_pass_ms);
    println!("second pass     : {} ms", report.second_pass_ms);
    println!("entries on disk : {}", report.entries_on_disk);
    println!(
        "hits / misses   : {} / {} (hit ratio {:.2})",
        report.stats.hits,
        report.stats.misses,
        report.stats.hit_ratio()
    );
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
