mod dataset;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use h5filter_core::pipeline::{self, gating};
use h5filter_core::{
    CodecTable, DatasetCreation, Datatype, EngineConfig, FILTER_DEFLATE, FILTER_FLETCHER32,
    FILTER_LZ4, FILTER_SHUFFLE, FILTER_ZSTD, FileChunkStore, FilterFlags, FilterId, FilterRegistry,
    OpenMode, ParallelWriter, WriteSummary,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::dataset::SyntheticDataset;

#[derive(Parser)]
#[command(
    name = "h5filter",
    version,
    about = "Parallel filtered chunk writer",
    long_about = "Filter a synthetic int32 dataset chunk by chunk on a worker pool and store the result."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic dataset through a filter pipeline.
    Write {
        /// Destination chunk file.
        #[arg(short, long, default_value = "Outfile.h5fc")]
        output: PathBuf,

        /// Dataset rows.
        #[arg(long, default_value_t = 16 * 1024)]
        rows: u64,

        /// Dataset columns.
        #[arg(long, default_value_t = 4 * 1024)]
        cols: u64,

        /// Chunk rows.
        #[arg(long, default_value_t = 4 * 1024)]
        chunk_rows: u64,

        /// Chunk columns.
        #[arg(long, default_value_t = 1024)]
        chunk_cols: u64,

        /// Filters to apply, in order (comma separated).
        #[arg(long, value_enum, value_delimiter = ',', default_value = "lz4")]
        filters: Vec<FilterArg>,

        /// Worker threads (defaults to H5_NTHREADS, or 1 when unset).
        #[arg(long)]
        threads: Option<usize>,

        /// Deflate compression level (0-9).
        #[arg(long, default_value_t = 6)]
        deflate_level: u32,

        /// LZ4 block size passed to the plugin.
        #[arg(long, default_value_t = 8 * 1024)]
        lz4_block: u32,

        /// Zstandard compression level passed to the plugin.
        #[arg(long, default_value_t = 3)]
        zstd_level: u32,

        /// Read every chunk back and compare it with the generated data.
        #[arg(long, default_value_t = false)]
        verify: bool,
    },
    /// List registered filters or check one filter's availability.
    Filters {
        /// Filter id to look up (loads a plugin when needed).
        #[arg(long)]
        id: Option<FilterId>,
    },
    /// Summarise the chunks stored in a chunk file.
    Inspect {
        /// Chunk file to read.
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FilterArg {
    Shuffle,
    Deflate,
    Fletcher32,
    Lz4,
    Zstd,
}

impl FilterArg {
    fn id(self) -> FilterId {
        match self {
            FilterArg::Shuffle => FILTER_SHUFFLE,
            FilterArg::Deflate => FILTER_DEFLATE,
            FilterArg::Fletcher32 => FILTER_FLETCHER32,
            FilterArg::Lz4 => FILTER_LZ4,
            FilterArg::Zstd => FILTER_ZSTD,
        }
    }

    fn is_plugin(self) -> bool {
        matches!(self, FilterArg::Lz4 | FilterArg::Zstd)
    }
}

struct FilterSettings {
    deflate_level: u32,
    lz4_block: u32,
    zstd_level: u32,
}

impl FilterSettings {
    fn client_data(&self, filter: FilterArg) -> Vec<u32> {
        match filter {
            FilterArg::Deflate => vec![self.deflate_level],
            FilterArg::Lz4 => vec![self.lz4_block],
            FilterArg::Zstd => vec![self.zstd_level],
            FilterArg::Shuffle | FilterArg::Fletcher32 => Vec::new(),
        }
    }
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Write {
            output,
            rows,
            cols,
            chunk_rows,
            chunk_cols,
            filters,
            threads,
            deflate_level,
            lz4_block,
            zstd_level,
            verify,
        } => {
            let dataset = SyntheticDataset::new(rows, cols, chunk_rows, chunk_cols)?;
            let settings = FilterSettings {
                deflate_level,
                lz4_block,
                zstd_level,
            };
            write_command(&output, dataset, &filters, threads, &settings, verify)?
        }
        Commands::Filters { id } => filters_command(id)?,
        Commands::Inspect { input } => inspect_command(&input)?,
    }

    Ok(())
}

fn engine_config(base: EngineConfig, threads: Option<usize>) -> EngineConfig {
    match threads {
        Some(threads) => base.with_thread_count(threads),
        None => base,
    }
}

fn write_command(
    output: &Path,
    dataset: SyntheticDataset,
    filters: &[FilterArg],
    threads: Option<usize>,
    settings: &FilterSettings,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = engine_config(EngineConfig::from_env(), threads);
    let registry = FilterRegistry::global();
    tracing::debug!(
        threads = config.thread_count,
        plugin_dir = %config.plugin_dir.display(),
        chunks = dataset.chunk_count(),
        "engine configured"
    );

    let mut dcpl = DatasetCreation::chunked(dataset.chunk_dims().to_vec());
    for filter in filters {
        let id = filter.id();
        if filter.is_plugin() && !registry.is_available(id)? {
            println!("Filter {id} not found. Not applied.");
            continue;
        }

        let client_data = settings.client_data(*filter);
        match client_data.first() {
            Some(setting) if filter.is_plugin() => {
                println!("Filter {id} available. Being applied. Block-Setting: {setting}.")
            }
            _ => println!("Filter {id} applied."),
        }
        dcpl.pipeline_mut()
            .append(id, FilterFlags::MANDATORY, &client_data)?;
    }
    let refused = gating::prepare(&mut dcpl, &Datatype::int32(), registry)?;

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(FileChunkStore::create(output)?);
    let writer = ParallelWriter::prepare(dcpl.pipeline().clone(), &config, registry, store.clone())?
        .with_exclude(refused);

    println!("Beginning write...");
    let started_at = Instant::now();
    let summary = writer.write_chunks(dataset.chunks(), &config)?;
    store.sync()?;
    let elapsed = started_at.elapsed();
    println!("Write completed.");

    print_summary(output, &dataset, &config, &summary, elapsed, store.file_len());
    summary.into_result()?;

    if verify {
        verify_output(output, &dataset, &dcpl, &config, registry)?;
        println!("  verify: {} chunks match", dataset.chunk_count());
    }

    Ok(())
}

fn verify_output(
    output: &Path,
    dataset: &SyntheticDataset,
    dcpl: &DatasetCreation,
    config: &EngineConfig,
    registry: &FilterRegistry,
) -> Result<(), Box<dyn std::error::Error>> {
    let codecs = CodecTable::resolve(dcpl.pipeline(), OpenMode::Read, &config.plugin_dir, registry)?;
    let store = FileChunkStore::open(output)?;

    for expected in dataset.chunks() {
        let stored = store
            .read_chunk(&expected.offset)?
            .ok_or_else(|| format!("chunk {} missing from {}", expected.index, output.display()))?;
        let restored =
            pipeline::decode_chunk(dcpl.pipeline(), &codecs, &stored.data, stored.filter_mask)?;
        if restored != expected.data {
            return Err(format!("chunk {} differs after read back", expected.index).into());
        }
    }

    Ok(())
}

fn filters_command(id: Option<FilterId>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = FilterRegistry::global();

    if let Some(id) = id {
        if registry.is_available(id)? {
            let config = registry.filter_config(id)?;
            println!(
                "filter {id} available (encode {}, decode {})",
                config.encode_enabled(),
                config.decode_enabled()
            );
        } else {
            println!("Filter {id} not found.");
        }
        return Ok(());
    }

    println!("registered filters:");
    for class in registry.classes() {
        println!(
            "  {:>5}  {:<12} encode {:<5} decode {}",
            class.id(),
            class.name(),
            class.encoder_present(),
            class.decoder_present()
        );
    }
    Ok(())
}

fn inspect_command(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileChunkStore::open(input)?;
    let records = store.records();
    let stored_bytes: u64 = records.iter().map(|(_, record)| record.len).sum();
    let partial = records
        .iter()
        .filter(|(_, record)| !record.filter_mask.is_empty())
        .count();

    println!("chunk file: {}", input.display());
    println!("  file size: {}", format_bytes(store.file_len()));
    println!("  chunks: {}", records.len());
    println!("  stored bytes: {}", format_bytes(stored_bytes));
    println!("  chunks with skipped filters: {partial}");
    if let (Some((first, _)), Some((last, _))) = (records.first(), records.last()) {
        println!("  offsets: {first:?} .. {last:?}");
    }
    Ok(())
}

fn print_summary(
    output: &Path,
    dataset: &SyntheticDataset,
    config: &EngineConfig,
    summary: &WriteSummary,
    elapsed: Duration,
    file_len: u64,
) {
    let elapsed_secs = elapsed.as_secs_f64().max(1e-6);
    let raw = summary.raw_bytes() as u64;
    let stored = summary.stored_bytes() as u64;
    let ratio = if raw > 0 { stored as f64 / raw as f64 } else { 1.0 };
    let [rows, cols] = dataset.dims();
    let [chunk_rows, chunk_cols] = dataset.chunk_dims();

    println!("write complete");
    println!("  output: {}", output.display());
    println!("  dataset: {rows}x{cols} int32 ({})", format_bytes(dataset.total_bytes()));
    println!(
        "  chunks: {} of {chunk_rows}x{chunk_cols} ({} failed)",
        summary.chunk_count(),
        summary.failures.len()
    );
    println!("  elapsed: {}", format_duration(elapsed));
    println!("  raw bytes: {}", format_bytes(raw));
    println!("  stored bytes: {}", format_bytes(stored));
    println!("  file size: {}", format_bytes(file_len));
    println!("  stored/raw ratio: {ratio:.3}x");
    println!("  throughput: {}/s", format_rate(raw as f64 / elapsed_secs));

    let workers = &summary.runtime.workers;
    let max_tasks = workers.iter().map(|worker| worker.tasks_completed).max().unwrap_or(0);
    let min_tasks = workers.iter().map(|worker| worker.tasks_completed).min().unwrap_or(0);
    println!(
        "  scheduler: {} workers | task balance min/max {min_tasks}/{max_tasks}",
        config.thread_count
    );
    println!("  worker runtime:");
    for worker in workers {
        println!(
            "    w{:02} tasks {:>6} | uptime {:>8} | busy {:>8} | idle {:>8} | util {:>6.2}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.uptime),
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }

    for failure in &summary.failures {
        println!("  failed chunk {} at {:?}: {}", failure.index, failure.offset, failure.error);
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
