// main.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Context, Error, Result};
use clap::Parser;
use log::{debug, info, warn};
use rand_recom::{
    vcf::{OutputFormat, VcfRecordSink, VcfRecordSource, VcfSinkOptions},
    ContigLengths, RecordSource, RecordTransformer, SchedulingMode, SwitchDiagnostics,
};
use std::{
    fs::File,
    io::{self, BufWriter},
    time::Instant,
};

// --- Main Function ---
fn main() -> Result<(), Error> {
    let total_time_start = Instant::now();
    let cli_args = cli::CliArgs::parse();

    // Initialize logger
    let log_level = cli_args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: Invalid log level '{}' provided. Defaulting to Info.",
                cli_args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_micros()
        .init();

    info!("Starting rand-recom with args: {:?}", cli_args);

    // --- 1. Validate Configuration ---
    let config = cli_args.simulation_config();
    config.validate()?;
    info!(
        "Seed {}, target segment length {}, {:?} policy, {:?} collisions, {:?} scheduling.",
        config.seed, config.target_segment_length, config.policy, config.collision, config.mode
    );

    let contig_lengths = match (&cli_args.contig_lengths, config.mode) {
        (Some(path), SchedulingMode::Precomputed) => Some(ContigLengths::from_path(path)?),
        (Some(path), SchedulingMode::Streaming) => {
            warn!(
                "--contig-lengths {} is only used by precomputed scheduling; ignoring it.",
                path.display()
            );
            None
        }
        (None, SchedulingMode::Precomputed) => {
            info!("Using built-in GRCh38 contig lengths.");
            Some(ContigLengths::grch38())
        }
        (None, SchedulingMode::Streaming) => None,
    };

    // --- 2. Open Input and Output ---
    let mut source = VcfRecordSource::open(&cli_args.input)?;
    let sink_options = VcfSinkOptions {
        path: cli_args.output.clone(),
        format: cli_args
            .output_format
            .unwrap_or_else(|| OutputFormat::from_path(cli_args.output.as_deref())),
        compression_level: cli_args.compression_level,
        keep_sample_names: cli_args.keep_sample_names,
    };
    let sink = VcfRecordSink::create(source.header(), &sink_options)?;
    let progress_bar = progress::records_spinner()?;
    let mut sink = progress::ProgressSink::new(sink, progress_bar.clone());

    // --- 3. Transform ---
    let mut transformer = RecordTransformer::new(config);
    if let Some(lengths) = contig_lengths {
        debug!("Contig length table holds {} entries.", lengths.len());
        transformer = transformer.with_contig_lengths(lengths);
    }
    let summary = match transformer.run(&mut source, &mut sink) {
        Ok(summary) => summary,
        Err(e) => {
            progress_bar.abandon();
            return Err(anyhow!(e).context("recombination simulation failed"));
        }
    };
    progress_bar.finish_with_message("done");

    // --- 4. Report Switch Counts ---
    let sample_names = source.sample_names().to_vec();
    let diagnostics = SwitchDiagnostics::new(&sample_names, &summary)?;
    diagnostics.log_summary();
    match &cli_args.switch_counts {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create switch count file {}", path.display()))?;
            diagnostics.write_tsv(BufWriter::new(file))?;
            info!("Wrote per-sample switch counts to {}", path.display());
        }
        None => diagnostics.write_tsv(io::stderr().lock())?,
    }

    info!(
        "rand-recom finished successfully in {:.2?}: {} records on {} chromosome(s), {} haplotype slots, {} switches.",
        total_time_start.elapsed(),
        summary.records,
        summary.contigs,
        summary.slot_count,
        summary.switches
    );
    Ok(())
}

// --- Module Implementations ---

mod cli {
    use clap::Parser;
    use rand_recom::{
        vcf::OutputFormat, CollisionStrategy, SchedulingMode, SelectionPolicy, SimulationConfig,
    };
    use std::path::PathBuf;

    #[derive(Parser, Debug)]
    #[command(author, version, about = "Simulates random recombination by switching haplotypes in a VCF or BCF.", long_about = None, propagate_version = true)]
    pub(crate) struct CliArgs {
        /// Input VCF or BCF, optionally BGZF-compressed; `-` reads stdin.
        /// The format is detected from content.
        #[arg(default_value = "-")]
        pub(crate) input: PathBuf,

        /// Output path (default: stdout).
        #[arg(short, long)]
        pub(crate) output: Option<PathBuf>,

        /// Output format; guessed from the output extension when omitted.
        #[arg(short = 'O', long, value_enum)]
        pub(crate) output_format: Option<OutputFormat>,

        /// BGZF compression level for vcf.gz and bcf output.
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=9))]
        pub(crate) compression_level: Option<u8>,

        /// Non-zero seed for the pseudorandom number generator.
        #[arg(short, long, allow_negative_numbers = true)]
        pub(crate) seed: i64,

        /// Target segment length in bp.
        #[arg(short = 't', long = "target-length")]
        pub(crate) target_length: f64,

        /// Enforce a uniform distribution of switch counts per haplotype.
        #[arg(short, long)]
        pub(crate) uniform: bool,

        #[arg(long, value_enum, default_value_t = CollisionStrategy::Advance)]
        pub(crate) collision: CollisionStrategy,

        #[arg(long, value_enum, default_value_t = SchedulingMode::Streaming)]
        pub(crate) mode: SchedulingMode,

        /// Two-column name/length table (e.g. a .fai) for precomputed mode.
        #[arg(long)]
        pub(crate) contig_lengths: Option<PathBuf>,

        #[arg(long)]
        pub(crate) keep_sample_names: bool,

        /// Write per-sample switch counts here instead of stderr.
        #[arg(long)]
        pub(crate) switch_counts: Option<PathBuf>,

        #[arg(long, default_value = "Info")]
        pub(crate) log_level: String,
    }

    impl CliArgs {
        pub(crate) fn simulation_config(&self) -> SimulationConfig {
            let policy = if self.uniform {
                SelectionPolicy::Uniform
            } else {
                SelectionPolicy::Weighted
            };
            SimulationConfig::new(self.seed, self.target_length)
                .with_policy(policy)
                .with_collision(self.collision)
                .with_mode(self.mode)
        }
    }

}

mod progress {
    use anyhow::{anyhow, Result};
    use indicatif::{ProgressBar, ProgressStyle};
    use rand_recom::{GenotypeRecord, RecordSink};
    use std::time::Duration;

    pub(crate) fn records_spinner() -> Result<ProgressBar> {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} records written ({per_sec}) {msg}")
            .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?;
        let progress_bar = ProgressBar::new_spinner().with_style(style);
        progress_bar.enable_steady_tick(Duration::from_millis(120));
        Ok(progress_bar)
    }

    /// Counts records on a spinner as they reach the inner sink.
    pub(crate) struct ProgressSink<K> {
        inner: K,
        progress_bar: ProgressBar,
    }

    impl<K> ProgressSink<K> {
        pub(crate) fn new(inner: K, progress_bar: ProgressBar) -> Self {
            Self { inner, progress_bar }
        }
    }

    impl<M, K: RecordSink<M>> RecordSink<M> for ProgressSink<K> {
        fn write_record(&mut self, record: GenotypeRecord<M>) -> rand_recom::Result<()> {
            self.inner.write_record(record)?;
            self.progress_bar.inc(1);
            Ok(())
        }

        fn finish(&mut self) -> rand_recom::Result<()> {
            self.inner.finish()
        }
    }
}
