use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sabuild::build::make_part;
use sabuild::config::{Collaborator, PipelineConfig};
use sabuild::error::{PipelineError, EXIT_FAILURE};
use sabuild::logging::{init_logger, level_for};
use sabuild::merge::merge_slices;
use sabuild::output::{print_error, print_report};
use sabuild::pipeline::{default_output_path, Pipeline};
use sabuild::utils::resolve_threads;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sabuild")]
#[command(about = "Partitioned suffix array builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the suffix table of a corpus
    Run(RunArgs),
    /// Build one partition's range slice and table (worker)
    MakePart {
        /// Corpus file
        #[arg(long)]
        data_file: PathBuf,

        /// First byte of the range
        #[arg(long)]
        start_byte: u64,

        /// End of the range (exclusive)
        #[arg(long)]
        end_byte: u64,
    },
    /// Merge partition tables in the given order (worker)
    Merge {
        /// Where to write the merged table
        #[arg(long)]
        output_file: PathBuf,

        /// Partition slice files (`<corpus>.part.<start>-<end>`), in order
        #[arg(long = "suffix-path", required = true)]
        suffix_paths: Vec<PathBuf>,

        /// Merge threads (0 = all hardware threads)
        #[arg(long, default_value_t = 0)]
        num_threads: usize,
    },
    /// Print the effective configuration as JSON
    ShowConfig {
        /// Config file (defaults to config.json in the app data directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Corpus file
    data_file: PathBuf,

    /// Output table (defaults to <DATA_FILE>.table.bin)
    output_table: Option<PathBuf>,

    /// Config file (defaults to config.json in the app data directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of partitions
    #[arg(long)]
    total_jobs: Option<usize>,

    /// Partition builds running at once
    #[arg(long)]
    jobs_at_once: Option<usize>,

    /// Bytes each partition extends past its nominal end
    #[arg(long)]
    overlap: Option<u64>,

    /// Give up after this many retry waves (default: retry forever)
    #[arg(long)]
    max_retry_waves: Option<u32>,

    /// Pause between retry waves, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Merge threads (0 = all hardware threads)
    #[arg(long)]
    merge_threads: Option<usize>,

    /// Required bytes per suffix index in the output
    #[arg(long)]
    index_width: Option<usize>,

    /// Parent directory for the per-run scratch directory
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Run partition builds and the merge inside this process
    #[arg(long, conflicts_with_all = ["builder_cmd", "merge_cmd"])]
    in_process: bool,

    /// External program used as partition builder
    #[arg(long)]
    builder_cmd: Option<PathBuf>,

    /// External program used as merger
    #[arg(long)]
    merge_cmd: Option<PathBuf>,
}

impl RunArgs {
    /// Load the config file and apply command-line overrides
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;

        if let Some(v) = self.total_jobs {
            config.total_jobs = v;
        }
        if let Some(v) = self.jobs_at_once {
            config.jobs_at_once = v;
        }
        if let Some(v) = self.overlap {
            config.overlap = v;
        }
        if let Some(v) = self.max_retry_waves {
            config.max_retry_waves = Some(v);
        }
        if let Some(v) = self.retry_delay_ms {
            config.retry_delay_ms = v;
        }
        if let Some(v) = self.merge_threads {
            config.merge_threads = v;
        }
        if let Some(v) = self.index_width {
            config.index_width = Some(v);
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if self.in_process {
            config.builder = Collaborator::InProcess;
            config.merger = Collaborator::InProcess;
        }
        if let Some(program) = &self.builder_cmd {
            config.builder = Collaborator::Program(program.clone());
        }
        if let Some(program) = &self.merge_cmd {
            config.merger = Collaborator::Program(program.clone());
        }

        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logger(level_for(cli.verbose, cli.quiet));
    let color = !cli.no_color;

    if let Err(err) = run(cli.command, color, !cli.quiet) {
        let _ = print_error(&err, color);
        let code = err
            .downcast_ref::<PipelineError>()
            .map(PipelineError::exit_code)
            .unwrap_or(EXIT_FAILURE);
        std::process::exit(code);
    }
}

fn run(command: Commands, color: bool, chatty: bool) -> Result<()> {
    match command {
        Commands::Run(args) => {
            let config = args.resolve_config()?;
            let output = args
                .output_table
                .clone()
                .unwrap_or_else(|| default_output_path(&args.data_file));

            let pipeline =
                Pipeline::new(config)?.with_progress(chatty && std::io::stderr().is_terminal());
            let report = pipeline.run(&args.data_file, &output)?;

            if chatty {
                print_report(&report, color)?;
            }
        }
        Commands::MakePart {
            data_file,
            start_byte,
            end_byte,
        } => {
            let table = make_part(&data_file, start_byte, end_byte).with_context(|| {
                format!(
                    "Failed to build partition {}-{} of {}",
                    start_byte,
                    end_byte,
                    data_file.display()
                )
            })?;
            log::info!("Wrote {}", table.display());
        }
        Commands::Merge {
            output_file,
            suffix_paths,
            num_threads,
        } => {
            merge_slices(&output_file, &suffix_paths, resolve_threads(num_threads))
                .with_context(|| format!("Failed to merge into {}", output_file.display()))?;
            log::info!("Wrote {}", output_file.display());
        }
        Commands::ShowConfig { config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
