#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "sweepsim")]
#[command(about = "Inspect and maintain parameter-sweep projects")]
struct Args {
    /// Log level for console output (debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the expanded parameter sets of a configuration as JSON lines
    Grid {
        config: PathBuf,

        /// Base for log-scaled axes
        #[arg(long, default_value_t = sweepsim_core::DEFAULT_LOG_BASE)]
        base: f64,
    },

    /// Print the configuration hash used to name a sweep's artifacts
    Hash {
        config: PathBuf,

        #[arg(short, long)]
        project: String,
    },

    /// Print the shape and metadata of a result container
    Inspect { file: PathBuf },

    /// Remove temporary files and artifacts no data file refers to
    Clean {
        #[arg(short, long)]
        project: String,

        /// Output root holding `simulations/<project>`
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Configuration whose artifacts are kept regardless of data files
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        purge_data: bool,

        #[arg(long)]
        purge_logs: bool,
    },
}

#[cfg(feature = "cli")]
fn main() -> color_eyre::Result<()> {
    use color_eyre::eyre::WrapErr;
    use sweepsim::io::{inspect_data, load_config};
    use sweepsim::{LogConfig, SimulationEnvironment, init_console};
    use sweepsim_core::{compute_hash, expand_parameter_sets, generate_grid};

    color_eyre::install()?;

    let args = Args::parse();
    init_console(&args.log_level)?;

    match args.command {
        Command::Grid { config, base } => {
            let config = load_config(&config)?;
            let grid = generate_grid(&config.parameters, base)?;
            for set in expand_parameter_sets(&config.system, &grid) {
                println!("{}", serde_json::to_string(&set)?);
            }
        }
        Command::Hash { config, project } => {
            let config = load_config(&config)?;
            println!("{}", compute_hash(&config.to_value(), &project));
        }
        Command::Inspect { file } => {
            let summary = inspect_data(&file)
                .wrap_err_with(|| format!("Failed to inspect {}", file.display()))?;
            println!("format: {:?}", summary.format);
            println!("compressed: {}", summary.compressed);
            println!("records: {}", summary.records);
            println!("{}", serde_json::to_string_pretty(&summary.metadata)?);
        }
        Command::Clean {
            project,
            output,
            config,
            purge_data,
            purge_logs,
        } => {
            let mut env = SimulationEnvironment::<serde_json::Value>::new(&project, &output)?;
            if let Some(config) = config {
                env.setup(&config, LogConfig::default())?;
            }
            env.cleanup(!purge_data, !purge_logs)?;
            tracing::info!("Cleaned {env}");
        }
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("This binary requires the 'cli' feature.");
}
