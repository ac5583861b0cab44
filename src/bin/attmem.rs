use anyhow::Context;
use attmem::config::Config;
use attmem::{analysis, extractor, Resolution};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "attmem")]
#[command(about = "Per-object memorability from attention maps and tracks, plus its statistics.")]
struct Cli {
    /// JSON config, CLI flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every tracked object against the attention maps of its frames
    Extract {
        /// Headerless MOT tracking file
        #[arg(long, value_name = "PATH")]
        tracks: Option<PathBuf>,
        /// Directory of img{frame:06}_step{N}.npy attention maps
        #[arg(long, value_name = "DIR")]
        attention: Option<PathBuf>,
        /// Directory receiving object_memorability.json and total_memorability.json
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
        #[arg(long, value_name = "PX", requires = "original_height")]
        original_width: Option<u32>,
        #[arg(long, value_name = "PX", requires = "original_width")]
        original_height: Option<u32>,
    },
    /// Regressions, correlations and colour tables over per-object stats
    Analyze {
        /// Consolidated per-object stats CSV
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,
        /// Directory receiving models/ and tables/
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

fn init_logger(level: &str) -> anyhow::Result<()> {
    let filter: log::LevelFilter = level
        .parse()
        .with_context(|| format!("invalid --log-level `{}`", level))?;

    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .init();

    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    init_logger(&cli.log_level)?;

    let config = Config::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Commands::Extract {
            tracks,
            attention,
            out,
            original_width,
            original_height,
        } => {
            let mut config = config.extract;
            if let Some(tracks) = tracks {
                config.tracks = tracks;
            }
            if let Some(attention) = attention {
                config.attention_dir = attention;
            }
            if let Some(out) = out {
                std::fs::create_dir_all(&out)
                    .with_context(|| format!("creating {}", out.display()))?;
                config = config.with_output_dir(out);
            }
            if let (Some(w), Some(h)) = (original_width, original_height) {
                config.original = Resolution::new(w, h);
            }

            extractor::run(&config).context("extracting memorability")?;
        }
        Commands::Analyze { input, out } => {
            let mut config = config.analysis;
            if let Some(input) = input {
                config.input = input;
            }
            if let Some(out) = out {
                config = config.with_output_dir(out);
            }

            analysis::run(&config).context("analysing object stats")?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}
