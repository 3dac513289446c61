use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use romcrush_core::{load_config, load_default_config, validate_config, CategorySet, Config};

pub mod cleanup;
pub mod convert;
pub mod extract;
pub mod ledger;
pub mod names;
pub mod relocate;
pub mod scan;

/// Configuration file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "romcrush.toml";

#[derive(Parser)]
#[command(
    name = "romcrush",
    version = env!("CARGO_PKG_VERSION"),
    about = "Batch-compress PS1, PS2 and PSP disc images to CHD, CSO or ZSO",
    long_about = "romcrush discovers CUE/BIN and ISO disc images, converts them with chdman \
                  or maxcso on a resource-aware worker pool, and resumes interrupted batches \
                  from a progress ledger."
)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "ROMCRUSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what a batch would convert
    Scan(scan::ScanArgs),
    /// Convert every disc image under a directory
    Convert(convert::ConvertArgs),
    /// Extract archives in place
    Extract(extract::ExtractArgs),
    /// List or delete archives that were already extracted
    Cleanup(cleanup::CleanupArgs),
    /// Strip region and revision tags from ROM file names
    CleanNames(names::CleanNamesArgs),
    /// Move or copy converted images to another folder
    Relocate(relocate::RelocateArgs),
    /// Inspect or reset the progress ledger
    Ledger(ledger::LedgerArgs),
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        setup_logging(self.verbose, self.json_logs);

        let config = load(self.config.as_deref())?;

        match self.command {
            Commands::Scan(args) => scan::execute(args, &config).await,
            Commands::Convert(args) => convert::execute(args, config).await,
            Commands::Extract(args) => extract::execute(args, &config).await,
            Commands::Cleanup(args) => cleanup::execute(args).await,
            Commands::CleanNames(args) => names::execute(args).await,
            Commands::Relocate(args) => relocate::execute(args).await,
            Commands::Ledger(args) => ledger::execute(args, &config).await,
        }
    }
}

fn setup_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Explicit file, then `romcrush.toml` in the working directory, then defaults.
/// Environment overrides apply in every case.
fn load(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            load_config(path).with_context(|| format!("Failed to load config from {:?}", path))?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
            load_config(Path::new(DEFAULT_CONFIG_FILE))
                .with_context(|| format!("Failed to load config from {}", DEFAULT_CONFIG_FILE))?
        }
        None => load_default_config().context("Failed to load default configuration")?,
    };

    validate_config(&config).context("Configuration validation failed")?;
    Ok(config)
}

/// Batch outcome mapped to a process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Clean,
    Fatal,
    Incomplete,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Clean => ExitCode::SUCCESS,
            Status::Fatal => ExitCode::from(1),
            Status::Incomplete => ExitCode::from(2),
        }
    }
}

/// Disc image categories selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CategoryArg {
    Ps1Cue,
    Ps2Cue,
    Ps2Iso,
    PspIso,
    All,
}

/// Directory and filters shared by `scan` and `convert`.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory to scan
    pub dir: PathBuf,

    /// Only look at the top-level directory
    #[arg(long)]
    pub no_recursive: bool,

    /// Categories to include, comma separated (default: ps1-cue,ps2-iso)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub categories: Vec<CategoryArg>,
}

impl SourceArgs {
    pub fn recursive(&self) -> bool {
        !self.no_recursive
    }

    pub fn category_set(&self) -> CategorySet {
        if self.categories.is_empty() {
            return CategorySet::default();
        }
        let mut set = CategorySet::none();
        for category in &self.categories {
            match category {
                CategoryArg::Ps1Cue => set.ps1_cue = true,
                CategoryArg::Ps2Cue => set.ps2_cue = true,
                CategoryArg::Ps2Iso => set.ps2_iso = true,
                CategoryArg::PspIso => set.psp_iso = true,
                CategoryArg::All => set = CategorySet::all(),
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "romcrush",
            "-v",
            "convert",
            "/roms",
            "--categories",
            "ps2-iso,psp-iso",
            "--workers",
            "3",
            "--fresh",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Convert(args) => {
                let set = args.source.category_set();
                assert!(set.ps2_iso && set.psp_iso);
                assert!(!set.ps1_cue);
                assert_eq!(args.workers, Some(3));
                assert!(args.fresh);
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_default_categories() {
        let cli = Cli::try_parse_from(["romcrush", "scan", "/roms"]).unwrap();
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.source.category_set(), CategorySet::default());
                assert!(args.source.recursive());
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_ledger_subcommand() {
        let cli = Cli::try_parse_from(["romcrush", "ledger", "clear"]).unwrap();
        assert!(matches!(cli.command, Commands::Ledger(_)));
    }

    #[test]
    fn test_clap_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
