use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::{info, warn};

use romcrush_core::archive::ArchiveExtractor;
use romcrush_core::config::{Ps2Emulator, PostSuccessConfig};
use romcrush_core::discovery::IsoClassifier;
use romcrush_core::{
    open_ledger, BatchRequest, Config, Converter, Dispatcher, FormatPolicy, OutputFormat, Platform,
    ProcessConverter, ResourceMonitor, WorkDiscovery,
};

use super::{SourceArgs, Status};
use crate::metrics;
use crate::observer::{print_summary, ConsoleObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmulatorArg {
    Pcsx2,
    Aethersx2,
    Opl,
}

impl From<EmulatorArg> for Ps2Emulator {
    fn from(arg: EmulatorArg) -> Self {
        match arg {
            EmulatorArg::Pcsx2 => Ps2Emulator::Pcsx2,
            EmulatorArg::Aethersx2 => Ps2Emulator::Aethersx2,
            EmulatorArg::Opl => Ps2Emulator::Opl,
        }
    }
}

/// What to do with the source files once their image is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AfterArg {
    /// Leave sources where they are
    Keep,
    /// Move sources into a backup folder beside them
    Backup,
    /// Delete sources
    Delete,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Maximum concurrent conversions (default from config)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Output format for PS2 ISOs
    #[arg(long)]
    pub ps2_format: Option<OutputFormat>,

    /// Pick the PS2 format recommended for an emulator or loader
    #[arg(long, value_enum, conflicts_with = "ps2_format")]
    pub ps2_emulator: Option<EmulatorArg>,

    /// Output format for PSP ISOs
    #[arg(long)]
    pub psp_format: Option<OutputFormat>,

    /// Platform assumed for ISOs that cannot be classified
    #[arg(long)]
    pub unknown_iso: Option<Platform>,

    /// What to do with sources after a successful conversion (default from config)
    #[arg(long, value_enum)]
    pub after: Option<AfterArg>,

    /// Extract archives before scanning
    #[arg(long)]
    pub extract_archives: bool,

    /// Delete archives once extracted
    #[arg(long, requires = "extract_archives")]
    pub delete_archives: bool,

    /// Forget previous progress and start over
    #[arg(long)]
    pub fresh: bool,

    /// Write Prometheus metrics to this file when the batch ends
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ConvertArgs {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn to_request(&self, config: &Config) -> BatchRequest {
        let mut formats = config.formats.clone();
        if let Some(format) = self.ps2_format {
            formats.ps2_iso = Some(format);
        }
        if let Some(emulator) = self.ps2_emulator {
            formats.ps2_iso = None;
            formats.ps2_emulator = Some(emulator.into());
        }
        if let Some(format) = self.psp_format {
            formats.psp_iso = format;
        }

        let mut classification = config.classification.clone();
        if let Some(platform) = self.unknown_iso {
            classification.unknown_iso_default = Some(platform);
        }

        let post_success = match self.after {
            None => config.post_success.clone(),
            Some(AfterArg::Keep) => PostSuccessConfig::leave_in_place(),
            Some(AfterArg::Backup) => PostSuccessConfig {
                move_to_backup: true,
                delete_originals: false,
                ..config.post_success.clone()
            },
            Some(AfterArg::Delete) => PostSuccessConfig {
                move_to_backup: false,
                delete_originals: true,
                ..config.post_success.clone()
            },
        };

        let mut request = BatchRequest::from_config(&self.source.dir, config)
            .with_recursive(self.source.recursive())
            .with_categories(self.source.category_set())
            .with_format_policy(FormatPolicy::from_config(&formats, &classification))
            .with_post_success(post_success);
        if let Some(workers) = self.workers {
            request = request.with_max_workers(workers);
        }
        if self.extract_archives {
            request.extract_archives = true;
            request.delete_archives = self.delete_archives;
        }
        request
    }
}

pub async fn execute(args: ConvertArgs, config: Config) -> Result<ExitCode> {
    let converter = ProcessConverter::new(config.tools.clone());
    if let Err(e) = converter.validate().await {
        warn!(error = %e, "Tool check failed; categories that need it will be rejected");
    }

    let ledger = open_ledger(&config.ledger);
    if args.fresh {
        ledger.clear().context("Failed to clear progress ledger")?;
        info!("Progress ledger cleared");
    }

    let monitor = Arc::new(ResourceMonitor::system(config.resources.clone()));
    let dispatcher = Dispatcher::new(converter, ledger, monitor)
        .with_discovery(WorkDiscovery::new(IsoClassifier::new(
            config.classification.thresholds.clone(),
        )))
        .with_extractor(ArchiveExtractor::from_tools(&config.tools))
        .with_resource_check_interval(Duration::from_secs(
            config.scheduler.resource_check_interval_secs,
        ))
        .with_observer(Arc::new(ConsoleObserver::new(args.json)));

    let request = args.to_request(&config);

    let token = dispatcher.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, waiting for running conversions to finish");
            token.cancel();
        }
    });

    let outcome = dispatcher.run_batch(request).await;
    interrupt.abort();
    let summary = outcome.context("Batch could not start")?;

    metrics::record_summary(&summary);
    if let Some(path) = &args.metrics_file {
        metrics::write_metrics_file(path)?;
        info!("Metrics written to {:?}", path);
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        print_summary(&summary);
    }

    let status = if summary.is_clean() {
        Status::Clean
    } else {
        Status::Incomplete
    };
    Ok(status.into())
}
