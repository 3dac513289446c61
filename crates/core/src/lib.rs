pub mod archive;
pub mod config;
pub mod converter;
pub mod discovery;
pub mod executor;
pub mod ledger;
pub mod metrics;
pub mod names;
pub mod platform;
pub mod relocate;
pub mod resources;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
};
pub use converter::{Converter, ConverterError, ProcessConverter, ToolsConfig};
pub use discovery::{ConversionJob, DiscoveryReport, DiscoveryRequest, WorkDiscovery};
pub use executor::{FormatPolicy, JobOutcome, JobResult};
pub use ledger::{open_ledger, LedgerConfig, ProgressLedger};
pub use platform::{CategorySet, DiscMedia, OutputFormat, Platform, PlatformHint};
pub use resources::{ResourceConfig, ResourceMonitor};
pub use scheduler::{
    BatchError, BatchObserver, BatchRequest, BatchState, BatchSummary, CancellationToken,
    Dispatcher, ProgressUpdate,
};
