//! Converter module for compressing disc images.
//!
//! This module provides the `Converter` trait and a process-backed
//! implementation that drives the external tools:
//!
//! - `chdman createcd` for CUE/BIN layouts
//! - `chdman createdvd` for ISO images
//! - `maxcso` for CSO and ZSO output
//!
//! A converter only knows the invocation contract: input path in, output path
//! out, exit status plus a non-empty output file meaning success.
//!
//! # Example
//!
//! ```ignore
//! use romcrush_core::converter::{ProcessConverter, Converter, ConversionRequest, ToolsConfig};
//!
//! let converter = ProcessConverter::new(ToolsConfig::default());
//! converter.validate().await?;
//!
//! let output = converter
//!     .convert(ConversionRequest::new(
//!         PathBuf::from("/roms/Game.cue"),
//!         PathBuf::from("/roms/Game.chd"),
//!         OutputFormat::Chd,
//!         DiscMedia::Cd,
//!     ))
//!     .await?;
//! println!("Wrote {} bytes", output.output_size_bytes);
//! ```

mod config;
mod error;
mod process;
mod traits;
mod types;

pub use config::ToolsConfig;
pub use error::ConverterError;
pub use process::ProcessConverter;
pub use traits::Converter;
pub use types::{ConversionOutput, ConversionRequest};
