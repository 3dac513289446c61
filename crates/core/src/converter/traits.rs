//! Trait definitions for the converter module.

use async_trait::async_trait;

use super::error::ConverterError;
use super::types::{ConversionOutput, ConversionRequest};
use crate::platform::OutputFormat;

/// A converter that compresses disc images with an external tool.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// Whether a tool is configured that can produce `format`.
    fn supports(&self, format: OutputFormat) -> bool;

    /// Runs exactly one conversion.
    ///
    /// Success means the tool exited cleanly and left a non-empty file at
    /// `request.output_path`.
    async fn convert(&self, request: ConversionRequest)
        -> Result<ConversionOutput, ConverterError>;

    /// Validates that the configured tools can be launched.
    async fn validate(&self) -> Result<(), ConverterError>;
}
