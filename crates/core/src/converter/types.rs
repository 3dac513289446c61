//! Types for converter requests and results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::platform::{DiscMedia, OutputFormat};

/// A single invocation of an external converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Descriptor or image handed to the tool.
    pub input_path: PathBuf,
    /// Where the tool must write its output.
    pub output_path: PathBuf,
    /// Target format.
    pub format: OutputFormat,
    /// Media layout of the input.
    pub media: DiscMedia,
    /// Thread count forwarded to tools that accept one.
    pub thread_hint: Option<usize>,
}

impl ConversionRequest {
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        format: OutputFormat,
        media: DiscMedia,
    ) -> Self {
        Self {
            input_path,
            output_path,
            format,
            media,
            thread_hint: None,
        }
    }

    pub fn with_thread_hint(mut self, threads: usize) -> Self {
        self.thread_hint = Some(threads.max(1));
        self
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
