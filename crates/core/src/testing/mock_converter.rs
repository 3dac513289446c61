//! Mock converter for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{ConversionOutput, ConversionRequest, Converter, ConverterError};
use crate::platform::OutputFormat;

/// A recorded conversion request for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The request that was submitted.
    pub request: ConversionRequest,
    /// Whether the conversion succeeded.
    pub success: bool,
    /// Contents of a CUE input as the converter saw it.
    pub input_snapshot: Option<String>,
}

/// Scripted failure for inputs with a given file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Tool exits non-zero with an error stream.
    Exit,
    /// Tool exceeds its timeout.
    Timeout,
    /// Tool exits cleanly but writes nothing.
    NoOutput,
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversion requests for assertions
/// - Write a fake output file on success
/// - Simulate failures per input file name, or once via `set_next_error`
/// - Simulate conversion time and observe peak concurrency
///
/// # Example
///
/// ```rust,ignore
/// use romcrush_core::testing::{MockConverter, MockFailure};
///
/// let converter = MockConverter::new();
/// converter.set_failure("Broken.cue", MockFailure::Exit).await;
///
/// let result = converter.convert(request).await?;
///
/// let conversions = converter.recorded_conversions().await;
/// assert_eq!(conversions.len(), 1);
/// assert!(converter.peak_concurrency() <= 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    /// Recorded conversions.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// If set, the next conversion will fail with this error.
    next_error: Arc<RwLock<Option<ConverterError>>>,
    /// Failures keyed by input file name.
    failures: Arc<RwLock<HashMap<String, MockFailure>>>,
    /// Simulated conversion duration in milliseconds.
    conversion_duration_ms: Arc<RwLock<u64>>,
    /// Size of the fake output file.
    output_size_bytes: Arc<RwLock<u64>>,
    /// Formats this converter claims to support.
    supported: Arc<StdRwLock<HashSet<OutputFormat>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    /// Create a new mock converter supporting every format.
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(HashMap::new())),
            conversion_duration_ms: Arc::new(RwLock::new(10)),
            output_size_bytes: Arc::new(RwLock::new(512)),
            supported: Arc::new(StdRwLock::new(
                [OutputFormat::Chd, OutputFormat::Cso, OutputFormat::Zso]
                    .into_iter()
                    .collect(),
            )),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded conversions.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of conversions attempted.
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Clear recorded conversions.
    pub async fn clear_recorded(&self) {
        self.conversions.write().await.clear();
    }

    /// Configure the next conversion to fail with the given error.
    pub async fn set_next_error(&self, error: ConverterError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every conversion of an input with this file name fail.
    pub async fn set_failure(&self, file_name: &str, failure: MockFailure) {
        self.failures
            .write()
            .await
            .insert(file_name.to_string(), failure);
    }

    /// Drop every scripted failure.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Set the simulated conversion duration.
    pub async fn set_conversion_duration(&self, duration: Duration) {
        *self.conversion_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Set the size of written outputs.
    pub async fn set_output_size(&self, bytes: u64) {
        *self.output_size_bytes.write().await = bytes.max(1);
    }

    /// Restrict the formats reported by `supports`.
    pub fn set_supported(&self, formats: &[OutputFormat]) {
        *self.supported.write().unwrap_or_else(PoisonError::into_inner) =
            formats.iter().copied().collect();
    }

    /// Highest number of conversions observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn scripted_failure(&self, request: &ConversionRequest) -> Option<MockFailure> {
        let name = request
            .input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())?;
        self.failures.read().await.get(&name).copied()
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ConversionOutput, ConverterError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let duration_ms = *self.conversion_duration_ms.read().await;
        if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        match self.scripted_failure(request).await {
            Some(MockFailure::Exit) => {
                return Err(ConverterError::conversion_failed(
                    "mock exited with code: Some(1)",
                    Some("Error: simulated failure".to_string()),
                ))
            }
            Some(MockFailure::Timeout) => return Err(ConverterError::Timeout { timeout_secs: 1 }),
            Some(MockFailure::NoOutput) => {
                return Err(ConverterError::MissingOutput {
                    path: request.output_path.clone(),
                })
            }
            None => {}
        }

        let size = *self.output_size_bytes.read().await;
        tokio::fs::write(&request.output_path, vec![0xC5u8; size as usize]).await?;

        Ok(ConversionOutput {
            output_path: request.output_path.clone(),
            output_size_bytes: size,
            duration_ms,
        })
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, format: OutputFormat) -> bool {
        self.supported
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&format)
    }

    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        let input_snapshot = match request.input_path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("cue") => {
                tokio::fs::read_to_string(&request.input_path).await.ok()
            }
            _ => None,
        };
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let result = self.run(&request).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.conversions.write().await.push(RecordedConversion {
            request,
            success: result.is_ok(),
            input_snapshot,
        });
        result
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DiscMedia;
    use tempfile::TempDir;

    fn request(dir: &TempDir, name: &str) -> ConversionRequest {
        ConversionRequest::new(
            dir.path().join(name),
            dir.path().join(format!("{}.chd", name)),
            OutputFormat::Chd,
            DiscMedia::Cd,
        )
    }

    #[tokio::test]
    async fn test_basic_conversion_writes_output() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_conversion_duration(Duration::ZERO).await;

        let output = converter.convert(request(&dir, "a.cue")).await.unwrap();
        assert_eq!(output.output_size_bytes, 512);
        assert_eq!(std::fs::metadata(&output.output_path).unwrap().len(), 512);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter.set_failure("bad.cue", MockFailure::Timeout).await;

        let err = converter.convert(request(&dir, "bad.cue")).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(converter.convert(request(&dir, "good.cue")).await.is_ok());

        let conversions = converter.recorded_conversions().await;
        assert_eq!(conversions.len(), 2);
        assert!(!conversions[0].success);
        assert!(conversions[1].success);
    }

    #[tokio::test]
    async fn test_error_injection_consumed_once() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        converter
            .set_next_error(ConverterError::conversion_failed("test error", None))
            .await;

        assert!(converter.convert(request(&dir, "a.cue")).await.is_err());
        assert!(converter.convert(request(&dir, "a.cue")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cue_input_is_captured() {
        let dir = TempDir::new().unwrap();
        let converter = MockConverter::new();
        std::fs::write(dir.path().join("a.cue"), "FILE \"a.bin\" BINARY\n").unwrap();

        converter.convert(request(&dir, "a.cue")).await.unwrap();
        converter.convert(request(&dir, "b.iso")).await.unwrap();

        let conversions = converter.recorded_conversions().await;
        assert_eq!(
            conversions[0].input_snapshot.as_deref(),
            Some("FILE \"a.bin\" BINARY\n")
        );
        assert!(conversions[1].input_snapshot.is_none());
    }

    #[test]
    fn test_supported_formats() {
        let converter = MockConverter::new();
        assert!(converter.supports(OutputFormat::Cso));
        converter.set_supported(&[OutputFormat::Chd]);
        assert!(!converter.supports(OutputFormat::Cso));
    }
}
