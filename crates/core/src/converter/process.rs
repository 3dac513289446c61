//! Process-backed converter driving chdman and maxcso.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::config::ToolsConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{ConversionOutput, ConversionRequest};
use crate::platform::{DiscMedia, OutputFormat};

const CHDMAN: &str = "chdman";
const MAXCSO: &str = "maxcso";

/// Converter that launches the configured external tools.
pub struct ProcessConverter {
    config: ToolsConfig,
}

impl ProcessConverter {
    /// Creates a new converter with the given tool configuration.
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ToolsConfig::default())
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    /// Picks the tool binary for a format.
    fn tool_for(&self, format: OutputFormat) -> Result<(&'static str, &Path), ConverterError> {
        let (name, path) = if format.is_ciso() {
            (MAXCSO, self.config.maxcso.as_deref())
        } else {
            (CHDMAN, self.config.chdman.as_deref())
        };
        path.map(|p| (name, p))
            .ok_or_else(|| ConverterError::UnsupportedFormat {
                format: format.to_string(),
            })
    }

    /// Builds the argument list for a request.
    fn build_args(request: &ConversionRequest) -> Vec<String> {
        let input = request.input_path.to_string_lossy().to_string();
        let output = request.output_path.to_string_lossy().to_string();

        match request.format {
            OutputFormat::Chd => {
                let command = match request.media {
                    DiscMedia::Cd => "createcd",
                    DiscMedia::Dvd => "createdvd",
                };
                let mut args = vec![
                    command.to_string(),
                    "-i".to_string(),
                    input,
                    "-o".to_string(),
                    output,
                ];
                if let Some(threads) = request.thread_hint {
                    args.extend(["--numprocessors".to_string(), threads.to_string()]);
                }
                args
            }
            OutputFormat::Cso | OutputFormat::Zso => {
                let mut args = Vec::new();
                if let Some(threads) = request.thread_hint {
                    args.extend(["--threads".to_string(), threads.to_string()]);
                }
                if request.format == OutputFormat::Zso {
                    args.push("--ziso".to_string());
                }
                args.extend([input, "-o".to_string(), output]);
                args
            }
        }
    }

    /// Keeps the tail of a tool's error stream, where the actual error usually is.
    fn truncate_stderr(bytes: &[u8], limit: usize) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }
        let start = bytes.len().saturating_sub(limit);
        let text = String::from_utf8_lossy(&bytes[start..]).trim().to_string();
        if text.is_empty() {
            None
        } else if start > 0 {
            Some(format!("...{}", text))
        } else {
            Some(text)
        }
    }

    async fn run_tool(
        &self,
        tool: &'static str,
        program: &Path,
        args: &[String],
        output_path: &Path,
    ) -> Result<ConversionOutput, ConverterError> {
        let start = Instant::now();
        debug!(tool, ?args, "Launching converter");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::tool_not_found(tool, program)
                } else {
                    ConverterError::Io(e)
                }
            })?;

        // Drain stderr concurrently so a chatty tool never blocks on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                let _ = stderr.read_to_end(&mut buffer).await;
                buffer
            })
        });

        let timeout_secs = self.config.conversion_timeout_secs;
        let status = match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(tool, timeout_secs, "Converter timed out, killing process");
                let _ = child.kill().await;
                return Err(ConverterError::Timeout { timeout_secs });
            }
        };

        let stderr_bytes = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            return Err(ConverterError::conversion_failed(
                format!("{} exited with code: {:?}", tool, status.code()),
                Self::truncate_stderr(&stderr_bytes, self.config.stderr_limit_bytes),
            ));
        }

        let output_size_bytes = match tokio::fs::metadata(output_path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => {
                return Err(ConverterError::MissingOutput {
                    path: output_path.to_path_buf(),
                })
            }
        };

        Ok(ConversionOutput {
            output_path: output_path.to_path_buf(),
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn check_tool(tool: &'static str, program: &PathBuf) -> Result<(), ConverterError> {
        match Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            // chdman and maxcso both exit non-zero without arguments; launching is enough.
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConverterError::tool_not_found(tool, program))
            }
            Err(e) => Err(ConverterError::Io(e)),
        }
    }
}

#[async_trait]
impl Converter for ProcessConverter {
    fn name(&self) -> &str {
        "process"
    }

    fn supports(&self, format: OutputFormat) -> bool {
        self.tool_for(format).is_ok()
    }

    async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, ConverterError> {
        if !request.input_path.exists() {
            return Err(ConverterError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        let (tool, program) = self.tool_for(request.format)?;
        let args = Self::build_args(&request);
        self.run_tool(tool, program, &args, &request.output_path)
            .await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Some(chdman) = &self.config.chdman {
            Self::check_tool(CHDMAN, chdman).await?;
        }
        if let Some(maxcso) = &self.config.maxcso {
            Self::check_tool(MAXCSO, maxcso).await?;
        }
        if self.config.chdman.is_none() && self.config.maxcso.is_none() {
            return Err(ConverterError::UnsupportedFormat {
                format: "any".to_string(),
            });
        }
        Ok(())
    }
}
