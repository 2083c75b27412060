//! External tool resolution and execution
//!
//! Thumbnails for video and documents come from external programs (`ffmpeg`,
//! ImageMagick `convert`) and video metadata from `ffprobe`. The pipeline
//! finds them through a [`ToolLocator`] and runs them through a
//! [`ToolRunner`], so tests can swap in fakes for both.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use stowage_core::ThumbnailConfig;
use tokio::process::Command;

use crate::error::{ProcessingError, ProcessingResult};

/// External programs the pipeline knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Convert,
}

impl Display for Tool {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Tool::Ffmpeg => write!(f, "ffmpeg"),
            Tool::Ffprobe => write!(f, "ffprobe"),
            Tool::Convert => write!(f, "convert"),
        }
    }
}

/// Resolves a [`Tool`] to an executable path
pub trait ToolLocator: Send + Sync {
    fn locate(&self, tool: Tool) -> ProcessingResult<PathBuf>;
}

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> ProcessingResult<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::InvalidToolPath(format!(
            "Path contains dangerous characters: {}",
            path
        )));
    }

    if path.contains("..") {
        return Err(ProcessingError::InvalidToolPath(format!(
            "Path contains directory traversal: {}",
            path
        )));
    }

    if path.trim().is_empty() {
        return Err(ProcessingError::InvalidToolPath("Path is empty".to_string()));
    }

    Ok(())
}

/// Tool paths taken from [`ThumbnailConfig`]
///
/// Bare names (`ffmpeg`) are resolved through `PATH` when the process starts.
#[derive(Debug, Clone)]
pub struct ConfiguredTools {
    ffmpeg: String,
    ffprobe: String,
    convert: String,
}

impl ConfiguredTools {
    pub fn new(
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
        convert: impl Into<String>,
    ) -> ProcessingResult<Self> {
        let tools = Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            convert: convert.into(),
        };

        for path in [&tools.ffmpeg, &tools.ffprobe, &tools.convert] {
            validate_path(path)?;
        }

        Ok(tools)
    }

    pub fn from_config(config: &ThumbnailConfig) -> ProcessingResult<Self> {
        Self::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
            config.convert_path.clone(),
        )
    }
}

impl ToolLocator for ConfiguredTools {
    fn locate(&self, tool: Tool) -> ProcessingResult<PathBuf> {
        let path = match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::Ffprobe => &self.ffprobe,
            Tool::Convert => &self.convert,
        };
        Ok(PathBuf::from(path))
    }
}

/// One run of an external program
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Captured output of a successful run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Executes a [`ToolInvocation`].
///
/// A non-zero exit is reported as `ToolFailed`, a run past the invocation
/// timeout as `ToolTimedOut`. Dropping the returned future must stop the
/// process.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> ProcessingResult<ToolOutput>;
}

/// Locator, runner, working directory and timeout shared by the tool calls
/// of one pipeline invocation
#[derive(Clone, Copy)]
pub struct ToolContext<'a> {
    pub locator: &'a dyn ToolLocator,
    pub runner: &'a dyn ToolRunner,
    pub working_dir: &'a Path,
    pub timeout: Duration,
}

impl ToolContext<'_> {
    pub async fn run(&self, tool: Tool, args: Vec<String>) -> ProcessingResult<ToolOutput> {
        let invocation = ToolInvocation {
            tool,
            program: self.locator.locate(tool)?,
            args,
            working_dir: self.working_dir.to_path_buf(),
            timeout: self.timeout,
        };
        self.runner.run(&invocation).await
    }

    /// Run a tool that must leave a file at `output`
    pub async fn produce(
        &self,
        tool: Tool,
        args: Vec<String>,
        output: &Path,
    ) -> ProcessingResult<()> {
        let result = self.run(tool, args).await?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ProcessingError::ToolFailed {
                tool: tool.to_string(),
                status: Some(0),
                stderr: format!(
                    "no output written to {}: {}",
                    output.display(),
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// Runs tools as child processes with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    #[tracing::instrument(skip(self, invocation), fields(
        process.executable.name = %invocation.tool,
        process.executable.path = %invocation.program.display(),
        process.working_directory = %invocation.working_dir.display(),
    ))]
    async fn run(&self, invocation: &ToolInvocation) -> ProcessingResult<ToolOutput> {
        let start = std::time::Instant::now();
        let tool = invocation.tool.to_string();

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessingError::ToolLaunch {
                tool: tool.clone(),
                source,
            })?;

        // The child is owned by this future; timing out drops it, which kills it.
        let output = match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = invocation.timeout.as_millis() as u64,
                    "External tool timed out"
                );
                return Err(ProcessingError::ToolTimedOut {
                    tool,
                    timeout: invocation.timeout,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(
                status = ?output.status.code(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                stderr = %stderr,
                "External tool failed"
            );
            return Err(ProcessingError::ToolFailed {
                tool,
                status: output.status.code(),
                stderr,
            });
        }

        tracing::debug!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "External tool finished"
        );

        Ok(ToolOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(program: &str, args: &[&str], timeout: Duration) -> ToolInvocation {
        ToolInvocation {
            tool: Tool::Convert,
            program: PathBuf::from(program),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: std::env::temp_dir(),
            timeout,
        }
    }

    #[test]
    fn test_configured_tools_reject_shell_metacharacters() {
        assert!(ConfiguredTools::new("ffmpeg", "ffprobe", "convert").is_ok());
        assert!(matches!(
            ConfiguredTools::new("ffmpeg; rm -rf /", "ffprobe", "convert"),
            Err(ProcessingError::InvalidToolPath(_))
        ));
        assert!(matches!(
            ConfiguredTools::new("ffmpeg", "../bin/ffprobe", "convert"),
            Err(ProcessingError::InvalidToolPath(_))
        ));
        assert!(ConfiguredTools::new("ffmpeg", "ffprobe", "").is_err());
    }

    #[test]
    fn test_locate() {
        let tools = ConfiguredTools::from_config(&ThumbnailConfig::default()).unwrap();
        assert_eq!(tools.locate(Tool::Ffmpeg).unwrap(), PathBuf::from("ffmpeg"));
        assert_eq!(tools.locate(Tool::Convert).unwrap(), PathBuf::from("convert"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let output = ProcessRunner
            .run(&invocation("sh", &["-c", "echo hello"], Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_non_zero_exit() {
        let err = ProcessRunner
            .run(&invocation(
                "sh",
                &["-c", "echo broken >&2; exit 3"],
                Duration::from_secs(10),
            ))
            .await
            .unwrap_err();
        match err {
            ProcessingError::ToolFailed { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_timeout() {
        let err = ProcessRunner
            .run(&invocation("sleep", &["5"], Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::ToolTimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let err = ProcessRunner
            .run(&invocation(
                "/nonexistent/stowage-tool",
                &[],
                Duration::from_secs(1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::ToolLaunch { .. }));
    }
}
