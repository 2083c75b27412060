//! Shared fixtures for the processing integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use stowage_core::{FileDescriptor, ThumbnailConfig};
use stowage_processing::{
    ProcessingError, ProcessingResult, ThumbnailPipeline, Tool, ToolInvocation, ToolOutput,
    ToolRunner,
};
use stowage_storage::{
    ByteReader, ByteStream, Capabilities, MemoryStorage, StorageAdapter, StorageError,
    StorageResult,
};
use tempfile::TempDir;

/// Encode a solid-colour test image
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Jpeg)
}

/// What the fake tool does for a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// Stands in for ffmpeg / convert / ffprobe.
///
/// Successful ffmpeg and convert runs write a small PNG to the output
/// argument. ffprobe prints a canned JSON document.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<ToolInvocation>>,
    failing: Mutex<HashSet<u32>>,
    hanging: Mutex<HashSet<u32>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_size(&self, size: u32) {
        self.failing.lock().unwrap().insert(size);
    }

    pub fn hang_size(&self, size: u32) {
        self.hanging.lock().unwrap().insert(size);
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, tool: Tool) -> Vec<ToolInvocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.tool == tool)
            .collect()
    }

    fn size_of(invocation: &ToolInvocation) -> Option<u32> {
        let geometry = match invocation.tool {
            Tool::Ffmpeg => {
                let idx = invocation.args.iter().position(|a| a == "-s")?;
                invocation.args.get(idx + 1)?
            }
            Tool::Convert => {
                let idx = invocation.args.iter().position(|a| a == "-thumbnail")?;
                invocation.args.get(idx + 1)?
            }
            Tool::Ffprobe => return None,
        };
        geometry.split('x').next()?.parse().ok()
    }

    fn behaviour(&self, size: Option<u32>) -> Behaviour {
        match size {
            Some(size) if self.hanging.lock().unwrap().contains(&size) => Behaviour::Hang,
            Some(size) if self.failing.lock().unwrap().contains(&size) => Behaviour::Fail,
            _ => Behaviour::Succeed,
        }
    }

    fn output_path(invocation: &ToolInvocation) -> PathBuf {
        let position = match invocation.tool {
            // ... <dst> -y
            Tool::Ffmpeg => invocation.args.len() - 2,
            _ => invocation.args.len() - 1,
        };
        PathBuf::from(&invocation.args[position])
    }
}

pub const FFPROBE_JSON: &str = r#"{
    "streams": [{"codec_name": "h264", "width": 1280, "height": 720, "r_frame_rate": "25/1"}],
    "format": {"duration": "3.000000", "bit_rate": "1500000"}
}"#;

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ProcessingResult<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        if invocation.tool == Tool::Ffprobe {
            return Ok(ToolOutput {
                stdout: FFPROBE_JSON.as_bytes().to_vec(),
                stderr: Vec::new(),
            });
        }

        match self.behaviour(Self::size_of(invocation)) {
            Behaviour::Succeed => {
                let frame = encoded_image(32, 18, ImageFormat::Png);
                tokio::fs::write(Self::output_path(invocation), frame)
                    .await
                    .unwrap();
                Ok(ToolOutput::default())
            }
            Behaviour::Fail => Err(ProcessingError::ToolFailed {
                tool: invocation.tool.to_string(),
                status: Some(1),
                stderr: "simulated failure".to_string(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(invocation.timeout).await;
                Err(ProcessingError::ToolTimedOut {
                    tool: invocation.tool.to_string(),
                    timeout: invocation.timeout,
                })
            }
        }
    }
}

/// Runner whose tools never finish on their own
pub struct StuckRunner;

#[async_trait]
impl ToolRunner for StuckRunner {
    async fn run(&self, _invocation: &ToolInvocation) -> ProcessingResult<ToolOutput> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ToolOutput::default())
    }
}

/// Memory storage that rejects uploads whose key contains a marker and can
/// hide capabilities
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    reject_marker: Option<String>,
    capabilities: Capabilities,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        let capabilities = inner.capabilities();
        Self {
            inner,
            reject_marker: None,
            capabilities,
        }
    }

    pub fn rejecting(mut self, marker: &str) -> Self {
        self.reject_marker = Some(marker.to_string());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[async_trait]
impl StorageAdapter for FlakyStorage {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn create(
        &self,
        descriptor: &FileDescriptor,
        source: ByteReader,
    ) -> StorageResult<FileDescriptor> {
        if let Some(marker) = &self.reject_marker {
            if descriptor.key.contains(marker.as_str()) {
                return Err(StorageError::UploadFailed("503 Slow Down".to_string()));
            }
        }
        self.inner.create(descriptor, source).await
    }

    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream> {
        self.inner.get_readable(descriptor).await
    }

    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool> {
        self.inner.delete(descriptor).await
    }

    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor> {
        self.inner.metadata(descriptor).await
    }
}

/// Scratch root for workspaces; the pipeline creates it on first use
pub struct WorkspaceRoot {
    _dir: TempDir,
    pub path: PathBuf,
}

impl WorkspaceRoot {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspaces");
        Self { _dir: dir, path }
    }

    /// Workspaces left behind under the root
    pub fn leftovers(&self) -> usize {
        leftovers(&self.path)
    }
}

pub fn leftovers(path: &Path) -> usize {
    match std::fs::read_dir(path) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

pub fn config(root: &WorkspaceRoot) -> ThumbnailConfig {
    ThumbnailConfig {
        workspace_root: Some(root.path.clone()),
        tool_timeout: Duration::from_secs(5),
        ..ThumbnailConfig::default()
    }
}

pub fn pipeline(
    storage: Arc<dyn StorageAdapter>,
    config: ThumbnailConfig,
    runner: Arc<dyn ToolRunner>,
) -> ThumbnailPipeline {
    ThumbnailPipeline::new(storage, config)
        .unwrap()
        .with_runner(runner)
}
