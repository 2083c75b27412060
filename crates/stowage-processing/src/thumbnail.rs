//! Thumbnail pipeline
//!
//! One invocation classifies the file, stages it into a fresh [`Workspace`],
//! renders every requested size concurrently and uploads each result next to
//! the original as `thumb<size>.png`. A size that fails is logged and left out
//! of the result; only staging, an all-sizes failure or a timeout under
//! [`TimeoutPolicy::FailPipeline`] fail the call. The workspace is removed on
//! every exit path.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use stowage_core::{FileDescriptor, ThumbnailConfig, TimeoutPolicy};
use stowage_storage::transfer;
use stowage_storage::{Capability, DownloadTarget, StorageAdapter};

use crate::classify::MediaClass;
use crate::error::{ProcessingError, ProcessingResult};
use crate::probe::MediaProbe;
use crate::tools::{ConfiguredTools, ProcessRunner, ToolContext, ToolLocator, ToolRunner};
use crate::workspace::Workspace;
#[cfg(feature = "document")]
use crate::document;
#[cfg(feature = "image")]
use crate::raster;
#[cfg(feature = "video")]
use crate::video;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/png";
const THUMBNAIL_EXTENSION: &str = "png";

/// `thumb<size>`
pub fn thumbnail_label(size: u32) -> String {
    format!("thumb{}", size)
}

/// Descriptor of the `size` thumbnail of `original`: same bucket and
/// directory, file name `thumb<size>.png`
pub fn thumbnail_descriptor(original: &FileDescriptor, size: u32) -> FileDescriptor {
    let label = thumbnail_label(size);
    original
        .sibling(&format!("{}.{}", label, THUMBNAIL_EXTENSION))
        .with_content_type(THUMBNAIL_CONTENT_TYPE)
        .with_label(label)
}

/// Sizes that were produced, and why the others were not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbnailSet {
    /// `thumb<size>` → stored key
    pub thumbnails: BTreeMap<String, String>,
    /// `thumb<size>` → error message
    pub failures: BTreeMap<String, String>,
}

impl ThumbnailSet {
    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn get(&self, size: u32) -> Option<&str> {
        self.thumbnails.get(&thumbnail_label(size)).map(String::as_str)
    }

    /// Record the produced thumbnails on `descriptor`
    pub fn apply_to(&self, descriptor: &mut FileDescriptor) {
        descriptor.thumbnails.extend(
            self.thumbnails
                .iter()
                .map(|(label, key)| (label.clone(), key.clone())),
        );
    }
}

/// Deduplicated, ascending sizes; zero is rejected
fn normalize_sizes(sizes: &[u32]) -> ProcessingResult<Vec<u32>> {
    if let Some(zero) = sizes.iter().find(|size| **size == 0) {
        return Err(ProcessingError::InvalidSize(*zero));
    }
    Ok(sizes.iter().copied().collect::<BTreeSet<_>>().into_iter().collect())
}

fn renders(class: MediaClass) -> bool {
    match class {
        MediaClass::Image => cfg!(feature = "image"),
        MediaClass::Video => cfg!(feature = "video"),
        MediaClass::Document => cfg!(feature = "document"),
        MediaClass::Other => false,
    }
}

pub struct ThumbnailPipeline {
    storage: Arc<dyn StorageAdapter>,
    config: ThumbnailConfig,
    locator: Arc<dyn ToolLocator>,
    runner: Arc<dyn ToolRunner>,
}

impl ThumbnailPipeline {
    /// Pipeline over `storage` running the tools named in `config` as child
    /// processes
    pub fn new(storage: Arc<dyn StorageAdapter>, config: ThumbnailConfig) -> ProcessingResult<Self> {
        let locator = Arc::new(ConfiguredTools::from_config(&config)?);
        Ok(Self {
            storage,
            config,
            locator,
            runner: Arc::new(ProcessRunner),
        })
    }

    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn ToolLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// Thumbnails for the configured sizes
    pub async fn generate(&self, descriptor: &FileDescriptor) -> ProcessingResult<ThumbnailSet> {
        self.generate_sizes(descriptor, &self.config.sizes).await
    }

    /// Thumbnails for `sizes`
    pub async fn generate_sizes(
        &self,
        descriptor: &FileDescriptor,
        sizes: &[u32],
    ) -> ProcessingResult<ThumbnailSet> {
        let (_, set) = self.bounded(self.run(descriptor, sizes, false)).await?;
        Ok(set)
    }

    /// Probe media metadata, generate the configured thumbnails and return
    /// the descriptor with both recorded. A failed probe only logs.
    pub async fn process(&self, descriptor: &FileDescriptor) -> ProcessingResult<FileDescriptor> {
        let (described, set) = self
            .bounded(self.run(descriptor, &self.config.sizes, true))
            .await?;
        let mut described = described.unwrap_or_else(|| descriptor.clone());
        set.apply_to(&mut described);
        Ok(described)
    }

    async fn bounded<T>(
        &self,
        work: impl std::future::Future<Output = ProcessingResult<T>>,
    ) -> ProcessingResult<T> {
        match self.config.pipeline_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        timeout_ms = limit.as_millis() as u64,
                        "Thumbnail pipeline timed out"
                    );
                    Err(ProcessingError::TimedOut(limit))
                }
            },
            None => work.await,
        }
    }

    #[tracing::instrument(skip(self, descriptor, sizes), fields(file = %descriptor.identity()))]
    async fn run(
        &self,
        descriptor: &FileDescriptor,
        sizes: &[u32],
        probe: bool,
    ) -> ProcessingResult<(Option<FileDescriptor>, ThumbnailSet)> {
        let sizes = normalize_sizes(sizes)?;
        let class = MediaClass::of(descriptor);

        if !renders(class) || (sizes.is_empty() && !probe) {
            tracing::debug!(class = %class, "Nothing to thumbnail");
            return Ok((None, ThumbnailSet::default()));
        }

        if !sizes.is_empty() && !self.storage.capabilities().supports(Capability::Thumbnail) {
            return Err(ProcessingError::Unsupported {
                adapter: self.storage.name(),
            });
        }

        let start = std::time::Instant::now();
        let workspace =
            Workspace::create(descriptor, self.config.workspace_root.as_deref()).await?;
        let source = workspace.source_path(descriptor);

        self.storage
            .download(descriptor, DownloadTarget::Path(source.clone()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to stage source");
                ProcessingError::Staging {
                    identity: descriptor.identity(),
                    source: e,
                }
            })?;

        let (described, set) = {
            let tools = ToolContext {
                locator: self.locator.as_ref(),
                runner: self.runner.as_ref(),
                working_dir: workspace.path(),
                timeout: self.config.tool_timeout,
            };

            let described = if probe {
                match MediaProbe::new(tools).describe(descriptor, &source).await {
                    Ok(described) => Some(described),
                    Err(e) => {
                        tracing::warn!(error = %e, "Media probe failed");
                        None
                    }
                }
            } else {
                None
            };

            let set = self
                .fan_out(class, descriptor, &tools, &source, &sizes)
                .await?;
            (described, set)
        };

        if let Err(e) = workspace.close().await {
            tracing::warn!(error = %e, "Failed to remove workspace");
        }

        if !sizes.is_empty() && set.is_empty() {
            tracing::error!(failures = ?set.failures, "All thumbnail sizes failed");
            return Err(ProcessingError::AllSizesFailed {
                identity: descriptor.identity(),
                failures: set.failures,
            });
        }

        tracing::info!(
            class = %class,
            produced = set.len(),
            failed = set.failures.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Thumbnails generated"
        );

        Ok((described, set))
    }

    async fn fan_out(
        &self,
        class: MediaClass,
        descriptor: &FileDescriptor,
        tools: &ToolContext<'_>,
        source: &Path,
        sizes: &[u32],
    ) -> ProcessingResult<ThumbnailSet> {
        let mut results = stream::iter(sizes.iter().copied())
            .map(|size| async move {
                (
                    size,
                    self.render_and_upload(class, descriptor, tools, source, size)
                        .await,
                )
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        let mut set = ThumbnailSet::default();
        while let Some((size, result)) = results.next().await {
            let label = thumbnail_label(size);
            match result {
                Ok(key) => {
                    set.thumbnails.insert(label, key);
                }
                Err(e)
                    if e.is_timeout()
                        && self.config.timeout_policy == TimeoutPolicy::FailPipeline =>
                {
                    // Dropping `results` kills the sibling processes still running.
                    tracing::error!(
                        size = size,
                        error = %e,
                        "Thumbnail timed out, aborting pipeline"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(size = size, error = %e, "Thumbnail size failed");
                    set.failures.insert(label, e.to_string());
                }
            }
        }

        Ok(set)
    }

    async fn render_and_upload(
        &self,
        class: MediaClass,
        descriptor: &FileDescriptor,
        tools: &ToolContext<'_>,
        source: &Path,
        size: u32,
    ) -> ProcessingResult<String> {
        let target = thumbnail_descriptor(descriptor, size);
        if target.same_object(descriptor) {
            return Err(ProcessingError::OverwritesSource { key: target.key });
        }

        let start = std::time::Instant::now();
        let output = tools
            .working_dir
            .join(format!("{}.{}", thumbnail_label(size), THUMBNAIL_EXTENSION));

        self.render(class, tools, source, &output, size).await?;

        let upload_error = |source| ProcessingError::Upload {
            key: target.key.clone(),
            source,
        };

        let (reader, _) = transfer::open_upload(&output, &target.key)
            .await
            .map_err(upload_error)?;
        self.storage
            .create(&target, reader)
            .await
            .map_err(upload_error)?;

        tracing::info!(
            size = size,
            key = %target.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Thumbnail stored"
        );

        Ok(target.key)
    }

    async fn render(
        &self,
        class: MediaClass,
        tools: &ToolContext<'_>,
        source: &Path,
        output: &Path,
        size: u32,
    ) -> ProcessingResult<()> {
        match class {
            #[cfg(feature = "image")]
            MediaClass::Image => {
                raster::render_file(source, output, size, self.config.background).await
            }
            #[cfg(feature = "video")]
            MediaClass::Video => {
                video::render(
                    tools,
                    source,
                    output,
                    size,
                    self.config.video_frame_index,
                    self.config.background,
                )
                .await
            }
            #[cfg(feature = "document")]
            MediaClass::Document => document::render(tools, source, output, size).await,
            other => Err(ProcessingError::UnsupportedMedia(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_keys() {
        let nested = FileDescriptor::new("media", "uploads/2024/cat.jpg");
        let thumb = thumbnail_descriptor(&nested, 64);
        assert_eq!(thumb.key, "uploads/2024/thumb64.png");
        assert_eq!(thumb.bucket, "media");
        assert_eq!(thumb.label.as_deref(), Some("thumb64"));
        assert_eq!(thumb.content_type.as_deref(), Some("image/png"));

        let root = FileDescriptor::new("media", "cat.jpg");
        assert_eq!(thumbnail_descriptor(&root, 256).key, "thumb256.png");
    }

    #[test]
    fn test_normalize_sizes() {
        assert_eq!(normalize_sizes(&[256, 64, 256]).unwrap(), vec![64, 256]);
        assert!(normalize_sizes(&[]).unwrap().is_empty());
        assert!(matches!(
            normalize_sizes(&[64, 0]),
            Err(ProcessingError::InvalidSize(0))
        ));
    }

    #[test]
    fn test_apply_to_merges() {
        let mut file = FileDescriptor::new("media", "a.png");
        file.thumbnails
            .insert("thumb32".to_string(), "thumb32.png".to_string());

        let mut set = ThumbnailSet::default();
        set.thumbnails
            .insert("thumb64".to_string(), "thumb64.png".to_string());
        set.failures
            .insert("thumb256".to_string(), "boom".to_string());
        set.apply_to(&mut file);

        assert_eq!(file.thumbnails.len(), 2);
        assert_eq!(set.get(64), Some("thumb64.png"));
        assert_eq!(set.get(256), None);
    }

    #[test]
    fn test_other_class_never_renders() {
        assert!(!renders(MediaClass::Other));
    }
}
