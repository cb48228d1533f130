//! Orchestrator: one acquisition at a time, end to end
//!
//! Classifies the URL, probes metadata (cosmetic), runs the selected pipeline
//! and turns every outcome into a `PipelineResult`. Owns the progress store;
//! callers only get snapshots.

use super::messages::{DownloadRequest, PipelineResult};
use crate::downloader::advanced::{AdvancedJob, AdvancedPipeline, TranscodeOptions};
use crate::downloader::progress::{ProgressState, ProgressStore};
use crate::downloader::standard::StandardPipeline;
use crate::downloader::strategy::{MediaTarget, PipelineMode};
use crate::extractor::models::{MediaInfo, DEFAULT_TITLE};
use crate::extractor::traits::MediaExtractor;
use crate::extractor::ytdlp::{ExtractorOptions, FetchPlan, YtDlp};
use crate::format::FormatResolver;
use crate::utils::config::{AppSettings, FolderPreference, ToolPaths};
use crate::utils::error::{Result, StreamgrabError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: AppSettings,
    tools: ToolPaths,
    extractor: YtDlp,
    resolver: FormatResolver,
    folder: FolderPreference,
    store: ProgressStore,
    busy: AtomicBool,
}

/// Holds the single acquisition slot until dropped
struct SlotGuard<'a>(&'a AtomicBool);

impl<'a> SlotGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Orchestrator {
    /// Build with helper binaries located from settings or the system
    pub fn new(settings: AppSettings, folder: FolderPreference) -> Result<Self> {
        let tools = settings.tool_paths()?;
        Ok(Self::with_tools(settings, tools, folder))
    }

    pub fn with_tools(settings: AppSettings, tools: ToolPaths, folder: FolderPreference) -> Self {
        let settings = settings.sanitized();
        let extractor = YtDlp::new(tools.extractor.clone(), ExtractorOptions::from(&settings));
        let resolver = FormatResolver::new(settings.resolver.clone());

        Self {
            inner: Arc::new(Inner {
                settings,
                tools,
                extractor,
                resolver,
                folder,
                store: ProgressStore::new(),
                busy: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the in-flight (or last) acquisition
    pub fn progress(&self) -> ProgressState {
        self.inner.store.snapshot()
    }

    pub fn folder(&self) -> PathBuf {
        self.inner.folder.current()
    }

    pub fn set_folder(&self, folder: PathBuf) -> Result<()> {
        self.inner.folder.set(folder)
    }

    pub fn settings(&self) -> &AppSettings {
        &self.inner.settings
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Metadata only; never touches the progress store
    pub async fn probe(&self, url: &str) -> Result<MediaInfo> {
        self.inner.extractor.probe(url).await
    }

    /// Run one acquisition. Never fails: every error ends up in the result.
    pub async fn download(&self, request: DownloadRequest) -> PipelineResult {
        let Some(_slot) = SlotGuard::acquire(&self.inner.busy) else {
            warn!("Rejecting {}: another download is running", request.url);
            return PipelineResult::failed(self.folder(), None, &StreamgrabError::Busy);
        };

        // Re-read on every invocation so a folder change applies to the next download
        let folder = self.inner.folder.current();
        let target = MediaTarget::new(&request.url);
        let mode = target.pipeline_mode(request.mode);
        info!(
            "Download {} (host class {:?}, {} pipeline)",
            request.url,
            target.class(),
            mode
        );

        self.inner.store.reset(mode);

        match self.acquire(&request, &target, mode, &folder).await {
            Ok((title, output)) => PipelineResult::succeeded(folder, title, output, mode),
            Err(err) => {
                error!("Download failed: {}", err);
                self.inner.store.fail(err.to_string());
                PipelineResult::failed(folder, Some(mode), &err)
            }
        }
    }

    async fn acquire(
        &self,
        request: &DownloadRequest,
        target: &MediaTarget,
        mode: PipelineMode,
        folder: &Path,
    ) -> Result<(String, Option<PathBuf>)> {
        if request.url.trim().is_empty() {
            return Err(StreamgrabError::InvalidRequest("no URL provided".to_string()));
        }

        tokio::fs::create_dir_all(folder).await?;

        let title = match self.inner.extractor.probe(target.url()).await {
            Ok(info) => info.title,
            Err(e) => {
                warn!("Metadata probe failed, continuing with default title: {}", e);
                DEFAULT_TITLE.to_string()
            }
        };

        let inner = &self.inner;
        let output = match mode {
            PipelineMode::Standard => {
                let plan = match inner
                    .resolver
                    .selection_expression(&request.quality, request.container)
                {
                    Some(expression) => FetchPlan::Streams {
                        expression,
                        container: request.container,
                    },
                    None => FetchPlan::Audio,
                };
                StandardPipeline::new(&inner.extractor, &inner.tools.transcoder, &inner.store)
                    .run(target.url(), folder, &plan)
                    .await?
            }
            PipelineMode::Advanced => {
                let job = AdvancedJob {
                    url: target.url(),
                    folder,
                    title: &title,
                    container: request.container,
                    expression: inner
                        .resolver
                        .direct_url_expression(&request.quality, request.container),
                };
                let pipeline = AdvancedPipeline::new(
                    &inner.extractor,
                    &inner.tools.transcoder,
                    &inner.store,
                    TranscodeOptions::from(&inner.settings),
                );
                Some(pipeline.run(&job).await?)
            }
        };

        Ok((title, output))
    }
}
