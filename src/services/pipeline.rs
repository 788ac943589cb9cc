//! Stage sequencing over worker pools.
//!
//! The driver runs one sensor's stages in dependency order:
//! discover, download, ARD convert, plugin analysis, then the optional
//! quicklook/tilecache/datacube stages the sensor has the capability for.
//! Each stage takes a snapshot of pending PIDs, fans it out over a fixed set
//! of tokio workers pulling from a shared queue, and brackets the whole block
//! with a usage-log start/end pair. A worker failure is confined to its
//! scene: transient errors leave the row untouched for the next run,
//! permanent ones mark the scene invalid.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::adapters::{
    ArdConverter, CommandArdConverter, CommandDatacubeLoader, CommandQuicklook, CommandTilecache,
    DatacubeLoader, HttpDownloader, QuicklookGenerator, SceneDownloader, StageError,
    TilecacheGenerator,
};
use crate::archive::{ArchiveSearch, HttpArchive};
use crate::config::SensorConfig;
use crate::models::{Stage, UsageLogEntry};
use crate::plugins::{run_plugin, PluginRegistry, ScenePlugin};
use crate::repository::{
    AsyncSqlitePool, PluginRunRepository, SceneCatalogue, UsageLogRepository,
};
use crate::services::{DiscoveryReport, DiscoveryService};

const ARCHIVE_TIMEOUT: Duration = Duration::from_secs(120);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Aggregate outcome of one stage block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    /// Scenes the stage completed.
    pub processed: u64,
    /// Scenes that failed transiently and stay pending.
    pub failed: u64,
    /// Scenes marked invalid by a permanent failure.
    pub invalidated: u64,
}

impl StageCounts {
    fn add(&mut self, other: StageCounts) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.invalidated += other.invalidated;
    }
}

/// Everything one sensor's pipeline needs, wired for concurrent use.
///
/// The driver is cheap to clone into worker tasks: repositories carry a
/// connection factory rather than live connections, and the adapters are
/// shared behind `Arc`.
#[derive(Clone)]
pub struct PipelineDriver {
    catalogue: SceneCatalogue,
    plugin_runs: PluginRunRepository,
    usage: UsageLogRepository,
    config: SensorConfig,
    downloader: Arc<dyn SceneDownloader>,
    ard: Arc<dyn ArdConverter>,
    quicklook: Option<Arc<dyn QuicklookGenerator>>,
    tilecache: Option<Arc<dyn TilecacheGenerator>>,
    datacube: Option<Arc<dyn DatacubeLoader>>,
    plugins: Vec<Arc<dyn ScenePlugin>>,
    archive: Arc<dyn ArchiveSearch>,
    workers: usize,
}

impl PipelineDriver {
    /// Wire a driver from a sensor config, using the command and HTTP
    /// implementations for every adapter the config declares.
    pub fn from_config(
        pool: AsyncSqlitePool,
        config: &SensorConfig,
        registry: &PluginRegistry,
        workers: usize,
    ) -> anyhow::Result<Self> {
        let capabilities = config.capabilities();
        let endpoint = url::Url::parse(&config.archive.endpoint)?;
        let archive: Arc<dyn ArchiveSearch> = Arc::new(HttpArchive::new(endpoint, ARCHIVE_TIMEOUT)?);
        let downloader: Arc<dyn SceneDownloader> = Arc::new(HttpDownloader::new(DOWNLOAD_TIMEOUT)?);
        let mut ard_config = config.ard.clone();
        if let Some(threads) = crate::config::num_threads_override() {
            ard_config.num_threads = Some(threads);
        }
        let ard: Arc<dyn ArdConverter> = Arc::new(CommandArdConverter::new(ard_config));

        let quicklook: Option<Arc<dyn QuicklookGenerator>> = match &config.quicklook {
            Some(tool) if capabilities.quicklook => {
                Some(Arc::new(CommandQuicklook::new(tool.clone())))
            }
            _ => None,
        };
        let tilecache: Option<Arc<dyn TilecacheGenerator>> = match &config.tilecache {
            Some(tool) if capabilities.tilecache => {
                Some(Arc::new(CommandTilecache::new(tool.clone(), config.tile_zoom)))
            }
            _ => None,
        };
        let datacube: Option<Arc<dyn DatacubeLoader>> = match &config.datacube {
            Some(cube) if capabilities.datacube => {
                Some(Arc::new(CommandDatacubeLoader::new(cube.clone())))
            }
            _ => None,
        };
        let plugins = if capabilities.plugins {
            registry.build(&config.plugins)?
        } else {
            Vec::new()
        };

        Ok(Self::new(
            pool,
            config.clone(),
            archive,
            downloader,
            ard,
            quicklook,
            tilecache,
            datacube,
            plugins,
            workers,
        ))
    }

    /// Wire a driver from explicit parts. Tests use this with in-memory
    /// fakes instead of the subprocess adapters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: AsyncSqlitePool,
        config: SensorConfig,
        archive: Arc<dyn ArchiveSearch>,
        downloader: Arc<dyn SceneDownloader>,
        ard: Arc<dyn ArdConverter>,
        quicklook: Option<Arc<dyn QuicklookGenerator>>,
        tilecache: Option<Arc<dyn TilecacheGenerator>>,
        datacube: Option<Arc<dyn DatacubeLoader>>,
        plugins: Vec<Arc<dyn ScenePlugin>>,
        workers: usize,
    ) -> Self {
        let catalogue = SceneCatalogue::new(pool.clone(), config.sensor);
        let plugin_runs = PluginRunRepository::new(pool.clone());
        let usage = UsageLogRepository::new(pool);
        Self {
            catalogue,
            plugin_runs,
            usage,
            config,
            downloader,
            ard,
            quicklook,
            tilecache,
            datacube,
            plugins,
            archive,
            workers: workers.max(1),
        }
    }

    /// Run a discovery pass for this sensor.
    pub async fn discover(&self, check_from_start: bool) -> anyhow::Result<DiscoveryReport> {
        let service = DiscoveryService::new(
            self.catalogue.clone(),
            self.usage.clone(),
            self.archive.clone(),
            self.config.archive.clone(),
            self.config.capabilities(),
        );
        service.find_new(check_from_start).await
    }

    /// Whether the tool this stage shells out to is wired up.
    fn stage_tool_configured(&self, stage: Stage) -> bool {
        match stage {
            Stage::Download | Stage::ArdConvert => true,
            Stage::Quicklook => self.quicklook.is_some(),
            Stage::Tilecache => self.tilecache.is_some(),
            Stage::DatacubeLoad => self.datacube.is_some(),
        }
    }

    /// Run one stage over every pending scene.
    ///
    /// A missing stage tool is a configuration problem, not a property of
    /// any scene: the run aborts before touching the catalogue rather than
    /// failing scenes one by one.
    pub async fn run_stage(&self, stage: Stage) -> anyhow::Result<StageCounts> {
        if !self.stage_tool_configured(stage) {
            anyhow::bail!(
                "no {stage} tool configured for sensor '{}'",
                self.config.sensor
            );
        }
        let pending = self.catalogue.list_pending(stage).await?;
        if pending.is_empty() {
            info!(sensor = %self.config.sensor, %stage, "nothing pending");
            return Ok(StageCounts::default());
        }

        self.usage
            .add_entry(&stage_log_entry(
                UsageLogEntry::start(self.config.sensor.as_str(), format!("{stage} stage")),
                stage,
            ))
            .await?;
        info!(sensor = %self.config.sensor, %stage, pending = pending.len(), "stage block start");

        let queue: Arc<Mutex<VecDeque<i64>>> = Arc::new(Mutex::new(pending.into()));
        let processed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let invalidated = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let driver = self.clone();
            let queue = queue.clone();
            let processed = processed.clone();
            let failed = failed.clone();
            let invalidated = invalidated.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let pid = match queue.lock().ok().and_then(|mut q| q.pop_front()) {
                        Some(pid) => pid,
                        None => break,
                    };
                    match driver.run_stage_for(pid, stage).await {
                        Ok(()) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(StageError::Permanent(reason)) => {
                            warn!(pid, %stage, %reason, "scene marked invalid");
                            if let Err(e) = driver.catalogue.mark_invalid(pid).await {
                                warn!(pid, error = %e, "failed to mark scene invalid");
                                failed.fetch_add(1, Ordering::Relaxed);
                            } else {
                                invalidated.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(StageError::Transient(e)) => {
                            warn!(pid, %stage, error = %e, "scene failed, left pending");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await?;
        }

        let counts = StageCounts {
            processed: processed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            invalidated: invalidated.load(Ordering::Relaxed),
        };

        self.usage
            .add_entry(&stage_log_entry(
                UsageLogEntry::end(
                    self.config.sensor.as_str(),
                    format!(
                        "{stage} stage: {} processed, {} failed, {} invalid",
                        counts.processed, counts.failed, counts.invalidated
                    ),
                ),
                stage,
            ))
            .await?;
        info!(sensor = %self.config.sensor, %stage, ?counts, "stage block end");
        Ok(counts)
    }

    /// Execute one stage against one scene and record the result.
    async fn run_stage_for(&self, pid: i64, stage: Stage) -> Result<(), StageError> {
        let scene = self
            .catalogue
            .get_scene(pid)
            .await
            .map_err(StageError::transient)?
            .ok_or_else(|| StageError::Transient(anyhow::anyhow!("scene {pid} disappeared")))?;
        if !scene.eligible_for(stage) {
            // Another worker or an earlier run got here first.
            return Ok(());
        }

        let start = Utc::now();
        match stage {
            Stage::Download => {
                let path = self
                    .downloader
                    .fetch(&scene, &self.config.download_dir())
                    .await?;
                self.mark_complete(pid, stage, path, start).await
            }
            Stage::ArdConvert => {
                let path = self
                    .ard
                    .convert(&scene, &self.config.ard_dir(), &self.config.tmp_dir())
                    .await?;
                self.mark_complete(pid, stage, path, start).await
            }
            Stage::Quicklook => {
                let generator = self.quicklook.as_ref().ok_or_else(|| {
                    StageError::Transient(anyhow::anyhow!("no quicklook generator configured"))
                })?;
                let entry = generator
                    .generate(&scene, &self.config.quicklook_dir())
                    .await?;
                self.catalogue
                    .set_extended_entry(pid, crate::models::QUICKLOOK_KEY, entry)
                    .await
                    .map_err(StageError::transient)
            }
            Stage::Tilecache => {
                let generator = self.tilecache.as_ref().ok_or_else(|| {
                    StageError::Transient(anyhow::anyhow!("no tilecache generator configured"))
                })?;
                let entry = generator
                    .generate(&scene, &self.config.tilecache_dir())
                    .await?;
                self.catalogue
                    .set_extended_entry(pid, crate::models::TILECACHE_KEY, entry)
                    .await
                    .map_err(StageError::transient)
            }
            Stage::DatacubeLoad => {
                let loader = self.datacube.as_ref().ok_or_else(|| {
                    StageError::Transient(anyhow::anyhow!("no datacube loader configured"))
                })?;
                loader.load(&scene).await?;
                self.mark_complete(pid, stage, PathBuf::new(), start).await
            }
        }
    }

    async fn mark_complete(
        &self,
        pid: i64,
        stage: Stage,
        artifact: PathBuf,
        start: chrono::DateTime<Utc>,
    ) -> Result<(), StageError> {
        self.catalogue
            .mark_stage_complete(pid, stage, &artifact, start, Utc::now())
            .await
            .map_err(StageError::transient)
    }

    /// Run every registered plugin against every scene that still needs it.
    pub async fn run_plugins(&self) -> anyhow::Result<StageCounts> {
        if self.plugins.is_empty() {
            return Ok(StageCounts::default());
        }

        let candidates = self.plugin_candidates().await?;
        if candidates.is_empty() {
            info!(sensor = %self.config.sensor, "no scenes ready for plugin analysis");
            return Ok(StageCounts::default());
        }

        self.usage
            .add_entry(&UsageLogEntry::start(
                self.config.sensor.as_str(),
                "plugin analysis",
            ))
            .await?;

        let queue: Arc<Mutex<VecDeque<i64>>> = Arc::new(Mutex::new(candidates.into()));
        let processed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let driver = self.clone();
            let queue = queue.clone();
            let processed = processed.clone();
            let failed = failed.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let pid = match queue.lock().ok().and_then(|mut q| q.pop_front()) {
                        Some(pid) => pid,
                        None => break,
                    };
                    match driver.run_plugins_for(pid).await {
                        Ok(counts) => {
                            processed.fetch_add(counts.processed, Ordering::Relaxed);
                            failed.fetch_add(counts.failed, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(pid, error = %e, "plugin pass failed for scene");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await?;
        }

        let counts = StageCounts {
            processed: processed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            invalidated: 0,
        };

        self.usage
            .add_entry(&UsageLogEntry::end(
                self.config.sensor.as_str(),
                format!(
                    "plugin analysis: {} runs completed, {} failed",
                    counts.processed, counts.failed
                ),
            ))
            .await?;
        Ok(counts)
    }

    /// Run the plugins one scene still needs, recording every attempt.
    pub async fn run_plugins_for(&self, pid: i64) -> anyhow::Result<StageCounts> {
        let scene = self
            .catalogue
            .get_scene(pid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("scene {pid} not found"))?;
        if !scene.ard_processed || scene.invalid {
            return Ok(StageCounts::default());
        }

        let keys: Vec<String> = self.plugins.iter().map(|p| p.key().to_string()).collect();
        let pending = self.plugin_runs.pending_for_scene(pid, &keys).await?;
        if pending.is_empty() {
            return Ok(StageCounts::default());
        }

        let context = self.config.context();
        let mut counts = StageCounts::default();
        for plugin in &self.plugins {
            if !pending.iter().any(|key| key == plugin.key()) {
                continue;
            }
            let history = self.plugin_runs.runs_for_scene(pid).await?;
            self.plugin_runs
                .record_start(pid, plugin.key(), Utc::now())
                .await?;

            let run = run_plugin(plugin.as_ref(), &scene, &context, &history).await;
            let outcome = crate::models::PluginOutcome {
                success: run.success,
                produced_artifacts: run.produced_artifacts,
                output: run.output.clone(),
            };
            self.plugin_runs
                .record_outcome(
                    pid,
                    plugin.key(),
                    &outcome,
                    run.error.as_deref(),
                    run.finished_at.unwrap_or_else(Utc::now),
                )
                .await?;

            if run.success {
                if let Some(output) = run.output {
                    self.catalogue
                        .set_extended_entry(
                            pid,
                            plugin.key(),
                            crate::models::ExtendedEntry::PluginOutput { document: output },
                        )
                        .await?;
                }
                counts.processed += 1;
            } else {
                counts.failed += 1;
            }
        }
        Ok(counts)
    }

    /// Scenes whose ARD product exists and that are not invalid.
    async fn plugin_candidates(&self) -> anyhow::Result<Vec<i64>> {
        let mut candidates = Vec::new();
        for pid in self.catalogue.all_pids().await? {
            if let Some(scene) = self.catalogue.get_scene(pid).await? {
                if scene.ard_processed && !scene.invalid {
                    candidates.push(pid);
                }
            }
        }
        Ok(candidates)
    }

    /// The stage sequence this sensor's capabilities call for.
    fn stage_sequence(&self) -> Vec<Stage> {
        let capabilities = self.config.capabilities();
        let mut stages = vec![Stage::Download, Stage::ArdConvert];
        if capabilities.quicklook && self.quicklook.is_some() {
            stages.push(Stage::Quicklook);
        }
        if capabilities.tilecache && self.tilecache.is_some() {
            stages.push(Stage::Tilecache);
        }
        if capabilities.datacube && self.datacube.is_some() {
            stages.push(Stage::DatacubeLoad);
        }
        stages
    }

    /// Run discovery and every stage in order.
    pub async fn run_all(&self, check_from_start: bool) -> anyhow::Result<()> {
        self.discover(check_from_start).await?;
        self.run_stage(Stage::Download).await?;
        self.run_stage(Stage::ArdConvert).await?;
        self.run_plugins().await?;
        for stage in self.stage_sequence() {
            if matches!(stage, Stage::Download | Stage::ArdConvert) {
                continue;
            }
            self.run_stage(stage).await?;
        }
        Ok(())
    }

    /// Run every stage one scene still needs, sequentially, without the
    /// worker pool. External batch schedulers shell out to this per scene.
    pub async fn process_one(&self, pid: i64) -> anyhow::Result<()> {
        for stage in self.stage_sequence() {
            let scene = self
                .catalogue
                .get_scene(pid)
                .await?
                .ok_or_else(|| anyhow::anyhow!("scene {pid} not found"))?;
            if scene.invalid {
                anyhow::bail!("scene {pid} is marked invalid");
            }
            if !scene.eligible_for(stage) {
                continue;
            }
            match self.run_stage_for(pid, stage).await {
                Ok(()) => {}
                Err(StageError::Permanent(reason)) => {
                    self.catalogue.mark_invalid(pid).await?;
                    anyhow::bail!("scene {pid} is unprocessable: {reason}");
                }
                Err(StageError::Transient(e)) => return Err(e),
            }
            if stage == Stage::ArdConvert {
                self.run_plugins_for(pid).await?;
            }
        }
        Ok(())
    }

    /// Whether any stage or plugin still applies to this scene.
    pub async fn scene_needs_processing(&self, pid: i64) -> anyhow::Result<bool> {
        let scene = self
            .catalogue
            .get_scene(pid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("scene {pid} not found"))?;
        if scene.invalid {
            return Ok(false);
        }
        for stage in self.stage_sequence() {
            if scene.eligible_for(stage) {
                return Ok(true);
            }
        }
        if !self.plugins.is_empty() && scene.ard_processed {
            let keys: Vec<String> = self.plugins.iter().map(|p| p.key().to_string()).collect();
            if !self.plugin_runs.pending_for_scene(pid, &keys).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn stage_log_entry(mut entry: UsageLogEntry, stage: Stage) -> UsageLogEntry {
    match stage {
        Stage::Download => entry.downloaded_scenes = true,
        Stage::ArdConvert => entry.converted_ard = true,
        Stage::DatacubeLoad => entry.loaded_datacube = true,
        Stage::Quicklook | Stage::Tilecache => entry.updated_local_db = true,
    }
    entry
}
