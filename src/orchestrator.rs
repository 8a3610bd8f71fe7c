use crate::capture::CaptureContext;
use crate::error::{Result, SaveError};
use crate::filter::ClassFilter;
use crate::metadata::SlotMetadata;
use crate::partition::{merge_outputs, CaptureSchedule, MergeStats, Partitioner};
use crate::record::{LevelKey, WorldSnapshot};
use crate::settings::SaveSettings;
use crate::storage::{validate_slot_name, FileAdapter};
use crate::thumbnail::ThumbnailSource;
use crate::world::{SimLevel, SimWorld};
use crate::write::{WriteHandle, WriteJob, WriteOutcome};
use chrono::Utc;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    CheckExisting,
    Prepare,
    Capture,
    Merge,
    Write,
    Finished { success: bool },
}

impl SaveState {
    pub fn is_finished(&self) -> bool {
        matches!(self, SaveState::Finished { .. })
    }
}

/// Receives the slot metadata on success, `None` on any failure.
pub type SaveCallback = Box<dyn FnOnce(Option<&SlotMetadata>) + Send>;

pub struct SaveRequest {
    pub slot: String,
    pub override_existing: bool,
    /// Width and height of the thumbnail to capture, if any.
    pub thumbnail: Option<(u32, u32)>,
    pub filter: ClassFilter,
    pub on_complete: Option<SaveCallback>,
}

impl SaveRequest {
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            override_existing: false,
            thumbnail: None,
            filter: ClassFilter::allowing("Actor"),
            on_complete: None,
        }
    }

    pub fn with_override(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn with_thumbnail(mut self, width: u32, height: u32) -> Self {
        self.thumbnail = Some((width, height));
        self
    }

    pub fn with_filter(mut self, filter: ClassFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce(Option<&SlotMetadata>) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

/// The metadata and snapshot a save works on. Owned by whoever drives saves
/// and lent to one `SaveTask` at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveContext {
    pub metadata: SlotMetadata,
    pub snapshot: WorldSnapshot,
}

/// Thread pools a save runs on. `None` means "run on the calling thread".
pub struct SavePools {
    capture: Option<ThreadPool>,
    io: Option<ThreadPool>,
}

impl SavePools {
    pub fn new(settings: &SaveSettings) -> Result<Self> {
        let workers = settings.background_workers();
        let capture = if settings.multithreaded_capture && workers > 0 {
            Some(build_pool(workers, "tx2-capture")?)
        } else {
            None
        };
        let io = if settings.multithreaded_files {
            Some(build_pool(1, "tx2-slot-io")?)
        } else {
            None
        };
        Ok(Self { capture, io })
    }

    pub fn sequential() -> Self {
        Self {
            capture: None,
            io: None,
        }
    }

    pub fn capture(&self) -> Option<&ThreadPool> {
        self.capture.as_ref()
    }

    pub fn io(&self) -> Option<&ThreadPool> {
        self.io.as_ref()
    }
}

fn build_pool(threads: usize, name: &'static str) -> Result<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{}-{}", name, i))
        .build()
        .map_err(|e| SaveError::ThreadPool(e.to_string()))
}

/// One save operation, driven through its states by `start` and `tick`.
///
/// `start` runs everything up to the file write on the calling thread. A
/// background write, or a thumbnail that is not ready yet, keeps the task in
/// `Write` until a later `tick` observes completion. The completion callback
/// runs exactly once, including when the task is dropped early.
pub struct SaveTask {
    state: SaveState,
    slot: String,
    override_existing: bool,
    replace_existing: bool,
    thumbnail_size: Option<(u32, u32)>,
    filter: ClassFilter,
    callback: Option<SaveCallback>,
    settings: SaveSettings,
    adapter: Arc<dyn FileAdapter>,
    context: Option<SaveContext>,
    thumbnails: Option<Box<dyn ThumbnailSource>>,
    thumbnail_polls: u32,
    awaiting_thumbnail: bool,
    write: Option<WriteHandle>,
    stats: MergeStats,
    failure: Option<SaveError>,
}

impl SaveTask {
    pub fn new(
        request: SaveRequest,
        context: SaveContext,
        settings: SaveSettings,
        adapter: Arc<dyn FileAdapter>,
    ) -> Self {
        Self {
            state: SaveState::Idle,
            slot: request.slot,
            override_existing: request.override_existing,
            replace_existing: false,
            thumbnail_size: request.thumbnail,
            filter: request.filter,
            callback: request.on_complete,
            settings,
            adapter,
            context: Some(context),
            thumbnails: None,
            thumbnail_polls: 0,
            awaiting_thumbnail: false,
            write: None,
            stats: MergeStats::default(),
            failure: None,
        }
    }

    pub fn with_thumbnail_source(mut self, source: Box<dyn ThumbnailSource>) -> Self {
        self.thumbnails = Some(source);
        self
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn failure(&self) -> Option<&SaveError> {
        self.failure.as_ref()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn context(&self) -> Option<&SaveContext> {
        self.context.as_ref()
    }

    /// Gives back the context and thumbnail source once the task is done.
    pub fn take_context(&mut self) -> Option<(SaveContext, Option<Box<dyn ThumbnailSource>>)> {
        if !self.is_finished() {
            return None;
        }
        let context = self.context.take()?;
        Some((context, self.thumbnails.take()))
    }

    pub fn start(&mut self, world: &dyn SimWorld, pools: &SavePools) -> SaveState {
        if self.state != SaveState::Idle {
            return self.state;
        }

        log::info!("Saving slot '{}'", self.slot);
        if let Err(e) = self.run_until_write(world, pools) {
            self.finish(Err(e));
        }
        self.state
    }

    /// Polls the thumbnail and the background write.
    pub fn tick(&mut self, pools: &SavePools) -> SaveState {
        if self.state != SaveState::Write {
            return self.state;
        }

        if self.awaiting_thumbnail {
            if let Err(e) = self.poll_thumbnail() {
                self.finish(Err(e));
                return self.state;
            }
            if self.awaiting_thumbnail {
                return self.state;
            }
            self.begin_write(pools.io());
            if self.state != SaveState::Write {
                return self.state;
            }
        }

        if let Some(handle) = self.write.as_mut() {
            if let Some(joined) = handle.try_take() {
                self.write = None;
                let result = self.reclaim(joined);
                self.finish(result);
            }
        }
        self.state
    }

    fn run_until_write(&mut self, world: &dyn SimWorld, pools: &SavePools) -> Result<()> {
        self.state = SaveState::CheckExisting;
        self.check_existing()?;

        self.state = SaveState::Prepare;
        self.prepare(world)?;

        self.state = SaveState::Capture;
        self.capture(world, pools.capture())?;

        self.state = SaveState::Write;
        if self.awaiting_thumbnail {
            self.poll_thumbnail()?;
        }
        if !self.awaiting_thumbnail {
            self.begin_write(pools.io());
        }
        Ok(())
    }

    /// The previous file is only removed by the write itself, so a save
    /// that fails before then leaves it in place.
    fn check_existing(&mut self) -> Result<()> {
        validate_slot_name(&self.slot)?;

        if self.adapter.exists(&self.slot) {
            if !self.override_existing {
                return Err(SaveError::SlotExists(self.slot.clone()));
            }
            self.replace_existing = true;
        }
        Ok(())
    }

    fn prepare(&mut self, world: &dyn SimWorld) -> Result<()> {
        if !world.has_authority() {
            return Err(SaveError::Precondition(
                "world has no authority to save".to_string(),
            ));
        }

        if let Some((width, height)) = self.thumbnail_size {
            let source = self.thumbnails.as_mut().ok_or_else(|| {
                SaveError::Thumbnail("no thumbnail source configured".to_string())
            })?;
            source.request(width, height);
            self.awaiting_thumbnail = true;
        }

        let context = self.context.as_mut().ok_or(SaveError::TeardownAbort)?;
        context.snapshot.clean();

        let world_seconds = world.time_seconds();
        let metadata = &mut context.metadata;
        metadata.stamp_save(&self.slot, Utc::now(), world_seconds);
        metadata.map = world.map_name().to_string();
        metadata.thumbnail = None;

        context.snapshot.time_seconds = world_seconds;
        context.snapshot.map = metadata.map.clone();
        Ok(())
    }

    fn capture(&mut self, world: &dyn SimWorld, pool: Option<&ThreadPool>) -> Result<()> {
        let mut levels: Vec<(LevelKey, &dyn SimLevel)> = vec![(LevelKey::Main, world.main_level())];
        for streaming in world.streaming_levels() {
            if let Some(level) = streaming.loaded {
                levels.push((LevelKey::Streaming(streaming.package), level));
            }
        }

        let partitioner = Partitioner::new(&self.settings, levels.len());
        let filter = self.filter.baked(world.classes());
        let ctx = CaptureContext {
            classes: world.classes(),
            filter: &filter,
            store_components: self.settings.store_components,
        };

        let context = self.context.as_mut().ok_or(SaveError::TeardownAbort)?;
        let mut schedule = CaptureSchedule::new();
        for (key, level) in levels {
            context.snapshot.level_or_insert(&key).clean();
            schedule.schedule_level(key, level, &partitioner);
        }

        log::debug!(
            "Capturing {} tasks with {} workers",
            schedule.len(),
            partitioner.workers
        );
        let outputs = schedule.run(&ctx, pool);

        self.state = SaveState::Merge;
        self.stats = merge_outputs(&mut context.snapshot, outputs);
        log::debug!(
            "Merged {} entities from {} tasks ({} skipped)",
            self.stats.captured,
            self.stats.tasks,
            self.stats.skipped
        );
        Ok(())
    }

    fn poll_thumbnail(&mut self) -> Result<()> {
        let image = self.thumbnails.as_mut().and_then(|source| source.poll());
        match image {
            Some(image) => {
                self.context_mut()?.metadata.thumbnail = Some(image);
                self.awaiting_thumbnail = false;
                Ok(())
            }
            None => {
                self.thumbnail_polls += 1;
                match self.settings.max_thumbnail_polls {
                    Some(max) if self.thumbnail_polls >= max => Err(SaveError::Thumbnail(format!(
                        "not ready after {} polls",
                        self.thumbnail_polls
                    ))),
                    _ => Ok(()),
                }
            }
        }
    }

    fn begin_write(&mut self, io: Option<&ThreadPool>) {
        let Some(context) = self.context.take() else {
            self.finish(Err(SaveError::TeardownAbort));
            return;
        };

        let job = WriteJob {
            slot: self.slot.clone(),
            metadata: context.metadata,
            snapshot: context.snapshot,
            format: self.settings.format,
            codec: self.settings.effective_codec(),
            replace_existing: self.replace_existing,
            adapter: Arc::clone(&self.adapter),
        };

        match io {
            Some(pool) => self.write = Some(job.spawn(pool)),
            None => {
                let result = self.reclaim(Ok(job.run()));
                self.finish(result);
            }
        }
    }

    /// Puts the buffers back and extracts the write result.
    fn reclaim(&mut self, joined: Result<WriteOutcome>) -> Result<()> {
        match joined {
            Ok(outcome) => {
                self.context = Some(SaveContext {
                    metadata: outcome.metadata,
                    snapshot: outcome.snapshot,
                });
                let written = outcome.result?;
                log::debug!("Wrote {} bytes to slot '{}'", written, self.slot);
                Ok(())
            }
            Err(e) => {
                log::error!("Lost save buffers of slot '{}': {}", self.slot, e);
                self.context = Some(SaveContext::default());
                Err(e)
            }
        }
    }

    fn finish(&mut self, result: Result<()>) {
        if self.is_finished() {
            return;
        }

        if let Some(context) = self.context.as_mut() {
            context.snapshot.clean();
        }

        let success = result.is_ok();
        match result {
            Ok(()) => log::info!("Finished saving slot '{}'", self.slot),
            Err(e) if e.is_skipped_by_policy() => {
                log::info!("Skipped save: {}", e);
                self.failure = Some(e);
            }
            Err(e) => {
                log::warn!("Failed to save slot '{}': {}", self.slot, e);
                self.failure = Some(e);
            }
        }
        self.state = SaveState::Finished { success };

        if let Some(callback) = self.callback.take() {
            let metadata = self
                .context
                .as_ref()
                .filter(|_| success)
                .map(|context| &context.metadata);
            callback(metadata);
        }
    }

    fn context_mut(&mut self) -> Result<&mut SaveContext> {
        self.context.as_mut().ok_or(SaveError::TeardownAbort)
    }
}

impl Drop for SaveTask {
    fn drop(&mut self) {
        if let Some(mut handle) = self.write.take() {
            if let Some(joined) = handle.try_take() {
                let result = self.reclaim(joined);
                self.finish(result);
            } else if let Err(e) = self.reclaim(handle.join()) {
                log::warn!("Write of slot '{}' during teardown: {}", self.slot, e);
            }
        }
        if !self.is_finished() {
            self.finish(Err(SaveError::TeardownAbort));
        }
    }
}
