use crate::error::{Result, SaveError};
use crate::metadata::SlotMetadata;
use crate::orchestrator::{SaveContext, SavePools, SaveRequest, SaveState, SaveTask};
use crate::record::WorldSnapshot;
use crate::settings::SaveSettings;
use crate::storage::{validate_slot_name, FileAdapter, SlotReader};
use crate::thumbnail::ThumbnailSource;
use crate::world::SimWorld;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Owns the current slot context and runs at most one save at a time.
///
/// The host calls `request_save` and then `tick` once per frame until the
/// save reports `Finished`. Dropping the manager mid-save waits for any
/// background write.
pub struct SaveManager {
    // Dropped first so an outstanding write is joined while its pool lives.
    active: Option<SaveTask>,
    settings: SaveSettings,
    adapter: Arc<dyn FileAdapter>,
    pools: SavePools,
    context: Option<SaveContext>,
    thumbnails: Option<Box<dyn ThumbnailSource>>,
}

impl SaveManager {
    pub fn new(settings: SaveSettings, adapter: Arc<dyn FileAdapter>) -> Result<Self> {
        settings.validate()?;
        let pools = SavePools::new(&settings)?;

        Ok(Self {
            active: None,
            settings,
            adapter,
            pools,
            context: Some(SaveContext::default()),
            thumbnails: None,
        })
    }

    pub fn with_thumbnail_source(mut self, source: Box<dyn ThumbnailSource>) -> Self {
        self.thumbnails = Some(source);
        self
    }

    pub fn settings(&self) -> &SaveSettings {
        &self.settings
    }

    pub fn is_saving(&self) -> bool {
        self.active.is_some()
    }

    /// `None` while a save holds the context.
    pub fn current_metadata(&self) -> Option<&SlotMetadata> {
        self.context.as_ref().map(|c| &c.metadata)
    }

    pub fn current_snapshot(&self) -> Option<&WorldSnapshot> {
        self.context.as_ref().map(|c| &c.snapshot)
    }

    /// Starts a save. Runs capture immediately; the write may continue in
    /// the background until a later `tick`.
    pub fn request_save(&mut self, world: &dyn SimWorld, request: SaveRequest) -> Result<SaveState> {
        let Some(context) = self.context.take() else {
            let busy = self
                .active
                .as_ref()
                .map(|task| task.slot().to_string())
                .unwrap_or_default();
            if let Some(callback) = request.on_complete {
                callback(None);
            }
            return Err(SaveError::SaveInProgress(busy));
        };

        let mut task = SaveTask::new(
            request,
            context,
            self.settings.clone(),
            Arc::clone(&self.adapter),
        );
        if let Some(source) = self.thumbnails.take() {
            task = task.with_thumbnail_source(source);
        }

        let state = task.start(world, &self.pools);
        self.active = Some(task);
        self.reap();
        Ok(state)
    }

    /// Advances the active save. Returns `None` when nothing is running.
    pub fn tick(&mut self) -> Option<SaveState> {
        let state = self.active.as_mut()?.tick(&self.pools);
        self.reap();
        Some(state)
    }

    /// Ticks until the active save finishes.
    pub fn wait(&mut self) -> Option<SaveState> {
        let mut last = None;
        while let Some(state) = self.tick() {
            last = Some(state);
            if state.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        last
    }

    fn reap(&mut self) {
        let finished = self.active.as_ref().is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }
        if let Some(mut task) = self.active.take() {
            if let Some((context, thumbnails)) = task.take_context() {
                self.context = Some(context);
                self.thumbnails = thumbnails.or(self.thumbnails.take());
            }
        }
        if self.context.is_none() {
            self.context = Some(SaveContext::default());
        }
    }

    /// Reads a slot and makes it the current context. Played time keeps
    /// accumulating from this moment on.
    pub fn load_slot(&mut self, slot: &str) -> Result<&SlotMetadata> {
        if let Some(task) = &self.active {
            return Err(SaveError::SaveInProgress(task.slot().to_string()));
        }

        validate_slot_name(slot)?;
        let bytes = self.adapter.read(slot)?;
        let file = SlotReader::new().decode(&bytes)?;

        let mut metadata = file.metadata;
        metadata.mark_loaded(Utc::now());
        log::info!("Loaded slot '{}' ({} entities)", slot, file.snapshot.entity_count());

        let context = self.context.insert(SaveContext {
            metadata,
            snapshot: file.snapshot,
        });
        Ok(&context.metadata)
    }

    pub fn read_slot_info(&self, slot: &str) -> Result<SlotMetadata> {
        validate_slot_name(slot)?;
        let bytes = self.adapter.read(slot)?;
        SlotReader::new().read_metadata(&bytes)
    }

    pub fn list_slots(&self) -> Result<Vec<String>> {
        self.adapter.list()
    }

    pub fn slot_exists(&self, slot: &str) -> bool {
        validate_slot_name(slot).is_ok() && self.adapter.exists(slot)
    }

    pub fn delete_slot(&self, slot: &str) -> Result<()> {
        validate_slot_name(slot)?;
        if self.active.as_ref().is_some_and(|task| task.slot() == slot) {
            return Err(SaveError::SaveInProgress(slot.to_string()));
        }
        self.adapter.delete(slot)
    }
}
