use crate::compression::CompressionCodec;
use crate::error::{Result, SaveError};
use crate::format::SlotFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest range a capture task is ever given, regardless of worker count.
pub const MIN_ENTITIES_PER_TASK: usize = 40;

/// Tuning knobs for a save. Loaded from JSON or built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveSettings {
    /// Run capture tasks on the background pool. When off every task runs
    /// on the calling thread and each level gets exactly one task.
    pub multithreaded_capture: bool,
    /// Encode and write the slot file on the io pool instead of inline.
    pub multithreaded_files: bool,
    pub compression: bool,
    pub codec: CompressionCodec,
    pub format: SlotFormat,
    pub store_components: bool,
    /// Background capture workers. `None` uses the machine's parallelism
    /// minus the calling thread.
    pub worker_threads: Option<usize>,
    /// How many ticks to wait for a requested thumbnail before failing the
    /// save. `None` waits indefinitely.
    pub max_thumbnail_polls: Option<u32>,
}

impl SaveSettings {
    pub fn new() -> Self {
        Self {
            multithreaded_capture: true,
            multithreaded_files: true,
            compression: true,
            codec: CompressionCodec::zstd_default(),
            format: SlotFormat::Bincode,
            store_components: true,
            worker_threads: None,
            max_thumbnail_polls: None,
        }
    }

    /// Settings for deterministic, single-threaded saves.
    pub fn sequential() -> Self {
        Self::new()
            .with_multithreaded_capture(false)
            .with_multithreaded_files(false)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) && self.multithreaded_capture {
            return Err(SaveError::Settings(
                "multithreaded capture needs at least one worker thread".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_multithreaded_capture(mut self, enabled: bool) -> Self {
        self.multithreaded_capture = enabled;
        self
    }

    pub fn with_multithreaded_files(mut self, enabled: bool) -> Self {
        self.multithreaded_files = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_format(mut self, format: SlotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_store_components(mut self, enabled: bool) -> Self {
        self.store_components = enabled;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_max_thumbnail_polls(mut self, polls: u32) -> Self {
        self.max_thumbnail_polls = Some(polls);
        self
    }

    /// Threads used for capture in the background pool.
    pub fn background_workers(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(0)
        })
    }

    /// Background workers plus the calling thread.
    pub fn total_workers(&self) -> usize {
        self.background_workers() + 1
    }

    /// The codec actually applied to the body for this save.
    pub fn effective_codec(&self) -> CompressionCodec {
        if self.compression {
            self.codec
        } else {
            CompressionCodec::None
        }
    }
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self::new()
    }
}
