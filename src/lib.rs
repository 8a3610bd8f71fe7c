pub mod capture;
pub mod class;
pub mod compression;
pub mod error;
pub mod filter;
pub mod format;
pub mod manager;
pub mod metadata;
pub mod orchestrator;
pub mod partition;
pub mod record;
pub mod settings;
pub mod storage;
pub mod thumbnail;
pub mod world;
pub mod write;

#[cfg(test)]
mod testing;

pub use capture::{Capabilities, CaptureContext, CaptureOutput, CaptureTask, SaveTags};
pub use class::ClassRegistry;
pub use compression::{CompressionCodec, MAX_BODY_SIZE};
pub use error::{Result, SaveError};
pub use filter::ClassFilter;
pub use format::{CompressionType, SlotFile, SlotFormat, SlotHeader};
pub use manager::SaveManager;
pub use metadata::{SlotMetadata, Thumbnail};
pub use orchestrator::{SaveCallback, SaveContext, SavePools, SaveRequest, SaveState, SaveTask};
pub use partition::{merge_outputs, split_ranges, CaptureSchedule, MergeStats, Partitioner};
pub use record::{ComponentRecord, EntityRecord, LevelKey, LevelRecord, PhysicsState, Transform, WorldSnapshot};
pub use settings::{SaveSettings, MIN_ENTITIES_PER_TASK};
pub use storage::{FileAdapter, MemoryStore, SlotReader, SlotStore, SlotWriter};
pub use thumbnail::{FixedThumbnail, ThumbnailSource};
pub use world::{SimComponent, SimEntity, SimLevel, SimWorld, StreamingLevel};
pub use write::{WriteHandle, WriteJob, WriteOutcome};
