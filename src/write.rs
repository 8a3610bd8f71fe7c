use crate::compression::CompressionCodec;
use crate::error::{Result, SaveError};
use crate::format::SlotFormat;
use crate::metadata::SlotMetadata;
use crate::record::WorldSnapshot;
use crate::storage::{FileAdapter, SlotWriter};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use rayon::ThreadPool;
use std::sync::Arc;

/// Encode-and-persist step of a save. Owns the captured data while it runs
/// and hands it back in the outcome so the caller can reuse its buffers.
pub struct WriteJob {
    pub slot: String,
    pub metadata: SlotMetadata,
    pub snapshot: WorldSnapshot,
    pub format: SlotFormat,
    pub codec: CompressionCodec,
    /// Remove an existing file of the slot before writing the new one.
    pub replace_existing: bool,
    pub adapter: Arc<dyn FileAdapter>,
}

pub struct WriteOutcome {
    pub result: Result<usize>,
    pub metadata: SlotMetadata,
    pub snapshot: WorldSnapshot,
}

impl WriteJob {
    /// Runs on the calling thread. `Ok` carries the number of bytes written.
    pub fn run(self) -> WriteOutcome {
        let result = self.write();
        WriteOutcome {
            result,
            metadata: self.metadata,
            snapshot: self.snapshot,
        }
    }

    fn write(&self) -> Result<usize> {
        let bytes = SlotWriter::new()
            .with_format(self.format)
            .with_compression(self.codec)
            .encode(&self.metadata, &self.snapshot)?;
        if self.replace_existing && self.adapter.exists(&self.slot) {
            log::debug!("Deleting previous file of slot '{}'", self.slot);
            self.adapter.delete(&self.slot)?;
        }
        self.adapter.write(&self.slot, &bytes)?;
        Ok(bytes.len())
    }

    pub fn spawn(self, pool: &ThreadPool) -> WriteHandle {
        let (sender, receiver) = bounded(1);
        let slot = self.slot.clone();
        pool.spawn(move || {
            // The handle joins before it goes away, so a send only fails if
            // the receiver was leaked.
            let _ = sender.send(self.run());
        });
        WriteHandle {
            slot,
            receiver: Some(receiver),
            outcome: None,
        }
    }
}

/// Joinable handle to a background write.
///
/// Dropping a handle whose write is still running blocks until the write
/// finishes; the write is never abandoned.
pub struct WriteHandle {
    slot: String,
    receiver: Option<Receiver<WriteOutcome>>,
    outcome: Option<WriteOutcome>,
}

impl WriteHandle {
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Non-blocking check for completion.
    pub fn is_done(&mut self) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        let Some(receiver) = &self.receiver else {
            return true;
        };
        match receiver.try_recv() {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.receiver = None;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.receiver = None;
                true
            }
        }
    }

    /// Takes the outcome if the write has finished.
    pub fn try_take(&mut self) -> Option<Result<WriteOutcome>> {
        if !self.is_done() {
            return None;
        }
        Some(self.take())
    }

    /// Blocks until the write finishes.
    pub fn join(&mut self) -> Result<WriteOutcome> {
        if self.outcome.is_none() {
            if let Some(receiver) = self.receiver.take() {
                self.outcome = receiver.recv().ok();
            }
        }
        self.take()
    }

    fn take(&mut self) -> Result<WriteOutcome> {
        self.outcome.take().ok_or_else(|| {
            SaveError::ThreadPool(format!("write task for slot '{}' was lost", self.slot))
        })
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            log::warn!(
                "Waiting for outstanding write of slot '{}' before release",
                self.slot
            );
            let _ = receiver.recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SlotReader};

    fn job(adapter: Arc<dyn FileAdapter>) -> WriteJob {
        let mut snapshot = WorldSnapshot::new();
        snapshot.time_seconds = 3.0;
        WriteJob {
            slot: "Alpha".to_string(),
            metadata: SlotMetadata::new("Alpha"),
            snapshot,
            format: SlotFormat::Bincode,
            codec: CompressionCodec::zstd_default(),
            replace_existing: false,
            adapter,
        }
    }

    #[test]
    fn test_sync_write_persists_and_returns_buffers() {
        let store = Arc::new(MemoryStore::new());

        let outcome = job(store.clone()).run();

        assert!(outcome.result.unwrap() > 0);
        assert_eq!(outcome.snapshot.time_seconds, 3.0);
        let slot = SlotReader::new().decode(&store.read("Alpha").unwrap()).unwrap();
        assert_eq!(slot.snapshot.time_seconds, 3.0);
    }

    #[test]
    fn test_background_write_polls_then_completes() {
        let store = Arc::new(MemoryStore::new());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        let mut handle = job(store.clone()).spawn(&pool);
        let outcome = handle.join().unwrap();

        assert!(outcome.result.is_ok());
        assert!(handle.is_done());
        assert!(store.exists("Alpha"));
        assert!(handle.join().is_err());
    }

    #[test]
    fn test_drop_waits_for_write() {
        let store = Arc::new(MemoryStore::new());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        drop(job(store.clone()).spawn(&pool));

        assert!(store.exists("Alpha"));
    }

    #[test]
    fn test_replace_existing_overwrites_previous_file() {
        let store = Arc::new(MemoryStore::new());
        store.write("Alpha", b"previous save").unwrap();
        let mut replacing = job(store.clone());
        replacing.replace_existing = true;

        assert!(replacing.run().result.is_ok());

        let slot = SlotReader::new().decode(&store.read("Alpha").unwrap()).unwrap();
        assert_eq!(slot.snapshot.time_seconds, 3.0);
    }

    #[test]
    fn test_adapter_error_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let mut bad = job(store.clone());
        bad.slot = "../Alpha".to_string();

        let outcome = bad.run();

        assert!(matches!(outcome.result, Err(SaveError::InvalidSlotName(_))));
        assert!(!store.exists("../Alpha"));
    }
}
