use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header describing a save slot. Written in front of the snapshot body so
/// slot listings never need to decode the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMetadata {
    pub slot_name: String,
    pub save_date: DateTime<Utc>,
    /// `None` until the slot has been loaded at least once this session.
    pub load_date: Option<DateTime<Utc>>,
    /// Time played across every slot this game has been saved under.
    pub played_time: Duration,
    /// Time played while saving into this particular slot name.
    pub slot_played_time: Duration,
    pub map: String,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl SlotMetadata {
    pub fn new(slot_name: impl Into<String>) -> Self {
        Self {
            slot_name: slot_name.into(),
            save_date: Utc::now(),
            load_date: None,
            played_time: Duration::ZERO,
            slot_played_time: Duration::ZERO,
            map: String::new(),
            thumbnail: None,
        }
    }

    pub fn was_loaded(&self) -> bool {
        self.load_date.is_some()
    }

    pub fn mark_loaded(&mut self, now: DateTime<Utc>) {
        self.load_date = Some(now);
    }

    /// Stamps the save date and rolls played time forward for a save into
    /// `slot_name` at `now`.
    ///
    /// A slot that was never loaded takes its played time from the world
    /// clock. Otherwise the session since the last load is added to the
    /// cumulative time, and to the slot time only when saving back into the
    /// slot that was loaded. Saving under a new name restarts the slot time
    /// at the session length.
    pub fn stamp_save(&mut self, slot_name: &str, now: DateTime<Utc>, world_seconds: f64) {
        let slot_changed = self.slot_name != slot_name;
        self.slot_name = slot_name.to_string();
        self.save_date = now;

        match self.load_date {
            Some(loaded_at) => {
                let session = (now - loaded_at).to_std().unwrap_or(Duration::ZERO);
                self.played_time += session;
                if slot_changed {
                    self.slot_played_time = session;
                } else {
                    self.slot_played_time += session;
                }
            }
            None => {
                self.played_time = Duration::from_secs_f64(world_seconds.max(0.0));
                self.slot_played_time = self.played_time;
            }
        }
    }
}

impl Default for SlotMetadata {
    fn default() -> Self {
        Self::new(String::new())
    }
}
