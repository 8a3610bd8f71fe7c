use crate::metadata::SlotMetadata;
use crate::record::WorldSnapshot;
use serde::{Deserialize, Serialize};

pub const MAGIC_NUMBER: &[u8; 8] = b"TX2SLOT\0";
pub const FORMAT_VERSION: u32 = 1;

/// Encoding used for the metadata and body sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotFormat {
    Bincode,
    MessagePack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Zstd,
    Lz4,
}

/// Fixed-size prefix of every slot file.
///
/// ```text
/// [ SlotHeader ][ metadata section ][ body section (maybe compressed) ]
/// ```
///
/// Metadata is never compressed so slot listings can read it without
/// touching the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotHeader {
    pub magic: [u8; 8],
    pub version: u32,
    pub format: SlotFormat,
    pub compression: CompressionType,
    /// SHA-256 of the stored (possibly compressed) body section.
    pub checksum: [u8; 32],
    pub timestamp: i64,
    pub entity_count: u64,
    pub level_count: u64,
    pub metadata_offset: u64,
    pub metadata_size: u64,
    pub data_offset: u64,
    pub data_size: u64,
    /// Length of the body once decompressed.
    pub body_size: u64,
}

impl SlotHeader {
    pub fn new(format: SlotFormat) -> Self {
        Self {
            magic: *MAGIC_NUMBER,
            version: FORMAT_VERSION,
            format,
            compression: CompressionType::None,
            checksum: [0u8; 32],
            timestamp: chrono::Utc::now().timestamp(),
            entity_count: 0,
            level_count: 0,
            metadata_offset: 0,
            metadata_size: 0,
            data_offset: 0,
            data_size: 0,
            body_size: 0,
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.magic != *MAGIC_NUMBER {
            return Err(crate::SaveError::InvalidFormat(
                "Invalid magic number".to_string(),
            ));
        }

        if self.version != FORMAT_VERSION {
            return Err(crate::SaveError::VersionMismatch {
                expected: FORMAT_VERSION.to_string(),
                actual: self.version.to_string(),
            });
        }

        Ok(())
    }
}

impl Default for SlotHeader {
    fn default() -> Self {
        Self::new(SlotFormat::Bincode)
    }
}

/// A fully decoded slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotFile {
    pub header: SlotHeader,
    pub metadata: SlotMetadata,
    pub snapshot: WorldSnapshot,
}
