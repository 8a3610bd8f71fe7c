use crate::compression::CompressionCodec;
use crate::error::{Result, SaveError};
use crate::format::{SlotFile, SlotFormat, SlotHeader};
use crate::metadata::SlotMetadata;
use crate::record::WorldSnapshot;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SLOT_EXTENSION: &str = "sav";

/// Raw persistence of encoded slots. Implementations decide where bytes
/// live; the save pipeline only ever talks to this trait.
pub trait FileAdapter: Send + Sync {
    fn exists(&self, slot: &str) -> bool;
    fn delete(&self, slot: &str) -> Result<()>;
    /// Must leave any previous file intact when it fails.
    fn write(&self, slot: &str, bytes: &[u8]) -> Result<()>;
    fn read(&self, slot: &str) -> Result<Vec<u8>>;
    fn list(&self) -> Result<Vec<String>>;
}

/// Slot names become file names, so they may not contain path syntax.
pub fn validate_slot_name(slot: &str) -> Result<()> {
    let forbidden = |c: char| matches!(c, '/' | '\\' | ':' | '\0');
    if slot.is_empty() || slot == "." || slot == ".." || slot.chars().any(forbidden) {
        return Err(SaveError::InvalidSlotName(slot.to_string()));
    }
    Ok(())
}

pub struct SlotWriter {
    format: SlotFormat,
    compression: CompressionCodec,
}

impl SlotWriter {
    pub fn new() -> Self {
        Self {
            format: SlotFormat::Bincode,
            compression: CompressionCodec::zstd_default(),
        }
    }

    pub fn with_format(mut self, format: SlotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_compression(mut self, codec: CompressionCodec) -> Self {
        self.compression = codec;
        self
    }

    pub fn encode(&self, metadata: &SlotMetadata, snapshot: &WorldSnapshot) -> Result<Vec<u8>> {
        let metadata_bytes = encode_section(metadata, self.format)?;
        let body = encode_section(snapshot, self.format)?;
        let body_size = body.len() as u64;
        let stored_body = self.compression.compress_body(body)?;

        let mut header = SlotHeader::new(self.format);
        header.compression = self.compression.into();
        header.checksum = checksum(&stored_body);
        header.entity_count = snapshot.entity_count() as u64;
        header.level_count = snapshot.levels().count() as u64;
        header.metadata_size = metadata_bytes.len() as u64;
        header.data_size = stored_body.len() as u64;
        header.body_size = body_size;

        // Offsets do not change the encoded header size.
        let header_len = bincode::serialize(&header)?.len() as u64;
        header.metadata_offset = header_len;
        header.data_offset = header_len + header.metadata_size;

        let header_bytes = bincode::serialize(&header)?;

        let mut result =
            Vec::with_capacity(header_bytes.len() + metadata_bytes.len() + stored_body.len());
        result.extend_from_slice(&header_bytes);
        result.extend_from_slice(&metadata_bytes);
        result.extend_from_slice(&stored_body);

        Ok(result)
    }
}

impl Default for SlotWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SlotReader;

impl SlotReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_header(&self, bytes: &[u8]) -> Result<SlotHeader> {
        let header: SlotHeader = bincode::deserialize(bytes)?;
        header.validate()?;
        Ok(header)
    }

    /// Decodes only the header and metadata sections.
    pub fn read_metadata(&self, bytes: &[u8]) -> Result<SlotMetadata> {
        let header = self.read_header(bytes)?;
        let section = section(bytes, header.metadata_offset, header.metadata_size)?;
        decode_section(section, header.format)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<SlotFile> {
        let header = self.read_header(bytes)?;

        let metadata_bytes = section(bytes, header.metadata_offset, header.metadata_size)?;
        let metadata = decode_section(metadata_bytes, header.format)?;

        let stored_body = section(bytes, header.data_offset, header.data_size)?;
        if checksum(stored_body) != header.checksum {
            return Err(SaveError::ChecksumMismatch);
        }
        let body = header
            .compression
            .decompress_body(stored_body, header.body_size)?;
        let snapshot = decode_section(&body, header.format)?;

        Ok(SlotFile {
            header,
            metadata,
            snapshot,
        })
    }
}

impl Default for SlotReader {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_section<T: Serialize>(value: &T, format: SlotFormat) -> Result<Vec<u8>> {
    match format {
        SlotFormat::Bincode => {
            bincode::serialize(value).map_err(|e| SaveError::Serialization(e.to_string()))
        }
        SlotFormat::MessagePack => {
            rmp_serde::to_vec(value).map_err(|e| SaveError::Serialization(e.to_string()))
        }
    }
}

fn decode_section<T: DeserializeOwned>(bytes: &[u8], format: SlotFormat) -> Result<T> {
    match format {
        SlotFormat::Bincode => {
            bincode::deserialize(bytes).map_err(|e| SaveError::Deserialization(e.to_string()))
        }
        SlotFormat::MessagePack => {
            rmp_serde::from_slice(bytes).map_err(|e| SaveError::Deserialization(e.to_string()))
        }
    }
}

fn section(bytes: &[u8], offset: u64, size: u64) -> Result<&[u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            SaveError::InvalidFormat(format!(
                "Section {}+{} exceeds slot length {}",
                offset,
                size,
                bytes.len()
            ))
        })?;
    Ok(&bytes[start..end])
}

fn checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Slots stored as `<root>/<slot>.sav`.
pub struct SlotStore {
    root_dir: PathBuf,
}

impl SlotStore {
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)?;

        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.root_dir.join(format!("{}.{}", slot, SLOT_EXTENSION))
    }
}

impl FileAdapter for SlotStore {
    fn exists(&self, slot: &str) -> bool {
        validate_slot_name(slot).is_ok() && self.slot_path(slot).is_file()
    }

    fn delete(&self, slot: &str) -> Result<()> {
        validate_slot_name(slot)?;
        let path = self.slot_path(slot);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn write(&self, slot: &str, bytes: &[u8]) -> Result<()> {
        validate_slot_name(slot)?;
        atomic_write(&self.slot_path(slot), bytes)
    }

    fn read(&self, slot: &str) -> Result<Vec<u8>> {
        validate_slot_name(slot)?;
        let path = self.slot_path(slot);
        if !path.is_file() {
            return Err(SaveError::SlotNotFound(slot.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut slots = Vec::new();

        for entry in fs::read_dir(&self.root_dir)? {
            let path = entry?.path();

            if path.extension().is_some_and(|ext| ext == SLOT_EXTENSION) {
                if let Some(stem) = path.file_stem() {
                    slots.push(stem.to_string_lossy().to_string());
                }
            }
        }

        slots.sort();
        Ok(slots)
    }
}

/// Writes `<path>.tmp`, syncs it, then renames it over `path`. A failure at
/// any step leaves the previous file untouched.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let written = File::create(&tmp_path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Keeps slots in memory. Useful for tests and for hosts that ship bytes
/// elsewhere themselves.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileAdapter for MemoryStore {
    fn exists(&self, slot: &str) -> bool {
        self.slots.read().contains_key(slot)
    }

    fn delete(&self, slot: &str) -> Result<()> {
        validate_slot_name(slot)?;
        self.slots.write().remove(slot);
        Ok(())
    }

    fn write(&self, slot: &str, bytes: &[u8]) -> Result<()> {
        validate_slot_name(slot)?;
        self.slots.write().insert(slot.to_string(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, slot: &str) -> Result<Vec<u8>> {
        self.slots
            .read()
            .get(slot)
            .cloned()
            .ok_or_else(|| SaveError::SlotNotFound(slot.to_string()))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.slots.read().keys().cloned().collect())
    }
}
