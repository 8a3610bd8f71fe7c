use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid slot format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Slot not found: {0}")]
    SlotNotFound(String),

    #[error("Invalid slot name: {0:?}")]
    InvalidSlotName(String),

    #[error("Slot '{0}' already exists and override was not requested")]
    SlotExists(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("A save is already in progress for slot '{0}'")]
    SaveInProgress(String),

    #[error("Thumbnail unavailable: {0}")]
    Thumbnail(String),

    #[error("Save aborted during teardown")]
    TeardownAbort,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SaveError {
    /// Policy skips are not faults; callers usually log them at a lower level.
    pub fn is_skipped_by_policy(&self) -> bool {
        matches!(self, SaveError::SlotExists(_))
    }
}

pub type Result<T> = std::result::Result<T, SaveError>;
