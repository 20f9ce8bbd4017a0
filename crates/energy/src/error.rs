//! Error and Result types for energy profile storage.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for energy store operations.
pub type Result<T> = std::result::Result<T, EnergyError>;

/// The error type for energy profile storage.
#[derive(Debug, Error)]
pub enum EnergyError {
    /// A readings or channel list was constructed with no channels.
    #[error("readings must have at least one channel")]
    NoChannels,

    /// A single channel was passed to the multi-channel constructor.
    #[error("multi-channel readings need at least two channels, use Readings::one for a single channel")]
    SingleChannel,

    /// Channels of one readings value have different lengths.
    #[error("all channels must have the same number of values: expected {expected}, got {actual}")]
    UnequalChannelLengths {
        /// Length of the first channel.
        expected: usize,
        /// Length of the offending channel.
        actual: usize,
    },

    /// A sample index was outside the sequence.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Sequence length.
        len: usize,
    },

    /// A 1-based channel number was outside `1..=num_channels`.
    #[error("channel number {channel} must be in range 1..={num_channels}")]
    ChannelOutOfRange {
        /// Requested channel number.
        channel: usize,
        /// Number of channels available.
        num_channels: usize,
    },

    /// Min or max was requested over a zero-length sequence.
    #[error("can't get {0} of 0 length readings")]
    EmptySamples(&'static str),

    /// The kW in and kW out readings of a profile have different lengths.
    #[error("readings must have the same length: kw_in {kw_in}, kw_out {kw_out}")]
    ReadingsLengthMismatch {
        /// Length of the kW in readings.
        kw_in: usize,
        /// Length of the kW out readings.
        kw_out: usize,
    },

    /// A statistic was requested for a profile without readings.
    #[error("profile must have readings with a length")]
    EmptyProfile,

    /// More channels than the readings format can carry.
    #[error("the maximum number of channels supported is 127, got {0}")]
    TooManyChannels(usize),

    /// More intervals than the readings format can carry.
    #[error("the maximum number of intervals supported is 2147483647, got {0}")]
    TooManyIntervals(usize),

    /// A value cannot be represented in the scaled integer encoding.
    #[error("value {0} cannot be encoded")]
    UnencodableValue(f64),

    /// The missing-marker readings has no encoded form.
    #[error("missing readings can not be encoded, delete the attribute instead")]
    MissingNotEncodable,

    /// A stored payload could not be decoded.
    #[error("failed to decode {0}")]
    Decode(String),

    /// Invalid magic bytes in a blob store file.
    #[error("Invalid magic bytes: expected AEBS, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported blob store file format version.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// File checksum does not match expected value.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected CRC32 checksum.
        expected: u32,
        /// Actual computed CRC32 checksum.
        actual: u32,
    },

    /// A blob store file is structurally damaged.
    #[error("Corrupt blob store {}: {reason}", .path.display())]
    Corrupt {
        /// File that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Partition metadata does not match the date or time zone it was opened for.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The storage collaborator rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Rebuilding the date-range index failed; the previous index was restored.
    #[error("{message}")]
    Reindex {
        /// Description of the failed step.
        message: String,
        /// Underlying failure, when there is one.
        #[source]
        source: Option<Box<EnergyError>>,
    },

    /// The previous index could not be put back after a failed rebuild.
    #[error("Failed to restore index. You need to manually restore from backup file: {}", .backup.display())]
    RestoreFailed {
        /// Backup file holding the previous index.
        backup: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl EnergyError {
    pub(crate) fn reindex(message: impl Into<String>, source: Option<EnergyError>) -> Self {
        Self::Reindex {
            message: message.into(),
            source: source.map(Box::new),
        }
    }
}
