use crate::phy::PhyMode;
use crate::radiotap::FieldKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer is shorter than the fixed radiotap header, or shorter than the
    /// length the header declares for itself.
    #[error("Invalid radiotap length: need {needed} bytes, have {available}")]
    InvalidLength { needed: usize, available: usize },

    #[error("Unsupported radiotap header version: {0}")]
    UnsupportedVersion(u8),

    /// A field flagged present in the bitmap would run past the declared header length.
    #[error("Truncated radiotap header: {kind} at offset {offset} exceeds header length {header_len}")]
    TruncatedHeader {
        kind: FieldKind,
        offset: usize,
        header_len: usize,
    },

    #[error("Index {index} out of range for {table} (max {max})")]
    IndexOutOfRange {
        table: &'static str,
        index: usize,
        max: usize,
    },

    /// A value the duration formula needs was not reported as known by the radiotap header.
    #[error("Missing PHY field: {0}")]
    MissingField(&'static str),

    /// The frame is too long for its duration to fit in microseconds.
    #[error("Frame of {frame_length} bytes overflows the duration range")]
    DurationOverflow { frame_length: u32 },

    #[error("Duration is not computed for {0} frames")]
    UnsupportedPhy(PhyMode),
}

pub type Result<T> = std::result::Result<T, Error>;
