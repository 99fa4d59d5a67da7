use std::panic::Location;

/// Result alias used throughout the archive crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy shared by the cursor, the compressors, the archive engine
/// and the query engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required argument '{0}' was not provided")]
    NullArgument(&'static str),

    #[error("read out of bounds: {len} bytes at position {pos} exceed buffer of {size} bytes")]
    OutOfBounds { pos: u64, len: u64, size: u64 },

    #[error("write attempted on a read-only cursor")]
    WriteProtected,

    #[error("bit operation issued outside of bit mode")]
    NotInBitMode,

    #[error("bit mode is already active; nested bit-mode sessions are unsupported")]
    BitModeActive,

    #[error("corrupted archive: {0}")]
    Corrupted(String),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    #[error("decompression failure: {0}")]
    DecompressionFailure(String),

    #[error("compression failure: {0}")]
    CompressionFailure(String),

    #[error("string id {0} not found")]
    NotFound(u64),

    #[error("predicate evaluation failed: {0}")]
    PredicateEvaluationFailure(String),

    #[error("invalid document model: {0}")]
    InvalidModel(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable numeric code, kept identical across releases for log scraping.
    pub fn code(&self) -> u16 {
        match self {
            Error::NullArgument(_) => 1,
            Error::OutOfBounds { .. } => 2,
            Error::WriteProtected => 3,
            Error::NotInBitMode => 4,
            Error::BitModeActive => 5,
            Error::Corrupted(_) => 6,
            Error::AllocationFailure(_) => 7,
            Error::DecompressionFailure(_) => 8,
            Error::CompressionFailure(_) => 9,
            Error::NotFound(_) => 10,
            Error::PredicateEvaluationFailure(_) => 11,
            Error::InvalidModel(_) => 12,
            Error::Io(_) => 13,
        }
    }

    pub fn corrupted(detail: impl Into<String>) -> Self {
        Error::Corrupted(detail.into())
    }

    /// `Corrupted` error for a marker byte that does not match the expected one.
    pub fn unexpected_marker(expected: u8, found: u8, offset: u64) -> Self {
        Error::Corrupted(format!(
            "expected marker [{}] but found [{}] at offset 0x{:04x}",
            expected as char, found as char, offset
        ))
    }
}

/// How a caller wants failures surfaced.
///
/// `Lenient` returns every error to the caller. `Strict` turns the first error
/// into a panic that names the call site, which is handy while debugging a
/// broken archive but never the default for library use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    #[default]
    Lenient,
    Strict,
}

impl Strictness {
    /// Pass `result` through, or panic on `Err` when strict.
    #[track_caller]
    pub fn check<T>(self, result: Result<T>) -> Result<T> {
        match (self, result) {
            (Strictness::Strict, Err(err)) => {
                let at = Location::caller();
                panic!("carbon error {} ({}) at {}:{}", err.code(), err, at.file(), at.line())
            }
            (Strictness::Lenient, Err(err)) => {
                tracing::debug!(code = err.code(), "propagating error: {}", err);
                Err(err)
            }
            (_, ok) => ok,
        }
    }
}
