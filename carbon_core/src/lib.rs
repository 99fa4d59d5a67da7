pub mod compressor;
pub mod cursor;
pub mod error;
pub mod format;

pub use compressor::{Compressor, CompressorKind};
pub use cursor::{AccessMode, Cursor};
pub use error::{Error, Result, Strictness};
pub use format::{FieldType, FileHeader, PropFlags, PropKind, Scalar, MAGIC};
