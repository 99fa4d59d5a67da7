use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use crate::cursor::Cursor;
use crate::error::{Error, Result};

// ── Compressor flags ───────────────────────────────────────────────────────

pub const COMPRESSOR_FLAG_NONE: u8 = 1 << 0;
pub const COMPRESSOR_FLAG_HUFFMAN: u8 = 1 << 1;

/// Which string compressor an archive is written with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressorKind {
    #[default]
    None,
    Huffman,
}

impl CompressorKind {
    pub fn flag(self) -> u8 {
        match self {
            CompressorKind::None => COMPRESSOR_FLAG_NONE,
            CompressorKind::Huffman => COMPRESSOR_FLAG_HUFFMAN,
        }
    }

    /// Resolve a string-table flags byte. Exactly one known bit must be set.
    pub fn from_flags(flags: u8) -> Result<Self> {
        match flags {
            COMPRESSOR_FLAG_NONE => Ok(CompressorKind::None),
            COMPRESSOR_FLAG_HUFFMAN => Ok(CompressorKind::Huffman),
            other => Err(Error::corrupted(format!(
                "string table flags 0x{other:02x} do not name exactly one compressor"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressorKind::None => "none",
            CompressorKind::Huffman => "huffman",
        }
    }
}

impl fmt::Display for CompressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressorKind::None),
            "huffman" => Ok(CompressorKind::Huffman),
            other => Err(Error::InvalidModel(format!(
                "unknown compressor '{other}' (expected none or huffman)"
            ))),
        }
    }
}

// ── Strategy trait ─────────────────────────────────────────────────────────

/// String compression strategy of an archive's string table.
///
/// An implementation:
/// - Is identified by a single flag bit stored in the string-table header.
/// - Sees the whole corpus once through `write_extra` before any string is
///   encoded, and may persist shared state there (e.g. a code table). The
///   reader hands those bytes back through `read_extra` before decoding.
/// - Encodes each string independently so any entry can be decoded by itself
///   given its decoded length.
pub trait Compressor: Send + Sync + fmt::Debug {
    fn kind(&self) -> CompressorKind;

    /// Flag bit stored in the string-table header.
    fn flag(&self) -> u8 {
        self.kind().flag()
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Persist shared metadata for `corpus`. Called once, before any `encode_string`.
    fn write_extra(&mut self, cursor: &mut Cursor<'_>, corpus: &[&str]) -> Result<()>;

    /// Restore the state persisted by `write_extra`.
    fn read_extra(&mut self, extra: &[u8]) -> Result<()>;

    /// Human-readable dump of an extra block.
    fn print_extra(&self, out: &mut dyn Write, extra: &[u8]) -> Result<()>;

    fn encode_string(&self, cursor: &mut Cursor<'_>, s: &str) -> Result<()>;

    /// Decode one string of `len` decoded bytes from `src`.
    fn decode_string(&self, src: &mut dyn Read, len: u32) -> Result<String>;

    /// Diagnostic form of one encoded string, as shown by the archive printer.
    fn print_encoded(&self, out: &mut dyn Write, src: &mut dyn Read, len: u32) -> Result<()> {
        let s = self.decode_string(src, len)?;
        write!(out, "[string: {s}]")?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Compressor>;
}

impl Clone for Box<dyn Compressor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Turn decoded bytes into a `String`, mapping bad UTF-8 to a decompression failure.
pub fn decoded_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| Error::DecompressionFailure(format!("decoded string is not UTF-8: {e}")))
}
