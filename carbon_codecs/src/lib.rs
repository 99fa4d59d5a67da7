mod huffman;
mod none;

pub use huffman::{Code, CodeTable, HuffmanCompressor};
pub use none::NoneCompressor;

use carbon_core::{Compressor, CompressorKind, Result};

/// Fresh, table-less compressor of the given kind.
pub fn compressor_by_kind(kind: CompressorKind) -> Box<dyn Compressor> {
    match kind {
        CompressorKind::None => Box::new(NoneCompressor),
        CompressorKind::Huffman => Box::new(HuffmanCompressor::new()),
    }
}

/// Resolve the compressor named by a string-table flags byte.
///
/// Called when an archive is opened, before the extra block is read back.
pub fn compressor_by_flags(flags: u8) -> Result<Box<dyn Compressor>> {
    CompressorKind::from_flags(flags).map(compressor_by_kind)
}

/// Resolve a compressor from its CLI name (`none`, `huffman`).
pub fn compressor_by_name(name: &str) -> Result<Box<dyn Compressor>> {
    name.parse::<CompressorKind>().map(compressor_by_kind)
}
