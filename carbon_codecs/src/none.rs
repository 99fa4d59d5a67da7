use std::io::{Read, Write};

use carbon_core::compressor::{decoded_to_string, Compressor, CompressorKind};
use carbon_core::{Cursor, Error, Result};

/// Stores strings verbatim.
///
/// Useful when the corpus is small or already high-entropy, and as the
/// reference against which the Huffman strategy is checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::None
    }

    fn write_extra(&mut self, _cursor: &mut Cursor<'_>, _corpus: &[&str]) -> Result<()> {
        Ok(())
    }

    fn read_extra(&mut self, _extra: &[u8]) -> Result<()> {
        Ok(())
    }

    fn print_extra(&self, _out: &mut dyn Write, _extra: &[u8]) -> Result<()> {
        Ok(())
    }

    fn encode_string(&self, cursor: &mut Cursor<'_>, s: &str) -> Result<()> {
        cursor.write(s.as_bytes())
    }

    fn decode_string(&self, src: &mut dyn Read, len: u32) -> Result<String> {
        let mut buf = vec![0u8; len as usize];
        src.read_exact(&mut buf).map_err(|e| {
            Error::DecompressionFailure(format!("reading {len} raw string bytes: {e}"))
        })?;
        decoded_to_string(buf)
    }

    fn clone_box(&self) -> Box<dyn Compressor> {
        Box::new(*self)
    }
}
