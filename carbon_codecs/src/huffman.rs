use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

use carbon_core::compressor::{decoded_to_string, Compressor, CompressorKind};
use carbon_core::format::marker;
use carbon_core::{Cursor, Error, Result};

const ALPHABET: usize = 256;

// ── Code table ─────────────────────────────────────────────────────────────

/// Prefix code for one byte, most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub letter: u8,
    pub bits: Vec<bool>,
}

#[derive(Debug)]
enum Node {
    Leaf(u8),
    Internal(usize, usize),
}

/// One global Huffman code over the byte alphabet of a string corpus.
///
/// Only bytes that occur in the corpus get a code. The tree is built with a
/// min-heap keyed by `(frequency, sequence)`: leaves use their byte value as
/// sequence and merged nodes take increasing numbers above 255, so equal
/// frequencies always resolve the same way.
#[derive(Debug, Clone, Default)]
pub struct CodeTable {
    codes: Vec<Option<Vec<bool>>>,
}

impl CodeTable {
    pub fn build(corpus: &[&str]) -> Self {
        let mut freq = [0u64; ALPHABET];
        for s in corpus {
            for &b in s.as_bytes() {
                freq[b as usize] += 1;
            }
        }
        Self::from_frequencies(&freq)
    }

    pub fn from_frequencies(freq: &[u64; ALPHABET]) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        let mut heap = BinaryHeap::new();
        for (letter, &f) in freq.iter().enumerate() {
            if f > 0 {
                heap.push(Reverse((f, letter as u64, nodes.len())));
                nodes.push(Node::Leaf(letter as u8));
            }
        }

        let mut codes = vec![None; ALPHABET];
        let mut seq = ALPHABET as u64;
        while heap.len() > 1 {
            let (Some(Reverse((fa, _, a))), Some(Reverse((fb, _, b)))) = (heap.pop(), heap.pop())
            else {
                break;
            };
            heap.push(Reverse((fa + fb, seq, nodes.len())));
            nodes.push(Node::Internal(a, b));
            seq += 1;
        }

        if let Some(Reverse((_, _, root))) = heap.pop() {
            // Pre-order walk: left appends 0, right appends 1.
            let mut stack = vec![(root, Vec::new())];
            while let Some((idx, prefix)) = stack.pop() {
                match nodes[idx] {
                    Node::Leaf(letter) => {
                        // A lone symbol still needs one bit per occurrence.
                        let bits = if prefix.is_empty() { vec![false] } else { prefix };
                        codes[letter as usize] = Some(bits);
                    }
                    Node::Internal(left, right) => {
                        let mut r = prefix.clone();
                        r.push(true);
                        stack.push((right, r));
                        let mut l = prefix;
                        l.push(false);
                        stack.push((left, l));
                    }
                }
            }
        }
        Self { codes }
    }

    pub fn get(&self, letter: u8) -> Option<&[bool]> {
        self.codes.get(letter as usize)?.as_deref()
    }

    /// Coded letters in ascending byte order.
    pub fn iter(&self) -> impl Iterator<Item = Code> + '_ {
        self.codes.iter().enumerate().filter_map(|(letter, bits)| {
            bits.as_ref().map(|bits| Code {
                letter: letter as u8,
                bits: bits.clone(),
            })
        })
    }

    pub fn len(&self) -> usize {
        self.codes.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize as a run of `'d'` records.
    pub fn write(&self, cursor: &mut Cursor<'_>) -> Result<()> {
        for code in self.iter() {
            let code_len = u8::try_from(code.bits.len()).map_err(|_| {
                Error::CompressionFailure(format!(
                    "code for byte 0x{:02x} is {} bits long",
                    code.letter,
                    code.bits.len()
                ))
            })?;
            cursor.write_u8(marker::HUFFMAN_ENTRY)?;
            cursor.write_u8(code.letter)?;
            cursor.write_u8(code_len)?;
            cursor.begin_bit_mode()?;
            for &bit in &code.bits {
                cursor.write_bit(bit)?;
            }
            cursor.end_bit_mode()?;
        }
        Ok(())
    }

    pub fn read(extra: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::read_only(extra);
        let mut codes = vec![None; ALPHABET];
        while cursor.remaining() > 0 {
            let at = cursor.tell();
            let found = cursor.read_u8()?;
            if found != marker::HUFFMAN_ENTRY {
                return Err(Error::unexpected_marker(marker::HUFFMAN_ENTRY, found, at));
            }
            let letter = cursor.read_u8()?;
            let code_len = cursor.read_u8()?;
            if code_len == 0 {
                return Err(Error::corrupted(format!(
                    "empty huffman code for byte 0x{letter:02x}"
                )));
            }
            cursor.begin_bit_mode()?;
            let bits = (0..code_len)
                .map(|_| cursor.read_bit())
                .collect::<Result<Vec<_>>>()?;
            cursor.end_bit_mode()?;
            codes[letter as usize] = Some(bits);
        }
        Ok(Self { codes })
    }
}

// ── Decoding tree ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: [Option<usize>; 2],
    letter: Option<u8>,
}

#[derive(Debug, Clone)]
struct DecodeTree {
    nodes: Vec<TrieNode>,
}

impl Default for DecodeTree {
    fn default() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }
}

impl DecodeTree {
    fn new(table: &CodeTable) -> Result<Self> {
        let mut nodes = vec![TrieNode::default()];
        for code in table.iter() {
            let mut at = 0;
            for &bit in &code.bits {
                if nodes[at].letter.is_some() {
                    return Err(Error::corrupted("huffman table is not prefix-free"));
                }
                at = match nodes[at].children[bit as usize] {
                    Some(next) => next,
                    None => {
                        nodes.push(TrieNode::default());
                        let next = nodes.len() - 1;
                        nodes[at].children[bit as usize] = Some(next);
                        next
                    }
                };
            }
            if nodes[at].letter.is_some() || nodes[at].children.iter().any(Option::is_some) {
                return Err(Error::corrupted("huffman table is not prefix-free"));
            }
            nodes[at].letter = Some(code.letter);
        }
        Ok(Self { nodes })
    }

    fn decode(&self, packed: &[u8], len: u32) -> Result<Vec<u8>> {
        let mut cursor = Cursor::read_only(packed);
        let mut out = Vec::with_capacity(len as usize);
        if len == 0 {
            return Ok(out);
        }
        let truncated = |_: Error| Error::DecompressionFailure("huffman bit stream ended early".into());
        cursor.begin_bit_mode()?;
        for _ in 0..len {
            let mut at = 0;
            loop {
                let bit = cursor.read_bit().map_err(truncated)?;
                at = self.nodes[at].children[bit as usize].ok_or_else(|| {
                    Error::DecompressionFailure("bit sequence matches no huffman code".into())
                })?;
                if let Some(letter) = self.nodes[at].letter {
                    out.push(letter);
                    break;
                }
            }
        }
        cursor.end_bit_mode()?;
        Ok(out)
    }
}

// ── Compressor ─────────────────────────────────────────────────────────────

/// Corpus-wide Huffman coding of string bytes.
///
/// The code table is persisted as the string table's extra block. Each string
/// is stored as `num_bytes: u32` followed by its packed codes; the decoded
/// length in the entry header tells the decoder when to stop.
#[derive(Debug, Clone, Default)]
pub struct HuffmanCompressor {
    table: CodeTable,
    tree: DecodeTree,
}

impl HuffmanCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    fn set_table(&mut self, table: CodeTable) -> Result<()> {
        self.tree = DecodeTree::new(&table)?;
        self.table = table;
        Ok(())
    }
}

impl Compressor for HuffmanCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Huffman
    }

    fn write_extra(&mut self, cursor: &mut Cursor<'_>, corpus: &[&str]) -> Result<()> {
        let table = CodeTable::build(corpus);
        tracing::debug!(symbols = table.len(), strings = corpus.len(), "built huffman table");
        table.write(cursor)?;
        self.set_table(table)
    }

    fn read_extra(&mut self, extra: &[u8]) -> Result<()> {
        self.set_table(CodeTable::read(extra)?)
    }

    fn print_extra(&self, out: &mut dyn Write, extra: &[u8]) -> Result<()> {
        let table = CodeTable::read(extra)?;
        for code in table.iter() {
            let bits: String = code.bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
            writeln!(
                out,
                "       [marker: {}] [letter: 0x{:02x}] [nbits: {}] [code: {}]",
                marker::HUFFMAN_ENTRY as char,
                code.letter,
                code.bits.len(),
                bits
            )?;
        }
        Ok(())
    }

    fn encode_string(&self, cursor: &mut Cursor<'_>, s: &str) -> Result<()> {
        let mut bits = Vec::new();
        for &b in s.as_bytes() {
            let code = self.table.get(b).ok_or_else(|| {
                Error::CompressionFailure(format!("byte 0x{b:02x} has no huffman code"))
            })?;
            bits.extend_from_slice(code);
        }

        let len_slot = cursor.tell();
        cursor.skip(4)?;
        cursor.begin_bit_mode()?;
        for bit in bits {
            cursor.write_bit(bit)?;
        }
        let num_bytes = cursor.end_bit_mode()?;
        cursor.patch_u32(len_slot, num_bytes as u32)
    }

    fn decode_string(&self, src: &mut dyn Read, len: u32) -> Result<String> {
        let packed = read_packed(src)?;
        decoded_to_string(self.tree.decode(&packed, len)?)
    }

    fn print_encoded(&self, out: &mut dyn Write, src: &mut dyn Read, len: u32) -> Result<()> {
        let packed = read_packed(src)?;
        let s = decoded_to_string(self.tree.decode(&packed, len)?)?;
        write!(out, "[nbytes: {}] [string: {s}]", packed.len())?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Compressor> {
        Box::new(self.clone())
    }
}

/// Read one `num_bytes: u32` prefixed bit stream.
fn read_packed(src: &mut dyn Read) -> Result<Vec<u8>> {
    let mut raw = [0u8; 4];
    src.read_exact(&mut raw)
        .map_err(|e| Error::DecompressionFailure(format!("reading huffman length: {e}")))?;
    let mut packed = vec![0u8; u32::from_le_bytes(raw) as usize];
    src.read_exact(&mut packed)
        .map_err(|e| Error::DecompressionFailure(format!("reading huffman bits: {e}")))?;
    Ok(packed)
}
