use std::borrow::Cow;

use crate::error::{Error, Result};

/// Growth factor applied whenever a write would overflow the current block.
pub const GROWTH_FACTOR: f64 = 1.7;

/// Whether a [`Cursor`] may modify its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Default, Clone, Copy)]
struct BitState {
    /// Next bit (0 = most significant) inside the byte at the cursor.
    bit: u8,
    bytes_completed: u64,
}

/// Positional byte/bit reader-writer over a growable memory block.
///
/// Every serialized part of an archive goes through a `Cursor`: the writer
/// lays out headers, reserves placeholder slots and patches them once the
/// final offsets are known; the printer walks the same bytes read-only.
///
/// In read-write mode the block grows on demand (`seek` past the end grows it
/// to `pos + 1`, `write`/`skip` grow it by [`GROWTH_FACTOR`]). In read-only mode
/// any access beyond the block fails with [`Error::OutOfBounds`] and any
/// mutation fails with [`Error::WriteProtected`].
///
/// # Bit mode
/// [`begin_bit_mode`](Self::begin_bit_mode) starts addressing single bits of
/// the byte under the cursor, most significant bit first. After eight bits
/// the cursor rolls to the next byte. [`end_bit_mode`](Self::end_bit_mode)
/// steps past the last partially used byte and reports how many bytes the
/// session touched. Sessions do not nest.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: Cow<'a, [u8]>,
    pos: u64,
    /// End of the furthest byte written or skipped; the extent kept by `into_inner`.
    high_water: u64,
    mode: AccessMode,
    bits: Option<BitState>,
}

impl Cursor<'static> {
    /// Empty read-write cursor.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Read-write cursor whose block is pre-sized to `capacity` zero bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Cow::Owned(vec![0u8; capacity]),
            pos: 0,
            high_water: 0,
            mode: AccessMode::ReadWrite,
            bits: None,
        }
    }

    /// Take ownership of an existing block.
    pub fn from_vec(data: Vec<u8>, mode: AccessMode) -> Self {
        let high_water = data.len() as u64;
        Self {
            buf: Cow::Owned(data),
            pos: 0,
            high_water,
            mode,
            bits: None,
        }
    }
}

impl Default for Cursor<'static> {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! le_accessors {
    ($($ty:ty => $read:ident, $peek:ident, $write:ident);* $(;)?) => {
        $(
            pub fn $read(&mut self) -> Result<$ty> {
                let bytes = self.read_array::<{ std::mem::size_of::<$ty>() }>()?;
                Ok(<$ty>::from_le_bytes(bytes))
            }

            pub fn $peek(&self) -> Result<$ty> {
                let bytes = self.peek(std::mem::size_of::<$ty>() as u64)?;
                let mut arr = [0u8; std::mem::size_of::<$ty>()];
                arr.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(arr))
            }

            pub fn $write(&mut self, value: $ty) -> Result<()> {
                self.write(&value.to_le_bytes())
            }
        )*
    };
}

impl<'a> Cursor<'a> {
    /// Read-only cursor over borrowed bytes.
    pub fn read_only(data: &'a [u8]) -> Self {
        Self {
            buf: Cow::Borrowed(data),
            pos: 0,
            high_water: data.len() as u64,
            mode: AccessMode::ReadOnly,
            bits: None,
        }
    }

    #[inline]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Current cursor position.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Size of the underlying block, including growth slack.
    #[inline]
    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes between the cursor and the end of the block.
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn in_bit_mode(&self) -> bool {
        self.bits.is_some()
    }

    /// The whole block as a slice (growth slack included).
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Move the cursor to `pos`.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        match self.mode {
            AccessMode::ReadWrite => {
                if pos >= self.len() {
                    self.grow_to(pos + 1);
                }
            }
            AccessMode::ReadOnly => {
                if pos > self.len() {
                    return Err(Error::OutOfBounds {
                        pos,
                        len: 0,
                        size: self.len(),
                    });
                }
            }
        }
        self.pos = pos;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// View `n` bytes at the cursor without moving it.
    pub fn peek(&self, n: u64) -> Result<&[u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.len());
        match end {
            Some(end) => Ok(&self.buf[self.pos as usize..end as usize]),
            None => Err(Error::OutOfBounds {
                pos: self.pos,
                len: n,
                size: self.len(),
            }),
        }
    }

    /// View `n` bytes at the cursor and advance past them.
    pub fn read(&mut self, n: u64) -> Result<&[u8]> {
        let start = self.pos;
        self.peek(n)?;
        self.pos += n;
        Ok(&self.buf[start as usize..(start + n) as usize])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N as u64)?);
        Ok(out)
    }

    /// Copy `data` to the cursor and advance past it.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let end = self.pos + data.len() as u64;
        self.reserve(end);
        self.buf.to_mut()[self.pos as usize..end as usize].copy_from_slice(data);
        self.pos = end;
        self.high_water = self.high_water.max(end);
        Ok(())
    }

    /// Overwrite bytes at `at` without moving the cursor.
    ///
    /// This is how placeholders reserved with [`skip`](Self::skip) are filled
    /// in once their values are known.
    pub fn patch(&mut self, at: u64, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let end = at + data.len() as u64;
        self.reserve(end);
        self.buf.to_mut()[at as usize..end as usize].copy_from_slice(data);
        self.high_water = self.high_water.max(end);
        Ok(())
    }

    /// Advance the cursor by `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let end = self.pos + n;
        match self.mode {
            AccessMode::ReadWrite => {
                self.reserve(end);
                self.high_water = self.high_water.max(end);
            }
            AccessMode::ReadOnly => {
                if end > self.len() {
                    return Err(Error::OutOfBounds {
                        pos: self.pos,
                        len: n,
                        size: self.len(),
                    });
                }
            }
        }
        self.pos = end;
        Ok(())
    }

    le_accessors! {
        u8 => read_u8, peek_u8, write_u8;
        u16 => read_u16, peek_u16, write_u16;
        u32 => read_u32, peek_u32, write_u32;
        u64 => read_u64, peek_u64, write_u64;
        i8 => read_i8, peek_i8, write_i8;
        i16 => read_i16, peek_i16, write_i16;
        i32 => read_i32, peek_i32, write_i32;
        i64 => read_i64, peek_i64, write_i64;
        f32 => read_f32, peek_f32, write_f32;
    }

    pub fn patch_u64(&mut self, at: u64, value: u64) -> Result<()> {
        self.patch(at, &value.to_le_bytes())
    }

    pub fn patch_u32(&mut self, at: u64, value: u32) -> Result<()> {
        self.patch(at, &value.to_le_bytes())
    }

    pub fn begin_bit_mode(&mut self) -> Result<()> {
        if self.bits.is_some() {
            return Err(Error::BitModeActive);
        }
        self.bits = Some(BitState::default());
        Ok(())
    }

    /// Set or clear the next bit of the pending byte.
    pub fn write_bit(&mut self, flag: bool) -> Result<()> {
        self.ensure_writable()?;
        let mut state = self.bits.ok_or(Error::NotInBitMode)?;
        if state.bit == 8 {
            self.pos += 1;
            state.bytes_completed += 1;
            state.bit = 0;
        }
        if state.bit == 0 {
            let at = self.pos;
            self.patch(at, &[0])?;
        }
        if flag {
            let pos = self.pos as usize;
            self.buf.to_mut()[pos] |= 0x80 >> state.bit;
        }
        state.bit += 1;
        self.bits = Some(state);
        Ok(())
    }

    /// Read the next bit of the current byte.
    pub fn read_bit(&mut self) -> Result<bool> {
        let mut state = self.bits.ok_or(Error::NotInBitMode)?;
        if state.bit == 8 {
            self.pos += 1;
            state.bytes_completed += 1;
            state.bit = 0;
        }
        let byte = self.peek(1)?[0];
        let value = byte & (0x80 >> state.bit) != 0;
        state.bit += 1;
        self.bits = Some(state);
        Ok(value)
    }

    /// Leave bit mode; returns the number of bytes the session touched.
    pub fn end_bit_mode(&mut self) -> Result<u64> {
        let mut state = self.bits.take().ok_or(Error::NotInBitMode)?;
        if state.bit > 0 {
            self.pos += 1;
            state.bytes_completed += 1;
        }
        Ok(state.bytes_completed)
    }

    /// Release the block, trimmed to the written extent in read-write mode.
    pub fn into_inner(self) -> Vec<u8> {
        let mut data = self.buf.into_owned();
        if self.mode == AccessMode::ReadWrite {
            data.truncate(self.high_water as usize);
        }
        data
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => Err(Error::WriteProtected),
        }
    }

    /// Make sure the block holds at least `required` bytes, growing geometrically.
    fn reserve(&mut self, required: u64) {
        if required > self.len() {
            let grown = ((required as f64) * GROWTH_FACTOR) as u64;
            self.grow_to(grown.max(required));
        }
    }

    fn grow_to(&mut self, size: u64) {
        self.buf.to_mut().resize(size as usize, 0);
    }
}
