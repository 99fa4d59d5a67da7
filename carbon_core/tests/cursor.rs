/// Cursor behaviour: growth, bounds, access modes and bit mode.
use carbon_core::cursor::GROWTH_FACTOR;
use carbon_core::{AccessMode, Cursor, Error};

// ── byte mode ──────────────────────────────────────────────────────────────

#[test]
fn test_write_then_read_typed_values() {
    let mut c = Cursor::new();
    c.write_u8(b'{').unwrap();
    c.write_u32(0xDEAD_BEEF).unwrap();
    c.write_u64(42).unwrap();
    c.write_i16(-7).unwrap();
    c.write_f32(1.5).unwrap();
    assert_eq!(c.tell(), 1 + 4 + 8 + 2 + 4);

    c.seek(0).unwrap();
    assert_eq!(c.read_u8().unwrap(), b'{');
    assert_eq!(c.read_u32().unwrap(), 0xDEAD_BEEF);
    assert_eq!(c.read_u64().unwrap(), 42);
    assert_eq!(c.read_i16().unwrap(), -7);
    assert_eq!(c.read_f32().unwrap(), 1.5);
}

#[test]
fn test_write_grows_by_factor() {
    let mut c = Cursor::with_capacity(10);
    c.write(&[1u8; 10]).unwrap();
    assert_eq!(c.len(), 10, "exact fit must not grow");
    c.write(&[2u8; 10]).unwrap();
    assert_eq!(c.len(), (20.0 * GROWTH_FACTOR) as u64);
    assert_eq!(c.into_inner().len(), 20, "into_inner trims growth slack");
}

#[test]
fn test_seek_past_end_read_write_grows() {
    let mut c = Cursor::new();
    c.seek(99).unwrap();
    assert_eq!(c.len(), 100);
    assert_eq!(c.tell(), 99);
}

#[test]
fn test_seek_past_end_read_only_fails() {
    let data = [0u8; 8];
    let mut c = Cursor::read_only(&data);
    c.seek(8).unwrap();
    assert!(matches!(c.seek(9), Err(Error::OutOfBounds { pos: 9, .. })));
}

#[test]
fn test_read_past_end_fails() {
    let data = [1u8, 2, 3];
    let mut c = Cursor::read_only(&data);
    assert_eq!(c.read(2).unwrap(), &[1, 2]);
    let err = c.read(2).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { pos: 2, len: 2, size: 3 }));
    // A failed read leaves the cursor where it was.
    assert_eq!(c.tell(), 2);
}

#[test]
fn test_peek_does_not_advance() {
    let data = 7u32.to_le_bytes();
    let c = Cursor::read_only(&data);
    assert_eq!(c.peek_u32().unwrap(), 7);
    assert_eq!(c.tell(), 0);
}

#[test]
fn test_read_only_rejects_writes() {
    let data = [0u8; 4];
    let mut c = Cursor::read_only(&data);
    assert_eq!(c.mode(), AccessMode::ReadOnly);
    assert!(matches!(c.write(&[1]), Err(Error::WriteProtected)));
    assert!(matches!(c.patch(0, &[1]), Err(Error::WriteProtected)));
}

#[test]
fn test_skip_reserves_and_patch_fills() {
    let mut c = Cursor::new();
    let slot = c.tell();
    c.skip(8).unwrap();
    c.write_u8(0xAA).unwrap();
    c.patch_u64(slot, 0x0102_0304).unwrap();
    assert_eq!(c.tell(), 9, "patch must not move the cursor");

    let bytes = c.into_inner();
    assert_eq!(bytes.len(), 9);
    assert_eq!(u64::from_le_bytes(bytes[..8].try_into().unwrap()), 0x0102_0304);
    assert_eq!(bytes[8], 0xAA);
}

#[test]
fn test_skip_past_end_read_only_fails() {
    let data = [0u8; 4];
    let mut c = Cursor::read_only(&data);
    c.skip(4).unwrap();
    assert!(matches!(c.skip(1), Err(Error::OutOfBounds { .. })));
}

// ── bit mode ───────────────────────────────────────────────────────────────

#[test]
fn test_bits_are_msb_first() {
    let mut c = Cursor::new();
    c.begin_bit_mode().unwrap();
    for bit in [true, false, true] {
        c.write_bit(bit).unwrap();
    }
    assert_eq!(c.end_bit_mode().unwrap(), 1);
    assert_eq!(c.into_inner(), vec![0b1010_0000]);
}

#[test]
fn test_bits_roll_over_after_eight() {
    let mut c = Cursor::new();
    c.write_u8(0xFF).unwrap();
    c.begin_bit_mode().unwrap();
    for i in 0..10 {
        c.write_bit(i % 2 == 0).unwrap();
    }
    assert_eq!(c.end_bit_mode().unwrap(), 2);
    assert_eq!(c.tell(), 3);
    c.write_u8(0x11).unwrap();

    let bytes = c.into_inner();
    assert_eq!(bytes, vec![0xFF, 0b1010_1010, 0b1000_0000, 0x11]);

    let mut r = Cursor::read_only(&bytes);
    r.skip(1).unwrap();
    r.begin_bit_mode().unwrap();
    let bits: Vec<bool> = (0..10).map(|_| r.read_bit().unwrap()).collect();
    assert_eq!(bits, (0..10).map(|i| i % 2 == 0).collect::<Vec<_>>());
    assert_eq!(r.end_bit_mode().unwrap(), 2);
    assert_eq!(r.read_u8().unwrap(), 0x11);
}

#[test]
fn test_exact_byte_of_bits_counts_one() {
    let mut c = Cursor::new();
    c.begin_bit_mode().unwrap();
    for _ in 0..8 {
        c.write_bit(true).unwrap();
    }
    assert_eq!(c.end_bit_mode().unwrap(), 1);
    assert_eq!(c.tell(), 1);
}

#[test]
fn test_bit_ops_outside_bit_mode_fail() {
    let mut c = Cursor::new();
    assert!(matches!(c.write_bit(true), Err(Error::NotInBitMode)));
    assert!(matches!(c.read_bit(), Err(Error::NotInBitMode)));
    assert!(matches!(c.end_bit_mode(), Err(Error::NotInBitMode)));
}

#[test]
fn test_nested_bit_mode_rejected() {
    let mut c = Cursor::new();
    c.begin_bit_mode().unwrap();
    assert!(matches!(c.begin_bit_mode(), Err(Error::BitModeActive)));
    assert!(c.in_bit_mode());
    c.end_bit_mode().unwrap();
    c.begin_bit_mode().unwrap();
}
