//! ULEB128/SLEB128 decoding specialized for the 32- and 64-bit integer widths of the format.

use super::{cursor::Cursor, BinaryReadError, Result};

/// Decode an unsigned LEB128 as u32 (max 5 bytes).
pub fn read_uleb_u32(cur: &mut Cursor) -> Result<u32> {
    read_uleb_generic(cur, 32).map(|v| v as u32)
}

/// Decode an unsigned LEB128 as u64 (max 10 bytes).
pub fn read_uleb_u64(cur: &mut Cursor) -> Result<u64> {
    read_uleb_generic(cur, 64)
}

/// Decode a signed LEB128 as i32 (max 5 bytes).
pub fn read_sleb_i32(cur: &mut Cursor) -> Result<i32> {
    read_sleb_generic(cur, 32).map(|v| v as i32)
}

/// Decode a signed LEB128 as i64 (max 10 bytes).
pub fn read_sleb_i64(cur: &mut Cursor) -> Result<i64> {
    read_sleb_generic(cur, 64)
}

#[inline]
fn max_bytes(bits: u8) -> u8 {
    (bits + 6) / 7
}

fn read_uleb_generic(cur: &mut Cursor, bits: u8) -> Result<u64> {
    let limit = max_bytes(bits);
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for i in 0..limit {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as u64;
        let last = i + 1 == limit;

        if last {
            if byte & 0x80 != 0 {
                return Err(BinaryReadError::Leb128TooManyBytes {
                    limit,
                    offset: cur.offset(),
                });
            }
            // Only `bits - shift` payload bits are meaningful in the final group.
            let spare = bits as u32 - shift;
            if spare < 7 && (low >> spare) != 0 {
                return Err(BinaryReadError::Leb128Overflow {
                    target_bits: bits,
                    offset: cur.offset(),
                });
            }
        }

        result |= low << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }

    Err(BinaryReadError::Leb128TooManyBytes {
        limit,
        offset: cur.offset(),
    })
}

fn read_sleb_generic(cur: &mut Cursor, bits: u8) -> Result<i64> {
    let limit = max_bytes(bits);
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    for i in 0..limit {
        let byte = cur.read_u8()?;
        let low = (byte & 0x7F) as i64;
        result |= low << shift;
        shift += 7;

        if byte & 0x80 != 0 {
            if i + 1 == limit {
                return Err(BinaryReadError::Leb128TooManyBytes {
                    limit,
                    offset: cur.offset(),
                });
            }
            continue;
        }

        // Sign-extend from the final 7-bit group.
        if shift < 64 && (byte & 0x40) != 0 {
            result |= !0i64 << shift;
        }

        let fits = if bits == 64 {
            // Tenth byte carries a single payload bit; the rest must mirror it.
            i + 1 < limit || byte == 0x00 || byte == 0x7F
        } else {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            (min..=max).contains(&result)
        };
        if !fits {
            return Err(BinaryReadError::Leb128Overflow {
                target_bits: bits,
                offset: cur.offset(),
            });
        }
        return Ok(result);
    }

    Err(BinaryReadError::Leb128TooManyBytes {
        limit,
        offset: cur.offset(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::cursor::Cursor;

    #[test]
    fn uleb32_basic() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]); // 624485
        assert_eq!(read_uleb_u32(&mut c).unwrap(), 624485);
        assert!(c.is_eof());
    }

    #[test]
    fn uleb32_max_and_overflow() {
        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(read_uleb_u32(&mut c).unwrap(), u32::MAX);

        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(matches!(
            read_uleb_u32(&mut c),
            Err(BinaryReadError::Leb128Overflow { target_bits: 32, .. })
        ));

        let bytes = [0xFFu8; 6];
        let mut c = Cursor::new(&bytes);
        assert!(matches!(
            read_uleb_u32(&mut c),
            Err(BinaryReadError::Leb128TooManyBytes { limit: 5, .. })
        ));
    }

    #[test]
    fn uleb_truncated_input() {
        let mut c = Cursor::new(&[0x80, 0x80]);
        assert!(matches!(
            read_uleb_u64(&mut c),
            Err(BinaryReadError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn sleb32_basic() {
        // -624485 encoded as SLEB128: 9b f1 59
        let mut c = Cursor::new(&[0x9b, 0xf1, 0x59]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -624485);

        let mut c = Cursor::new(&[0x7F]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), -1);
    }

    #[test]
    fn sleb32_extremes() {
        let mut c = Cursor::new(&[0x80, 0x80, 0x80, 0x80, 0x78]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), i32::MIN);

        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(read_sleb_i32(&mut c).unwrap(), i32::MAX);

        // 2^31 does not fit in i32.
        let mut c = Cursor::new(&[0x80, 0x80, 0x80, 0x80, 0x08]);
        assert!(matches!(
            read_sleb_i32(&mut c),
            Err(BinaryReadError::Leb128Overflow { .. })
        ));
    }

    #[test]
    fn sleb64_extremes() {
        let mut bytes = vec![0x80u8; 9];
        bytes.push(0x7F);
        let mut c = Cursor::new(&bytes);
        assert_eq!(read_sleb_i64(&mut c).unwrap(), i64::MIN);

        let mut bytes = vec![0xFFu8; 9];
        bytes.push(0x00);
        let mut c = Cursor::new(&bytes);
        assert_eq!(read_sleb_i64(&mut c).unwrap(), i64::MAX);

        let mut bytes = vec![0x80u8; 9];
        bytes.push(0x01);
        let mut c = Cursor::new(&bytes);
        assert!(read_sleb_i64(&mut c).is_err());
    }
}
