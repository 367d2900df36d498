//! Higher-level binary helpers: length-prefixed vectors, names, type encodings and constant
//! expressions.

use super::{cursor::Cursor, leb128, BinaryReadError, Result};
use crate::model::{
    ConstExpr, FuncType, GlobalType, Limits, MemoryType, TableType, ValType,
};
use crate::vm::instructions::op;

/// Read a length-prefixed vector of raw bytes (u32 length via ULEB128).
pub fn read_len_prefixed_bytes(cur: &mut Cursor) -> Result<Vec<u8>> {
    let len = leb128::read_uleb_u32(cur)? as usize;
    let bytes = cur.read_bytes(len)?.to_vec();
    Ok(bytes)
}

/// Read a UTF-8 name (length-prefixed bytes).
pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let start = cur.offset();
    let bytes = read_len_prefixed_bytes(cur)?;
    String::from_utf8(bytes).map_err(|_| BinaryReadError::InvalidUtf8 { offset: start })
}

/// Read a vector of T using the provided element reader closure.
/// Length is encoded as ULEB128 u32.
pub fn read_vec<T, F>(cur: &mut Cursor, mut elem: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor) -> Result<T>,
{
    let len = leb128::read_uleb_u32(cur)? as usize;
    // Every element occupies at least one byte, so a count beyond the remaining input is bogus.
    if len > cur.remaining() {
        return Err(BinaryReadError::UnexpectedEof { offset: cur.offset() });
    }
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}

pub fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    let offset = cur.offset();
    let b = cur.read_u8()?;
    ValType::from_byte(b).ok_or(BinaryReadError::Malformed {
        offset,
        msg: "invalid value type",
    })
}

pub fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let offset = cur.offset();
    match cur.read_u8()? {
        0x00 => Ok(Limits::new(leb128::read_uleb_u32(cur)?, None)),
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(BinaryReadError::Malformed {
                    offset,
                    msg: "limits max below min",
                });
            }
            Ok(Limits::new(min, Some(max)))
        }
        _ => Err(BinaryReadError::Malformed {
            offset,
            msg: "invalid limits flag",
        }),
    }
}

pub fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let offset = cur.offset();
    if cur.read_u8()? != 0x60 {
        return Err(BinaryReadError::Malformed {
            offset,
            msg: "expected function type form 0x60",
        });
    }
    let params = read_vec(cur, read_val_type)?;
    let results = read_vec(cur, read_val_type)?;
    Ok(FuncType { params, results })
}

pub fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let offset = cur.offset();
    if cur.read_u8()? != 0x70 {
        return Err(BinaryReadError::Malformed {
            offset,
            msg: "table element type must be funcref",
        });
    }
    Ok(TableType {
        limits: read_limits(cur)?,
    })
}

pub fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    Ok(MemoryType {
        limits: read_limits(cur)?,
    })
}

pub fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let offset = cur.offset();
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(BinaryReadError::Malformed {
                offset,
                msg: "invalid global mutability",
            })
        }
    };
    Ok(GlobalType { val_type, mutable })
}

/// Read a constant initializer: exactly one constant instruction followed by `end`.
pub fn read_const_expr(cur: &mut Cursor) -> Result<ConstExpr> {
    let offset = cur.offset();
    let expr = match cur.read_u8()? {
        op::I32_CONST => ConstExpr::I32(leb128::read_sleb_i32(cur)?),
        op::I64_CONST => ConstExpr::I64(leb128::read_sleb_i64(cur)?),
        op::F32_CONST => ConstExpr::F32(cur.read_f32_bits()?),
        op::F64_CONST => ConstExpr::F64(cur.read_f64_bits()?),
        op::GLOBAL_GET => ConstExpr::GlobalGet(leb128::read_uleb_u32(cur)?),
        _ => {
            return Err(BinaryReadError::Malformed {
                offset,
                msg: "unsupported instruction in constant expression",
            })
        }
    };
    let end_offset = cur.offset();
    if cur.read_u8()? != op::END {
        return Err(BinaryReadError::Malformed {
            offset: end_offset,
            msg: "constant expression must end after one instruction",
        });
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_name_ok() {
        let data = [0x03, b'f', b'o', b'o'];
        let mut c = Cursor::new(&data);
        assert_eq!(read_name(&mut c).unwrap(), "foo");
    }

    #[test]
    fn read_name_rejects_bad_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut c = Cursor::new(&data);
        assert_eq!(
            read_name(&mut c),
            Err(BinaryReadError::InvalidUtf8 { offset: 0 })
        );
    }

    #[test]
    fn read_vec_of_bytes() {
        let data = [0x02, 0xAA, 0xBB];
        let mut c = Cursor::new(&data);
        let v = read_vec(&mut c, |c| c.read_u8()).unwrap();
        assert_eq!(v, vec![0xAA, 0xBB]);
    }

    #[test]
    fn read_vec_rejects_absurd_count() {
        let data = [0xFF, 0xFF, 0x03, 0x01];
        let mut c = Cursor::new(&data);
        assert!(read_vec(&mut c, |c| c.read_u8()).is_err());
    }

    #[test]
    fn func_type_and_limits() {
        let data = [0x60, 0x02, 0x7F, 0x7E, 0x01, 0x7C];
        let mut c = Cursor::new(&data);
        let ty = read_func_type(&mut c).unwrap();
        assert_eq!(ty, FuncType::new(&[ValType::I32, ValType::I64], &[ValType::F64]));

        let mut c = Cursor::new(&[0x01, 0x01, 0x02]);
        assert_eq!(read_limits(&mut c).unwrap(), Limits::new(1, Some(2)));
    }

    #[test]
    fn const_exprs() {
        let mut c = Cursor::new(&[0x41, 0x2A, 0x0B]);
        assert_eq!(read_const_expr(&mut c).unwrap(), ConstExpr::I32(42));

        let mut c = Cursor::new(&[0x23, 0x01, 0x0B]);
        assert_eq!(read_const_expr(&mut c).unwrap(), ConstExpr::GlobalGet(1));

        // i32.const 1; i32.const 2; end
        let mut c = Cursor::new(&[0x41, 0x01, 0x41, 0x02, 0x0B]);
        assert!(read_const_expr(&mut c).is_err());
    }
}
