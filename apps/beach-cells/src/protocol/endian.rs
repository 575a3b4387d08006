//! Fixed-width integer helpers over raw frame bodies.
//!
//! Widths 1, 2 and 4 go through the native `from_*_bytes` constructors. The
//! 24-bit width used for cell indices has no native type, so it is assembled
//! and split byte by byte.

use super::wire::{ProtocolError, RangeError};
use super::MAX_CELL_INDEX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

fn window<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], ProtocolError> {
    offset
        .checked_add(N)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(ProtocolError::OutOfBounds {
            offset,
            width: N,
            len: bytes.len(),
        })
}

pub fn read_u24(bytes: &[u8], offset: usize, endian: Endian) -> Result<u32, ProtocolError> {
    let [a, b, c] = window::<3>(bytes, offset)?;
    let value = match endian {
        Endian::Little => (a as u32) | ((b as u32) << 8) | ((c as u32) << 16),
        Endian::Big => ((a as u32) << 16) | ((b as u32) << 8) | (c as u32),
    };
    Ok(value)
}

/// Appends `value` as three bytes. Rejects anything above `0xFF_FFFF`.
pub fn write_u24(out: &mut Vec<u8>, value: u32, endian: Endian) -> Result<(), RangeError> {
    if value as usize > MAX_CELL_INDEX {
        return Err(RangeError {
            index: value as usize,
        });
    }
    let low = (value & 0xFF) as u8;
    let mid = ((value >> 8) & 0xFF) as u8;
    let high = ((value >> 16) & 0xFF) as u8;
    match endian {
        Endian::Little => out.extend_from_slice(&[low, mid, high]),
        Endian::Big => out.extend_from_slice(&[high, mid, low]),
    }
    Ok(())
}

/// Reads an unsigned integer of `width` bytes (1, 2, 3 or 4).
pub fn read_uint(
    bytes: &[u8],
    offset: usize,
    width: usize,
    endian: Endian,
) -> Result<u32, ProtocolError> {
    match (width, endian) {
        (1, _) => Ok(window::<1>(bytes, offset)?[0] as u32),
        (2, Endian::Little) => Ok(u16::from_le_bytes(window(bytes, offset)?) as u32),
        (2, Endian::Big) => Ok(u16::from_be_bytes(window(bytes, offset)?) as u32),
        (3, _) => read_u24(bytes, offset, endian),
        (4, Endian::Little) => Ok(u32::from_le_bytes(window(bytes, offset)?)),
        (4, Endian::Big) => Ok(u32::from_be_bytes(window(bytes, offset)?)),
        (other, _) => Err(ProtocolError::UnsupportedWidth(other)),
    }
}

/// Signed counterpart of [`read_uint`]; the 24-bit width is sign extended.
pub fn read_int(
    bytes: &[u8],
    offset: usize,
    width: usize,
    endian: Endian,
) -> Result<i32, ProtocolError> {
    match (width, endian) {
        (1, _) => Ok(window::<1>(bytes, offset)?[0] as i8 as i32),
        (2, Endian::Little) => Ok(i16::from_le_bytes(window(bytes, offset)?) as i32),
        (2, Endian::Big) => Ok(i16::from_be_bytes(window(bytes, offset)?) as i32),
        (3, _) => {
            let raw = read_u24(bytes, offset, endian)?;
            Ok(((raw << 8) as i32) >> 8)
        }
        (4, Endian::Little) => Ok(i32::from_le_bytes(window(bytes, offset)?)),
        (4, Endian::Big) => Ok(i32::from_be_bytes(window(bytes, offset)?)),
        (other, _) => Err(ProtocolError::UnsupportedWidth(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u24_little_and_big_endian() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(read_u24(&bytes, 0, Endian::Little).unwrap(), 0x03_0201);
        assert_eq!(read_u24(&bytes, 1, Endian::Big).unwrap(), 0x02_0304);

        let mut out = Vec::new();
        write_u24(&mut out, 0xAB_CDEF, Endian::Little).unwrap();
        write_u24(&mut out, 0xAB_CDEF, Endian::Big).unwrap();
        assert_eq!(out, vec![0xEF, 0xCD, 0xAB, 0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn u24_write_rejects_wide_values() {
        let mut out = Vec::new();
        assert_eq!(
            write_u24(&mut out, 0x100_0000, Endian::Little),
            Err(RangeError { index: 0x100_0000 })
        );
        assert!(out.is_empty());
    }

    #[test]
    fn native_widths_match_std() {
        let bytes = [0xFE, 0xFF, 0xFF, 0x7F, 0x00];
        assert_eq!(read_uint(&bytes, 0, 1, Endian::Little).unwrap(), 0xFE);
        assert_eq!(read_int(&bytes, 0, 1, Endian::Little).unwrap(), -2);
        assert_eq!(read_uint(&bytes, 0, 2, Endian::Little).unwrap(), 0xFFFE);
        assert_eq!(read_int(&bytes, 0, 2, Endian::Little).unwrap(), -2);
        assert_eq!(read_uint(&bytes, 0, 2, Endian::Big).unwrap(), 0xFEFF);
        assert_eq!(read_uint(&bytes, 0, 4, Endian::Little).unwrap(), 0x7FFF_FFFE);
        assert_eq!(read_int(&bytes, 1, 4, Endian::Big).unwrap(), -33024);
    }

    #[test]
    fn signed_u24_is_sign_extended() {
        assert_eq!(read_int(&[0xFF, 0xFF, 0xFF], 0, 3, Endian::Little).unwrap(), -1);
        assert_eq!(read_int(&[0xFF, 0xFF, 0x7F], 0, 3, Endian::Little).unwrap(), 0x7F_FFFF);
    }

    #[test]
    fn short_buffers_and_odd_widths_fail() {
        assert_eq!(
            read_u24(&[0x01, 0x02], 0, Endian::Little),
            Err(ProtocolError::OutOfBounds {
                offset: 0,
                width: 3,
                len: 2
            })
        );
        assert!(read_uint(&[0u8; 8], usize::MAX, 2, Endian::Little).is_err());
        assert_eq!(
            read_uint(&[0u8; 8], 0, 5, Endian::Little),
            Err(ProtocolError::UnsupportedWidth(5))
        );
    }
}
