//! Low-level readers shared by the metric formats: the version/record-size
//! header, length-prefixed strings, and the 7-bit variable-length prefix.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

/// Width of the record-size field that follows the version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSizeWidth {
    /// version byte only (index and control metrics)
    Absent,
    OneByte,
    TwoBytes,
}

/// The first bytes of every InterOp file.
///
/// The record size is informational only; records are never delimited by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub version: u8,
    pub record_size: u16,
}

/// Reads the version byte, then the record-size field if the format has one
pub fn read_header<R: Read>(rdr: &mut R, width: RecordSizeWidth) -> std::io::Result<FileHeader> {
    let version = rdr.read_u8()?;
    let record_size = match width {
        RecordSizeWidth::Absent => 0,
        RecordSizeWidth::OneByte => rdr.read_u8()? as u16,
        RecordSizeWidth::TwoBytes => rdr.read_u16::<LittleEndian>()?,
    };

    Ok(FileHeader {
        version,
        record_size,
    })
}

/// Reads `u16` length followed by that many bytes, lossily converted to UTF-8
pub fn read_prefixed_string<R: Read>(rdr: &mut R) -> std::io::Result<String> {
    let len = rdr.read_u16::<LittleEndian>()? as usize;
    let mut buffer = vec![0u8; len];
    rdr.read_exact(&mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Decodes a variable-length unsigned prefix.
///
/// Each byte contributes its low 7 bits, least significant chunk first; a set
/// high bit means another byte follows.
pub fn read_var_length<R: Read>(rdr: &mut R) -> std::io::Result<usize> {
    let bits = usize::max_value().count_ones();
    let mut total = 0usize;
    let mut shift = 0u32;

    loop {
        let b = rdr.read_u8()?;
        let chunk = (b & 0x7F) as usize;
        // bits shifted past the top of a usize would be lost
        if shift >= bits || (shift > 0 && chunk >> (bits - shift) != 0) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "variable-length prefix overflows usize",
            ));
        }
        total |= chunk << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok(total)
}

/// A string preceded by a variable-length byte count
pub fn read_var_string<R: Read>(rdr: &mut R) -> std::io::Result<String> {
    let len = read_var_length(rdr)?;
    let mut buffer = vec![0u8; len];
    rdr.read_exact(&mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Reads `n` little-endian `u16` values
pub(crate) fn read_u16_vec<R: Read>(rdr: &mut R, n: usize) -> std::io::Result<Vec<u16>> {
    let mut buffer = vec![0u16; n];
    rdr.read_u16_into::<LittleEndian>(&mut buffer)?;
    Ok(buffer)
}

/// Reads `n` little-endian `u32` values
pub(crate) fn read_u32_vec<R: Read>(rdr: &mut R, n: usize) -> std::io::Result<Vec<u32>> {
    let mut buffer = vec![0u32; n];
    rdr.read_u32_into::<LittleEndian>(&mut buffer)?;
    Ok(buffer)
}

/// Reads `n` little-endian `f32` values
pub(crate) fn read_f32_vec<R: Read>(rdr: &mut R, n: usize) -> std::io::Result<Vec<f32>> {
    let mut buffer = vec![0f32; n];
    rdr.read_f32_into::<LittleEndian>(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    #[test]
    fn header_widths() {
        let data = vec![3u8, 30, 0];

        let h = read_header(&mut Cursor::new(&data), RecordSizeWidth::Absent).unwrap();
        assert_eq!(h, FileHeader { version: 3, record_size: 0 });

        let h = read_header(&mut Cursor::new(&data), RecordSizeWidth::OneByte).unwrap();
        assert_eq!(h, FileHeader { version: 3, record_size: 30 });

        let h = read_header(&mut Cursor::new(&data), RecordSizeWidth::TwoBytes).unwrap();
        assert_eq!(h, FileHeader { version: 3, record_size: 30 });
    }

    #[test]
    #[should_panic(expected = r#"failed to fill whole buffer"#)]
    fn empty_header() {
        read_header(&mut Cursor::new(Vec::new()), RecordSizeWidth::OneByte).unwrap();
    }

    #[test]
    fn prefixed_string() {
        let mut data = Vec::new();
        data.write_u16::<LittleEndian>(6).unwrap();
        data.extend_from_slice(b"ACGTAC");
        data.write_u16::<LittleEndian>(0).unwrap();

        let mut rdr = Cursor::new(data);
        assert_eq!(read_prefixed_string(&mut rdr).unwrap(), "ACGTAC");
        assert_eq!(read_prefixed_string(&mut rdr).unwrap(), "");
    }

    #[test]
    fn var_length() {
        assert_eq!(read_var_length(&mut Cursor::new(vec![0x05])).unwrap(), 5);
        assert_eq!(read_var_length(&mut Cursor::new(vec![0x7F])).unwrap(), 127);
        // 300 = 0b10_0101100 -> 0xAC 0x02
        assert_eq!(read_var_length(&mut Cursor::new(vec![0xAC, 0x02])).unwrap(), 300);
        assert_eq!(
            read_var_length(&mut Cursor::new(vec![0x80, 0x80, 0x01])).unwrap(),
            1 << 14
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn var_length_overflow() {
        let mut top_bit = vec![0x80; 9];
        top_bit.push(0x01);
        assert_eq!(read_var_length(&mut Cursor::new(top_bit)).unwrap(), 1 << 63);

        let mut wide = vec![0x80; 9];
        wide.push(0x7F);
        let err = read_var_length(&mut Cursor::new(wide)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        let too_long = vec![0x80; 11];
        let err = read_var_length(&mut Cursor::new(too_long)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn var_string() {
        let mut data = vec![0x03];
        data.extend_from_slice(b"rs1");
        assert_eq!(read_var_string(&mut Cursor::new(data)).unwrap(), "rs1");
    }

    #[test]
    #[should_panic(expected = r#"failed to fill whole buffer"#)]
    fn var_length_unterminated() {
        read_var_length(&mut Cursor::new(vec![0x80, 0x80])).unwrap();
    }
}
