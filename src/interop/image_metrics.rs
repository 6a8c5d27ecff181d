//! Image metrics (`ImageMetricsOut.bin`): per-channel contrast bounds.
//!
//! Version 1 stores one record per channel with the channel id inline.
//! Version 2 stores the channel count once after the header and then one
//! record per (lane, tile, cycle) holding every channel.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{read_u16_vec, FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;
use crate::geometry::Ltc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelContrast {
    /// 0: A, 1: C, 2: G, 3: T
    pub channel: u16,
    pub min: u16,
    pub max: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub ltc: Ltc,
    pub channels: Vec<ChannelContrast>,
}

ltc_key!(ImageRecord);

#[derive(Debug, Clone, Copy)]
pub struct ImageMetrics;

impl MetricFormat for ImageMetrics {
    type Record = ImageRecord;
    /// channel count (version 2 only)
    type Layout = u8;

    const NAME: &'static str = "image metrics";
    const VERSIONS: &'static [u8] = &[1, 2];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(header: &FileHeader, rdr: &mut R) -> Result<u8> {
        if header.version == 1 {
            return Ok(1);
        }
        Ok(rdr.read_u8()?)
    }

    fn read_record<R: Read>(
        header: &FileHeader,
        &channels: &u8,
        rdr: &mut R,
    ) -> std::io::Result<ImageRecord> {
        let ltc = Ltc::read(rdr)?;

        if header.version == 1 {
            let channel = rdr.read_u16::<LittleEndian>()?;
            let min = rdr.read_u16::<LittleEndian>()?;
            let max = rdr.read_u16::<LittleEndian>()?;
            return Ok(ImageRecord {
                ltc,
                channels: vec![ChannelContrast { channel, min, max }],
            });
        }

        let mins = read_u16_vec(rdr, channels as usize)?;
        let maxs = read_u16_vec(rdr, channels as usize)?;
        let channels = mins
            .into_iter()
            .zip(maxs)
            .enumerate()
            .map(|(i, (min, max))| ChannelContrast {
                channel: i as u16,
                min,
                max,
            })
            .collect();

        Ok(ImageRecord { ltc, channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MetricsFile;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn write_u16s(data: &mut Vec<u8>, values: &[u16]) {
        for &v in values {
            data.write_u16::<LittleEndian>(v).unwrap();
        }
    }

    #[test]
    fn version_1() {
        let mut data = vec![1u8, 12];
        write_u16s(&mut data, &[1, 1101, 4, 2, 150, 900]);
        write_u16s(&mut data, &[1, 1101, 4, 3, 160, 950]);

        let file = MetricsFile::<ImageMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.len(), 2);
        assert_eq!(file.records[0].ltc, Ltc::new(1, 1101, 4));
        assert_eq!(
            file.records[1].channels,
            vec![ChannelContrast {
                channel: 3,
                min: 160,
                max: 950
            }]
        );
    }

    #[test]
    fn version_2() {
        let mut data = vec![2u8, 22, 2];
        write_u16s(&mut data, &[2, 2104, 9, 10, 20, 300, 400]);

        let file = MetricsFile::<ImageMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.layout, 2);

        let r = &file.records[0];
        assert_eq!(r.ltc, Ltc::new(2, 2104, 9));
        assert_eq!(
            r.channels,
            vec![
                ChannelContrast {
                    channel: 0,
                    min: 10,
                    max: 300
                },
                ChannelContrast {
                    channel: 1,
                    min: 20,
                    max: 400
                },
            ]
        );
    }

    #[test]
    fn version_2_truncated() {
        let mut data = vec![2u8, 22, 2];
        write_u16s(&mut data, &[2, 2104, 9, 10, 20, 300]);

        let err = MetricsFile::<ImageMetrics>::decode(Cursor::new(data)).unwrap_err();
        assert_eq!(err.partial.map(|f| f.len()), Some(0));
    }
}
