//! Extraction metrics (`ExtractionMetricsOut.bin`): focus and intensity per
//! channel, and the time each cycle's image data was written.
//!
//! Version 3 (RTA3) drops the timestamp, widens the tile to 32 bits and stores
//! the channel count in the header.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::codec::{read_f32_vec, read_u16_vec, FileHeader, RecordSizeWidth};
use crate::decoder::{peek_version, MetricFormat, MetricsFile};
use crate::error::Result;
use crate::geometry::Ltc;

pub use crate::geometry::lane_max_cycle;

/// the top two bits of a stored timestamp are a date-kind flag
const TIME_KIND_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;
/// 100ns ticks per second
const TICKS_PER_SECOND: u64 = 10_000_000;
/// seconds from 0001-01-01 to 1970-01-01
const SECONDS_TO_UNIX_EPOCH: u64 = 62_135_596_800;

/// Convert a stored tick count to seconds since the Unix epoch
pub fn ticks_to_unix_seconds(ticks: u64) -> u64 {
    ((ticks & TIME_KIND_MASK) / TICKS_PER_SECOND).saturating_sub(SECONDS_TO_UNIX_EPOCH)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionRecord {
    pub ltc: Ltc,
    /// A C G T
    pub fwhm: [f32; 4],
    /// A C G T
    pub intensity: [u16; 4],
    /// seconds since the Unix epoch
    pub cif_time: u64,
}

ltc_key!(ExtractionRecord);

#[derive(Debug, Clone, Copy)]
pub struct ExtractionMetrics;

impl MetricFormat for ExtractionMetrics {
    type Record = ExtractionRecord;
    type Layout = ();

    const NAME: &'static str = "extraction metrics";
    const VERSIONS: &'static [u8] = &[2];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        _: &(),
        rdr: &mut R,
    ) -> std::io::Result<ExtractionRecord> {
        let ltc = Ltc::read(rdr)?;
        let mut fwhm = [0f32; 4];
        rdr.read_f32_into::<LittleEndian>(&mut fwhm)?;
        let mut intensity = [0u16; 4];
        rdr.read_u16_into::<LittleEndian>(&mut intensity)?;
        let cif_time = ticks_to_unix_seconds(rdr.read_u64::<LittleEndian>()?);

        Ok(ExtractionRecord {
            ltc,
            fwhm,
            intensity,
            cif_time,
        })
    }
}

/// the lowest of the per-lane maximum cycles: how far every lane has got
pub fn min_cycle(records: &[ExtractionRecord]) -> u16 {
    lane_max_cycle(records).values().cloned().min().unwrap_or(0)
}

pub fn max_cycle(records: &[ExtractionRecord]) -> u16 {
    lane_max_cycle(records).values().cloned().max().unwrap_or(0)
}

pub fn first_cif_time(records: &[ExtractionRecord]) -> Option<u64> {
    records.iter().map(|r| r.cif_time).min()
}

pub fn latest_cif_time(records: &[ExtractionRecord]) -> Option<u64> {
    records.iter().map(|r| r.cif_time).max()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rta3ExtractionRecord {
    pub lane: u16,
    pub tile: u32,
    pub cycle: u16,
    /// one per channel
    pub fwhm: Vec<f32>,
    /// one per channel
    pub intensity: Vec<u16>,
}

#[derive(Debug, Clone, Copy)]
pub struct Rta3ExtractionMetrics;

impl MetricFormat for Rta3ExtractionMetrics {
    type Record = Rta3ExtractionRecord;
    /// channel count
    type Layout = u8;

    const NAME: &'static str = "RTA3 extraction metrics";
    const VERSIONS: &'static [u8] = &[3];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, rdr: &mut R) -> Result<u8> {
        Ok(rdr.read_u8()?)
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        channels: &u8,
        rdr: &mut R,
    ) -> std::io::Result<Rta3ExtractionRecord> {
        let lane = rdr.read_u16::<LittleEndian>()?;
        let tile = rdr.read_u32::<LittleEndian>()?;
        let cycle = rdr.read_u16::<LittleEndian>()?;
        let fwhm = read_f32_vec(rdr, *channels as usize)?;
        let intensity = read_u16_vec(rdr, *channels as usize)?;

        Ok(Rta3ExtractionRecord {
            lane,
            tile,
            cycle,
            fwhm,
            intensity,
        })
    }
}

/// An extraction metrics file in whichever layout its version byte selects
#[derive(Debug, Clone)]
pub enum ExtractionMetricsFile {
    Rta2(MetricsFile<ExtractionMetrics>),
    Rta3(MetricsFile<Rta3ExtractionMetrics>),
}

impl ExtractionMetricsFile {
    pub fn decode<R: Read>(rdr: R) -> Result<Self> {
        let mut rdr = BufReader::new(rdr);
        match peek_version(&mut rdr)? {
            Some(3) => Ok(ExtractionMetricsFile::Rta3(MetricsFile::decode(rdr)?)),
            _ => Ok(ExtractionMetricsFile::Rta2(MetricsFile::decode(rdr)?)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("decoding extraction metrics from {}", path.display());
        ExtractionMetricsFile::decode(File::open(path)?)
    }

    /// Highest cycle seen per lane. Lane 0 is skipped.
    pub fn lane_max_cycle(&self) -> BTreeMap<u16, u16> {
        match self {
            ExtractionMetricsFile::Rta2(file) => lane_max_cycle(&file.records),
            ExtractionMetricsFile::Rta3(file) => {
                let mut lanes = BTreeMap::new();
                for r in file.records.iter().filter(|r| r.lane > 0) {
                    let max = lanes.entry(r.lane).or_insert(0);
                    *max = r.cycle.max(*max);
                }
                lanes
            }
        }
    }

    pub fn min_cycle(&self) -> u16 {
        self.lane_max_cycle().values().cloned().min().unwrap_or(0)
    }

    pub fn max_cycle(&self) -> u16 {
        self.lane_max_cycle().values().cloned().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InteropError;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    // 2019-06-01T00:00:00Z as a tick count with the local-time kind bit set
    const TICKS: u64 = (1_559_347_200 + SECONDS_TO_UNIX_EPOCH) * TICKS_PER_SECOND | (1 << 63);

    fn write_record(data: &mut Vec<u8>, lane: u16, cycle: u16, ticks: u64) {
        for &v in &[lane, 1101, cycle] {
            data.write_u16::<LittleEndian>(v).unwrap();
        }
        for &f in &[2.5f32, 2.6, 2.7, 2.8] {
            data.write_f32::<LittleEndian>(f).unwrap();
        }
        for &i in &[100u16, 200, 300, 400] {
            data.write_u16::<LittleEndian>(i).unwrap();
        }
        data.write_u64::<LittleEndian>(ticks).unwrap();
    }

    #[test]
    fn timestamps() {
        assert_eq!(ticks_to_unix_seconds(TICKS), 1_559_347_200);
        assert_eq!(ticks_to_unix_seconds(0), 0);
    }

    #[test]
    fn decode() {
        let mut data = vec![2u8, 38];
        write_record(&mut data, 1, 1, TICKS);
        write_record(&mut data, 1, 2, TICKS + 60 * TICKS_PER_SECOND);

        let file = MetricsFile::<ExtractionMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.len(), 2);

        let r = &file.records[1];
        assert_eq!(r.ltc, Ltc::new(1, 1101, 2));
        assert_eq!(r.fwhm, [2.5, 2.6, 2.7, 2.8]);
        assert_eq!(r.intensity, [100, 200, 300, 400]);
        assert_eq!(r.cif_time, 1_559_347_260);

        assert_eq!(first_cif_time(&file.records), Some(1_559_347_200));
        assert_eq!(latest_cif_time(&file.records), Some(1_559_347_260));
    }

    #[test]
    fn cycles() {
        let mut data = vec![2u8, 38];
        for &(lane, cycle) in &[(1, 5), (1, 7), (2, 3), (3, 9), (0, 40)] {
            write_record(&mut data, lane, cycle, TICKS);
        }
        let file = MetricsFile::<ExtractionMetrics>::decode(Cursor::new(data)).unwrap();

        assert_eq!(min_cycle(&file.records), 3);
        assert_eq!(max_cycle(&file.records), 9);
        assert_eq!(lane_max_cycle(&file.records).len(), 3);

        assert_eq!(min_cycle(&[]), 0);
        assert_eq!(max_cycle(&[]), 0);
        assert_eq!(first_cif_time(&[]), None);
    }

    fn write_rta3_record(data: &mut Vec<u8>, lane: u16, tile: u32, cycle: u16) {
        data.write_u16::<LittleEndian>(lane).unwrap();
        data.write_u32::<LittleEndian>(tile).unwrap();
        data.write_u16::<LittleEndian>(cycle).unwrap();
        for &f in &[3.1f32, 3.2] {
            data.write_f32::<LittleEndian>(f).unwrap();
        }
        for &i in &[500u16, 600] {
            data.write_u16::<LittleEndian>(i).unwrap();
        }
    }

    #[test]
    fn decode_rta3() {
        // version, record size, two channels
        let mut data = vec![3u8, 20, 2];
        write_rta3_record(&mut data, 1, 11101, 1);
        write_rta3_record(&mut data, 1, 11101, 2);
        write_rta3_record(&mut data, 2, 21240, 4);

        let file = MetricsFile::<Rta3ExtractionMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.layout, 2);
        assert_eq!(
            file.records[0],
            Rta3ExtractionRecord {
                lane: 1,
                tile: 11101,
                cycle: 1,
                fwhm: vec![3.1, 3.2],
                intensity: vec![500, 600],
            }
        );
        assert_eq!(file.records[2].tile, 21240);
    }

    #[test]
    fn rta3_truncated() {
        let mut data = vec![3u8, 20, 2];
        write_rta3_record(&mut data, 1, 11101, 1);
        write_rta3_record(&mut data, 1, 11101, 2);
        data.truncate(data.len() - 1);

        let err = MetricsFile::<Rta3ExtractionMetrics>::decode(Cursor::new(data)).unwrap_err();
        match err.error {
            InteropError::TruncatedRecord { records: 1, .. } => (),
            ref e => panic!("unexpected error {}", e),
        }
        assert_eq!(err.partial.unwrap().records[0].cycle, 1);
    }

    #[test]
    fn either_layout() {
        let mut data = vec![3u8, 20, 2];
        for &(lane, cycle) in &[(1, 5), (1, 7), (2, 3), (0, 40)] {
            write_rta3_record(&mut data, lane, 11101, cycle);
        }
        let file = ExtractionMetricsFile::decode(Cursor::new(data)).unwrap();
        match file {
            ExtractionMetricsFile::Rta3(ref rta3) => assert_eq!(rta3.len(), 4),
            ref other => panic!("expected the RTA3 layout, got {:?}", other),
        }
        assert_eq!(file.min_cycle(), 3);
        assert_eq!(file.max_cycle(), 7);

        let mut data = vec![2u8, 38];
        write_record(&mut data, 1, 6, TICKS);
        let file = ExtractionMetricsFile::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.lane_max_cycle()[&1], 6);

        match ExtractionMetricsFile::decode(Cursor::new(vec![1u8, 38])) {
            Err(InteropError::UnsupportedVersion { version: 1, .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
