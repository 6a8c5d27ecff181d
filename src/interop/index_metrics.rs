//! Index metrics (`IndexMetricsOut.bin`) and control metrics
//! (`ControlMetricsOut.bin`). Both files carry only a version byte before
//! their records, and both use length-prefixed strings.

use std::{collections::BTreeMap, io::Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{read_prefixed_string, FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub lane: u16,
    pub tile: u16,
    pub read: u16,
    pub index_name: String,
    pub clusters_pf: u32,
    pub sample_name: String,
    pub project_name: String,
}

lane_tile_key!(IndexRecord);

#[derive(Debug, Clone, Copy)]
pub struct IndexMetrics;

impl MetricFormat for IndexMetrics {
    type Record = IndexRecord;
    type Layout = ();

    const NAME: &'static str = "index metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::Absent;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<IndexRecord> {
        Ok(IndexRecord {
            lane: rdr.read_u16::<LittleEndian>()?,
            tile: rdr.read_u16::<LittleEndian>()?,
            read: rdr.read_u16::<LittleEndian>()?,
            index_name: read_prefixed_string(rdr)?,
            clusters_pf: rdr.read_u32::<LittleEndian>()?,
            sample_name: read_prefixed_string(rdr)?,
            project_name: read_prefixed_string(rdr)?,
        })
    }
}

/// PF clusters per (lane, sample), summed over tiles and reads
pub fn clusters_by_sample(records: &[IndexRecord]) -> BTreeMap<(u16, String), u64> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry((r.lane, r.sample_name.clone())).or_insert(0) += r.clusters_pf as u64;
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRecord {
    pub lane: u16,
    pub tile: u16,
    pub read: u16,
    pub control_name: String,
    pub index_name: String,
    pub clusters: u32,
}

lane_tile_key!(ControlRecord);

#[derive(Debug, Clone, Copy)]
pub struct ControlMetrics;

impl MetricFormat for ControlMetrics {
    type Record = ControlRecord;
    type Layout = ();

    const NAME: &'static str = "control metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::Absent;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<ControlRecord> {
        Ok(ControlRecord {
            lane: rdr.read_u16::<LittleEndian>()?,
            tile: rdr.read_u16::<LittleEndian>()?,
            read: rdr.read_u16::<LittleEndian>()?,
            control_name: read_prefixed_string(rdr)?,
            index_name: read_prefixed_string(rdr)?,
            clusters: rdr.read_u32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MetricsFile;
    use crate::error::InteropError;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn write_string(data: &mut Vec<u8>, s: &str) {
        data.write_u16::<LittleEndian>(s.len() as u16).unwrap();
        data.extend_from_slice(s.as_bytes());
    }

    fn index_record(data: &mut Vec<u8>, lane: u16, tile: u16, index: &str, pf: u32, sample: &str) {
        for &v in &[lane, tile, 2] {
            data.write_u16::<LittleEndian>(v).unwrap();
        }
        write_string(data, index);
        data.write_u32::<LittleEndian>(pf).unwrap();
        write_string(data, sample);
        write_string(data, "proj");
    }

    #[test]
    fn decode_index() {
        let mut data = vec![1u8];
        index_record(&mut data, 1, 1101, "ACGTACGT-TTGGCCAA", 1200, "s1");
        index_record(&mut data, 1, 1102, "GGGGCCCC", 800, "s2");
        index_record(&mut data, 1, 1102, "ACGTACGT-TTGGCCAA", 300, "s1");

        let file = MetricsFile::<IndexMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.len(), 3);
        assert_eq!(file.header.record_size, 0);
        assert_eq!(
            file.records[0],
            IndexRecord {
                lane: 1,
                tile: 1101,
                read: 2,
                index_name: "ACGTACGT-TTGGCCAA".to_string(),
                clusters_pf: 1200,
                sample_name: "s1".to_string(),
                project_name: "proj".to_string(),
            }
        );

        let counts = clusters_by_sample(&file.records);
        assert_eq!(counts[&(1, "s1".to_string())], 1500);
        assert_eq!(counts[&(1, "s2".to_string())], 800);
    }

    #[test]
    fn truncated_inside_string() {
        let mut data = vec![1u8];
        index_record(&mut data, 1, 1101, "ACGT", 10, "s1");
        let full = data.len();
        index_record(&mut data, 1, 1102, "ACGT", 10, "s2");
        data.truncate(full + 8);

        let err = MetricsFile::<IndexMetrics>::decode(Cursor::new(data)).unwrap_err();
        match err.error {
            InteropError::TruncatedRecord { records: 1, .. } => (),
            ref e => panic!("unexpected error {}", e),
        }
    }

    #[test]
    fn decode_control() {
        let mut data = vec![1u8];
        for &v in &[3u16, 2211, 1] {
            data.write_u16::<LittleEndian>(v).unwrap();
        }
        write_string(&mut data, "CTL1");
        write_string(&mut data, "");
        data.write_u32::<LittleEndian>(42).unwrap();

        let file = MetricsFile::<ControlMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(
            file.records,
            vec![ControlRecord {
                lane: 3,
                tile: 2211,
                read: 1,
                control_name: "CTL1".to_string(),
                index_name: String::new(),
                clusters: 42,
            }]
        );
    }
}
