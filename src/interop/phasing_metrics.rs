//! Empirical phasing metrics (`EmpiricalPhasingMetricsOut.bin`)

use std::{collections::BTreeMap, io::Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::box_whisker::mean_stat;
use crate::codec::{FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;
use crate::geometry::{LaneTileKey, Ltc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasingRecord {
    pub ltc: Ltc,
    pub phasing: f32,
    pub prephasing: f32,
}

ltc_key!(PhasingRecord);

#[derive(Debug, Clone, Copy)]
pub struct PhasingMetrics;

impl MetricFormat for PhasingMetrics {
    type Record = PhasingRecord;
    type Layout = ();

    const NAME: &'static str = "empirical phasing metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<PhasingRecord> {
        Ok(PhasingRecord {
            ltc: Ltc::read(rdr)?,
            phasing: rdr.read_f32::<LittleEndian>()?,
            prephasing: rdr.read_f32::<LittleEndian>()?,
        })
    }
}

/// Mean phasing and prephasing per lane
pub fn lane_phasing(records: &[PhasingRecord]) -> BTreeMap<u16, (f64, f64)> {
    let mut by_lane: BTreeMap<u16, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for r in records {
        let (phasing, prephasing) = by_lane.entry(r.lane()).or_default();
        phasing.push(r.phasing as f64);
        prephasing.push(r.prephasing as f64);
    }

    by_lane
        .into_iter()
        .map(|(lane, (phasing, prephasing))| {
            (lane, (mean_stat(&phasing).0, mean_stat(&prephasing).0))
        })
        .collect()
}
