//! Quality metrics (`QMetricsOut.bin`): per-cycle Q-score histograms, the
//! optional quality-bin table that compacts them, and lane-level statistics.

use std::{
    collections::{BTreeMap, HashSet},
    io::Read,
};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::codec::{read_u32_vec, FileHeader, RecordSizeWidth};
use crate::decoder::{MetricFormat, MetricsFile};
use crate::error::{DecodeFailure, InteropError, Result};
use crate::geometry::{LaneTileKey, Ltc};

pub use crate::geometry::lane_max_cycle;

/// Slots in a full Q-score histogram
pub const NUM_QSCORES: usize = 50;

/// Quality-bin table: `remap[i]` is the Q-score slot that compacted bin `i`
/// expands back to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QbinConfig {
    pub lower: Vec<u8>,
    pub upper: Vec<u8>,
    pub remap: Vec<u8>,
}

impl QbinConfig {
    /// Bin count, then the lower-bound, upper-bound and remap arrays
    pub fn read<R: Read>(rdr: &mut R) -> std::io::Result<Self> {
        let n = rdr.read_u8()? as usize;
        let mut config = QbinConfig {
            lower: vec![0; n],
            upper: vec![0; n],
            remap: vec![0; n],
        };
        rdr.read_exact(&mut config.lower)?;
        rdr.read_exact(&mut config.upper)?;
        rdr.read_exact(&mut config.remap)?;

        Ok(config)
    }

    pub fn len(&self) -> usize {
        self.remap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remap.is_empty()
    }

    /// At most 50 bins, and every bound or remap target a Q-score slot below 50
    pub fn validate(&self) -> Result<()> {
        if self.len() > NUM_QSCORES {
            return Err(InteropError::InvalidQbinConfig(format!(
                "{} bins, at most {} allowed",
                self.len(),
                NUM_QSCORES
            )));
        }

        for (name, values) in &[
            ("lower bound", &self.lower),
            ("upper bound", &self.upper),
            ("remap score", &self.remap),
        ] {
            if let Some((i, v)) = values
                .iter()
                .enumerate()
                .find(|(_, v)| **v as usize >= NUM_QSCORES)
            {
                return Err(InteropError::InvalidQbinConfig(format!(
                    "{} {} at bin {} is not below {}",
                    name, v, i, NUM_QSCORES
                )));
            }
        }

        Ok(())
    }

    /// Place each compacted count at its remapped Q-score slot. A later bin
    /// remapped to the same slot overwrites an earlier one.
    pub fn expand(&self, counts: &[u32]) -> [u32; NUM_QSCORES] {
        let mut histogram = [0u32; NUM_QSCORES];
        for (&slot, &count) in self.remap.iter().zip(counts) {
            histogram[slot as usize] = count;
        }
        histogram
    }
}

/// How the records of one quality file are stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QbinMode {
    /// full 50-slot histogram per record
    NonBinned,
    /// one count per configured bin per record
    Binned(QbinConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityRecord {
    pub ltc: Ltc,
    /// clusters per Q-score slot
    pub histogram: [u32; NUM_QSCORES],
}

ltc_key!(QualityRecord);

#[derive(Debug, Clone, Copy)]
pub struct QualityMetrics;

impl MetricFormat for QualityMetrics {
    type Record = QualityRecord;
    type Layout = QbinMode;

    const NAME: &'static str = "quality metrics";
    const VERSIONS: &'static [u8] = &[4, 5, 6];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(header: &FileHeader, rdr: &mut R) -> Result<QbinMode> {
        if header.version == 4 {
            return Ok(QbinMode::NonBinned);
        }

        if rdr.read_u8()? != 1 {
            return Ok(QbinMode::NonBinned);
        }

        let config = QbinConfig::read(rdr)?;
        config.validate()?;
        debug!("quality bins {:?} remapped to {:?}", config.lower, config.remap);

        Ok(QbinMode::Binned(config))
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        mode: &QbinMode,
        rdr: &mut R,
    ) -> std::io::Result<QualityRecord> {
        let ltc = Ltc::read(rdr)?;
        let histogram = match mode {
            QbinMode::NonBinned => {
                let mut histogram = [0u32; NUM_QSCORES];
                rdr.read_u32_into::<LittleEndian>(&mut histogram)?;
                histogram
            }
            QbinMode::Binned(config) => config.expand(&read_u32_vec(rdr, config.len())?),
        };

        Ok(QualityRecord { ltc, histogram })
    }
}

pub type QualityFile = MetricsFile<QualityMetrics>;

/// Decode a quality metrics stream, expanding binned records to full histograms
pub fn qbin_decode<R: Read>(
    rdr: R,
) -> std::result::Result<QualityFile, DecodeFailure<QualityMetrics>> {
    MetricsFile::decode(rdr)
}

/// Summed histogram per lane
pub type HistogramByLane = BTreeMap<u16, [u64; NUM_QSCORES]>;

/// Sum every record's histogram into its lane, optionally keeping only the
/// given cycles
pub fn lane_sum(records: &[QualityRecord], cycles: Option<&HashSet<u16>>) -> HistogramByLane {
    let mut sums = HistogramByLane::new();

    for r in records {
        if let Some(cycles) = cycles {
            if !cycles.contains(&r.cycle()) {
                continue;
            }
        }

        let sum = sums.entry(r.lane()).or_insert([0u64; NUM_QSCORES]);
        for (s, &n) in sum.iter_mut().zip(r.histogram.iter()) {
            *s += n as u64;
        }
    }

    sums
}

pub fn qscore_to_error_rate(q: usize) -> f64 {
    10f64.powf(-(q as f64) / 10.0)
}

/// count-weighted mean and population stdev of `value(q)` over a histogram
fn weighted_stat<F: Fn(usize) -> f64>(histogram: &[u64], value: F) -> (f64, f64) {
    let count: u64 = histogram.iter().sum();
    if count == 0 {
        return (0.0, 0.0);
    }

    let total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(q, &n)| n as f64 * value(q))
        .sum();
    let mean = total / count as f64;

    let devsum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(q, &n)| n as f64 * (mean - value(q)).powi(2))
        .sum();

    (mean, (devsum / count as f64).sqrt())
}

/// Mean and stdev of the Q-score in `lane`, weighted by cluster count
pub fn quality_stat(sums: &HistogramByLane, lane: u16) -> (f64, f64) {
    match sums.get(&lane) {
        Some(histogram) => weighted_stat(histogram, |q| q as f64),
        None => (0.0, 0.0),
    }
}

/// Mean and stdev of the error rate implied by each cluster's Q-score
pub fn expected_error_rate_stat(sums: &HistogramByLane, lane: u16) -> (f64, f64) {
    match sums.get(&lane) {
        Some(histogram) => weighted_stat(histogram, qscore_to_error_rate),
        None => (0.0, 0.0),
    }
}

/// Clusters in `lane` at Q`cutoff` or above, slot `i` holding Q`i+1`
pub fn count_at_or_above(sums: &HistogramByLane, lane: u16, cutoff: usize) -> u64 {
    sums.get(&lane).map_or(0, |histogram| {
        histogram
            .iter()
            .enumerate()
            .filter(|(i, _)| i + 1 >= cutoff)
            .map(|(_, &n)| n)
            .sum()
    })
}

pub fn percent_at_or_above(sums: &HistogramByLane, lane: u16, cutoff: usize) -> f64 {
    let total: u64 = sums.get(&lane).map_or(0, |histogram| histogram.iter().sum());
    if total == 0 {
        return 0.0;
    }
    100.0 * count_at_or_above(sums, lane, cutoff) as f64 / total as f64
}
