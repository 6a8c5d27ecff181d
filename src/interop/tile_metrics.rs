//! Tile metrics (`TileMetricsOut.bin`) and extended tile metrics
//! (`ExtendedTileMetricsOut.bin`): one coded scalar per (lane, tile) record.
//!
//! RTA3 rewrote the tile metrics file as version 3: 32-bit tile numbers, the
//! tile area in the header, and a one-byte record kind in place of the numeric
//! code. [`TileMetricsFile`] decodes either layout.

use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufReader, ErrorKind, Read},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt};
use itertools::Itertools;
use log::debug;

use crate::box_whisker::mean_stat;
use crate::codec::{FileHeader, RecordSizeWidth};
use crate::decoder::{peek_version, MetricFormat, MetricsFile};
use crate::error::Result;

pub const CLUSTER_DENSITY: u16 = 100;
pub const CLUSTER_DENSITY_PF: u16 = 101;
pub const NUM_CLUSTERS: u16 = 102;
pub const NUM_CLUSTERS_PF: u16 = 103;
pub const CONTROL_LANE: u16 = 400;
/// extended tile metrics: clusters occupying wells on a patterned flowcell
pub const CLUSTERS_OCCUPIED: u16 = 0;

/// The per-read codes, for a 1-based read number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCodes {
    pub phasing: u16,
    pub prephasing: u16,
    pub percent_aligned: u16,
}

impl ReadCodes {
    pub fn for_read(read: u16) -> Self {
        let n = read.saturating_sub(1);
        ReadCodes {
            phasing: 200 + 2 * n,
            prephasing: 201 + 2 * n,
            percent_aligned: 300 + n,
        }
    }
}

pub fn metric_code_name(code: u16) -> &'static str {
    match code {
        100 => "cluster_density",
        101 => "cluster_density_pf",
        102 => "num_clusters",
        103 => "num_clusters_pf",
        200 => "phasing_read1",
        201 => "prephasing_read1",
        202 => "phasing_read2",
        203 => "prephasing_read2",
        204 => "phasing_read3",
        205 => "prephasing_read3",
        206 => "phasing_read4",
        207 => "prephasing_read4",
        300 => "percent_aligned_read1",
        301 => "percent_aligned_read2",
        302 => "percent_aligned_read3",
        303 => "percent_aligned_read4",
        400 => "control_lane",
        _ => "undefined",
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRecord {
    pub lane: u16,
    pub tile: u16,
    pub code: u16,
    pub value: f32,
}

lane_tile_key!(TileRecord);

fn read_tile_record<R: Read>(rdr: &mut R) -> std::io::Result<TileRecord> {
    Ok(TileRecord {
        lane: rdr.read_u16::<LittleEndian>()?,
        tile: rdr.read_u16::<LittleEndian>()?,
        code: rdr.read_u16::<LittleEndian>()?,
        value: rdr.read_f32::<LittleEndian>()?,
    })
}

#[derive(Debug, Clone, Copy)]
pub struct TileMetrics;

impl MetricFormat for TileMetrics {
    type Record = TileRecord;
    type Layout = ();

    const NAME: &'static str = "tile metrics";
    const VERSIONS: &'static [u8] = &[2];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<TileRecord> {
        read_tile_record(rdr)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendedTileMetrics;

impl MetricFormat for ExtendedTileMetrics {
    type Record = TileRecord;
    type Layout = ();

    const NAME: &'static str = "extended tile metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<TileRecord> {
        read_tile_record(rdr)
    }
}

/// distinct lanes, ascending
pub fn lanes_sorted(records: &[TileRecord]) -> Vec<u16> {
    records.iter().map(|r| r.lane).unique().sorted().collect()
}

/// lane -> code -> summed value
pub fn code_sum_by_lane(records: &[TileRecord]) -> BTreeMap<u16, BTreeMap<u16, f64>> {
    let mut sums: BTreeMap<u16, BTreeMap<u16, f64>> = BTreeMap::new();
    for r in records {
        *sums
            .entry(r.lane)
            .or_insert_with(BTreeMap::new)
            .entry(r.code)
            .or_insert(0.0) += r.value as f64;
    }
    sums
}

/// mean value of `code` over the tiles of `lane`, 0 if none reported it
pub fn code_avg_by_lane(records: &[TileRecord], lane: u16, code: u16) -> f64 {
    let values: Vec<f64> = records
        .iter()
        .filter(|r| r.lane == lane && r.code == code)
        .map(|r| r.value as f64)
        .collect();

    mean_stat(&values).0
}

/// mean and stdev of percent-aligned over the given reads and lanes
pub fn aligned_stat_by_lanes(records: &[TileRecord], reads: &[u16], lanes: &[u16]) -> (f64, f64) {
    let codes: HashSet<u16> = reads
        .iter()
        .map(|&read| ReadCodes::for_read(read).percent_aligned)
        .collect();
    let lanes: HashSet<u16> = lanes.iter().cloned().collect();

    let values: Vec<f64> = records
        .iter()
        .filter(|r| lanes.contains(&r.lane) && codes.contains(&r.code))
        .map(|r| r.value as f64)
        .collect();

    mean_stat(&values)
}

/// Payload of a version 3 record, chosen by its kind byte
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rta3Payload {
    /// `'t'`
    Clusters { clusters: f32, clusters_pf: f32 },
    /// `'r'`
    Alignment { read: u32, percent_aligned: f32 },
    /// `'\0'`, eight bytes of padding
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rta3TileRecord {
    pub lane: u16,
    pub tile: u32,
    pub payload: Rta3Payload,
}

#[derive(Debug, Clone, Copy)]
pub struct Rta3TileMetrics;

impl MetricFormat for Rta3TileMetrics {
    type Record = Rta3TileRecord;
    /// tile area in mm²
    type Layout = f32;

    const NAME: &'static str = "RTA3 tile metrics";
    const VERSIONS: &'static [u8] = &[3];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, rdr: &mut R) -> Result<f32> {
        Ok(rdr.read_f32::<LittleEndian>()?)
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        _: &f32,
        rdr: &mut R,
    ) -> std::io::Result<Rta3TileRecord> {
        let lane = rdr.read_u16::<LittleEndian>()?;
        let tile = rdr.read_u32::<LittleEndian>()?;
        let payload = match rdr.read_u8()? {
            b't' => Rta3Payload::Clusters {
                clusters: rdr.read_f32::<LittleEndian>()?,
                clusters_pf: rdr.read_f32::<LittleEndian>()?,
            },
            b'r' => Rta3Payload::Alignment {
                read: rdr.read_u32::<LittleEndian>()?,
                percent_aligned: rdr.read_f32::<LittleEndian>()?,
            },
            0 => {
                rdr.read_u64::<LittleEndian>()?;
                Rta3Payload::Empty
            }
            code => {
                return Err(std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("unknown tile metric kind {:#04x}", code),
                ))
            }
        };

        Ok(Rta3TileRecord {
            lane,
            tile,
            payload,
        })
    }
}

/// Cluster and PF density per lane in clusters / mm², averaged over the tiles
/// that reported cluster counts
pub fn rta3_density_by_lane(file: &MetricsFile<Rta3TileMetrics>) -> BTreeMap<u16, (f64, f64)> {
    let area = file.layout as f64;
    let mut by_lane: BTreeMap<u16, (Vec<f64>, Vec<f64>)> = BTreeMap::new();

    for r in &file.records {
        if let Rta3Payload::Clusters {
            clusters,
            clusters_pf,
        } = r.payload
        {
            let (raw, pf) = by_lane.entry(r.lane).or_default();
            if area > 0.0 {
                raw.push(clusters as f64 / area);
                pf.push(clusters_pf as f64 / area);
            } else {
                raw.push(0.0);
                pf.push(0.0);
            }
        }
    }

    by_lane
        .into_iter()
        .map(|(lane, (raw, pf))| (lane, (mean_stat(&raw).0, mean_stat(&pf).0)))
        .collect()
}

/// Mean and stdev of percent aligned per read number across all lanes
pub fn rta3_aligned_by_read(records: &[Rta3TileRecord]) -> BTreeMap<u32, (f64, f64)> {
    let mut by_read: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for r in records {
        if let Rta3Payload::Alignment {
            read,
            percent_aligned,
        } = r.payload
        {
            by_read.entry(read).or_default().push(percent_aligned as f64);
        }
    }

    by_read
        .into_iter()
        .map(|(read, values)| (read, mean_stat(&values)))
        .collect()
}

/// A tile metrics file in whichever layout its version byte selects
#[derive(Debug, Clone)]
pub enum TileMetricsFile {
    Coded(MetricsFile<TileMetrics>),
    Rta3(MetricsFile<Rta3TileMetrics>),
}

impl TileMetricsFile {
    /// Version 3 decodes as RTA3, anything else as the coded layout (which
    /// rejects versions it does not know)
    pub fn decode<R: Read>(rdr: R) -> Result<Self> {
        let mut rdr = BufReader::new(rdr);
        match peek_version(&mut rdr)? {
            Some(3) => Ok(TileMetricsFile::Rta3(MetricsFile::decode(rdr)?)),
            _ => Ok(TileMetricsFile::Coded(MetricsFile::decode(rdr)?)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("decoding tile metrics from {}", path.display());
        TileMetricsFile::decode(File::open(path)?)
    }

    pub fn version(&self) -> u8 {
        match self {
            TileMetricsFile::Coded(file) => file.version(),
            TileMetricsFile::Rta3(file) => file.version(),
        }
    }

    pub fn lanes(&self) -> Vec<u16> {
        match self {
            TileMetricsFile::Coded(file) => lanes_sorted(&file.records),
            TileMetricsFile::Rta3(file) => {
                file.records.iter().map(|r| r.lane).unique().sorted().collect()
            }
        }
    }

    /// lane -> (cluster density, PF cluster density), clusters / mm²
    pub fn density_by_lane(&self) -> BTreeMap<u16, (f64, f64)> {
        match self {
            TileMetricsFile::Coded(file) => lanes_sorted(&file.records)
                .into_iter()
                .map(|lane| {
                    let raw = code_avg_by_lane(&file.records, lane, CLUSTER_DENSITY);
                    let pf = code_avg_by_lane(&file.records, lane, CLUSTER_DENSITY_PF);
                    (lane, (raw, pf))
                })
                .collect(),
            TileMetricsFile::Rta3(file) => rta3_density_by_lane(file),
        }
    }
}
