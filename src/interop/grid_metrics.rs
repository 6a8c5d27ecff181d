//! Sub-tile grid metrics: cluster counts per bin (`PFGridMetricsOut.bin`) and
//! focus quality per bin and channel (`FWHMGridMetricsOut.bin`).
//!
//! Each tile is divided into `num_x` by `num_y` bins. The two files lay their
//! bins out differently: PF values run along Y first (`num_y * x + y`), FWHM
//! values along X first (`num_x * y + x`).

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{read_f32_vec, read_u32_vec, FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;
use crate::geometry::Ltc;

/// FWHM records always carry this many channels, whatever the header declares
pub const FWHM_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PfGridLayout {
    pub num_x: u16,
    pub num_y: u16,
    /// mm² per bin
    pub bin_area: f32,
}

impl PfGridLayout {
    pub fn bins(&self) -> usize {
        self.num_x as usize * self.num_y as usize
    }

    pub fn index(&self, x: u16, y: u16) -> usize {
        self.num_y as usize * x as usize + y as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfGridRecord {
    pub lane: u16,
    pub tile: u16,
    pub raw: Vec<u32>,
    pub pf: Vec<u32>,
}

lane_tile_key!(PfGridRecord);

#[derive(Debug, Clone, Copy)]
pub struct PfGridMetrics;

impl MetricFormat for PfGridMetrics {
    type Record = PfGridRecord;
    type Layout = PfGridLayout;

    const NAME: &'static str = "PF grid metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::TwoBytes;

    fn read_layout<R: Read>(_: &FileHeader, rdr: &mut R) -> Result<PfGridLayout> {
        Ok(PfGridLayout {
            num_x: rdr.read_u16::<LittleEndian>()?,
            num_y: rdr.read_u16::<LittleEndian>()?,
            bin_area: rdr.read_f32::<LittleEndian>()?,
        })
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        layout: &PfGridLayout,
        rdr: &mut R,
    ) -> std::io::Result<PfGridRecord> {
        let lane = rdr.read_u16::<LittleEndian>()?;
        let tile = rdr.read_u16::<LittleEndian>()?;
        let raw = read_u32_vec(rdr, layout.bins())?;
        let pf = read_u32_vec(rdr, layout.bins())?;

        Ok(PfGridRecord { lane, tile, raw, pf })
    }
}

/// The FWHM header puts the bin counts before the record size, so the whole
/// thing is read here rather than by the common header reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwhmGridLayout {
    pub num_x: u8,
    pub num_y: u8,
    /// channels in use; at most `FWHM_CHANNELS` are stored
    pub channels: u8,
    pub record_size: u16,
}

impl FwhmGridLayout {
    pub fn bins(&self) -> usize {
        self.num_x as usize * self.num_y as usize
    }

    pub fn index(&self, x: u16, y: u16) -> usize {
        self.num_x as usize * y as usize + x as usize
    }

    /// channels that actually hold data
    pub fn stored_channels(&self) -> usize {
        (self.channels as usize).min(FWHM_CHANNELS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FwhmGridRecord {
    pub ltc: Ltc,
    /// `FWHM_CHANNELS` runs of per-bin values
    pub channels: Vec<Vec<f32>>,
}

ltc_key!(FwhmGridRecord);

#[derive(Debug, Clone, Copy)]
pub struct FwhmGridMetrics;

impl MetricFormat for FwhmGridMetrics {
    type Record = FwhmGridRecord;
    type Layout = FwhmGridLayout;

    const NAME: &'static str = "FWHM grid metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::Absent;

    fn read_layout<R: Read>(_: &FileHeader, rdr: &mut R) -> Result<FwhmGridLayout> {
        Ok(FwhmGridLayout {
            num_x: rdr.read_u8()?,
            num_y: rdr.read_u8()?,
            channels: rdr.read_u8()?,
            record_size: rdr.read_u16::<LittleEndian>()?,
        })
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        layout: &FwhmGridLayout,
        rdr: &mut R,
    ) -> std::io::Result<FwhmGridRecord> {
        let ltc = Ltc::read(rdr)?;
        let channels = (0..FWHM_CHANNELS)
            .map(|_| read_f32_vec(rdr, layout.bins()))
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(FwhmGridRecord { ltc, channels })
    }
}
