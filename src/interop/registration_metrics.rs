//! Registration metrics: per-channel sub-region pixel offsets and the affine
//! transform fitted for each channel of a tile.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;
use crate::geometry::Ltc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationLayout {
    pub channels: u8,
    pub subregions: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubregionOffset {
    pub shift_x: f32,
    pub shift_y: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AffineTransform {
    pub translation_x: f32,
    pub translation_y: f32,
    pub magnification_x: f32,
    pub magnification_y: f32,
    /// offset in Y as a function of X
    pub shear_xy: f32,
    /// offset in X as a function of Y
    pub shear_yx: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelRegistration {
    pub regions: Vec<SubregionOffset>,
    pub affine: AffineTransform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRecord {
    pub ltc: Ltc,
    pub channels: Vec<ChannelRegistration>,
}

ltc_key!(RegistrationRecord);

fn read_channel<R: Read>(rdr: &mut R, subregions: u8) -> std::io::Result<ChannelRegistration> {
    let mut regions = Vec::with_capacity(subregions as usize);
    for _ in 0..subregions {
        regions.push(SubregionOffset {
            shift_x: rdr.read_f32::<LittleEndian>()?,
            shift_y: rdr.read_f32::<LittleEndian>()?,
            score: rdr.read_f32::<LittleEndian>()?,
        });
    }

    let affine = AffineTransform {
        translation_x: rdr.read_f32::<LittleEndian>()?,
        translation_y: rdr.read_f32::<LittleEndian>()?,
        magnification_x: rdr.read_f32::<LittleEndian>()?,
        magnification_y: rdr.read_f32::<LittleEndian>()?,
        shear_xy: rdr.read_f32::<LittleEndian>()?,
        shear_yx: rdr.read_f32::<LittleEndian>()?,
    };

    Ok(ChannelRegistration { regions, affine })
}

#[derive(Debug, Clone, Copy)]
pub struct RegistrationMetrics;

impl MetricFormat for RegistrationMetrics {
    type Record = RegistrationRecord;
    type Layout = RegistrationLayout;

    const NAME: &'static str = "registration metrics";
    const VERSIONS: &'static [u8] = &[1];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::TwoBytes;

    fn read_layout<R: Read>(_: &FileHeader, rdr: &mut R) -> Result<RegistrationLayout> {
        Ok(RegistrationLayout {
            channels: rdr.read_u8()?,
            subregions: rdr.read_u8()?,
        })
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        layout: &RegistrationLayout,
        rdr: &mut R,
    ) -> std::io::Result<RegistrationRecord> {
        let ltc = Ltc::read(rdr)?;
        let channels = (0..layout.channels)
            .map(|_| read_channel(rdr, layout.subregions))
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(RegistrationRecord { ltc, channels })
    }
}
