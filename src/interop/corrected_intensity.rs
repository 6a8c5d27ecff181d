//! Corrected intensity metrics (`CorrectedIntMetricsOut.bin`)

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::codec::{FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::Result;
use crate::geometry::Ltc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedIntensityRecord {
    pub ltc: Ltc,
    pub avg_intensity: u16,
    /// average corrected intensity per channel, A C G T
    pub avg_channel: [u16; 4],
    /// average corrected intensity of clusters called as A C G T
    pub avg_called: [u16; 4],
    /// base calls for no-call, A, C, G, T
    pub called_counts: [f32; 5],
    pub signal_to_noise: f32,
}

ltc_key!(CorrectedIntensityRecord);

#[derive(Debug, Clone, Copy)]
pub struct CorrectedIntensityMetrics;

impl MetricFormat for CorrectedIntensityMetrics {
    type Record = CorrectedIntensityRecord;
    type Layout = ();

    const NAME: &'static str = "corrected intensity metrics";
    const VERSIONS: &'static [u8] = &[2];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(
        _: &FileHeader,
        _: &(),
        rdr: &mut R,
    ) -> std::io::Result<CorrectedIntensityRecord> {
        let ltc = Ltc::read(rdr)?;
        let avg_intensity = rdr.read_u16::<LittleEndian>()?;

        let mut avg_channel = [0u16; 4];
        rdr.read_u16_into::<LittleEndian>(&mut avg_channel)?;
        let mut avg_called = [0u16; 4];
        rdr.read_u16_into::<LittleEndian>(&mut avg_called)?;
        let mut called_counts = [0f32; 5];
        rdr.read_f32_into::<LittleEndian>(&mut called_counts)?;

        let signal_to_noise = rdr.read_f32::<LittleEndian>()?;

        Ok(CorrectedIntensityRecord {
            ltc,
            avg_intensity,
            avg_channel,
            avg_called,
            called_counts,
            signal_to_noise,
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

    fn record_bytes(cycle: u16) -> Vec<u8> {
        let mut data = Vec::new();
        for &v in &[1u16, 1101, cycle, 500, 1, 2, 3, 4, 5, 6, 7, 8] {
            data.write_u16::<LittleEndian>(v).unwrap();
        }
        for &f in &[0.5f32, 10.0, 20.0, 30.0, 40.0, 12.5] {
            data.write_f32::<LittleEndian>(f).unwrap();
        }
        data
    }

    #[test]
    fn decode() {
        let mut data = vec![2u8, 48];
        data.extend(record_bytes(1));
        data.extend(record_bytes(2));

        let file = MetricsFile::<CorrectedIntensityMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.len(), 2);

        let r = &file.records[1];
        assert_eq!(r.ltc, Ltc::new(1, 1101, 2));
        assert_eq!(r.avg_intensity, 500);
        assert_eq!(r.avg_channel, [1, 2, 3, 4]);
        assert_eq!(r.avg_called, [5, 6, 7, 8]);
        assert_eq!(r.called_counts, [0.5, 10.0, 20.0, 30.0, 40.0]);
        assert_eq!(r.signal_to_noise, 12.5);
    }

    #[test]
    fn cut_inside_second_record() {
        let mut data = vec![2u8, 48];
        data.extend(record_bytes(1));
        data.extend(&record_bytes(2)[..30]);

        let err = MetricsFile::<CorrectedIntensityMetrics>::decode(Cursor::new(data)).unwrap_err();
        match err.error {
            InteropError::TruncatedRecord { records: 1, .. } => (),
            ref e => panic!("unexpected error {}", e),
        }
        assert_eq!(err.partial.unwrap().records[0].ltc.cycle, 1);
    }
}
