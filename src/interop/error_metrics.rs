//! Error metrics (`ErrorMetricsOut.bin`) and the per-tile error-rate grids
//! built from them: tile means, the blank tile map, and bubble detection.

use std::{collections::HashSet, io::Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::box_whisker::{mean_stat, mean_stat_f32};
use crate::codec::{FileHeader, RecordSizeWidth};
use crate::decoder::MetricFormat;
use crate::error::{InteropError, Result};
use crate::geometry::{
    encode_tile, max_dimensions, FlowcellGrid, LaneTileKey, Ltc, TileDimension, TileLayout,
};

/// A cycle is a bubble when its error rate is at least this multiple of the
/// sum of its two neighbours
pub const BUBBLE_THRESHOLD: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorRecord {
    pub ltc: Ltc,
    pub error_rate: f32,
    pub perfect_reads: u32,
    /// reads with 1, 2, 3 and 4 errors
    pub error_reads: [u32; 4],
}

ltc_key!(ErrorRecord);

#[derive(Debug, Clone, Copy)]
pub struct ErrorMetrics;

impl MetricFormat for ErrorMetrics {
    type Record = ErrorRecord;
    type Layout = ();

    const NAME: &'static str = "error metrics";
    const VERSIONS: &'static [u8] = &[3];
    const RECORD_SIZE: RecordSizeWidth = RecordSizeWidth::OneByte;

    fn read_layout<R: Read>(_: &FileHeader, _: &mut R) -> Result<()> {
        Ok(())
    }

    fn read_record<R: Read>(_: &FileHeader, _: &(), rdr: &mut R) -> std::io::Result<ErrorRecord> {
        let ltc = Ltc::read(rdr)?;
        let error_rate = rdr.read_f32::<LittleEndian>()?;
        let perfect_reads = rdr.read_u32::<LittleEndian>()?;
        let mut error_reads = [0u32; 4];
        rdr.read_u32_into::<LittleEndian>(&mut error_reads)?;

        Ok(ErrorRecord {
            ltc,
            error_rate,
            perfect_reads,
            error_reads,
        })
    }
}

/// How error rates are laid out in each tile's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMode {
    /// one entry per record, in file order
    Arrival,
    /// a zero-filled array of `max_cycle` entries, the rate for cycle `c` at `c - 1`
    ByCycle,
}

/// One cell of an error-rate grid
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileErrorRate {
    pub tile: u16,
    /// number of records that landed in this tile
    pub reported: usize,
    pub error_rates: Vec<f32>,
    pub mean: f32,
    pub stdev: f32,
    pub bubbles: u32,
}

fn empty_grid(dim: &TileDimension, mode: SeriesMode) -> FlowcellGrid<TileErrorRate> {
    let cycles = match mode {
        SeriesMode::Arrival => 0,
        SeriesMode::ByCycle => dim.max_cycle as usize,
    };

    FlowcellGrid::from_fn(dim, |_, pos| TileErrorRate {
        tile: encode_tile(pos, dim.position_digits),
        error_rates: vec![0.0; cycles],
        ..TileErrorRate::default()
    })
}

/// Every cell populated with its tile number and no error rates
pub fn blank_tile_map(dim: &TileDimension) -> FlowcellGrid<TileErrorRate> {
    empty_grid(dim, SeriesMode::Arrival)
}

/// Place every record's error rate into a grid of `dim`.
///
/// Fails with `IndexOutOfRange` when a record's lane, tile or (in `ByCycle`
/// mode) cycle falls outside `dim`.
pub fn error_rate_grid(
    records: &[ErrorRecord],
    dim: &TileDimension,
    mode: SeriesMode,
) -> Result<FlowcellGrid<TileErrorRate>> {
    debug!(
        "error rate grid: {} lanes x {} surfaces x {} swaths x {} tiles, {} cycles",
        dim.lanes.len(),
        dim.surfaces,
        dim.swaths,
        dim.positions,
        dim.max_cycle
    );

    let mut grid = empty_grid(dim, mode);

    for r in records {
        let cell = grid.get_mut(r.ltc.lane, r.ltc.tile)?;
        cell.tile = r.ltc.tile;
        cell.reported += 1;

        match mode {
            SeriesMode::Arrival => cell.error_rates.push(r.error_rate),
            SeriesMode::ByCycle => {
                let c = r.ltc.cycle as usize;
                if c == 0 || c > cell.error_rates.len() {
                    return Err(InteropError::IndexOutOfRange {
                        lane: r.ltc.lane,
                        tile: r.ltc.tile,
                        cycle: r.ltc.cycle,
                    });
                }
                cell.error_rates[c - 1] = r.error_rate;
            }
        }
    }

    Ok(grid)
}

/// Error rates per tile in arrival order, with each tile's mean and
/// population standard deviation filled in.
///
/// `layout` replaces the surface/swath/position counts found in the records,
/// for instruments whose full tile geometry is known up front.
pub fn error_rate_by_tile(
    records: &[ErrorRecord],
    layout: Option<&TileLayout>,
) -> Result<FlowcellGrid<TileErrorRate>> {
    let mut dim = max_dimensions(records);
    if let Some(layout) = layout {
        dim = dim.with_layout(layout);
    }

    let mut grid = error_rate_grid(records, &dim, SeriesMode::Arrival)?;
    for cell in grid.values_mut() {
        let (mean, stdev) = mean_stat_f32(&cell.error_rates);
        cell.mean = mean;
        cell.stdev = stdev;
    }

    Ok(grid)
}

/// Counts (valid cycles, bubbles) in one tile's per-cycle error rates.
///
/// The first cycle and the last two are never considered, nor are excluded
/// cycle numbers (1-based) or cycles where the rate or either neighbour is 0.
pub fn count_bubbles(rates: &[f32], excluded: &HashSet<u16>) -> (usize, u32) {
    let sz = rates.len();
    let mut valid = 0;
    let mut bubbles = 0;

    for (c, &cur) in rates.iter().enumerate() {
        if c == 0 || c + 2 >= sz {
            continue;
        }
        if excluded.contains(&((c + 1) as u16)) {
            continue;
        }

        let (pre, next) = (rates[c - 1], rates[c + 1]);
        if cur == 0.0 || pre == 0.0 || next == 0.0 {
            continue;
        }

        valid += 1;
        if cur >= BUBBLE_THRESHOLD * (pre + next) {
            bubbles += 1;
        }
    }

    (valid, bubbles)
}

/// Per-cycle error-rate grid with bubble counts, and the number of cycles
/// across the flowcell that were eligible for bubble detection
#[derive(Debug, Clone, PartialEq)]
pub struct BubbleGrid {
    pub grid: FlowcellGrid<TileErrorRate>,
    pub total_valid_cycles: usize,
}

pub fn bubble_counter(records: &[ErrorRecord], excluded: &HashSet<u16>) -> Result<BubbleGrid> {
    let dim = max_dimensions(records);
    let mut grid = error_rate_grid(records, &dim, SeriesMode::ByCycle)?;

    let mut total_valid_cycles = 0;
    for cell in grid.values_mut() {
        if cell.reported == 0 {
            continue;
        }
        let (valid, bubbles) = count_bubbles(&cell.error_rates, excluded);
        cell.bubbles = bubbles;
        total_valid_cycles += valid;
    }

    debug!(
        "{} valid cycles for bubble detection across {} tiles",
        total_valid_cycles,
        grid.len()
    );

    Ok(BubbleGrid {
        grid,
        total_valid_cycles,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BubbleSummary {
    pub bubbled_tiles: usize,
    pub total_bubbles: u32,
    pub total_valid_cycles: usize,
    /// bubbles per valid cycle
    pub bubble_rate: f32,
    pub mean_in_bubbled_tiles: f32,
    /// bubbles per tile that reported any error rate
    pub mean_in_all_tiles: f32,
}

pub fn bubble_summary(bubbles: &BubbleGrid) -> BubbleSummary {
    let mut summary = BubbleSummary {
        total_valid_cycles: bubbles.total_valid_cycles,
        ..BubbleSummary::default()
    };

    let mut reported_tiles = 0;
    for cell in bubbles.grid.values() {
        if cell.reported > 0 {
            reported_tiles += 1;
        }
        if cell.bubbles > 0 {
            summary.bubbled_tiles += 1;
            summary.total_bubbles += cell.bubbles;
        }
    }

    let total = summary.total_bubbles as f32;
    if summary.total_valid_cycles > 0 {
        summary.bubble_rate = total / summary.total_valid_cycles as f32;
    }
    if summary.bubbled_tiles > 0 {
        summary.mean_in_bubbled_tiles = total / summary.bubbled_tiles as f32;
    }
    if reported_tiles > 0 {
        summary.mean_in_all_tiles = total / reported_tiles as f32;
    }

    summary
}

/// mean and population stdev of the error rates reported for `lane`,
/// optionally only for the given cycles
pub fn lane_error_rate_stat(
    records: &[ErrorRecord],
    lane: u16,
    cycles: Option<&HashSet<u16>>,
) -> (f64, f64) {
    let rates: Vec<f64> = records
        .iter()
        .filter(|r| r.lane() == lane)
        .filter(|r| cycles.map_or(true, |cycles| cycles.contains(&r.cycle())))
        .map(|r| r.error_rate as f64)
        .collect();

    mean_stat(&rates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MetricsFile;
    use byteorder::WriteBytesExt;
    use std::io::Cursor;

    fn record(lane: u16, tile: u16, cycle: u16, error_rate: f32) -> ErrorRecord {
        ErrorRecord {
            ltc: Ltc::new(lane, tile, cycle),
            error_rate,
            perfect_reads: 0,
            error_reads: [0; 4],
        }
    }

    fn series(lane: u16, tile: u16, rates: &[f32]) -> Vec<ErrorRecord> {
        rates
            .iter()
            .enumerate()
            .map(|(i, &r)| record(lane, tile, i as u16 + 1, r))
            .collect()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn decode_error_metrics() {
        let mut data = vec![3u8, 30];
        for &(lane, tile, cycle, rate) in &[(1u16, 1101u16, 1u16, 0.25f32), (2, 2316, 12, 1.5)] {
            data.write_u16::<LittleEndian>(lane).unwrap();
            data.write_u16::<LittleEndian>(tile).unwrap();
            data.write_u16::<LittleEndian>(cycle).unwrap();
            data.write_f32::<LittleEndian>(rate).unwrap();
            for n in 0..5u32 {
                data.write_u32::<LittleEndian>(n * cycle as u32).unwrap();
            }
        }

        let file = MetricsFile::<ErrorMetrics>::decode(Cursor::new(data)).unwrap();
        assert_eq!(file.header.record_size, 30);
        assert_eq!(file.len(), 2);

        let r = &file.records[1];
        assert_eq!(r.ltc, Ltc::new(2, 2316, 12));
        assert_eq!(r.error_rate, 1.5);
        assert_eq!(r.perfect_reads, 0);
        assert_eq!(r.error_reads, [12, 24, 36, 48]);
    }

    #[test]
    fn rejects_other_versions() {
        let err = MetricsFile::<ErrorMetrics>::decode(Cursor::new(vec![4u8, 30])).unwrap_err();
        match err.error {
            InteropError::UnsupportedVersion { version: 4, .. } => (),
            e => panic!("unexpected error {}", e),
        }
    }

    #[test]
    fn bubbles_in_fixed_series() {
        let rates = [0.0, 0.1, 0.2, 0.05, 0.4, 0.41, 0.42, 0.0, 0.0];
        // only cycles 2..=5 (0-based) have nonzero neighbours; none spike
        assert_eq!(count_bubbles(&rates, &HashSet::new()), (4, 0));
    }

    #[test]
    fn single_bubble() {
        let rates = [0.1, 0.1, 0.5, 0.1, 0.1, 0.1, 0.1];
        assert_eq!(count_bubbles(&rates, &HashSet::new()), (4, 1));

        // excluding the spiking cycle (1-based cycle 3) removes it entirely
        let excluded: HashSet<u16> = [3].iter().cloned().collect();
        assert_eq!(count_bubbles(&rates, &excluded), (3, 0));
    }

    #[test]
    fn short_series() {
        assert_eq!(count_bubbles(&[], &HashSet::new()), (0, 0));
        assert_eq!(count_bubbles(&[0.1, 0.9, 0.1], &HashSet::new()), (0, 0));
        assert_eq!(count_bubbles(&[0.1, 0.9, 0.1, 0.1], &HashSet::new()), (1, 1));
    }

    #[test]
    fn flowcell_bubbles() {
        let mut records = series(1, 1101, &[0.1, 0.1, 0.5, 0.1, 0.1, 0.1, 0.1]);
        records.extend(series(1, 1102, &[0.1; 7]));

        let bubbles = bubble_counter(&records, &HashSet::new()).unwrap();
        assert_eq!(bubbles.total_valid_cycles, 8);
        assert_eq!(bubbles.grid.get(1, 1101).unwrap().bubbles, 1);
        assert_eq!(bubbles.grid.get(1, 1102).unwrap().bubbles, 0);
        assert_eq!(bubbles.grid.get(1, 1101).unwrap().error_rates.len(), 7);

        let summary = bubble_summary(&bubbles);
        assert_eq!(
            summary,
            BubbleSummary {
                bubbled_tiles: 1,
                total_bubbles: 1,
                total_valid_cycles: 8,
                bubble_rate: 0.125,
                mean_in_bubbled_tiles: 1.0,
                mean_in_all_tiles: 0.5,
            }
        );
    }

    #[test]
    fn by_cycle_ignores_arrival_order() {
        let mut records = series(1, 1101, &[0.1, 0.1, 0.5, 0.1, 0.1, 0.1, 0.1]);
        records.reverse();

        let bubbles = bubble_counter(&records, &HashSet::new()).unwrap();
        let cell = bubbles.grid.get(1, 1101).unwrap();
        assert_eq!(cell.error_rates, vec![0.1, 0.1, 0.5, 0.1, 0.1, 0.1, 0.1]);
        assert_eq!(cell.bubbles, 1);
    }

    #[test]
    fn empty_summary() {
        let bubbles = bubble_counter(&[], &HashSet::new()).unwrap();
        assert_eq!(bubbles.total_valid_cycles, 0);
        assert_eq!(bubble_summary(&bubbles), BubbleSummary::default());
    }

    #[test]
    fn cycle_zero_is_out_of_range() {
        let records = vec![record(1, 1101, 0, 0.1), record(1, 1101, 1, 0.1)];
        match bubble_counter(&records, &HashSet::new()) {
            Err(InteropError::IndexOutOfRange { cycle: 0, .. }) => (),
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn tile_means() {
        let mut records = series(1, 1101, &[0.1, 0.3]);
        records.extend(series(2, 1213, &[0.5, 0.5, 0.5]));

        let grid = error_rate_by_tile(&records, None).unwrap();
        let dim = grid.dimension();
        assert_eq!((dim.surfaces, dim.swaths, dim.positions), (1, 2, 13));
        assert_eq!(dim.lanes, vec![1, 2]);

        let t = grid.get(1, 1101).unwrap();
        assert_eq!(t.error_rates, vec![0.1, 0.3]);
        assert!(close(t.mean, 0.2));
        assert!(close(t.stdev, 0.1));

        let t = grid.get(2, 1213).unwrap();
        assert!(close(t.mean, 0.5));
        assert!(close(t.stdev, 0.0));

        // unreported tiles carry their tile number and zero stats
        let t = grid.get(1, 1202).unwrap();
        assert_eq!(t.tile, 1202);
        assert_eq!(t.reported, 0);
        assert_eq!((t.mean, t.stdev), (0.0, 0.0));
    }

    #[test]
    fn unreported_tiles_on_small_swaths() {
        let mut records = series(1, 1101, &[0.1]);
        records.extend(series(1, 1203, &[0.3]));

        let grid = error_rate_by_tile(&records, None).unwrap();
        assert_eq!(grid.dimension().positions, 3);
        for &tile in &[1101, 1102, 1103, 1201, 1202, 1203] {
            assert_eq!(grid.get(1, tile).unwrap().tile, tile);
        }

        let blank = blank_tile_map(grid.dimension());
        assert_eq!(blank.get(1, 1102).unwrap().tile, 1102);
    }

    #[test]
    fn every_record_fits_its_own_dimensions() {
        let records: Vec<_> = [1101u16, 1102, 1213, 2101, 2306, 1310]
            .iter()
            .enumerate()
            .map(|(i, &tile)| record(i as u16 % 3 + 1, tile, 1, tile as f32 / 10_000.0))
            .collect();

        let grid = error_rate_by_tile(&records, None).unwrap();
        for r in records.iter() {
            let cell = grid.get(r.ltc.lane, r.ltc.tile).unwrap();
            assert_eq!(cell.tile, r.ltc.tile);
            assert_eq!(cell.error_rates, vec![r.error_rate]);
        }
    }

    #[test]
    fn layout_override() {
        let records = series(1, 1101, &[0.2, 0.2]);
        let layout = TileLayout {
            surfaces: 2,
            swaths: 3,
            positions: 14,
            position_digits: 2,
        };

        let grid = error_rate_by_tile(&records, Some(&layout)).unwrap();
        assert_eq!(grid.len(), 2 * 3 * 14);
        assert_eq!(grid.get(1, 2314).unwrap().tile, 2314);

        let small = TileLayout {
            surfaces: 1,
            swaths: 1,
            positions: 1,
            position_digits: 2,
        };
        let records = series(1, 1102, &[0.2]);
        match error_rate_by_tile(&records, Some(&small)) {
            Err(InteropError::IndexOutOfRange { tile: 1102, .. }) => (),
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn deterministic_grids() {
        let mut records = series(1, 1101, &[0.1, 0.3, 0.2]);
        records.extend(series(3, 2205, &[0.4, 0.1]));
        records.extend(series(1, 1204, &[0.7]));

        let first = error_rate_by_tile(&records, None).unwrap();
        let second = error_rate_by_tile(&records, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn blank_map() {
        let dim = TileDimension {
            surfaces: 2,
            swaths: 2,
            positions: 12,
            position_digits: 2,
            max_cycle: 0,
            lanes: vec![1, 2],
        };
        let grid = blank_tile_map(&dim);
        assert_eq!(grid.len(), 2 * 2 * 2 * 12);
        assert_eq!(grid.get(2, 2105).unwrap().tile, 2105);
        assert_eq!(grid.get(1, 1212).unwrap().tile, 1212);
        assert!(grid.values().all(|t| t.error_rates.is_empty() && t.reported == 0));
    }

    #[test]
    fn lane_stat() {
        let mut records = series(1, 1101, &[0.1, 0.2, 0.3]);
        records.extend(series(2, 1101, &[5.0, 5.0, 5.0]));

        let (mean, stdev) = lane_error_rate_stat(&records, 1, None);
        assert!((mean - 0.2).abs() < 1e-6);
        assert!((stdev - (0.02f64 / 3.0).sqrt()).abs() < 1e-6);

        let cycles: HashSet<u16> = [1, 3].iter().cloned().collect();
        let (mean, _) = lane_error_rate_stat(&records, 1, Some(&cycles));
        assert!((mean - 0.2).abs() < 1e-6);

        assert_eq!(lane_error_rate_stat(&records, 4, None), (0.0, 0.0));
    }
}
