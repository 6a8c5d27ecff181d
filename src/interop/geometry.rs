//! Tile coordinates: splitting a tile number into surface/swath/position,
//! finding the extent of a flowcell from its records, the lane/tile
//! allow-list, and the dense per-lane grid used by the aggregators.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::Read,
    iter::FromIterator,
};

use byteorder::{LittleEndian, ReadBytesExt};
use itertools::Itertools;
use ndarray::{Array4, ArrayView3};

use crate::error::{InteropError, Result};

/// The (lane, tile, cycle) key most records start with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Ltc {
    pub lane: u16,
    pub tile: u16,
    pub cycle: u16,
}

impl Ltc {
    pub fn new(lane: u16, tile: u16, cycle: u16) -> Self {
        Ltc { lane, tile, cycle }
    }

    /// Reads three little-endian `u16` values: lane, tile, cycle
    pub fn read<R: Read>(rdr: &mut R) -> std::io::Result<Self> {
        let lane = rdr.read_u16::<LittleEndian>()?;
        let tile = rdr.read_u16::<LittleEndian>()?;
        let cycle = rdr.read_u16::<LittleEndian>()?;
        Ok(Ltc { lane, tile, cycle })
    }
}

/// Access to the lane/tile (and, where present, cycle) of a record
pub trait LaneTileKey {
    fn lane(&self) -> u16;
    fn tile(&self) -> u16;
    /// 0 for records that are not per-cycle
    fn cycle(&self) -> u16 {
        0
    }
}

impl LaneTileKey for Ltc {
    fn lane(&self) -> u16 {
        self.lane
    }
    fn tile(&self) -> u16 {
        self.tile
    }
    fn cycle(&self) -> u16 {
        self.cycle
    }
}

/// Implements `LaneTileKey` for a record type holding an `ltc: Ltc` field
macro_rules! ltc_key {
    ($record:ty) => {
        impl $crate::geometry::LaneTileKey for $record {
            fn lane(&self) -> u16 {
                self.ltc.lane
            }
            fn tile(&self) -> u16 {
                self.ltc.tile
            }
            fn cycle(&self) -> u16 {
                self.ltc.cycle
            }
        }
    };
}

/// Implements `LaneTileKey` for a record type with plain `lane` and `tile` fields
macro_rules! lane_tile_key {
    ($record:ty) => {
        impl $crate::geometry::LaneTileKey for $record {
            fn lane(&self) -> u16 {
                self.lane
            }
            fn tile(&self) -> u16 {
                self.tile
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneTile {
    pub lane: u16,
    pub tile: u16,
}

/// Allow-list of (lane, tile) pairs used to restrict which records are aggregated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneTileSet {
    lanes: HashMap<u16, HashSet<u16>>,
}

impl LaneTileSet {
    pub fn new(pairs: &[LaneTile]) -> Self {
        pairs.iter().cloned().collect()
    }

    pub fn insert(&mut self, lane: u16, tile: u16) {
        self.lanes.entry(lane).or_insert_with(HashSet::new).insert(tile);
    }

    pub fn contains(&self, lane: u16, tile: u16) -> bool {
        self.lanes.get(&lane).map_or(false, |tiles| tiles.contains(&tile))
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.values().all(|tiles| tiles.is_empty())
    }
}

impl FromIterator<LaneTile> for LaneTileSet {
    fn from_iter<I: IntoIterator<Item = LaneTile>>(iter: I) -> Self {
        let mut set = LaneTileSet::default();
        for lt in iter {
            set.insert(lt.lane, lt.tile);
        }
        set
    }
}

/// Keep only the records whose (lane, tile) is in `allow`; the rest are dropped
pub fn filter_by_lane_tile<R: LaneTileKey + Clone>(records: &[R], allow: &LaneTileSet) -> Vec<R> {
    records
        .iter()
        .filter(|r| allow.contains(r.lane(), r.tile()))
        .cloned()
        .collect()
}

/// Where a tile sits within its lane. All three are 1-based as encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TilePosition {
    pub surface: u16,
    pub swath: u16,
    pub position: u16,
}

/// splits off the highest decimal digit: 1234 -> (1, 234)
fn split_leading_digit(n: u16) -> (u16, u16) {
    let mut lead = n;
    let mut tens = 1u16;
    while lead >= 10 {
        lead /= 10;
        tens *= 10;
    }
    (lead, n - lead * tens)
}

/// Split a tile number into surface, swath and position-in-swath.
///
/// The leading digit is the surface, the next leading digit of the remainder
/// is the swath, and whatever is left is the position: `2316` is surface 2,
/// swath 3, position 16.
pub fn decompose(tile: u16) -> TilePosition {
    let (surface, rest) = split_leading_digit(tile);
    let (swath, position) = split_leading_digit(rest);
    TilePosition {
        surface,
        swath,
        position,
    }
}

/// Extent of a flowcell as seen in a record set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileDimension {
    pub surfaces: u16,
    pub swaths: u16,
    /// tiles per swath
    pub positions: u16,
    /// digits the position takes in a tile number: 2 for `1101`
    pub position_digits: u16,
    pub max_cycle: u16,
    /// distinct lane numbers, ascending
    pub lanes: Vec<u16>,
}

/// A fixed surface/swath/position geometry that overrides what the records show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub surfaces: u16,
    pub swaths: u16,
    pub positions: u16,
    pub position_digits: u16,
}

impl TileDimension {
    /// Replace the surface/swath/position counts, keeping lanes and cycles
    pub fn with_layout(mut self, layout: &TileLayout) -> Self {
        self.surfaces = layout.surfaces;
        self.swaths = layout.swaths;
        self.positions = layout.positions;
        self.position_digits = layout.position_digits;
        self
    }

    pub fn tiles_per_lane(&self) -> usize {
        self.surfaces as usize * self.swaths as usize * self.positions as usize
    }
}

fn digit_count(n: u16) -> u16 {
    let mut digits = 1;
    let mut n = n / 10;
    while n > 0 {
        digits += 1;
        n /= 10;
    }
    digits
}

/// Single pass over `records` for the largest surface, swath, position and
/// cycle, the widest position field, and the sorted set of lanes
pub fn max_dimensions<R: LaneTileKey>(records: &[R]) -> TileDimension {
    let mut dim = records.iter().fold(TileDimension::default(), |mut dim, r| {
        let pos = decompose(r.tile());
        dim.surfaces = dim.surfaces.max(pos.surface);
        dim.swaths = dim.swaths.max(pos.swath);
        dim.positions = dim.positions.max(pos.position);
        // one digit each for surface and swath
        dim.position_digits = dim
            .position_digits
            .max(digit_count(r.tile()).saturating_sub(2));
        dim.max_cycle = dim.max_cycle.max(r.cycle());
        dim
    });

    dim.lanes = records.iter().map(|r| r.lane()).unique().sorted().collect();
    dim
}

/// Highest cycle reported per lane. Lane 0 marks an unset record and is skipped.
pub fn lane_max_cycle<R: LaneTileKey>(records: &[R]) -> BTreeMap<u16, u16> {
    let mut max_cycle = BTreeMap::new();
    for r in records.iter().filter(|r| r.lane() != 0) {
        let c = max_cycle.entry(r.lane()).or_insert(0);
        *c = (*c).max(r.cycle());
    }
    max_cycle
}

/// Dense `lane -> [surface][swath][position]` storage for one aggregation pass.
///
/// Cells are addressed by lane number and tile number; both are translated to
/// 0-based indices through the dimension the grid was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowcellGrid<T> {
    dim: TileDimension,
    lane_index: Vec<Option<usize>>,
    cells: Array4<T>,
}

impl<T> FlowcellGrid<T> {
    /// Build a grid with one cell per (lane, surface, swath, position) of `dim`,
    /// each initialised by `init(lane, position)` with 1-based coordinates
    pub fn from_fn<F>(dim: &TileDimension, mut init: F) -> Self
    where
        F: FnMut(u16, TilePosition) -> T,
    {
        let max_lane = dim.lanes.iter().cloned().max().unwrap_or(0) as usize;
        let mut lane_index = vec![None; max_lane + 1];
        for (i, &lane) in dim.lanes.iter().enumerate() {
            lane_index[lane as usize] = Some(i);
        }

        let lanes = &dim.lanes;
        let shape = (
            lanes.len(),
            dim.surfaces as usize,
            dim.swaths as usize,
            dim.positions as usize,
        );
        let cells = Array4::from_shape_fn(shape, |(l, s, w, p)| {
            init(
                lanes[l],
                TilePosition {
                    surface: s as u16 + 1,
                    swath: w as u16 + 1,
                    position: p as u16 + 1,
                },
            )
        });

        FlowcellGrid {
            dim: dim.clone(),
            lane_index,
            cells,
        }
    }

    pub fn dimension(&self) -> &TileDimension {
        &self.dim
    }

    pub fn lanes(&self) -> &[u16] {
        &self.dim.lanes
    }

    /// 0-based `[lane, surface, swath, position]` index of a tile
    pub fn locate(&self, lane: u16, tile: u16) -> Result<[usize; 4]> {
        let out_of_range = || InteropError::IndexOutOfRange {
            lane,
            tile,
            cycle: 0,
        };

        let l = self
            .lane_index
            .get(lane as usize)
            .cloned()
            .flatten()
            .ok_or_else(out_of_range)?;

        let pos = decompose(tile);
        if pos.surface == 0
            || pos.swath == 0
            || pos.position == 0
            || pos.surface > self.dim.surfaces
            || pos.swath > self.dim.swaths
            || pos.position > self.dim.positions
        {
            return Err(out_of_range());
        }

        Ok([
            l,
            pos.surface as usize - 1,
            pos.swath as usize - 1,
            pos.position as usize - 1,
        ])
    }

    pub fn get(&self, lane: u16, tile: u16) -> Result<&T> {
        let ix = self.locate(lane, tile)?;
        Ok(&self.cells[ix])
    }

    pub fn get_mut(&mut self, lane: u16, tile: u16) -> Result<&mut T> {
        let ix = self.locate(lane, tile)?;
        Ok(&mut self.cells[ix])
    }

    /// All cells of one lane as a `[surface][swath][position]` view
    pub fn lane(&self, lane: u16) -> Option<ArrayView3<'_, T>> {
        let l = self.lane_index.get(lane as usize).cloned().flatten()?;
        Some(self.cells.index_axis(ndarray::Axis(0), l))
    }

    /// Every cell with its lane number and 1-based position
    pub fn cells(&self) -> impl Iterator<Item = (u16, TilePosition, &T)> {
        let lanes = &self.dim.lanes;
        self.cells.indexed_iter().map(move |((l, s, w, p), cell)| {
            (
                lanes[l],
                TilePosition {
                    surface: s as u16 + 1,
                    swath: w as u16 + 1,
                    position: p as u16 + 1,
                },
                cell,
            )
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.cells.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Re-encode a position as a tile number, padding the position to the
    /// grid's position width
    pub fn tile_number(&self, pos: TilePosition) -> u16 {
        encode_tile(pos, self.dim.position_digits)
    }
}

/// `<surface><swath><position>` with the position zero-padded to
/// `position_digits`; 0 if the result does not fit a tile number
pub fn encode_tile(pos: TilePosition, position_digits: u16) -> u16 {
    let width = position_digits as usize;
    format!(
        "{}{}{:0width$}",
        pos.surface,
        pos.swath,
        pos.position,
        width = width
    )
    .parse()
    .unwrap_or(0)
}
