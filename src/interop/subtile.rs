//! Per-lane box-whisker statistics over the sub-tile bins of the PF and FWHM
//! grid files. Every value of every tile in a lane is pooled by its X bin and,
//! separately, by its Y bin.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use rayon::prelude::*;

use crate::box_whisker::BoxWhiskerStat;
use crate::decoder::MetricsFile;
use crate::error::{InteropError, Result};
use crate::geometry::{LaneTileKey, LaneTileSet};
use crate::grid_metrics::{FwhmGridMetrics, PfGridMetrics, FWHM_CHANNELS};

/// FWHM channel order in the grid file
pub const FWHM_CHANNEL_NAMES: [&str; FWHM_CHANNELS] = ["A", "G", "C", "T"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubtileMetric {
    ClusterRaw,
    ClusterPf,
    /// PF clusters over raw clusters
    PfFraction,
    /// k clusters / mm²
    DensityRaw,
    DensityPf,
    /// mean FWHM across the channels in use
    FwhmAll,
    FwhmChannel(u8),
}

impl fmt::Display for SubtileMetric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubtileMetric::ClusterRaw => write!(f, "Cluster Raw"),
            SubtileMetric::ClusterPf => write!(f, "Cluster PF"),
            SubtileMetric::PfFraction => write!(f, "PF"),
            SubtileMetric::DensityRaw => write!(f, "Density Raw"),
            SubtileMetric::DensityPf => write!(f, "Density PF"),
            SubtileMetric::FwhmAll => write!(f, "FWHM"),
            SubtileMetric::FwhmChannel(c) => match FWHM_CHANNEL_NAMES.get(*c as usize) {
                Some(name) => write!(f, "FWHM {}", name),
                None => write!(f, "FWHM channel {}", c),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinStat {
    /// 0-based bin along the axis
    pub bin: u16,
    pub stat: BoxWhiskerStat,
}

/// lane -> per-bin stats, bins ascending
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BinStatMap {
    pub x_bins: BTreeMap<u16, Vec<BinStat>>,
    pub y_bins: BTreeMap<u16, Vec<BinStat>>,
}

/// Pool `value(record, x, y)` by lane and bin, then summarise each pool
fn bin_stats<T, F>(records: &[T], num_x: u16, num_y: u16, value: F) -> BinStatMap
where
    T: LaneTileKey,
    F: Fn(&T, u16, u16) -> f64,
{
    let mut x_samples: BTreeMap<u16, Vec<Vec<f64>>> = BTreeMap::new();
    let mut y_samples: BTreeMap<u16, Vec<Vec<f64>>> = BTreeMap::new();

    for r in records {
        let xs = x_samples
            .entry(r.lane())
            .or_insert_with(|| vec![Vec::new(); num_x as usize]);
        let ys = y_samples
            .entry(r.lane())
            .or_insert_with(|| vec![Vec::new(); num_y as usize]);

        for x in 0..num_x {
            for y in 0..num_y {
                let v = value(r, x, y);
                xs[x as usize].push(v);
                ys[y as usize].push(v);
            }
        }
    }

    let summarise = |samples: BTreeMap<u16, Vec<Vec<f64>>>| {
        samples
            .into_iter()
            .map(|(lane, bins)| {
                let stats = bins
                    .into_iter()
                    .enumerate()
                    .map(|(bin, mut values)| BinStat {
                        bin: bin as u16,
                        stat: BoxWhiskerStat::from_samples(&mut values),
                    })
                    .collect();
                (lane, stats)
            })
            .collect()
    };

    BinStatMap {
        x_bins: summarise(x_samples),
        y_bins: summarise(y_samples),
    }
}

/// Every sub-tile statistic built from one PF grid file and, optionally, the
/// matching FWHM grid file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubtileStats {
    pub metrics: BTreeMap<SubtileMetric, BinStatMap>,
}

impl SubtileStats {
    /// The bin area must be non-zero and both files must share one bin layout
    pub fn validate(
        pf: &MetricsFile<PfGridMetrics>,
        fwhm: Option<&MetricsFile<FwhmGridMetrics>>,
    ) -> Result<()> {
        if pf.layout.bin_area == 0.0 {
            return Err(InteropError::GridMismatch("PF bin area is zero".to_string()));
        }

        if let Some(fwhm) = fwhm {
            if pf.layout.num_x != fwhm.layout.num_x as u16 {
                return Err(InteropError::GridMismatch(format!(
                    "PF X bins ({}) differ from FWHM X bins ({})",
                    pf.layout.num_x, fwhm.layout.num_x
                )));
            }
            if pf.layout.num_y != fwhm.layout.num_y as u16 {
                return Err(InteropError::GridMismatch(format!(
                    "PF Y bins ({}) differ from FWHM Y bins ({})",
                    pf.layout.num_y, fwhm.layout.num_y
                )));
            }
        }

        Ok(())
    }

    /// Build every statistic concurrently, restricted to `allow` if given.
    ///
    /// All builders run to completion before any error is reported; the
    /// error returned is the first in builder order.
    pub fn build(
        pf: &MetricsFile<PfGridMetrics>,
        fwhm: Option<&MetricsFile<FwhmGridMetrics>>,
        allow: Option<&LaneTileSet>,
    ) -> Result<Self> {
        SubtileStats::validate(pf, fwhm)?;

        // only a filtered copy is owned
        let pf = match allow {
            Some(allow) => Cow::Owned(pf.filter_by_lane_tile(allow)),
            None => Cow::Borrowed(pf),
        };
        let fwhm = fwhm.map(|fwhm| match allow {
            Some(allow) => Cow::Owned(fwhm.filter_by_lane_tile(allow)),
            None => Cow::Borrowed(fwhm),
        });

        let mut jobs = vec![
            SubtileMetric::ClusterRaw,
            SubtileMetric::ClusterPf,
            SubtileMetric::PfFraction,
            SubtileMetric::DensityRaw,
            SubtileMetric::DensityPf,
        ];
        if let Some(ref fwhm) = fwhm {
            jobs.push(SubtileMetric::FwhmAll);
            for c in 0..fwhm.layout.stored_channels() {
                jobs.push(SubtileMetric::FwhmChannel(c as u8));
            }
        }
        debug!(
            "building {} sub-tile statistics from {} PF tiles",
            jobs.len(),
            pf.len()
        );

        let results: Vec<Result<(SubtileMetric, BinStatMap)>> = jobs
            .par_iter()
            .map(|&metric| {
                build_metric(metric, &pf, fwhm.as_deref()).map(|stats| (metric, stats))
            })
            .collect();

        let metrics = results.into_iter().collect::<Result<BTreeMap<_, _>>>()?;
        Ok(SubtileStats { metrics })
    }

    pub fn get(&self, metric: SubtileMetric) -> Option<&BinStatMap> {
        self.metrics.get(&metric)
    }
}

fn build_metric(
    metric: SubtileMetric,
    pf: &MetricsFile<PfGridMetrics>,
    fwhm: Option<&MetricsFile<FwhmGridMetrics>>,
) -> Result<BinStatMap> {
    let layout = pf.layout;
    let area = layout.bin_area as f64;
    let (nx, ny) = (layout.num_x, layout.num_y);

    let stats = match metric {
        SubtileMetric::ClusterRaw => bin_stats(&pf.records, nx, ny, |r, x, y| {
            r.raw[layout.index(x, y)] as f64
        }),
        SubtileMetric::ClusterPf => bin_stats(&pf.records, nx, ny, |r, x, y| {
            r.pf[layout.index(x, y)] as f64
        }),
        SubtileMetric::PfFraction => bin_stats(&pf.records, nx, ny, |r, x, y| {
            let i = layout.index(x, y);
            if r.raw[i] == 0 {
                0.0
            } else {
                r.pf[i] as f64 / r.raw[i] as f64
            }
        }),
        SubtileMetric::DensityRaw => bin_stats(&pf.records, nx, ny, |r, x, y| {
            let i = layout.index(x, y);
            if r.raw[i] == 0 {
                0.0
            } else {
                r.raw[i] as f64 / area / 1000.0
            }
        }),
        SubtileMetric::DensityPf => bin_stats(&pf.records, nx, ny, |r, x, y| {
            let i = layout.index(x, y);
            if r.raw[i] == 0 {
                0.0
            } else {
                r.pf[i] as f64 / area / 1000.0
            }
        }),
        SubtileMetric::FwhmAll | SubtileMetric::FwhmChannel(_) => {
            let fwhm = fwhm.ok_or_else(|| {
                InteropError::GridMismatch(format!("{} needs an FWHM grid", metric))
            })?;
            let fl = fwhm.layout;
            let (fx, fy) = (fl.num_x as u16, fl.num_y as u16);

            match metric {
                SubtileMetric::FwhmChannel(c) if c as usize >= fl.stored_channels() => {
                    return Err(InteropError::GridMismatch(format!(
                        "FWHM grid has no channel {}",
                        c
                    )));
                }
                SubtileMetric::FwhmChannel(c) => bin_stats(&fwhm.records, fx, fy, |r, x, y| {
                    r.channels[c as usize][fl.index(x, y)] as f64
                }),
                _ => {
                    let n = fl.stored_channels();
                    bin_stats(&fwhm.records, fx, fy, |r, x, y| {
                        if n == 0 {
                            return 0.0;
                        }
                        let i = fl.index(x, y);
                        let total: f64 = r.channels[..n].iter().map(|c| c[i] as f64).sum();
                        total / n as f64
                    })
                }
            }
        }
    };

    Ok(stats)
}
