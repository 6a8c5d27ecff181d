//! Box-and-whisker summary of a sample set, using the median-of-halves
//! quartile method

use std::cmp::Ordering;

/// mean and population standard deviation; (0, 0) for an empty slice
pub fn mean_stat(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let devsum: f64 = values.iter().map(|v| (mean - v) * (mean - v)).sum();

    (mean, (devsum / n).sqrt())
}

/// `mean_stat` over `f32` samples, accumulated in `f64`
pub fn mean_stat_f32(values: &[f32]) -> (f32, f32) {
    let widened: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let (mean, stdev) = mean_stat(&widened);
    (mean as f32, stdev as f32)
}

/// middle element, or the average of the two middle elements for an even
/// count. `sorted` must be non-empty.
fn median(sorted: &[f64]) -> f64 {
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    } else {
        sorted[middle]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoxWhiskerStat {
    pub mean: f64,
    pub stdev: f64,
    pub q1: f64,
    /// median
    pub q2: f64,
    pub q3: f64,
    pub iqr: f64,
    /// `q1 - iqr`
    pub whisker_low: f64,
    /// `q3 + iqr`
    pub whisker_high: f64,
    /// samples further than `1.5 * iqr` beyond either whisker, ascending
    pub outliers: Vec<f64>,
}

impl BoxWhiskerStat {
    /// Summarise `samples`, sorting them in place. An empty slice gives an
    /// all-zero stat.
    pub fn from_samples(samples: &mut [f64]) -> Self {
        if samples.is_empty() {
            return BoxWhiskerStat::default();
        }

        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let (mean, stdev) = mean_stat(samples);

        let sz = samples.len();
        let middle = sz / 2;

        let q1 = if middle > 0 {
            median(&samples[..middle])
        } else {
            samples[0]
        };
        // a single sample has no upper half
        let q3 = if middle + 1 < sz {
            median(&samples[middle + 1..])
        } else {
            samples[0]
        };

        let iqr = q3 - q1;
        let whisker_low = q1 - iqr;
        let whisker_high = q3 + iqr;

        let outliers = samples
            .iter()
            .cloned()
            .filter(|&v| v < whisker_low - 1.5 * iqr || v > whisker_high + 1.5 * iqr)
            .collect();

        BoxWhiskerStat {
            mean,
            stdev,
            q1,
            q2: median(samples),
            q3,
            iqr,
            whisker_low,
            whisker_high,
            outliers,
        }
    }

    pub fn from_f32(samples: &[f32]) -> Self {
        let mut widened: Vec<f64> = samples.iter().map(|&v| v as f64).collect();
        BoxWhiskerStat::from_samples(&mut widened)
    }
}
