//! interop_summary prints per-lane summaries of the InterOp metric files from
//! one sequencing run: error rates and bubbles, quality scores, tile metric
//! averages and sub-tile statistics.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{value_t, values_t, App, Arg, ArgGroup};
use log::info;
use rayon::ThreadPoolBuilder;

use interop::error_metrics::{self, ErrorMetrics};
use interop::grid_metrics::{FwhmGridMetrics, PfGridMetrics};
use interop::quality_metrics::{self, QualityMetrics};
use interop::subtile::{SubtileMetric, SubtileStats};
use interop::tile_metrics::{self, TileMetrics, TileMetricsFile};
use interop::{decode_pair, MetricsFile};

fn print_error_summary(file: &MetricsFile<ErrorMetrics>, excluded: &HashSet<u16>) {
    println!("lane\terror_rate_mean\terror_rate_stdev");
    for lane in interop::geometry::lane_max_cycle(&file.records).keys() {
        let (mean, stdev) = error_metrics::lane_error_rate_stat(&file.records, *lane, None);
        println!("{}\t{:.4}\t{:.4}", lane, mean, stdev);
    }

    let bubbles = error_metrics::bubble_counter(&file.records, excluded)
        .unwrap_or_else(|e| panic!("Error counting bubbles: {}", e));
    let summary = error_metrics::bubble_summary(&bubbles);
    println!("bubbled_tiles\ttotal_bubbles\tvalid_cycles\tbubble_rate\tmean_bubbled\tmean_all");
    println!(
        "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}",
        summary.bubbled_tiles,
        summary.total_bubbles,
        summary.total_valid_cycles,
        summary.bubble_rate,
        summary.mean_in_bubbled_tiles,
        summary.mean_in_all_tiles
    );
}

fn print_quality_summary(file: &MetricsFile<QualityMetrics>) {
    let sums = quality_metrics::lane_sum(&file.records, None);
    println!("lane\tq_mean\tq_stdev\texpected_error_mean\tpercent_q30");
    for &lane in sums.keys() {
        let (mean, stdev) = quality_metrics::quality_stat(&sums, lane);
        let (error_mean, _) = quality_metrics::expected_error_rate_stat(&sums, lane);
        let q30 = quality_metrics::percent_at_or_above(&sums, lane, 30);
        println!(
            "{}\t{:.2}\t{:.2}\t{:.6}\t{:.2}",
            lane, mean, stdev, error_mean, q30
        );
    }
}

fn print_tile_summary(file: &TileMetricsFile) {
    match file {
        TileMetricsFile::Coded(coded) => print_tile_codes(coded),
        TileMetricsFile::Rta3(_) => {
            println!("lane\tcluster_density\tcluster_density_pf");
            for (lane, (raw, pf)) in file.density_by_lane() {
                println!("{}\t{:.1}\t{:.1}", lane, raw, pf);
            }
        }
    }
}

fn print_tile_codes(file: &MetricsFile<TileMetrics>) {
    let codes = [
        tile_metrics::CLUSTER_DENSITY,
        tile_metrics::CLUSTER_DENSITY_PF,
        tile_metrics::NUM_CLUSTERS,
        tile_metrics::NUM_CLUSTERS_PF,
    ];

    print!("lane");
    for &code in &codes {
        print!("\t{}", tile_metrics::metric_code_name(code));
    }
    println!();

    for lane in tile_metrics::lanes_sorted(&file.records) {
        print!("{}", lane);
        for &code in &codes {
            print!("\t{:.1}", tile_metrics::code_avg_by_lane(&file.records, lane, code));
        }
        println!();
    }
}

fn print_subtile_summary(stats: &SubtileStats) {
    println!("metric\tlane\taxis\tbin\tq1\tmedian\tq3\toutliers");
    for (metric, bins) in &stats.metrics {
        for (axis, lanes) in &[("x", &bins.x_bins), ("y", &bins.y_bins)] {
            for (lane, bin_stats) in lanes.iter() {
                for b in bin_stats {
                    println!(
                        "{}\t{}\t{}\t{}\t{:.3}\t{:.3}\t{:.3}\t{}",
                        metric,
                        lane,
                        axis,
                        b.bin,
                        b.stat.q1,
                        b.stat.q2,
                        b.stat.q3,
                        b.stat.outliers.len()
                    );
                }
            }
        }
    }

    if let Some(pf) = stats.get(SubtileMetric::PfFraction) {
        info!("PF fraction summarised for {} lanes", pf.x_bins.len());
    }
}

/// Parses command line arguments and prints the summaries
fn main() {
    env_logger::init();

    let matches = App::new("interop_summary")
        .version(clap::crate_version!())
        .arg(Arg::with_name("error-metrics")
            .long("error-metrics")
            .help("path to ErrorMetricsOut.bin")
            .takes_value(true))
        .arg(Arg::with_name("quality-metrics")
            .long("quality-metrics")
            .help("path to QMetricsOut.bin")
            .takes_value(true))
        .arg(Arg::with_name("tile-metrics")
            .long("tile-metrics")
            .help("path to TileMetricsOut.bin")
            .takes_value(true))
        .arg(Arg::with_name("pf-grid")
            .long("pf-grid")
            .help("path to PFGridMetricsOut.bin")
            .takes_value(true))
        .arg(Arg::with_name("fwhm-grid")
            .long("fwhm-grid")
            .help("path to FWHMGridMetricsOut.bin, summarised alongside --pf-grid")
            .takes_value(true)
            .requires("pf-grid"))
        .arg(Arg::with_name("exclude-cycles")
            .long("exclude-cycles")
            .help("comma-separated cycles ignored by bubble detection")
            .takes_value(true)
            .use_delimiter(true))
        .arg(Arg::with_name("threads")
            .long("threads")
            .help("number of threads used for decoding and aggregation")
            .default_value("4")
            .takes_value(true))
        .group(ArgGroup::with_name("metrics")
            .args(&["error-metrics", "quality-metrics", "tile-metrics", "pf-grid"])
            .multiple(true)
            .required(true))
        .get_matches();

    let threads = value_t!(matches, "threads", usize).unwrap_or_else(|e| e.exit());
    let excluded: HashSet<u16> = if matches.is_present("exclude-cycles") {
        values_t!(matches, "exclude-cycles", u16)
            .unwrap_or_else(|e| e.exit())
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    ThreadPoolBuilder::new().num_threads(threads).build_global()
        .unwrap_or_else(|e| panic!("Error configuring global threadpool: {}", e));

    let error_path = matches.value_of("error-metrics").map(PathBuf::from);
    let quality_path = matches.value_of("quality-metrics").map(PathBuf::from);

    match (error_path, quality_path) {
        (Some(error_path), Some(quality_path)) => {
            let (errors, quality) =
                decode_pair::<ErrorMetrics, QualityMetrics>(&error_path, &quality_path)
                    .unwrap_or_else(|e| panic!("Error reading metrics: {}", e));
            print_error_summary(&errors, &excluded);
            print_quality_summary(&quality);
        }
        (Some(error_path), None) => {
            let errors = MetricsFile::<ErrorMetrics>::from_path(&error_path)
                .unwrap_or_else(|e| panic!("Error reading error metrics: {}", e));
            print_error_summary(&errors, &excluded);
        }
        (None, Some(quality_path)) => {
            let quality = MetricsFile::<QualityMetrics>::from_path(&quality_path)
                .unwrap_or_else(|e| panic!("Error reading quality metrics: {}", e));
            print_quality_summary(&quality);
        }
        (None, None) => (),
    }

    if let Some(tile_path) = matches.value_of("tile-metrics") {
        let tiles = TileMetricsFile::from_path(&PathBuf::from(tile_path))
            .unwrap_or_else(|e| panic!("Error reading tile metrics: {}", e));
        print_tile_summary(&tiles);
    }

    if let Some(pf_path) = matches.value_of("pf-grid") {
        let pf_path = PathBuf::from(pf_path);
        let stats = match matches.value_of("fwhm-grid") {
            Some(fwhm_path) => {
                let (pf, fwhm) = decode_pair::<PfGridMetrics, FwhmGridMetrics>(
                    &pf_path,
                    &PathBuf::from(fwhm_path),
                )
                .unwrap_or_else(|e| panic!("Error reading grid metrics: {}", e));
                SubtileStats::build(&pf, Some(&fwhm), None)
            }
            None => {
                let pf = MetricsFile::<PfGridMetrics>::from_path(&pf_path)
                    .unwrap_or_else(|e| panic!("Error reading grid metrics: {}", e));
                SubtileStats::build(&pf, None, None)
            }
        };

        let stats = stats.unwrap_or_else(|e| panic!("Error building sub-tile statistics: {}", e));
        print_subtile_summary(&stats);
    }
}
