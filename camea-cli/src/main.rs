//!
//! This binary provides a CLI for converting and inspecting CAMEA scan files.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand};

use camea_algorithms::convert;
use camea_io::{read_scan, write_converted, Provenance, SchemaMap};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    CameaIo(#[from] camea_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] camea_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// CAMEA multiplexing-spectrometer data reduction.
#[derive(Parser)]
#[command(name = "camea")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert raw scan files to (Qx, Qy, dE) artifacts
    Convert {
        /// Input scan file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Calibration binning resolution (software pixels per energy channel)
        #[arg(short, long, default_value = "8")]
        binning: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show metadata of a raw scan file
    Info {
        /// Input scan file
        input: PathBuf,

        /// Calibration binning resolution to load
        #[arg(short, long, default_value = "8")]
        binning: usize,

        /// Emit JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            save,
            binning,
            verbose,
        } => {
            if verbose {
                eprintln!("Converting {} file(s)...", input.len());
                eprintln!("Binning: {}", binning);
            }

            let map = SchemaMap::default();
            let start = Instant::now();
            let mut total_points = 0usize;

            for path in &input {
                if verbose {
                    eprintln!("Reading: {}", path.display());
                }
                let scan = read_scan(path, &map, binning)?;
                let data = convert(&scan)?;
                total_points += data.len();

                let output = output_path(path, save.as_deref());
                let slice = scan.calibration().get(binning)?;
                let provenance = Provenance {
                    date: timestamp(),
                    ..Provenance::default()
                };
                write_converted(&output, &map, &data, slice, &provenance)?;

                if verbose {
                    let (points, detectors, pixels) = data.dim();
                    eprintln!(
                        "  {} scan points x {} detectors x {} software pixels",
                        points, detectors, pixels
                    );
                    eprintln!("  Wrote: {}", output.display());
                }
            }

            let elapsed = start.elapsed();
            println!(
                "Converted {} files ({} points) in {:.2}s",
                input.len(),
                total_points,
                elapsed.as_secs_f64()
            );
        }

        Commands::Info {
            input,
            binning,
            json,
        } => {
            let map = SchemaMap::default();
            let scan = read_scan(&input, &map, binning)?;
            let cell = scan.sample().cell().as_array();
            let a3 = scan.a3();
            let a3_range = if a3.is_empty() {
                (f64::NAN, f64::NAN)
            } else {
                (
                    a3.iter().copied().fold(f64::INFINITY, f64::min),
                    a3.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                )
            };

            if json {
                let value = serde_json::json!({
                    "file": scan.name(),
                    "scan_command": scan.scan_command(),
                    "scan_points": scan.scan_points(),
                    "detectors": scan.detectors(),
                    "raw_pixels": scan.raw_pixels(),
                    "binning": scan.binning(),
                    "ei_mev": scan.ei().to_vec(),
                    "a3_range_deg": [a3_range.0, a3_range.1],
                    "a3_offset_deg": scan.a3_offset(),
                    "a4_offset_deg": scan.a4_offset(),
                    "monitor_total": scan.monitor().sum(),
                    "temperature_k": scan.temperature(),
                    "sample": {
                        "name": scan.sample().name(),
                        "unit_cell": cell,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("File: {}", input.display());
                println!("Scan command: {}", scan.scan_command());
                println!(
                    "Points: {} x {} detectors x {} raw pixels",
                    scan.scan_points(),
                    scan.detectors(),
                    scan.raw_pixels()
                );
                println!("Binning: {}", scan.binning());
                println!("Ei: {:.4} meV", scan.ei_at(0));
                println!("A3 range: {:.3} - {:.3} deg", a3_range.0, a3_range.1);
                println!(
                    "Offsets: A3 {:.3} deg, A4 {:.3} deg",
                    scan.a3_offset(),
                    scan.a4_offset()
                );
                println!("Monitor total: {}", scan.monitor().sum());
                if let Some(t) = scan.temperature() {
                    println!("Temperature: {:.2} K", t);
                }
                println!("Sample: {}", scan.sample().name());
                println!(
                    "Unit cell: a={} b={} c={} alpha={} beta={} gamma={}",
                    cell[0], cell[1], cell[2], cell[3], cell[4], cell[5]
                );
            }
        }
    }

    Ok(())
}

/// Output path for a converted artifact: same stem, `.nxs` extension,
/// placed in `save` when given and next to the input otherwise.
fn output_path(input: &std::path::Path, save: Option<&std::path::Path>) -> PathBuf {
    let mut name = input
        .file_stem()
        .map_or_else(|| "converted".into(), |s| s.to_os_string());
    name.push(".nxs");
    match save {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("{} (unix seconds)", d.as_secs()),
        Err(_) => String::new(),
    }
}
