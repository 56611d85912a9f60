use std::{error::Error, fs, path::Path};

use clap::Parser;
use log::{info, LevelFilter};
use marker_calib_pipeline::{
    run_marker_calibration, MarkerCalibConfig, MarkerCalibInput, MarkerCalibReport,
};

/// Multi-camera marker calibration: global camera and marker poses from
/// per-image marker detections.
#[derive(Debug, Parser)]
#[command(author, version, about = "Multi-camera marker pose calibration")]
struct Args {
    /// Path to JSON file containing MarkerCalibInput.
    #[arg(long)]
    input: String,

    /// Optional path to JSON MarkerCalibConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<String>,

    /// Log verbosity (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let value = serde_json::from_str(&data)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    Ok(value)
}

fn write_report_json(report: &MarkerCalibReport) -> Result<String, Box<dyn Error>> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn run_marker_calibration_from_files(
    input_path: &str,
    config_path: Option<&str>,
) -> Result<String, Box<dyn Error>> {
    let input: MarkerCalibInput = load_json_file(Path::new(input_path))?;

    let config = if let Some(cfg_path) = config_path {
        load_json_file::<MarkerCalibConfig>(Path::new(cfg_path))?
    } else {
        MarkerCalibConfig::default()
    };

    let report = run_marker_calibration(&input, &config)?;
    write_report_json(&report)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp(None)
        .init();

    let json = run_marker_calibration_from_files(&args.input, args.config.as_deref())?;
    match &args.output {
        Some(path) => {
            fs::write(path, json + "\n")
                .map_err(|e| format!("failed to write report to {path}: {e}"))?;
            info!("report written to {path}");
        }
        None => println!("{}", json),
    }
    Ok(())
}
