//! Forecast file downloader.
//!
//! Walks a model server's run folders and fetches the GRIB2 files of the
//! requested variables into the converter's input directory:
//! - One folder per lead time under each run hour (`00/`, `12/`)
//! - Substring matching on file names (`TMP_ISBL`, `DSWRF_SFC`, ...)
//! - Automatic retry with exponential backoff

mod download;
mod listing;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use download::{DownloadConfig, DownloadManager, FetchSummary};
use forecast_assembly::{Product, VariableKind};

const GDPS_URL: &str = "https://dd.weather.gc.ca/model_gem_global/25km/grib2/lat_lon/";

#[derive(Parser, Debug)]
#[command(name = "forecast-download")]
#[command(about = "Download GDPS forecast GRIB2 files by variable")]
struct Args {
    /// Model server directory holding the run folders
    #[arg(long, env = "FORECAST_SOURCE_URL", default_value = GDPS_URL)]
    base_url: String,

    /// Destination directory (the converter's input)
    #[arg(short, long, env = "FORECAST_INPUT_DIR")]
    dest: PathBuf,

    /// Variable key (e.g. temperature) or file name pattern (e.g. TMP_ISBL);
    /// repeatable, default: every GDPS variable
    #[arg(short, long = "variable")]
    variables: Vec<String>,

    /// Run hours to fetch
    #[arg(long, value_delimiter = ',', default_value = "00,12")]
    run_hours: Vec<String>,

    /// Maximum retry attempts per request
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "600")]
    timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if args.log_format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let patterns = file_patterns(&args.variables);
    info!(
        base_url = %args.base_url,
        run_hours = ?args.run_hours,
        patterns = ?patterns,
        dest = %args.dest.display(),
        "Starting download"
    );

    let manager = DownloadManager::new(DownloadConfig {
        max_retries: args.max_retries,
        request_timeout: Duration::from_secs(args.timeout_secs),
        ..Default::default()
    })?;

    let mut summary = FetchSummary::default();
    let mut listing_failures = 0usize;

    for run_hour in &args.run_hours {
        let folders = match manager.list_cycle_folders(&args.base_url, run_hour).await {
            Ok(folders) => folders,
            Err(e) => {
                error!(run_hour = %run_hour, error = %e, "Failed to list run");
                listing_failures += 1;
                continue;
            }
        };

        for folder in &folders {
            for pattern in &patterns {
                match manager.fetch_matching(folder, pattern, &args.dest).await {
                    Ok(fetched) => summary.merge(fetched),
                    Err(e) => {
                        error!(folder = %folder, pattern = %pattern, error = %e, "Failed to fetch folder");
                        listing_failures += 1;
                    }
                }
            }
        }
    }

    info!(
        downloaded = summary.downloaded.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "Download complete"
    );

    if listing_failures > 0 || !summary.failed.is_empty() {
        bail!(
            "{} files and {} listings failed",
            summary.failed.len(),
            listing_failures
        );
    }

    Ok(())
}

/// Map variable keys to their file name tokens; anything else is used as
/// a literal pattern.
fn file_patterns(variables: &[String]) -> Vec<String> {
    if variables.is_empty() {
        return Product::Gdps
            .variables()
            .iter()
            .filter_map(|kind| kind.file_token())
            .map(str::to_string)
            .collect();
    }

    variables
        .iter()
        .map(|v| {
            v.parse::<VariableKind>()
                .ok()
                .and_then(|kind| kind.file_token())
                .map(str::to_string)
                .unwrap_or_else(|| v.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns_cover_gdps() {
        assert_eq!(
            file_patterns(&[]),
            vec!["DSWRF_SFC", "TCDC_SFC", "TMP_ISBL", "WIND_TGL", "WDIR_TGL"]
        );
    }

    #[test]
    fn test_patterns_from_keys_and_literals() {
        let patterns = file_patterns(&["temperature".to_string(), "RH_ISBL".to_string()]);
        assert_eq!(patterns, vec!["TMP_ISBL", "RH_ISBL"]);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["forecast-download", "--dest", "/data/grib"]).unwrap();
        assert_eq!(args.run_hours, vec!["00", "12"]);
        assert_eq!(args.base_url, GDPS_URL);
        assert!(args.variables.is_empty());

        let args = Args::try_parse_from([
            "forecast-download",
            "--dest",
            "/data/grib",
            "--run-hours",
            "12",
            "-v",
            "ghi",
            "-v",
            "wind_speed",
        ])
        .unwrap();
        assert_eq!(args.run_hours, vec!["12"]);
        assert_eq!(file_patterns(&args.variables), vec!["DSWRF_SFC", "WIND_TGL"]);
    }
}
