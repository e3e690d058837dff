//! Forecast cycle converter.
//!
//! Groups a directory of GDPS or GFS GRIB2 files by forecast cycle and
//! writes one Zarr dataset per cycle.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use forecast_assembly::{AssemblyConfig, CycleConverter, CycleFilter, Product};

#[derive(Parser, Debug)]
#[command(name = "forecast-convert")]
#[command(about = "Assemble forecast GRIB2 files into one dataset per cycle")]
struct Args {
    /// Directory holding the source files
    #[arg(short, long, env = "FORECAST_INPUT_DIR")]
    input: PathBuf,

    /// Output directory (default: output_dir from the config file)
    #[arg(short, long, env = "FORECAST_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long, env = "FORECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Source product (gdps or gfs), overrides the config file
    #[arg(short, long)]
    product: Option<String>,

    /// Cycles converted in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// First cycle day to convert (YYYY-MM-DD or YYYYMMDD)
    #[arg(long, value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Last cycle day to convert, inclusive
    #[arg(long, value_parser = parse_date)]
    end: Option<NaiveDate>,

    /// Only convert cycles initialised at this time (HH, HHMM or HH:MM)
    #[arg(long, value_parser = parse_time_of_day)]
    time_of_day: Option<NaiveTime>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level, &args.log_format)?;

    let config = load_config(&args)?;
    let output = args
        .output
        .clone()
        .or_else(|| config.output_dir.clone())
        .context("No output directory: pass --output or set output_dir in the config")?;

    info!(
        product = %config.product,
        variables = ?config.enabled_variables(),
        required = ?config.required,
        compression = %config.store.compression,
        "Loaded configuration"
    );

    let filter = CycleFilter {
        start: args.start,
        end: args.end,
        time_of_day: args.time_of_day,
    };
    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        if start > end {
            bail!("--start {} is after --end {}", start, end);
        }
    }

    let converter = CycleConverter::new(config)?;
    let report = converter
        .run_batch(&args.input, &output, &filter, args.jobs.max(1))
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    for written in &report.written {
        info!(
            cycle = %written.reference_time,
            path = %written.path.display(),
            variables = ?written.variables,
            "Wrote cycle"
        );
        for omitted in &written.omitted {
            warn!(
                cycle = %written.reference_time,
                variable = %omitted.variable,
                reason = %omitted.reason,
                "Variable omitted"
            );
        }
    }
    for failure in &report.failed {
        error!(cycle = %failure.reference_time, error = %failure.error, "Cycle not converted");
    }

    if !report.is_success() {
        bail!(
            "{} of {} cycles failed",
            report.failed.len(),
            report.failed.len() + report.written.len()
        );
    }

    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
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

    if format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<AssemblyConfig> {
    let mut config = match (&args.config, &args.product) {
        (Some(path), _) => AssemblyConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, Some(product)) => AssemblyConfig::new(product.parse::<Product>()?),
        (None, None) => bail!("Pass --product or --config"),
    };

    if let (Some(_), Some(product)) = (&args.config, &args.product) {
        let product: Product = product.parse()?;
        if product != config.product {
            info!(from = %config.product, to = %product, "Product overridden on the command line");
            config.product = product;
            config.variables.clear();
            config.required.clear();
        }
    }

    config.store = config.store.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD or YYYYMMDD", s))
}

fn parse_time_of_day(s: &str) -> std::result::Result<NaiveTime, String> {
    let digits: String = s.chars().filter(|c| *c != ':').collect();
    let (hour, minute) = match digits.len() {
        1 | 2 => (digits.as_str(), "0"),
        4 => digits.split_at(2),
        _ => return Err(format!("invalid time of day '{}'", s)),
    };
    let hour: u32 = hour.parse().map_err(|_| format!("invalid hour in '{}'", s))?;
    let minute: u32 = minute.parse().map_err(|_| format!("invalid minute in '{}'", s))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| format!("invalid time of day '{}'", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_date("2024-01-05").unwrap(), expected);
        assert_eq!(parse_date("20240105").unwrap(), expected);
        assert!(parse_date("05/01/2024").is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("12").unwrap(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(parse_time_of_day("0").unwrap(), NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(parse_time_of_day("0630").unwrap(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(parse_time_of_day("18:00").unwrap(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert!(parse_time_of_day("25").is_err());
        assert!(parse_time_of_day("123").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "forecast-convert",
            "--input",
            "/data/in",
            "--output",
            "/data/out",
            "--product",
            "gfs",
            "--jobs",
            "4",
            "--start",
            "2024-01-01",
            "--time-of-day",
            "06",
        ])
        .unwrap();

        assert_eq!(args.jobs, 4);
        assert_eq!(args.start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(args.time_of_day, NaiveTime::from_hms_opt(6, 0, 0));

        let config = load_config(&args).unwrap();
        assert_eq!(config.product, Product::Gfs);
    }

    #[test]
    fn test_load_config_requires_product() {
        let args = Args::try_parse_from(["forecast-convert", "--input", "/data/in"]).unwrap();
        if args.config.is_none() {
            assert!(load_config(&args).is_err());
        }
    }
}
