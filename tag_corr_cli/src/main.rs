use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use tag_corr::{
    correlate, filter_by_key, group_key, parse_instant, parse_position_records,
    parse_series_records, unique_keys, EnvironmentalSample, Field, Granularity, Params,
    PositionFix, SelectionReport,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track/environment correlation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Correlate one selected position fix against an environmental series
    Report(ReportArgs),
    /// List calendar buckets for the position selector
    Days(DaysArgs),
    /// Inspect a series file for field coverage and time range
    Diagnose(DiagnoseArgs),
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Position file (CSV with PositionFixTime/ObservationTime/Latitude/Longitude, or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    positions: PathBuf,

    /// Environmental series file (CSV or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    series: PathBuf,

    /// Select the fix by zero-based index into the position stream
    #[arg(long, conflicts_with = "fix_time")]
    fix_index: Option<usize>,

    /// Select the fix by timestamp ("DD-MM-YYYY HH:mm:ss"), matched against
    /// observation time first, then fix time
    #[arg(long)]
    fix_time: Option<String>,

    /// Window radius in days around the observation time
    #[arg(long, default_value_t = 3)]
    radius: u32,

    /// Fields to summarize (comma separated; default all)
    #[arg(long)]
    fields: Option<String>,

    /// Output JSON path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Optional CSV dump of the windowed samples
    #[arg(long, value_hint = ValueHint::FilePath)]
    window_csv: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct DaysArgs {
    /// Position file (CSV or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    positions: PathBuf,

    /// Bucket granularity
    #[arg(long, value_enum, default_value_t = GranularityOpt::Day)]
    granularity: GranularityOpt,

    /// Print the number of fixes in each bucket
    #[arg(long, action = ArgAction::SetTrue)]
    counts: bool,

    /// Show the fixes in one bucket instead of listing buckets
    #[arg(long, conflicts_with = "counts")]
    key: Option<String>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct DiagnoseArgs {
    /// Environmental series file (CSV or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    series: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GranularityOpt {
    Day,
    Month,
}

impl From<GranularityOpt> for Granularity {
    fn from(value: GranularityOpt) -> Self {
        match value {
            GranularityOpt::Day => Granularity::Day,
            GranularityOpt::Month => Granularity::Month,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Report(args) => args.verbose,
        Command::Days(args) => args.verbose,
        Command::Diagnose(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Report(args) => handle_report(args),
        Command::Days(args) => handle_days(args),
        Command::Diagnose(args) => handle_diagnose(args),
    }
}

fn handle_report(args: ReportArgs) -> Result<()> {
    let positions = load_positions(&args.positions)?;
    if positions.is_empty() {
        return Err(anyhow!(
            "no usable positions in {}",
            args.positions.display()
        ));
    }
    let series = load_series(&args.series)?;
    info!(
        "Loaded {} positions, {} series samples",
        positions.len(),
        series.len()
    );

    let fix = select_fix(&positions, &args)?;
    info!(
        "Selected fix at obs {} ({:.4}, {:.4}), fix-to-obs latency {} min",
        fix.obs_time,
        fix.lat,
        fix.lon,
        fix.latency_minutes()
    );

    let fields = match args.fields.as_deref() {
        Some(spec) => parse_field_list(spec)?,
        None => Field::ALL.to_vec(),
    };
    let params = Params {
        radius_days: i64::from(args.radius),
        fields,
    };

    let report = correlate(&fix, &series, &params);
    info!(
        "Window {} .. {}: {} of {} samples",
        report.window.start,
        report.window.end,
        report.filtered_series.len(),
        series.len()
    );
    for (field, summary) in &report.stats {
        if summary.is_none() {
            warn!("No {} data within window", field);
        }
    }

    let json = serde_json::to_string_pretty(&report)?;
    if args.output.as_os_str() == "-" {
        println!("{}", json);
    } else {
        fs::write(&args.output, json)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Wrote report: {}", args.output.display());
    }

    if let Some(path) = args.window_csv.as_ref() {
        write_window_csv(&report, path)?;
        info!("Wrote window CSV: {}", path.display());
    }

    Ok(())
}

fn handle_days(args: DaysArgs) -> Result<()> {
    let positions = load_positions(&args.positions)?;
    if positions.is_empty() {
        return Err(anyhow!(
            "no usable positions in {}",
            args.positions.display()
        ));
    }
    let granularity = args.granularity.into();

    if let Some(key) = args.key.as_deref() {
        let bucket = filter_by_key(&positions, granularity, key);
        if bucket.is_empty() {
            warn!("No fixes in bucket {}", key);
            return Ok(());
        }
        println!("fixTime\tobsTime\tlat\tlon");
        for fix in &bucket {
            println!(
                "{}\t{}\t{:.4}\t{:.4}",
                fix.fix_time, fix.obs_time, fix.lat, fix.lon
            );
        }
        return Ok(());
    }

    let keys = unique_keys(&positions, granularity);
    info!("{} buckets across {} fixes", keys.len(), positions.len());

    if args.counts {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for fix in &positions {
            *counts.entry(group_key(fix, granularity)).or_insert(0) += 1;
        }
        for key in &keys {
            println!("{}\t{}", key, counts.get(key).copied().unwrap_or(0));
        }
    } else {
        for key in &keys {
            println!("{}", key);
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct FieldCoverage {
    present: usize,
    numeric: usize,
    min: Option<f64>,
    max: Option<f64>,
}

fn handle_diagnose(args: DiagnoseArgs) -> Result<()> {
    let series = load_series(&args.series)?;
    if series.is_empty() {
        warn!("No usable samples in {}", args.series.display());
        return Ok(());
    }

    let first = series.iter().map(|s| s.time).min();
    let last = series.iter().map(|s| s.time).max();
    println!("samples: {}", series.len());
    if let (Some(first), Some(last)) = (first, last) {
        println!("range: {} .. {}", first, last);
    }

    let mut coverage: BTreeMap<&'static str, FieldCoverage> = BTreeMap::new();
    for field in Field::ALL {
        let entry = coverage.entry(field.name()).or_default();
        for sample in &series {
            if let Some(value) = field.value_of(sample) {
                entry.present += 1;
                if !value.is_nan() {
                    entry.numeric += 1;
                    entry.min = Some(entry.min.map_or(value, |m| m.min(value)));
                    entry.max = Some(entry.max.map_or(value, |m| m.max(value)));
                }
            }
        }
    }

    println!("field\tpresent\tnumeric\tmin\tmax");
    for (name, stats) in &coverage {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            name,
            stats.present,
            stats.numeric,
            stats.min.map_or("-".to_string(), |v| format!("{:.3}", v)),
            stats.max.map_or("-".to_string(), |v| format!("{:.3}", v)),
        );
    }
    Ok(())
}

fn load_positions(path: &Path) -> Result<Vec<PositionFix>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    parse_position_records(&data, hint)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn load_series(path: &Path) -> Result<Vec<EnvironmentalSample>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let hint = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("csv");
    parse_series_records(&data, hint)
        .with_context(|| format!("failed to parse {}", path.display()))
}

fn select_fix(positions: &[PositionFix], args: &ReportArgs) -> Result<PositionFix> {
    if let Some(text) = args.fix_time.as_deref() {
        let reference = parse_instant(text)?;
        return positions
            .iter()
            .find(|fix| fix.obs_time == reference)
            .or_else(|| positions.iter().find(|fix| fix.fix_time == reference))
            .copied()
            .ok_or_else(|| anyhow!("no position at {}", text));
    }
    if let Some(index) = args.fix_index {
        return positions
            .get(index)
            .copied()
            .ok_or_else(|| anyhow!("fix index {} out of range ({} positions)", index, positions.len()));
    }
    if positions.len() == 1 {
        return Ok(positions[0]);
    }
    Err(anyhow!(
        "{} positions loaded; select one with --fix-index or --fix-time",
        positions.len()
    ))
}

fn parse_field_list(spec: &str) -> Result<Vec<Field>> {
    let mut fields = Vec::new();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let field = Field::from_name(token)
            .ok_or_else(|| anyhow!("unknown field: {} (expected one of pressure, seaSurfaceTemperature, submergence)", token))?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    if fields.is_empty() {
        return Err(anyhow!("--fields list was empty"));
    }
    Ok(fields)
}

fn write_window_csv(report: &SelectionReport, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["time", "pressure", "seaSurfaceTemperature", "submergence"])?;
    for sample in &report.filtered_series {
        writer.write_record([
            sample.time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            opt_cell(sample.pressure),
            opt_cell(sample.sea_surface_temperature),
            opt_cell(sample.submergence),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn opt_cell(value: Option<f64>) -> String {
    value.map_or(String::new(), |v| v.to_string())
}
