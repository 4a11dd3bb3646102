use chrono::Utc;
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use wpr2har::importer::{FILE_EXTENSION, FORMAT_DESCRIPTION, FORMAT_NAME};
use wpr2har::{import_sessions, HarExporter, ImportOptions, ImportSource};

#[derive(Parser)]
#[command(name = "wpr2har")]
#[command(about = "Convert WebPageReplay captures to HAR format")]
#[command(long_about = FORMAT_DESCRIPTION)]
#[command(version)]
struct Cli {
    /// Input capture file (usually .wprgo, gzip-compressed JSON)
    #[arg(value_name = "CAPTURE_FILE")]
    input: PathBuf,

    /// Output HAR file (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Largest input or decompressed size accepted, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = ImportOptions::default().size_limit)]
    max_size: u64,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.input.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
        tracing::info!(path = %cli.input.display(), "Input does not have the .{} extension", FILE_EXTENSION);
    }

    let options = ImportOptions {
        size_limit: cli.max_size,
    };
    let mut progress = |fraction: f32, message: &str| {
        tracing::info!(percent = (fraction * 100.0).round() as u32, "{}", message);
    };

    let report = match import_sessions(FORMAT_NAME, ImportSource::Filename(cli.input), &options, &mut progress) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Some(notice) = report.notice {
        eprintln!("{}: {}", notice.title(), notice.message());
    }

    let har = HarExporter::new(Utc::now()).to_har(&report.sessions);

    let json = match serde_json::to_string_pretty(&har) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing HAR: {}", e);
            process::exit(1);
        }
    };

    let result: Result<(), String> = match &cli.output {
        Some(path) => File::create(path)
            .and_then(|mut file| file.write_all(json.as_bytes()))
            .map_err(|e| e.to_string()),
        None => io::stdout()
            .write_all(json.as_bytes())
            .map_err(|e| e.to_string()),
    };

    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}
