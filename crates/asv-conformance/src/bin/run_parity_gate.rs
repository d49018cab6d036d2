#![forbid(unsafe_code)]

use asv_conformance::tolerance::Tolerance;
use asv_conformance::{HarnessConfig, build_run_report, run_all_checks};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("run_parity_gate failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut config = HarnessConfig::from_env()?;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--capture" => config.capture_path = PathBuf::from(required(&mut args, &arg)?),
            "--store" => config.store_path = PathBuf::from(required(&mut args, &arg)?),
            "--log-path" => config.log_path = Some(PathBuf::from(required(&mut args, &arg)?)),
            "--places" => {
                let raw = required(&mut args, &arg)?;
                let places = raw
                    .parse::<u32>()
                    .map_err(|err| format!("invalid --places {raw}: {err}"))?;
                config.tolerance = Tolerance::decimal_places(places);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p asv-conformance --bin run_parity_gate -- [--capture <path>] [--store <path>] [--places <n>] [--log-path <path>]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    for path in [&config.capture_path, &config.store_path] {
        if !path.is_file() {
            return Err(format!("input file not found: {}", path.display()));
        }
    }

    let reports = run_all_checks(&config);
    let run_report = build_run_report(&config, &reports);
    let summary_json = serde_json::to_string_pretty(&run_report)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");

    if !run_report.all_passed() {
        std::process::exit(2);
    }
    Ok(())
}

fn required(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("{flag} requires a value"))
}
