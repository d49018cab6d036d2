#![forbid(unsafe_code)]

//! Parity checks between a sampling run's console report and its
//! structured results store.

pub mod density;
pub mod extraction;
pub mod level_mapping;
pub mod mismatch;
pub mod moments;
pub mod report;
mod scales;
pub mod tolerance;

use crate::density::{DENSITIES_CHECK, check_densities};
use crate::extraction::{ExtractionCache, ExtractionError, JsonCaptureExtractor, ResultExtractor};
use crate::level_mapping::{LEVEL_MAPPINGS_CHECK, check_level_mappings};
use crate::mismatch::Mismatch;
use crate::moments::{
    CONFIDENCE_INTERVALS_CHECK, MOMENTS_CHECK, MOMENTS_STRUCTURE_CHECK,
    check_confidence_intervals, check_moments, check_moments_structure,
};
use crate::report::CheckReport;
use crate::tolerance::Tolerance;
use asv_store::{OpenStore, with_read_only_store};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub const CHECK_NAMES: [&str; 5] = [
    MOMENTS_STRUCTURE_CHECK,
    MOMENTS_CHECK,
    CONFIDENCE_INTERVALS_CHECK,
    DENSITIES_CHECK,
    LEVEL_MAPPINGS_CHECK,
];

const REPORT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub capture_path: PathBuf,
    pub store_path: PathBuf,
    pub tolerance: Tolerance,
    pub log_path: Option<PathBuf>,
}

impl HarnessConfig {
    #[must_use]
    pub fn fixture_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    #[must_use]
    pub fn default_paths() -> Self {
        let fixture_root = Self::fixture_root();
        Self {
            capture_path: fixture_root.join("mixed_sampling_capture.json"),
            store_path: fixture_root.join("mixed_sampling_store.json"),
            tolerance: Tolerance::default(),
            log_path: None,
        }
    }

    /// Defaults overridden by `ASV_CAPTURE_PATH`, `ASV_STORE_PATH`,
    /// `ASV_ALMOST_EQUAL_PLACES` and `ASV_CHECK_LOG_PATH`.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default_paths();
        if let Some(path) = env_value("ASV_CAPTURE_PATH") {
            config.capture_path = PathBuf::from(path);
        }
        if let Some(path) = env_value("ASV_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Some(raw) = env_value("ASV_ALMOST_EQUAL_PLACES") {
            let places = raw
                .parse::<u32>()
                .map_err(|err| format!("invalid ASV_ALMOST_EQUAL_PLACES={raw}: {err}"))?;
            config.tolerance = Tolerance::decimal_places(places);
        }
        config.log_path = env_value("ASV_CHECK_LOG_PATH").map(PathBuf::from);
        Ok(config)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn extraction_failure(check: &'static str, err: &ExtractionError) -> CheckReport {
    let mut report = CheckReport::new(check);
    report.record_fatal(Mismatch::Extraction {
        check,
        detail: err.to_string(),
    });
    report
}

/// Opens the store for one check only; it is released before the next
/// check opens it again.
fn scoped_check(
    config: &HarnessConfig,
    check: &'static str,
    pass: impl FnOnce(&OpenStore) -> CheckReport,
) -> CheckReport {
    match with_read_only_store(&config.store_path, pass) {
        Ok(report) => report,
        Err(source) => {
            let mut report = CheckReport::new(check);
            report.record_fatal(Mismatch::Store { check, source });
            report
        }
    }
}

/// Runs one named check. Unknown names yield `None`.
pub fn run_check<E: ResultExtractor>(
    name: &str,
    config: &HarnessConfig,
    cache: &ExtractionCache<E>,
) -> Option<CheckReport> {
    let tolerance = config.tolerance;
    let report = match name {
        MOMENTS_STRUCTURE_CHECK => match cache.moments() {
            Ok(moments) => scoped_check(config, MOMENTS_STRUCTURE_CHECK, |store| {
                check_moments_structure(moments, store)
            }),
            Err(err) => extraction_failure(MOMENTS_STRUCTURE_CHECK, &err),
        },
        MOMENTS_CHECK => match cache.moments() {
            Ok(moments) => scoped_check(config, MOMENTS_CHECK, |store| {
                check_moments(moments, store, tolerance)
            }),
            Err(err) => extraction_failure(MOMENTS_CHECK, &err),
        },
        CONFIDENCE_INTERVALS_CHECK => match cache.confidence_intervals() {
            Ok(intervals) => scoped_check(config, CONFIDENCE_INTERVALS_CHECK, |store| {
                check_confidence_intervals(intervals, store, tolerance)
            }),
            Err(err) => extraction_failure(CONFIDENCE_INTERVALS_CHECK, &err),
        },
        DENSITIES_CHECK => match cache.densities() {
            Ok(densities) => scoped_check(config, DENSITIES_CHECK, |store| {
                check_densities(densities, store, tolerance)
            }),
            Err(err) => extraction_failure(DENSITIES_CHECK, &err),
        },
        LEVEL_MAPPINGS_CHECK => match cache.level_mappings() {
            Ok(levels) => scoped_check(config, LEVEL_MAPPINGS_CHECK, |store| {
                check_level_mappings(levels, store, tolerance)
            }),
            Err(err) => extraction_failure(LEVEL_MAPPINGS_CHECK, &err),
        },
        _ => return None,
    };
    Some(report)
}

/// Runs every check against one shared extraction cache. A failing check
/// never prevents the others from running.
pub fn run_all_checks_with<E: ResultExtractor>(
    config: &HarnessConfig,
    cache: &ExtractionCache<E>,
) -> Vec<CheckReport> {
    let digests = InputDigests::of(config);
    CHECK_NAMES
        .iter()
        .filter_map(|name| run_check(name, config, cache))
        .inspect(|report| {
            if let Some(path) = &config.log_path {
                let entry = CheckLogEntry::new(report, &digests);
                if let Err(err) = append_check_log(path, &entry) {
                    warn!(log = %path.display(), "{err}");
                }
            }
        })
        .collect()
}

pub fn run_all_checks(config: &HarnessConfig) -> Vec<CheckReport> {
    info!(
        capture = %config.capture_path.display(),
        store = %config.store_path.display(),
        tolerance = %config.tolerance,
        "running parity checks"
    );
    let cache = ExtractionCache::new(JsonCaptureExtractor::new(&config.capture_path));
    run_all_checks_with(config, &cache)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDigests {
    pub capture_sha256: String,
    pub store_sha256: String,
}

impl InputDigests {
    #[must_use]
    pub fn of(config: &HarnessConfig) -> Self {
        Self {
            capture_sha256: file_sha256(&config.capture_path),
            store_sha256: file_sha256(&config.store_path),
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

fn file_sha256(path: &Path) -> String {
    fs::read(path).map_or_else(|_| "unavailable".to_string(), |bytes| sha256_hex(&bytes))
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub check: String,
    pub assertion_count: usize,
    pub pass_count: usize,
    pub reason_codes: Vec<String>,
    pub failures: Vec<String>,
}

impl From<&CheckReport> for CheckSummary {
    fn from(report: &CheckReport) -> Self {
        Self {
            check: report.check.to_string(),
            assertion_count: report.assertion_count,
            pass_count: report.pass_count(),
            reason_codes: report
                .reason_codes()
                .into_iter()
                .map(str::to_string)
                .collect(),
            failures: report.failure_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParityRunReport {
    pub schema_version: u8,
    pub generated_at_unix_ms: u128,
    pub status: &'static str,
    pub capture_path: String,
    pub store_path: String,
    pub tolerance: Tolerance,
    #[serde(flatten)]
    pub digests: InputDigests,
    pub checks: Vec<CheckSummary>,
}

impl ParityRunReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.status == "pass"
    }
}

#[must_use]
pub fn build_run_report(config: &HarnessConfig, reports: &[CheckReport]) -> ParityRunReport {
    let status = if reports.iter().all(CheckReport::all_passed) {
        "pass"
    } else {
        "fail"
    };
    ParityRunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        generated_at_unix_ms: now_unix_ms(),
        status,
        capture_path: config.capture_path.display().to_string(),
        store_path: config.store_path.display().to_string(),
        tolerance: config.tolerance,
        digests: InputDigests::of(config),
        checks: reports.iter().map(CheckSummary::from).collect(),
    }
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

#[derive(Debug, Serialize)]
struct CheckLogEntry<'a> {
    ts_unix_ms: u128,
    check: &'static str,
    assertion_count: usize,
    pass_count: usize,
    passed: bool,
    reason_codes: Vec<&'static str>,
    capture_sha256: &'a str,
    store_sha256: &'a str,
}

impl<'a> CheckLogEntry<'a> {
    fn new(report: &CheckReport, digests: &'a InputDigests) -> Self {
        Self {
            ts_unix_ms: now_unix_ms(),
            check: report.check,
            assertion_count: report.assertion_count,
            pass_count: report.pass_count(),
            passed: report.all_passed(),
            reason_codes: report.reason_codes(),
            capture_sha256: &digests.capture_sha256,
            store_sha256: &digests.store_sha256,
        }
    }
}

fn append_check_log(path: &Path, entry: &CheckLogEntry<'_>) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing check log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending check log {}: {err}", path.display()))
}
