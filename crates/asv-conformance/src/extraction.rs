//! Console-side inputs: the extraction interface, a JSON capture adapter,
//! and the per-run memoized accessor the checks share.

use asv_model::{
    ConfidenceInterval, ConfidenceIntervalSet, DensityBin, DensitySet, ExecutionId,
    ExtractedResultSet, LevelMappingSet, LevelRow, MomentRow, MomentSet,
};
use serde::Deserialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed reading capture {path}: {detail}")]
    Io { path: PathBuf, detail: String },
    #[error("invalid capture json {path}: {detail}")]
    Json { path: PathBuf, detail: String },
    #[error("{family}: descriptors of {execution} differ from execution:1")]
    InconsistentDescriptors {
        family: &'static str,
        execution: ExecutionId,
    },
}

/// Statistic families parsed out of the textual report, one entry per
/// execution in run order.
pub trait ResultExtractor {
    fn extract_moments(&self) -> Result<MomentSet, ExtractionError>;
    fn extract_moment_confidence_intervals(&self)
    -> Result<ConfidenceIntervalSet, ExtractionError>;
    fn extract_pdfs(&self) -> Result<DensitySet, ExtractionError>;
    fn extract_level_mappings(&self) -> Result<LevelMappingSet, ExtractionError>;
}

#[derive(Debug, Default, Deserialize)]
struct CaptureExecution {
    #[serde(default)]
    moments: BTreeMap<String, MomentRow>,
    #[serde(default)]
    moment_confidence_intervals: BTreeMap<String, ConfidenceInterval>,
    #[serde(default)]
    probability_density: BTreeMap<String, Vec<DensityBin>>,
    #[serde(default)]
    level_mappings: BTreeMap<String, Vec<LevelRow>>,
}

#[derive(Debug, Deserialize)]
struct CaptureDocument {
    executions: Vec<CaptureExecution>,
}

/// Reads the row tables a console parser wrote out as JSON.
#[derive(Debug, Clone)]
pub struct JsonCaptureExtractor {
    path: PathBuf,
}

impl JsonCaptureExtractor {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<CaptureDocument, ExtractionError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| ExtractionError::Io {
            path: self.path.clone(),
            detail: err.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|err| ExtractionError::Json {
            path: self.path.clone(),
            detail: err.to_string(),
        })
    }

    fn family<T>(
        &self,
        family: &'static str,
        select: impl Fn(CaptureExecution) -> BTreeMap<String, T>,
    ) -> Result<ExtractedResultSet<T>, ExtractionError> {
        let document = self.load()?;
        let set = ExtractedResultSet::new(document.executions.into_iter().map(select).collect());
        if let Some(execution) = set.first_inconsistent_execution() {
            return Err(ExtractionError::InconsistentDescriptors { family, execution });
        }
        debug!(
            family,
            executions = set.execution_count(),
            capture = %self.path.display(),
            "extracted console results"
        );
        Ok(set)
    }
}

impl ResultExtractor for JsonCaptureExtractor {
    fn extract_moments(&self) -> Result<MomentSet, ExtractionError> {
        self.family("moments", |execution| execution.moments)
    }

    fn extract_moment_confidence_intervals(
        &self,
    ) -> Result<ConfidenceIntervalSet, ExtractionError> {
        self.family("moment_confidence_intervals", |execution| {
            execution.moment_confidence_intervals
        })
    }

    fn extract_pdfs(&self) -> Result<DensitySet, ExtractionError> {
        self.family("probability_density", |execution| {
            execution.probability_density
        })
    }

    fn extract_level_mappings(&self) -> Result<LevelMappingSet, ExtractionError> {
        self.family("level_mappings", |execution| execution.level_mappings)
    }
}

fn memoized<'c, T>(
    cell: &'c OnceCell<T>,
    extract: impl FnOnce() -> Result<T, ExtractionError>,
) -> Result<&'c T, ExtractionError> {
    if let Some(cached) = cell.get() {
        return Ok(cached);
    }
    let value = extract()?;
    Ok(cell.get_or_init(|| value))
}

/// Built once per verification run and lent to every check. Each family
/// is extracted on first use and reused afterwards; failed extractions
/// are not cached.
#[derive(Debug)]
pub struct ExtractionCache<E> {
    extractor: E,
    moments: OnceCell<MomentSet>,
    confidence_intervals: OnceCell<ConfidenceIntervalSet>,
    densities: OnceCell<DensitySet>,
    level_mappings: OnceCell<LevelMappingSet>,
}

impl<E: ResultExtractor> ExtractionCache<E> {
    #[must_use]
    pub fn new(extractor: E) -> Self {
        Self {
            extractor,
            moments: OnceCell::new(),
            confidence_intervals: OnceCell::new(),
            densities: OnceCell::new(),
            level_mappings: OnceCell::new(),
        }
    }

    pub fn moments(&self) -> Result<&MomentSet, ExtractionError> {
        memoized(&self.moments, || self.extractor.extract_moments())
    }

    pub fn confidence_intervals(&self) -> Result<&ConfidenceIntervalSet, ExtractionError> {
        memoized(&self.confidence_intervals, || {
            self.extractor.extract_moment_confidence_intervals()
        })
    }

    pub fn densities(&self) -> Result<&DensitySet, ExtractionError> {
        memoized(&self.densities, || self.extractor.extract_pdfs())
    }

    pub fn level_mappings(&self) -> Result<&LevelMappingSet, ExtractionError> {
        memoized(&self.level_mappings, || {
            self.extractor.extract_level_mappings()
        })
    }

    #[must_use]
    pub fn extractor(&self) -> &E {
        &self.extractor
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractionCache, ExtractionError, JsonCaptureExtractor, ResultExtractor};
    use asv_model::{
        ConfidenceIntervalSet, DensitySet, ExecutionId, ExtractedResultSet, LevelMappingSet,
        MomentRow, MomentSet,
    };
    use std::cell::Cell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct CountingExtractor {
        moment_calls: Cell<usize>,
    }

    impl ResultExtractor for CountingExtractor {
        fn extract_moments(&self) -> Result<MomentSet, ExtractionError> {
            self.moment_calls.set(self.moment_calls.get() + 1);
            Ok(ExtractedResultSet::new(vec![BTreeMap::from([(
                "f1".to_string(),
                MomentRow::from([1.0, 2.0, 3.0, 4.0]),
            )])]))
        }

        fn extract_moment_confidence_intervals(
            &self,
        ) -> Result<ConfidenceIntervalSet, ExtractionError> {
            Ok(ExtractedResultSet::default())
        }

        fn extract_pdfs(&self) -> Result<DensitySet, ExtractionError> {
            Ok(ExtractedResultSet::default())
        }

        fn extract_level_mappings(&self) -> Result<LevelMappingSet, ExtractionError> {
            Ok(ExtractedResultSet::default())
        }
    }

    #[test]
    fn each_family_is_extracted_once() {
        let cache = ExtractionCache::new(CountingExtractor::default());
        let first = cache.moments().expect("moments").execution_count();
        let second = cache.moments().expect("moments").execution_count();
        assert_eq!(first, second);
        assert_eq!(cache.extractor().moment_calls.get(), 1);
    }

    #[test]
    fn json_capture_keeps_execution_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.json");
        std::fs::write(
            &path,
            r#"{"executions": [
                {"moments": {"f1": [1.0, 2.0, 3.0, 4.0]},
                 "level_mappings": {"f1": [[1.0, 0.2, null, null]]}},
                {"moments": {"f1": [5.0, 6.0, 7.0, 8.0]},
                 "level_mappings": {"f1": [[2.0, null, null, 1.1]]}}
            ]}"#,
        )
        .expect("write capture");

        let extractor = JsonCaptureExtractor::new(&path);
        let moments = extractor.extract_moments().expect("moments");
        let second = ExecutionId::from_index(1);
        assert_eq!(moments.get(second, "f1").map(|row| row.mean), Some(5.0));

        let levels = extractor.extract_level_mappings().expect("levels");
        let rows = levels.get(second, "f1").expect("rows");
        assert_eq!(rows[0].field(3), Some(1.1));
        assert!(extractor.extract_pdfs().expect("pdfs").descriptors().is_empty());
    }

    #[test]
    fn inconsistent_descriptors_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("capture.json");
        std::fs::write(
            &path,
            r#"{"executions": [
                {"moments": {"f1": [1.0, 2.0, 3.0, 4.0]}},
                {"moments": {"f2": [1.0, 2.0, 3.0, 4.0]}}
            ]}"#,
        )
        .expect("write capture");

        let err = JsonCaptureExtractor::new(&path)
            .extract_moments()
            .expect_err("descriptor drift");
        assert!(matches!(
            err,
            ExtractionError::InconsistentDescriptors { family: "moments", .. }
        ));
    }
}
