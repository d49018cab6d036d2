#![forbid(unsafe_code)]

//! Read-only, path-addressed access to the structured results store.
//!
//! Leaves are numeric collections whose axes carry named dimension
//! scales. Absence of a path is an ordinary `None`; only the strict
//! [`StructuredStoreView::fetch`] helper turns it into an error.

pub mod persisted;

use asv_model::ExecutionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

pub use persisted::{OpenStore, with_read_only_store, write_snapshot};

pub const RESULTS_ROOT: &str = "/methods/aleatory/results";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed reading store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store json {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no dataset at {0}")]
    NotFound(StorePath),
    #[error("dataset {path} declares shape {shape:?} but holds {actual} values")]
    Shape {
        path: String,
        shape: Vec<usize>,
        actual: usize,
    },
}

impl StoreError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Io { .. } | Self::Json { .. } => "store_unavailable",
            Self::NotFound(_) => "store_path_missing",
            Self::Shape { .. } => "store_shape_invalid",
        }
    }
}

/// Result groups written per execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Moments,
    MomentConfidenceIntervals,
    ProbabilityDensity,
    ResponseLevels,
    ProbabilityLevels,
    ReliabilityLevels,
    GenReliabilityLevels,
}

impl ResultCategory {
    /// The four level-mapping categories in the order the console reports them.
    pub const LEVEL_MAPPINGS: [Self; 4] = [
        Self::ResponseLevels,
        Self::ProbabilityLevels,
        Self::ReliabilityLevels,
        Self::GenReliabilityLevels,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Moments => "moments",
            Self::MomentConfidenceIntervals => "moment_confidence_intervals",
            Self::ProbabilityDensity => "probability_density",
            Self::ResponseLevels => "response_levels",
            Self::ProbabilityLevels => "probability_levels",
            Self::ReliabilityLevels => "reliability_levels",
            Self::GenReliabilityLevels => "gen_reliability_levels",
        }
    }
}

impl fmt::Display for ResultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute, `/`-separated location of a group or dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(String);

impl StorePath {
    #[must_use]
    pub fn results_root() -> Self {
        Self(RESULTS_ROOT.to_string())
    }

    #[must_use]
    pub fn category(execution: ExecutionId, category: ResultCategory) -> Self {
        Self(format!("{RESULTS_ROOT}/{execution}/{category}"))
    }

    #[must_use]
    pub fn dataset(execution: ExecutionId, category: ResultCategory, descriptor: &str) -> Self {
        Self(format!("{RESULTS_ROOT}/{execution}/{category}/{descriptor}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StorePath {
    fn from(raw: &str) -> Self {
        Self(raw.trim_end_matches('/').to_string())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScaleValues {
    Text(Vec<String>),
    Numeric(Vec<f64>),
}

impl ScaleValues {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(labels) => labels.len(),
            Self::Numeric(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty label list has no element type of its own and reads back
    /// from JSON as `Text`, so it is accepted as either kind.
    #[must_use]
    pub fn text(&self) -> Option<&[String]> {
        match self {
            Self::Text(labels) => Some(labels),
            Self::Numeric(values) if values.is_empty() => Some(&[]),
            Self::Numeric(_) => None,
        }
    }

    #[must_use]
    pub fn numeric(&self) -> Option<&[f64]> {
        match self {
            Self::Numeric(values) => Some(values),
            Self::Text(labels) if labels.is_empty() => Some(&[]),
            Self::Text(_) => None,
        }
    }
}

/// A named, ordered label sequence attached to one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScale {
    pub name: String,
    pub values: ScaleValues,
}

impl DimensionScale {
    #[must_use]
    pub fn text(name: &str, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: ScaleValues::Text(labels.iter().map(|l| (*l).to_string()).collect()),
        }
    }

    #[must_use]
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values: ScaleValues::Numeric(values),
        }
    }
}

/// Row-major numeric dataset plus the scales attached to each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledCollection {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub dims: Vec<Vec<DimensionScale>>,
}

impl LabeledCollection {
    /// One-dimensional collection with a single scale on axis 0.
    #[must_use]
    pub fn vector(values: Vec<f64>, scale: DimensionScale) -> Self {
        Self {
            shape: vec![values.len()],
            values,
            dims: vec![vec![scale]],
        }
    }

    #[must_use]
    pub fn with_dims(shape: Vec<usize>, values: Vec<f64>, dims: Vec<Vec<DimensionScale>>) -> Self {
        Self {
            shape,
            values,
            dims,
        }
    }

    /// Extent of axis 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at a multi-index, row-major.
    #[must_use]
    pub fn at(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut flat = 0usize;
        for (&i, &extent) in index.iter().zip(&self.shape) {
            if i >= extent {
                return None;
            }
            flat = flat * extent + i;
        }
        self.values.get(flat).copied()
    }

    #[must_use]
    pub fn scales(&self, axis: usize) -> &[DimensionScale] {
        self.dims.get(axis).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn scale_named(&self, axis: usize, name: &str) -> Option<&DimensionScale> {
        self.scales(axis).iter().find(|scale| scale.name == name)
    }

    fn validate(&self, path: &str) -> Result<(), StoreError> {
        let expected = self.shape.iter().product::<usize>();
        if expected != self.values.len() {
            return Err(StoreError::Shape {
                path: path.to_string(),
                shape: self.shape.clone(),
                actual: self.values.len(),
            });
        }
        Ok(())
    }
}

pub trait StructuredStoreView {
    /// Dataset at `path`, or `None` when nothing is stored there.
    fn probe(&self, path: &StorePath) -> Option<&LabeledCollection>;

    /// Names of the direct children of a group, or `None` when the group
    /// does not exist.
    fn members(&self, group: &StorePath) -> Option<BTreeSet<String>>;

    fn fetch(&self, path: &StorePath) -> Result<&LabeledCollection, StoreError> {
        self.probe(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }
}

/// Datasets held in memory, keyed by absolute path. Groups are implied by
/// the dataset paths.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    datasets: BTreeMap<String, LabeledCollection>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: StorePath, collection: LabeledCollection) {
        self.datasets.insert(path.0, collection);
    }

    #[must_use]
    pub fn with(mut self, path: StorePath, collection: LabeledCollection) -> Self {
        self.insert(path, collection);
        self
    }

    #[must_use]
    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        self.datasets
            .iter()
            .try_for_each(|(path, collection)| collection.validate(path))
    }
}

impl StructuredStoreView for MemoryStore {
    fn probe(&self, path: &StorePath) -> Option<&LabeledCollection> {
        self.datasets.get(path.as_str())
    }

    fn members(&self, group: &StorePath) -> Option<BTreeSet<String>> {
        let prefix = format!("{}/", group.as_str());
        let names: BTreeSet<String> = self
            .datasets
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| path[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        (!names.is_empty()).then_some(names)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DimensionScale, LabeledCollection, MemoryStore, ResultCategory, StoreError, StorePath,
        StructuredStoreView,
    };
    use asv_model::ExecutionId;

    fn moments() -> LabeledCollection {
        LabeledCollection::vector(
            vec![1.0, 2.0, 3.0, 4.0],
            DimensionScale::text("moments", &["mean", "std_deviation", "skewness", "kurtosis"]),
        )
    }

    #[test]
    fn paths_follow_results_layout() {
        let exec = ExecutionId::from_index(1);
        assert_eq!(
            StorePath::dataset(exec, ResultCategory::GenReliabilityLevels, "f1").as_str(),
            "/methods/aleatory/results/execution:2/gen_reliability_levels/f1"
        );
        assert_eq!(
            StorePath::from("/methods/aleatory/results/"),
            StorePath::results_root()
        );
    }

    #[test]
    fn absent_paths_probe_as_none() {
        let exec = ExecutionId::from_index(0);
        let store = MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::Moments, "f1"),
            moments(),
        );
        let missing = StorePath::dataset(exec, ResultCategory::ResponseLevels, "f1");
        assert!(store.probe(&missing).is_none());
        let err = store.fetch(&missing).expect_err("strict fetch fails");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(err.reason_code(), "store_path_missing");
    }

    #[test]
    fn members_are_derived_from_dataset_paths() {
        let first = ExecutionId::from_index(0);
        let second = ExecutionId::from_index(1);
        let store = MemoryStore::new()
            .with(StorePath::dataset(first, ResultCategory::Moments, "f1"), moments())
            .with(StorePath::dataset(first, ResultCategory::Moments, "f2"), moments())
            .with(StorePath::dataset(second, ResultCategory::Moments, "f1"), moments());

        let executions = store
            .members(&StorePath::results_root())
            .expect("root group");
        assert_eq!(
            executions.into_iter().collect::<Vec<_>>(),
            vec!["execution:1".to_string(), "execution:2".to_string()]
        );
        let descriptors = store
            .members(&StorePath::category(first, ResultCategory::Moments))
            .expect("moments group");
        assert_eq!(descriptors.len(), 2);
        assert!(store
            .members(&StorePath::category(first, ResultCategory::ProbabilityDensity))
            .is_none());
    }

    #[test]
    fn two_dimensional_indexing_is_row_major() {
        let block = LabeledCollection::with_dims(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0], Vec::new());
        assert_eq!(block.at(&[0, 1]), Some(2.0));
        assert_eq!(block.at(&[1, 0]), Some(3.0));
        assert_eq!(block.at(&[2, 0]), None);
        assert_eq!(block.at(&[1]), None);
        assert_eq!(block.len(), 2);
        assert!(block.scales(1).is_empty());
    }

    #[test]
    fn shape_must_cover_values() {
        let exec = ExecutionId::from_index(0);
        let broken = LabeledCollection::with_dims(vec![3], vec![1.0, 2.0], Vec::new());
        let store = MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::ProbabilityLevels, "f1"),
            broken,
        );
        let err = store.validate().expect_err("shape mismatch");
        assert_eq!(err.reason_code(), "store_shape_invalid");
    }
}
