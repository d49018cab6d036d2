#![forbid(unsafe_code)]

//! In-memory shapes for the statistics a sampling run reports on its
//! console channel, normalized per execution and descriptor.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const MOMENT_LABELS: [&str; 4] = ["mean", "std_deviation", "skewness", "kurtosis"];
pub const CI_BOUND_LABELS: [&str; 2] = ["lower", "upper"];
pub const CI_MOMENT_LABELS: [&str; 2] = ["mean", "std_deviation"];

/// 1-based ordinal of one repetition of a sampling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ExecutionId(u32);

impl ExecutionId {
    /// Returns `None` for 0; executions are numbered from 1.
    #[must_use]
    pub fn new(ordinal: u32) -> Option<Self> {
        (ordinal > 0).then_some(Self(ordinal))
    }

    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).map_or(u32::MAX, |i| i.saturating_add(1)))
    }

    #[must_use]
    pub fn ordinal(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Parses the `execution:<n>` group name used by the structured store.
    /// Only the canonical spelling is accepted, so `execution:01` is not
    /// execution 1.
    #[must_use]
    pub fn parse_group_name(name: &str) -> Option<Self> {
        let raw = name.strip_prefix("execution:")?;
        raw.parse::<u32>()
            .ok()
            .and_then(Self::new)
            .filter(|id| id.0.to_string() == raw)
    }
}

impl TryFrom<u32> for ExecutionId {
    type Error = String;

    fn try_from(ordinal: u32) -> Result<Self, Self::Error> {
        Self::new(ordinal).ok_or_else(|| "execution ordinals start at 1".to_string())
    }
}

impl From<ExecutionId> for u32 {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct MomentRow {
    pub mean: f64,
    pub std_deviation: f64,
    pub skewness: f64,
    pub kurtosis: f64,
}

impl MomentRow {
    /// Values in the fixed `MOMENT_LABELS` order.
    #[must_use]
    pub fn values(&self) -> [f64; 4] {
        [self.mean, self.std_deviation, self.skewness, self.kurtosis]
    }
}

impl From<[f64; 4]> for MomentRow {
    fn from(raw: [f64; 4]) -> Self {
        let [mean, std_deviation, skewness, kurtosis] = raw;
        Self {
            mean,
            std_deviation,
            skewness,
            kurtosis,
        }
    }
}

impl From<MomentRow> for [f64; 4] {
    fn from(row: MomentRow) -> Self {
        row.values()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Lower,
    Upper,
}

impl Bound {
    pub const ALL: [Self; 2] = [Self::Lower, Self::Upper];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        CI_BOUND_LABELS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalMoment {
    Mean,
    StdDeviation,
}

impl IntervalMoment {
    pub const ALL: [Self; 2] = [Self::Mean, Self::StdDeviation];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        CI_MOMENT_LABELS[self as usize]
    }
}

/// 2x2 block indexed by (bound, moment).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceInterval {
    cells: [[f64; 2]; 2],
}

impl ConfidenceInterval {
    #[must_use]
    pub fn new(cells: [[f64; 2]; 2]) -> Self {
        Self { cells }
    }

    #[must_use]
    pub fn cell(&self, bound: Bound, moment: IntervalMoment) -> f64 {
        self.cells[bound as usize][moment as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct DensityBin {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub density: f64,
}

impl From<[f64; 3]> for DensityBin {
    fn from(raw: [f64; 3]) -> Self {
        let [lower_bound, upper_bound, density] = raw;
        Self {
            lower_bound,
            upper_bound,
            density,
        }
    }
}

impl From<DensityBin> for [f64; 3] {
    fn from(bin: DensityBin) -> Self {
        [bin.lower_bound, bin.upper_bound, bin.density]
    }
}

/// The three columns that may follow the level value in a console
/// level-mapping row, in table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelColumn {
    Probability,
    Reliability,
    GenReliability,
}

impl LevelColumn {
    pub const ALL: [Self; 3] = [Self::Probability, Self::Reliability, Self::GenReliability];

    /// Field position inside a `LevelRow`; field 0 is the level value.
    #[must_use]
    pub fn field_index(self) -> usize {
        self as usize + 1
    }

    #[must_use]
    pub fn from_field_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Probability => "probability",
            Self::Reliability => "reliability",
            Self::GenReliability => "gen_reliability",
        }
    }
}

/// One console level-mapping row: the level value followed by the
/// probability, reliability and generalized-reliability columns, any of
/// which may be blank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "(f64, Option<f64>, Option<f64>, Option<f64>)",
    into = "(f64, Option<f64>, Option<f64>, Option<f64>)"
)]
pub struct LevelRow {
    pub level: f64,
    pub columns: [Option<f64>; 3],
}

impl LevelRow {
    #[must_use]
    pub fn new(level: f64, columns: [Option<f64>; 3]) -> Self {
        Self { level, columns }
    }

    #[must_use]
    pub fn with_column(level: f64, column: LevelColumn, value: f64) -> Self {
        let mut columns = [None; 3];
        columns[column as usize] = Some(value);
        Self { level, columns }
    }

    /// Positional access: 0 is the level, 1..=3 the trailing columns.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<f64> {
        match index {
            0 => Some(self.level),
            _ => LevelColumn::from_field_index(index).and_then(|c| self.column(c)),
        }
    }

    #[must_use]
    pub fn column(&self, column: LevelColumn) -> Option<f64> {
        self.columns[column as usize]
    }

    /// Trailing columns that carry a value, in table order.
    #[must_use]
    pub fn populated_columns(&self) -> Vec<LevelColumn> {
        LevelColumn::ALL
            .into_iter()
            .filter(|c| self.column(*c).is_some())
            .collect()
    }
}

impl From<(f64, Option<f64>, Option<f64>, Option<f64>)> for LevelRow {
    fn from(raw: (f64, Option<f64>, Option<f64>, Option<f64>)) -> Self {
        Self::new(raw.0, [raw.1, raw.2, raw.3])
    }
}

impl From<LevelRow> for (f64, Option<f64>, Option<f64>, Option<f64>) {
    fn from(row: LevelRow) -> Self {
        (row.level, row.columns[0], row.columns[1], row.columns[2])
    }
}

/// A level-mapping row once its role in the table is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelMapping {
    /// User-specified response level with the one column the tool computed.
    ResponseComputedAs {
        column: LevelColumn,
        response_level: f64,
        value: f64,
    },
    Probability {
        response_level: f64,
        value: f64,
    },
    Reliability {
        response_level: f64,
        value: f64,
    },
    GenReliability {
        response_level: f64,
        value: f64,
    },
}

impl LevelMapping {
    /// Mapping for a row requested through one of the trailing level lists.
    #[must_use]
    pub fn requested(column: LevelColumn, response_level: f64, value: f64) -> Self {
        match column {
            LevelColumn::Probability => Self::Probability {
                response_level,
                value,
            },
            LevelColumn::Reliability => Self::Reliability {
                response_level,
                value,
            },
            LevelColumn::GenReliability => Self::GenReliability {
                response_level,
                value,
            },
        }
    }

    #[must_use]
    pub fn column(&self) -> LevelColumn {
        match self {
            Self::ResponseComputedAs { column, .. } => *column,
            Self::Probability { .. } => LevelColumn::Probability,
            Self::Reliability { .. } => LevelColumn::Reliability,
            Self::GenReliability { .. } => LevelColumn::GenReliability,
        }
    }

    #[must_use]
    pub fn response_level(&self) -> f64 {
        match self {
            Self::ResponseComputedAs { response_level, .. }
            | Self::Probability { response_level, .. }
            | Self::Reliability { response_level, .. }
            | Self::GenReliability { response_level, .. } => *response_level,
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Self::ResponseComputedAs { value, .. }
            | Self::Probability { value, .. }
            | Self::Reliability { value, .. }
            | Self::GenReliability { value, .. } => *value,
        }
    }
}

/// One statistic family keyed by execution (in run order) then descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedResultSet<T> {
    executions: Vec<BTreeMap<String, T>>,
}

impl<T> Default for ExtractedResultSet<T> {
    fn default() -> Self {
        Self {
            executions: Vec::new(),
        }
    }
}

impl<T> ExtractedResultSet<T> {
    #[must_use]
    pub fn new(executions: Vec<BTreeMap<String, T>>) -> Self {
        Self { executions }
    }

    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    pub fn execution_ids(&self) -> impl Iterator<Item = ExecutionId> + '_ {
        (0..self.executions.len()).map(ExecutionId::from_index)
    }

    /// Descriptors reported by the first execution; every execution of a
    /// run reports the same set.
    #[must_use]
    pub fn descriptors(&self) -> BTreeSet<&str> {
        self.executions
            .first()
            .map(|first| first.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn execution(&self, id: ExecutionId) -> Option<&BTreeMap<String, T>> {
        self.executions.get(id.index())
    }

    #[must_use]
    pub fn get(&self, id: ExecutionId, descriptor: &str) -> Option<&T> {
        self.execution(id).and_then(|entries| entries.get(descriptor))
    }

    /// First execution whose descriptor set differs from execution 1.
    #[must_use]
    pub fn first_inconsistent_execution(&self) -> Option<ExecutionId> {
        let expected = self.descriptors();
        self.executions
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, entries)| {
                entries.len() != expected.len()
                    || entries.keys().any(|name| !expected.contains(name.as_str()))
            })
            .map(|(index, _)| ExecutionId::from_index(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExecutionId, &BTreeMap<String, T>)> {
        self.executions
            .iter()
            .enumerate()
            .map(|(index, entries)| (ExecutionId::from_index(index), entries))
    }
}

pub type MomentSet = ExtractedResultSet<MomentRow>;
pub type ConfidenceIntervalSet = ExtractedResultSet<ConfidenceInterval>;
pub type DensitySet = ExtractedResultSet<Vec<DensityBin>>;
pub type LevelMappingSet = ExtractedResultSet<Vec<LevelRow>>;
