use asv_model::ExecutionId;
use asv_store::{ResultCategory, StoreError};
use std::fmt;

/// Where a discrepancy was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub execution: ExecutionId,
    pub descriptor: String,
    pub result_type: Option<ResultCategory>,
    pub row: Option<usize>,
}

impl Site {
    #[must_use]
    pub fn new(execution: ExecutionId, descriptor: &str) -> Self {
        Self {
            execution,
            descriptor: descriptor.to_string(),
            result_type: None,
            row: None,
        }
    }

    #[must_use]
    pub fn in_category(&self, category: ResultCategory) -> Self {
        Self {
            result_type: Some(category),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn at_row(&self, row: usize) -> Self {
        Self {
            row: Some(row),
            ..self.clone()
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.execution)?;
        if let Some(category) = self.result_type {
            write!(f, "/{category}")?;
        }
        write!(f, "/{}", self.descriptor)?;
        if let Some(row) = self.row {
            write!(f, " row {row}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Mismatch {
    #[error("structure mismatch: {detail}")]
    Structure { detail: String },

    #[error("{site}: scale mismatch on axis {axis}: expected {expected}, found {found}")]
    ScaleLabel {
        site: Site,
        axis: usize,
        expected: String,
        found: String,
    },

    #[error("{site}: row count mismatch: console has {console} rows, store has {store}")]
    RowCount {
        site: Site,
        console: usize,
        store: usize,
    },

    #[error("{site}: {field} differs: console={console} store={store}")]
    Value {
        site: Site,
        field: String,
        console: f64,
        store: f64,
    },

    #[error("{site}: malformed level table: {detail}")]
    MalformedLevelTable { site: Site, detail: String },

    #[error("{check}: {source}")]
    Store {
        check: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{check}: {detail}")]
    Extraction { check: &'static str, detail: String },
}

impl Mismatch {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Structure { .. } => "structure_mismatch",
            Self::ScaleLabel { .. } => "scale_label_mismatch",
            Self::RowCount { .. } => "row_count_mismatch",
            Self::Value { .. } => "value_mismatch",
            Self::MalformedLevelTable { .. } => "malformed_level_table",
            Self::Store { source, .. } => source.reason_code(),
            Self::Extraction { .. } => "extraction_failed",
        }
    }

    pub(crate) fn structure(detail: impl Into<String>) -> Self {
        Self::Structure {
            detail: detail.into(),
        }
    }

    pub(crate) fn missing_dataset(site: &Site, category: ResultCategory) -> Self {
        Self::structure(format!(
            "{} has no {category} dataset for descriptor {}",
            site.execution, site.descriptor
        ))
    }
}

/// `Ok` when `condition` holds, otherwise the lazily built failure.
pub(crate) fn ensure(condition: bool, failure: impl FnOnce() -> Mismatch) -> Result<(), Mismatch> {
    if condition { Ok(()) } else { Err(failure()) }
}
