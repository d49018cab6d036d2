//! Level mappings: one flat console table per descriptor against up to
//! four separately stored level collections.
//!
//! The console writes rows in a fixed order: every user response level
//! first, then probability, reliability and generalized-reliability
//! levels. A response-level row carries exactly one computed column and
//! the table does not say which; row 0 decides it for the whole block.
//! The store keeps each kind in its own collection whose data holds the
//! mapped column and whose sole scale, named after the collection, holds
//! the level column. The walk below consumes the flat table with a
//! cursor in that fixed order.

use crate::mismatch::{Mismatch, Site, ensure};
use crate::report::{Assertions, CheckReport, Halt};
use crate::scales::{numeric_labels, sole_scale};
use crate::tolerance::Tolerance;
use asv_model::{ExecutionId, LevelColumn, LevelMapping, LevelMappingSet, LevelRow};
use asv_store::{LabeledCollection, ResultCategory, StorePath, StructuredStoreView};
use tracing::{debug, info};

pub const LEVEL_MAPPINGS_CHECK: &str = "level_mappings";

/// Trailing categories in console order, paired with the column each
/// one maps to.
const REQUESTED_LEVELS: [(ResultCategory, LevelColumn); 3] = [
    (ResultCategory::ProbabilityLevels, LevelColumn::Probability),
    (ResultCategory::ReliabilityLevels, LevelColumn::Reliability),
    (ResultCategory::GenReliabilityLevels, LevelColumn::GenReliability),
];

/// Level collections stored for one (execution, descriptor). A category
/// with nothing at its path is simply absent.
#[derive(Debug, Clone, Copy)]
pub struct PresentLevels<'s> {
    collections: [Option<&'s LabeledCollection>; 4],
}

impl<'s> PresentLevels<'s> {
    #[must_use]
    pub fn discover(
        store: &'s dyn StructuredStoreView,
        execution: ExecutionId,
        descriptor: &str,
    ) -> Self {
        let collections = ResultCategory::LEVEL_MAPPINGS
            .map(|category| store.probe(&StorePath::dataset(execution, category, descriptor)));
        Self { collections }
    }

    #[must_use]
    pub fn get(&self, category: ResultCategory) -> Option<&'s LabeledCollection> {
        ResultCategory::LEVEL_MAPPINGS
            .iter()
            .position(|c| *c == category)
            .and_then(|slot| self.collections[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResultCategory, &'s LabeledCollection)> + '_ {
        ResultCategory::LEVEL_MAPPINGS
            .into_iter()
            .zip(self.collections)
            .filter_map(|(category, collection)| collection.map(|c| (category, c)))
    }

    #[must_use]
    pub fn categories(&self) -> Vec<ResultCategory> {
        self.iter().map(|(category, _)| category).collect()
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.iter().map(|(_, collection)| collection.len()).sum()
    }
}

/// One stored level collection with its labels resolved.
struct LevelCollection<'s> {
    data: &'s [f64],
    levels: &'s [f64],
}

/// Classified rows of one descriptor's table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledLevels {
    pub execution: ExecutionId,
    pub descriptor: String,
    pub mappings: Vec<LevelMapping>,
}

#[must_use]
pub fn check_level_mappings(
    levels: &LevelMappingSet,
    store: &dyn StructuredStoreView,
    tolerance: Tolerance,
) -> CheckReport {
    reconcile_level_mappings(levels, store, tolerance).0
}

/// Runs the level-mapping check and also returns the classified rows of
/// every descriptor that reconciled without a fatal mismatch.
#[must_use]
pub fn reconcile_level_mappings(
    levels: &LevelMappingSet,
    store: &dyn StructuredStoreView,
    tolerance: Tolerance,
) -> (CheckReport, Vec<ReconciledLevels>) {
    let mut report = CheckReport::new(LEVEL_MAPPINGS_CHECK);
    let mut reconciled = Vec::new();
    let mut asserts = Assertions::new(&mut report, tolerance);
    let halted = walk_executions(levels, store, &mut asserts, &mut reconciled).is_err();
    info!(
        check = LEVEL_MAPPINGS_CHECK,
        halted,
        assertions = report.assertion_count,
        failures = report.failures.len(),
        descriptors = reconciled.len(),
        "check finished"
    );
    (report, reconciled)
}

fn walk_executions(
    levels: &LevelMappingSet,
    store: &dyn StructuredStoreView,
    asserts: &mut Assertions<'_>,
    reconciled: &mut Vec<ReconciledLevels>,
) -> Result<(), Halt> {
    for (execution, tables) in levels.iter() {
        for (descriptor, rows) in tables {
            let site = Site::new(execution, descriptor);
            let present = PresentLevels::discover(store, execution, descriptor);
            debug!(%site, present = ?present.categories(), rows = rows.len(), "level collections");

            // Scale conventions are checked for every present type before
            // any row is compared; a violation ends the whole check.
            let mut resolved: [Option<LevelCollection<'_>>; 4] = [None, None, None, None];
            for (slot, category) in ResultCategory::LEVEL_MAPPINGS.into_iter().enumerate() {
                if let Some(collection) = present.get(category) {
                    resolved[slot] = Some(asserts.require_with(resolve_collection(
                        &site.in_category(category),
                        category,
                        collection,
                    ))?);
                }
            }

            if let Ok(mappings) = reconcile_descriptor_levels(&site, rows, &resolved, asserts) {
                reconciled.push(ReconciledLevels {
                    execution,
                    descriptor: descriptor.clone(),
                    mappings,
                });
            }
        }
    }
    Ok(())
}

fn resolve_collection<'s>(
    site: &Site,
    category: ResultCategory,
    collection: &'s LabeledCollection,
) -> Result<LevelCollection<'s>, Mismatch> {
    let scale = sole_scale(site, collection, 0, category.as_str())?;
    let levels = numeric_labels(site, scale, 0, collection.len())?;
    ensure(collection.values.len() == collection.len(), || {
        Mismatch::structure(format!(
            "{site}: {category} is not one-dimensional (shape {:?})",
            collection.shape
        ))
    })?;
    Ok(LevelCollection {
        data: &collection.values,
        levels,
    })
}

/// Row-count check and cursor walk for one descriptor. `Err` means a
/// fatal mismatch for this descriptor was recorded; other descriptors
/// still run.
fn reconcile_descriptor_levels(
    site: &Site,
    rows: &[LevelRow],
    resolved: &[Option<LevelCollection<'_>>; 4],
    asserts: &mut Assertions<'_>,
) -> Result<Vec<LevelMapping>, Halt> {
    let stored_rows: usize = resolved.iter().flatten().map(|c| c.data.len()).sum();
    asserts.require(ensure(stored_rows == rows.len(), || Mismatch::RowCount {
        site: site.clone(),
        console: rows.len(),
        store: stored_rows,
    }))?;

    let mut mappings = Vec::with_capacity(rows.len());
    let mut cursor = 0usize;

    if let Some(response) = &resolved[0] {
        let category = ResultCategory::ResponseLevels;
        let n = response.data.len();
        if n > 0 {
            let column = asserts.require_with(computed_column(&site.in_category(category), rows))?;
            for index in 0..n {
                let row_site = site.in_category(category).at_row(index);
                let row = &rows[index];
                asserts.require(single_column(&row_site, row, column))?;
                let value = row.column(column).unwrap_or(f64::NAN);
                asserts.close(&row_site, "response_level", row.level, response.levels[index]);
                asserts.close(&row_site, column.as_str(), value, response.data[index]);
                mappings.push(LevelMapping::ResponseComputedAs {
                    column,
                    response_level: row.level,
                    value,
                });
            }
        }
        cursor = n;
    }

    for (slot, (category, column)) in REQUESTED_LEVELS.into_iter().enumerate() {
        let Some(collection) = &resolved[slot + 1] else {
            continue;
        };
        let m = collection.data.len();
        for offset in 0..m {
            let index = cursor + offset;
            let row_site = site.in_category(category).at_row(index);
            let Some(row) = rows.get(index) else {
                return asserts.require_with(Err(Mismatch::RowCount {
                    site: site.in_category(category),
                    console: rows.len(),
                    store: index + 1,
                }));
            };
            asserts.require(single_column(&row_site, row, column))?;
            let value = row.field(column.field_index()).unwrap_or(f64::NAN);
            asserts.close(&row_site, column.as_str(), value, collection.data[offset]);
            asserts.close(&row_site, "response_level", row.level, collection.levels[offset]);
            mappings.push(LevelMapping::requested(column, row.level, value));
        }
        cursor += m;
    }

    asserts.require(ensure(cursor == rows.len(), || Mismatch::RowCount {
        site: site.clone(),
        console: rows.len(),
        store: cursor,
    }))?;
    Ok(mappings)
}

/// The column computed for every response-level row, read off row 0.
fn computed_column(site: &Site, rows: &[LevelRow]) -> Result<LevelColumn, Mismatch> {
    let site = site.at_row(0);
    let Some(first) = rows.first() else {
        return Err(Mismatch::MalformedLevelTable {
            site,
            detail: "response levels are stored but the console table is empty".to_string(),
        });
    };
    match first.populated_columns().as_slice() {
        [column] => Ok(*column),
        [] => Err(Mismatch::MalformedLevelTable {
            site,
            detail: "first response-level row has no computed column".to_string(),
        }),
        columns => Err(Mismatch::MalformedLevelTable {
            site,
            detail: format!(
                "first response-level row populates {} columns {:?}; the computed one is ambiguous",
                columns.len(),
                columns.iter().map(|c| c.as_str()).collect::<Vec<_>>()
            ),
        }),
    }
}

/// A row in a block mapped to `column` populates that column and no other.
/// A row out of place (for instance a reliability row inside the
/// probability block) fails here.
fn single_column(site: &Site, row: &LevelRow, column: LevelColumn) -> Result<(), Mismatch> {
    let populated = row.populated_columns();
    ensure(populated == [column], || Mismatch::MalformedLevelTable {
        site: site.clone(),
        detail: format!(
            "expected only the {} column, found {:?}",
            column.as_str(),
            populated.iter().map(|c| c.as_str()).collect::<Vec<_>>()
        ),
    })
}
