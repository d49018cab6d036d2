//! Moments, their confidence intervals, and the execution/descriptor
//! layout both channels must share.

use crate::mismatch::{Mismatch, Site, ensure};
use crate::report::{Assertions, CheckReport, Halt};
use crate::scales::sole_text_scale;
use crate::tolerance::Tolerance;
use asv_model::{
    Bound, CI_BOUND_LABELS, CI_MOMENT_LABELS, ConfidenceIntervalSet, ExecutionId, IntervalMoment,
    MOMENT_LABELS, MomentSet,
};
use asv_store::{ResultCategory, StorePath, StructuredStoreView};
use std::collections::BTreeSet;
use tracing::info;

pub const MOMENTS_STRUCTURE_CHECK: &str = "moments_structure";
pub const MOMENTS_CHECK: &str = "moments";
pub const CONFIDENCE_INTERVALS_CHECK: &str = "confidence_intervals";

/// Executions under the results root, and each execution's moment
/// descriptors, match the console.
#[must_use]
pub fn check_moments_structure(moments: &MomentSet, store: &dyn StructuredStoreView) -> CheckReport {
    let mut report = CheckReport::new(MOMENTS_STRUCTURE_CHECK);
    let mut asserts = Assertions::new(&mut report, Tolerance::default());
    let halted = verify_structure(moments, store, &mut asserts).is_err();
    info!(
        check = MOMENTS_STRUCTURE_CHECK,
        halted,
        assertions = report.assertion_count,
        failures = report.failures.len(),
        "check finished"
    );
    report
}

fn verify_structure(
    moments: &MomentSet,
    store: &dyn StructuredStoreView,
    asserts: &mut Assertions<'_>,
) -> Result<(), Halt> {
    let expected_executions: BTreeSet<ExecutionId> = moments.execution_ids().collect();
    let groups = store
        .members(&StorePath::results_root())
        .unwrap_or_default();

    let mut stored_executions = BTreeSet::new();
    for name in &groups {
        let execution = asserts.require_with(
            ExecutionId::parse_group_name(name)
                .ok_or_else(|| Mismatch::structure(format!("store holds unexpected group {name}"))),
        )?;
        stored_executions.insert(execution);
    }
    asserts.require(ensure(stored_executions == expected_executions, || {
        Mismatch::structure(format!(
            "console reports executions {}, store holds {}",
            render_executions(&expected_executions),
            render_executions(&stored_executions)
        ))
    }))?;

    let expected_descriptors: BTreeSet<String> = moments
        .descriptors()
        .into_iter()
        .map(str::to_string)
        .collect();
    for execution in moments.execution_ids() {
        let stored = store
            .members(&StorePath::category(execution, ResultCategory::Moments))
            .unwrap_or_default();
        asserts.require(ensure(stored == expected_descriptors, || {
            Mismatch::structure(format!(
                "{execution}: console descriptors {expected_descriptors:?}, store descriptors {stored:?}"
            ))
        }))?;
    }
    Ok(())
}

fn render_executions(executions: &BTreeSet<ExecutionId>) -> String {
    let names: Vec<String> = executions.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}

/// Every (execution, descriptor) moment vector matches, with its
/// `moments` scale.
#[must_use]
pub fn check_moments(
    moments: &MomentSet,
    store: &dyn StructuredStoreView,
    tolerance: Tolerance,
) -> CheckReport {
    let mut report = CheckReport::new(MOMENTS_CHECK);
    let mut asserts = Assertions::new(&mut report, tolerance);
    let halted = compare_moments(moments, store, &mut asserts).is_err();
    info!(
        check = MOMENTS_CHECK,
        halted,
        assertions = report.assertion_count,
        failures = report.failures.len(),
        "check finished"
    );
    report
}

fn compare_moments(
    moments: &MomentSet,
    store: &dyn StructuredStoreView,
    asserts: &mut Assertions<'_>,
) -> Result<(), Halt> {
    for (execution, rows) in moments.iter() {
        for (descriptor, row) in rows {
            let site = Site::new(execution, descriptor);
            let path = StorePath::dataset(execution, ResultCategory::Moments, descriptor);
            let Some(stored) = store.probe(&path) else {
                return asserts.require(Err(Mismatch::missing_dataset(
                    &site,
                    ResultCategory::Moments,
                )));
            };
            asserts.require(sole_text_scale(&site, stored, 0, "moments", &MOMENT_LABELS))?;
            asserts.require(ensure(stored.shape == [MOMENT_LABELS.len()], || {
                Mismatch::structure(format!(
                    "{path} has shape {:?}, expected [4]",
                    stored.shape
                ))
            }))?;
            for (index, (label, console)) in MOMENT_LABELS.iter().zip(row.values()).enumerate() {
                let value = stored.at(&[index]).unwrap_or(f64::NAN);
                asserts.close(&site, label, console, value);
            }
        }
    }
    Ok(())
}

/// Every 2x2 (bound, moment) confidence-interval block matches, with
/// `bounds` and `moments` scales on its two axes.
#[must_use]
pub fn check_confidence_intervals(
    intervals: &ConfidenceIntervalSet,
    store: &dyn StructuredStoreView,
    tolerance: Tolerance,
) -> CheckReport {
    let mut report = CheckReport::new(CONFIDENCE_INTERVALS_CHECK);
    let mut asserts = Assertions::new(&mut report, tolerance);
    let halted = compare_confidence_intervals(intervals, store, &mut asserts).is_err();
    info!(
        check = CONFIDENCE_INTERVALS_CHECK,
        halted,
        assertions = report.assertion_count,
        failures = report.failures.len(),
        "check finished"
    );
    report
}

fn compare_confidence_intervals(
    intervals: &ConfidenceIntervalSet,
    store: &dyn StructuredStoreView,
    asserts: &mut Assertions<'_>,
) -> Result<(), Halt> {
    let category = ResultCategory::MomentConfidenceIntervals;
    for (execution, blocks) in intervals.iter() {
        for (descriptor, block) in blocks {
            let site = Site::new(execution, descriptor);
            let path = StorePath::dataset(execution, category, descriptor);
            let Some(stored) = store.probe(&path) else {
                return asserts.require(Err(Mismatch::missing_dataset(&site, category)));
            };
            asserts.require(sole_text_scale(&site, stored, 0, "bounds", &CI_BOUND_LABELS))?;
            asserts.require(sole_text_scale(&site, stored, 1, "moments", &CI_MOMENT_LABELS))?;
            asserts.require(ensure(stored.shape == [2, 2], || {
                Mismatch::structure(format!(
                    "{path} has shape {:?}, expected [2, 2]",
                    stored.shape
                ))
            }))?;
            for (b, bound) in Bound::ALL.into_iter().enumerate() {
                for (m, moment) in IntervalMoment::ALL.into_iter().enumerate() {
                    let field = format!("{}_{}", bound.as_str(), moment.as_str());
                    let value = stored.at(&[b, m]).unwrap_or(f64::NAN);
                    asserts.close(&site, &field, block.cell(bound, moment), value);
                }
            }
        }
    }
    Ok(())
}
