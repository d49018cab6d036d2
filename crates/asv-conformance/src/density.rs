//! Probability-density histograms: bin bounds live in two named scales on
//! axis 0, densities in the dataset itself.

use crate::mismatch::{Mismatch, Site, ensure};
use crate::report::{Assertions, CheckReport, Halt};
use crate::scales::{numeric_labels, scale_name_set};
use crate::tolerance::Tolerance;
use asv_model::{DensityBin, DensitySet};
use asv_store::{LabeledCollection, ResultCategory, StorePath, StructuredStoreView};
use tracing::info;

pub const DENSITIES_CHECK: &str = "densities";

const LOWER_BOUNDS: &str = "lower_bounds";
const UPPER_BOUNDS: &str = "upper_bounds";

#[must_use]
pub fn check_densities(
    densities: &DensitySet,
    store: &dyn StructuredStoreView,
    tolerance: Tolerance,
) -> CheckReport {
    let mut report = CheckReport::new(DENSITIES_CHECK);
    let mut asserts = Assertions::new(&mut report, tolerance);
    let halted = compare_densities(densities, store, &mut asserts).is_err();
    info!(
        check = DENSITIES_CHECK,
        halted,
        assertions = report.assertion_count,
        failures = report.failures.len(),
        "check finished"
    );
    report
}

fn compare_densities(
    densities: &DensitySet,
    store: &dyn StructuredStoreView,
    asserts: &mut Assertions<'_>,
) -> Result<(), Halt> {
    let category = ResultCategory::ProbabilityDensity;
    for (execution, tables) in densities.iter() {
        for (descriptor, bins) in tables {
            let site = Site::new(execution, descriptor);
            let Some(stored) = store.probe(&StorePath::dataset(execution, category, descriptor))
            else {
                return asserts.require(Err(Mismatch::missing_dataset(&site, category)));
            };
            // A bin-count disagreement ends this descriptor only.
            if asserts
                .require(ensure(stored.len() == bins.len(), || {
                    Mismatch::structure(format!(
                        "{}: console has {} density bins, store has {}",
                        site.in_category(category),
                        bins.len(),
                        stored.len()
                    ))
                }))
                .is_err()
            {
                continue;
            }
            compare_bins(&site, bins, stored, asserts)?;
        }
    }
    Ok(())
}

fn compare_bins(
    site: &Site,
    bins: &[DensityBin],
    stored: &LabeledCollection,
    asserts: &mut Assertions<'_>,
) -> Result<(), Halt> {
    asserts.require(scale_name_set(site, stored, 0, &[LOWER_BOUNDS, UPPER_BOUNDS]))?;
    let lower = bound_labels(site, stored, LOWER_BOUNDS, bins.len());
    let upper = bound_labels(site, stored, UPPER_BOUNDS, bins.len());
    let (lower, upper) = match (lower, upper) {
        (Ok(lower), Ok(upper)) => (lower, upper),
        (Err(failure), _) | (_, Err(failure)) => return asserts.require(Err(failure)),
    };

    for (index, bin) in bins.iter().enumerate() {
        let bin_site = site.at_row(index);
        asserts.close(&bin_site, "lower_bound", bin.lower_bound, lower[index]);
        asserts.close(&bin_site, "upper_bound", bin.upper_bound, upper[index]);
        let density = stored.at(&[index]).unwrap_or(f64::NAN);
        asserts.close(&bin_site, "density", bin.density, density);
    }
    Ok(())
}

fn bound_labels<'c>(
    site: &Site,
    stored: &'c LabeledCollection,
    name: &str,
    len: usize,
) -> Result<&'c [f64], Mismatch> {
    let scale = stored
        .scale_named(0, name)
        .ok_or_else(|| Mismatch::ScaleLabel {
            site: site.clone(),
            axis: 0,
            expected: name.to_string(),
            found: "no such scale".to_string(),
        })?;
    numeric_labels(site, scale, 0, len)
}

#[cfg(test)]
mod tests {
    use super::check_densities;
    use crate::tolerance::Tolerance;
    use asv_model::{DensityBin, DensitySet, ExecutionId, ExtractedResultSet};
    use asv_store::{
        DimensionScale, LabeledCollection, MemoryStore, ResultCategory, StorePath,
        with_read_only_store, write_snapshot,
    };
    use std::collections::BTreeMap;

    fn console_bins() -> Vec<DensityBin> {
        vec![
            DensityBin::from([0.0, 1.0, 0.25]),
            DensityBin::from([1.0, 3.0, 0.125]),
            DensityBin::from([3.0, 7.0, 0.0625]),
        ]
    }

    fn console(bins: Vec<DensityBin>) -> DensitySet {
        ExtractedResultSet::new(vec![BTreeMap::from([("f1".to_string(), bins)])])
    }

    fn stored(densities: Vec<f64>, lower: Vec<f64>, upper: Vec<f64>) -> MemoryStore {
        let exec = ExecutionId::from_index(0);
        MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::ProbabilityDensity, "f1"),
            LabeledCollection::with_dims(
                vec![densities.len()],
                densities,
                vec![vec![
                    DimensionScale::numeric("lower_bounds", lower),
                    DimensionScale::numeric("upper_bounds", upper),
                ]],
            ),
        )
    }

    #[test]
    fn matching_histogram_passes() {
        let store = stored(
            vec![0.25, 0.125, 0.0625],
            vec![0.0, 1.0, 3.0],
            vec![1.0, 3.0, 7.0],
        );
        let report = check_densities(&console(console_bins()), &store, Tolerance::default());
        assert!(report.all_passed(), "{:?}", report.failure_messages());
        assert_eq!(report.assertion_count, 2 + 3 * 3);
    }

    #[test]
    fn bin_count_mismatch_stops_the_descriptor() {
        let store = stored(vec![0.25, 0.125], vec![0.0, 1.0], vec![1.0, 3.0]);
        let report = check_densities(&console(console_bins()), &store, Tolerance::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.reason_codes(), vec!["structure_mismatch"]);
        assert!(report.failure_messages()[0].contains("3 density bins, store has 2"));
    }

    #[test]
    fn swapped_bounds_are_value_mismatches() {
        let store = stored(
            vec![0.25, 0.125, 0.0625],
            vec![1.0, 3.0, 7.0],
            vec![0.0, 1.0, 3.0],
        );
        let report = check_densities(&console(console_bins()), &store, Tolerance::default());
        assert_eq!(report.failures.len(), 6);
        assert_eq!(report.reason_codes(), vec!["value_mismatch"]);
        assert!(report.failure_messages()[0].contains("execution:1/f1 row 0: lower_bound"));
    }

    #[test]
    fn empty_histogram_passes_after_a_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        write_snapshot(&path, &stored(Vec::new(), Vec::new(), Vec::new())).expect("snapshot");

        let in_memory = check_densities(
            &console(Vec::new()),
            &stored(Vec::new(), Vec::new(), Vec::new()),
            Tolerance::default(),
        );
        let persisted = with_read_only_store(&path, |store| {
            check_densities(&console(Vec::new()), store, Tolerance::default())
        })
        .expect("open store");
        assert!(in_memory.all_passed(), "{:?}", in_memory.failure_messages());
        assert!(persisted.all_passed(), "{:?}", persisted.failure_messages());
        assert_eq!(persisted.assertion_count, in_memory.assertion_count);
    }

    #[test]
    fn missing_bound_scale_is_a_label_mismatch() {
        let exec = ExecutionId::from_index(0);
        let store = MemoryStore::new().with(
            StorePath::dataset(exec, ResultCategory::ProbabilityDensity, "f1"),
            LabeledCollection::vector(
                vec![0.25, 0.125, 0.0625],
                DimensionScale::numeric("lower_bounds", vec![0.0, 1.0, 3.0]),
            ),
        );
        let report = check_densities(&console(console_bins()), &store, Tolerance::default());
        assert_eq!(report.reason_codes(), vec!["scale_label_mismatch"]);
    }
}
