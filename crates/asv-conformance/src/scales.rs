//! Dimension-scale conventions shared by the reconcilers.

use crate::mismatch::{Mismatch, Site};
use asv_store::{DimensionScale, LabeledCollection};
use std::collections::BTreeSet;

fn describe(scales: &[DimensionScale]) -> String {
    let names: Vec<&str> = scales.iter().map(|scale| scale.name.as_str()).collect();
    format!("{names:?}")
}

/// The axis carries exactly one scale and it is named `name`.
pub(crate) fn sole_scale<'c>(
    site: &Site,
    collection: &'c LabeledCollection,
    axis: usize,
    name: &str,
) -> Result<&'c DimensionScale, Mismatch> {
    match collection.scales(axis) {
        [scale] if scale.name == name => Ok(scale),
        scales => Err(Mismatch::ScaleLabel {
            site: site.clone(),
            axis,
            expected: format!("[{name:?}]"),
            found: describe(scales),
        }),
    }
}

/// As [`sole_scale`], and the scale's labels are exactly `labels`.
pub(crate) fn sole_text_scale(
    site: &Site,
    collection: &LabeledCollection,
    axis: usize,
    name: &str,
    labels: &[&str],
) -> Result<(), Mismatch> {
    let scale = sole_scale(site, collection, axis, name)?;
    let matches = scale
        .values
        .text()
        .is_some_and(|found| found.iter().map(String::as_str).eq(labels.iter().copied()));
    if matches {
        Ok(())
    } else {
        Err(Mismatch::ScaleLabel {
            site: site.clone(),
            axis,
            expected: format!("{name} = {labels:?}"),
            found: format!("{name} = {:?}", scale.values),
        })
    }
}

/// The set of scale names on the axis is exactly `names`.
pub(crate) fn scale_name_set(
    site: &Site,
    collection: &LabeledCollection,
    axis: usize,
    names: &[&str],
) -> Result<(), Mismatch> {
    let scales = collection.scales(axis);
    let found: BTreeSet<&str> = scales.iter().map(|scale| scale.name.as_str()).collect();
    let expected: BTreeSet<&str> = names.iter().copied().collect();
    if found == expected && found.len() == scales.len() {
        Ok(())
    } else {
        Err(Mismatch::ScaleLabel {
            site: site.clone(),
            axis,
            expected: format!("{expected:?}"),
            found: describe(scales),
        })
    }
}

/// Numeric labels of a named scale, checked to cover `len` positions.
pub(crate) fn numeric_labels<'c>(
    site: &Site,
    scale: &'c DimensionScale,
    axis: usize,
    len: usize,
) -> Result<&'c [f64], Mismatch> {
    match scale.values.numeric() {
        Some(values) if values.len() == len => Ok(values),
        _ => Err(Mismatch::ScaleLabel {
            site: site.clone(),
            axis,
            expected: format!("{} numeric labels for {}", len, scale.name),
            found: format!("{:?}", scale.values),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{scale_name_set, sole_text_scale};
    use crate::mismatch::Site;
    use asv_model::{ExecutionId, MOMENT_LABELS};
    use asv_store::{DimensionScale, LabeledCollection};

    fn site() -> Site {
        Site::new(ExecutionId::from_index(0), "f1")
    }

    #[test]
    fn scale_name_is_case_sensitive() {
        let collection = LabeledCollection::vector(
            vec![0.0; 4],
            DimensionScale::text("Moments", &MOMENT_LABELS),
        );
        let err = sole_text_scale(&site(), &collection, 0, "moments", &MOMENT_LABELS)
            .expect_err("label variant rejected");
        assert_eq!(err.reason_code(), "scale_label_mismatch");
    }

    #[test]
    fn label_order_matters() {
        let collection = LabeledCollection::vector(
            vec![0.0; 4],
            DimensionScale::text("moments", &["std_deviation", "mean", "skewness", "kurtosis"]),
        );
        assert!(sole_text_scale(&site(), &collection, 0, "moments", &MOMENT_LABELS).is_err());
    }

    #[test]
    fn density_scales_compare_as_a_set() {
        let collection = LabeledCollection::with_dims(
            vec![1],
            vec![0.5],
            vec![vec![
                DimensionScale::numeric("upper_bounds", vec![1.0]),
                DimensionScale::numeric("lower_bounds", vec![0.0]),
            ]],
        );
        assert!(scale_name_set(&site(), &collection, 0, &["lower_bounds", "upper_bounds"]).is_ok());
        assert!(scale_name_set(&site(), &collection, 0, &["lower_bounds"]).is_err());
    }
}
