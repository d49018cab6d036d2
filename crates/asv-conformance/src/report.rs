use crate::mismatch::{Mismatch, Site};
use crate::tolerance::Tolerance;
use tracing::warn;

/// Outcome of one check. Value mismatches accumulate; a fatal mismatch
/// is the last entry recorded before the check stopped.
#[derive(Debug)]
pub struct CheckReport {
    pub check: &'static str,
    pub assertion_count: usize,
    pub failures: Vec<Mismatch>,
}

impl CheckReport {
    #[must_use]
    pub fn new(check: &'static str) -> Self {
        Self {
            check,
            assertion_count: 0,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.assertion_count.saturating_sub(self.failures.len())
    }

    /// Counts and records a failure that does not correspond to a
    /// completed assertion, such as an unreadable store.
    pub fn record_fatal(&mut self, failure: Mismatch) {
        warn!(check = self.check, reason_code = failure.reason_code(), "{failure}");
        self.assertion_count += 1;
        self.failures.push(failure);
    }

    #[must_use]
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn reason_codes(&self) -> Vec<&'static str> {
        let mut codes: Vec<&'static str> =
            self.failures.iter().map(Mismatch::reason_code).collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

/// Marker returned once a fatal mismatch has been recorded; the
/// current check (or descriptor) stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Halt;

/// Assertion recorder handed to the reconcilers.
pub(crate) struct Assertions<'a> {
    report: &'a mut CheckReport,
    tolerance: Tolerance,
}

impl<'a> Assertions<'a> {
    pub(crate) fn new(report: &'a mut CheckReport, tolerance: Tolerance) -> Self {
        Self { report, tolerance }
    }

    /// Tolerance-compares one scalar; a miss is recorded and the caller
    /// carries on with sibling assertions.
    pub(crate) fn close(&mut self, site: &Site, field: &str, console: f64, store: f64) -> bool {
        self.report.assertion_count += 1;
        if self.tolerance.approx_eq(console, store) {
            return true;
        }
        let failure = Mismatch::Value {
            site: site.clone(),
            field: field.to_string(),
            console,
            store,
        };
        warn!(check = self.report.check, "{failure}");
        self.report.failures.push(failure);
        false
    }

    /// Records a passing structural assertion, or the failure it raised.
    pub(crate) fn require(&mut self, outcome: Result<(), Mismatch>) -> Result<(), Halt> {
        self.require_with(outcome)
    }

    /// As [`Self::require`], passing the checked value through.
    pub(crate) fn require_with<T>(&mut self, outcome: Result<T, Mismatch>) -> Result<T, Halt> {
        match outcome {
            Ok(value) => {
                self.report.assertion_count += 1;
                Ok(value)
            }
            Err(failure) => {
                self.report.record_fatal(failure);
                Err(Halt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Assertions, CheckReport};
    use crate::mismatch::{Mismatch, Site};
    use crate::tolerance::Tolerance;
    use asv_model::ExecutionId;

    #[test]
    fn value_misses_do_not_stop_siblings() {
        let mut report = CheckReport::new("moments");
        let site = Site::new(ExecutionId::from_index(0), "f1");
        {
            let mut asserts = Assertions::new(&mut report, Tolerance::default());
            assert!(!asserts.close(&site, "mean", 1.0, 2.0));
            assert!(asserts.close(&site, "std_deviation", 3.0, 3.0));
            assert!(asserts.require(Err(Mismatch::structure("gone"))).is_err());
        }
        assert_eq!(report.assertion_count, 3);
        assert_eq!(report.pass_count(), 1);
        assert_eq!(
            report.reason_codes(),
            vec!["structure_mismatch", "value_mismatch"]
        );
        assert!(!report.all_passed());
    }
}
