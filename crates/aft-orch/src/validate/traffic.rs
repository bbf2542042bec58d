//! Traffic distribution validation.
//!
//! Compares an observed per-egress packet split against the ratios a
//! resolution predicts. Loss is checked first; the ratio comparison uses
//! an absolute tolerance on each egress share.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Absolute tolerance on loss and on each egress share.
pub const DEFAULT_TOLERANCE: f64 = 0.02;

/// Inputs the validator refuses to judge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The generator transmitted nothing, which is a harness fault rather
    /// than 0% loss.
    #[error("no traffic sent")]
    NoTrafficSent,

    #[error("tolerance {0} outside [0, 1]")]
    InvalidTolerance(f64),

    #[error("expected ratio {ratio} for {egress} outside [0, 1]")]
    InvalidExpectedRatio { egress: String, ratio: f64 },
}

/// Packet counters gathered for one flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficObservation<K: Ord = String> {
    pub sent: u64,
    pub received: BTreeMap<K, u64>,
}

impl<K: Ord> TrafficObservation<K> {
    pub fn new(sent: u64) -> Self {
        Self {
            sent,
            received: BTreeMap::new(),
        }
    }

    pub fn with_egress(mut self, egress: K, packets: u64) -> Self {
        *self.received.entry(egress).or_insert(0) += packets;
        self
    }

    pub fn total_received(&self) -> u64 {
        self.received.values().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    /// `(sent - received) / sent * 100`; negative when duplicates arrive.
    pub fn loss_pct(&self) -> Option<f64> {
        if self.sent == 0 {
            return None;
        }
        let sent = self.sent as f64;
        Some((sent - self.total_received() as f64) / sent * 100.0)
    }
}

/// Expected against observed share for one egress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioCheck<K> {
    pub egress: K,
    pub expected: f64,
    pub observed: f64,
    pub packets: u64,
    pub pass: bool,
}

impl<K> RatioCheck<K> {
    pub fn deviation(&self) -> f64 {
        (self.observed - self.expected).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport<K = String> {
    pub sent: u64,
    pub received: u64,
    pub loss_pct: f64,
    pub expect_total_loss: bool,
    pub tolerance: f64,
    pub loss_ok: bool,
    /// Empty when the ratio comparison was skipped (total loss expected,
    /// or nothing arrived).
    pub ratios: Vec<RatioCheck<K>>,
    pub pass: bool,
}

impl<K> ValidationReport<K> {
    pub fn failed_ratios(&self) -> impl Iterator<Item = &RatioCheck<K>> {
        self.ratios.iter().filter(|check| !check.pass)
    }

    pub fn ratio_of(&self, egress: &K) -> Option<&RatioCheck<K>>
    where
        K: PartialEq,
    {
        self.ratios.iter().find(|check| &check.egress == egress)
    }
}

impl<K: fmt::Display> fmt::Display for ValidationReport<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: sent={} received={} loss={:.2}% (want {} {:.2}%)",
            if self.pass { "PASS" } else { "FAIL" },
            self.sent,
            self.received,
            self.loss_pct,
            if self.expect_total_loss { ">=" } else { "<=" },
            if self.expect_total_loss {
                100.0 - self.tolerance * 100.0
            } else {
                self.tolerance * 100.0
            }
        )?;
        for check in &self.ratios {
            write!(
                f,
                "\n  {} expected={:.4} observed={:.4} packets={}{}",
                check.egress,
                check.expected,
                check.observed,
                check.packets,
                if check.pass { "" } else { " MISMATCH" }
            )?;
        }
        Ok(())
    }
}

/// Stateless judge of traffic observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficValidator {
    tolerance: f64,
}

impl Default for TrafficValidator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl TrafficValidator {
    pub fn new(tolerance: f64) -> Result<Self, ValidationError> {
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(ValidationError::InvalidTolerance(tolerance));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Judges `observation` against `expected` shares.
    ///
    /// Egresses that saw traffic but are missing from `expected` are
    /// checked against a share of zero.
    pub fn validate<K>(
        &self,
        observation: &TrafficObservation<K>,
        expected: &BTreeMap<K, f64>,
        expect_total_loss: bool,
    ) -> Result<ValidationReport<K>, ValidationError>
    where
        K: Ord + Clone + fmt::Display,
    {
        for (egress, ratio) in expected {
            if !(0.0..=1.0).contains(ratio) {
                return Err(ValidationError::InvalidExpectedRatio {
                    egress: egress.to_string(),
                    ratio: *ratio,
                });
            }
        }
        let Some(loss_pct) = observation.loss_pct() else {
            audit_log!(AuditRecord::new(AuditCategory::Validation, "TrafficValidator", "validate")
                .with_error(ValidationError::NoTrafficSent.to_string()));
            return Err(ValidationError::NoTrafficSent);
        };

        let tolerance_pct = self.tolerance * 100.0;
        let loss_ok = if expect_total_loss {
            loss_pct >= 100.0 - tolerance_pct
        } else {
            loss_pct <= tolerance_pct
        };

        let received = observation.total_received();
        let mut ratios = Vec::new();
        if !expect_total_loss && received > 0 {
            let egresses: BTreeSet<&K> =
                expected.keys().chain(observation.received.keys()).collect();
            for egress in egresses {
                let packets = observation.received.get(egress).copied().unwrap_or(0);
                let expected_ratio = expected.get(egress).copied().unwrap_or(0.0);
                let observed = packets as f64 / received as f64;
                ratios.push(RatioCheck {
                    egress: egress.clone(),
                    expected: expected_ratio,
                    observed,
                    packets,
                    pass: (observed - expected_ratio).abs() <= self.tolerance,
                });
            }
        }

        let pass = loss_ok && ratios.iter().all(|check| check.pass);
        let report = ValidationReport {
            sent: observation.sent,
            received,
            loss_pct,
            expect_total_loss,
            tolerance: self.tolerance,
            loss_ok,
            ratios,
            pass,
        };

        let record = AuditRecord::new(AuditCategory::Validation, "TrafficValidator", "validate")
            .with_object_type("traffic")
            .with_details(serde_json::json!({
                "sent": report.sent,
                "received": report.received,
                "loss_pct": report.loss_pct,
                "expect_total_loss": expect_total_loss,
                "mismatches": report
                    .failed_ratios()
                    .map(|c| c.egress.to_string())
                    .collect::<Vec<_>>(),
            }));
        if report.pass {
            audit_log!(record.with_outcome(AuditOutcome::Success));
        } else {
            audit_log!(record.with_error(format!("loss {:.2}%", report.loss_pct)));
        }
        Ok(report)
    }
}

/// One-shot form of [`TrafficValidator::validate`].
pub fn validate_distribution<K>(
    observation: &TrafficObservation<K>,
    expected: &BTreeMap<K, f64>,
    tolerance: f64,
    expect_total_loss: bool,
) -> Result<ValidationReport<K>, ValidationError>
where
    K: Ord + Clone + fmt::Display,
{
    TrafficValidator::new(tolerance)?.validate(observation, expected, expect_total_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expected(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_weighted_split_within_tolerance() {
        let obs = TrafficObservation::new(10_000)
            .with_egress("port2".to_string(), 7_420)
            .with_egress("port3".to_string(), 2_570);
        let report = TrafficValidator::default()
            .validate(&obs, &expected(&[("port2", 0.75), ("port3", 0.25)]), false)
            .unwrap();
        assert!(report.pass, "{report}");
        assert!((report.loss_pct - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_split_outside_tolerance_fails() {
        let obs = TrafficObservation::new(1_000)
            .with_egress("port2".to_string(), 500)
            .with_egress("port3".to_string(), 500);
        let report = TrafficValidator::default()
            .validate(&obs, &expected(&[("port2", 0.75), ("port3", 0.25)]), false)
            .unwrap();
        assert!(!report.pass);
        assert!(report.loss_ok);
        assert_eq!(report.failed_ratios().count(), 2);
        assert!(report.to_string().contains("MISMATCH"));
    }

    #[test]
    fn test_unexpected_egress_counts_against_zero() {
        let obs = TrafficObservation::new(100)
            .with_egress("port2".to_string(), 90)
            .with_egress("port9".to_string(), 10);
        let report = TrafficValidator::default()
            .validate(&obs, &expected(&[("port2", 1.0)]), false)
            .unwrap();
        assert!(!report.pass);
        let stray = report.ratio_of(&"port9".to_string()).unwrap();
        assert_eq!(stray.expected, 0.0);
        assert!(!stray.pass);
    }

    #[test]
    fn test_loss_fails_without_total_loss_expectation() {
        let obs = TrafficObservation::new(1_000).with_egress("port2".to_string(), 900);
        let report = TrafficValidator::default()
            .validate(&obs, &expected(&[("port2", 1.0)]), false)
            .unwrap();
        assert!(!report.loss_ok);
        assert!(!report.pass);
    }

    #[test]
    fn test_total_loss_expected() {
        let obs: TrafficObservation = TrafficObservation::new(1_000);
        let report = TrafficValidator::default()
            .validate(&obs, &BTreeMap::new(), true)
            .unwrap();
        assert!(report.pass);
        assert!(report.ratios.is_empty());

        let leaked = TrafficObservation::new(1_000).with_egress("port2".to_string(), 100);
        let report = TrafficValidator::default()
            .validate(&leaked, &BTreeMap::new(), true)
            .unwrap();
        assert!(!report.pass);
    }

    #[test]
    fn test_zero_sent_is_an_error() {
        let obs = TrafficObservation::new(0).with_egress("port2".to_string(), 0);
        assert_eq!(
            TrafficValidator::default()
                .validate(&obs, &expected(&[("port2", 1.0)]), false)
                .unwrap_err(),
            ValidationError::NoTrafficSent
        );
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert_eq!(
            TrafficValidator::new(1.5).unwrap_err(),
            ValidationError::InvalidTolerance(1.5)
        );
        let obs = TrafficObservation::new(10).with_egress("port2".to_string(), 10);
        assert!(matches!(
            validate_distribution(&obs, &expected(&[("port2", 2.0)]), 0.02, false),
            Err(ValidationError::InvalidExpectedRatio { .. })
        ));
    }
}
