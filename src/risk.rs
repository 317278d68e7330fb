//! Turns ensemble output into a labelled, categorized outcome.
//!
//! Two policies exist. `Simple` reproduces the legacy service (probability
//! bands only, strict comparisons on the risk flags). `Extended` applies
//! the calibrated decision threshold, counts clinical markers and attaches
//! recommendations.

use crate::models::bundle::ProblemType;
use crate::types::patient::{columns, PatientRecord};
use crate::types::prediction::{Label, PredictionOutcome, Recommendations, RiskCategory, RiskFactors};
use serde::{Deserialize, Serialize};

/// Values assumed by the extended policy for fields a record does not carry.
mod lookup_defaults {
    pub const BMI: f64 = 20.0;
    pub const OGTT: f64 = 100.0;
    pub const AGE: f64 = 20.0;
    pub const HDL: f64 = 50.0;
    pub const HEMOGLOBIN: f64 = 12.0;
    pub const PREGNANCIES: f64 = 1.0;
}

/// Output above this is GDM for legacy regression bundles.
const REGRESSION_CUTOFF: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskPolicy {
    Simple,
    Extended,
}

/// Deterministic mapping from one ensemble row and its patient record to
/// a [`PredictionOutcome`].
#[derive(Debug, Clone, PartialEq)]
pub struct RiskInterpreter {
    policy: RiskPolicy,
    threshold: f64,
    recommendations: bool,
}

impl RiskInterpreter {
    pub fn new(policy: RiskPolicy, threshold: f64, recommendations: bool) -> Self {
        Self {
            policy,
            threshold,
            recommendations,
        }
    }

    pub fn simple() -> Self {
        Self::new(RiskPolicy::Simple, REGRESSION_CUTOFF, false)
    }

    pub fn extended(threshold: f64) -> Self {
        Self::new(RiskPolicy::Extended, threshold, true)
    }

    pub fn policy(&self) -> RiskPolicy {
        self.policy
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Interpret one row.
    ///
    /// `output` is the meta-model's raw prediction (class or regression
    /// value) and `probabilities` its `[P(non-GDM), P(GDM)]`.
    pub fn interpret(
        &self,
        output: f64,
        probabilities: [f64; 2],
        problem_type: ProblemType,
        record: &PatientRecord,
    ) -> PredictionOutcome {
        let gdm_probability = match problem_type {
            ProblemType::Classification => probability(probabilities[1]),
            ProblemType::Regression => probability(output),
        };

        let (label, risk_category, risk_factors) = match self.policy {
            RiskPolicy::Simple => {
                let label = match problem_type {
                    ProblemType::Classification => Label::from_class(output),
                    ProblemType::Regression if output > REGRESSION_CUTOFF => Label::Gdm,
                    ProblemType::Regression => Label::NonGdm,
                };
                (
                    label,
                    RiskCategory::from_probability(gdm_probability),
                    simple_risk_factors(record),
                )
            }
            RiskPolicy::Extended => {
                let label = if gdm_probability >= self.threshold {
                    Label::Gdm
                } else {
                    Label::NonGdm
                };
                (
                    label,
                    extended_category(gdm_probability, marker_count(record)),
                    extended_risk_factors(record),
                )
            }
        };

        let recommendations = (self.policy == RiskPolicy::Extended && self.recommendations)
            .then(|| recommendations_for(label, risk_category));

        let non_gdm_probability = 1.0 - gdm_probability;
        PredictionOutcome {
            label,
            gdm_probability,
            non_gdm_probability,
            risk_category,
            confidence: gdm_probability.max(non_gdm_probability),
            risk_factors,
            recommendations,
        }
    }
}

fn probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Number of major clinical markers present.
pub fn marker_count(record: &PatientRecord) -> usize {
    [
        record.get_or(columns::BMI, lookup_defaults::BMI) >= 30.0,
        record.get_or(columns::OGTT, lookup_defaults::OGTT) >= 140.0,
        record.get_or(columns::AGE, lookup_defaults::AGE) >= 35.0,
        is_set(record, columns::FAMILY_HISTORY),
        is_set(record, columns::PCOS),
    ]
    .into_iter()
    .filter(|&m| m)
    .count()
}

fn extended_category(gdm_probability: f64, markers: usize) -> RiskCategory {
    if gdm_probability >= 0.7 || markers >= 3 {
        RiskCategory::High
    } else if gdm_probability >= 0.4 || markers >= 2 {
        RiskCategory::Moderate
    } else {
        RiskCategory::Low
    }
}

fn recommendations_for(label: Label, category: RiskCategory) -> Recommendations {
    match (label, category) {
        (Label::Gdm, _) | (_, RiskCategory::High) => Recommendations::high(),
        (_, RiskCategory::Moderate) => Recommendations::moderate(),
        _ => Recommendations::low(),
    }
}

fn is_set(record: &PatientRecord, column: &str) -> bool {
    record.get_or(column, 0.0) == 1.0
}

fn previous_complications(record: &PatientRecord) -> bool {
    is_set(record, columns::LARGE_CHILD_OR_BIRTH_DEFECT)
        || is_set(record, columns::UNEXPLAINED_PRENATAL_LOSS)
}

fn simple_risk_factors(record: &PatientRecord) -> RiskFactors {
    let value = |column: &str| record.get_or(column, 0.0);
    [
        ("family_history", is_set(record, columns::FAMILY_HISTORY)),
        ("pcos", is_set(record, columns::PCOS)),
        ("prediabetes", is_set(record, columns::PREDIABETES)),
        ("advanced_age", value(columns::AGE) > 35.0),
        (
            "high_bp",
            value(columns::SYS_BP) > 140.0 || value(columns::DIA_BP) > 90.0,
        ),
        ("previous_complications", previous_complications(record)),
        ("sedentary_lifestyle", is_set(record, columns::SEDENTARY_LIFESTYLE)),
        ("low_hdl", value(columns::HDL) < 40.0),
        ("anemia", value(columns::HEMOGLOBIN) < 11.0),
        ("multiple_pregnancies", value(columns::NO_OF_PREGNANCY) > 2.0),
    ]
    .into_iter()
    .map(|(name, flag)| (name.to_string(), flag))
    .collect()
}

fn extended_risk_factors(record: &PatientRecord) -> RiskFactors {
    let bmi = record.get_or(columns::BMI, lookup_defaults::BMI);
    let ogtt = record.get_or(columns::OGTT, lookup_defaults::OGTT);
    let sys = record.get_or(columns::SYS_BP, 0.0);
    let dia = record.get_or(columns::DIA_BP, 0.0);
    [
        ("obesity", bmi >= 30.0),
        ("overweight", (25.0..30.0).contains(&bmi)),
        ("high_glucose", ogtt >= 140.0),
        ("impaired_glucose", (120.0..140.0).contains(&ogtt)),
        ("family_history", is_set(record, columns::FAMILY_HISTORY)),
        ("pcos", is_set(record, columns::PCOS)),
        ("prediabetes", is_set(record, columns::PREDIABETES)),
        (
            "advanced_age",
            record.get_or(columns::AGE, lookup_defaults::AGE) >= 35.0,
        ),
        ("high_bp", sys >= 140.0 || dia >= 90.0),
        ("previous_complications", previous_complications(record)),
        ("sedentary_lifestyle", is_set(record, columns::SEDENTARY_LIFESTYLE)),
        (
            "low_hdl",
            record.get_or(columns::HDL, lookup_defaults::HDL) < 40.0,
        ),
        (
            "anemia",
            record.get_or(columns::HEMOGLOBIN, lookup_defaults::HEMOGLOBIN) < 11.0,
        ),
        (
            "multiple_pregnancies",
            record.get_or(columns::NO_OF_PREGNANCY, lookup_defaults::PREGNANCIES) > 2.0,
        ),
    ]
    .into_iter()
    .map(|(name, flag)| (name.to_string(), flag))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::patient::PatientData;

    fn record(pairs: &[(&str, f64)]) -> PatientRecord {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_presets() {
        let simple = RiskInterpreter::simple();
        assert_eq!(simple.policy(), RiskPolicy::Simple);
        assert_eq!(simple.threshold(), REGRESSION_CUTOFF);

        let extended = RiskInterpreter::extended(0.42);
        assert_eq!(extended.policy(), RiskPolicy::Extended);
        assert_eq!(extended.threshold(), 0.42);
    }

    #[test]
    fn test_threshold_boundary_is_gdm() {
        let interpreter = RiskInterpreter::extended(0.42);
        let outcome = interpreter.interpret(
            0.0,
            [0.58, 0.42],
            ProblemType::Classification,
            &PatientRecord::new(),
        );
        assert_eq!(outcome.label, Label::Gdm);
        assert_eq!(outcome.risk_category, RiskCategory::Moderate);
        assert_eq!(outcome.recommendations, Some(Recommendations::high()));
    }

    #[test]
    fn test_probabilities_sum_to_one_and_confidence_is_max() {
        let interpreter = RiskInterpreter::extended(0.5);
        for p in [0.0, 0.13, 0.5, 0.77, 1.0] {
            let outcome = interpreter.interpret(
                0.0,
                [0.3, p],
                ProblemType::Classification,
                &PatientRecord::new(),
            );
            assert!((outcome.gdm_probability + outcome.non_gdm_probability - 1.0).abs() < 1e-9);
            assert_eq!(
                outcome.confidence,
                outcome.gdm_probability.max(outcome.non_gdm_probability)
            );
        }
    }

    #[test]
    fn test_markers_raise_category_at_low_probability() {
        let r = record(&[
            (columns::BMI, 31.0),
            (columns::OGTT, 150.0),
            (columns::FAMILY_HISTORY, 1.0),
        ]);
        assert_eq!(marker_count(&r), 3);

        let outcome = RiskInterpreter::extended(0.5).interpret(
            0.0,
            [0.9, 0.1],
            ProblemType::Classification,
            &r,
        );
        assert_eq!(outcome.label, Label::NonGdm);
        assert_eq!(outcome.risk_category, RiskCategory::High);
    }

    #[test]
    fn test_extended_flags_for_high_risk_sample() {
        let r = PatientData::high_risk_sample().to_record(false);
        let outcome =
            RiskInterpreter::extended(0.5).interpret(1.0, [0.1, 0.9], ProblemType::Classification, &r);

        assert_eq!(outcome.risk_factors.len(), 14);
        assert!(outcome.risk_factors["obesity"]);
        assert!(outcome.risk_factors["high_glucose"]);
        assert!(!outcome.risk_factors["overweight"]);
        assert!(!outcome.risk_factors["impaired_glucose"]);
        assert_eq!(outcome.risk_category, RiskCategory::High);
    }

    #[test]
    fn test_extended_lookup_defaults_for_absent_fields() {
        let outcome = RiskInterpreter::extended(0.5).interpret(
            0.0,
            [0.9, 0.1],
            ProblemType::Classification,
            &PatientRecord::new(),
        );
        assert!(outcome.risk_factors.values().all(|&flag| !flag));
        assert_eq!(outcome.risk_category, RiskCategory::Low);
        assert_eq!(outcome.recommendations, Some(Recommendations::low()));
    }

    #[test]
    fn test_impaired_glucose_band() {
        let interpreter = RiskInterpreter::extended(0.5);
        let flags = |ogtt| {
            interpreter
                .interpret(0.0, [1.0, 0.0], ProblemType::Classification, &record(&[(columns::OGTT, ogtt)]))
                .risk_factors
        };
        assert!(!flags(119.9)["impaired_glucose"]);
        assert!(flags(120.0)["impaired_glucose"]);
        assert!(!flags(140.0)["impaired_glucose"]);
        assert!(flags(140.0)["high_glucose"]);
    }

    #[test]
    fn test_simple_policy_uses_class_and_strict_flags() {
        let r = record(&[
            (columns::AGE, 35.0),
            (columns::SYS_BP, 140.0),
            (columns::DIA_BP, 90.0),
            (columns::NO_OF_PREGNANCY, 3.0),
        ]);
        let outcome =
            RiskInterpreter::simple().interpret(1.0, [0.45, 0.55], ProblemType::Classification, &r);

        assert_eq!(outcome.label, Label::Gdm);
        assert_eq!(outcome.risk_category, RiskCategory::Moderate);
        assert_eq!(outcome.risk_factors.len(), 10);
        assert!(!outcome.risk_factors["advanced_age"]);
        assert!(!outcome.risk_factors["high_bp"]);
        assert!(outcome.risk_factors["multiple_pregnancies"]);
        assert!(outcome.risk_factors["low_hdl"]);
        assert!(outcome.recommendations.is_none());
    }

    #[test]
    fn test_simple_policy_regression_output_is_clamped() {
        let interpreter = RiskInterpreter::simple();
        let r = PatientRecord::new();

        let high = interpreter.interpret(1.3, [0.0, 0.0], ProblemType::Regression, &r);
        assert_eq!(high.label, Label::Gdm);
        assert_eq!(high.gdm_probability, 1.0);
        assert_eq!(high.non_gdm_probability, 0.0);
        assert_eq!(high.risk_category, RiskCategory::High);

        let edge = interpreter.interpret(0.5, [0.0, 0.0], ProblemType::Regression, &r);
        assert_eq!(edge.label, Label::NonGdm);
        assert_eq!(edge.risk_category, RiskCategory::Moderate);
    }

    #[test]
    fn test_recommendations_can_be_disabled() {
        let interpreter = RiskInterpreter::new(RiskPolicy::Extended, 0.5, false);
        let outcome = interpreter.interpret(
            1.0,
            [0.2, 0.8],
            ProblemType::Classification,
            &PatientRecord::new(),
        );
        assert!(outcome.recommendations.is_none());
    }
}
