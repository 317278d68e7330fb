//! Prediction outcome data structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Final class decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "GDM")]
    Gdm,
    #[serde(rename = "Non GDM")]
    NonGdm,
}

impl Label {
    /// Map a raw class value (0/1) to a label.
    pub fn from_class(class: f64) -> Self {
        if class.round() as i64 == 1 {
            Label::Gdm
        } else {
            Label::NonGdm
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Gdm => write!(f, "GDM"),
            Label::NonGdm => write!(f, "Non GDM"),
        }
    }
}

/// Risk category classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    #[serde(rename = "Low Risk")]
    Low,
    #[serde(rename = "Moderate Risk")]
    Moderate,
    #[serde(rename = "High Risk")]
    High,
}

impl RiskCategory {
    /// Probability-only banding used by the legacy policy
    pub fn from_probability(gdm_probability: f64) -> Self {
        if gdm_probability < 0.3 {
            RiskCategory::Low
        } else if gdm_probability < 0.6 {
            RiskCategory::Moderate
        } else {
            RiskCategory::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "Low Risk",
            RiskCategory::Moderate => "Moderate Risk",
            RiskCategory::High => "High Risk",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clinical guidance attached to an extended-policy outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendations {
    pub immediate_action: String,
    pub monitoring: String,
    pub lifestyle: String,
    pub follow_up: String,
}

impl Recommendations {
    pub fn high() -> Self {
        Self::from_parts(
            "Consult with healthcare provider immediately for comprehensive GDM management",
            "Regular blood glucose monitoring and dietary modifications required",
            "Implement supervised exercise program and nutritional counseling",
            "Weekly monitoring with healthcare team recommended",
        )
    }

    pub fn moderate() -> Self {
        Self::from_parts(
            "Schedule follow-up appointment within 1-2 weeks",
            "Increase frequency of glucose monitoring",
            "Focus on healthy diet and regular physical activity",
            "Bi-weekly check-ups recommended",
        )
    }

    pub fn low() -> Self {
        Self::from_parts(
            "Continue routine prenatal care",
            "Standard prenatal glucose screening as scheduled",
            "Maintain healthy lifestyle with balanced diet and exercise",
            "Regular prenatal appointments as planned",
        )
    }

    fn from_parts(immediate_action: &str, monitoring: &str, lifestyle: &str, follow_up: &str) -> Self {
        Self {
            immediate_action: immediate_action.to_string(),
            monitoring: monitoring.to_string(),
            lifestyle: lifestyle.to_string(),
            follow_up: follow_up.to_string(),
        }
    }
}

/// Named boolean risk markers derived from the raw record
pub type RiskFactors = BTreeMap<String, bool>;

/// Interpreted result for one patient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    #[serde(rename = "prediction")]
    pub label: Label,
    pub gdm_probability: f64,
    pub non_gdm_probability: f64,
    pub risk_category: RiskCategory,
    pub confidence: f64,
    pub risk_factors: RiskFactors,
    #[serde(
        rename = "clinical_recommendations",
        skip_serializing_if = "Option::is_none"
    )]
    pub recommendations: Option<Recommendations>,
}
