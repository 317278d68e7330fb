//! Feature engineering for GDM model inference.
//!
//! Derives the secondary columns the ensemble was trained on (risk bins,
//! ordinal scores, blood-pressure features, interaction and log terms) from
//! the raw clinical record. Every derivation only runs when its source
//! columns are present.

use crate::audit::{Audit, PipelineWarning};
use crate::types::features::EnhancedRecord;
use crate::types::patient::{columns, PatientRecord};
use thiserror::Error;

pub const BMI_CATEGORY: &str = "BMI_Category";
pub const BMI_RISK_SCORE: &str = "BMI_Risk_Score";
pub const OGTT_CATEGORY: &str = "OGTT_Category";
pub const OGTT_RISK_SCORE: &str = "OGTT_Risk_Score";
pub const BMI_OGTT_RISK: &str = "BMI_OGTT_Risk";
pub const AGE_BMI_INTERACTION: &str = "Age_BMI_Interaction";
pub const BP_RATIO: &str = "BP_Ratio";
pub const PULSE_PRESSURE: &str = "Pulse_Pressure";
pub const MEAN_ARTERIAL_PRESSURE: &str = "Mean_Arterial_Pressure";
pub const HYPERTENSIVE: &str = "Hypertensive";
pub const COMPREHENSIVE_RISK_SCORE: &str = "Comprehensive_Risk_Score";
pub const HIGH_RISK_BMI: &str = "High_Risk_BMI";
pub const HIGH_RISK_OGTT: &str = "High_Risk_OGTT";
pub const ADVANCED_AGE: &str = "Advanced_Age";
pub const BMI_LOG: &str = "BMI_log";
pub const OGTT_LOG: &str = "OGTT_log";

/// BMI bucket. Upper bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }

    pub fn risk_score(&self) -> f64 {
        match self {
            BmiCategory::Underweight => 1.0,
            BmiCategory::Normal => 0.0,
            BmiCategory::Overweight => 2.0,
            BmiCategory::Obese => 4.0,
        }
    }
}

/// OGTT bucket (mg/dL). Upper bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OgttCategory {
    Normal,
    Impaired,
    Diabetic,
}

impl OgttCategory {
    pub fn from_ogtt(ogtt: f64) -> Self {
        if ogtt < 140.0 {
            OgttCategory::Normal
        } else if ogtt < 200.0 {
            OgttCategory::Impaired
        } else {
            OgttCategory::Diabetic
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OgttCategory::Normal => "Normal",
            OgttCategory::Impaired => "Impaired",
            OgttCategory::Diabetic => "Diabetic",
        }
    }

    pub fn risk_score(&self) -> f64 {
        match self {
            OgttCategory::Normal => 0.0,
            OgttCategory::Impaired => 3.0,
            OgttCategory::Diabetic => 5.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("derived feature {feature} is not finite ({value})")]
    NonFinite { feature: &'static str, value: f64 },
}

/// Stateless transformer reproducing the training-time feature derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Derive features, falling back to the raw record on failure.
    ///
    /// A failure is recorded in `audit` and never aborts the request.
    pub fn engineer(&self, record: &PatientRecord, audit: &mut Audit) -> EnhancedRecord {
        match self.try_engineer(record) {
            Ok(enhanced) => enhanced,
            Err(e) => {
                audit.record(PipelineWarning::FeatureEngineeringFailed {
                    reason: e.to_string(),
                });
                EnhancedRecord::from(record)
            }
        }
    }

    /// Derive features, failing on any non-finite derived value.
    pub fn try_engineer(&self, record: &PatientRecord) -> Result<EnhancedRecord, FeatureError> {
        let mut out = EnhancedRecord::from(record);

        let age = record.get(columns::AGE);
        let bmi = record.get(columns::BMI);
        let ogtt = record.get(columns::OGTT);
        let sys = record.get(columns::SYS_BP);
        let dia = record.get(columns::DIA_BP);

        // Bins and ordinal scores
        let bmi_score = bmi.map(|v| {
            let category = BmiCategory::from_bmi(v);
            out.set_category(BMI_CATEGORY, category.label());
            out.set_number(BMI_RISK_SCORE, category.risk_score());
            category.risk_score()
        });
        let ogtt_score = ogtt.map(|v| {
            let category = OgttCategory::from_ogtt(v);
            out.set_category(OGTT_CATEGORY, category.label());
            out.set_number(OGTT_RISK_SCORE, category.risk_score());
            category.risk_score()
        });

        if let (Some(b), Some(o)) = (bmi_score, ogtt_score) {
            out.set_number(BMI_OGTT_RISK, b + o);
        }

        if let (Some(age), Some(bmi)) = (age, bmi) {
            set_finite(&mut out, AGE_BMI_INTERACTION, age * bmi / 100.0)?;
        }

        // Blood pressure
        let hypertensive = match (sys, dia) {
            (Some(sys), Some(dia)) => {
                set_finite(&mut out, BP_RATIO, sys / dia)?;
                set_finite(&mut out, PULSE_PRESSURE, sys - dia)?;
                set_finite(&mut out, MEAN_ARTERIAL_PRESSURE, (sys + 2.0 * dia) / 3.0)?;
                let flag = indicator(sys >= 140.0 || dia >= 90.0);
                out.set_number(HYPERTENSIVE, flag);
                Some(flag)
            }
            _ => None,
        };

        let comprehensive = 2.0 * ogtt_score.unwrap_or(0.0)
            + 1.5 * bmi_score.unwrap_or(0.0)
            + 2.0 * age.map_or(0.0, |a| indicator(a > 35.0))
            + 2.0 * record.get_or(columns::FAMILY_HISTORY, 0.0)
            + 2.5 * record.get_or(columns::PCOS, 0.0)
            + record
                .get(columns::NO_OF_PREGNANCY)
                .map_or(0.0, |p| indicator(p > 2.0))
            + 1.5 * hypertensive.unwrap_or(0.0);
        set_finite(&mut out, COMPREHENSIVE_RISK_SCORE, comprehensive)?;

        if let Some(bmi) = bmi {
            out.set_number(HIGH_RISK_BMI, indicator(bmi >= 30.0));
        }
        if let Some(ogtt) = ogtt {
            out.set_number(HIGH_RISK_OGTT, indicator(ogtt >= 140.0));
        }
        if let Some(age) = age {
            out.set_number(ADVANCED_AGE, indicator(age >= 35.0));
        }

        // Log transforms for skewed inputs
        if let Some(bmi) = bmi {
            set_finite(&mut out, BMI_LOG, bmi.ln_1p())?;
        }
        if let Some(ogtt) = ogtt {
            set_finite(&mut out, OGTT_LOG, ogtt.ln_1p())?;
        }

        Ok(out)
    }

    /// Names of every column this engineer can derive.
    pub fn derived_feature_names(&self) -> Vec<&'static str> {
        vec![
            BMI_CATEGORY,
            BMI_RISK_SCORE,
            OGTT_CATEGORY,
            OGTT_RISK_SCORE,
            BMI_OGTT_RISK,
            AGE_BMI_INTERACTION,
            BP_RATIO,
            PULSE_PRESSURE,
            MEAN_ARTERIAL_PRESSURE,
            HYPERTENSIVE,
            COMPREHENSIVE_RISK_SCORE,
            HIGH_RISK_BMI,
            HIGH_RISK_OGTT,
            ADVANCED_AGE,
            BMI_LOG,
            OGTT_LOG,
        ]
    }
}

fn indicator(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

fn set_finite(out: &mut EnhancedRecord, feature: &'static str, value: f64) -> Result<(), FeatureError> {
    if !value.is_finite() {
        return Err(FeatureError::NonFinite { feature, value });
    }
    out.set_number(feature, value);
    Ok(())
}
