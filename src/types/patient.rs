//! Patient request data, validation and the canonical per-request record.

use crate::error::{FieldError, ValidationError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Column names as they appear in the training dataset.
pub mod columns {
    pub const AGE: &str = "Age";
    pub const NO_OF_PREGNANCY: &str = "No of Pregnancy";
    pub const GESTATION_IN_PREVIOUS_PREGNANCY: &str = "Gestation in previous Pregnancy";
    pub const BMI: &str = "BMI";
    pub const HDL: &str = "HDL";
    pub const FAMILY_HISTORY: &str = "Family History";
    pub const UNEXPLAINED_PRENATAL_LOSS: &str = "unexplained prenetal loss";
    pub const LARGE_CHILD_OR_BIRTH_DEFECT: &str = "Large Child or Birth Default";
    pub const PCOS: &str = "PCOS";
    pub const SYS_BP: &str = "Sys BP";
    pub const DIA_BP: &str = "Dia BP";
    pub const OGTT: &str = "OGTT";
    pub const HEMOGLOBIN: &str = "Hemoglobin";
    pub const SEDENTARY_LIFESTYLE: &str = "Sedentary Lifestyle";
    pub const PREDIABETES: &str = "Prediabetes";
    pub const CASE_NUMBER: &str = "Case Number";
}

/// Values the legacy backend substituted when BMI/OGTT were not sent.
pub const LEGACY_DEFAULT_BMI: f64 = 22.0;
pub const LEGACY_DEFAULT_OGTT: f64 = 120.0;

/// Prediction request body.
///
/// Field names follow the training dataset; the underscore spellings are
/// accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientData {
    #[serde(rename = "Age")]
    pub age: f64,

    #[serde(
        rename = "No of Pregnancy",
        alias = "No_of_Pregnancy",
        deserialize_with = "integral"
    )]
    pub no_of_pregnancy: i64,

    #[serde(
        rename = "Gestation in previous Pregnancy",
        alias = "Gestation_in_previous_Pregnancy"
    )]
    pub gestation_in_previous_pregnancy: f64,

    /// Body Mass Index (kg/m²); mandatory in the extended pipeline
    #[serde(rename = "BMI", default, skip_serializing_if = "Option::is_none")]
    pub bmi: Option<f64>,

    /// Oral Glucose Tolerance Test (mg/dL); mandatory in the extended pipeline
    #[serde(rename = "OGTT", default, skip_serializing_if = "Option::is_none")]
    pub ogtt: Option<f64>,

    #[serde(rename = "HDL")]
    pub hdl: f64,

    #[serde(
        rename = "Family History",
        alias = "Family_History",
        deserialize_with = "integral"
    )]
    pub family_history: i64,

    #[serde(
        rename = "unexplained prenetal loss",
        alias = "unexplained_prenetal_loss",
        alias = "unexplained_prenatal_loss",
        deserialize_with = "integral"
    )]
    pub unexplained_prenatal_loss: i64,

    #[serde(
        rename = "Large Child or Birth Default",
        alias = "Large_Child_or_Birth_Default",
        alias = "Large_Child_or_Birth_Defect",
        deserialize_with = "integral"
    )]
    pub large_child_or_birth_defect: i64,

    #[serde(rename = "PCOS", deserialize_with = "integral")]
    pub pcos: i64,

    #[serde(rename = "Sys BP", alias = "Sys_BP")]
    pub sys_bp: f64,

    #[serde(rename = "Dia BP", alias = "Dia_BP")]
    pub dia_bp: f64,

    #[serde(rename = "Hemoglobin")]
    pub hemoglobin: f64,

    #[serde(
        rename = "Sedentary Lifestyle",
        alias = "Sedentary_Lifestyle",
        deserialize_with = "integral"
    )]
    pub sedentary_lifestyle: i64,

    #[serde(rename = "Prediabetes", deserialize_with = "integral")]
    pub prediabetes: i64,
}

/// Integer field that also accepts integral floats such as `1.0`.
fn integral<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(D::Error::custom(format!("expected an integer, got {}", value)));
    }
    Ok(value as i64)
}

impl PatientData {
    /// Check every field against its declared range.
    ///
    /// `require_critical` makes BMI and OGTT mandatory.
    pub fn validate(&self, require_critical: bool) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        check_range(&mut errors, columns::AGE, self.age, 15.0, 60.0);
        check_range(
            &mut errors,
            columns::NO_OF_PREGNANCY,
            self.no_of_pregnancy as f64,
            0.0,
            20.0,
        );
        check_range(
            &mut errors,
            columns::GESTATION_IN_PREVIOUS_PREGNANCY,
            self.gestation_in_previous_pregnancy,
            0.0,
            45.0,
        );
        check_range(&mut errors, columns::HDL, self.hdl, 10.0, 150.0);
        check_range(&mut errors, columns::SYS_BP, self.sys_bp, 70.0, 200.0);
        check_range(&mut errors, columns::DIA_BP, self.dia_bp, 40.0, 130.0);
        check_range(&mut errors, columns::HEMOGLOBIN, self.hemoglobin, 5.0, 20.0);

        for (field, value) in [
            (columns::FAMILY_HISTORY, self.family_history),
            (columns::UNEXPLAINED_PRENATAL_LOSS, self.unexplained_prenatal_loss),
            (columns::LARGE_CHILD_OR_BIRTH_DEFECT, self.large_child_or_birth_defect),
            (columns::PCOS, self.pcos),
            (columns::SEDENTARY_LIFESTYLE, self.sedentary_lifestyle),
            (columns::PREDIABETES, self.prediabetes),
        ] {
            if value != 0 && value != 1 {
                errors.push(FieldError::new(field, "must be 0 or 1"));
            }
        }

        if self.sys_bp.is_finite() && self.dia_bp.is_finite() && self.dia_bp >= self.sys_bp {
            errors.push(FieldError::new(
                columns::DIA_BP,
                "Diastolic BP must be less than Systolic BP",
            ));
        }

        for (field, value, min, max) in [
            (columns::BMI, self.bmi, 15.0, 50.0),
            (columns::OGTT, self.ogtt, 50.0, 400.0),
        ] {
            match value {
                Some(v) => check_range(&mut errors, field, v, min, max),
                None if require_critical => {
                    errors.push(FieldError::new(field, "field required"));
                }
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { fields: errors })
        }
    }

    /// Flatten into the canonical record.
    ///
    /// With `legacy_defaults`, absent BMI/OGTT and the `Case Number` column
    /// are filled the way the legacy backend did before prediction.
    pub fn to_record(&self, legacy_defaults: bool) -> PatientRecord {
        let mut record = PatientRecord::new();
        record.insert(columns::AGE, self.age);
        record.insert(columns::NO_OF_PREGNANCY, self.no_of_pregnancy as f64);
        record.insert(
            columns::GESTATION_IN_PREVIOUS_PREGNANCY,
            self.gestation_in_previous_pregnancy,
        );
        record.insert(columns::HDL, self.hdl);
        record.insert(columns::FAMILY_HISTORY, self.family_history as f64);
        record.insert(
            columns::UNEXPLAINED_PRENATAL_LOSS,
            self.unexplained_prenatal_loss as f64,
        );
        record.insert(
            columns::LARGE_CHILD_OR_BIRTH_DEFECT,
            self.large_child_or_birth_defect as f64,
        );
        record.insert(columns::PCOS, self.pcos as f64);
        record.insert(columns::SYS_BP, self.sys_bp);
        record.insert(columns::DIA_BP, self.dia_bp);
        record.insert(columns::HEMOGLOBIN, self.hemoglobin);
        record.insert(columns::SEDENTARY_LIFESTYLE, self.sedentary_lifestyle as f64);
        record.insert(columns::PREDIABETES, self.prediabetes as f64);

        match (self.bmi, legacy_defaults) {
            (Some(bmi), _) => record.insert(columns::BMI, bmi),
            (None, true) => record.insert(columns::BMI, LEGACY_DEFAULT_BMI),
            (None, false) => {}
        }
        match (self.ogtt, legacy_defaults) {
            (Some(ogtt), _) => record.insert(columns::OGTT, ogtt),
            (None, true) => record.insert(columns::OGTT, LEGACY_DEFAULT_OGTT),
            (None, false) => {}
        }
        if legacy_defaults {
            record.insert(columns::CASE_NUMBER, 0.0);
        }

        record
    }

    /// Reference profile with most clinical risk markers present.
    pub fn high_risk_sample() -> Self {
        Self {
            age: 38.0,
            no_of_pregnancy: 3,
            gestation_in_previous_pregnancy: 1.0,
            bmi: Some(32.5),
            ogtt: Some(180.0),
            hdl: 35.0,
            family_history: 1,
            unexplained_prenatal_loss: 1,
            large_child_or_birth_defect: 1,
            pcos: 1,
            sys_bp: 145.0,
            dia_bp: 95.0,
            hemoglobin: 10.5,
            sedentary_lifestyle: 1,
            prediabetes: 1,
        }
    }

    /// Reference profile with no clinical risk markers.
    pub fn low_risk_sample() -> Self {
        Self {
            age: 25.0,
            no_of_pregnancy: 1,
            gestation_in_previous_pregnancy: 0.0,
            bmi: Some(22.5),
            ogtt: Some(115.0),
            hdl: 60.0,
            family_history: 0,
            unexplained_prenatal_loss: 0,
            large_child_or_birth_defect: 0,
            pcos: 0,
            sys_bp: 110.0,
            dia_bp: 70.0,
            hemoglobin: 12.5,
            sedentary_lifestyle: 0,
            prediabetes: 0,
        }
    }
}

fn check_range(errors: &mut Vec<FieldError>, field: &str, value: f64, min: f64, max: f64) {
    if !value.is_finite() || value < min || value > max {
        errors.push(FieldError::new(
            field,
            format!("must be between {} and {}", min, max),
        ));
    }
}

/// Flat mapping of clinical column name to numeric value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PatientRecord {
    values: BTreeMap<String, f64>,
}

impl PatientRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &str, value: f64) {
        self.values.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// Value or a lookup default when the column is absent.
    pub fn get_or(&self, column: &str, default: f64) -> f64 {
        self.get(column).unwrap_or(default)
    }

    pub fn remove(&mut self, column: &str) -> Option<f64> {
        self.values.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, f64)> for PatientRecord {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }
}

/// Column-oriented batch: one header row and one value row per patient.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Every accepted shape of prediction input.
///
/// All shapes are normalized by [`PatientInput::into_patients`] before any
/// pipeline stage runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PatientInput {
    Table(PatientTable),
    Records(Vec<Map<String, Value>>),
    Record(Map<String, Value>),
}

impl PatientInput {
    /// Normalize into typed patients, reporting the failing row on error.
    pub fn into_patients(self) -> Result<Vec<PatientData>, ValidationError> {
        let objects = match self {
            PatientInput::Record(object) => vec![object],
            PatientInput::Records(objects) => objects,
            PatientInput::Table(table) => table_to_objects(table)?,
        };

        if objects.is_empty() {
            return Err(ValidationError::single("records", "at least one record required"));
        }

        objects
            .into_iter()
            .enumerate()
            .map(|(row, object)| {
                serde_json::from_value::<PatientData>(Value::Object(object))
                    .map_err(|e| ValidationError::single("record", e.to_string()).at_row(row))
            })
            .collect()
    }
}

fn table_to_objects(table: PatientTable) -> Result<Vec<Map<String, Value>>, ValidationError> {
    let width = table.columns.len();
    table
        .rows
        .into_iter()
        .enumerate()
        .map(|(row, values)| {
            if values.len() != width {
                return Err(ValidationError::single(
                    "row",
                    format!("expected {} values, got {}", width, values.len()),
                )
                .at_row(row));
            }
            Ok(table.columns.iter().cloned().zip(values).collect())
        })
        .collect()
}
