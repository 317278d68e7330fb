//! Intermediate feature representations between pipeline stages.

use super::patient::PatientRecord;
use std::collections::BTreeMap;

/// A single engineered feature value.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    /// Categorical label awaiting encoding (e.g. `BMI_Category`).
    Category(String),
}

/// Patient record extended with derived columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnhancedRecord {
    values: BTreeMap<String, FeatureValue>,
}

impl EnhancedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_number(&mut self, column: &str, value: f64) {
        self.values
            .insert(column.to_string(), FeatureValue::Number(value));
    }

    pub fn set_category(&mut self, column: &str, label: &str) {
        self.values
            .insert(column.to_string(), FeatureValue::Category(label.to_string()));
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.values.get(column)
    }

    /// Numeric value of a column; `None` when absent or categorical.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.values.get(column) {
            Some(FeatureValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn category(&self, column: &str) -> Option<&str> {
        match self.values.get(column) {
            Some(FeatureValue::Category(label)) => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<&PatientRecord> for EnhancedRecord {
    fn from(record: &PatientRecord) -> Self {
        let mut enhanced = EnhancedRecord::new();
        for (column, value) in record.iter() {
            enhanced.set_number(column, value);
        }
        enhanced
    }
}

/// Dense row-major matrix with named columns.
///
/// Used both for aligned model inputs (columns = training features) and for
/// stacked base-model outputs (columns = base model names).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Zero-filled matrix.
    pub fn zeros(columns: Vec<String>, rows: usize) -> Self {
        let data = vec![0.0; rows * columns.len()];
        Self {
            columns,
            rows,
            data,
        }
    }

    /// Build from row vectors; every row must have one value per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Option<Self> {
        let width = columns.len();
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        let n_rows = rows.len();
        Some(Self {
            columns,
            rows: n_rows,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.n_cols();
        &self.data[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let width = self.n_cols();
        self.data[row * width + col] = value;
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols() + col]
    }

    /// Overwrite a whole column from a per-row vector.
    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        for (row, value) in values.iter().enumerate().take(self.rows) {
            self.set(row, col, *value);
        }
    }

    /// Row-major values in single precision, as ONNX models expect.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }
}
