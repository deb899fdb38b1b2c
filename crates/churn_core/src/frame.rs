//! Raw customer records and column-oriented frames
//!
//! A `RawFrame` is the in-memory form of the customer CSV before any
//! encoding: named columns of loosely typed `Value`s. Cells are typed once at
//! load time (integer, float, boolean, text, missing) so that later stages can
//! reason about observed column types without re-parsing strings.

use crate::errors::{ChurnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// A single raw cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Type a raw CSV cell. Blank cells become `Missing`.
    pub fn parse_cell(raw: &str) -> Self {
        let cell = raw.trim();
        if cell.is_empty() {
            return Value::Missing;
        }
        if let Ok(v) = cell.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = cell.parse::<f64>() {
            if v.is_finite() {
                return Value::Float(v);
            }
        }
        match cell {
            "True" | "true" => Value::Bool(true),
            "False" | "false" => Value::Bool(false),
            _ => Value::Text(cell.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric view of the value; text is not parsed here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Missing | Value::Text(_) => None,
        }
    }

    /// Numeric view that also reads numeric text, as sent by JSON clients
    /// that quote every field.
    pub fn parse_f64(&self) -> Option<f64> {
        match self {
            Value::Text(text) => match Value::parse_cell(text) {
                Value::Int(v) => Some(v as f64),
                Value::Float(v) => Some(v),
                _ => None,
            },
            other => other.as_f64(),
        }
    }

    /// Category key used by the binary and one-hot encoders. Text keeps its
    /// original spelling; blank text has no key.
    pub fn category_key(&self) -> Option<String> {
        match self {
            Value::Missing => None,
            Value::Text(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            other => Some(other.to_string()),
        }
    }

    /// Whether this value denotes the category `level`.
    ///
    /// Text compares by spelling. A typed value matches a level whose cell
    /// text parses to the same value, so `1` matches `"01"` and `true`
    /// matches `"true"`.
    pub fn matches_level(&self, level: &str) -> bool {
        match self {
            Value::Missing => false,
            Value::Text(text) => text.trim() == level,
            typed => Value::parse_cell(level) == *typed,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// One customer: column name to raw value
pub type RawRecord = BTreeMap<String, Value>;

/// Observed type of a column, ignoring missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    Boolean,
    Categorical,
    /// No non-missing values at all
    Empty,
}

/// A named column of raw values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn observed_type(&self) -> ColumnType {
        let mut seen_numeric = false;
        let mut seen_bool = false;
        let mut seen_other = false;

        for value in &self.values {
            match value {
                Value::Missing => {}
                Value::Int(_) | Value::Float(_) => seen_numeric = true,
                Value::Bool(_) => seen_bool = true,
                Value::Text(_) => seen_other = true,
            }
        }

        match (seen_numeric, seen_bool, seen_other) {
            (false, false, false) => ColumnType::Empty,
            (false, true, false) => ColumnType::Boolean,
            (true, false, false) => ColumnType::Numeric,
            _ => ColumnType::Categorical,
        }
    }

    /// Distinct non-missing category keys in first-appearance order
    pub fn distinct_categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut levels = Vec::new();
        for key in self.values.iter().filter_map(Value::category_key) {
            if seen.insert(key.clone()) {
                levels.push(key);
            }
        }
        levels
    }

    pub fn non_missing_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_missing()).count()
    }
}

/// Column-oriented table of raw customer data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    columns: Vec<Column>,
    height: usize,
}

impl RawFrame {
    /// Build a frame, checking column lengths and name uniqueness.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let height = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut names = HashSet::new();
        for column in &columns {
            if column.values.len() != height {
                return Err(ChurnError::Schema(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.values.len(),
                    height
                )));
            }
            if !names.insert(column.name.as_str()) {
                return Err(ChurnError::Schema(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self { columns, height })
    }

    /// Load a CSV file with a header row
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let frame = Self::from_reader(file)?;
        debug!(
            "Loaded {} rows x {} columns from {}",
            frame.height(),
            frame.width(),
            path.as_ref().display()
        );
        Ok(frame)
    }

    /// Load CSV data with a header row from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

        for (line_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(ChurnError::Schema(format!(
                    "row {}: expected {} fields, got {}",
                    line_idx + 1,
                    headers.len(),
                    record.len()
                )));
            }
            for (column, cell) in cells.iter_mut().zip(record.iter()) {
                column.push(cell.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| type_column(name, &raw))
            .collect();
        Self::new(columns)
    }

    /// Write the frame as CSV with a header row
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.height {
            writer.write_record(self.columns.iter().map(|c| c.values[row].to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replace or append a column
    pub fn set_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.values.len() != self.height {
            return Err(ChurnError::Schema(format!(
                "column '{}' has {} rows, expected {}",
                column.name,
                column.values.len(),
                self.height
            )));
        }
        if self.columns.is_empty() {
            self.height = column.values.len();
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Remove a column if present; returns whether anything was removed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c.name != name);
        before != self.columns.len()
    }

    /// New frame containing the given rows, in the given order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.height) {
            return Err(ChurnError::Schema(format!(
                "row index {} out of bounds for frame of height {}",
                bad, self.height
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), rows.iter().map(|&r| c.values[r].clone()).collect()))
            .collect();
        Self::new(columns)
    }

    /// Materialize one row as a record
    pub fn record(&self, row: usize) -> Option<RawRecord> {
        if row >= self.height {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.clone(), c.values[row].clone()))
                .collect(),
        )
    }
}

/// Type a column of raw cells. A column whose cells disagree on type is
/// categorical and keeps every cell as text, so levels such as `"01"` or
/// `"true"` keep their spelling.
fn type_column(name: String, raw: &[String]) -> Column {
    let typed = Column::new(name, raw.iter().map(|cell| Value::parse_cell(cell)).collect());
    if typed.observed_type() != ColumnType::Categorical {
        return typed;
    }
    let values = raw
        .iter()
        .map(|cell| match cell.trim() {
            "" => Value::Missing,
            text => Value::Text(text.to_string()),
        })
        .collect();
    Column::new(typed.name, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "customerID,gender,tenure,MonthlyCharges,TotalCharges,Churn\n\
                          0001-A,Female,1,29.85,29.85,No\n\
                          0002-B,Male,34,56.95, ,No\n\
                          0003-C,Male,2,53.85,108.15,Yes\n";

    #[test]
    fn test_parse_cell_types() {
        assert_eq!(Value::parse_cell("  "), Value::Missing);
        assert_eq!(Value::parse_cell("42"), Value::Int(42));
        assert_eq!(Value::parse_cell("29.85"), Value::Float(29.85));
        assert_eq!(Value::parse_cell("True"), Value::Bool(true));
        assert_eq!(Value::parse_cell("Fiber optic"), Value::Text("Fiber optic".into()));
        assert_eq!(Value::parse_cell("NaN"), Value::Text("NaN".into()));
    }

    #[test]
    fn test_load_csv() -> Result<()> {
        let frame = RawFrame::from_reader(SAMPLE.as_bytes())?;
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.width(), 6);

        let total = frame.column("TotalCharges").expect("column exists");
        assert_eq!(total.values[1], Value::Missing);
        assert_eq!(total.observed_type(), ColumnType::Numeric);

        let gender = frame.column("gender").expect("column exists");
        assert_eq!(gender.observed_type(), ColumnType::Categorical);
        assert_eq!(gender.distinct_categories(), vec!["Female", "Male"]);
        Ok(())
    }

    #[test]
    fn test_mixed_column_keeps_spelling() -> Result<()> {
        let frame = RawFrame::from_reader("Plan,Flag,n\n01,true,1\nA,Maybe,2\n,No,3\n".as_bytes())?;
        let plan = frame.column("Plan").expect("column exists");
        assert_eq!(
            plan.values,
            vec![Value::Text("01".into()), Value::Text("A".into()), Value::Missing]
        );
        assert_eq!(
            frame.column("Flag").expect("column exists").distinct_categories(),
            vec!["true", "Maybe", "No"]
        );
        // Uniform columns stay typed
        assert_eq!(frame.column("n").expect("column exists").values[0], Value::Int(1));
        Ok(())
    }

    #[test]
    fn test_matches_level_across_representations() {
        assert!(Value::Text("01".into()).matches_level("01"));
        assert!(!Value::Text("1".into()).matches_level("01"));
        assert!(Value::Int(1).matches_level("01"));
        assert!(Value::Bool(true).matches_level("true"));
        assert!(Value::Float(1.5).matches_level("1.50"));
        assert!(!Value::Missing.matches_level(""));
        assert_eq!(Value::Text("  ".into()).category_key(), None);
        assert_eq!(Value::Text(" 7.0 ".into()).parse_f64(), Some(7.0));
        assert_eq!(Value::Text("n/a".into()).parse_f64(), None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let data = "a,b\n1,2\n3\n";
        assert!(RawFrame::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_take_and_record() -> Result<()> {
        let frame = RawFrame::from_reader(SAMPLE.as_bytes())?;
        let subset = frame.take(&[2, 0])?;
        assert_eq!(subset.height(), 2);

        let record = subset.record(0).expect("row exists");
        assert_eq!(record["customerID"], Value::Text("0003-C".into()));
        assert!(frame.take(&[7]).is_err());
        Ok(())
    }

    #[test]
    fn test_csv_write_round_trip() -> Result<()> {
        let frame = RawFrame::from_reader(SAMPLE.as_bytes())?;
        let file = tempfile::NamedTempFile::new()?;
        frame.write_csv(file.path())?;

        let reloaded = RawFrame::from_csv_path(file.path())?;
        assert_eq!(frame, reloaded);
        Ok(())
    }

    #[test]
    fn test_value_json_shape() -> Result<()> {
        let record: RawRecord =
            serde_json::from_str(r#"{"tenure": 5, "MonthlyCharges": 70.0, "gender": "Female", "x": null}"#)?;
        assert_eq!(record["tenure"], Value::Int(5));
        assert_eq!(record["MonthlyCharges"], Value::Float(70.0));
        assert_eq!(record["gender"], Value::Text("Female".into()));
        assert_eq!(record["x"], Value::Missing);
        Ok(())
    }
}
