//! Feature specification and persisted feature schema
//!
//! `FeatureSpec` is the typed description of how every raw column turns into
//! model features. It is inferred once from the training frame and then
//! consumed, unchanged, by both the batch encoder and the single-record
//! encoder, so the two call sites cannot disagree about binary mappings or
//! one-hot levels.
//!
//! `FeatureSchema` is the ordered list of output column names, persisted as a
//! newline-delimited text file next to the model.

use crate::errors::{ChurnError, Result};
use crate::frame::{ColumnType, RawFrame};
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Two-valued categories with a fixed business meaning, as (zero, one).
pub const KNOWN_BINARY_PAIRS: &[(&str, &str)] = &[("No", "Yes"), ("Female", "Male")];

/// Resolve the {0,1} mapping for a two-valued column.
///
/// Known semantic pairs use their fixed orientation; any other pair is
/// ordered lexicographically. The result does not depend on which value was
/// seen first.
pub fn binary_mapping(a: &str, b: &str) -> (String, String) {
    for (zero, one) in KNOWN_BINARY_PAIRS {
        if (a == *zero && b == *one) || (a == *one && b == *zero) {
            return (zero.to_string(), one.to_string());
        }
    }
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// How one raw column is encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnEncoding {
    /// Passed through as a float
    Numeric,
    /// True/False cast to 1/0
    Boolean,
    /// Exactly two categories mapped to 0/1
    Binary { zero: String, one: String },
    /// Drop-first one-hot expansion. `levels` keeps discovery order and
    /// includes the dropped reference level.
    OneHot { levels: Vec<String>, dropped: String },
    /// Categorical column with fewer than two distinct values; emitted as a
    /// constant zero feature.
    Degenerate,
}

/// Encoding decision for a single raw column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub encoding: ColumnEncoding,
}

impl ColumnSpec {
    /// Names of the output columns this raw column produces, in order
    pub fn output_columns(&self) -> Vec<String> {
        match &self.encoding {
            ColumnEncoding::OneHot { levels, dropped } => levels
                .iter()
                .filter(|level| *level != dropped)
                .map(|level| indicator_name(&self.name, level))
                .collect(),
            _ => vec![self.name.clone()],
        }
    }
}

/// Name of the one-hot indicator for `level` of `column`
pub fn indicator_name(column: &str, level: &str) -> String {
    format!("{column}_{level}")
}

/// Typed encoding plan shared by training and serving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Target column excluded from the features
    pub target: String,
    /// Per-column encodings in original column order
    pub columns: Vec<ColumnSpec>,
}

impl FeatureSpec {
    /// Inspect a training frame and decide how every non-target column is
    /// encoded.
    pub fn infer(frame: &RawFrame, target: &str) -> Result<Self> {
        if !frame.has_column(target) {
            return Err(ChurnError::Schema(format!(
                "target column '{target}' not found in data"
            )));
        }

        let mut columns = Vec::with_capacity(frame.width());
        for column in frame.columns().iter().filter(|c| c.name != target) {
            let encoding = match column.observed_type() {
                ColumnType::Numeric => ColumnEncoding::Numeric,
                ColumnType::Boolean => ColumnEncoding::Boolean,
                ColumnType::Empty => {
                    warn!(column = %column.name, "column has no non-null values; passing through as zero");
                    ColumnEncoding::Degenerate
                }
                ColumnType::Categorical => {
                    let levels = column.distinct_categories();
                    match levels.len() {
                        2 => {
                            let (zero, one) = binary_mapping(&levels[0], &levels[1]);
                            ColumnEncoding::Binary { zero, one }
                        }
                        n if n > 2 => {
                            let dropped = levels
                                .iter()
                                .min()
                                .cloned()
                                .unwrap_or_default();
                            ColumnEncoding::OneHot { levels, dropped }
                        }
                        _ => {
                            warn!(column = %column.name, "categorical column has a single level; passing through as zero");
                            ColumnEncoding::Degenerate
                        }
                    }
                }
            };
            debug!(column = %column.name, ?encoding, "column encoding inferred");
            columns.push(ColumnSpec {
                name: column.name.clone(),
                encoding,
            });
        }

        Ok(Self {
            target: target.to_string(),
            columns,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Ordered output column names; this is the feature schema.
    pub fn output_columns(&self) -> Vec<String> {
        self.columns.iter().flat_map(ColumnSpec::output_columns).collect()
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.output_columns())
    }

    /// Columns that were passed through as degenerate
    pub fn degenerate_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.encoding == ColumnEncoding::Degenerate)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self).map_err(|e| ChurnError::Tracking(e.to_string()))
    }

    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self).map_err(|e| ChurnError::Tracking(e.to_string()))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Ordered list of feature column names a model expects
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Parse newline-delimited column names; blank lines are ignored.
    pub fn from_text(text: &str) -> Self {
        let columns = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { columns }
    }

    pub fn to_text(&self) -> String {
        self.columns.join("\n")
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_text(&fs::read_to_string(path)?))
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// BLAKE3 of the newline-delimited text form
    pub fn hash_hex(&self) -> String {
        hex::encode(blake3::hash(self.to_text().as_bytes()).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Column, Value};

    fn text(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    fn sample_frame() -> RawFrame {
        RawFrame::new(vec![
            Column::new("gender", text(&["Male", "Female", "Male", "Female"])),
            Column::new("Contract", text(&["Two year", "Month-to-month", "One year", "Month-to-month"])),
            Column::new(
                "tenure",
                vec![Value::Int(1), Value::Int(20), Value::Int(3), Value::Missing],
            ),
            Column::new("Plan", text(&["Zeta", "Alpha", "Zeta", "Alpha"])),
            Column::new("Region", text(&["North", "North", "North", "North"])),
            Column::new("Churn", text(&["No", "Yes", "No", "No"])),
        ])
        .expect("valid frame")
    }

    #[test]
    fn test_binary_mapping_known_pairs() {
        assert_eq!(binary_mapping("Yes", "No"), ("No".into(), "Yes".into()));
        assert_eq!(binary_mapping("Male", "Female"), ("Female".into(), "Male".into()));
        assert_eq!(binary_mapping("Zeta", "Alpha"), ("Alpha".into(), "Zeta".into()));
        assert_eq!(binary_mapping("Alpha", "Zeta"), ("Alpha".into(), "Zeta".into()));
    }

    #[test]
    fn test_infer_spec() -> Result<()> {
        let spec = FeatureSpec::infer(&sample_frame(), "Churn")?;

        assert_eq!(spec.columns.len(), 5);
        assert_eq!(
            spec.column("gender").map(|c| &c.encoding),
            Some(&ColumnEncoding::Binary {
                zero: "Female".into(),
                one: "Male".into()
            })
        );
        assert_eq!(
            spec.column("Contract").map(|c| &c.encoding),
            Some(&ColumnEncoding::OneHot {
                levels: vec!["Two year".into(), "Month-to-month".into(), "One year".into()],
                dropped: "Month-to-month".into(),
            })
        );
        assert_eq!(spec.column("tenure").map(|c| &c.encoding), Some(&ColumnEncoding::Numeric));
        assert_eq!(spec.degenerate_columns(), vec!["Region"]);
        Ok(())
    }

    #[test]
    fn test_output_columns_replace_in_place() -> Result<()> {
        let spec = FeatureSpec::infer(&sample_frame(), "Churn")?;
        assert_eq!(
            spec.output_columns(),
            vec![
                "gender",
                "Contract_Two year",
                "Contract_One year",
                "tenure",
                "Plan",
                "Region",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_missing_target_is_schema_error() {
        let err = FeatureSpec::infer(&sample_frame(), "Exited").unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_binary_columns_carry_their_mapping() -> Result<()> {
        let spec = FeatureSpec::infer(&sample_frame(), "Churn")?;
        let binary: Vec<(&str, &ColumnEncoding)> = spec
            .columns
            .iter()
            .filter(|c| matches!(c.encoding, ColumnEncoding::Binary { .. }))
            .map(|c| (c.name.as_str(), &c.encoding))
            .collect();
        assert_eq!(binary.len(), 2);
        assert_eq!(
            spec.column("Plan").map(|c| &c.encoding),
            Some(&ColumnEncoding::Binary {
                zero: "Alpha".into(),
                one: "Zeta".into()
            })
        );
        assert_eq!(
            spec.column("gender").map(|c| &c.encoding),
            Some(&ColumnEncoding::Binary {
                zero: "Female".into(),
                one: "Male".into()
            })
        );
        Ok(())
    }

    #[test]
    fn test_schema_text_round_trip() {
        let schema = FeatureSchema::new(vec!["a".into(), "b_x y".into(), "c".into()]);
        let text = schema.to_text();
        assert_eq!(text, "a\nb_x y\nc");
        assert_eq!(FeatureSchema::from_text(&format!("{text}\n\n")), schema);
        assert_eq!(schema.hash_hex().len(), 64);
    }

    #[test]
    fn test_spec_json_round_trip() -> Result<()> {
        let spec = FeatureSpec::infer(&sample_frame(), "Churn")?;
        let file = tempfile::NamedTempFile::new()?;
        spec.save_json(file.path())?;
        assert_eq!(FeatureSpec::load_json(file.path())?, spec);
        Ok(())
    }
}
