//! Feature encoding for training frames and single serving records
//!
//! Both entry points route every cell through [`encode_value`] using the same
//! [`FeatureSpec`], so a column encodes identically whether it arrives as part
//! of a training frame or as one field of a prediction request. The serving
//! path additionally reindexes its output onto the persisted
//! [`FeatureSchema`], which is authoritative for width and order.

use crate::errors::{ChurnError, Result};
use crate::frame::{Column, ColumnType, RawFrame, RawRecord, Value};
use crate::schema::{indicator_name, ColumnEncoding, ColumnSpec, FeatureSchema, FeatureSpec, KNOWN_BINARY_PAIRS};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Numeric feature matrix with named columns and optional 0/1 labels
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    labels: Option<Vec<u8>>,
}

impl EncodedFrame {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn labels(&self) -> Option<&[u8]> {
        self.labels.as_deref()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.columns.clone())
    }

    /// Values of one output column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Convert back into a raw frame of floats, with labels (if any) as an
    /// integer target column.
    pub fn to_raw_frame(&self, target: &str) -> Result<RawFrame> {
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                Column::new(
                    name.clone(),
                    self.rows.iter().map(|row| Value::Float(row[idx])).collect(),
                )
            })
            .collect();
        if let Some(labels) = &self.labels {
            columns.push(Column::new(
                target,
                labels.iter().map(|&l| Value::Int(i64::from(l))).collect(),
            ));
        }
        RawFrame::new(columns)
    }
}

/// Output of training-mode encoding: the inferred spec and the encoded frame
#[derive(Debug, Clone)]
pub struct TrainingEncoding {
    pub spec: FeatureSpec,
    pub frame: EncodedFrame,
}

impl TrainingEncoding {
    /// Ordered output columns, excluding the target
    pub fn feature_columns(&self) -> &[String] {
        self.frame.columns()
    }
}

/// Training mode: infer the feature spec from `frame` and encode it.
#[instrument(skip(frame), fields(rows = frame.height(), columns = frame.width()))]
pub fn encode_training(frame: &RawFrame, target: &str) -> Result<TrainingEncoding> {
    let spec = FeatureSpec::infer(frame, target)?;

    let binary = spec
        .columns
        .iter()
        .filter(|c| matches!(c.encoding, ColumnEncoding::Binary { .. }))
        .count();
    let one_hot = spec
        .columns
        .iter()
        .filter(|c| matches!(c.encoding, ColumnEncoding::OneHot { .. }))
        .count();
    info!(
        "Encoding {} columns: {} binary, {} multi-category",
        spec.columns.len(),
        binary,
        one_hot
    );

    let encoded = encode_frame(frame, &spec)?;
    if encoded.labels.is_none() {
        return Err(ChurnError::Schema(format!(
            "target column '{target}' not found in data"
        )));
    }
    info!("Feature engineering complete: {} final features", encoded.width());

    Ok(TrainingEncoding {
        spec,
        frame: encoded,
    })
}

/// Encode a whole frame with an existing spec. Labels are produced when the
/// spec's target column is present.
pub fn encode_frame(frame: &RawFrame, spec: &FeatureSpec) -> Result<EncodedFrame> {
    let mut source = Vec::with_capacity(spec.columns.len());
    for column_spec in &spec.columns {
        let column = frame.column(&column_spec.name).ok_or_else(|| {
            ChurnError::Schema(format!("column '{}' missing from frame", column_spec.name))
        })?;
        source.push((column_spec, column));
    }

    let columns = spec.output_columns();
    let mut rows = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let mut out = Vec::with_capacity(columns.len());
        for (column_spec, column) in &source {
            encode_value(column_spec, &column.values[row], &mut out)?;
        }
        rows.push(out);
    }

    let labels = match frame.column(&spec.target) {
        Some(column) => Some(encode_target(column)?),
        None => None,
    };

    Ok(EncodedFrame {
        columns,
        rows,
        labels,
    })
}

/// Serving mode: encode one record onto the persisted schema.
///
/// Every field listed in `required` must be present and non-missing. Any
/// other field may be omitted, in which case every column derived from it is
/// zero. Unknown category levels contribute all-zero indicators.
pub fn encode_record(
    record: &RawRecord,
    spec: &FeatureSpec,
    schema: &FeatureSchema,
    required: &[String],
) -> Result<Vec<f64>> {
    for field in required {
        match record.get(field) {
            Some(value) if !value.is_missing() => {}
            _ => {
                return Err(ChurnError::Schema(format!(
                    "required field '{field}' missing from request"
                )))
            }
        }
    }

    let mut produced: Vec<(String, f64)> = Vec::new();
    let mut scratch = Vec::new();
    for column_spec in &spec.columns {
        let value = record.get(&column_spec.name).unwrap_or(&Value::Missing);
        scratch.clear();
        encode_value(column_spec, value, &mut scratch)?;
        produced.extend(column_spec.output_columns().into_iter().zip(scratch.iter().copied()));
    }

    // Fields the feature spec does not know about still expand the way a fresh
    // one-hot pass would; reindexing then discards them.
    for (field, value) in record {
        if field == &spec.target || spec.column(field).is_some() {
            continue;
        }
        match value {
            Value::Missing => {}
            Value::Text(text) => produced.push((indicator_name(field, text), 1.0)),
            other => {
                if let Some(v) = other.as_f64() {
                    produced.push((field.clone(), v));
                }
            }
        }
    }

    Ok(reindex(&produced, schema))
}

/// Project named values onto `schema`: absent columns are zero, columns not
/// in the schema are dropped. The first occurrence of a name wins.
pub fn reindex(produced: &[(String, f64)], schema: &FeatureSchema) -> Vec<f64> {
    let mut by_name: HashMap<&str, f64> = HashMap::with_capacity(produced.len());
    for (name, value) in produced {
        by_name.entry(name.as_str()).or_insert(*value);
    }

    let dropped: Vec<&str> = produced
        .iter()
        .map(|(name, _)| name.as_str())
        .filter(|name| schema.position(name).is_none())
        .collect();
    if !dropped.is_empty() {
        debug!(?dropped, "dropping columns outside the feature schema");
    }

    schema
        .columns()
        .iter()
        .map(|name| by_name.get(name.as_str()).copied().unwrap_or(0.0))
        .collect()
}

/// Encode one raw cell according to its column spec, appending one value per
/// output column.
pub fn encode_value(column: &ColumnSpec, value: &Value, out: &mut Vec<f64>) -> Result<()> {
    match &column.encoding {
        ColumnEncoding::Numeric => out.push(numeric_value(&column.name, value)?),
        ColumnEncoding::Boolean => out.push(boolean_value(value)),
        ColumnEncoding::Binary { one, .. } => {
            out.push(if value.matches_level(one) { 1.0 } else { 0.0 });
        }
        ColumnEncoding::OneHot { levels, dropped } => {
            for level in levels.iter().filter(|level| *level != dropped) {
                out.push(if value.matches_level(level) { 1.0 } else { 0.0 });
            }
        }
        ColumnEncoding::Degenerate => out.push(0.0),
    }
    Ok(())
}

fn numeric_value(field: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Missing => Ok(0.0),
        Value::Text(text) if text.trim().is_empty() => Ok(0.0),
        Value::Text(text) => match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ChurnError::UnparseableNumeric {
                field: field.to_string(),
                value: text.clone(),
            }),
        },
        other => Ok(other.as_f64().unwrap_or(0.0)),
    }
}

fn boolean_value(value: &Value) -> f64 {
    let truthy = match value {
        Value::Bool(b) => *b,
        Value::Int(v) => *v != 0,
        Value::Float(v) => *v != 0.0,
        Value::Text(text) => matches!(Value::parse_cell(text), Value::Bool(true)),
        Value::Missing => false,
    };
    if truthy {
        1.0
    } else {
        0.0
    }
}

/// Map the target column to 0/1 labels
fn encode_target(column: &Column) -> Result<Vec<u8>> {
    let missing = column.values.len() - column.non_missing_count();
    if missing > 0 {
        return Err(ChurnError::Schema(format!(
            "target column '{}' has {} missing values",
            column.name, missing
        )));
    }

    match column.observed_type() {
        ColumnType::Numeric | ColumnType::Boolean | ColumnType::Empty => column
            .values
            .iter()
            .map(|value| match value.as_f64() {
                Some(v) if v == 0.0 => Ok(0),
                Some(v) if v == 1.0 => Ok(1),
                _ => Err(ChurnError::Schema(format!(
                    "target column '{}' must be binary, found {}",
                    column.name, value
                ))),
            })
            .collect(),
        ColumnType::Categorical => {
            let levels = column.distinct_categories();
            let positive = match levels.as_slice() {
                [a, b] => binary_positive(a, b),
                [only] => KNOWN_BINARY_PAIRS
                    .iter()
                    .find_map(|(zero, one)| {
                        if only == one {
                            Some(only.clone())
                        } else if only == zero {
                            Some(one.to_string())
                        } else {
                            None
                        }
                    })
                    .ok_or_else(|| {
                        ChurnError::Schema(format!(
                            "target column '{}' has a single unrecognised class '{}'",
                            column.name, only
                        ))
                    })?,
                _ => {
                    return Err(ChurnError::Schema(format!(
                        "target column '{}' must have two classes, found {}",
                        column.name,
                        levels.len()
                    )))
                }
            };
            Ok(column
                .values
                .iter()
                .map(|v| u8::from(v.category_key().as_deref() == Some(positive.as_str())))
                .collect())
        }
    }
}

fn binary_positive(a: &str, b: &str) -> String {
    crate::schema::binary_mapping(a, b).1
}
