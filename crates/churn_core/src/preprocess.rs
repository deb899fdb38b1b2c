//! Cleaning applied between validation and encoding

use crate::config::DataConfig;
use crate::errors::Result;
use crate::frame::{Column, RawFrame, Value};
use tracing::{debug, info, instrument, warn};

/// Drop the identifier column and coerce the declared numeric columns.
///
/// Numeric cells that are blank or not numbers become `0.0`; the raw export
/// leaves `TotalCharges` blank for brand-new customers. Numeric columns not
/// present in the frame are skipped.
#[instrument(skip_all, fields(rows = frame.height()))]
pub fn preprocess(frame: &RawFrame, config: &DataConfig) -> Result<RawFrame> {
    let mut out = frame.clone();

    if out.drop_column(&config.id_column) {
        debug!("Dropped identifier column {}", config.id_column);
    }

    for name in &config.numeric_columns {
        let Some(column) = out.column(name) else {
            debug!("Numeric column {} not present, skipping", name);
            continue;
        };
        let mut filled = 0usize;
        let values = column
            .values
            .iter()
            .map(|v| match v {
                Value::Int(_) | Value::Float(_) => v.clone(),
                other => match other.parse_f64() {
                    Some(x) => Value::Float(x),
                    None => {
                        filled += 1;
                        Value::Float(0.0)
                    }
                },
            })
            .collect();
        if filled > 0 {
            warn!("Filled {} blank or non-numeric values in {} with 0", filled, name);
        }
        out.set_column(Column::new(name.clone(), values))?;
    }

    info!("Preprocessed frame: {} rows x {} columns", out.height(), out.width());
    Ok(out)
}
