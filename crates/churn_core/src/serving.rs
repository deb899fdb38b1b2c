//! Prediction-time context
//!
//! A [`ServingContext`] is built once per process from a finished training
//! run and is immutable afterwards. Share it behind an `Arc`; every call only
//! reads it, so concurrent predictions need no locking.

use crate::encoder::encode_record;
use crate::errors::{ChurnError, Result};
use crate::frame::RawRecord;
use crate::gbdt::Model;
use crate::schema::{FeatureSchema, FeatureSpec};
use crate::tracking::{
    read_params, FileTracker, FEATURE_COLUMNS_ARTIFACT, FEATURE_SPEC_ARTIFACT, MODEL_ARTIFACT,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub const LIKELY_TO_CHURN: &str = "Likely to churn";
pub const NOT_LIKELY_TO_CHURN: &str = "Not likely to churn";

/// Threshold used when a run did not record one
pub const DEFAULT_THRESHOLD: f64 = 0.35;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub probability: f64,
    pub churn: bool,
}

/// Parse a JSON object into a raw record
pub fn record_from_json(json: &str) -> Result<RawRecord> {
    Ok(serde_json::from_str(json)?)
}

/// Loaded model, feature spec and schema for one training run
#[derive(Debug, Clone)]
pub struct ServingContext {
    model: Model,
    spec: FeatureSpec,
    schema: FeatureSchema,
    threshold: f64,
    required_fields: Vec<String>,
}

impl ServingContext {
    /// Assemble a context, rejecting any disagreement between the three
    /// artifacts.
    pub fn new(model: Model, spec: FeatureSpec, schema: FeatureSchema, threshold: f64) -> Result<Self> {
        let spec_columns = spec.output_columns();
        if spec_columns.as_slice() != schema.columns() {
            return Err(ChurnError::EncodingDrift(format!(
                "feature spec produces {} columns but the schema file lists {}",
                spec_columns.len(),
                schema.len()
            )));
        }
        if model.feature_count != schema.len() {
            return Err(ChurnError::EncodingDrift(format!(
                "model expects {} features, schema has {}",
                model.feature_count,
                schema.len()
            )));
        }
        if !model.schema_hash.is_empty() && model.schema_hash != schema.hash_hex() {
            return Err(ChurnError::EncodingDrift(
                "model was trained against a different feature schema".to_string(),
            ));
        }
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ChurnError::Config(format!(
                "threshold must be in (0, 1), got {threshold}"
            )));
        }

        Ok(Self {
            model,
            spec,
            schema,
            threshold,
            required_fields: vec![
                "tenure".to_string(),
                "MonthlyCharges".to_string(),
                "TotalCharges".to_string(),
            ],
        })
    }

    pub fn with_required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = fields;
        self
    }

    /// Load the artifacts of a run directory
    #[instrument(skip_all, fields(run = %run_dir.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(run_dir: P) -> Result<Self> {
        let dir = run_dir.as_ref();
        let model = Model::load_json(dir.join(MODEL_ARTIFACT))?;
        let spec = FeatureSpec::load_json(dir.join(FEATURE_SPEC_ARTIFACT))?;
        let schema = FeatureSchema::read(dir.join(FEATURE_COLUMNS_ARTIFACT))?;

        let threshold = match read_params(dir) {
            Ok(params) => params
                .get("threshold")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or_else(|| {
                    warn!("Run has no threshold param, using {}", DEFAULT_THRESHOLD);
                    DEFAULT_THRESHOLD
                }),
            Err(e) => {
                warn!("Could not read run params ({}), using threshold {}", e, DEFAULT_THRESHOLD);
                DEFAULT_THRESHOLD
            }
        };

        let context = Self::new(model, spec, schema, threshold)?;
        info!(
            "Loaded model with {} trees over {} features (threshold {})",
            context.model.num_trees(),
            context.schema.len(),
            context.threshold
        );
        Ok(context)
    }

    /// Load the most recent finished run of `experiment`
    pub fn from_latest(tracker: &FileTracker, experiment: &str) -> Result<Self> {
        let run_dir = tracker.latest_finished_run(experiment)?;
        Self::load(run_dir)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Encode a request onto the feature schema
    pub fn encode(&self, record: &RawRecord) -> Result<Vec<f64>> {
        encode_record(record, &self.spec, &self.schema, &self.required_fields)
    }

    pub fn predict(&self, record: &RawRecord) -> Result<Prediction> {
        let features = self.encode(record)?;
        let probability = self.model.predict_proba(&features)?;
        let churn = probability >= self.threshold;
        debug!(probability, churn, "prediction");
        Ok(Prediction {
            label: if churn { LIKELY_TO_CHURN } else { NOT_LIKELY_TO_CHURN }.to_string(),
            probability,
            churn,
        })
    }

    /// Predict many records in parallel; each result is independent
    pub fn predict_batch(&self, records: &[RawRecord]) -> Vec<Result<Prediction>> {
        records.par_iter().map(|record| self.predict(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_training;
    use crate::frame::{RawFrame, Value};
    use crate::gbdt::{Node, Tree, SCALE};
    use std::sync::Arc;

    fn training_frame() -> RawFrame {
        RawFrame::from_reader(
            "gender,Contract,tenure,MonthlyCharges,TotalCharges,Churn\n\
             Female,Month-to-month,1,70.0,70.0,Yes\n\
             Male,One year,40,20.0,800.0,No\n\
             Male,Two year,60,25.0,1500.0,No\n"
                .as_bytes(),
        )
        .unwrap()
    }

    /// Single stump on tenure: short tenure is high risk
    fn context() -> ServingContext {
        let encoding = encode_training(&training_frame(), "Churn").unwrap();
        let schema = encoding.spec.schema();
        let tenure = schema.position("tenure").unwrap() as i32;
        let tree = Tree::new(
            vec![
                Node::internal(0, tenure, 12 * SCALE, 1, 2),
                Node::leaf(1, 2 * SCALE),
                Node::leaf(2, -2 * SCALE),
            ],
            SCALE,
        );
        let model = Model::new(vec![tree], 0, schema.len()).with_schema_hash(schema.hash_hex());
        ServingContext::new(model, encoding.spec, schema, 0.35).unwrap()
    }

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_predict_labels() {
        let ctx = context();
        let high = ctx
            .predict(&record(&[
                ("gender", "Female".into()),
                ("tenure", 5i64.into()),
                ("MonthlyCharges", 70.0.into()),
                ("TotalCharges", 350.0.into()),
            ]))
            .unwrap();
        assert_eq!(high.label, LIKELY_TO_CHURN);
        assert!(high.churn);

        let low = ctx
            .predict(&record(&[
                ("tenure", 48i64.into()),
                ("MonthlyCharges", 20.0.into()),
                ("TotalCharges", 960.0.into()),
            ]))
            .unwrap();
        assert_eq!(low.label, NOT_LIKELY_TO_CHURN);
    }

    #[test]
    fn test_required_field_missing() {
        let err = context()
            .predict(&record(&[("tenure", 5i64.into())]))
            .unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));
    }

    #[test]
    fn test_schema_drift_detected() {
        let encoding = encode_training(&training_frame(), "Churn").unwrap();
        let schema = encoding.spec.schema();
        let model = Model::new(vec![], 0, schema.len());

        let shorter = FeatureSchema::new(schema.columns()[1..].to_vec());
        let err = ServingContext::new(model.clone(), encoding.spec.clone(), shorter, 0.35).unwrap_err();
        assert!(matches!(err, ChurnError::EncodingDrift(_)));

        let stale = model.with_schema_hash("0000");
        let err = ServingContext::new(stale, encoding.spec, schema, 0.35).unwrap_err();
        assert!(matches!(err, ChurnError::EncodingDrift(_)));
    }

    #[test]
    fn test_batch_shares_context_across_threads() {
        let ctx = Arc::new(context());
        let records: Vec<RawRecord> = (0..32i64)
            .map(|t| {
                record(&[
                    ("tenure", t.into()),
                    ("MonthlyCharges", 50.0.into()),
                    ("TotalCharges", (50.0 * t as f64).into()),
                ])
            })
            .collect();

        let batch = ctx.predict_batch(&records);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ctx = Arc::clone(&ctx);
                let records = records.clone();
                std::thread::spawn(move || {
                    records
                        .iter()
                        .map(|r| ctx.predict(r).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            let sequential = handle.join().unwrap();
            for (a, b) in batch.iter().zip(&sequential) {
                assert_eq!(a.as_ref().unwrap(), b);
            }
        }
        assert!(batch[0].as_ref().unwrap().churn);
        assert!(!batch[31].as_ref().unwrap().churn);
    }

    #[test]
    fn test_record_from_json() {
        let record = record_from_json(r#"{"gender":"Male","tenure":5,"MonthlyCharges":70.5,"Partner":null}"#).unwrap();
        assert_eq!(record["gender"], Value::Text("Male".into()));
        assert_eq!(record["tenure"], Value::Int(5));
        assert_eq!(record["MonthlyCharges"], Value::Float(70.5));
        assert_eq!(record["Partner"], Value::Missing);
    }
}
