//! Data-quality checks on raw customer frames
//!
//! A [`DataValidator`] runs a fixed battery of [`Rule`]s and returns a
//! [`ValidationReport`] instead of failing on the first problem, so the
//! caller can persist the complete list of failed rules before deciding to
//! abort. [`ValidationReport::into_result`] turns a failing report into
//! [`ChurnError::DataQuality`].

use crate::errors::{ChurnError, Result};
use crate::frame::{RawFrame, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A single data-quality expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    ColumnExists {
        column: String,
    },
    NotNull {
        column: String,
    },
    /// Non-missing values must belong to `allowed`
    InSet {
        column: String,
        allowed: Vec<String>,
    },
    /// Non-missing values must be numeric and within the inclusive bounds
    Between {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `left >= right` must hold for at least `mostly` of the rows where both
    /// are numeric
    PairAtLeast {
        left: String,
        right: String,
        mostly: f64,
    },
}

impl Rule {
    /// Stable identifier used in reports and audit artifacts
    pub fn id(&self) -> String {
        match self {
            Rule::ColumnExists { column } => format!("expect_column_to_exist({column})"),
            Rule::NotNull { column } => format!("expect_column_values_to_not_be_null({column})"),
            Rule::InSet { column, .. } => format!("expect_column_values_to_be_in_set({column})"),
            Rule::Between { column, .. } => {
                format!("expect_column_values_to_be_between({column})")
            }
            Rule::PairAtLeast { left, right, .. } => {
                format!("expect_column_pair_values_a_to_be_greater_than_b({left},{right})")
            }
        }
    }

    fn evaluate(&self, frame: &RawFrame) -> RuleResult {
        let (success, unexpected, checked) = match self {
            Rule::ColumnExists { column } => (frame.has_column(column), 0, 0),
            Rule::NotNull { column } => match frame.column(column) {
                Some(col) => {
                    let nulls = col.values.len() - col.non_missing_count();
                    (nulls == 0, nulls, col.values.len())
                }
                None => (false, 0, 0),
            },
            Rule::InSet { column, allowed } => match frame.column(column) {
                Some(col) => {
                    let present: Vec<&Value> = col.values.iter().filter(|v| v.category_key().is_some()).collect();
                    let bad = present
                        .iter()
                        .filter(|v| !allowed.iter().any(|level| v.matches_level(level)))
                        .count();
                    (bad == 0, bad, present.len())
                }
                None => (false, 0, 0),
            },
            Rule::Between { column, min, max } => match frame.column(column) {
                Some(col) => {
                    let present: Vec<&Value> = col.values.iter().filter(|v| !v.is_missing()).collect();
                    let bad = present
                        .iter()
                        .filter(|v| match v.parse_f64() {
                            Some(x) => min.is_some_and(|m| x < m) || max.is_some_and(|m| x > m),
                            None => true,
                        })
                        .count();
                    (bad == 0, bad, present.len())
                }
                None => (false, 0, 0),
            },
            Rule::PairAtLeast { left, right, mostly } => {
                match (frame.column(left), frame.column(right)) {
                    (Some(a), Some(b)) => {
                        let pairs: Vec<(f64, f64)> = a
                            .values
                            .iter()
                            .zip(&b.values)
                            .filter_map(|(x, y)| Some((x.parse_f64()?, y.parse_f64()?)))
                            .collect();
                        let bad = pairs.iter().filter(|(x, y)| x < y).count();
                        let ok_fraction = if pairs.is_empty() {
                            1.0
                        } else {
                            (pairs.len() - bad) as f64 / pairs.len() as f64
                        };
                        (ok_fraction >= *mostly, bad, pairs.len())
                    }
                    _ => (false, 0, 0),
                }
            }
        };

        RuleResult {
            rule: self.id(),
            success,
            unexpected_count: unexpected,
            element_count: checked,
        }
    }
}

/// Outcome of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: String,
    pub success: bool,
    pub unexpected_count: usize,
    pub element_count: usize,
}

/// Outcome of a full validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub failed_rules: Vec<String>,
    pub results: Vec<RuleResult>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Fail-closed conversion for callers that must not proceed on bad data
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(ChurnError::DataQuality {
                failed_rules: self.failed_rules,
            })
        }
    }
}

/// Runs a rule battery against a frame
#[derive(Debug, Clone, Default)]
pub struct DataValidator {
    rules: Vec<Rule>,
}

impl DataValidator {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// The Telco customer battery: schema, domains, ranges and charge
    /// consistency.
    pub fn telco() -> Self {
        let exists = |c: &str| Rule::ColumnExists { column: c.into() };
        let not_null = |c: &str| Rule::NotNull { column: c.into() };
        let in_set = |c: &str, allowed: &[&str]| Rule::InSet {
            column: c.into(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        };
        let between = |c: &str, min: Option<f64>, max: Option<f64>| Rule::Between {
            column: c.into(),
            min,
            max,
        };
        let yes_no = ["Yes", "No"];

        let mut rules = vec![exists("customerID"), not_null("customerID")];
        for column in [
            "gender",
            "Partner",
            "Dependents",
            "PhoneService",
            "InternetService",
            "Contract",
            "tenure",
            "MonthlyCharges",
            "TotalCharges",
        ] {
            rules.push(exists(column));
        }
        rules.extend([
            in_set("gender", &["Male", "Female"]),
            in_set("Partner", &yes_no),
            in_set("Dependents", &yes_no),
            in_set("PhoneService", &yes_no),
            in_set("Contract", &["Month-to-month", "One year", "Two year"]),
            in_set("InternetService", &["DSL", "Fiber optic", "No"]),
            between("tenure", Some(0.0), None),
            between("MonthlyCharges", Some(0.0), None),
            between("TotalCharges", Some(0.0), None),
            between("tenure", Some(0.0), Some(120.0)),
            between("MonthlyCharges", Some(0.0), Some(200.0)),
            not_null("tenure"),
            not_null("MonthlyCharges"),
            Rule::PairAtLeast {
                left: "TotalCharges".into(),
                right: "MonthlyCharges".into(),
                mostly: 0.95,
            },
        ]);
        Self { rules }
    }

    pub fn validate(&self, frame: &RawFrame) -> ValidationReport {
        info!("Validating {} rows against {} rules", frame.height(), self.rules.len());

        let results: Vec<RuleResult> = self.rules.iter().map(|rule| rule.evaluate(frame)).collect();
        let mut failed_rules = Vec::new();
        for result in results.iter().filter(|r| !r.success) {
            if !failed_rules.contains(&result.rule) {
                failed_rules.push(result.rule.clone());
            }
        }

        let report = ValidationReport {
            success: failed_rules.is_empty(),
            failed_rules,
            results,
        };
        if report.success {
            info!(
                "Data validation passed: {}/{} checks successful",
                report.passed(),
                report.total()
            );
        } else {
            warn!(
                failed = ?report.failed_rules,
                "Data validation failed: {}/{} checks failed",
                report.total() - report.passed(),
                report.total()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "customerID,gender,Partner,Dependents,PhoneService,InternetService,Contract,tenure,MonthlyCharges,TotalCharges";

    fn frame(rows: &[&str]) -> RawFrame {
        let csv = format!("{HEADER}\n{}\n", rows.join("\n"));
        RawFrame::from_reader(csv.as_bytes()).expect("valid csv")
    }

    #[test]
    fn test_clean_data_passes() {
        let data = frame(&[
            "0001,Female,Yes,No,No,DSL,Month-to-month,1,29.85,29.85",
            "0002,Male,No,No,Yes,DSL,One year,34,56.95,1889.5",
            "0003,Male,No,Yes,Yes,Fiber optic,Two year,0,20.0,",
        ]);
        let report = DataValidator::telco().validate(&data);
        assert!(report.success, "failed: {:?}", report.failed_rules);
        assert_eq!(report.passed(), report.total());
    }

    #[test]
    fn test_domain_and_range_failures_reported() {
        let data = frame(&[
            "0001,Other,Yes,No,No,DSL,Month-to-month,1,29.85,29.85",
            "0002,Male,No,No,Yes,DSL,Weekly,150,56.95,1889.5",
        ]);
        let report = DataValidator::telco().validate(&data);
        assert!(!report.success);
        assert!(report
            .failed_rules
            .contains(&"expect_column_values_to_be_in_set(gender)".to_string()));
        assert!(report
            .failed_rules
            .contains(&"expect_column_values_to_be_in_set(Contract)".to_string()));
        assert!(report
            .failed_rules
            .contains(&"expect_column_values_to_be_between(tenure)".to_string()));
        // The unbounded tenure rule shares the id; it is only listed once
        let tenure_failures = report
            .failed_rules
            .iter()
            .filter(|r| r.contains("between(tenure)"))
            .count();
        assert_eq!(tenure_failures, 1);
    }

    #[test]
    fn test_missing_column_fails_existence() {
        let data = RawFrame::from_reader("customerID,gender\n1,Male\n".as_bytes()).expect("valid csv");
        let report = DataValidator::telco().validate(&data);
        assert!(report
            .failed_rules
            .contains(&"expect_column_to_exist(Contract)".to_string()));
    }

    #[test]
    fn test_pair_rule_tolerates_mostly() {
        let rule = Rule::PairAtLeast {
            left: "a".into(),
            right: "b".into(),
            mostly: 0.75,
        };
        let data = RawFrame::from_reader("a,b\n5,1\n5,2\n5,3\n1,9\n".as_bytes()).expect("valid csv");
        let validator = DataValidator::default().with_rule(rule);
        assert!(validator.validate(&data).success);

        let strict = DataValidator::new(vec![Rule::PairAtLeast {
            left: "a".into(),
            right: "b".into(),
            mostly: 0.9,
        }]);
        assert!(!strict.validate(&data).success);
    }

    #[test]
    fn test_rules_read_text_cells_of_mixed_columns() {
        // One stray token turns the column into text; the numeric cells still count
        let data = RawFrame::from_reader("tenure,code\n12,01\nn/a,B\n30,01\n".as_bytes()).expect("valid csv");
        let validator = DataValidator::new(vec![
            Rule::Between {
                column: "tenure".into(),
                min: Some(0.0),
                max: Some(100.0),
            },
            Rule::InSet {
                column: "code".into(),
                allowed: vec!["01".into(), "B".into()],
            },
        ]);
        let report = validator.validate(&data);
        assert_eq!(report.results[0].unexpected_count, 1);
        assert_eq!(report.results[0].element_count, 3);
        assert!(report.results[1].success);
        assert_eq!(report.failed_rules, vec!["expect_column_values_to_be_between(tenure)"]);
    }

    #[test]
    fn test_into_result_fails_closed() {
        let data = RawFrame::from_reader("x\n1\n".as_bytes()).expect("valid csv");
        let err = DataValidator::telco().validate(&data).into_result().unwrap_err();
        match err {
            ChurnError::DataQuality { failed_rules } => assert!(!failed_rules.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
