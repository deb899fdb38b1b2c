use churn_core::encoder::{encode_record, encode_training};
use churn_core::frame::{Column, RawFrame, RawRecord, Value};
use churn_core::schema::ColumnEncoding;
use proptest::prelude::*;

// Property tests for train/serve encoding parity

const CONTRACTS: [&str; 3] = ["Month-to-month", "One year", "Two year"];
const PAYMENTS: [&str; 4] = [
    "Electronic check",
    "Mailed check",
    "Bank transfer (automatic)",
    "Credit card (automatic)",
];

fn fixture() -> RawFrame {
    let n = 8;
    let text = |f: &dyn Fn(usize) -> &'static str| -> Vec<Value> {
        (0..n).map(|i| Value::from(f(i))).collect()
    };
    RawFrame::new(vec![
        Column::new("gender", text(&|i| if i % 2 == 0 { "Male" } else { "Female" })),
        Column::new("Contract", text(&|i| CONTRACTS[i % 3])),
        Column::new("PaymentMethod", text(&|i| PAYMENTS[i % 4])),
        Column::new("tenure", (0..n).map(|i| Value::Int(i as i64 * 7)).collect()),
        Column::new("Churn", text(&|i| if i % 3 == 0 { "Yes" } else { "No" })),
    ])
    .expect("valid fixture")
}

fn maybe_level(levels: &'static [&'static str]) -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        prop::sample::select(levels).prop_map(|s| Some(s.to_string())),
        "[a-z]{1,8}".prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn binary_mapping_invariant_under_row_order(
        flags in prop::collection::vec(any::<bool>(), 0..24),
        seed in any::<u64>(),
    ) {
        // Both values must appear for the column to be binary
        let mut flags = flags;
        flags.push(true);
        flags.push(false);
        let mut reordered = flags.clone();
        let len = reordered.len();
        reordered.rotate_left((seed as usize) % len);
        reordered.reverse();

        let frame_of = |bits: &[bool]| {
            RawFrame::new(vec![
                Column::new("Tier", bits.iter().map(|&b| Value::from(if b { "gold" } else { "basic" })).collect()),
                Column::new("Churn", bits.iter().map(|&b| Value::Int(i64::from(b))).collect()),
            ])
            .expect("valid frame")
        };

        let a = encode_training(&frame_of(&flags), "Churn").expect("encodes");
        let b = encode_training(&frame_of(&reordered), "Churn").expect("encodes");
        prop_assert_eq!(&a.spec, &b.spec);
        prop_assert_eq!(
            &a.spec.columns[0].encoding,
            &ColumnEncoding::Binary { zero: "basic".into(), one: "gold".into() }
        );
    }

    #[test]
    fn serving_output_always_matches_schema(
        gender in maybe_level(&["Male", "Female"]),
        contract in maybe_level(&CONTRACTS),
        payment in maybe_level(&PAYMENTS),
        tenure in prop::option::of(0i64..120),
        extra in prop::option::of("[A-Za-z]{1,10}"),
    ) {
        let encoding = encode_training(&fixture(), "Churn").expect("encodes");
        let schema = encoding.spec.schema();

        let mut record = RawRecord::new();
        for (field, value) in [("gender", gender), ("Contract", contract), ("PaymentMethod", payment)] {
            if let Some(v) = value {
                record.insert(field.to_string(), Value::Text(v));
            }
        }
        if let Some(t) = tenure {
            record.insert("tenure".to_string(), Value::Int(t));
        }
        if let Some(name) = extra {
            record.insert(format!("Extra{name}"), Value::from("surprise"));
        }

        let row = encode_record(&record, &encoding.spec, &schema, &[]).expect("encodes");
        prop_assert_eq!(row.len(), schema.len());
        prop_assert!(row.iter().all(|v| v.is_finite()));

        // Indicators within one column never sum above one
        for prefix in ["Contract_", "PaymentMethod_"] {
            let sum: f64 = schema
                .columns()
                .iter()
                .zip(&row)
                .filter(|(name, _)| name.starts_with(prefix))
                .map(|(_, v)| v)
                .sum();
            prop_assert!(sum <= 1.0);
        }
    }
}

#[test]
fn unknown_level_yields_zero_indicators() {
    let encoding = encode_training(&fixture(), "Churn").expect("encodes");
    let schema = encoding.spec.schema();
    let record: RawRecord = [
        ("Contract".to_string(), Value::from("Three year")),
        ("tenure".to_string(), Value::Int(3)),
    ]
    .into_iter()
    .collect();

    let row = encode_record(&record, &encoding.spec, &schema, &[]).expect("encodes");
    assert_eq!(row.len(), schema.len());
    assert!(schema.position("Contract_Three year").is_none());
    for (name, value) in schema.columns().iter().zip(&row) {
        if name.starts_with("Contract_") {
            assert_eq!(*value, 0.0, "{name}");
        }
    }
}

#[test]
fn missing_optional_field_zeroes_derived_columns() {
    let encoding = encode_training(&fixture(), "Churn").expect("encodes");
    let schema = encoding.spec.schema();
    let record: RawRecord = [("tenure".to_string(), Value::Int(30))].into_iter().collect();

    let row = encode_record(&record, &encoding.spec, &schema, &["tenure".to_string()]).expect("encodes");
    for (name, value) in schema.columns().iter().zip(&row) {
        if name == "tenure" {
            assert_eq!(*value, 30.0);
        } else {
            assert_eq!(*value, 0.0, "{name}");
        }
    }
}

#[test]
fn drop_first_uses_lexicographic_reference() {
    let encoding = encode_training(&fixture(), "Churn").expect("encodes");
    let contract = encoding.spec.column("Contract").expect("column present");
    assert_eq!(contract.output_columns(), vec!["Contract_One year", "Contract_Two year"]);
    let payment = encoding.spec.column("PaymentMethod").expect("column present");
    // "Bank transfer (automatic)" sorts first and is the reference level
    assert_eq!(payment.output_columns().len(), 3);
    assert!(!payment
        .output_columns()
        .contains(&"PaymentMethod_Bank transfer (automatic)".to_string()));
}
