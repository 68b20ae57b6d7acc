use std::sync::Arc;

use facets_engine::classification::{Classification, ClassificationRecord, ClassificationRegistry, Taxonomy};
use facets_engine::merge::{merge, pad_codes};
use facets_engine::pipeline::{process_dataset, run_batch};
use facets_engine::{complete, DatasetDescriptor, EngineError, Table, Value};

fn registry() -> ClassificationRegistry {
    let locations = Classification::load(
        Taxonomy::builtin("location").unwrap(),
        vec![
            ClassificationRecord::new(1, "COL", "country", None),
            ClassificationRecord::new(5, "08", "department", Some(1)),
            ClassificationRecord::new(6, "11", "department", Some(1)),
        ],
    )
    .unwrap();
    let products = Classification::load(
        Taxonomy::builtin("product").unwrap(),
        vec![
            ClassificationRecord::new(10, "01", "2digit", None),
            ClassificationRecord::new(90, "0101", "4digit", Some(10)),
            ClassificationRecord::new(91, "0102", "4digit", Some(10)),
        ],
    )
    .unwrap();
    ClassificationRegistry::new()
        .with(locations)
        .unwrap()
        .with(products)
        .unwrap()
}

const TRADE: &str = r#"
name = "trade4digit_department"
facet_fields = ["location", "product", "year"]

[classification_fields.location]
taxonomy = "location"
level = "department"

[classification_fields.product]
taxonomy = "product"
level = "4digit"

[digit_padding]
location = 2
product = 4

[[facets]]
key = ["location_id", "product_id", "year"]
[facets.aggregations]
export = "sum"

[[facets]]
key = ["location_id", "year"]
[facets.aggregations]
export = "sum"
eci = "first"

[[facets]]
key = ["product_id", "year"]
[facets.aggregations]
export = "sum"
"#;

fn trade_rows(rows: &[(&str, &str, i64, Option<i64>, Option<f64>)]) -> Table {
    Table::from_rows(
        ["location", "product", "year", "export", "eci"],
        rows.iter()
            .map(|(l, p, y, e, eci)| vec![(*l).into(), (*p).into(), (*y).into(), (*e).into(), (*eci).into()])
            .collect(),
    )
    .unwrap()
}

// -------------------------------------------------------------------------
// End-to-end
// -------------------------------------------------------------------------

#[test]
fn department_trade_end_to_end() {
    let registry = registry();
    let raw = trade_rows(&[
        ("08", "0101", 2012, Some(100), None),
        ("11", "0101", 2012, Some(50), None),
    ]);

    // Rectangularization: both combinations already present
    let rect = complete(raw.clone(), &["location", "product", "year"]).unwrap();
    assert_eq!(rect.len(), 2);

    // Merge
    let (merged, report) = merge(rect, "location", &registry, "location", "department").unwrap();
    let (merged, _) = merge(merged, "product", &registry, "product", "4digit").unwrap();
    assert_eq!(report.matched, 2);
    let location_ids: Vec<_> = merged.column("location_id").unwrap().cloned().collect();
    assert_eq!(location_ids, vec![Value::Int(5), Value::Int(6)]);
    assert!(merged.column("product_id").unwrap().all(|v| *v == Value::Int(90)));

    // Full pipeline
    let descriptor = DatasetDescriptor::from_toml(TRADE).unwrap();
    let out = process_dataset(&descriptor, raw, &registry).unwrap();
    let lpy = out.facet(&["location_id", "product_id", "year"]).unwrap();
    assert_eq!(lpy.len(), 2);
    assert_eq!(
        lpy.value(&[Value::Int(5), Value::Int(90), Value::Int(2012)], "export"),
        Some(&Value::Int(100))
    );
    assert_eq!(
        lpy.value(&[Value::Int(6), Value::Int(90), Value::Int(2012)], "export"),
        Some(&Value::Int(50))
    );
    let py = out.facet(&["product_id", "year"]).unwrap();
    assert_eq!(py.value(&[Value::Int(90), Value::Int(2012)], "export"), Some(&Value::Int(150)));
}

#[test]
fn coarse_facets_see_complete_groups() {
    let raw = trade_rows(&[
        ("8", "101", 2012, Some(100), Some(0.25)),
        ("11", "102", 2012, Some(50), Some(-1.0)),
        ("8", "102", 2013, Some(30), Some(0.5)),
    ]);
    let descriptor = DatasetDescriptor::from_toml(TRADE).unwrap();
    let out = process_dataset(&descriptor, raw, &registry()).unwrap();

    // 2 locations x 2 products x 2 years
    assert_eq!(out.rows_rectangularized, 8);
    let lpy = out.facet(&["location_id", "product_id", "year"]).unwrap();
    assert_eq!(lpy.len(), 8);
    assert_eq!(
        lpy.value(&[Value::Int(6), Value::Int(90), Value::Int(2013)], "export"),
        Some(&Value::Null)
    );

    let ly = out.facet(&["location_id", "year"]).unwrap();
    assert_eq!(ly.len(), 4);
    assert_eq!(
        ly.value(&[Value::Int(5), Value::Int(2012)], "eci"),
        Some(&Value::float(0.25))
    );
    assert_eq!(
        ly.value(&[Value::Int(6), Value::Int(2013)], "export"),
        Some(&Value::Null)
    );
}

#[test]
fn unmatched_codes_are_reported_not_grouped() {
    let raw = trade_rows(&[
        ("08", "0101", 2012, Some(100), None),
        ("98", "0101", 2012, Some(3), None),
        ("99", "0101", 2012, Some(7), None),
    ]);
    let descriptor = DatasetDescriptor::from_toml(TRADE).unwrap();
    let out = process_dataset(&descriptor, raw, &registry()).unwrap();

    let location_report = &out.merge_reports[0];
    assert_eq!(location_report.column, "location");
    assert_eq!(location_report.unmatched.get("98"), Some(&1));
    assert_eq!(location_report.unmatched.get("99"), Some(&1));

    // No shared null-id row for the two unknown locations
    let ly = out.facet(&["location_id", "year"]).unwrap();
    assert_eq!(ly.len(), 1);
    assert_eq!(ly.value(&[Value::Int(5), Value::Int(2012)], "export"), Some(&Value::Int(100)));
    assert_eq!(ly.value(&[Value::Null, Value::Int(2012)], "export"), None);

    // Facets that do not key on location still see every row
    let py = out.facet(&["product_id", "year"]).unwrap();
    assert_eq!(py.value(&[Value::Int(90), Value::Int(2012)], "export"), Some(&Value::Int(110)));
}

#[test]
fn strict_first_surfaces_disagreement() {
    let raw = trade_rows(&[
        ("08", "0101", 2012, Some(1), Some(0.1)),
        ("08", "0102", 2012, Some(2), Some(0.2)),
    ]);
    let input = format!("strict_first = true\n{TRADE}");
    let descriptor = DatasetDescriptor::from_toml(&input).unwrap();
    let err = process_dataset(&descriptor, raw, &registry()).unwrap_err();
    assert!(matches!(err, EngineError::InconsistentFirst { ref column, .. } if column == "eci"));
}

#[test]
fn duplicate_source_rows_are_rejected() {
    let raw = trade_rows(&[
        ("08", "0101", 2012, Some(1), None),
        ("8", "101", 2012, Some(2), None),
    ]);
    let descriptor = DatasetDescriptor::from_toml(TRADE).unwrap();
    // Distinct raw spellings collapse after padding
    let err = process_dataset(&descriptor, raw, &registry()).unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { .. }));
}

// -------------------------------------------------------------------------
// Batch
// -------------------------------------------------------------------------

#[test]
fn batch_runs_datasets_independently() {
    let registry = Arc::new(registry());
    let good = DatasetDescriptor::from_toml(TRADE).unwrap();
    let mut bad = good.clone();
    bad.name = "broken".into();
    bad.source = Some("missing".into());

    let reader = |d: &DatasetDescriptor| -> Result<Table, EngineError> {
        match d.source.as_deref() {
            Some("missing") => Err(EngineError::Read("missing".into())),
            _ => Ok(trade_rows(&[("08", "0101", 2012, Some(100), None)])),
        }
    };

    let results = run_batch(&[good, bad], &reader, &registry);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().name, "trade4digit_department");
    let err = results[1].as_ref().unwrap_err();
    assert!(err.to_string().starts_with("dataset 'broken'"), "{err}");
}

#[test]
fn padding_is_canonical_before_resolution() {
    let mut t = trade_rows(&[("8", "101", 2012, None, None)]);
    pad_codes(&mut t, "location", 2).unwrap();
    pad_codes(&mut t, "product", 4).unwrap();
    let (t, report) = merge(t, "location", &registry(), "location", "department").unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(t.get(0, "location"), Some(&Value::from("08")));
}
