use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use facets_engine::{run_batch, DatasetDescriptor, Value};
use facets_io::{load_registry, read_table, write_table, CsvReader, IoError};

const MANIFEST: &str = r#"
[[taxonomies]]
name = "location"
file = "classifications/locations.csv"

[[taxonomies]]
name = "product"
file = "classifications/products.csv"
"#;

const LOCATIONS: &str = "\
id,code,name_en,level,parent_id
1,COL,Colombia,country,
5,08,Atlántico,department,1
6,11,Bogotá,department,1
";

const PRODUCTS: &str = "\
id,code,name_en,level,parent_id
10,01,Live animals,2digit,
90,0101,Horses,4digit,10
";

// Codes lost their leading zeros on the way out of the statistics package
const EXPORTS: &str = "\
r;p;yr;X_rpy_p;junk
8;101;2012;100;a
11;101;2012;50;b
11;.;2012;9;c
";

const DESCRIPTOR: &str = r#"
name = "trade4digit_department"
source = "exp_dpto.csv"
facet_fields = ["department", "product", "year"]

[rename]
r = "department"
p = "product"
yr = "year"
X_rpy_p = "export_value"

[classification_fields.department]
taxonomy = "location"
level = "department"

[classification_fields.product]
taxonomy = "product"
level = "4digit"

[digit_padding]
department = 2
product = 4

[[filters]]
column = "product"
exclude = ["."]

[[facets]]
key = ["department_id", "product_id", "year"]
[facets.aggregations]
export_value = "sum"

[[facets]]
key = ["product_id", "year"]
[facets.aggregations]
export_value = "sum"
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn write_fixture(dir: &Path) {
    fs::create_dir(dir.join("classifications")).unwrap();
    fs::write(dir.join("manifest.toml"), MANIFEST).unwrap();
    fs::write(dir.join("classifications/locations.csv"), LOCATIONS).unwrap();
    fs::write(dir.join("classifications/products.csv"), PRODUCTS).unwrap();
    fs::write(dir.join("exp_dpto.csv"), EXPORTS).unwrap();
}

#[test]
fn manifest_builds_registry() {
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let registry = load_registry(&dir.path().join("manifest.toml")).unwrap();
    assert_eq!(registry.taxonomies(), vec!["location", "product"]);
    assert_eq!(registry.resolve("location", "08", "department").unwrap(), 5);
    let bogota = registry.get("location").unwrap().node(6).unwrap();
    assert_eq!(bogota.display.get("name_en").map(String::as_str), Some("Bogotá"));
}

#[test]
fn missing_classification_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("manifest.toml"), MANIFEST).unwrap();
    let err = load_registry(&dir.path().join("manifest.toml")).unwrap_err();
    assert!(matches!(err, IoError::File { .. }));
    assert!(err.to_string().contains("locations.csv"), "{err}");
}

#[test]
fn files_to_facets() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_fixture(dir.path());

    let registry = Arc::new(load_registry(&dir.path().join("manifest.toml")).unwrap());
    let good = DatasetDescriptor::from_toml(DESCRIPTOR).unwrap();
    let mut missing = good.clone();
    missing.name = "missing".into();
    missing.source = Some("nope.csv".into());

    let reader = CsvReader::new(dir.path());
    let results = run_batch(&[good, missing], &reader, &registry);

    let err = results[1].as_ref().unwrap_err().to_string();
    assert!(err.starts_with("dataset 'missing': read error:"), "{err}");

    let out = results[0].as_ref().unwrap();
    assert_eq!(out.rows_rectangularized, 2);
    let dpy = out.facet(&["department_id", "product_id", "year"]).unwrap();
    assert_eq!(
        dpy.value(&[Value::Int(5), Value::Int(90), Value::Int(2012)], "export_value"),
        Some(&Value::Int(100))
    );
    assert_eq!(
        dpy.value(&[Value::Int(6), Value::Int(90), Value::Int(2012)], "export_value"),
        Some(&Value::Int(50))
    );
    let py = out.facet(&["product_id", "year"]).unwrap();
    assert_eq!(
        py.value(&[Value::Int(90), Value::Int(2012)], "export_value"),
        Some(&Value::Int(150))
    );

    // Diagnostics serialize for the storage side
    let json = serde_json::to_value(out).unwrap();
    assert_eq!(json["name"], "trade4digit_department");
    assert_eq!(json["merge_reports"][0]["matched"], 2);

    // Export and read back
    let path = dir.path().join("department_product_year.csv");
    write_table(&dpy.table, &path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "department_id,product_id,year,export_value\n5,90,2012,100\n6,90,2012,50\n"
    );
    assert_eq!(read_table(&path).unwrap(), dpy.table);
}
