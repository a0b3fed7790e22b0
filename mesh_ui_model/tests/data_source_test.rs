//! Data-source descriptor decoding and row selection.

use mesh_ui_model::data_source::{DataSource, Filter, FilterOp};
use mesh_ui_model::error::ModelError;
use mesh_ui_model::record::Record;

fn rows(n: u64) -> Vec<Record> {
    (1..=n)
        .map(|i| {
            let mut r = Record::new(&format!("r{}", i))
                .with_field("Name", &format!("sensor-{}", i))
                .with_field("Kind", if i % 2 == 0 { "even" } else { "odd" });
            r.sequence = i;
            r
        })
        .collect()
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[test]
fn parses_full_descriptor() {
    let ds = DataSource::parse("Sensors;:;10;:;True;:;Kind=odd&&Name~SENSOR;:;2").unwrap();
    assert_eq!(ds.source_kind, "Sensors");
    assert_eq!(ds.max_records, 10);
    assert!(ds.sort_descending);
    assert_eq!(ds.page, Some(2));
    assert_eq!(ds.filter.clauses.len(), 2);
    assert_eq!(ds.filter.clauses[0].op, FilterOp::Equals);
    assert_eq!(ds.filter.clauses[1].op, FilterOp::Contains);
}

#[test]
fn trailing_fields_default() {
    let ds = DataSource::parse("Sensors").unwrap();
    assert_eq!(ds, DataSource::new("Sensors"));

    let ds = DataSource::parse("Sensors;:;;:;;:;").unwrap();
    assert_eq!(ds.max_records, 0);
    assert!(!ds.sort_descending);
    assert!(ds.filter.is_empty());
}

#[test]
fn encode_then_parse_preserves_meaning() {
    let original = "Sensors;:;5;:;false;:;Kind!=even;:;1";
    let ds: DataSource = original.parse().unwrap();
    assert_eq!(ds.encode(), original);
    assert_eq!(DataSource::parse(&ds.to_string()).unwrap(), ds);
}

#[test]
fn malformed_descriptors_are_rejected() {
    for bad in [
        "",
        ";:;10",
        "Sensors;:;ten",
        "Sensors;:;1;:;maybe",
        "Sensors;:;1;:;true;:;NoOperator",
        "Sensors;:;1;:;true;:;=value",
        "Sensors;:;1;:;true;:;;:;x",
        "Sensors;:;1;:;true;:;;:;1;:;extra",
    ] {
        assert!(DataSource::parse(bad).is_err(), "accepted {:?}", bad);
    }

    match DataSource::parse("Sensors;:;ten") {
        Err(ModelError::MalformedDataSource { input, .. }) => assert_eq!(input, "Sensors;:;ten"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn not_equals_is_not_read_as_equals() {
    let f = Filter::parse("Kind!=even").unwrap();
    assert_eq!(f.clauses[0].name, "Kind");
    assert_eq!(f.clauses[0].op, FilterOp::NotEquals);
    assert_eq!(f.clauses[0].value, "even");
}

#[test]
fn filter_applies_before_paging() {
    let ds = DataSource::parse("Sensors;:;2;:;false;:;Kind=odd;:;1").unwrap();
    let sel = ds.select(rows(9));
    assert_eq!(sel.total, 5);
    assert_eq!(sel.page, 1);
    assert_eq!(ids(&sel.records), vec!["r5", "r7"]);
}

#[test]
fn descending_sorts_by_sequence() {
    let ds = DataSource::parse("Sensors;:;3;:;true").unwrap();
    let mut input = rows(5);
    input.reverse();
    input.swap(0, 3);
    let sel = ds.select(input);
    assert_eq!(ids(&sel.records), vec!["r5", "r4", "r3"]);
}

#[test]
fn unlimited_ignores_page() {
    let ds = DataSource::parse("Sensors;:;0;:;false;:;;:;4").unwrap();
    let sel = ds.select(rows(3));
    assert_eq!(sel.records.len(), 3);
}

#[test]
fn page_past_the_end_is_empty() {
    let ds = DataSource::parse("Sensors;:;2;:;false;:;;:;10").unwrap();
    let sel = ds.select(rows(3));
    assert_eq!(sel.total, 3);
    assert!(sel.records.is_empty());
}
