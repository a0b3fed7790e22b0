//! Descriptors, bindings, invariants, deltas and fingerprints.

use mesh_ui_model::attribute_bag::AttributeBag;
use mesh_ui_model::data_source::DataSource;
use mesh_ui_model::delta::compare_bags;
use mesh_ui_model::descriptor::{Descriptor, DescriptorKind, PlatformClass, PropertyBinding};
use mesh_ui_model::error::ModelError;
use mesh_ui_model::fingerprint::canonical_fingerprint;
use mesh_ui_model::invariants::{try_validate_bag, try_validate_descriptor};

fn field() -> Descriptor {
    Descriptor::new(DescriptorKind::Field, "fld-temp")
        .with_owner("thing-1")
        .with_property("Caption", "Temperature")
        .with_property("Width", "2")
        .with_platform_override(PlatformClass::Phone, "Width", "1")
        .with_binding(PropertyBinding::new("thing-1", "Temp"))
}

#[test]
fn effective_properties_apply_platform_override() {
    let d = field();
    let phone = d.effective_properties(Some(PlatformClass::Phone));
    assert_eq!(phone.get("Width"), "1");
    assert_eq!(phone.get("Caption"), "Temperature");

    let desktop = d.effective_properties(Some(PlatformClass::Desktop));
    assert_eq!(desktop.get("Width"), "2");

    // The descriptor itself is untouched.
    assert_eq!(d.properties.get("Width"), "2");
}

#[test]
fn platform_parse_is_lenient() {
    assert_eq!(PlatformClass::parse("Phone"), Some(PlatformClass::Phone));
    assert_eq!(PlatformClass::parse("TouchDisplay"), Some(PlatformClass::TouchDisplay));
    assert_eq!(PlatformClass::parse("toaster"), None);
}

#[test]
fn binding_parse() {
    let b: PropertyBinding = "thing-1;Temp".parse().unwrap();
    assert_eq!(b, PropertyBinding::new("thing-1", "Temp"));
    assert_eq!(b.encode(), "thing-1;Temp");
    assert!(field().is_bound_to("thing-1", "Temp"));
    assert!(!field().is_bound_to("thing-1", "Humidity"));

    for bad in ["", "thing-1", ";Temp", "thing-1;", "a;b;c"] {
        assert!(
            matches!(PropertyBinding::parse(bad), Err(ModelError::MalformedBinding(_))),
            "accepted {:?}",
            bad
        );
    }
}

#[test]
fn shared_sources() {
    let a = Descriptor::new(DescriptorKind::Form, "a")
        .with_data_source(DataSource::parse("Sensors;:;10").unwrap());
    let b = Descriptor::new(DescriptorKind::Form, "b")
        .with_data_source(DataSource::parse("Sensors;:;0;:;true").unwrap());
    let c = Descriptor::new(DescriptorKind::Form, "c");
    assert!(a.shares_source_with(&b));
    assert!(!a.shares_source_with(&c));
}

#[test]
fn valid_descriptor_passes_invariants() {
    assert_eq!(try_validate_descriptor(&field()), Ok(()));
}

#[test]
fn invalid_ids_are_rejected() {
    for id in ["", "has space", "colon:id"] {
        let d = Descriptor::new(DescriptorKind::Tile, id);
        match try_validate_descriptor(&d) {
            Err(ModelError::InvariantViolation { rule, .. }) => {
                assert_eq!(rule, "descriptor_id_format")
            }
            other => panic!("unexpected {:?} for {:?}", other, id),
        }
    }
}

#[test]
fn nameless_bag_entry_is_rejected() {
    let bag = AttributeBag::from_entries(["=orphan"]);
    assert!(try_validate_bag(&bag).is_err());
}

#[test]
fn delta_reports_only_moved_names() {
    let before = AttributeBag::from_entries(["A=1", "B=2", "C=3"]);
    let after = before.clone_with(false);
    after.set("B", "20", false);
    after.set("D", "4", false);
    after.remove("C");

    let delta = compare_bags(&before, &after);
    assert_eq!(delta.changed, vec![("B".to_string(), "20".to_string())]);
    assert_eq!(delta.added, vec![("D".to_string(), "4".to_string())]);
    assert_eq!(delta.removed, vec!["C".to_string()]);
    assert_eq!(delta.assignments().len(), 3);

    assert!(compare_bags(&after, &after.clone()).is_empty());
}

#[test]
fn fingerprint_ignores_entry_order() {
    let a = AttributeBag::from_entries(["A=1", "B=2"]);
    let b = AttributeBag::from_entries(["B=2", "A=1"]);
    let c = AttributeBag::from_entries(["A=1", "B=3"]);
    assert_eq!(canonical_fingerprint(&a), canonical_fingerprint(&b));
    assert_ne!(canonical_fingerprint(&a), canonical_fingerprint(&c));
    assert_eq!(canonical_fingerprint(&a).len(), 64);
}

#[test]
fn descriptor_round_trips_through_json() {
    let d = field().with_data_source(DataSource::parse("Sensors;:;3").unwrap());
    let json = serde_json::to_string(&d).unwrap();
    let back: Descriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, d);
}
