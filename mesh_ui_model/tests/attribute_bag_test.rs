//! Attribute bag behavior: set/get/remove, index self-healing, merge,
//! sub-bags and the wire form.

use std::sync::Arc;
use std::thread;

use mesh_ui_model::attribute_bag::{AttributeBag, NODE_ONLY_PROPERTIES};
use mesh_ui_model::fingerprint::canonical_fingerprint;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bag(entries: &[&str]) -> AttributeBag {
    AttributeBag::from_entries(entries.iter().copied())
}

// ─────────────────────────────────────────────────────────────
// Concrete scenario
// ─────────────────────────────────────────────────────────────

#[test]
fn caption_lifecycle() {
    let bag = AttributeBag::new();
    assert!(bag.set("Caption", "Hello", false));
    assert!(!bag.set("Caption", "World", false));
    assert_eq!(bag.get("Caption"), "World");
    assert!(bag.remove("Caption"));
    assert_eq!(bag.get("Caption"), "");
    assert!(!bag.remove("Caption"));
    assert!(bag.is_empty());
}

#[test]
fn repeated_update_is_idempotent() {
    let bag = bag(&["Caption=Start", "Width=3"]);
    assert!(bag.set("Value", "42", false));
    let first = bag.to_map();
    let first_print = canonical_fingerprint(&bag);

    assert!(!bag.set("Value", "42", false));
    assert_eq!(bag.to_map(), first);
    assert_eq!(canonical_fingerprint(&bag), first_print);
    assert_eq!(bag.len(), 3);
}

#[test]
fn set_without_duplicates_moves_entry_to_end() {
    let bag = bag(&["A=1", "B=2", "C=3"]);
    bag.set("A", "9", false);
    assert_eq!(bag.entries(), vec!["B=2", "C=3", "A=9"]);
}

#[test]
fn duplicates_allowed_keeps_both_and_last_wins() {
    let bag = AttributeBag::new();
    assert!(bag.set("Tag", "one", true));
    assert!(!bag.set("Tag", "two", true));
    assert_eq!(bag.len(), 2);
    assert_eq!(bag.get("Tag"), "two");
    assert!(bag.remove("Tag"));
    assert_eq!(bag.len(), 0);
}

#[test]
fn missing_names_degrade_to_empty() {
    let bag = AttributeBag::new();
    assert_eq!(bag.get("Nope"), "");
    assert_eq!(bag.get_or("Nope", "fallback"), "fallback");
    assert!(!bag.get_bool("Nope"));
    assert!(!bag.contains("Nope"));
}

#[test]
fn entry_without_separator_is_a_flag() {
    let bag = bag(&["ReadOnly", "Caption=x"]);
    assert_eq!(bag.get("ReadOnly"), "true");
    assert!(bag.get_bool("ReadOnly"));
    assert!(!bag.get_bool("Caption"));
}

#[test]
fn values_may_contain_the_separator() {
    let bag = bag(&["Formula=a=b+c"]);
    assert_eq!(bag.get("Formula"), "a=b+c");
}

#[test]
fn names_holding_the_separator_are_refused() {
    init_logging();
    let bag = bag(&["Caption=x"]);
    assert!(!bag.set("a=b", "c", false));
    assert_eq!(bag.entries(), vec!["Caption=x"]);
    assert_eq!(bag.get("a"), "");

    let colons = AttributeBag::with_separator("::");
    colons.set("Url::Port", "80", false);
    assert!(colons.entries().is_empty());
}

#[test]
fn custom_separator() {
    let bag = AttributeBag::with_separator("::");
    bag.set("Url", "http://host", false);
    assert_eq!(bag.entries(), vec!["Url::http://host"]);
    assert_eq!(bag.get("Url"), "http://host");
}

// ─────────────────────────────────────────────────────────────
// Index self-healing
// ─────────────────────────────────────────────────────────────

#[test]
fn corrupted_index_is_rebuilt_on_next_get() {
    init_logging();
    let bag = bag(&["Caption=Real", "Width=2"]);
    assert_eq!(bag.get("Caption"), "Real");

    bag.inject_index_entry("Ghost", "boo");
    bag.inject_index_entry("Caption", "Forged");

    // Index size now diverges from the entry count.
    assert_eq!(bag.get("Caption"), "Real");
    assert_eq!(bag.get("Ghost"), "");
    assert_eq!(bag.get("Width"), "2");
}

#[test]
fn concurrent_writers_converge_after_rebuild() {
    init_logging();
    let bag = Arc::new(AttributeBag::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let bag = Arc::clone(&bag);
            thread::spawn(move || {
                for i in 0..50 {
                    bag.set(&format!("P{}", t), &i.to_string(), false);
                    bag.set("Shared", &format!("{}-{}", t, i), false);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    bag.rebuild_index();
    let map = bag.to_map();
    for (name, value) in &map {
        assert_eq!(&bag.get(name), value);
    }
    assert_eq!(bag.len(), 9);
    for t in 0..8 {
        assert_eq!(bag.get(&format!("P{}", t)), "49");
    }
}

// ─────────────────────────────────────────────────────────────
// Merge
// ─────────────────────────────────────────────────────────────

#[test]
fn merge_replaces_and_appends() {
    let a = bag(&["Caption=Old", "Width=2"]);
    let b = bag(&["Caption=New", "Height=4"]);
    a.merge(&b, false, false);
    assert_eq!(a.entries(), vec!["Width=2", "Caption=New", "Height=4"]);
    assert_eq!(a.get("Caption"), "New");
}

#[test]
fn merge_is_idempotent() {
    let a = bag(&["Caption=Old", "Width=2", "Style=flat"]);
    let b = bag(&["Caption=New", "Height=4"]);

    a.merge(&b, false, false);
    let once = a.to_map();
    let once_entries = a.entries();

    a.merge(&b, false, true);
    assert_eq!(a.to_map(), once);
    assert_eq!(a.entries(), once_entries);
}

#[test]
fn merge_can_skip_node_only_names() {
    let reserved = NODE_ONLY_PROPERTIES[0];
    let a = bag(&["Caption=x"]);
    let b = AttributeBag::new();
    b.set(reserved, "secret", false);
    b.set("Caption", "y", false);

    a.merge(&b, true, false);
    assert_eq!(a.get("Caption"), "y");
    assert!(!a.contains(reserved));

    a.merge(&b, false, false);
    assert_eq!(a.get(reserved), "secret");
}

#[test]
fn merge_into_itself_does_not_deadlock() {
    let a = bag(&["A=1", "B=2"]);
    a.merge(&a, false, true);
    assert_eq!(a.to_map().len(), 2);
    assert_eq!(a.get("B"), "2");
}

#[test]
fn merge_across_separators_recomposes_entries() {
    let a = AttributeBag::new();
    let b = AttributeBag::from_entries_with("::", ["Url::http://x"]);
    a.merge(&b, false, false);
    assert_eq!(a.entries(), vec!["Url=http://x"]);
}

// ─────────────────────────────────────────────────────────────
// Copies and sub-bags
// ─────────────────────────────────────────────────────────────

#[test]
fn clone_is_independent() {
    let a = bag(&["Caption=x"]);
    let b = a.clone_with(true);
    b.set("Caption", "y", false);
    assert_eq!(a.get("Caption"), "x");
    assert_eq!(b.get("Caption"), "y");

    let c = a.clone();
    assert_eq!(c, a);
}

#[test]
fn sub_bag_selects_by_leading_dots() {
    let bag = bag(&["Caption=top", ".Caption=phone", "..Caption=inner", ".Width=3"]);

    let top = bag.sub_bag(0);
    assert_eq!(top.entries(), vec!["Caption=top"]);

    let one = bag.sub_bag(1);
    assert_eq!(one.entries(), vec!["Caption=phone", "Width=3"]);
    assert_eq!(one.get("Width"), "3");

    let two = bag.sub_bag(2);
    assert_eq!(two.get("Caption"), "inner");

    assert!(bag.sub_bag(3).is_empty());
}

#[test]
fn names_are_distinct_in_first_seen_order() {
    let bag = AttributeBag::new();
    bag.set("B", "1", true);
    bag.set("A", "1", true);
    bag.set("B", "2", true);
    assert_eq!(bag.names(), vec!["B", "A"]);
}

#[test]
fn clear_drops_entries_and_index() {
    let bag = bag(&["A=1"]);
    assert_eq!(bag.get("A"), "1");
    bag.clear();
    assert_eq!(bag.get("A"), "");
    assert!(bag.is_empty());
}

// ─────────────────────────────────────────────────────────────
// Wire form
// ─────────────────────────────────────────────────────────────

#[test]
fn serializes_as_ordered_entry_list() {
    let bag = bag(&["Caption=x", "Visible"]);
    let json = serde_json::to_string(&bag).unwrap();
    assert_eq!(json, r#"["Caption=x","Visible"]"#);

    let back: AttributeBag = serde_json::from_str(&json).unwrap();
    assert_eq!(back.get("Visible"), "true");
    assert_eq!(back, bag);
}
