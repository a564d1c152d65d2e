use std::collections::HashSet;

use serde_json::json;

use crate::{ConstraintSet, Direction, SymmetricPair, SymmetryLimit, align_name};

fn raw_ota_constraints() -> Vec<serde_json::Value> {
    vec![
        json!({
            "constraint": "SymmetricBlocks",
            "direction": "V",
            "pairs": [["mn0", "mn1"]]
        }),
        json!({"constraint": "PowerPorts", "ports": ["VDD"]}),
        json!({"constraint": "GroundPorts", "ports": ["VSS"]}),
    ]
}

fn ota_instances() -> HashSet<String> {
    ["X_MP0", "X_MP1", "X_MN0", "X_MN1", "X_MN2"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[test]
fn align_name_normalization() {
    assert_eq!(align_name("mn0"), "X_MN0");
    assert_eq!(align_name("MN0"), "X_MN0");
    assert_eq!(align_name("x_mn0"), "X_MN0");
    assert_eq!(align_name("X_MN0"), "X_MN0");
    // Non-M instances keep their full uppercased name.
    assert_eq!(align_name("dp0"), "X_DP0");
}

#[test]
fn sanitize_keeps_valid_ota_pair() {
    let set = ConstraintSet::from_raw(&raw_ota_constraints(), Some(&ota_instances()));
    assert_eq!(set.pairs, vec![SymmetricPair::new("mn0", "mn1")]);
    assert_eq!(set.direction, Direction::Vertical);
    assert_eq!(set.power_ports, vec!["VDD"]);
    assert_eq!(set.ground_ports, vec!["VSS"]);
    // The tail device stays unpaired.
    assert!(!set.pairs.iter().any(|p| p.contains("mn2")));
}

#[test]
fn sanitize_drops_unknown_instances() {
    let raw = vec![json!({
        "constraint": "SymmetricBlocks",
        "direction": "V",
        "pairs": [["mn0", "mn1"], ["mn7", "mn8"]]
    })];
    let set = ConstraintSet::from_raw(&raw, Some(&ota_instances()));
    assert_eq!(set.pairs, vec![SymmetricPair::new("mn0", "mn1")]);
}

#[test]
fn sanitize_drops_malformed_entries() {
    let raw = vec![
        json!("not an object"),
        json!({"constraint": "AlignInOrder", "line": "h"}),
        json!({
            "constraint": "SymmetricBlocks",
            "direction": "V",
            "pairs": [["mn0", "mn1", "mn2"], ["mn0", "mn1"]]
        }),
    ];
    let set = ConstraintSet::from_raw(&raw, Some(&ota_instances()));
    assert_eq!(set.pairs, vec![SymmetricPair::new("mn0", "mn1")]);
    assert!(set.power_ports.is_empty());
}

#[test]
fn direction_labels_normalize() {
    assert_eq!(Direction::from_label("v"), Direction::Vertical);
    assert_eq!(Direction::from_label(" Vertical "), Direction::Vertical);
    assert_eq!(Direction::from_label("h"), Direction::Horizontal);
    assert_eq!(Direction::from_label("sideways"), Direction::Horizontal);
}

#[test]
fn to_align_roundtrips_through_json() {
    let set = ConstraintSet::from_raw(&raw_ota_constraints(), None);
    let text = set.to_json().unwrap();
    let reparsed: Vec<serde_json::Value> = serde_json::from_str(&text).unwrap();
    let set2 = ConstraintSet::from_raw(&reparsed, None);
    assert_eq!(set, set2);
}

#[test]
fn to_align_omits_empty_sections() {
    let mut set = ConstraintSet::from_raw(&raw_ota_constraints(), None);
    set.pairs.clear();
    let out = set.to_align();
    assert_eq!(out.len(), 2);
    let text = set.to_json().unwrap();
    assert!(!text.contains("SymmetricBlocks"));
}

#[test]
fn symmetry_limit_drops_pairs_above_threshold() {
    let mut set = ConstraintSet::from_raw(&raw_ota_constraints(), None);
    let dropped = SymmetryLimit::default().apply(&mut set, 20);
    assert!(dropped);
    assert!(set.pairs.is_empty());
    // Port constraints survive.
    assert_eq!(set.power_ports, vec!["VDD"]);
    assert_eq!(set.ground_ports, vec!["VSS"]);
}

#[test]
fn symmetry_limit_keeps_pairs_at_threshold() {
    let mut set = ConstraintSet::from_raw(&raw_ota_constraints(), None);
    let dropped = SymmetryLimit::default().apply(&mut set, SymmetryLimit::DEFAULT_MAX_DEVICES);
    assert!(!dropped);
    assert_eq!(set.pairs.len(), 1);
}

#[test]
fn symmetry_limit_is_configurable() {
    let mut set = ConstraintSet::from_raw(&raw_ota_constraints(), None);
    assert!(SymmetryLimit::new(4).apply(&mut set, 5));
}
