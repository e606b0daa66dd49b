//! Golden tests for the inbound transform.
//!
//! These tests pin the exact normalized output for representative payloads.

use embedded_records::{
    EmbedError, EmbedPolicy, EmbeddedSerializer, InMemoryRecordStore, PayloadNode, RecordId, SchemaRegistry,
    TypeDescriptor, UnderscoreKeys,
};
use serde_json::{json, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn node(value: Value) -> PayloadNode {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn planet_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            TypeDescriptor::new("homePlanet")
                .attribute("name")
                .has_many("villains", "superVillain", EmbedPolicy::Always),
        )
        .unwrap()
        .with(
            TypeDescriptor::new("superVillain")
                .attribute("firstName")
                .attribute("lastName")
                .has_many("evilMinions", "evilMinion", EmbedPolicy::None),
        )
        .unwrap()
        .with(TypeDescriptor::new("evilMinion").attribute("name"))
        .unwrap()
}

fn comment_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            TypeDescriptor::new("comment")
                .attribute("body")
                .has_many("children", "comment", EmbedPolicy::Always),
        )
        .unwrap()
}

fn ids(bucket: &[PayloadNode]) -> Vec<Value> {
    bucket.iter().map(|n| n["id"].clone()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// SCENARIO TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_home_planet_with_embedded_villains() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "home_planet": {
            "id": "1",
            "name": "Umber",
            "villains": [{ "id": "1", "first_name": "Tom" }]
        }
    }));

    let normalized = serializer.extract(&mut store, "homePlanet", payload).unwrap();

    assert_eq!(
        Value::Object(normalized.root.clone()),
        json!({ "id": "1", "name": "Umber", "villains": ["1"] })
    );
    assert_eq!(
        normalized.to_json(&UnderscoreKeys)["superVillains"],
        json!([{ "id": "1", "firstName": "Tom" }])
    );

    // Sideloads were ingested; the root was not.
    let tom = store.find("superVillain", &RecordId::from("1")).unwrap();
    assert_eq!(tom.attribute("firstName"), Some(&json!("Tom")));
    assert!(store.find("homePlanet", &RecordId::from("1")).is_none());
}

#[test]
fn test_unconfigured_type_is_only_decoded() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "super_villain": { "id": "1", "first_name": "Tom", "last_name": "Dale", "evil_minions": ["2"] }
    }));

    let normalized = serializer.extract(&mut store, "superVillain", payload).unwrap();

    assert_eq!(
        Value::Object(normalized.root),
        json!({ "id": "1", "firstName": "Tom", "lastName": "Dale", "evilMinions": ["2"] })
    );
    assert!(normalized.sideloads.is_empty());
}

#[test]
fn test_same_type_tree_sideloads_every_descendant_once() {
    //       1
    //      / \
    //     2   3
    //     |
    //     4
    let serializer = EmbeddedSerializer::new(comment_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "comment": {
            "id": "1",
            "body": "root",
            "children": [
                { "id": "2", "body": "a", "children": [{ "id": "4", "body": "a.a" }] },
                { "id": "3", "body": "b" }
            ]
        }
    }));

    let normalized = serializer.extract(&mut store, "comment", payload).unwrap();

    assert_eq!(normalized.root["id"], json!("1"));
    assert_eq!(normalized.root["children"], json!(["2", "3"]));

    // Depth-first: the grandchild is sideloaded before its parent.
    let bucket = normalized.sideloads.bucket("comment");
    assert_eq!(ids(bucket), vec![json!("4"), json!("2"), json!("3")]);
    assert_eq!(bucket[1]["children"], json!(["4"]));
    assert!(bucket.iter().all(|n| n["id"] != json!("1")));
}

#[test]
fn test_collection_of_same_type_roots_keeps_roots_apart() {
    let serializer = EmbeddedSerializer::new(comment_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "comments": [
            { "id": "1", "children": [{ "id": "3" }] },
            { "id": "2", "children": [{ "id": "4" }, { "id": "3" }] }
        ]
    }));

    let normalized = serializer.extract_collection(&mut store, "comment", payload).unwrap();

    assert_eq!(ids(&normalized.roots), vec![json!("1"), json!("2")]);
    assert_eq!(normalized.roots[1]["children"], json!(["4", "3"]));
    // Shared accumulator, duplicates kept.
    assert_eq!(
        ids(normalized.sideloads.bucket("comment")),
        vec![json!("3"), json!("4"), json!("3")]
    );

    let rendered = normalized.to_json(&UnderscoreKeys);
    assert_eq!(rendered["comments"].as_array().unwrap().len(), 2);
    assert_eq!(rendered["_comments"].as_array().unwrap().len(), 3);
}

#[test]
fn test_distinct_relations_to_same_type_share_a_bucket() {
    let schema = SchemaRegistry::new()
        .with(
            TypeDescriptor::new("homePlanet")
                .has_many("villains", "superVillain", EmbedPolicy::Always)
                .has_many("formerVillains", "superVillain", EmbedPolicy::Load),
        )
        .unwrap()
        .with(TypeDescriptor::new("superVillain").attribute("firstName"))
        .unwrap();
    let serializer = EmbeddedSerializer::new(schema);
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "home_planet": {
            "id": "1",
            "villains": [{ "id": "1" }, { "id": "2" }],
            "former_villains": [{ "id": "3" }]
        }
    }));

    let normalized = serializer.extract(&mut store, "homePlanet", payload).unwrap();

    assert_eq!(normalized.root["villains"], json!(["1", "2"]));
    assert_eq!(normalized.root["formerVillains"], json!(["3"]));
    assert!(normalized.root.get("former_villains").is_none());
    assert_eq!(normalized.sideloads.types().collect::<Vec<_>>(), vec!["superVillain"]);
    assert_eq!(
        ids(normalized.sideloads.bucket("superVillain")),
        vec![json!("1"), json!("2"), json!("3")]
    );
}

#[test]
fn test_numeric_ids_are_stringified() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({ "home_planet": { "id": 1, "villains": [{ "id": 7 }, { "id": 8 }] } }));
    let normalized = serializer.extract(&mut store, "homePlanet", payload).unwrap();

    assert_eq!(normalized.root["villains"], json!(["7", "8"]));
}

#[test]
fn test_top_level_sideloads_are_flattened_too() {
    let schema = SchemaRegistry::new()
        .with(TypeDescriptor::new("homePlanet").has_many("villains", "superVillain", EmbedPolicy::None))
        .unwrap()
        .with(
            TypeDescriptor::new("superVillain")
                .attribute("firstName")
                .has_many("evilMinions", "evilMinion", EmbedPolicy::Always),
        )
        .unwrap()
        .with(TypeDescriptor::new("evilMinion").attribute("name"))
        .unwrap();
    let serializer = EmbeddedSerializer::new(schema);
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "home_planet": { "id": "1", "villains": ["1"] },
        "super_villains": [
            { "id": "1", "first_name": "Tom", "evil_minions": [{ "id": "5", "name": "Alex" }] }
        ]
    }));

    let normalized = serializer.extract(&mut store, "homePlanet", payload).unwrap();

    assert_eq!(normalized.root["villains"], json!(["1"]));
    assert_eq!(
        Value::Object(normalized.sideloads.bucket("superVillain")[0].clone()),
        json!({ "id": "1", "firstName": "Tom", "evilMinions": ["5"] })
    );
    assert_eq!(ids(normalized.sideloads.bucket("evilMinion")), vec![json!("5")]);

    let tom = store.find("superVillain", &RecordId::from("1")).unwrap();
    let minion = store.find("evilMinion", &RecordId::from("5")).unwrap();
    assert_eq!(tom.related("evilMinions"), &[minion.key]);
}

// ─────────────────────────────────────────────────────────────────────────────
// ERROR TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_root_is_reported() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let err = serializer
        .extract(&mut store, "homePlanet", node(json!({ "planet": {} })))
        .unwrap_err();
    assert!(matches!(err, EmbedError::MissingRoot(ref key) if key == "home_planet"));
}

#[test]
fn test_unregistered_root_type_is_reported() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let err = serializer
        .extract(&mut store, "moon", node(json!({ "moon": {} })))
        .unwrap_err();
    assert!(matches!(err, EmbedError::UnknownType(ref t) if t == "moon"));
}

#[test]
fn test_failed_extract_ingests_nothing() {
    let serializer = EmbeddedSerializer::new(planet_schema());
    let mut store = InMemoryRecordStore::new();

    let payload = node(json!({
        "home_planet": { "id": "1", "villains": [{ "id": "1" }, { "first_name": "anonymous" }] }
    }));

    let err = serializer.extract(&mut store, "homePlanet", payload).unwrap_err();
    assert!(matches!(err, EmbedError::MissingIdentifier { .. }));
    assert!(store.is_empty());
}

#[test]
fn test_deep_payload_hits_depth_limit() {
    let serializer = EmbeddedSerializer::new(comment_schema()).with_config(embedded_records::EmbedConfig {
        max_depth: 3,
        ..Default::default()
    });
    let mut store = InMemoryRecordStore::new();

    let mut nested = json!({ "id": "leaf" });
    for i in 0..5 {
        nested = json!({ "id": i.to_string(), "children": [nested] });
    }
    let payload = node(json!({ "comment": nested }));

    let err = serializer.extract(&mut store, "comment", payload).unwrap_err();
    assert!(matches!(err, EmbedError::DepthExceeded { max_depth: 3, .. }));
}
