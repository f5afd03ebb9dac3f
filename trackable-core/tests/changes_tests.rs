mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use trackable_core::{ChangeSet, EntityGraph, TrackingError, TrackingState};
use trackable_model::{EntitySchema, Relation, SchemaRegistry};

// ── has_changes ──────────────────────────────────────────────────

#[test]
fn has_changes_is_false_for_unchanged_graph() {
    let mut g = graph();
    let (o, _) = order_with_details(&mut g, 1, 3);
    let orders = track(&mut g, "Order", &[o]);
    assert!(!g.has_changes(o).unwrap());
    assert!(!g.has_collection_changes(orders).unwrap());
}

#[test]
fn has_changes_finds_distant_modification() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 2);
    let cat = category(&mut g, "Beverages");
    let p = g.reference(details[1], "product").unwrap().unwrap();
    g.set_reference(p, "category", Some(cat)).unwrap();
    track(&mut g, "Order", &[o]);

    g.set_value(cat, "category_name", "Drinks").unwrap();
    assert!(g.has_changes(o).unwrap());
    assert!(g.has_changes(details[1]).unwrap());
}

#[test]
fn has_changes_sees_cached_deletes() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 2);
    let orders = track(&mut g, "Order", &[o]);
    let nested = g.collection(o, "order_details").unwrap();
    g.remove(nested, details[0]).unwrap();

    assert!(g.has_changes(o).unwrap());
    assert!(g.has_collection_changes(orders).unwrap());
}

#[test]
fn has_changes_terminates_on_same_type_cycles() {
    let schemas = SchemaRegistry::new().with(EntitySchema::new("Node").with_relation(Relation::many_to_one("next", "Node")));
    let mut g = EntityGraph::new(schemas);
    let a = g.create_entity("Node", json!({ "name": "a" })).unwrap();
    let b = g.create_entity("Node", json!({ "name": "b" })).unwrap();
    let c = g.create_entity("Node", json!({ "name": "c" })).unwrap();
    g.set_reference(a, "next", Some(b)).unwrap();
    g.set_reference(b, "next", Some(c)).unwrap();
    g.set_reference(c, "next", Some(a)).unwrap();
    let nodes = g.track("Node", &[a]).unwrap();

    assert!(!g.has_changes(a).unwrap());
    g.set_value(c, "name", "z").unwrap();
    assert!(g.has_changes(a).unwrap());

    let changes = g.get_changes(nodes).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.graph().entity_count(), 3);
}

#[test]
fn unknown_keys_are_errors() {
    let mut g = graph();
    let mut other = graph();
    let o = order(&mut other, 1);
    let orders = other.new_collection("Order").unwrap();
    assert!(matches!(g.has_changes(o), Err(TrackingError::UnknownEntity(_))));
    assert!(matches!(g.get_changes(orders), Err(TrackingError::UnknownCollection(_))));
}

// ── restore_deletes / remove_restored_deletes ────────────────────

#[test]
fn restore_and_remove_restored_deletes_round_trip() {
    let mut g = graph();
    let (o1, details) = order_with_details(&mut g, 1, 2);
    let o2 = order(&mut g, 2);
    let orders = track(&mut g, "Order", &[o1, o2]);
    let nested = g.collection(o1, "order_details").unwrap();
    g.remove(nested, details[0]).unwrap();
    g.remove(orders, o2).unwrap();

    g.restore_deletes(orders).unwrap();
    assert_eq!(items(&g, orders), vec![o1, o2]);
    assert_eq!(details_of(&g, o1), vec![details[1], details[0]]);
    assert_eq!(g.tracking_state(o2).unwrap(), TrackingState::Deleted);
    assert_eq!(g.tracking_state(details[0]).unwrap(), TrackingState::Deleted);

    g.remove_restored_deletes(orders).unwrap();
    assert_eq!(items(&g, orders), vec![o1]);
    assert_eq!(details_of(&g, o1), vec![details[1]]);
    assert_eq!(g.tracking_state(o2).unwrap(), TrackingState::Deleted);
    assert_eq!(g.tracking_collection(orders).unwrap().deleted_items(), &[o2]);
    assert_eq!(g.tracking_collection(nested).unwrap().deleted_items(), &[details[0]]);
    assert!(g.is_tracking(orders).unwrap());
}

// ── accept_changes ───────────────────────────────────────────────

#[test]
fn accept_changes_resets_graph_to_unchanged() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 3);
    let orders = track(&mut g, "Order", &[o]);
    let nested = g.collection(o, "order_details").unwrap();
    g.set_value(o, "freight", 4).unwrap();
    g.set_value(details[0], "quantity", 4).unwrap();
    g.remove(nested, details[1]).unwrap();
    let p = product(&mut g, 7, "Ikura", 31.0);
    let added = add_detail(&mut g, o, p, 2);

    g.accept_changes(o).unwrap();

    for e in [o, details[0], details[2], added] {
        assert_eq!(g.tracking_state(e).unwrap(), TrackingState::Unchanged);
        assert_eq!(g.modified_properties(e).unwrap(), None);
    }
    assert!(g.tracking_collection(nested).unwrap().deleted_items().is_empty());
    assert_eq!(details_of(&g, o), vec![details[0], details[2], added]);
    assert!(!g.has_collection_changes(orders).unwrap());
}

#[test]
fn accept_collection_changes_drops_deleted_live_items() {
    let mut g = graph();
    let (o, _) = order_with_details(&mut g, 1, 2);
    let orders = track(&mut g, "Order", &[o]);
    g.remove(orders, o).unwrap();
    assert_eq!(details_of(&g, o).len(), 2);

    g.restore_deletes(orders).unwrap();
    g.accept_collection_changes(orders).unwrap();

    assert!(items(&g, orders).is_empty());
    assert!(g.tracking_collection(orders).unwrap().deleted_items().is_empty());
    assert!(!g.has_collection_changes(orders).unwrap());
}

// ── get_changes ──────────────────────────────────────────────────

#[test]
fn get_changes_of_unchanged_collection_is_empty() {
    let mut g = graph();
    let (o, _) = order_with_details(&mut g, 1, 2);
    let orders = track(&mut g, "Order", &[o]);
    let changes = g.get_changes(orders).unwrap();
    assert!(changes.is_empty());
    assert!(!changes.graph().is_tracking(changes.collection()).unwrap());
}

#[test]
fn get_changes_returns_chain_to_distant_modification() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 3);
    let cat = category(&mut g, "Seafood");
    let p = g.reference(details[2], "product").unwrap().unwrap();
    g.set_reference(p, "category", Some(cat)).unwrap();
    let orders = track(&mut g, "Order", &[o]);
    g.set_value(cat, "description", "Seaweed and fish").unwrap();

    let changes = g.get_changes(orders).unwrap();
    let cg = changes.graph();
    let o2 = changes.items()[0];
    assert_eq!(cg.tracking_state(o2).unwrap(), TrackingState::Unchanged);
    // The unchanged customer reference carries nothing and is dropped.
    assert_eq!(cg.reference(o2, "customer").unwrap(), None);

    let kept = details_of(cg, o2);
    assert_eq!(kept.len(), 1);
    let d2 = kept[0];
    assert_eq!(cg.reference(d2, "order").unwrap(), Some(o2));
    let p2 = cg.reference(d2, "product").unwrap().unwrap();
    let cat2 = cg.reference(p2, "category").unwrap().unwrap();
    assert_eq!(cg.tracking_state(cat2).unwrap(), TrackingState::Modified);
    assert_eq!(cg.entity(cat2).unwrap().get_str("description"), Some("Seaweed and fish"));
    assert_eq!(cg.entity_identifier(d2).unwrap(), g.entity_identifier(details[2]).unwrap());
    // Only the chain is copied.
    assert_eq!(cg.entity_count(), 4);
}

#[test]
fn get_changes_keeps_changed_references() {
    let mut g = graph();
    let (o, _) = order_with_details(&mut g, 1, 0);
    let c = g.reference(o, "customer").unwrap().unwrap();
    let orders = track(&mut g, "Order", &[o]);
    g.set_value(c, "company_name", "Alfreds Futterkiste").unwrap();

    let changes = g.get_changes(orders).unwrap();
    let o2 = changes.items()[0];
    let c2 = changes.graph().reference(o2, "customer").unwrap().unwrap();
    assert_eq!(changes.graph().tracking_state(c2).unwrap(), TrackingState::Modified);
}

#[test]
fn get_changes_preserves_shared_references() {
    let mut g = graph();
    let o = order(&mut g, 1);
    let chai = product(&mut g, 1, "Chai", 18.0);
    add_detail(&mut g, o, chai, 1);
    add_detail(&mut g, o, chai, 2);
    let orders = track(&mut g, "Order", &[o]);
    g.set_value(chai, "unit_price", 19.0).unwrap();

    let changes = g.get_changes(orders).unwrap();
    let cg = changes.graph();
    let kept = details_of(cg, changes.items()[0]);
    assert_eq!(kept.len(), 2);
    let p1 = cg.reference(kept[0], "product").unwrap();
    let p2 = cg.reference(kept[1], "product").unwrap();
    assert!(p1.is_some());
    assert_eq!(p1, p2);
}

#[test]
fn get_changes_is_idempotent_and_non_destructive() {
    let mut g = graph();
    let (o1, details) = order_with_details(&mut g, 1, 3);
    let o2 = order(&mut g, 2);
    let orders = track(&mut g, "Order", &[o1, o2]);
    let nested = g.collection(o1, "order_details").unwrap();
    g.set_value(details[0], "quantity", 9).unwrap();
    g.remove(nested, details[1]).unwrap();
    g.remove(orders, o2).unwrap();

    let states = |g: &EntityGraph| -> Vec<TrackingState> {
        g.entity_keys().map(|e| g.tracking_state(e).unwrap()).collect()
    };
    let before = states(&g);

    let first = g.get_changes(orders).unwrap();
    let second = g.get_changes(orders).unwrap();

    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(first.len(), 2);
    assert_eq!(states(&g), before);
    assert_eq!(items(&g, orders), vec![o1]);
    assert_eq!(details_of(&g, o1), vec![details[0], details[2]]);
    assert_eq!(g.tracking_collection(orders).unwrap().deleted_items(), &[o2]);
    assert!(g.is_tracking(orders).unwrap());
    assert!(g.is_tracking(nested).unwrap());
}

#[test]
fn change_set_is_independent_of_the_source() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 1);
    let orders = track(&mut g, "Order", &[o]);
    g.set_value(details[0], "quantity", 5).unwrap();

    let mut changes = g.get_changes(orders).unwrap();
    let d2 = details_of(changes.graph(), changes.items()[0])[0];
    changes.graph_mut().set_value(d2, "quantity", 500).unwrap();
    changes.accept_changes().unwrap();

    assert_eq!(g.entity(details[0]).unwrap().get_i64("quantity"), Some(5));
    assert_eq!(g.tracking_state(details[0]).unwrap(), TrackingState::Modified);
}

// ── Serialization ────────────────────────────────────────────────

#[test]
fn change_set_json_round_trip() {
    let mut g = graph();
    let (o, details) = order_with_details(&mut g, 1, 2);
    let orders = track(&mut g, "Order", &[o]);
    g.set_value(details[1], "quantity", 12).unwrap();
    let nested = g.collection(o, "order_details").unwrap();
    g.remove(nested, details[0]).unwrap();

    let changes = g.get_changes(orders).unwrap();
    let json = changes.to_json().unwrap();
    let parsed = ChangeSet::from_json(&json, northwind()).unwrap();

    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.to_json().unwrap(), json);
    let pg = parsed.graph();
    let kept = details_of(pg, parsed.items()[0]);
    let states: Vec<_> = kept.iter().map(|d| pg.tracking_state(*d).unwrap()).collect();
    assert_eq!(states, vec![TrackingState::Modified, TrackingState::Deleted]);
    assert_eq!(
        pg.modified_properties(kept[0]).unwrap().cloned(),
        Some(BTreeSet::from(["quantity".to_string()]))
    );
}

#[test]
fn change_set_json_is_validated() {
    let json = r#"{"graph":{"entities":[{"entity_type":"Invoice"}],"collections":[]},"collection":0}"#;
    assert!(matches!(
        ChangeSet::from_json(json, northwind()),
        Err(TrackingError::UnknownEntityType(_))
    ));

    let json = r#"{"graph":{"entities":[],"collections":[{"entity_type":"Order","items":[4]}]},"collection":0}"#;
    assert!(matches!(
        ChangeSet::from_json(json, northwind()),
        Err(TrackingError::UnknownEntity(_))
    ));

    let json = r#"{"graph":{"entities":[{"entity_type":"Customer"}],"collections":[{"entity_type":"Order","items":[0]}]},"collection":0}"#;
    assert!(matches!(
        ChangeSet::from_json(json, northwind()),
        Err(TrackingError::InvalidDocument(_))
    ));

    assert!(matches!(
        ChangeSet::from_json("not json", northwind()),
        Err(TrackingError::Serialization(_))
    ));
}

#[test]
fn change_set_json_slots_must_match_the_schema() {
    // order_details typed as Category.
    let json = r#"{"graph":{"entities":[{"entity_type":"Order","collections":{"order_details":0}}],
        "collections":[
            {"entity_type":"Category","items":[],"parent":0,"relation":{"property":"order_details","kind":"one_to_many"}},
            {"entity_type":"Order","items":[0]}]},
        "collection":1}"#;
    assert!(matches!(
        ChangeSet::from_json(json, northwind()),
        Err(TrackingError::InvalidDocument(_))
    ));

    // A nested collection nobody owns.
    let json = r#"{"graph":{"entities":[{"entity_type":"Order"}],
        "collections":[
            {"entity_type":"OrderDetail","items":[],"parent":0,"relation":{"property":"order_details","kind":"one_to_many"}},
            {"entity_type":"Order","items":[0]}]},
        "collection":1}"#;
    assert!(matches!(
        ChangeSet::from_json(json, northwind()),
        Err(TrackingError::InvalidDocument(_))
    ));

    // The well-formed version parses.
    let json = r#"{"graph":{"entities":[{"entity_type":"Order","collections":{"order_details":0}}],
        "collections":[
            {"entity_type":"OrderDetail","items":[],"parent":0,"relation":{"property":"order_details","kind":"one_to_many"}},
            {"entity_type":"Order","items":[0]}]},
        "collection":1}"#;
    assert_eq!(ChangeSet::from_json(json, northwind()).unwrap().len(), 1);
}
