//! Shared fixtures for engine tests: a small Northwind-style model.

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use trackable_core::{CollectionKey, EntityGraph, EntityKey, TrackingConfig};
use trackable_model::{EntitySchema, Relation, SchemaRegistry};

/// Customer 1-1 CustomerSetting, Order M-1 Customer, Order 1-M OrderDetail,
/// OrderDetail M-1 Product, Product M-1 Category, Employee M-M Territory,
/// Territory M-1 Area.
pub fn northwind() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(EntitySchema::new("Customer").with_relation(Relation::one_to_one("setting", "CustomerSetting")))
        .with(EntitySchema::new("CustomerSetting"))
        .with(
            EntitySchema::new("Order")
                .with_relation(Relation::many_to_one("customer", "Customer"))
                .with_relation(Relation::one_to_many("order_details", "OrderDetail")),
        )
        .with(
            EntitySchema::new("OrderDetail")
                .with_relation(Relation::many_to_one("order", "Order"))
                .with_relation(Relation::many_to_one("product", "Product")),
        )
        .with(EntitySchema::new("Product").with_relation(Relation::many_to_one("category", "Category")))
        .with(EntitySchema::new("Category"))
        .with(EntitySchema::new("Employee").with_relation(Relation::many_to_many("territories", "Territory")))
        .with(
            EntitySchema::new("Territory")
                .with_relation(Relation::many_to_many("employees", "Employee"))
                .with_relation(Relation::many_to_one("area", "Area")),
        )
        .with(EntitySchema::new("Area"))
        .with(EntitySchema::new("AuditEntry").not_equatable())
}

pub fn graph() -> EntityGraph {
    EntityGraph::new(northwind())
}

pub fn graph_with(config: TrackingConfig) -> EntityGraph {
    EntityGraph::with_config(Arc::new(northwind()), config)
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn customer(g: &mut EntityGraph, id: &str) -> EntityKey {
    g.create_entity("Customer", json!({ "customer_id": id, "company_name": format!("Company {id}") }))
        .unwrap()
}

pub fn customer_setting(g: &mut EntityGraph, setting: &str) -> EntityKey {
    g.create_entity("CustomerSetting", json!({ "setting": setting })).unwrap()
}

/// A customer with its 1-1 setting assigned.
pub fn customer_with_setting(g: &mut EntityGraph, id: &str) -> (EntityKey, EntityKey) {
    let c = customer(g, id);
    let s = customer_setting(g, "default");
    g.set_reference(c, "setting", Some(s)).unwrap();
    (c, s)
}

pub fn category(g: &mut EntityGraph, name: &str) -> EntityKey {
    g.create_entity("Category", json!({ "category_name": name })).unwrap()
}

pub fn product(g: &mut EntityGraph, id: i64, name: &str, price: f64) -> EntityKey {
    g.create_entity("Product", json!({ "product_id": id, "product_name": name, "unit_price": price }))
        .unwrap()
}

pub fn order(g: &mut EntityGraph, id: i64) -> EntityKey {
    g.create_entity("Order", json!({ "order_id": id, "order_date": "2024-01-01" }))
        .unwrap()
}

/// A detail for `product`, appended to `order`'s details with its back
/// reference set. Tracking must not be on yet unless the caller wants the
/// detail marked `Added`.
pub fn add_detail(g: &mut EntityGraph, order: EntityKey, product: EntityKey, quantity: i64) -> EntityKey {
    let price = g.entity(product).unwrap().get_number("unit_price").unwrap_or(0.0);
    let detail = g
        .create_entity("OrderDetail", json!({ "quantity": quantity, "unit_price": price }))
        .unwrap();
    g.set_reference(detail, "product", Some(product)).unwrap();
    g.set_reference(detail, "order", Some(order)).unwrap();
    let details = g.collection(order, "order_details").unwrap();
    g.push(details, detail).unwrap();
    detail
}

/// An order for a new customer with `count` details, each for its own
/// product.
pub fn order_with_details(g: &mut EntityGraph, id: i64, count: usize) -> (EntityKey, Vec<EntityKey>) {
    let o = order(g, id);
    let c = customer(g, "ALFKI");
    g.set_reference(o, "customer", Some(c)).unwrap();
    let details = (0..count)
        .map(|i| {
            let p = product(g, i as i64 + 1, &format!("Product {i}"), 10.0 * (i as f64 + 1.0));
            add_detail(g, o, p, i as i64 + 1)
        })
        .collect();
    (o, details)
}

pub fn employee(g: &mut EntityGraph, name: &str) -> EntityKey {
    g.create_entity("Employee", json!({ "last_name": name })).unwrap()
}

pub fn territory(g: &mut EntityGraph, description: &str) -> EntityKey {
    g.create_entity("Territory", json!({ "territory_description": description }))
        .unwrap()
}

/// Links an employee and a territory on both sides.
pub fn link(g: &mut EntityGraph, employee: EntityKey, territory: EntityKey) {
    let territories = g.collection(employee, "territories").unwrap();
    let employees = g.collection(territory, "employees").unwrap();
    g.push(territories, territory).unwrap();
    g.push(employees, employee).unwrap();
}

/// Root collection tracking the given entities.
pub fn track(g: &mut EntityGraph, entity_type: &str, items: &[EntityKey]) -> CollectionKey {
    g.track(entity_type, items).unwrap()
}

pub fn items(g: &EntityGraph, collection: CollectionKey) -> Vec<EntityKey> {
    g.items(collection).unwrap().to_vec()
}

pub fn details_of(g: &EntityGraph, order: EntityKey) -> Vec<EntityKey> {
    let details = g.collection(order, "order_details").unwrap();
    items(g, details)
}
