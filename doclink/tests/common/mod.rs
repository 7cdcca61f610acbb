#![allow(dead_code)]

use doclink::{memory::InMemoryDriver, prelude::*};

pub fn events_schema() -> Schema {
    Schema::new().field("ts", FieldSpec::new(FieldType::Number).required())
}

pub fn numbers_schema() -> Schema {
    Schema::new()
        .field("n", FieldType::Number)
        .field("group", FieldType::String)
}

/// A fresh registry with `analytics` connected to `localhost/metrics`.
pub async fn analytics() -> (InMemoryDriver, ConnectionRegistry, ConnectionHandle) {
    let driver = InMemoryDriver::new();
    let registry = ConnectionRegistry::new(driver.clone());

    let handle = registry
        .connect("analytics", "localhost", "metrics", ())
        .await
        .unwrap();

    (driver, registry, handle)
}

/// `analytics` with an `events` collection registered.
pub async fn events() -> (InMemoryDriver, ConnectionRegistry, CollectionAccessor) {
    let (driver, registry, handle) = analytics().await;

    handle
        .register_collections([("events", events_schema())])
        .await
        .unwrap();

    let events = handle.collection("events").await.unwrap();
    (driver, registry, events)
}

/// `analytics` with a `numbers` collection holding `_id` 1..=10, `n` equal to the id
/// and `group` alternating between "odd" and "even".
pub async fn numbers() -> (InMemoryDriver, ConnectionRegistry, CollectionAccessor) {
    let (driver, registry, handle) = analytics().await;

    handle
        .register_collections([("numbers", numbers_schema())])
        .await
        .unwrap();

    let numbers = handle.collection("numbers").await.unwrap();
    for n in 1..=10 {
        let group = if n % 2 == 0 { "even" } else { "odd" };
        numbers
            .create(bson::doc! { "_id": n, "n": n, "group": group }, ())
            .await
            .unwrap();
    }

    (driver, registry, numbers)
}

pub fn ids(documents: &[bson::Document]) -> Vec<i32> {
    documents
        .iter()
        .map(|document| document.get_i32("_id").unwrap())
        .collect()
}
