mod common;

use bson::{Document, doc};
use doclink::{memory::InMemoryDriver, prelude::*};
use std::sync::{Arc, Mutex};

use common::numbers;

/// Captures the result a completion callback receives.
fn capture<T: Clone + Send + 'static>() -> (
    Arc<Mutex<Option<DocumentStoreResult<T>>>>,
    impl FnOnce(&DocumentStoreResult<T>) + Send + 'static,
) {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    (seen, move |result: &DocumentStoreResult<T>| {
        *sink.lock().unwrap() = Some(result.clone());
    })
}

#[tokio::test]
async fn callback_in_the_options_position_gets_the_result() {
    let (_driver, _registry, numbers) = numbers().await;
    let (seen, callback) = capture::<Vec<Document>>();

    let returned = numbers
        .get(doc! { "group": "odd" }, CallArgs::callback(callback))
        .await;

    assert_eq!(returned.as_ref().unwrap().len(), 5);
    assert_eq!(seen.lock().unwrap().take(), Some(returned));
}

#[tokio::test]
async fn trailing_callback_follows_the_options() {
    let (_driver, _registry, numbers) = numbers().await;
    let (seen, callback) = capture::<Vec<Document>>();

    let returned = numbers
        .get(
            doc! {},
            CallArgs::options(QueryOptions::new().page_size(2)).with_callback(callback),
        )
        .await;

    assert_eq!(returned.as_ref().unwrap().len(), 2);
    assert_eq!(seen.lock().unwrap().take(), Some(returned));
}

#[tokio::test]
async fn errors_reach_the_callback() {
    let (_driver, _registry, numbers) = numbers().await;
    let (seen, callback) = capture::<Vec<Document>>();

    let returned = numbers
        .delete(doc! { "group": "none" }, CallArgs::callback(callback))
        .await;

    assert!(returned.as_ref().unwrap_err().is_not_found());
    assert_eq!(seen.lock().unwrap().take(), Some(returned));
}

#[tokio::test]
async fn two_callbacks_fail_before_touching_the_store() {
    let (_driver, _registry, numbers) = numbers().await;
    let (first_seen, first) = capture::<Vec<Document>>();
    let (second_seen, second) = capture::<Vec<Document>>();

    let err = numbers
        .delete(doc! {}, CallArgs::callback(first).with_callback(second))
        .await
        .unwrap_err();

    assert!(matches!(err, DocumentStoreError::InvalidOptions(_)));
    assert!(first_seen.lock().unwrap().is_none());
    assert!(second_seen.lock().unwrap().is_none());
    assert_eq!(numbers.count(doc! {}, ()).await.unwrap(), 10);
}

#[tokio::test]
async fn lifecycle_operations_complete_their_callbacks() {
    let driver = InMemoryDriver::new();
    let registry = ConnectionRegistry::new(driver.clone());

    let (opened, on_open) = capture::<()>();
    let handle = registry
        .connect("analytics", "localhost", "metrics", CallArgs::callback(on_open))
        .await
        .unwrap();
    assert_eq!(opened.lock().unwrap().take(), Some(Ok(())));

    let (closed, on_close) = capture::<()>();
    registry
        .disconnect("analytics", CallArgs::callback(on_close))
        .await
        .unwrap();
    assert_eq!(closed.lock().unwrap().take(), Some(Ok(())));
    assert!(!handle.is_connected().await);

    driver.set_reachable(false);
    let (failed, on_fail) = capture::<()>();
    let err = handle
        .open(
            "localhost",
            "metrics",
            CallArgs::options(ConnectOptions::new()).with_callback(on_fail),
        )
        .await
        .unwrap_err();
    assert_eq!(failed.lock().unwrap().take(), Some(Err(err)));
}
