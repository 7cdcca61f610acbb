mod common;

use bson::doc;
use doclink::prelude::*;

use common::{ids, numbers};

#[tokio::test]
async fn pages_slice_the_default_id_descending_order() {
    let (_driver, _registry, numbers) = numbers().await;

    let first = numbers
        .get(doc! {}, QueryOptions::new().page_size(3))
        .await
        .unwrap();
    assert_eq!(ids(&first), vec![10, 9, 8]);

    let second = numbers
        .get(doc! {}, QueryOptions::new().page_size(3).page(2))
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![7, 6, 5]);

    let last = numbers
        .get(doc! {}, QueryOptions::new().page_size(3).page(4))
        .await
        .unwrap();
    assert_eq!(ids(&last), vec![1]);

    let beyond = numbers
        .get(doc! {}, QueryOptions::new().page_size(3).page(5))
        .await
        .unwrap();
    assert!(beyond.is_empty());
}

#[tokio::test]
async fn pages_follow_an_explicit_sort() {
    let (_driver, _registry, numbers) = numbers().await;

    let page = numbers
        .get(
            doc! {},
            QueryOptions::new()
                .page_size(4)
                .page(2)
                .sort(doc! { "n": 1 }),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![5, 6, 7, 8]);

    let ascending = numbers
        .get(doc! { "group": "odd" }, QueryOptions::new().sort(SortDirection::Asc))
        .await
        .unwrap();
    assert_eq!(ids(&ascending), vec![1, 3, 5, 7, 9]);
}

#[tokio::test]
async fn repeated_page_reads_are_stable() {
    let (_driver, _registry, numbers) = numbers().await;
    let options = QueryOptions::new().page_size(4).page(2);

    let first = numbers.get(doc! {}, options.clone()).await.unwrap();
    let second = numbers.get(doc! {}, options).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn last_id_returns_the_next_greater_ids_capped_at_the_page_size() {
    let (_driver, _registry, numbers) = numbers().await;

    let after = numbers
        .get(doc! {}, QueryOptions::new().page_size(3).last_id(4))
        .await
        .unwrap();
    assert_eq!(ids(&after), vec![5, 6, 7]);

    let ignoring_page = numbers
        .get(doc! {}, QueryOptions::new().page_size(3).page(3).last_id(4))
        .await
        .unwrap();
    assert_eq!(ids(&ignoring_page), vec![5, 6, 7]);

    let even = numbers
        .get(
            doc! { "group": "even" },
            QueryOptions::new().page_size(2).last_id(4),
        )
        .await
        .unwrap();
    assert_eq!(ids(&even), vec![6, 8]);
}

#[tokio::test]
async fn last_id_pages_visit_every_document_once() {
    let (_driver, _registry, numbers) = numbers().await;

    let mut seen = Vec::new();
    let mut last_id = 0;
    loop {
        let page = numbers
            .get(doc! {}, QueryOptions::new().page_size(3).last_id(last_id))
            .await
            .unwrap();
        if page.is_empty() {
            break;
        }

        seen.extend(ids(&page));
        last_id = *seen.last().unwrap();
    }

    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn last_id_combines_with_an_id_filter() {
    let (_driver, _registry, numbers) = numbers().await;

    let page = numbers
        .get(
            doc! { "_id": { "$lt": 8 } },
            QueryOptions::new().page_size(10).last_id(5),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![6, 7]);
}

#[tokio::test]
async fn non_positive_paging_is_invalid() {
    let (_driver, _registry, numbers) = numbers().await;

    for options in [
        QueryOptions::new().page_size(0),
        QueryOptions::new().page_size(-3),
        QueryOptions::new().page_size(3).page(0),
    ] {
        let err = numbers.get(doc! {}, options).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidOptions(_)));
    }
}

#[tokio::test]
async fn get_page_reports_navigation() {
    let (_driver, _registry, numbers) = numbers().await;

    let page = numbers
        .get_page(doc! {}, QueryOptions::new().page_size(4).page(2))
        .await
        .unwrap();

    assert_eq!(ids(&page.items), vec![6, 5, 4, 3]);
    assert_eq!(page.count, 10);
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));

    let odd = numbers
        .get_page(doc! { "group": "odd" }, QueryOptions::new().page_size(5))
        .await
        .unwrap();
    assert_eq!(odd.count, 5);
    assert_eq!(odd.next_page, None);
    assert_eq!(odd.previous_page, None);
}

#[tokio::test]
async fn get_page_requires_a_page_size() {
    let (_driver, _registry, numbers) = numbers().await;

    let err = numbers
        .get_page(doc! {}, QueryOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidOptions(_)));
}
