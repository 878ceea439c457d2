mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use forge_orm::prelude::*;
use forge_orm::storage::{
    DeleteStatement, InsertStatement, SelectStatement, StorageTransaction, UpdateStatement,
};
use forge_orm::{MemoryStorage, PageOptions, Row, Storage, TransactionConfig};
use serde_json::{json, Value};

use common::fixture;

/// Memory storage that counts every statement it receives
#[derive(Default)]
struct CountingStorage {
    inner: MemoryStorage,
    statements: AtomicUsize,
}

impl CountingStorage {
    fn seen(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.statements.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
        self.tick();
        self.inner.select(statement).await
    }

    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
        self.tick();
        self.inner.insert(statement).await
    }

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64> {
        self.tick();
        self.inner.update(statement).await
    }

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64> {
        self.tick();
        self.inner.delete(statement).await
    }

    async fn begin(&self, config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>> {
        self.inner.begin(config).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

async fn seed_cards(db: &Database) -> Vec<i64> {
    let cards = db.model("GiftCard").unwrap();
    let mut ids = Vec::new();
    for (code, balance, status) in [
        ("GC-1", 10.0, "active"),
        ("GC-2", 25.0, "active"),
        ("GC-3", 50.0, "active"),
        ("GC-4", 75.0, "expired"),
        ("GC-5", 100.0, "active"),
        ("GC-6", 5.0, "active"),
    ] {
        let card = cards
            .create(json!({ "code": code, "balance": balance, "status": status }))
            .await
            .unwrap();
        ids.push(card.id().unwrap());
    }
    ids
}

fn codes(instances: &[ModelInstance]) -> Vec<String> {
    instances
        .iter()
        .map(|i| i.get("code").and_then(Value::as_str).unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_paginate_filtered_gift_cards() {
    let fx = fixture();
    let ids = seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let page = cards
        .query()
        .where_eq("status", "active")
        .paginate(PageOptions::new(2, 1))
        .await
        .unwrap();
    assert_eq!(codes(&page.data), vec!["GC-1", "GC-2"]);
    assert_eq!(page.paging.total_records, 5);
    assert_eq!(page.paging.total_pages, 3);
    assert_eq!(page.paging.page, 1);
    assert_eq!(page.next_cursor, Some(ids[2]));

    let last = cards
        .query()
        .where_eq("status", "active")
        .paginate(PageOptions::new(2, 3))
        .await
        .unwrap();
    assert_eq!(codes(&last.data), vec!["GC-6"]);
    assert_eq!(last.next_cursor, None);
}

#[tokio::test]
async fn test_pages_concatenate_to_full_result() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let mut collected = Vec::new();
    for page in 1..=3 {
        let result = cards.paginate(PageOptions::new(2, page)).await.unwrap();
        collected.extend(codes(&result.data));
    }
    let everything = codes(&cards.query().order_by_asc("id").get().await.unwrap());
    assert_eq!(collected, everything);
    assert_eq!(collected.len(), 6);

    let default_page = cards.paginate(PageOptions::default()).await.unwrap();
    assert_eq!(default_page.data.len(), 6);
    assert_eq!(default_page.paging.total_pages, 1);

    assert!(matches!(
        cards.paginate(PageOptions::new(0, 1)).await,
        Err(ModelError::InvalidQueryCondition(_))
    ));
    assert!(matches!(
        cards.paginate(PageOptions::new(2, 0)).await,
        Err(ModelError::InvalidQueryCondition(_))
    ));
}

#[tokio::test]
async fn test_comparison_filters() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let between = cards
        .query()
        .where_between("balance", vec![20, 80])
        .unwrap()
        .order_by_asc("balance")
        .get()
        .await
        .unwrap();
    assert_eq!(codes(&between), vec!["GC-2", "GC-3", "GC-4"]);
    assert!(matches!(
        cards.query().where_between("balance", vec![1]),
        Err(ModelError::InvalidQueryCondition(_))
    ));

    let big = cards.query().where_gte("balance", 75).count().await.unwrap();
    assert_eq!(big, 2);

    let listed = cards
        .query()
        .where_in("code", vec!["GC-1", "GC-6", "GC-9"])
        .count()
        .await
        .unwrap();
    assert_eq!(listed, 2);

    let either = cards
        .query()
        .where_eq("status", "expired")
        .or_where_op("balance", QueryOperator::LessThan, 6)
        .count()
        .await
        .unwrap();
    assert_eq!(either, 2);

    let like = cards.query().where_like("code", "GC-%").count().await.unwrap();
    assert_eq!(like, 6);

    assert!(matches!(
        cards.query().where_attribute("colour", "red"),
        Err(ModelError::InvalidQueryCondition(_))
    ));
}

#[tokio::test]
async fn test_or_conditions_keep_soft_delete_scope() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let expired = cards.query().where_eq("status", "expired").first_or_fail().await.unwrap();
    cards.remove(expired.id().unwrap()).await.unwrap();

    let matched = cards
        .query()
        .where_eq("status", "expired")
        .or_where_op("code", QueryOperator::Equal, "GC-1")
        .get()
        .await
        .unwrap();
    assert_eq!(codes(&matched), vec!["GC-1"]);
}

#[tokio::test]
async fn test_aggregates() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    assert_eq!(cards.query().max("balance").await.unwrap(), 100.0);
    assert_eq!(cards.query().min("balance").await.unwrap(), 5.0);
    assert_eq!(cards.query().sum("balance").await.unwrap(), 265.0);
    assert_eq!(
        cards.query().where_eq("status", "expired").avg("balance").await.unwrap(),
        75.0
    );
    assert_eq!(
        cards.query().where_eq("status", "void").sum("balance").await.unwrap(),
        0.0
    );
    assert!(cards.query().where_eq("code", "GC-3").exists().await.unwrap());
    assert_eq!(cards.query().group_by(&["status"]).count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_ordering_terminals() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let last = cards.last().await.unwrap().unwrap();
    assert_eq!(last.get("code"), Some(&json!("GC-6")));

    let richest = cards
        .query()
        .order_by_desc("balance")
        .first()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(richest.get("code"), Some(&json!("GC-5")));

    let cheapest = cards.oldest(Some("balance")).await.unwrap().unwrap();
    assert_eq!(cheapest.get("code"), Some(&json!("GC-6")));

    let window = cards.query().order_by_asc("id").skip(1).take(2).get().await.unwrap();
    assert_eq!(codes(&window), vec!["GC-2", "GC-3"]);

    let plucked = cards
        .query()
        .where_lt("balance", 20)
        .order_by_asc("balance")
        .pluck("code")
        .await
        .unwrap();
    assert_eq!(plucked, vec![json!("GC-6"), json!("GC-1")]);

    let shuffled = cards.query().in_random_order().get().await.unwrap();
    assert_eq!(shuffled.len(), 6);
}

#[tokio::test]
async fn test_chunk_visits_every_row_once() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();

    let mut batches = Vec::new();
    cards
        .query()
        .chunk(4, |batch| {
            batches.push(codes(&batch));
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 4);
    assert_eq!(batches[1], vec!["GC-5", "GC-6"]);

    assert!(matches!(
        cards.query().chunk(0, |_| Ok(())).await,
        Err(ModelError::InvalidQueryCondition(_))
    ));
}

#[tokio::test]
async fn test_bulk_update_and_delete() {
    let fx = fixture();
    seed_cards(&fx.db).await;
    let cards = fx.db.model("GiftCard").unwrap();
    fx.events.clear();

    let updated = cards
        .query()
        .where_lt("balance", 30)
        .update(json!({ "status": "low" }))
        .await
        .unwrap();
    assert_eq!(updated, 3);
    assert_eq!(cards.query().where_eq("status", "low").count().await.unwrap(), 3);

    let deleted = cards.query().where_eq("status", "low").delete().await.unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(cards.count().await.unwrap(), 3);
    assert_eq!(fx.storage.table_len("gift_cards").await, 6);
    assert!(fx.events.names().is_empty());
}

#[tokio::test]
async fn test_join_filters_on_related_table() {
    let fx = fixture();
    let customers = fx.db.model("Customer").unwrap();
    let orders = fx.db.model("Order").unwrap();
    let ada = customers.create(json!({ "name": "Ada" })).await.unwrap();
    let bob = customers.create(json!({ "name": "Bob" })).await.unwrap();
    orders.create(json!({ "total": 10, "customer_id": ada.id() })).await.unwrap();
    orders.create(json!({ "total": 20, "customer_id": ada.id() })).await.unwrap();
    orders.create(json!({ "total": 30, "customer_id": bob.id() })).await.unwrap();

    let ada_orders = orders
        .query()
        .join("customers", "customers.id", "=", "orders.customer_id")
        .unwrap()
        .where_eq("customers.name", "Ada")
        .get()
        .await
        .unwrap();
    assert_eq!(ada_orders.len(), 2);
    assert!(ada_orders.iter().all(|o| o.get("customer_id") == Some(&json!(ada.id()))));

    assert!(matches!(
        orders.query().join("customers", "customers.id", ">", "orders.customer_id"),
        Err(ModelError::InvalidQueryCondition(_))
    ));
}

#[tokio::test]
async fn test_malformed_between_never_reaches_storage() {
    let storage = Arc::new(CountingStorage::default());
    let db = Database::new(storage.clone(), common::registry());
    let cards = db.model("GiftCard").unwrap();

    for bounds in [vec![10.0], vec![10.0, 20.0, 30.0]] {
        assert!(matches!(
            cards.query().where_between("balance", bounds),
            Err(ModelError::InvalidQueryCondition(_))
        ));
    }
    assert_eq!(storage.seen(), 0);

    let matched = cards
        .query()
        .where_between("balance", vec![10.0, 20.0])
        .unwrap()
        .count()
        .await
        .unwrap();
    assert_eq!(matched, 0);
    assert!(storage.seen() > 0);
}
