//! Integration tests against a live PostgreSQL.
//!
//! Skipped unless `TEST_DATABASE_URL` or `DATABASE_URL` is set. Every test
//! creates its own schema and points the pool's `search_path` at it.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use uuid::Uuid;

use wao_store::notify::{BroadcastNotifier, Notifier};
use wao_store::orders::{
    CreatePurchaseOrder, OrderLine, OrderService, Product, ProductOption, PurchaseOrder,
    PurchaseOrderItem, Requester,
};
use wao_store::prelude::*;
use wao_store::repository::RepositoryOperation;

const SCHEMA: &str = r#"
CREATE TABLE gadgets (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    quantity INTEGER NOT NULL DEFAULT 0,
    tags TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
);

CREATE TABLE products (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    img TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
);

CREATE TABLE product_options (
    id UUID PRIMARY KEY,
    product_id UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    code TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 0,
    price DOUBLE PRECISION NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE purchase_orders (
    id UUID PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL,
    order_date TIMESTAMPTZ NOT NULL,
    total_amount DOUBLE PRECISION NOT NULL,
    currency TEXT NOT NULL,
    timezone TEXT NOT NULL,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    created_by UUID NOT NULL,
    updated_by UUID NOT NULL,
    deleted_at TIMESTAMPTZ
);

CREATE TABLE purchase_order_items (
    id UUID PRIMARY KEY,
    purchase_order_id UUID NOT NULL REFERENCES purchase_orders (id),
    product_id UUID NOT NULL,
    product_option_id UUID NOT NULL,
    product_name TEXT NOT NULL,
    product_option_name TEXT NOT NULL,
    unit_price DOUBLE PRECISION NOT NULL,
    total_price DOUBLE PRECISION NOT NULL,
    currency TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    created_by UUID NOT NULL,
    updated_by UUID NOT NULL,
    deleted_at TIMESTAMPTZ
);
"#;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct Gadget {
    id: Uuid,
    name: String,
    code: String,
    quantity: i32,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Gadget {
    fn new(name: &str, quantity: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: format!("G-{}", name),
            quantity,
            tags: vec!["blue".to_string()],
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Entity for Gadget {
    const TABLE: &'static str = "gadgets";
    const NAME: &'static str = "Gadget";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "code",
        "quantity",
        "tags",
        "created_at",
        "updated_at",
        "deleted_at",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.code.clone().into(),
            self.quantity.into(),
            self.tags.clone().into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.deleted_at.into(),
        ]
    }
}

struct TestDb {
    admin: PgPool,
    schema: String,
    store: Store,
}

impl TestDb {
    async fn teardown(self) {
        self.store.pool().close().await;
        let _ = sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await;
    }
}

async fn maybe_db(test: &str) -> Option<TestDb> {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok();
    let Some(database_url) = database_url else {
        eprintln!("Skipping {test}: TEST_DATABASE_URL/DATABASE_URL is not set.");
        return None;
    };

    let Ok(admin) = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    else {
        eprintln!("Skipping {test}: database is unreachable.");
        return None;
    };

    let schema = format!("wao_test_{}", Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .expect("schema should be created");

    let options = PgConnectOptions::from_str(&database_url)
        .expect("url should parse")
        .options([("search_path", schema.as_str())]);
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .expect("pool should connect");

    sqlx::raw_sql(SCHEMA)
        .execute(&pool)
        .await
        .expect("tables should be created");

    let store = Store::new(pool).with_metadata(Arc::new(MetadataCache::new()));
    Some(TestDb {
        admin,
        schema,
        store,
    })
}

async fn seed_catalogue(store: &Store, quantity: i32, price: f64) -> (Product, ProductOption) {
    let product = store
        .repository::<Product>()
        .create(&Product::new("Shirt", format!("SHIRT-{}", Uuid::new_v4().simple())))
        .await
        .expect("product should be created");
    let option = store
        .repository::<ProductOption>()
        .create(&ProductOption::new(product.id, "Red", quantity, price))
        .await
        .expect("option should be created");
    (product, option)
}

fn order_for(product: &Product, option: &ProductOption, quantity: i32) -> CreatePurchaseOrder {
    CreatePurchaseOrder {
        items: vec![OrderLine {
            product_id: product.id,
            product_option_id: option.id,
            quantity,
            currency: "USD".to_string(),
        }],
        currency: "USD".to_string(),
        timezone: None,
        notes: Some("integration".to_string()),
    }
}

#[tokio::test]
async fn crud_and_soft_delete() {
    let Some(db) = maybe_db("crud_and_soft_delete").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();

    let created = repo.create(&Gadget::new("lamp", 3)).await.unwrap();
    assert_eq!(created.tags, vec!["blue".to_string()]);

    let found = repo.find_by_id(created.id, &[]).await.unwrap().unwrap();
    assert_eq!(found.name, "lamp");

    let changed = repo
        .update(created.id, &Changes::new().set("name", "desk lamp").increment("quantity", 2))
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let updated = repo.first(created.id).await.unwrap();
    assert_eq!(updated.name, "desk lamp");
    assert_eq!(updated.quantity, 5);

    assert_eq!(repo.delete(created.id).await.unwrap(), 1);
    assert!(repo.find_by_id(created.id, &[]).await.unwrap().is_none());
    assert_eq!(repo.count(&Filter::new()).await.unwrap(), 0);

    let err = repo.first(created.id).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.operation, RepositoryOperation::First);

    // Naming deleted_at lifts the soft-delete scope.
    let deleted = repo
        .find(&Filter::new().is_not_null("deleted_at"), &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert!(deleted[0].deleted_at.is_some());

    // Already deleted rows are not deleted again.
    assert_eq!(repo.delete(created.id).await.unwrap(), 0);

    db.teardown().await;
}

async fn names_where(repo: &Repository<Gadget>, condition: serde_json::Value) -> Vec<String> {
    let filter = ConditionSpec::from_json(condition)
        .unwrap()
        .compile()
        .unwrap();
    let mut names: Vec<String> = repo
        .find(&filter, &FindOptions::new())
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn condition_language_with_or_groups() {
    let Some(db) = maybe_db("condition_language_with_or_groups").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();
    let mut gadgets = Vec::new();
    for (name, quantity) in [("alpha", 1), ("beta", 5), ("gamma", 10), ("delta", 0)] {
        gadgets.push(Gadget::new(name, quantity));
    }
    repo.create_many(&gadgets).await.unwrap();

    let names = names_where(
        &repo,
        json!({
            "quantity GREATER_THAN": 0,
            "OR": [{"name LIKE": "ALP"}, {"quantity GREATER_THAN_OR_EQUAL": 10}],
        }),
    )
    .await;
    assert_eq!(names, vec!["alpha", "gamma"]);

    let names = names_where(
        &repo,
        json!({
            "quantity BETWEEN_AND": [1, 5],
            "tags @>": ["blue"],
            "code NOT IN": ["G-beta"],
        }),
    )
    .await;
    assert_eq!(names, vec!["alpha"]);

    // one family per check
    assert_eq!(
        names_where(&repo, json!({"quantity LESS_THAN": 5})).await,
        vec!["alpha", "delta"]
    );
    assert_eq!(
        names_where(&repo, json!({"quantity LESS_THAN_OR_EQUAL": 5})).await,
        vec!["alpha", "beta", "delta"]
    );
    assert_eq!(
        names_where(&repo, json!({"code EQUAL": "G-gamma"})).await,
        vec!["gamma"]
    );
    assert_eq!(
        names_where(&repo, json!({"name NOT_EQUAL": "beta"})).await,
        vec!["alpha", "delta", "gamma"]
    );
    assert_eq!(
        names_where(&repo, json!({"name NOT_LIKE": "ET"})).await,
        vec!["alpha", "delta", "gamma"]
    );
    assert_eq!(
        names_where(&repo, json!({"code IN": ["G-beta", "G-delta"]})).await,
        vec!["beta", "delta"]
    );

    // Empty IN matches nothing rather than failing.
    let none = repo
        .find(&Filter::new().is_in("code", Vec::<String>::new()), &FindOptions::new())
        .await
        .unwrap();
    assert!(none.is_empty());

    // Unknown attributes are dropped, not fatal.
    let all = repo
        .find(&Filter::new().eq("colour", "red"), &FindOptions::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    // Naming deleted_at lifts the soft-delete scope.
    repo.delete(gadgets[3].id).await.unwrap();
    assert_eq!(
        names_where(&repo, json!({"deleted_at IS NOT NULL": true})).await,
        vec!["delta"]
    );
    assert_eq!(names_where(&repo, json!({})).await, vec!["alpha", "beta", "gamma"]);

    db.teardown().await;
}

#[tokio::test]
async fn text_values_bind_to_the_column_type() {
    let Some(db) = maybe_db("text_values_bind_to_the_column_type").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();
    let id_like = Uuid::new_v4().to_string();
    let odd = Gadget::new(&id_like, 3);
    let plain = Gadget::new("plain", 3);
    repo.create_many(&[odd.clone(), plain.clone()]).await.unwrap();

    // UUID-shaped text against text columns stays text.
    assert_eq!(names_where(&repo, json!({"name": id_like.clone()})).await, vec![id_like.clone()]);
    assert_eq!(
        names_where(&repo, json!({"name LIKE": id_like[..8].to_uppercase()})).await,
        vec![id_like.clone()]
    );

    // Text against uuid and timestamptz columns is parsed.
    assert_eq!(
        names_where(&repo, json!({"id IN": [plain.id.to_string()]})).await,
        vec!["plain"]
    );
    let before = (plain.created_at - chrono::Duration::hours(1)).to_rfc3339();
    assert_eq!(
        names_where(&repo, json!({"created_at GREATER_THAN": before})).await.len(),
        2
    );

    let err = repo
        .find(&Filter::new().eq("id", "not-a-uuid"), &FindOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::CompilerFault);

    db.teardown().await;
}

#[tokio::test]
async fn pagination_covers_every_row_once() {
    let Some(db) = maybe_db("pagination_covers_every_row_once").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();
    let gadgets: Vec<Gadget> = (0..10).map(|i| Gadget::new(&format!("g{:02}", i), i)).collect();
    repo.create_in_batches(&gadgets, 3).await.unwrap();

    let mut seen = Vec::new();
    for page in 1..=4 {
        let result = repo
            .paginate(
                &Filter::new(),
                &FindOptions::new()
                    .sort("-quantity,bogus_column")
                    .paginate(Pagination::page(page, 3)),
            )
            .await
            .unwrap();
        assert_eq!(result.total, 10);
        assert_eq!(result.total_pages, 4);
        assert_eq!(result.page, page);
        seen.extend(result.items.into_iter().map(|g| g.quantity));
    }
    assert_eq!(seen, (0..10).rev().collect::<Vec<_>>());

    // Without a sort the newest rows come first.
    let newest = repo
        .paginate(&Filter::new(), &FindOptions::new().paginate(Pagination::page(1, 10)))
        .await
        .unwrap();
    assert_eq!(newest.items.len(), 10);

    db.teardown().await;
}

#[tokio::test]
async fn failed_transaction_leaves_nothing_behind() {
    let Some(db) = maybe_db("failed_transaction_leaves_nothing_behind").await else {
        return;
    };

    let first = Gadget::new("one", 1);
    let mut clash = Gadget::new("two", 2);
    clash.code = first.code.clone();

    let result = db
        .store
        .transaction(|tx| async move {
            let repo = tx.repository::<Gadget>();
            repo.create(&first).await?;
            repo.create(&clash).await?;
            Ok::<_, RepositoryError>(())
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::DuplicateKey);
    assert_eq!(err.operation, RepositoryOperation::Create);

    let repo = db.store.repository::<Gadget>();
    assert_eq!(repo.count(&Filter::new()).await.unwrap(), 0);

    // A multi-chunk insert is atomic on its own.
    let mut batch: Vec<Gadget> = (0..5).map(|i| Gadget::new(&format!("b{}", i), i)).collect();
    batch[4].code = batch[0].code.clone();
    assert!(repo.create_in_batches(&batch, 2).await.is_err());
    assert_eq!(repo.count(&Filter::new()).await.unwrap(), 0);

    db.teardown().await;
}

#[tokio::test]
async fn locked_batch_updates_do_not_lose_writes() {
    let Some(db) = maybe_db("locked_batch_updates_do_not_lose_writes").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();
    let gadget = repo.create(&Gadget::new("stock", 100)).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let repo = repo.clone();
        let id = gadget.id;
        tasks.push(tokio::spawn(async move {
            let item = BatchUpdateItem::new(
                Filter::by_id(id).gte("quantity", 1),
                Changes::new().increment("quantity", -1),
            );
            repo.batch_update_lock(&[item]).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    let after = repo.first(gadget.id).await.unwrap();
    assert_eq!(after.quantity, 80);

    db.teardown().await;
}

#[tokio::test]
async fn purchase_order_scenario() {
    let Some(db) = maybe_db("purchase_order_scenario").await else {
        return;
    };
    let notifier = Arc::new(BroadcastNotifier::default());
    let mut events = notifier.subscribe();
    let service = OrderService::new(db.store.clone(), notifier.clone() as Arc<dyn Notifier>);
    let buyer = Requester::new(Uuid::new_v4(), "buyer");

    let (product, option) = seed_catalogue(&db.store, 5, 10.0).await;
    let order = service
        .create_purchase_order(&buyer, &order_for(&product, &option, 3))
        .await
        .unwrap();
    assert_eq!(order.total_amount, 30.0);
    assert_eq!(order.status, "DRAFT");
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].total_price, 30.0);

    let stock = db
        .store
        .repository::<ProductOption>()
        .first(option.id)
        .await
        .unwrap();
    assert_eq!(stock.quantity, 2);

    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "order_created");
    assert_eq!(event.data["total_amount"], 30.0);

    let loaded = service.order_with_items(order.id).await.unwrap();
    assert_eq!(loaded.items.len(), 1);
    assert_eq!(loaded.items[0].product_option_id, option.id);

    let updated = service.update_status(&buyer, order.id, "APPROVED").await.unwrap();
    assert_eq!(updated.status, "APPROVED");
    let event = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, "order_updated");

    // Someone else's buyer view is empty; an admin sees the order.
    let stranger = Requester::new(Uuid::new_v4(), "buyer");
    assert_eq!(service.list_orders(&stranger, &FindOptions::new()).await.unwrap().total, 0);
    let admin = Requester::new(Uuid::new_v4(), "admin");
    assert_eq!(service.list_orders(&admin, &FindOptions::new()).await.unwrap().total, 1);

    // Zero price is rejected before anything is written.
    let (free_product, free_option) = seed_catalogue(&db.store, 5, 0.0).await;
    let err = service
        .create_purchase_order(&buyer, &order_for(&free_product, &free_option, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(
        db.store
            .repository::<PurchaseOrder>()
            .count(&Filter::new())
            .await
            .unwrap(),
        1
    );

    let missing = service.update_status(&buyer, Uuid::new_v4(), "APPROVED").await.unwrap_err();
    assert_eq!(missing.repository_kind(), Some(RepositoryErrorKind::NotFound));

    db.teardown().await;
}

#[tokio::test]
async fn competing_orders_never_oversell() {
    let Some(db) = maybe_db("competing_orders_never_oversell").await else {
        return;
    };
    let service = OrderService::new(db.store.clone(), Arc::new(NoopNotifier));
    let (product, option) = seed_catalogue(&db.store, 3, 10.0).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let service = service.clone();
        let request = order_for(&product, &option, 2);
        tasks.push(tokio::spawn(async move {
            let buyer = Requester::new(Uuid::new_v4(), "buyer");
            service.create_purchase_order(&buyer, &request).await
        }));
    }

    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(Error::Validation(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(placed, 1);

    let stock = db
        .store
        .repository::<ProductOption>()
        .first(option.id)
        .await
        .unwrap();
    assert_eq!(stock.quantity, 1);
    assert_eq!(
        db.store
            .repository::<PurchaseOrderItem>()
            .count(&Filter::new())
            .await
            .unwrap(),
        1
    );

    db.teardown().await;
}

#[tokio::test]
async fn preload_filters_children_only() {
    let Some(db) = maybe_db("preload_filters_children_only").await else {
        return;
    };
    let (product, _) = seed_catalogue(&db.store, 5, 10.0).await;
    db.store
        .repository::<ProductOption>()
        .create(&ProductOption::new(product.id, "Empty", 0, 10.0))
        .await
        .unwrap();

    let products = db.store.repository::<Product>();

    // Projection always carries the id; unselected attributes default.
    let projected = products
        .find(&Filter::by_id(product.id), &FindOptions::new().fields(["name"]))
        .await
        .unwrap();
    assert_eq!(projected[0].id, product.id);
    assert_eq!(projected[0].name, "Shirt");
    assert!(projected[0].code.is_empty());
    let all = products
        .first_with_preload(&[Preload::new("options").sort("name")], product.id)
        .await
        .unwrap();
    assert_eq!(all.options.len(), 2);
    assert_eq!(all.options[0].name, "Empty");

    let in_stock = products
        .find_with_join_and_preload(
            &Filter::by_id(product.id),
            &FindOptions::new(),
            &[],
            &[Preload::new("options").filter(Filter::new().gt("quantity", 0))],
        )
        .await
        .unwrap();
    assert_eq!(in_stock.len(), 1);
    assert_eq!(in_stock[0].options.len(), 1);
    assert_eq!(in_stock[0].options[0].name, "Red");

    let err = products
        .first_with_preload(&[Preload::new("suppliers")], product.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, RepositoryErrorKind::CompilerFault);
    assert_eq!(err.operation, RepositoryOperation::Preload);

    db.teardown().await;
}

#[tokio::test]
async fn upsert_and_bulk_operations() {
    let Some(db) = maybe_db("upsert_and_bulk_operations").await else {
        return;
    };
    let repo = db.store.repository::<Gadget>();
    let mut gadgets: Vec<Gadget> = (0..4).map(|i| Gadget::new(&format!("u{}", i), i)).collect();
    repo.create_many(&gadgets).await.unwrap();

    gadgets[0].quantity = 42;
    let upserted = repo.upsert(&gadgets[..1]).await.unwrap();
    assert_eq!(upserted[0].quantity, 42);

    let ids: Vec<Uuid> = gadgets.iter().map(|g| g.id).collect();
    assert_eq!(repo.find_by_ids(&ids, &[]).await.unwrap().len(), 4);

    let affected = repo
        .batch_update(&[
            BatchUpdateItem::new(Filter::by_id(ids[1]), Changes::new().set("name", "renamed")),
            BatchUpdateItem::new(Filter::by_id(ids[2]), Changes::new().increment("quantity", 5)),
        ])
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let refused = repo
        .delete_where(&Filter::new().eq("colour", "red"))
        .await
        .unwrap_err();
    assert_eq!(refused.kind, RepositoryErrorKind::CompilerFault);

    assert_eq!(repo.bulk_delete(&ids[..2]).await.unwrap(), 2);
    assert_eq!(repo.count(&Filter::new()).await.unwrap(), 2);

    db.teardown().await;
}
