//! Product catalogue and purchase-order records

use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::repository::{
    load_has_many, unknown_relation, Entity, MetadataCache, Preload, RepositoryResult, Value,
};

/// Catalogue entry; its sellable variants live in `options`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[sqlx(default)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub img: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub options: Vec<ProductOption>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        }
    }

    pub fn option(&self, option_id: Uuid) -> Option<&ProductOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

impl Entity for Product {
    const TABLE: &'static str = "products";
    const NAME: &'static str = "Product";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "code",
        "img",
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
            self.img.clone().into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.deleted_at.into(),
        ]
    }

    fn preload<'a>(
        conn: &'a mut PgConnection,
        parents: &'a mut [Self],
        preload: &'a Preload,
        metadata: &'a MetadataCache,
    ) -> BoxFuture<'a, RepositoryResult<()>> {
        if preload.is("options") {
            load_has_many::<Product, ProductOption>(
                conn,
                parents,
                preload,
                metadata,
                "product_id",
                |option| option.product_id,
                |product, options| product.options = options,
            )
            .boxed()
        } else {
            future::ready(Err(unknown_relation::<Self>(preload))).boxed()
        }
    }
}

/// A sellable variant of a product with its own stock and price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[sqlx(default)]
pub struct ProductOption {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub code: String,
    pub quantity: i32,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductOption {
    pub fn new(product_id: Uuid, name: impl Into<String>, quantity: i32, price: f64) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            id: Uuid::new_v4(),
            product_id,
            code: name.to_uppercase(),
            name,
            quantity,
            price,
            created_at: now,
            updated_at: now,
        }
    }

    /// In stock with a positive price
    pub fn is_available(&self) -> bool {
        self.quantity > 0 && self.price > 0.0
    }
}

impl Entity for ProductOption {
    const TABLE: &'static str = "product_options";
    const NAME: &'static str = "ProductOption";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "product_id",
        "name",
        "code",
        "quantity",
        "price",
        "created_at",
        "updated_at",
    ];
    const UUID_COLUMNS: &'static [&'static str] = &["id", "product_id"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.product_id.into(),
            self.name.clone().into(),
            self.code.clone().into(),
            self.quantity.into(),
            self.price.into(),
            self.created_at.into(),
            self.updated_at.into(),
        ]
    }
}

/// Order header; line items are loaded through the `items` relation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[sqlx(default)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub currency: String,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<PurchaseOrderItem>,
}

impl Entity for PurchaseOrder {
    const TABLE: &'static str = "purchase_orders";
    const NAME: &'static str = "PurchaseOrder";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "order_number",
        "status",
        "order_date",
        "total_amount",
        "currency",
        "timezone",
        "notes",
        "created_at",
        "updated_at",
        "created_by",
        "updated_by",
        "deleted_at",
    ];
    const UUID_COLUMNS: &'static [&'static str] = &["id", "created_by", "updated_by"];
    const TIMESTAMP_COLUMNS: &'static [&'static str] =
        &["order_date", "created_at", "updated_at", "deleted_at"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.order_number.clone().into(),
            self.status.clone().into(),
            self.order_date.into(),
            self.total_amount.into(),
            self.currency.clone().into(),
            self.timezone.clone().into(),
            self.notes.clone().into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.created_by.into(),
            self.updated_by.into(),
            self.deleted_at.into(),
        ]
    }

    fn preload<'a>(
        conn: &'a mut PgConnection,
        parents: &'a mut [Self],
        preload: &'a Preload,
        metadata: &'a MetadataCache,
    ) -> BoxFuture<'a, RepositoryResult<()>> {
        if preload.is("items") {
            load_has_many::<PurchaseOrder, PurchaseOrderItem>(
                conn,
                parents,
                preload,
                metadata,
                "purchase_order_id",
                |item| item.purchase_order_id,
                |order, items| order.items = items,
            )
            .boxed()
        } else {
            future::ready(Err(unknown_relation::<Self>(preload))).boxed()
        }
    }
}

/// One ordered option with the name and price captured at order time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[sqlx(default)]
pub struct PurchaseOrderItem {
    pub id: Uuid,
    pub purchase_order_id: Uuid,
    pub product_id: Uuid,
    pub product_option_id: Uuid,
    pub product_name: String,
    pub product_option_name: String,
    pub unit_price: f64,
    pub total_price: f64,
    pub currency: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for PurchaseOrderItem {
    const TABLE: &'static str = "purchase_order_items";
    const NAME: &'static str = "PurchaseOrderItem";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "purchase_order_id",
        "product_id",
        "product_option_id",
        "product_name",
        "product_option_name",
        "unit_price",
        "total_price",
        "currency",
        "quantity",
        "created_at",
        "updated_at",
        "created_by",
        "updated_by",
        "deleted_at",
    ];
    const UUID_COLUMNS: &'static [&'static str] = &[
        "id",
        "purchase_order_id",
        "product_id",
        "product_option_id",
        "created_by",
        "updated_by",
    ];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.purchase_order_id.into(),
            self.product_id.into(),
            self.product_option_id.into(),
            self.product_name.clone().into(),
            self.product_option_name.clone().into(),
            self.unit_price.into(),
            self.total_price.into(),
            self.currency.clone().into(),
            self.quantity.into(),
            self.created_at.into(),
            self.updated_at.into(),
            self.created_by.into(),
            self.updated_by.into(),
            self.deleted_at.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_align_with_columns() {
        let product = Product::new("Shirt", "SHIRT");
        let option = ProductOption::new(product.id, "Red", 5, 10.0);
        assert_eq!(product.values().len(), Product::COLUMNS.len());
        assert_eq!(option.values().len(), ProductOption::COLUMNS.len());
        assert_eq!(
            PurchaseOrder::default().values().len(),
            PurchaseOrder::COLUMNS.len()
        );
        assert_eq!(
            PurchaseOrderItem::default().values().len(),
            PurchaseOrderItem::COLUMNS.len()
        );
    }

    #[test]
    fn test_soft_delete_kinds() {
        let cache = MetadataCache::new();
        assert!(cache.is_soft_delete::<Product>());
        assert!(cache.is_soft_delete::<PurchaseOrder>());
        assert!(!cache.is_soft_delete::<ProductOption>());
    }

    #[test]
    fn test_option_lookup_and_availability() {
        let mut product = Product::new("Shirt", "SHIRT");
        let red = ProductOption::new(product.id, "Red", 5, 10.0);
        let free = ProductOption::new(product.id, "Free", 5, 0.0);
        product.options = vec![red.clone(), free.clone()];

        assert_eq!(product.option(red.id), Some(&red));
        assert!(product.option(Uuid::new_v4()).is_none());
        assert!(red.is_available());
        assert!(!free.is_available());
    }

    #[test]
    fn test_relations_are_not_columns() {
        let cache = MetadataCache::new();
        assert!(cache.has_attribute::<Product>("img"));
        assert!(!cache.has_attribute::<Product>("options"));
        assert!(!cache.has_attribute::<PurchaseOrder>("items"));
        assert!(cache.has_attribute::<PurchaseOrderItem>("purchase_order_id"));
    }
}
