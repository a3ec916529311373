//! Purchase-order workflow
//!
//! Creating an order reads every referenced product with its options in one
//! batched query, validates and prices the lines, and only then opens a
//! transaction that writes the header, writes the lines and reserves stock
//! under row locks. Any failure inside the transaction rolls all of it back.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Product, ProductOption, PurchaseOrder, PurchaseOrderItem};
use crate::error::{Error, Result};
use crate::notify::{notify_in_background, Notification, Notifier};
use crate::repository::{BatchUpdateItem, Changes, Filter, FindOptions, Page, Preload, Store};

/// Status given to new orders
pub const STATUS_DRAFT: &str = "DRAFT";

/// Role whose order listing is limited to their own orders
pub const ROLE_BUYER: &str = "buyer";

pub const DEFAULT_TIMEZONE: &str = "UTC";

pub const EVENT_ORDER_CREATED: &str = "order_created";
pub const EVENT_ORDER_UPDATED: &str = "order_updated";

/// Who is acting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: Uuid,
    pub role: String,
}

impl Requester {
    pub fn new(id: Uuid, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }

    pub fn is_buyer(&self) -> bool {
        self.role.eq_ignore_ascii_case(ROLE_BUYER)
    }
}

/// One requested line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_option_id: Uuid,
    pub quantity: i32,
    pub currency: String,
}

/// Request to place a purchase order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub items: Vec<OrderLine>,
    pub currency: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `PO-YYYYMMDDHHMMSS-NNNN` with a random four-digit suffix
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..10_000);
    format!("PO-{}-{:04}", now.format("%Y%m%d%H%M%S"), suffix)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Validate the request against the loaded products and price every line.
///
/// Nothing is written; any error here means no transaction is started.
pub fn build_order(
    request: &CreatePurchaseOrder,
    products: &[Product],
    requester: &Requester,
    now: DateTime<Utc>,
) -> Result<(PurchaseOrder, Vec<PurchaseOrderItem>)> {
    if request.items.is_empty() {
        return Err(Error::Validation("purchase order has no items".into()));
    }

    let by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let order_id = Uuid::new_v4();
    let mut total_amount = 0.0;
    let mut items = Vec::with_capacity(request.items.len());
    // Lines naming the same option draw on one stock count.
    let mut requested: HashMap<Uuid, i64> = HashMap::new();

    for line in &request.items {
        let product = by_id
            .get(&line.product_id)
            .ok_or_else(|| Error::NotFound(format!("product {}", line.product_id)))?;
        let option: &ProductOption = product.option(line.product_option_id).ok_or_else(|| {
            Error::NotFound(format!("product option {}", line.product_option_id))
        })?;

        if !option.is_available() {
            return Err(Error::Validation(format!(
                "product option {} is not available",
                option.id
            )));
        }
        if line.quantity <= 0 {
            return Err(Error::Validation(format!(
                "quantity for product option {} must be positive",
                option.id
            )));
        }
        let wanted = requested.entry(option.id).or_default();
        *wanted += i64::from(line.quantity);
        if *wanted > i64::from(option.quantity) {
            return Err(Error::Validation(format!(
                "insufficient stock for product option {}",
                option.id
            )));
        }

        let total_price = round_cents(f64::from(line.quantity) * option.price);
        if total_price <= 0.0 {
            return Err(Error::Validation("total price must be greater than zero".into()));
        }
        total_amount += total_price;

        items.push(PurchaseOrderItem {
            id: Uuid::new_v4(),
            purchase_order_id: order_id,
            product_id: product.id,
            product_option_id: option.id,
            product_name: product.name.clone(),
            product_option_name: option.name.clone(),
            unit_price: option.price,
            total_price,
            currency: line.currency.clone(),
            quantity: line.quantity,
            created_at: now,
            updated_at: now,
            created_by: requester.id,
            updated_by: requester.id,
            deleted_at: None,
        });
    }

    let order = PurchaseOrder {
        id: order_id,
        order_number: generate_order_number(now),
        status: STATUS_DRAFT.to_string(),
        order_date: now,
        total_amount: round_cents(total_amount),
        currency: request.currency.clone(),
        timezone: request
            .timezone
            .clone()
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        notes: request.notes.clone(),
        created_at: now,
        updated_at: now,
        created_by: requester.id,
        updated_by: requester.id,
        deleted_at: None,
        items: Vec::new(),
    };

    Ok((order, items))
}

/// Stock decrement per line, guarded so stock never goes negative.
///
/// Lines are ordered by option id so concurrent orders lock rows in the
/// same order.
fn reservations(items: &[PurchaseOrderItem]) -> Vec<BatchUpdateItem> {
    let mut lines: Vec<&PurchaseOrderItem> = items.iter().collect();
    lines.sort_by_key(|item| item.product_option_id);
    lines
        .into_iter()
        .map(|item| {
            BatchUpdateItem::new(
                Filter::by_id(item.product_option_id).gte("quantity", item.quantity),
                Changes::new().increment("quantity", -item.quantity),
            )
        })
        .collect()
}

/// Order placement and maintenance
#[derive(Clone)]
pub struct OrderService {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl OrderService {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Place an order, reserve stock and announce `order_created`
    pub async fn create_purchase_order(
        &self,
        requester: &Requester,
        request: &CreatePurchaseOrder,
    ) -> Result<PurchaseOrder> {
        if request.items.is_empty() {
            return Err(Error::Validation("purchase order has no items".into()));
        }
        let mut product_ids: Vec<Uuid> = request.items.iter().map(|l| l.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let products = self
            .store
            .repository::<Product>()
            .find_with_join_and_preload(
                &Filter::by_ids(&product_ids),
                &FindOptions::new(),
                &[],
                &[Preload::new("options")],
            )
            .await?;

        let (order, items) = build_order(request, &products, requester, Utc::now())?;
        let stock = reservations(&items);

        let created = self
            .store
            .transaction(|tx| async move {
                let mut created = tx.repository::<PurchaseOrder>().create(&order).await?;
                created.items = tx.repository::<PurchaseOrderItem>().create_many(&items).await?;

                let options = tx.repository::<ProductOption>();
                for reservation in &stock {
                    let reserved = options
                        .batch_update_lock(std::slice::from_ref(reservation))
                        .await?;
                    if reserved == 0 {
                        return Err(Error::Validation(
                            "insufficient stock for one or more product options".into(),
                        ));
                    }
                }
                Ok::<_, Error>(created)
            })
            .await?;

        tracing::info!(
            order_id = %created.id,
            order_number = %created.order_number,
            total_amount = created.total_amount,
            "purchase order created"
        );
        self.announce(EVENT_ORDER_CREATED, &created);
        Ok(created)
    }

    /// Change an order's status and announce `order_updated`
    pub async fn update_status(
        &self,
        requester: &Requester,
        order_id: Uuid,
        status: &str,
    ) -> Result<PurchaseOrder> {
        let status = status.trim();
        if status.is_empty() {
            return Err(Error::Validation("status must not be empty".into()));
        }

        let orders = self.store.repository::<PurchaseOrder>();
        let mut order = orders.first(order_id).await?;

        let changes = Changes::new()
            .set("status", status)
            .set("updated_by", requester.id);
        if orders.update(order_id, &changes).await? == 0 {
            return Err(Error::NotFound(format!("purchase order {}", order_id)));
        }

        order.status = status.to_string();
        order.updated_by = requester.id;
        order.updated_at = Utc::now();
        self.announce(EVENT_ORDER_UPDATED, &order);
        Ok(order)
    }

    /// Orders visible to `requester`; buyers only see what they created
    pub async fn list_orders(
        &self,
        requester: &Requester,
        options: &FindOptions,
    ) -> Result<Page<PurchaseOrder>> {
        let filter = if requester.is_buyer() {
            Filter::new().eq("created_by", requester.id)
        } else {
            Filter::new()
        };
        Ok(self
            .store
            .repository::<PurchaseOrder>()
            .paginate(&filter, options)
            .await?)
    }

    /// One order with its line items
    pub async fn order_with_items(&self, order_id: Uuid) -> Result<PurchaseOrder> {
        Ok(self
            .store
            .repository::<PurchaseOrder>()
            .first_with_preload(&[Preload::new("items").sort("created_at,id")], order_id)
            .await?)
    }

    fn announce(&self, event: &str, order: &PurchaseOrder) {
        match Notification::json(event, order) {
            Ok(notification) => notify_in_background(Arc::clone(&self.notifier), notification),
            Err(e) => tracing::warn!(event, error = %e, "notification not sent"),
        }
    }
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
