//! Products and purchase orders
//!
//! Entity kinds for the catalogue (`Product` with its `options` relation)
//! and for orders (`PurchaseOrder` with its `items` relation), plus the
//! [`OrderService`] workflow built on the repository layer.

mod models;
mod workflow;

pub use models::{Product, ProductOption, PurchaseOrder, PurchaseOrderItem};
pub use workflow::{
    build_order, generate_order_number, CreatePurchaseOrder, OrderLine, OrderService, Requester,
    DEFAULT_TIMEZONE, EVENT_ORDER_CREATED, EVENT_ORDER_UPDATED, ROLE_BUYER, STATUS_DRAFT,
};
