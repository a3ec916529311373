//! Entity kinds used by unit tests

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entity::Entity;
use super::value::Value;

/// Soft-deletable kind with `created_at` / `updated_at`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Widget {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub quantity: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Widget {
    pub fn sample(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: format!("W-{}", name),
            quantity: 1,
            tags: vec!["red".to_string()],
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl Entity for Widget {
    const TABLE: &'static str = "widgets";
    const NAME: &'static str = "Widget";
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

/// Hard-deleted kind ordered by `created_date`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Ledger {
    pub id: Uuid,
    pub amount: i64,
    pub created_date: DateTime<Utc>,
}

impl Entity for Ledger {
    const TABLE: &'static str = "ledgers";
    const NAME: &'static str = "Ledger";
    const COLUMNS: &'static [&'static str] = &["id", "amount", "created_date"];
    const TIMESTAMP_COLUMNS: &'static [&'static str] = &["created_date"];

    fn id(&self) -> Uuid {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.amount.into(), self.created_date.into()]
    }
}
