use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub reserved_stock: i32,
    pub created_at: DateTime<Utc>,
}

impl ProductView {
    /// Stock a new cart addition may still claim.
    pub fn available_stock(&self) -> i32 {
        self.stock_quantity - self.reserved_stock
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<BigDecimal>,
    pub stock_quantity: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ProductListResult {
    pub items: Vec<ProductView>,
    pub total: i64,
}
