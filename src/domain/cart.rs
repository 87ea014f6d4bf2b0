use bigdecimal::BigDecimal;
use uuid::Uuid;

/// One cart line, joined with the product it reserves stock against.
#[derive(Debug, Clone)]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: BigDecimal,
    pub quantity: i32,
    pub available_stock: i32,
    pub item_total: BigDecimal,
    pub in_stock: bool,
}

#[derive(Debug, Clone)]
pub struct CartSummary {
    pub items: Vec<CartItemView>,
    pub total_price: BigDecimal,
    pub items_count: usize,
    pub can_checkout: bool,
}

impl CartSummary {
    pub fn empty() -> Self {
        CartSummary {
            items: Vec::new(),
            total_price: BigDecimal::from(0),
            items_count: 0,
            can_checkout: false,
        }
    }
}
