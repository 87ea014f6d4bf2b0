use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Order lifecycle: PENDING → SHIPPED → DELIVERED, with cancellation allowed
/// from PENDING or SHIPPED. DELIVERED and CANCELED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "SHIPPED" => Some(OrderStatus::Shipped),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELED" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Shipped) | (Shipped, Delivered) | (Pending, Canceled) | (Shipped, Canceled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Price frozen at checkout time; later catalog price changes never
    /// touch it.
    pub price_at_purchase: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub total_price: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone)]
pub struct OrderListResult {
    pub items: Vec<OrderView>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::OrderStatus::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(Pending.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
    }

    #[test]
    fn cancellation_allowed_before_delivery() {
        assert!(Pending.can_transition_to(Canceled));
        assert!(Shipped.can_transition_to(Canceled));
        assert!(!Delivered.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Canceled));
    }

    #[test]
    fn no_backwards_or_skipping_transitions() {
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Canceled.can_transition_to(Pending));
    }

    #[test]
    fn parse_roundtrip() {
        for status in [Pending, Shipped, Delivered, Canceled] {
            assert_eq!(super::OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(super::OrderStatus::parse("REFUNDED"), None);
    }
}
