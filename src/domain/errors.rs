use thiserror::Error;

use super::order::OrderStatus;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found")]
    NotFound,

    /// A reservation or commit asked for more units than the product can
    /// provide. `available` is the most the caller could still claim.
    #[error("Insufficient stock. Only {available} available.")]
    InsufficientStock { available: i32 },

    #[error("Invalid quantity: {0}. Quantity must be a positive integer.")]
    InvalidQuantity(i32),

    #[error("Operation not permitted on another user's resource")]
    OwnershipViolation,

    #[error("Cannot transition order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Retryable storage-level conflict (lock wait timeout, serialization
    /// failure). The core never retries; that policy belongs to the caller.
    #[error("Concurrent modification conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
