//! Stock ledger: the only code allowed to mutate `stock_quantity` and
//! `reserved_stock`.
//!
//! Every operation takes the product's row lock (SELECT ... FOR UPDATE)
//! before reading the counters, so all reserve/release/commit calls for one
//! product are totally ordered by lock acquisition. Callers must already be
//! inside a transaction; the lock is held until that transaction ends.
//! Multi-product callers must lock in ascending product-id order.

use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::schema::products;

use super::models::ProductRow;

/// Lock the product row exclusively and return its current state.
pub fn lock(conn: &mut PgConnection, product_id: Uuid) -> Result<ProductRow, DomainError> {
    products::table
        .find(product_id)
        .select(ProductRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound)
}

/// Claim `quantity` units for a cart item: `reserved_stock += quantity`.
pub fn reserve(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<ProductRow, DomainError> {
    let product = lock(conn, product_id)?;
    let available = product.available_stock();
    if quantity > available {
        return Err(DomainError::InsufficientStock { available });
    }
    write_counters(
        conn,
        product_id,
        product.stock_quantity,
        product.reserved_stock + quantity,
    )
}

/// Return `quantity` previously reserved units to availability.
pub fn release(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<ProductRow, DomainError> {
    let product = lock(conn, product_id)?;
    if quantity > product.reserved_stock {
        return Err(DomainError::Internal(format!(
            "release of {} exceeds reserved stock {} for product {}",
            quantity, product.reserved_stock, product_id
        )));
    }
    write_counters(
        conn,
        product_id,
        product.stock_quantity,
        product.reserved_stock - quantity,
    )
}

/// Convert `quantity` reserved units into a permanent sale: both counters
/// drop together, so no window exists where stock is double-counted or lost.
/// Callers snapshot the price from the returned row, under the same lock.
///
/// The counter checks are defensive: they only fire if total stock was
/// pushed below the reservation behind the ledger's back.
pub fn commit(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<ProductRow, DomainError> {
    let product = lock(conn, product_id)?;
    if quantity > product.reserved_stock || quantity > product.stock_quantity {
        let available = product.reserved_stock.min(product.stock_quantity);
        return Err(DomainError::InsufficientStock { available });
    }
    write_counters(
        conn,
        product_id,
        product.stock_quantity - quantity,
        product.reserved_stock - quantity,
    )
}

/// Reverse a commit when an order is canceled: `stock_quantity += quantity`.
/// `reserved_stock` is untouched; the cart behind the reservation is gone.
pub fn restock(
    conn: &mut PgConnection,
    product_id: Uuid,
    quantity: i32,
) -> Result<ProductRow, DomainError> {
    let product = lock(conn, product_id)?;
    write_counters(
        conn,
        product_id,
        product.stock_quantity + quantity,
        product.reserved_stock,
    )
}

fn write_counters(
    conn: &mut PgConnection,
    product_id: Uuid,
    stock_quantity: i32,
    reserved_stock: i32,
) -> Result<ProductRow, DomainError> {
    debug_assert!(stock_quantity >= 0 && reserved_stock >= 0);

    let row = diesel::update(products::table.find(product_id))
        .set((
            products::stock_quantity.eq(stock_quantity),
            products::reserved_stock.eq(reserved_stock),
            products::updated_at.eq(diesel::dsl::now),
        ))
        .returning(ProductRow::as_returning())
        .get_result(conn)?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use diesel::prelude::*;

    use super::{commit, release, reserve, restock};
    use crate::application::testutil::{fetch_product, seed_product, setup_db};
    use crate::domain::errors::DomainError;

    #[tokio::test]
    async fn reserve_commit_cycle_keeps_counters_in_range() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let mut conn = pool.get().expect("conn failed");

        conn.transaction::<_, DomainError, _>(|conn| {
            let p = reserve(conn, product_id, 3)?;
            assert_eq!((p.stock_quantity, p.reserved_stock), (5, 3));
            let p = commit(conn, product_id, 2)?;
            assert_eq!((p.stock_quantity, p.reserved_stock), (3, 1));
            let p = release(conn, product_id, 1)?;
            assert_eq!((p.stock_quantity, p.reserved_stock), (3, 0));
            let p = restock(conn, product_id, 2)?;
            assert_eq!((p.stock_quantity, p.reserved_stock), (5, 0));
            Ok(())
        })
        .expect("cycle failed");
    }

    #[tokio::test]
    async fn reserve_beyond_available_names_the_remainder() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let mut conn = pool.get().expect("conn failed");

        let err = conn
            .transaction::<_, DomainError, _>(|conn| {
                reserve(conn, product_id, 4)?;
                reserve(conn, product_id, 2).map(|_| ())
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock { available: 1 }));
        // The first reservation rolled back with the failed transaction.
        assert_eq!(fetch_product(&pool, product_id).reserved_stock, 0);
    }

    #[tokio::test]
    async fn release_overflow_is_an_invariant_breach() {
        let (_container, pool) = setup_db().await;
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let mut conn = pool.get().expect("conn failed");

        let err = conn
            .transaction::<_, DomainError, _>(|conn| release(conn, product_id, 1).map(|_| ()))
            .unwrap_err();

        assert!(matches!(err, DomainError::Internal(_)));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (_container, pool) = setup_db().await;
        let mut conn = pool.get().expect("conn failed");

        let err = conn
            .transaction::<_, DomainError, _>(|conn| {
                reserve(conn, uuid::Uuid::new_v4(), 1).map(|_| ())
            })
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound));
    }
}
