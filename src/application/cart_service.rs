use bigdecimal::BigDecimal;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::cart::{CartItemView, CartSummary};
use crate::domain::errors::DomainError;
use crate::domain::principal::Principal;
use crate::infrastructure::models::{CartItemRow, CartRow, NewCartItemRow, NewCartRow, ProductRow};
use crate::infrastructure::stock;
use crate::schema::{cart_items, carts, products};

/// Translates cart mutations into stock-ledger operations. Every mutation
/// runs in a single transaction: the reservation and the cart line change
/// land together or not at all.
///
/// Mutations lock the cart row before any product row, so concurrent
/// requests against one cart serialize and line quantities never drift
/// from the reservations backing them.
#[derive(Clone)]
pub struct CartService {
    pool: DbPool,
}

impl CartService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Add `quantity` units of a product to the caller's cart, reserving the
    /// stock first. An existing line for the same product is increased.
    pub fn add_item(
        &self,
        principal: Principal,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemView, DomainError> {
        if quantity < 1 {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart = ensure_cart(conn, principal.id)?;
            let product = stock::reserve(conn, product_id, quantity)?;

            let existing: Option<CartItemRow> = cart_items::table
                .filter(cart_items::cart_id.eq(cart.id))
                .filter(cart_items::product_id.eq(product_id))
                .select(CartItemRow::as_select())
                .first(conn)
                .optional()?;

            let row = match existing {
                Some(item) => diesel::update(cart_items::table.find(item.id))
                    .set((
                        cart_items::quantity.eq(item.quantity + quantity),
                        cart_items::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(CartItemRow::as_returning())
                    .get_result(conn)?,
                None => diesel::insert_into(cart_items::table)
                    .values(&NewCartItemRow {
                        id: Uuid::new_v4(),
                        cart_id: cart.id,
                        product_id,
                        quantity,
                    })
                    .returning(CartItemRow::as_returning())
                    .get_result(conn)?,
            };

            Ok(item_view(&row, &product))
        })
    }

    /// Set a cart line to `quantity`, reserving or releasing the difference.
    /// Quantity 0 deletes the line. Returns `None` when the line was removed.
    pub fn update_item(
        &self,
        principal: Principal,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Option<CartItemView>, DomainError> {
        if quantity < 0 {
            return Err(DomainError::InvalidQuantity(quantity));
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let item = owned_item(conn, principal, item_id)?;
            let delta = quantity - item.quantity;

            let product = match delta {
                d if d > 0 => stock::reserve(conn, item.product_id, d)?,
                d if d < 0 => stock::release(conn, item.product_id, -d)?,
                _ => stock::lock(conn, item.product_id)?,
            };

            if quantity == 0 {
                diesel::delete(cart_items::table.find(item.id)).execute(conn)?;
                return Ok(None);
            }

            let row = diesel::update(cart_items::table.find(item.id))
                .set((
                    cart_items::quantity.eq(quantity),
                    cart_items::updated_at.eq(diesel::dsl::now),
                ))
                .returning(CartItemRow::as_returning())
                .get_result(conn)?;

            Ok(Some(item_view(&row, &product)))
        })
    }

    /// Delete a cart line and release its reservation.
    pub fn remove_item(&self, principal: Principal, item_id: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let item = owned_item(conn, principal, item_id)?;
            stock::release(conn, item.product_id, item.quantity)?;
            diesel::delete(cart_items::table.find(item.id)).execute(conn)?;
            Ok(())
        })
    }

    /// Cart contents with live availability. A user without a cart gets an
    /// empty summary.
    pub fn summary(&self, customer_id: Uuid) -> Result<CartSummary, DomainError> {
        let mut conn = self.pool.get()?;

        let cart: Option<CartRow> = carts::table
            .filter(carts::customer_id.eq(customer_id))
            .select(CartRow::as_select())
            .first(&mut conn)
            .optional()?;
        let Some(cart) = cart else {
            return Ok(CartSummary::empty());
        };

        let rows: Vec<(CartItemRow, ProductRow)> = cart_items::table
            .inner_join(products::table)
            .filter(cart_items::cart_id.eq(cart.id))
            .order(cart_items::created_at.asc())
            .select((CartItemRow::as_select(), ProductRow::as_select()))
            .load(&mut conn)?;

        let items: Vec<CartItemView> = rows
            .iter()
            .map(|(item, product)| item_view(item, product))
            .collect();
        let total_price = items
            .iter()
            .fold(BigDecimal::from(0), |acc, i| acc + &i.item_total);
        let can_checkout = !items.is_empty() && items.iter().all(|i| i.in_stock);

        Ok(CartSummary {
            items_count: items.len(),
            items,
            total_price,
            can_checkout,
        })
    }
}

/// Fetch the cart lazily, creating it on first access, and take its row
/// lock. Every cart mutation goes through here (or `owned_item`) before
/// touching products, so all writes to one cart are totally ordered and
/// the lock order is always cart first, products second. The unique
/// constraint on `customer_id` resolves creation races: losers re-read the
/// winner's row.
fn ensure_cart(conn: &mut PgConnection, customer_id: Uuid) -> Result<CartRow, DomainError> {
    let existing: Option<CartRow> = carts::table
        .filter(carts::customer_id.eq(customer_id))
        .select(CartRow::as_select())
        .for_update()
        .first(conn)
        .optional()?;
    if let Some(cart) = existing {
        return Ok(cart);
    }

    diesel::insert_into(carts::table)
        .values(&NewCartRow {
            id: Uuid::new_v4(),
            customer_id,
        })
        .on_conflict(carts::customer_id)
        .do_nothing()
        .execute(conn)?;

    carts::table
        .filter(carts::customer_id.eq(customer_id))
        .select(CartRow::as_select())
        .for_update()
        .first(conn)
        .map_err(Into::into)
}

/// Load a cart item under its cart's row lock, enforcing that it belongs to
/// the caller (admins may act on any cart).
///
/// The first read only discovers which cart to lock; the line is read again
/// once the lock is held, because a concurrent mutation may have changed or
/// deleted it while we waited. Quantity deltas computed from the returned
/// row are therefore never stale.
fn owned_item(
    conn: &mut PgConnection,
    principal: Principal,
    item_id: Uuid,
) -> Result<CartItemRow, DomainError> {
    let cart_id: Option<Uuid> = cart_items::table
        .find(item_id)
        .select(cart_items::cart_id)
        .first(conn)
        .optional()?;
    let cart_id = cart_id.ok_or(DomainError::NotFound)?;

    let cart: Option<CartRow> = carts::table
        .find(cart_id)
        .select(CartRow::as_select())
        .for_update()
        .first(conn)
        .optional()?;
    let cart = cart.ok_or(DomainError::NotFound)?;
    if !principal.owns_or_admin(cart.customer_id) {
        return Err(DomainError::OwnershipViolation);
    }

    let item: Option<CartItemRow> = cart_items::table
        .find(item_id)
        .select(CartItemRow::as_select())
        .first(conn)
        .optional()?;
    item.ok_or(DomainError::NotFound)
}

fn item_view(item: &CartItemRow, product: &ProductRow) -> CartItemView {
    CartItemView {
        id: item.id,
        product_id: product.id,
        product_name: product.name.clone(),
        product_price: product.price.clone(),
        quantity: item.quantity,
        available_stock: product.available_stock(),
        item_total: BigDecimal::from(item.quantity) * &product.price,
        // The reservation already backs this line; it is only unfulfillable
        // if total stock was pushed below the line quantity out of band.
        in_stock: item.quantity <= product.stock_quantity,
    }
}
