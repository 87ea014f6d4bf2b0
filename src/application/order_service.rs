use bigdecimal::BigDecimal;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{OrderItemView, OrderListResult, OrderStatus, OrderView};
use crate::domain::principal::Principal;
use crate::infrastructure::models::{
    CartItemRow, CartRow, NewOrderItemRow, NewOrderRow, OrderItemRow, OrderRow,
};
use crate::infrastructure::stock;
use crate::schema::{cart_items, carts, order_items, orders};

/// Finalizes carts into orders and drives order status transitions.
#[derive(Clone)]
pub struct OrderService {
    pool: DbPool,
}

impl OrderService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Convert the caller's entire cart into a PENDING order.
    ///
    /// One transaction covers everything: the cart row is locked first (a
    /// second checkout or cart edit for the same customer waits, then sees
    /// the emptied cart), products are locked in ascending product-id order
    /// (concurrent checkouts sharing products cannot deadlock), each line's
    /// reservation is committed, the price is snapshotted, and the lines
    /// read under the lock are deleted. Any line failure rolls the whole
    /// thing back: no order, no stock change, cart intact.
    pub fn checkout(&self, principal: Principal) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let cart: Option<CartRow> = carts::table
                .filter(carts::customer_id.eq(principal.id))
                .select(CartRow::as_select())
                .for_update()
                .first(conn)
                .optional()?;
            let Some(cart) = cart else {
                return Err(DomainError::InvalidInput(
                    "Cannot checkout with empty cart".to_string(),
                ));
            };

            let items: Vec<CartItemRow> = cart_items::table
                .filter(cart_items::cart_id.eq(cart.id))
                .order(cart_items::product_id.asc())
                .select(CartItemRow::as_select())
                .load(conn)?;
            if items.is_empty() {
                return Err(DomainError::InvalidInput(
                    "Cannot checkout with empty cart".to_string(),
                ));
            }

            let order_id = Uuid::new_v4();
            let mut total_price = BigDecimal::from(0);
            let mut new_items = Vec::with_capacity(items.len());
            for item in &items {
                let product = stock::commit(conn, item.product_id, item.quantity)?;
                total_price += BigDecimal::from(item.quantity) * &product.price;
                new_items.push(NewOrderItemRow {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price_at_purchase: product.price.clone(),
                });
            }

            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order_id,
                    customer_id: principal.id,
                    status: OrderStatus::Pending.as_str().to_string(),
                    total_price,
                })
                .execute(conn)?;
            diesel::insert_into(order_items::table)
                .values(&new_items)
                .execute(conn)?;
            // Delete exactly the lines this order consumed.
            let line_ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
            diesel::delete(cart_items::table.filter(cart_items::id.eq_any(line_ids)))
                .execute(conn)?;

            load_view(conn, order_id)
        })
    }

    /// Cancel a PENDING or SHIPPED order, returning its committed quantities
    /// to `stock_quantity`. The cart behind the original reservation is long
    /// gone, so `reserved_stock` stays untouched.
    pub fn cancel(&self, principal: Principal, order_id: Uuid) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = lock_order(conn, order_id)?;
            if !principal.owns_or_admin(order.customer_id) {
                return Err(DomainError::OwnershipViolation);
            }
            transition(conn, &order, OrderStatus::Canceled)
        })
    }

    /// Admin-only status change. Cancellation through this path performs the
    /// same stock reversal as `cancel`.
    pub fn update_status(
        &self,
        principal: Principal,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderView, DomainError> {
        if !principal.is_admin() {
            return Err(DomainError::OwnershipViolation);
        }
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let order = lock_order(conn, order_id)?;
            transition(conn, &order, new_status)
        })
    }

    pub fn find(&self, principal: Principal, order_id: Uuid) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;

        let order: Option<OrderRow> = orders::table
            .find(order_id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;
        let order = order.ok_or(DomainError::NotFound)?;
        if !principal.owns_or_admin(order.customer_id) {
            return Err(DomainError::OwnershipViolation);
        }

        let items: Vec<OrderItemRow> = order_items::table
            .filter(order_items::order_id.eq(order.id))
            .select(OrderItemRow::as_select())
            .load(&mut conn)?;
        view(order, items)
    }

    /// Paginated order history. Customers see only their own orders; admins
    /// see everything. Items are omitted from list rows.
    pub fn list(
        &self,
        principal: Principal,
        page: i64,
        limit: i64,
    ) -> Result<OrderListResult, DomainError> {
        let mut conn = self.pool.get()?;
        let offset = (page - 1) * limit;

        let (total, rows): (i64, Vec<OrderRow>) = if principal.is_admin() {
            let total = orders::table.count().get_result(&mut conn)?;
            let rows = orders::table
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(&mut conn)?;
            (total, rows)
        } else {
            let total = orders::table
                .filter(orders::customer_id.eq(principal.id))
                .count()
                .get_result(&mut conn)?;
            let rows = orders::table
                .filter(orders::customer_id.eq(principal.id))
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(&mut conn)?;
            (total, rows)
        };

        let items = rows
            .into_iter()
            .map(|o| view(o, Vec::new()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OrderListResult { items, total })
    }
}

/// Lock the order row so concurrent cancels and status updates serialize.
fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> Result<OrderRow, DomainError> {
    orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(DomainError::NotFound)
}

fn transition(
    conn: &mut PgConnection,
    order: &OrderRow,
    next: OrderStatus,
) -> Result<OrderView, DomainError> {
    let current = OrderStatus::parse(&order.status)
        .ok_or_else(|| DomainError::Internal(format!("unknown order status {}", order.status)))?;
    if !current.can_transition_to(next) {
        return Err(DomainError::InvalidStatusTransition {
            from: current,
            to: next,
        });
    }

    if next == OrderStatus::Canceled {
        let items: Vec<OrderItemRow> = order_items::table
            .filter(order_items::order_id.eq(order.id))
            .order(order_items::product_id.asc())
            .select(OrderItemRow::as_select())
            .load(conn)?;
        for item in &items {
            stock::restock(conn, item.product_id, item.quantity)?;
        }
    }

    diesel::update(orders::table.find(order.id))
        .set((
            orders::status.eq(next.as_str()),
            orders::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;

    load_view(conn, order.id)
}

fn load_view(conn: &mut PgConnection, order_id: Uuid) -> Result<OrderView, DomainError> {
    let order: OrderRow = orders::table
        .find(order_id)
        .select(OrderRow::as_select())
        .first(conn)?;
    let items: Vec<OrderItemRow> = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .select(OrderItemRow::as_select())
        .load(conn)?;
    view(order, items)
}

fn view(order: OrderRow, items: Vec<OrderItemRow>) -> Result<OrderView, DomainError> {
    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| DomainError::Internal(format!("unknown order status {}", order.status)))?;
    Ok(OrderView {
        id: order.id,
        customer_id: order.customer_id,
        status,
        total_price: order.total_price,
        created_at: order.created_at,
        items: items
            .into_iter()
            .map(|i| OrderItemView {
                id: i.id,
                product_id: i.product_id,
                quantity: i.quantity,
                price_at_purchase: i.price_at_purchase,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bigdecimal::BigDecimal;
    use diesel::prelude::*;
    use uuid::Uuid;

    use super::OrderService;
    use crate::application::cart_service::CartService;
    use crate::application::testutil::{fetch_product, seed_product, setup_db};
    use crate::domain::errors::DomainError;
    use crate::domain::order::OrderStatus;
    use crate::domain::principal::{Principal, Role};
    use crate::schema::{cart_items, orders, products};

    fn customer() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role: Role::Customer,
        }
    }

    fn admin() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role: Role::Admin,
        }
    }

    #[tokio::test]
    async fn checkout_commits_reservation_and_empties_cart() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 3).expect("add failed");

        let order = svc.checkout(user).expect("checkout failed");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.total_price.to_string(), "2999.97");
        let product = fetch_product(&pool, product_id);
        assert_eq!(product.stock_quantity, 2);
        assert_eq!(product.reserved_stock, 0);
        assert!(carts.summary(user.id).expect("summary failed").items.is_empty());
    }

    #[tokio::test]
    async fn checkout_with_empty_cart_fails() {
        let (_container, pool) = setup_db().await;
        let svc = OrderService::new(pool);

        let err = svc.checkout(customer()).unwrap_err();

        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    /// Forced mid-checkout failure: sabotage the second product's total
    /// stock below its reservation, then verify nothing from the first line
    /// survives either.
    #[tokio::test]
    async fn checkout_is_atomic_across_lines() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let laptop = seed_product(&pool, "Laptop", "999.99", 5);
        let mouse = seed_product(&pool, "Mouse", "25.00", 5);
        let user = customer();
        carts.add_item(user, laptop, 2).expect("add laptop failed");
        carts.add_item(user, mouse, 3).expect("add mouse failed");

        // Out-of-band inventory correction drops total stock below the
        // reservation. Checkout's defensive check must catch it.
        {
            let mut conn = pool.get().expect("conn failed");
            diesel::update(products::table.find(mouse))
                .set(products::stock_quantity.eq(1))
                .execute(&mut conn)
                .expect("sabotage failed");
        }

        let err = svc.checkout(user).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { .. }));

        // No order, no stock mutation, cart unchanged.
        let mut conn = pool.get().expect("conn failed");
        let order_count: i64 = orders::table
            .count()
            .get_result(&mut conn)
            .expect("count failed");
        assert_eq!(order_count, 0);
        let laptop_row = fetch_product(&pool, laptop);
        assert_eq!(laptop_row.stock_quantity, 5);
        assert_eq!(laptop_row.reserved_stock, 2);
        let line_count: i64 = cart_items::table
            .count()
            .get_result(&mut conn)
            .expect("count failed");
        assert_eq!(line_count, 2);
    }

    #[tokio::test]
    async fn price_snapshot_survives_catalog_price_change() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 1).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");

        {
            let mut conn = pool.get().expect("conn failed");
            diesel::update(products::table.find(product_id))
                .set(products::price.eq(BigDecimal::from_str("1499.99").unwrap()))
                .execute(&mut conn)
                .expect("price change failed");
        }

        let reloaded = svc.find(user, order.id).expect("find failed");
        assert_eq!(reloaded.items[0].price_at_purchase.to_string(), "999.99");
        assert_eq!(reloaded.total_price.to_string(), "999.99");
    }

    #[tokio::test]
    async fn cancel_restores_stock_without_touching_reserved() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 3).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");

        // Another customer's live reservation must be unaffected.
        carts
            .add_item(customer(), product_id, 1)
            .expect("second reservation failed");

        let canceled = svc.cancel(user, order.id).expect("cancel failed");

        assert_eq!(canceled.status, OrderStatus::Canceled);
        let product = fetch_product(&pool, product_id);
        assert_eq!(product.stock_quantity, 5);
        assert_eq!(product.reserved_stock, 1);
    }

    #[tokio::test]
    async fn cancel_rejects_delivered_order() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 1).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");
        svc.update_status(admin(), order.id, OrderStatus::Shipped)
            .expect("ship failed");
        svc.update_status(admin(), order.id, OrderStatus::Delivered)
            .expect("deliver failed");

        let err = svc.cancel(user, order.id).unwrap_err();

        assert!(matches!(
            err,
            DomainError::InvalidStatusTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Canceled,
            }
        ));
        assert_eq!(fetch_product(&pool, product_id).stock_quantity, 4);
    }

    #[tokio::test]
    async fn cancel_rejects_foreign_order_for_customers() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 1).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");

        let err = svc.cancel(customer(), order.id).unwrap_err();
        assert!(matches!(err, DomainError::OwnershipViolation));

        // An admin may cancel on the customer's behalf.
        svc.cancel(admin(), order.id).expect("admin cancel failed");
    }

    #[tokio::test]
    async fn update_status_is_admin_only_and_checks_transitions() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 1).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");

        let err = svc
            .update_status(user, order.id, OrderStatus::Shipped)
            .unwrap_err();
        assert!(matches!(err, DomainError::OwnershipViolation));

        let err = svc
            .update_status(admin(), order.id, OrderStatus::Delivered)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        let shipped = svc
            .update_status(admin(), order.id, OrderStatus::Shipped)
            .expect("ship failed");
        assert_eq!(shipped.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn cancel_via_update_status_restocks() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let user = customer();
        carts.add_item(user, product_id, 2).expect("add failed");
        let order = svc.checkout(user).expect("checkout failed");

        svc.update_status(admin(), order.id, OrderStatus::Canceled)
            .expect("cancel failed");

        assert_eq!(fetch_product(&pool, product_id).stock_quantity, 5);
    }

    #[tokio::test]
    async fn list_scopes_customers_to_their_own_orders() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 10);
        let alice = customer();
        let bob = customer();
        for user in [alice, bob] {
            carts.add_item(user, product_id, 1).expect("add failed");
            svc.checkout(user).expect("checkout failed");
        }

        let own = svc.list(alice, 1, 20).expect("list failed");
        assert_eq!(own.total, 1);
        assert_eq!(own.items[0].customer_id, alice.id);

        let all = svc.list(admin(), 1, 20).expect("admin list failed");
        assert_eq!(all.total, 2);

        let err = svc.find(bob, own.items[0].id).unwrap_err();
        assert!(matches!(err, DomainError::OwnershipViolation));
    }

    /// Two simultaneous checkouts of one cart must not sell the same lines
    /// twice. The cart row lock serializes them: the loser waits, then sees
    /// the emptied cart.
    #[tokio::test]
    async fn concurrent_checkouts_of_one_cart_create_one_order() {
        let (_container, pool) = setup_db().await;
        let carts_svc = CartService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 10);
        let user = customer();
        carts_svc.add_item(user, product_id, 3).expect("add failed");

        let mut handles = Vec::new();
        for _ in 0..2 {
            let svc = OrderService::new(pool.clone());
            handles.push(std::thread::spawn(move || svc.checkout(user)));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().expect("thread panicked") {
                Ok(_) => succeeded += 1,
                Err(DomainError::InvalidInput(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(succeeded, 1);

        // Stock dropped once, nothing stayed reserved, one order exists.
        let product = fetch_product(&pool, product_id);
        assert_eq!(product.stock_quantity, 7);
        assert_eq!(product.reserved_stock, 0);
        let mut conn = pool.get().expect("conn failed");
        let order_count: i64 = orders::table
            .count()
            .get_result(&mut conn)
            .expect("count failed");
        assert_eq!(order_count, 1);
    }

    /// Walkthrough with stock 5: A reserves 3, B fails at 3, B succeeds at
    /// 2, A checks out -> stock 2, reserved 2.
    #[tokio::test]
    async fn reservation_and_checkout_walkthrough() {
        let (_container, pool) = setup_db().await;
        let carts = CartService::new(pool.clone());
        let svc = OrderService::new(pool.clone());
        let product_id = seed_product(&pool, "Laptop", "999.99", 5);
        let alice = customer();
        let bob = customer();

        carts.add_item(alice, product_id, 3).expect("A reserve 3");
        let product = fetch_product(&pool, product_id);
        assert_eq!((product.reserved_stock, product.available_stock()), (3, 2));

        let err = carts.add_item(bob, product_id, 3).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientStock { available: 2 }
        ));
        assert_eq!(fetch_product(&pool, product_id).reserved_stock, 3);

        carts.add_item(bob, product_id, 2).expect("B reserve 2");
        let product = fetch_product(&pool, product_id);
        assert_eq!((product.reserved_stock, product.available_stock()), (5, 0));

        svc.checkout(alice).expect("A checkout");
        let product = fetch_product(&pool, product_id);
        assert_eq!(product.stock_quantity, 2);
        assert_eq!(product.reserved_stock, 2);
    }
}
