use bigdecimal::BigDecimal;
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::principal::Principal;
use crate::domain::product::{NewProduct, ProductChanges, ProductListResult, ProductView};
use crate::infrastructure::models::{NewProductRow, ProductChangesRow, ProductRow};
use crate::infrastructure::stock;
use crate::schema::products;

/// Catalog reads plus admin-side product maintenance. Stock adjustments go
/// through the same row-lock discipline as the ledger.
#[derive(Clone)]
pub struct CatalogService {
    pool: DbPool,
}

impl CatalogService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn list(&self, page: i64, limit: i64) -> Result<ProductListResult, DomainError> {
        let mut conn = self.pool.get()?;
        let offset = (page - 1) * limit;

        let total: i64 = products::table.count().get_result(&mut conn)?;
        let rows: Vec<ProductRow> = products::table
            .select(ProductRow::as_select())
            .order(products::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load(&mut conn)?;

        Ok(ProductListResult {
            items: rows.into_iter().map(view).collect(),
            total,
        })
    }

    pub fn find(&self, product_id: Uuid) -> Result<ProductView, DomainError> {
        let mut conn = self.pool.get()?;
        products::table
            .find(product_id)
            .select(ProductRow::as_select())
            .first(&mut conn)
            .optional()?
            .map(view)
            .ok_or(DomainError::NotFound)
    }

    pub fn create(
        &self,
        principal: Principal,
        product: NewProduct,
    ) -> Result<ProductView, DomainError> {
        if !principal.is_admin() {
            return Err(DomainError::OwnershipViolation);
        }
        if product.stock_quantity < 0 {
            return Err(DomainError::InvalidQuantity(product.stock_quantity));
        }
        if product.price < BigDecimal::from(0) {
            return Err(DomainError::InvalidInput(
                "price must not be negative".to_string(),
            ));
        }

        let mut conn = self.pool.get()?;
        let row = diesel::insert_into(products::table)
            .values(&NewProductRow {
                id: Uuid::new_v4(),
                name: product.name,
                description: product.description,
                price: product.price,
                stock_quantity: product.stock_quantity,
                reserved_stock: 0,
            })
            .returning(ProductRow::as_returning())
            .get_result(&mut conn)?;
        Ok(view(row))
    }

    /// Partial update. Lowering `stock_quantity` below the live reservation
    /// count is rejected; the ledger's invariant stays intact.
    pub fn update(
        &self,
        principal: Principal,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<ProductView, DomainError> {
        if !principal.is_admin() {
            return Err(DomainError::OwnershipViolation);
        }
        if let Some(ref price) = changes.price {
            if *price < BigDecimal::from(0) {
                return Err(DomainError::InvalidInput(
                    "price must not be negative".to_string(),
                ));
            }
        }

        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let current = stock::lock(conn, product_id)?;
            if let Some(stock_quantity) = changes.stock_quantity {
                if stock_quantity < 0 {
                    return Err(DomainError::InvalidQuantity(stock_quantity));
                }
                if stock_quantity < current.reserved_stock {
                    return Err(DomainError::Conflict(format!(
                        "stock_quantity {} is below reserved stock {}",
                        stock_quantity, current.reserved_stock
                    )));
                }
            }

            let row = diesel::update(products::table.find(product_id))
                .set((
                    &ProductChangesRow {
                        name: changes.name,
                        description: changes.description,
                        price: changes.price,
                        stock_quantity: changes.stock_quantity,
                    },
                    products::updated_at.eq(diesel::dsl::now),
                ))
                .returning(ProductRow::as_returning())
                .get_result(conn)?;
            Ok(view(row))
        })
    }
}

fn view(row: ProductRow) -> ProductView {
    ProductView {
        id: row.id,
        name: row.name,
        description: row.description,
        price: row.price,
        stock_quantity: row.stock_quantity,
        reserved_stock: row.reserved_stock,
        created_at: row.created_at,
    }
}
