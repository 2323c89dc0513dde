//! Cart Items Repository

use carthorse::cart::{
    CartItem, CartItemUuid, CartUuid, ItemSnapshot, NewCartItem, ProductUuid, Quantity,
};
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};
use uuid::Uuid;

use crate::domain::carts::store::{ItemSpec, UpsertedItem};

use super::decode_error;

const GET_CART_ITEMS_SQL: &str = include_str!("../sql/get_cart_items.sql");
const COUNT_CART_ITEMS_SQL: &str = include_str!("../sql/count_cart_items.sql");
const GET_CART_ITEM_QUANTITY_SQL: &str = include_str!("../sql/get_cart_item_quantity.sql");
const UPSERT_CART_ITEM_SQL: &str = include_str!("../sql/upsert_cart_item.sql");
const REPLACE_CART_ITEM_SQL: &str = include_str!("../sql/replace_cart_item.sql");
const PRUNE_CART_ITEMS_SQL: &str = include_str!("../sql/prune_cart_items.sql");
const SET_CART_ITEM_QUANTITY_SQL: &str = include_str!("../sql/set_cart_item_quantity.sql");
const DELETE_CART_ITEM_SQL: &str = include_str!("../sql/delete_cart_item.sql");
const CLEAR_CART_ITEMS_SQL: &str = include_str!("../sql/clear_cart_items.sql");
const FOLD_WOULD_OVERFLOW_SQL: &str = include_str!("../sql/fold_would_overflow.sql");
const FOLD_CART_ITEMS_SQL: &str = include_str!("../sql/fold_cart_items.sql");
const DROP_FOLDED_ITEMS_SQL: &str = include_str!("../sql/drop_folded_items.sql");
const RELINK_CART_ITEMS_SQL: &str = include_str!("../sql/relink_cart_items.sql");

#[derive(Debug)]
pub(super) struct CartItemRecord(pub(super) CartItem);

#[derive(Debug, Clone, Default)]
pub(super) struct PgCartItemsRepository;

impl PgCartItemsRepository {
    pub(super) async fn get_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<Vec<CartItem>, sqlx::Error> {
        let records = query_as::<Postgres, CartItemRecord>(GET_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .fetch_all(&mut **tx)
            .await?;

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    pub(super) async fn count_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<i64, sqlx::Error> {
        query_scalar::<Postgres, i64>(COUNT_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    pub(super) async fn get_quantity(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        product: ProductUuid,
    ) -> Result<Option<Quantity>, sqlx::Error> {
        let quantity = query_scalar::<Postgres, i32>(GET_CART_ITEM_QUANTITY_SQL)
            .bind(cart.into_uuid())
            .bind(product.into_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        quantity
            .map(|quantity| {
                Quantity::new(i64::from(quantity)).map_err(|error| decode_error("quantity", error))
            })
            .transpose()
    }

    pub(super) async fn upsert_cart_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        item: NewCartItem,
    ) -> Result<UpsertedItem, sqlx::Error> {
        let snapshot = item.snapshot;

        let row = query(UPSERT_CART_ITEM_SQL)
            .bind(item.uuid.into_uuid())
            .bind(cart.into_uuid())
            .bind(item.product_uuid.into_uuid())
            .bind(snapshot.product_name)
            .bind(snapshot.product_sku)
            .bind(snapshot.price_at_addition)
            .bind(snapshot.image_url)
            .bind(snapshot.product_category)
            .bind(item.quantity.as_i32())
            .fetch_one(&mut **tx)
            .await?;

        Ok(UpsertedItem {
            item: CartItemRecord::from_row(&row)?.0,
            created: row.try_get("created")?,
        })
    }

    /// Insert the line, or overwrite only its quantity if the product is present.
    pub(super) async fn replace_cart_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        spec: ItemSpec,
    ) -> Result<(), sqlx::Error> {
        let snapshot = spec.snapshot;

        query(REPLACE_CART_ITEM_SQL)
            .bind(CartItemUuid::new().into_uuid())
            .bind(cart.into_uuid())
            .bind(spec.product_uuid.into_uuid())
            .bind(snapshot.product_name)
            .bind(snapshot.product_sku)
            .bind(snapshot.price_at_addition)
            .bind(snapshot.image_url)
            .bind(snapshot.product_category)
            .bind(spec.quantity.as_i32())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Delete every line whose product is not in `keep`.
    pub(super) async fn prune_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        keep: &[ProductUuid],
    ) -> Result<u64, sqlx::Error> {
        let keep: Vec<Uuid> = keep.iter().map(|product| product.into_uuid()).collect();

        let rows_affected = query(PRUNE_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .bind(keep)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(super) async fn set_quantity(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<Option<CartItem>, sqlx::Error> {
        let record = query_as::<Postgres, CartItemRecord>(SET_CART_ITEM_QUANTITY_SQL)
            .bind(cart.into_uuid())
            .bind(product.into_uuid())
            .bind(quantity.as_i32())
            .fetch_optional(&mut **tx)
            .await?;

        Ok(record.map(|record| record.0))
    }

    pub(super) async fn delete_cart_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        product: ProductUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_CART_ITEM_SQL)
            .bind(cart.into_uuid())
            .bind(product.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(super) async fn clear_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(CLEAR_CART_ITEMS_SQL)
            .bind(cart.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    /// Whether any target line would exceed the stored quantity range once the
    /// source line for the same product is folded into it.
    pub(super) async fn fold_would_overflow(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        target: CartUuid,
        source: CartUuid,
    ) -> Result<bool, sqlx::Error> {
        query_scalar::<Postgres, bool>(FOLD_WOULD_OVERFLOW_SQL)
            .bind(target.into_uuid())
            .bind(source.into_uuid())
            .fetch_one(&mut **tx)
            .await
    }

    /// Add source quantities onto target lines for the same product, then drop
    /// the folded source lines. Returns the number of target lines updated.
    pub(super) async fn fold_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        target: CartUuid,
        source: CartUuid,
        keep_newest: bool,
    ) -> Result<u64, sqlx::Error> {
        let combined = query(FOLD_CART_ITEMS_SQL)
            .bind(target.into_uuid())
            .bind(source.into_uuid())
            .bind(keep_newest)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        query(DROP_FOLDED_ITEMS_SQL)
            .bind(target.into_uuid())
            .bind(source.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(combined)
    }

    /// Move every remaining source line to the target cart.
    pub(super) async fn relink_cart_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        target: CartUuid,
        source: CartUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(RELINK_CART_ITEMS_SQL)
            .bind(target.into_uuid())
            .bind(source.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}

impl<'r> FromRow<'r, PgRow> for CartItemRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let quantity: i32 = row.try_get("quantity")?;

        Ok(Self(CartItem {
            uuid: CartItemUuid::from_uuid(row.try_get("uuid")?),
            cart_uuid: CartUuid::from_uuid(row.try_get("cart_uuid")?),
            product_uuid: ProductUuid::from_uuid(row.try_get("product_uuid")?),
            snapshot: ItemSnapshot {
                product_name: row.try_get("product_name")?,
                product_sku: row.try_get("product_sku")?,
                price_at_addition: row.try_get::<Decimal, _>("price_at_addition")?,
                image_url: row.try_get("image_url")?,
                product_category: row.try_get("product_category")?,
            },
            quantity: Quantity::new(i64::from(quantity))
                .map_err(|error| decode_error("quantity", error))?,
            added_at: row.try_get::<SqlxTimestamp, _>("added_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}
