//! Carts Repository

use carthorse::{
    cart::{Adjustments, Cart, CartStatus, CartUuid, Owner, SessionKey, UserUuid},
    money::CurrencyCode,
};
use jiff_sqlx::Timestamp as SqlxTimestamp;
use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};
use uuid::Uuid;

use crate::domain::carts::store::{CartChanges, CartStoreError};

use super::decode_error;

const GET_CART_SQL: &str = include_str!("../sql/get_cart.sql");
const LOCK_CART_SQL: &str = include_str!("../sql/lock_cart.sql");
const FIND_ACTIVE_USER_CART_SQL: &str = include_str!("../sql/find_active_user_cart.sql");
const FIND_ACTIVE_SESSION_CART_SQL: &str = include_str!("../sql/find_active_session_cart.sql");
const CREATE_USER_CART_SQL: &str = include_str!("../sql/create_user_cart.sql");
const CREATE_SESSION_CART_SQL: &str = include_str!("../sql/create_session_cart.sql");
const LIST_USER_CARTS_SQL: &str = include_str!("../sql/list_user_carts.sql");
const LIST_SESSION_CARTS_SQL: &str = include_str!("../sql/list_session_carts.sql");
const UPDATE_CART_SQL: &str = include_str!("../sql/update_cart.sql");
const SET_CART_STATUS_SQL: &str = include_str!("../sql/set_cart_status.sql");
const TOUCH_CART_SQL: &str = include_str!("../sql/touch_cart.sql");
const DELETE_CART_SQL: &str = include_str!("../sql/delete_cart.sql");

/// Row wrapper so the domain cart can be decoded from `PostgreSQL`.
#[derive(Debug)]
pub(super) struct CartRecord(pub(super) Cart);

/// Status and currency of a cart row held under `FOR UPDATE`.
#[derive(Debug, Clone, Copy)]
pub(super) struct LockedCart {
    pub(super) status: CartStatus,
    pub(super) currency: CurrencyCode,
}

impl LockedCart {
    pub(super) fn ensure_mutable(self) -> Result<Self, CartStoreError> {
        if self.status.is_mutable() {
            Ok(self)
        } else {
            Err(CartStoreError::NotMutable(self.status))
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct PgCartsRepository;

impl PgCartsRepository {
    pub(super) async fn get_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<Cart, sqlx::Error> {
        query_as::<Postgres, CartRecord>(GET_CART_SQL)
            .bind(cart.into_uuid())
            .fetch_one(&mut **tx)
            .await
            .map(|record| record.0)
    }

    /// Lock the cart row for the rest of the transaction.
    pub(super) async fn lock_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<Option<LockedCart>, CartStoreError> {
        let Some(row) = query(LOCK_CART_SQL)
            .bind(cart.into_uuid())
            .fetch_optional(&mut **tx)
            .await?
        else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency_code")?;

        Ok(Some(LockedCart {
            status: status.parse()?,
            currency: CurrencyCode::parse(&currency).map_err(|error| {
                CartStoreError::from(decode_error("currency_code", error))
            })?,
        }))
    }

    pub(super) async fn find_active_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner: &Owner,
    ) -> Result<Option<Cart>, sqlx::Error> {
        let record = match owner {
            Owner::User(user) => {
                query_as::<Postgres, CartRecord>(FIND_ACTIVE_USER_CART_SQL)
                    .bind(user.into_uuid())
                    .fetch_optional(&mut **tx)
                    .await?
            }
            Owner::Session(session) => {
                query_as::<Postgres, CartRecord>(FIND_ACTIVE_SESSION_CART_SQL)
                    .bind(session.as_str())
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        Ok(record.map(|record| record.0))
    }

    /// Insert a new active cart unless the owner already has one.
    ///
    /// Returns `None` when the partial unique index suppressed the insert.
    pub(super) async fn create_active_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner: &Owner,
        currency: CurrencyCode,
    ) -> Result<Option<Cart>, sqlx::Error> {
        let uuid = CartUuid::new().into_uuid();

        let record = match owner {
            Owner::User(user) => {
                query_as::<Postgres, CartRecord>(CREATE_USER_CART_SQL)
                    .bind(uuid)
                    .bind(user.into_uuid())
                    .bind(currency.code())
                    .fetch_optional(&mut **tx)
                    .await?
            }
            Owner::Session(session) => {
                query_as::<Postgres, CartRecord>(CREATE_SESSION_CART_SQL)
                    .bind(uuid)
                    .bind(session.as_str())
                    .bind(currency.code())
                    .fetch_optional(&mut **tx)
                    .await?
            }
        };

        Ok(record.map(|record| record.0))
    }

    pub(super) async fn list_carts(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        owner: &Owner,
    ) -> Result<Vec<Cart>, sqlx::Error> {
        let records = match owner {
            Owner::User(user) => {
                query_as::<Postgres, CartRecord>(LIST_USER_CARTS_SQL)
                    .bind(user.into_uuid())
                    .fetch_all(&mut **tx)
                    .await?
            }
            Owner::Session(session) => {
                query_as::<Postgres, CartRecord>(LIST_SESSION_CARTS_SQL)
                    .bind(session.as_str())
                    .fetch_all(&mut **tx)
                    .await?
            }
        };

        Ok(records.into_iter().map(|record| record.0).collect())
    }

    pub(super) async fn update_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        changes: CartChanges,
    ) -> Result<Cart, sqlx::Error> {
        let CartChanges {
            shipping_cost,
            discount_amount,
            tax_amount,
            currency,
            coupon_code,
            discount_notes,
        } = changes;

        query_as::<Postgres, CartRecord>(UPDATE_CART_SQL)
            .bind(cart.into_uuid())
            .bind(shipping_cost)
            .bind(discount_amount)
            .bind(tax_amount)
            .bind(currency.map(|currency| currency.code()))
            .bind(coupon_code.is_some())
            .bind(coupon_code.flatten())
            .bind(discount_notes.is_some())
            .bind(discount_notes.flatten())
            .fetch_one(&mut **tx)
            .await
            .map(|record| record.0)
    }

    pub(super) async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        status: CartStatus,
    ) -> Result<Cart, sqlx::Error> {
        query_as::<Postgres, CartRecord>(SET_CART_STATUS_SQL)
            .bind(cart.into_uuid())
            .bind(status.as_str())
            .fetch_one(&mut **tx)
            .await
            .map(|record| record.0)
    }

    pub(super) async fn touch_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<(), sqlx::Error> {
        query(TOUCH_CART_SQL)
            .bind(cart.into_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(super) async fn delete_cart(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_CART_SQL)
            .bind(cart.into_uuid())
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}

impl<'r> FromRow<'r, PgRow> for CartRecord {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let user: Option<Uuid> = row.try_get("user_uuid")?;
        let session: Option<String> = row.try_get("session_key")?;

        let owner = match (user, session) {
            (Some(user), None) => Owner::User(UserUuid::from_uuid(user)),
            (None, Some(session)) => Owner::Session(
                SessionKey::new(session).map_err(|error| decode_error("session_key", error))?,
            ),
            _ => {
                return Err(decode_error(
                    "user_uuid",
                    "cart must have exactly one of user_uuid and session_key",
                ));
            }
        };

        let status: String = row.try_get("status")?;
        let currency: String = row.try_get("currency_code")?;

        Ok(Self(Cart {
            uuid: CartUuid::from_uuid(row.try_get("uuid")?),
            owner,
            status: status
                .parse()
                .map_err(|error| decode_error("status", error))?,
            adjustments: Adjustments {
                shipping_cost: row.try_get::<Decimal, _>("shipping_cost")?,
                discount_amount: row.try_get::<Decimal, _>("discount_amount")?,
                tax_amount: row.try_get::<Decimal, _>("tax_amount")?,
            },
            currency: CurrencyCode::parse(&currency)
                .map_err(|error| decode_error("currency_code", error))?,
            coupon_code: row.try_get("coupon_code")?,
            discount_notes: row.try_get("discount_notes")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
        }))
    }
}
