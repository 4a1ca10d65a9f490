//! Coupon Store
//!
//! The durable record of every coupon. Status changes reach it only through
//! reconciliation.

use std::num::TryFromIntError;

use async_trait::async_trait;
use jiff::Timestamp;
use mockall::automock;
use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

use coupons::{
    coupons::{CouponId, CouponRecord, CouponStatus, UserId},
    templates::TemplateId,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCouponStore;
pub use postgres::PgCouponStore;

/// Coupon store error variants.
#[derive(Debug, Error)]
pub enum CouponStoreError {
    /// Coupon already exists.
    #[error("coupon already exists")]
    AlreadyExists,

    /// Coupon was not found.
    #[error("coupon not found")]
    NotFound,

    /// Required data was missing.
    #[error("missing required data")]
    MissingRequiredData,

    /// Provided data failed validation.
    #[error("invalid data")]
    InvalidData,

    /// A stored status code is not a known status.
    #[error("unknown coupon status code {0}")]
    UnknownStatus(i16),

    /// An identifier does not fit the storage column.
    #[error("identifier out of range")]
    InvalidId(#[from] TryFromIntError),

    /// Underlying SQL/storage error.
    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for CouponStoreError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => Self::Sql(error),
        }
    }
}

/// A coupon about to be assigned to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoupon {
    /// Template the coupon was issued from
    pub template_id: TemplateId,

    /// Receiving user
    pub user_id: UserId,

    /// Redemption code popped from the template's pool
    pub code: String,

    /// When the coupon was handed out
    pub assigned_at: Timestamp,
}

/// Durable coupon storage.
#[automock]
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Coupons of `user` currently in `status`.
    async fn load_by_user_and_status(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Vec<CouponRecord>, CouponStoreError>;

    /// Coupons with the given ids. Unknown ids are skipped.
    async fn load_by_ids(&self, ids: &[CouponId]) -> Result<Vec<CouponRecord>, CouponStoreError>;

    /// Upsert `records`, returning how many rows were written.
    async fn save(&self, records: Vec<CouponRecord>) -> Result<u64, CouponStoreError>;

    /// Persist a newly assigned, usable coupon.
    async fn insert(&self, coupon: NewCoupon) -> Result<CouponRecord, CouponStoreError>;
}
