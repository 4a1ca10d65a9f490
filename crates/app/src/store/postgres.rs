//! `PostgreSQL` coupon store

use async_trait::async_trait;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, PgPool, Postgres, Row, postgres::PgRow, query, query_as};

use coupons::{
    coupons::{CouponId, CouponRecord, CouponStatus, UserId},
    templates::TemplateId,
};

use crate::store::{CouponStore, CouponStoreError, NewCoupon};

const LOAD_BY_USER_AND_STATUS_SQL: &str = include_str!("sql/load_by_user_and_status.sql");
const LOAD_BY_IDS_SQL: &str = include_str!("sql/load_by_ids.sql");
const INSERT_COUPON_SQL: &str = include_str!("sql/insert_coupon.sql");
const SAVE_COUPON_SQL: &str = include_str!("sql/save_coupon.sql");

/// Raw `coupons` row.
#[derive(Debug)]
struct CouponRow {
    id: i64,
    template_id: i32,
    user_id: i64,
    code: String,
    assigned_at: jiff::Timestamp,
    status: i16,
}

impl<'r> FromRow<'r, PgRow> for CouponRow {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            template_id: row.try_get("template_id")?,
            user_id: row.try_get("user_id")?,
            code: row.try_get("code")?,
            assigned_at: row.try_get::<SqlxTimestamp, _>("assigned_at")?.to_jiff(),
            status: row.try_get("status")?,
        })
    }
}

impl CouponRow {
    fn into_record(self) -> Result<CouponRecord, CouponStoreError> {
        Ok(CouponRecord {
            id: CouponId(u64::try_from(self.id)?),
            template_id: TemplateId(u32::try_from(self.template_id)?),
            user_id: UserId(u64::try_from(self.user_id)?),
            code: self.code,
            assigned_at: self.assigned_at,
            status: CouponStatus::from_code(self.status)
                .ok_or(CouponStoreError::UnknownStatus(self.status))?,
            template: None,
        })
    }
}

fn into_records(rows: Vec<CouponRow>) -> Result<Vec<CouponRecord>, CouponStoreError> {
    rows.into_iter().map(CouponRow::into_record).collect()
}

/// [`CouponStore`] over a `coupons` table.
#[derive(Debug, Clone)]
pub struct PgCouponStore {
    pool: PgPool,
}

impl PgCouponStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn load_by_user_and_status(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Vec<CouponRecord>, CouponStoreError> {
        let rows = query_as::<Postgres, CouponRow>(LOAD_BY_USER_AND_STATUS_SQL)
            .bind(i64::try_from(user.0)?)
            .bind(status.code())
            .fetch_all(&self.pool)
            .await?;

        into_records(rows)
    }

    async fn load_by_ids(&self, ids: &[CouponId]) -> Result<Vec<CouponRecord>, CouponStoreError> {
        let ids = ids
            .iter()
            .map(|id| i64::try_from(id.0))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = query_as::<Postgres, CouponRow>(LOAD_BY_IDS_SQL)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        into_records(rows)
    }

    async fn save(&self, records: Vec<CouponRecord>) -> Result<u64, CouponStoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for record in records {
            let result = query(SAVE_COUPON_SQL)
                .bind(i64::try_from(record.id.0)?)
                .bind(i32::try_from(record.template_id.0)?)
                .bind(i64::try_from(record.user_id.0)?)
                .bind(record.code)
                .bind(SqlxTimestamp::from(record.assigned_at))
                .bind(record.status.code())
                .execute(&mut *tx)
                .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        Ok(written)
    }

    async fn insert(&self, coupon: NewCoupon) -> Result<CouponRecord, CouponStoreError> {
        query_as::<Postgres, CouponRow>(INSERT_COUPON_SQL)
            .bind(i32::try_from(coupon.template_id.0)?)
            .bind(i64::try_from(coupon.user_id.0)?)
            .bind(coupon.code)
            .bind(SqlxTimestamp::from(coupon.assigned_at))
            .bind(CouponStatus::Usable.code())
            .fetch_one(&self.pool)
            .await?
            .into_record()
    }
}
