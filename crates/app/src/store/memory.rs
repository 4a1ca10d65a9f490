//! In-memory coupon store

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use coupons::coupons::{CouponId, CouponRecord, CouponStatus, UserId};

use crate::store::{CouponStore, CouponStoreError, NewCoupon};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<CouponId, CouponRecord>,
    next_id: u64,
}

/// Process-local [`CouponStore`], ordered by coupon id.
#[derive(Debug, Default)]
pub struct InMemoryCouponStore {
    table: Mutex<Table>,
}

impl InMemoryCouponStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `records`.
    pub fn with_records(records: impl IntoIterator<Item = CouponRecord>) -> Self {
        let rows: BTreeMap<CouponId, CouponRecord> = records
            .into_iter()
            .map(|mut record| {
                record.template = None;

                (record.id, record)
            })
            .collect();

        let next_id = rows.keys().last().map_or(0, |id| id.0);

        Self {
            table: Mutex::new(Table { rows, next_id }),
        }
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn load_by_user_and_status(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Vec<CouponRecord>, CouponStoreError> {
        let table = self.table.lock().await;

        Ok(table
            .rows
            .values()
            .filter(|record| record.user_id == user && record.status == status)
            .cloned()
            .collect())
    }

    async fn load_by_ids(&self, ids: &[CouponId]) -> Result<Vec<CouponRecord>, CouponStoreError> {
        let table = self.table.lock().await;

        let mut records: Vec<CouponRecord> = ids
            .iter()
            .filter_map(|id| table.rows.get(id))
            .cloned()
            .collect();

        records.sort_by_key(|record| record.id);
        records.dedup_by_key(|record| record.id);

        Ok(records)
    }

    async fn save(&self, records: Vec<CouponRecord>) -> Result<u64, CouponStoreError> {
        let mut table = self.table.lock().await;
        let mut written = 0;

        for mut record in records {
            record.template = None;
            table.next_id = table.next_id.max(record.id.0);
            table.rows.insert(record.id, record);
            written += 1;
        }

        Ok(written)
    }

    async fn insert(&self, coupon: NewCoupon) -> Result<CouponRecord, CouponStoreError> {
        let mut table = self.table.lock().await;

        if table.rows.values().any(|record| record.code == coupon.code) {
            return Err(CouponStoreError::AlreadyExists);
        }

        table.next_id += 1;

        let record = CouponRecord {
            id: CouponId(table.next_id),
            template_id: coupon.template_id,
            user_id: coupon.user_id,
            code: coupon.code,
            assigned_at: coupon.assigned_at,
            status: CouponStatus::Usable,
            template: None,
        };

        table.rows.insert(record.id, record.clone());

        Ok(record)
    }
}
