//! Coupon State Cache
//!
//! Keeps three hash partitions per user (usable, used, expired) keyed by coupon id.
//!
//! An empty partition is ambiguous between "never loaded" and "holds nothing". Every write
//! to a partition, including the first read of one with no fields, stores an explicit
//! [`CachedEntry::Empty`] marker beside the coupons. The marker is never removed, so a
//! partition emptied by a transition still reads as [`Partition::Empty`] and is not
//! reloaded from the durable store before reconciliation catches up. Every write resets the
//! partition's expiry to a random point in the configured band, which spreads expiry across
//! users.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::{debug, warn};

use coupons::coupons::{CachedEntry, CouponId, CouponRecord, CouponStatus, UserId};

use crate::cache::{CacheError, CacheStore, Pipeline};

/// Hash field holding the empty-partition marker. Never a valid coupon id.
pub const EMPTY_FIELD: &str = "empty";

/// Cache key of a user's partition for `status`.
pub fn partition_key(user: UserId, status: CouponStatus) -> String {
    format!("coupons:{status}:{user}")
}

/// State cache errors.
#[derive(Debug, Error)]
pub enum StateCacheError {
    /// Underlying cache store failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A cached value could not be encoded or decoded.
    #[error("failed to encode or decode cached coupon")]
    Encoding(#[from] serde_json::Error),

    /// Some coupons to transition are not in the user's usable partition.
    #[error("coupons not usable: {missing:?}")]
    ConsistencyMismatch {
        /// Coupons absent from the usable partition
        missing: Vec<CouponId>,
    },

    /// Coupons can only move out of the usable partition.
    #[error("cannot transition coupons to {0}")]
    InvalidTarget(CouponStatus),
}

/// Band the partition expiry is drawn from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TtlBand {
    min: Duration,
    max: Duration,
}

impl TtlBand {
    /// Creates a band, swapping the bounds if they are reversed.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Lower bound
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound
    pub fn max(&self) -> Duration {
        self.max
    }

    /// A random whole-second TTL inside the band.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.min.as_secs()..=self.max.as_secs()))
    }
}

impl Default for TtlBand {
    fn default() -> Self {
        Self::new(Duration::from_secs(3_600), Duration::from_secs(7_200))
    }
}

/// What a partition read found.
#[derive(Clone, Debug, PartialEq)]
pub enum Partition {
    /// Nothing was cached. The empty marker has now been written.
    Cold,

    /// The partition was checked before and holds nothing.
    Empty,

    /// Cached coupons, ordered by id.
    Populated(Vec<CouponRecord>),
}

impl Partition {
    /// Cached coupons, empty unless populated.
    pub fn into_records(self) -> Vec<CouponRecord> {
        match self {
            Self::Cold | Self::Empty => Vec::new(),
            Self::Populated(records) => records,
        }
    }
}

/// Per-user coupon partitions on top of a [`CacheStore`].
#[derive(Clone)]
pub struct CouponStateCache {
    store: Arc<dyn CacheStore>,
    ttl: TtlBand,
}

impl std::fmt::Debug for CouponStateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponStateCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CouponStateCache {
    /// Creates a state cache over `store`.
    pub fn new(store: Arc<dyn CacheStore>, ttl: TtlBand) -> Self {
        Self { store, ttl }
    }

    /// Read a partition, writing the empty marker if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a cached value cannot be decoded.
    pub async fn lookup(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Partition, StateCacheError> {
        let key = partition_key(user, status);
        let fields = self.store.hash_get_all(&key).await?;

        if fields.is_empty() {
            let pipeline = Pipeline::new()
                .hash_set(&key, vec![empty_entry()?])
                .expire(&key, self.next_ttl());

            self.store.execute(pipeline).await?;

            debug!(%user, %status, "wrote empty marker to cold partition");

            return Ok(Partition::Cold);
        }

        let records = decode(fields)?;

        if records.is_empty() {
            return Ok(Partition::Empty);
        }

        Ok(Partition::Populated(records))
    }

    /// Cached coupons of `user` in `status`, with the empty marker stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a cached value cannot be decoded.
    pub async fn get_by_status(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Vec<CouponRecord>, StateCacheError> {
        Ok(self.lookup(user, status).await?.into_records())
    }

    /// Upsert `records` into a partition, alongside the empty marker, and reset its expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a record cannot be encoded.
    pub async fn fill(
        &self,
        user: UserId,
        status: CouponStatus,
        records: Vec<CouponRecord>,
    ) -> Result<(), StateCacheError> {
        let key = partition_key(user, status);
        let count = records.len();

        let pipeline = Pipeline::new()
            .hash_set(&key, with_marker(encode(records, status)?)?)
            .expire(&key, self.next_ttl());

        self.store.execute(pipeline).await?;

        debug!(%user, %status, count, "filled partition");

        Ok(())
    }

    /// Upsert `records` into the usable partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a record cannot be encoded.
    pub async fn add_usable(
        &self,
        user: UserId,
        records: Vec<CouponRecord>,
    ) -> Result<(), StateCacheError> {
        self.fill(user, CouponStatus::Usable, records).await
    }

    /// Move `records` from the usable partition into `target`.
    ///
    /// The insert into `target`, the removal from usable and both expiry resets are one
    /// pipeline. Both partitions keep the empty marker, so moving the last usable coupon
    /// out leaves an empty usable partition rather than a cold one. Nothing is written
    /// unless every record is currently usable.
    ///
    /// # Errors
    ///
    /// - [`StateCacheError::InvalidTarget`]: `target` is [`CouponStatus::Usable`].
    /// - [`StateCacheError::ConsistencyMismatch`]: a record is not in the usable partition.
    pub async fn transition(
        &self,
        user: UserId,
        records: Vec<CouponRecord>,
        target: CouponStatus,
    ) -> Result<(), StateCacheError> {
        if target == CouponStatus::Usable {
            return Err(StateCacheError::InvalidTarget(target));
        }

        if records.is_empty() {
            return Ok(());
        }

        let usable_key = partition_key(user, CouponStatus::Usable);
        let target_key = partition_key(user, target);

        let current: FxHashSet<CouponId> = decode(self.store.hash_get_all(&usable_key).await?)?
            .into_iter()
            .map(|record| record.id)
            .collect();

        let missing: Vec<CouponId> = records
            .iter()
            .map(|record| record.id)
            .filter(|id| !current.contains(id))
            .collect();

        if !missing.is_empty() {
            warn!(%user, %target, ?missing, "refusing transition of coupons not in usable partition");

            return Err(StateCacheError::ConsistencyMismatch { missing });
        }

        let ids: Vec<String> = records.iter().map(|record| record.id.to_string()).collect();
        let count = ids.len();

        let pipeline = Pipeline::new()
            .hash_set(&target_key, with_marker(encode(records, target)?)?)
            .hash_delete(&usable_key, ids)
            .hash_set(&usable_key, vec![empty_entry()?])
            .expire(&target_key, self.next_ttl())
            .expire(&usable_key, self.next_ttl());

        self.store.execute(pipeline).await?;

        debug!(%user, %target, count, "transitioned coupons");

        Ok(())
    }

    fn next_ttl(&self) -> Duration {
        self.ttl.sample(&mut rand::thread_rng())
    }
}

fn empty_entry() -> Result<(String, String), serde_json::Error> {
    Ok((
        EMPTY_FIELD.to_string(),
        serde_json::to_string(&CachedEntry::Empty)?,
    ))
}

fn with_marker(
    mut entries: Vec<(String, String)>,
) -> Result<Vec<(String, String)>, serde_json::Error> {
    entries.push(empty_entry()?);

    Ok(entries)
}

fn encode(
    records: Vec<CouponRecord>,
    status: CouponStatus,
) -> Result<Vec<(String, String)>, serde_json::Error> {
    records
        .into_iter()
        .map(|record| {
            let record = record.with_status(status);

            Ok((
                record.id.to_string(),
                serde_json::to_string(&CachedEntry::Coupon(record))?,
            ))
        })
        .collect()
}

fn decode(fields: FxHashMap<String, String>) -> Result<Vec<CouponRecord>, serde_json::Error> {
    let mut records = fields
        .into_values()
        .map(|value| serde_json::from_str::<CachedEntry>(&value))
        .filter_map(|entry| entry.map(CachedEntry::into_coupon).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    records.sort_by_key(|record| record.id);

    Ok(records)
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use testresult::TestResult;

    use coupons::templates::TemplateId;

    use crate::cache::{CacheOp, InMemoryCacheStore, MockCacheStore};

    use super::*;

    const USER: UserId = UserId(20_001);

    fn coupon(id: u64) -> CouponRecord {
        CouponRecord {
            id: CouponId(id),
            template_id: TemplateId(1),
            user_id: USER,
            code: format!("1003190801ABCDEFG{id}"),
            assigned_at: Timestamp::UNIX_EPOCH,
            status: CouponStatus::Usable,
            template: None,
        }
    }

    fn cache() -> (Arc<InMemoryCacheStore>, CouponStateCache) {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = CouponStateCache::new(store.clone(), TtlBand::default());

        (store, cache)
    }

    #[tokio::test]
    async fn cold_partition_writes_marker_once() -> TestResult {
        let mut store = MockCacheStore::new();
        let marker = empty_entry()?;

        let mut reads = 0;
        store.expect_hash_get_all().times(2).returning(move |_| {
            reads += 1;

            if reads == 1 {
                return Ok(FxHashMap::default());
            }

            Ok(FxHashMap::from_iter([marker.clone()]))
        });

        store.expect_execute().times(1).returning(|pipeline| {
            assert!(matches!(
                pipeline.ops(),
                [CacheOp::HashSet { .. }, CacheOp::Expire { .. }]
            ));

            Ok(())
        });

        let cache = CouponStateCache::new(Arc::new(store), TtlBand::default());

        assert_eq!(cache.lookup(USER, CouponStatus::Usable).await?, Partition::Cold);
        assert_eq!(cache.lookup(USER, CouponStatus::Usable).await?, Partition::Empty);

        Ok(())
    }

    #[tokio::test]
    async fn repeated_cold_reads_return_nothing() -> TestResult {
        let (_store, cache) = cache();

        for _ in 0..3 {
            assert!(cache.get_by_status(USER, CouponStatus::Used).await?.is_empty());
        }

        Ok(())
    }

    #[tokio::test]
    async fn filling_keeps_marker_beside_coupons() -> TestResult {
        let (store, cache) = cache();

        assert_eq!(cache.lookup(USER, CouponStatus::Usable).await?, Partition::Cold);

        cache.add_usable(USER, vec![coupon(2), coupon(1)]).await?;

        let fields = store
            .hash_get_all(&partition_key(USER, CouponStatus::Usable))
            .await?;

        assert!(fields.contains_key(EMPTY_FIELD));
        assert_eq!(fields.len(), 3);
        assert_eq!(
            cache.lookup(USER, CouponStatus::Usable).await?,
            Partition::Populated(vec![coupon(1), coupon(2)])
        );

        Ok(())
    }

    #[tokio::test]
    async fn add_usable_is_idempotent() -> TestResult {
        let (_store, cache) = cache();

        cache.add_usable(USER, vec![coupon(1)]).await?;
        cache.add_usable(USER, vec![coupon(1)]).await?;

        assert_eq!(
            cache.get_by_status(USER, CouponStatus::Usable).await?,
            vec![coupon(1)]
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn writes_set_ttl_within_band() -> TestResult {
        let (store, cache) = cache();

        cache.add_usable(USER, vec![coupon(1)]).await?;

        let ttl = store
            .ttl(&partition_key(USER, CouponStatus::Usable))
            .await
            .ok_or("partition has no expiry")?;

        assert!(ttl >= Duration::from_secs(3_600));
        assert!(ttl <= Duration::from_secs(7_200));

        Ok(())
    }

    #[tokio::test]
    async fn transition_moves_between_partitions() -> TestResult {
        let (_store, cache) = cache();

        cache
            .add_usable(USER, vec![coupon(1), coupon(2), coupon(3)])
            .await?;

        cache
            .transition(USER, vec![coupon(1), coupon(3)], CouponStatus::Used)
            .await?;

        assert_eq!(
            cache.get_by_status(USER, CouponStatus::Usable).await?,
            vec![coupon(2)]
        );
        assert_eq!(
            cache.get_by_status(USER, CouponStatus::Used).await?,
            vec![
                coupon(1).with_status(CouponStatus::Used),
                coupon(3).with_status(CouponStatus::Used),
            ]
        );

        Ok(())
    }

    #[tokio::test]
    async fn moving_the_last_usable_coupon_leaves_an_empty_partition() -> TestResult {
        let (_store, cache) = cache();

        cache.add_usable(USER, vec![coupon(1)]).await?;

        cache
            .transition(USER, vec![coupon(1)], CouponStatus::Used)
            .await?;

        assert_eq!(
            cache.lookup(USER, CouponStatus::Usable).await?,
            Partition::Empty
        );
        assert_eq!(
            cache.lookup(USER, CouponStatus::Used).await?,
            Partition::Populated(vec![coupon(1).with_status(CouponStatus::Used)])
        );

        Ok(())
    }

    #[tokio::test]
    async fn transition_of_unknown_coupon_leaves_partitions_unchanged() -> TestResult {
        let (_store, cache) = cache();

        cache.add_usable(USER, vec![coupon(1), coupon(2)]).await?;

        let result = cache
            .transition(USER, vec![coupon(1), coupon(9)], CouponStatus::Expired)
            .await;

        assert!(matches!(
            result,
            Err(StateCacheError::ConsistencyMismatch { missing }) if missing == [CouponId(9)]
        ));
        assert_eq!(
            cache.get_by_status(USER, CouponStatus::Usable).await?,
            vec![coupon(1), coupon(2)]
        );
        assert_eq!(
            cache.lookup(USER, CouponStatus::Expired).await?,
            Partition::Cold
        );

        Ok(())
    }

    #[tokio::test]
    async fn transition_to_usable_is_rejected() {
        let (_store, cache) = cache();

        let result = cache
            .transition(USER, vec![coupon(1)], CouponStatus::Usable)
            .await;

        assert!(matches!(
            result,
            Err(StateCacheError::InvalidTarget(CouponStatus::Usable))
        ));
    }

    #[test]
    fn ttl_band_samples_inside_bounds() {
        let band = TtlBand::new(Duration::from_secs(20), Duration::from_secs(10));
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let ttl = band.sample(&mut rng);

            assert!(ttl >= Duration::from_secs(10) && ttl <= Duration::from_secs(20));
        }
    }
}
