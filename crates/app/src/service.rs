//! Coupons service.
//!
//! The user-facing flows: listing a user's coupons, listing the templates they may still
//! acquire, acquiring a coupon and settling a cart.

use std::sync::Arc;

use jiff::Timestamp;
use rustc_hash::{FxHashMap, FxHashSet};
use rusty_money::iso::Currency;
use thiserror::Error;
use tracing::{info, warn};

use coupons::{
    coupons::{Classified, CouponId, CouponRecord, CouponStatus, UserId, classify},
    settlement::{SettlementConfig, SettlementEngine, SettlementError, SettlementRequest},
    templates::{CouponTemplate, TemplateId},
};

use crate::{
    catalogue::{CatalogueError, TemplateCatalogue},
    codes::{CodePool, CodePoolError},
    reconciliation::{ChannelError, MessageChannel, StatusChangeEvent},
    state::{CouponStateCache, Partition, StateCacheError},
    store::{CouponStore, CouponStoreError, NewCoupon},
};

/// Coupons service error variants.
#[derive(Debug, Error)]
pub enum CouponsServiceError {
    /// Template does not exist.
    #[error("template not found: {0}")]
    NotFound(TemplateId),

    /// The user already holds as many usable coupons of the template as allowed.
    #[error("user already holds {limitation} coupons of template {template}")]
    LimitExceeded {
        /// Template requested
        template: TemplateId,

        /// Per-user holding limit
        limitation: u32,
    },

    /// No codes left for the template.
    #[error("no codes left for template {0}")]
    Exhausted(TemplateId),

    /// Chosen coupons are not in the user's usable set.
    #[error("coupons not usable: {missing:?}")]
    ConsistencyMismatch {
        /// Coupons the user does not hold as usable
        missing: Vec<CouponId>,
    },

    /// Settlement failed.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// State cache failure.
    #[error(transparent)]
    StateCache(StateCacheError),

    /// Code pool failure other than exhaustion.
    #[error(transparent)]
    CodePool(CodePoolError),

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] CouponStoreError),

    /// Catalogue failure.
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    /// Publishing a status change failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl From<CodePoolError> for CouponsServiceError {
    fn from(error: CodePoolError) -> Self {
        match error {
            CodePoolError::Exhausted(template) => Self::Exhausted(template),
            CodePoolError::AlreadyStocked(_)
            | CodePoolError::Generation(_)
            | CodePoolError::Cache(_) => Self::CodePool(error),
        }
    }
}

impl From<StateCacheError> for CouponsServiceError {
    fn from(error: StateCacheError) -> Self {
        match error {
            StateCacheError::ConsistencyMismatch { missing } => {
                Self::ConsistencyMismatch { missing }
            }
            StateCacheError::Cache(_)
            | StateCacheError::Encoding(_)
            | StateCacheError::InvalidTarget(_) => Self::StateCache(error),
        }
    }
}

/// Settings shared by every flow.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Topic status changes are published on
    pub topic: String,

    /// Currency carts are settled in
    pub currency: &'static Currency,

    /// Minimum payable amount in minor units
    pub min_cost_minor: i64,
}

/// Orchestrates the state cache, code pool, durable store, catalogue and channel.
#[derive(Clone)]
pub struct CouponsService {
    cache: CouponStateCache,
    codes: CodePool,
    store: Arc<dyn CouponStore>,
    catalogue: Arc<dyn TemplateCatalogue>,
    channel: Arc<dyn MessageChannel>,
    settings: ServiceSettings,
}

impl std::fmt::Debug for CouponsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponsService")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl CouponsService {
    /// Creates a service from its collaborators.
    #[must_use]
    pub fn new(
        cache: CouponStateCache,
        codes: CodePool,
        store: Arc<dyn CouponStore>,
        catalogue: Arc<dyn TemplateCatalogue>,
        channel: Arc<dyn MessageChannel>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            cache,
            codes,
            store,
            catalogue,
            channel,
            settings,
        }
    }

    /// The user's coupons in `status`.
    ///
    /// A cold partition is loaded from the durable store. Usable coupons whose template
    /// deadline has passed at `now` are moved to the expired partition, the change is
    /// published, and they are left out of the result.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator fails.
    pub async fn find_coupons_by_status(
        &self,
        user: UserId,
        status: CouponStatus,
        now: Timestamp,
    ) -> Result<Vec<CouponRecord>, CouponsServiceError> {
        let records = match self.cache.lookup(user, status).await? {
            Partition::Populated(records) => records,
            Partition::Empty => Vec::new(),
            Partition::Cold => self.load_partition(user, status).await?,
        };

        if status != CouponStatus::Usable {
            return Ok(records);
        }

        let Classified { usable, expired } = classify(records, now);

        if !expired.is_empty() {
            let ids: Vec<CouponId> = expired.iter().map(|record| record.id).collect();

            self.cache
                .transition(user, expired, CouponStatus::Expired)
                .await?;

            info!(%user, expired = ids.len(), "expired coupons found on read");

            self.publish(StatusChangeEvent::new(CouponStatus::Expired, ids))
                .await?;
        }

        Ok(usable)
    }

    /// Usable templates the user may still acquire at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator fails.
    pub async fn find_available_templates(
        &self,
        user: UserId,
        now: Timestamp,
    ) -> Result<Vec<CouponTemplate>, CouponsServiceError> {
        let templates = self.catalogue.find_usable_templates().await?;
        let held = holdings(
            &self
                .find_coupons_by_status(user, CouponStatus::Usable, now)
                .await?,
        );

        Ok(templates
            .into_iter()
            .filter(|template| !template.is_past_deadline(now))
            .filter(|template| {
                held.get(&template.id).copied().unwrap_or_default() < template.rule.limitation
            })
            .collect())
    }

    /// Give the user a coupon of `template`.
    ///
    /// # Errors
    ///
    /// - [`CouponsServiceError::NotFound`]: the template does not exist.
    /// - [`CouponsServiceError::LimitExceeded`]: the user is at the template's limit.
    /// - [`CouponsServiceError::Exhausted`]: the template has no codes left.
    pub async fn acquire_template(
        &self,
        user: UserId,
        template: TemplateId,
        now: Timestamp,
    ) -> Result<CouponRecord, CouponsServiceError> {
        let template = self
            .catalogue
            .find_templates_by_ids(&[template])
            .await?
            .remove(&template)
            .ok_or(CouponsServiceError::NotFound(template))?;

        let held = holdings(
            &self
                .find_coupons_by_status(user, CouponStatus::Usable, now)
                .await?,
        );

        if held.get(&template.id).copied().unwrap_or_default() >= template.rule.limitation {
            return Err(CouponsServiceError::LimitExceeded {
                template: template.id,
                limitation: template.rule.limitation,
            });
        }

        let code = self.codes.acquire(template.id).await?;

        let mut record = self
            .store
            .insert(NewCoupon {
                template_id: template.id,
                user_id: user,
                code,
                assigned_at: now,
            })
            .await?;

        record.template = Some(template);

        self.cache.add_usable(user, vec![record.clone()]).await?;

        info!(%user, coupon = %record.id, template = %record.template_id, "coupon acquired");

        Ok(record)
    }

    /// Settle a cart against the user's usable coupons.
    ///
    /// Each chosen coupon is priced with the template snapshot held on the user's own
    /// record, whatever template the request carried. With `confirm` set, coupons the
    /// settlement applied become used and the change is published.
    ///
    /// # Errors
    ///
    /// - [`CouponsServiceError::ConsistencyMismatch`]: a chosen coupon is not usable, or
    ///   its template snapshot is unknown.
    /// - [`CouponsServiceError::Settlement`]: the combination is unsupported or pricing failed.
    pub async fn settle<'a>(
        &self,
        mut request: SettlementRequest<'a>,
        confirm: bool,
        now: Timestamp,
    ) -> Result<SettlementRequest<'a>, CouponsServiceError> {
        let user = request.user_id;
        let usable = self
            .find_coupons_by_status(user, CouponStatus::Usable, now)
            .await?;

        let missing: Vec<CouponId> = {
            let held: FxHashMap<CouponId, &CouponRecord> =
                usable.iter().map(|record| (record.id, record)).collect();

            request
                .chosen
                .iter_mut()
                .filter_map(|chosen| {
                    let Some(template) = held
                        .get(&chosen.coupon_id)
                        .and_then(|record| record.template.as_ref())
                    else {
                        return Some(chosen.coupon_id);
                    };

                    if template.id != chosen.template.id {
                        warn!(
                            %user,
                            coupon = %chosen.coupon_id,
                            held = %template.id,
                            sent = %chosen.template.id,
                            "chosen coupon sent with another template"
                        );
                    }

                    chosen.template = template.clone();

                    None
                })
                .collect()
        };

        if !missing.is_empty() {
            warn!(%user, ?missing, "settlement with coupons the user cannot use");

            return Err(CouponsServiceError::ConsistencyMismatch { missing });
        }

        let engine = SettlementEngine::new(SettlementConfig {
            currency: self.settings.currency,
            min_cost_minor: self.settings.min_cost_minor,
        });

        let settled = engine.settle(request)?;

        if confirm && !settled.chosen.is_empty() {
            let applied: FxHashSet<CouponId> = settled.coupon_ids().into_iter().collect();
            let used: Vec<CouponRecord> = usable
                .into_iter()
                .filter(|record| applied.contains(&record.id))
                .collect();
            let ids: Vec<CouponId> = used.iter().map(|record| record.id).collect();

            self.cache.transition(user, used, CouponStatus::Used).await?;

            info!(%user, used = ids.len(), "settlement confirmed");

            self.publish(StatusChangeEvent::new(CouponStatus::Used, ids))
                .await?;
        }

        Ok(settled)
    }

    async fn load_partition(
        &self,
        user: UserId,
        status: CouponStatus,
    ) -> Result<Vec<CouponRecord>, CouponsServiceError> {
        let loaded = self.store.load_by_user_and_status(user, status).await?;

        if loaded.is_empty() {
            return Ok(loaded);
        }

        let records = self.attach_templates(loaded).await?;

        self.cache.fill(user, status, records.clone()).await?;

        Ok(records)
    }

    async fn attach_templates(
        &self,
        mut records: Vec<CouponRecord>,
    ) -> Result<Vec<CouponRecord>, CouponsServiceError> {
        let ids: Vec<TemplateId> = records
            .iter()
            .map(|record| record.template_id)
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();

        let templates = self.catalogue.find_templates_by_ids(&ids).await?;

        for record in &mut records {
            record.template = templates.get(&record.template_id).cloned();

            if record.template.is_none() {
                warn!(coupon = %record.id, template = %record.template_id, "coupon template missing from catalogue");
            }
        }

        Ok(records)
    }

    async fn publish(&self, event: StatusChangeEvent) -> Result<(), CouponsServiceError> {
        self.channel.publish(&self.settings.topic, event).await?;

        Ok(())
    }
}

/// Usable coupon count per template.
fn holdings(records: &[CouponRecord]) -> FxHashMap<TemplateId, u32> {
    let mut held = FxHashMap::default();

    for record in records {
        *held.entry(record.template_id).or_insert(0_u32) += 1;
    }

    held
}
