//! Code Pool
//!
//! Each template's redemption codes are generated in one batch and pushed onto a cache
//! list; acquisition pops a single code.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use coupons::{
    codes::{CodeGenerationError, generate_batch},
    templates::{CouponTemplate, TemplateId},
};

use crate::cache::{CacheError, CacheStore};

/// Cache key of a template's code list.
pub fn pool_key(template: TemplateId) -> String {
    format!("coupon_template_code:{template}")
}

/// Code pool errors.
#[derive(Debug, Error)]
pub enum CodePoolError {
    /// No codes left for the template.
    #[error("no codes left for template {0}")]
    Exhausted(TemplateId),

    /// The template's codes were already generated.
    #[error("template {0} is already stocked")]
    AlreadyStocked(TemplateId),

    /// The template's batch could not be generated.
    #[error(transparent)]
    Generation(#[from] CodeGenerationError),

    /// Underlying cache store failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Redemption codes per template.
#[derive(Clone)]
pub struct CodePool {
    store: Arc<dyn CacheStore>,
}

impl std::fmt::Debug for CodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodePool").finish_non_exhaustive()
    }
}

impl CodePool {
    /// Creates a pool over `store`.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Generate `template.count` codes, push them, then mark the template available.
    ///
    /// A template is stocked once; an available template is refused without touching the
    /// pool. Returns the pool length after the push.
    ///
    /// # Errors
    ///
    /// - [`CodePoolError::AlreadyStocked`]: the template is already available.
    /// - [`CodePoolError::Generation`] / [`CodePoolError::Cache`]: generation or the push
    ///   failed; the template is left unavailable.
    pub async fn stock(&self, template: &mut CouponTemplate) -> Result<usize, CodePoolError> {
        if template.available {
            warn!(template = %template.id, "refusing to restock available template");

            return Err(CodePoolError::AlreadyStocked(template.id));
        }

        let batch = generate_batch(template, &mut rand::thread_rng())?;
        let generated = batch.len();

        let len = self.store.list_push(&pool_key(template.id), batch).await?;

        template.available = true;

        info!(template = %template.id, generated, pool = len, "stocked template codes");

        Ok(len)
    }

    /// Take one code for `template`.
    ///
    /// # Errors
    ///
    /// - [`CodePoolError::Exhausted`]: the pool is empty.
    /// - [`CodePoolError::Cache`]: the store failed.
    pub async fn acquire(&self, template: TemplateId) -> Result<String, CodePoolError> {
        match self.store.list_pop(&pool_key(template)).await? {
            Some(code) => Ok(code),
            None => {
                warn!(%template, "code pool exhausted");

                Err(CodePoolError::Exhausted(template))
            }
        }
    }
}
