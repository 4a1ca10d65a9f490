//! Redemption Codes
//!
//! A code is 18 characters: a 4-character prefix (product line code followed by the
//! category code), the template's `yyMMdd` creation date with its digits shuffled, and an
//! 8-character uppercase alphanumeric suffix that starts with a letter.

use jiff::Timestamp;
use rand::{Rng, seq::SliceRandom};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::templates::{CouponCategory, CouponTemplate, ProductLine};

/// Length of a complete redemption code.
pub const CODE_LEN: usize = 18;

const SUFFIX_LEN: usize = 8;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Upper bound on draws per requested code before a batch is abandoned.
const ATTEMPTS_PER_CODE: usize = 16;

/// Errors raised while generating a batch of codes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeGenerationError {
    /// The batch could not reach the requested number of distinct codes.
    #[error("generated {produced} distinct codes out of {requested} requested")]
    AttemptsExhausted {
        /// Distinct codes produced
        produced: usize,

        /// Distinct codes requested
        requested: usize,
    },
}

/// Fixed 4-character prefix for a product line and category.
pub fn code_prefix(product_line: ProductLine, category: CouponCategory) -> String {
    let mut prefix = String::with_capacity(4);

    prefix.push(product_line.code());
    prefix.push_str(category.code());

    prefix
}

/// The `yyMMdd` date segment, before shuffling.
pub fn date_segment(created_at: Timestamp) -> String {
    created_at.strftime("%y%m%d").to_string()
}

/// Build a single code from a prefix and an unshuffled date segment.
pub fn generate_code<R: Rng + ?Sized>(prefix: &str, date: &str, rng: &mut R) -> String {
    let mut shuffled: Vec<char> = date.chars().collect();
    shuffled.shuffle(rng);

    let mut code = String::with_capacity(CODE_LEN);

    code.push_str(prefix);
    code.extend(shuffled);
    code.extend(LETTERS.choose(rng).map(|byte| char::from(*byte)));
    code.extend(
        (1..SUFFIX_LEN).filter_map(|_| ALPHANUMERIC.choose(rng).map(|byte| char::from(*byte))),
    );

    code
}

/// Generate exactly `template.count` distinct codes for a template.
///
/// Draws are retried until the batch reaches the target size.
///
/// # Errors
///
/// Returns [`CodeGenerationError::AttemptsExhausted`] when the target is not reached within
/// a bounded number of draws.
pub fn generate_batch<R: Rng + ?Sized>(
    template: &CouponTemplate,
    rng: &mut R,
) -> Result<Vec<String>, CodeGenerationError> {
    let requested = usize::try_from(template.count).unwrap_or(usize::MAX);

    let prefix = code_prefix(template.product_line, template.category());
    let date = date_segment(template.created_at);

    let mut seen = FxHashSet::default();
    let mut batch = Vec::with_capacity(requested);

    let max_attempts = requested.saturating_mul(ATTEMPTS_PER_CODE);
    let mut attempts = 0_usize;

    while batch.len() < requested {
        if attempts >= max_attempts {
            return Err(CodeGenerationError::AttemptsExhausted {
                produced: batch.len(),
                requested,
            });
        }

        attempts += 1;

        let code = generate_code(&prefix, &date, rng);

        if seen.insert(code.clone()) {
            batch.push(code);
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rand::{SeedableRng, rngs::StdRng};
    use testresult::TestResult;

    use crate::{
        tags::string::StringTagCollection,
        templates::{Discount, TemplateId, TemplateRule, Usage},
    };

    use super::*;

    fn template(count: u32) -> TestResult<CouponTemplate> {
        Ok(CouponTemplate {
            id: TemplateId(3),
            name: "percentage".to_string(),
            key: "200220190712".to_string(),
            product_line: ProductLine::Two,
            count,
            available: false,
            expired: false,
            created_at: "2019-07-12T08:00:00Z".parse()?,
            rule: TemplateRule {
                discount: Discount::PercentageDiscount { points: 85 },
                usage: Usage {
                    region: "Beijing".to_string(),
                    goods_types: StringTagCollection::from_strs(&["leisure"]),
                },
                deadline: Timestamp::MAX,
                limitation: 1,
                sharing_keys: Vec::new(),
            },
        })
    }

    #[test]
    fn prefix_is_product_line_then_category() {
        assert_eq!(
            code_prefix(ProductLine::Two, CouponCategory::PercentageDiscount),
            "2002"
        );
        assert_eq!(
            code_prefix(ProductLine::One, CouponCategory::FlatReduction),
            "1003"
        );
    }

    #[test]
    fn code_layout() -> TestResult {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code("2002", "190712", &mut rng);

        assert_eq!(code.len(), CODE_LEN);
        assert!(code.starts_with("2002"));

        let mut date: Vec<char> = code.chars().skip(4).take(6).collect();
        date.sort_unstable();
        assert_eq!(date, ['0', '1', '1', '2', '7', '9']);

        let suffix: Vec<char> = code.chars().skip(10).collect();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.first().is_some_and(char::is_ascii_uppercase));
        assert!(
            suffix
                .iter()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );

        Ok(())
    }

    #[test]
    fn batch_has_exactly_count_distinct_codes() -> TestResult {
        let mut rng = StdRng::seed_from_u64(42);
        let batch = generate_batch(&template(500)?, &mut rng)?;

        let distinct: FxHashSet<&String> = batch.iter().collect();

        assert_eq!(batch.len(), 500);
        assert_eq!(distinct.len(), 500);
        assert!(batch.iter().all(|code| code.starts_with("2002")));

        Ok(())
    }

    #[test]
    fn empty_batch_for_zero_count() -> TestResult {
        let mut rng = StdRng::seed_from_u64(1);

        assert!(generate_batch(&template(0)?, &mut rng)?.is_empty());

        Ok(())
    }
}
