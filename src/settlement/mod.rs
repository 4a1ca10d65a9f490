//! Settlement
//!
//! Computes what the customer pays for a cart given the coupons they chose. The categories
//! of the chosen coupons select exactly one rule from [`rules::RULE_TABLE`]; every rule
//! shares the same preamble (goods sum, goods-type eligibility) and every monetary figure
//! is rounded to the minor unit as soon as it is produced.
//!
//! A cart the chosen coupons cannot be applied to is not an error: the result carries the
//! undiscounted goods sum and an empty coupon list.

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::{
    coupons::{CouponId, UserId},
    goods::{GoodsItem, goods_types},
    pricing::{PriceError, goods_sum},
    tags::string::StringTagCollection,
    templates::{CouponCategory, CouponTemplate},
};

pub mod rules;

pub use rules::{Outcome, RuleKind};

/// Errors that can occur while settling a cart.
#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    /// The chosen coupons' categories match no known rule.
    #[error("unsupported coupon combination: {0:?}")]
    UnsupportedCombination(Vec<CouponCategory>),

    /// Errors bubbled up from price calculation.
    #[error(transparent)]
    Price(#[from] PriceError),

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// A coupon the customer chose to redeem, with its template.
#[derive(Clone, Debug, PartialEq)]
pub struct ChosenCoupon {
    /// The coupon being redeemed
    pub coupon_id: CouponId,

    /// Template the coupon was issued from
    pub template: CouponTemplate,
}

/// A cart with the coupons chosen against it.
///
/// After settlement `cost` holds the payable amount and `chosen` holds only the coupons
/// that were actually applied.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementRequest<'a> {
    /// Customer
    pub user_id: UserId,

    /// Cart lines
    pub goods: Vec<GoodsItem<'a>>,

    /// Coupons chosen for redemption
    pub chosen: Vec<ChosenCoupon>,

    /// Payable amount, set by settlement
    pub cost: Option<Money<'a, Currency>>,
}

impl<'a> SettlementRequest<'a> {
    /// Creates an unsettled request.
    pub fn new(user_id: UserId, goods: Vec<GoodsItem<'a>>, chosen: Vec<ChosenCoupon>) -> Self {
        Self {
            user_id,
            goods,
            chosen,
            cost: None,
        }
    }

    /// Ids of the chosen coupons.
    pub fn coupon_ids(&self) -> Vec<CouponId> {
        self.chosen.iter().map(|coupon| coupon.coupon_id).collect()
    }
}

/// Settlement configuration
#[derive(Copy, Clone, Debug)]
pub struct SettlementConfig<'a> {
    /// Currency every cart is settled in
    pub currency: &'a Currency,

    /// Minimum payable amount in minor units
    pub min_cost_minor: i64,
}

/// Dispatches a settlement request to the rule for its coupon combination.
#[derive(Copy, Clone, Debug)]
pub struct SettlementEngine<'a> {
    config: SettlementConfig<'a>,
}

impl<'a> SettlementEngine<'a> {
    /// Creates an engine with the given configuration.
    pub fn new(config: SettlementConfig<'a>) -> Self {
        Self { config }
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &SettlementConfig<'a> {
        &self.config
    }

    /// Settle a cart.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::UnsupportedCombination`]: the chosen coupons' categories match no rule.
    /// - [`SettlementError::Price`] / [`SettlementError::Money`]: price arithmetic failed,
    ///   for example because a goods line is priced in another currency.
    pub fn settle(
        &self,
        mut request: SettlementRequest<'a>,
    ) -> Result<SettlementRequest<'a>, SettlementError> {
        let sum = goods_sum(&request.goods, self.config.currency)?;

        if request.chosen.is_empty() {
            request.cost = Some(sum);

            return Ok(request);
        }

        let rule = RuleKind::resolve(&request.chosen)?;

        let outcome = if is_eligible(&request.goods, &request.chosen) {
            rule.execute(sum, &request.chosen, self.config.min_cost_minor)?
        } else {
            Outcome::Declined
        };

        match outcome {
            Outcome::Applied { cost, kept } => {
                request.cost = Some(cost);
                request.chosen = kept;
            }
            Outcome::Declined => {
                request.cost = Some(sum);
                request.chosen.clear();
            }
        }

        Ok(request)
    }
}

/// Whether the chosen templates together cover every goods type in the cart.
pub fn is_eligible(goods: &[GoodsItem<'_>], chosen: &[ChosenCoupon]) -> bool {
    let allowed = chosen
        .iter()
        .fold(StringTagCollection::empty(), |acc, coupon| {
            acc | coupon.template.rule.usage.goods_types.clone()
        });

    goods_types(goods).is_subset(&allowed)
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rusty_money::iso::{CNY, USD};
    use testresult::TestResult;

    use crate::templates::{Discount, ProductLine, TemplateId, TemplateRule, Usage};

    use super::*;

    fn engine() -> SettlementEngine<'static> {
        SettlementEngine::new(SettlementConfig {
            currency: CNY,
            min_cost_minor: 1,
        })
    }

    fn coupon(id: u64, discount: Discount, goods_types: &[&str]) -> ChosenCoupon {
        ChosenCoupon {
            coupon_id: CouponId(id),
            template: CouponTemplate {
                id: TemplateId(u32::try_from(id).unwrap_or_default()),
                name: "template".to_string(),
                key: "100120190801".to_string(),
                product_line: ProductLine::One,
                count: 10,
                available: true,
                expired: false,
                created_at: Timestamp::UNIX_EPOCH,
                rule: TemplateRule {
                    discount,
                    usage: Usage {
                        region: "Beijing".to_string(),
                        goods_types: StringTagCollection::from_strs(goods_types),
                    },
                    deadline: Timestamp::MAX,
                    limitation: 1,
                    sharing_keys: Vec::new(),
                },
            },
        }
    }

    fn cart() -> Vec<GoodsItem<'static>> {
        vec![
            GoodsItem::new(Money::from_minor(10_88, CNY), 2, "leisure"),
            GoodsItem::new(Money::from_minor(20_88, CNY), 10, "leisure"),
        ]
    }

    #[test]
    fn no_coupons_pays_goods_sum() -> TestResult {
        let result = engine().settle(SettlementRequest::new(UserId(1), cart(), Vec::new()))?;

        assert_eq!(result.cost, Some(Money::from_minor(230_56, CNY)));

        Ok(())
    }

    #[test]
    fn duplicate_categories_are_unsupported() {
        let chosen = vec![
            coupon(1, Discount::FlatReduction { amount: 1_00 }, &["leisure"]),
            coupon(2, Discount::FlatReduction { amount: 2_00 }, &["leisure"]),
        ];

        let result = engine().settle(SettlementRequest::new(UserId(1), cart(), chosen));

        assert_eq!(
            result,
            Err(SettlementError::UnsupportedCombination(vec![
                CouponCategory::FlatReduction,
                CouponCategory::FlatReduction,
            ]))
        );
    }

    #[test]
    fn unsupported_combination_is_reported_before_eligibility() {
        let chosen = vec![
            coupon(1, Discount::FlatReduction { amount: 1_00 }, &["furniture"]),
            coupon(2, Discount::PercentageDiscount { points: 90 }, &["furniture"]),
        ];

        let result = engine().settle(SettlementRequest::new(UserId(1), cart(), chosen));

        assert!(matches!(
            result,
            Err(SettlementError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn eligibility_uses_union_of_template_goods_types() {
        let goods = vec![
            GoodsItem::new(Money::from_minor(1_00, CNY), 1, "leisure"),
            GoodsItem::new(Money::from_minor(1_00, CNY), 1, "furniture"),
        ];
        let chosen = vec![
            coupon(
                1,
                Discount::ThresholdReduction {
                    threshold: 1_00,
                    amount: 50,
                },
                &["leisure"],
            ),
            coupon(2, Discount::PercentageDiscount { points: 90 }, &["furniture"]),
        ];

        assert!(is_eligible(&goods, &chosen));
        let first_only: Vec<_> = chosen.iter().take(1).cloned().collect();

        assert!(!is_eligible(&goods, &first_only));
    }

    #[test]
    fn mismatched_currency_is_an_error() {
        let goods = vec![GoodsItem::new(Money::from_minor(1_00, USD), 1, "leisure")];
        let chosen = vec![coupon(1, Discount::FlatReduction { amount: 10 }, &["leisure"])];

        let result = engine().settle(SettlementRequest::new(UserId(1), goods, chosen));

        assert!(matches!(result, Err(SettlementError::Price(_))));
    }
}
