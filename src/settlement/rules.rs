//! Settlement Rules
//!
//! One rule per supported coupon combination. The combination signature is the sorted
//! list of the chosen coupons' categories; adding a combination means adding a row to
//! [`RULE_TABLE`] and a variant to [`RuleKind`].

use rusty_money::{Money, iso::Currency};

use crate::{
    combinability::can_share,
    pricing::{apply_percentage, at_least},
    settlement::{ChosenCoupon, SettlementError},
    templates::{CouponCategory, Discount},
};

/// Supported combinations, keyed by sorted category signature.
pub const RULE_TABLE: &[(&[CouponCategory], RuleKind)] = &[
    (&[CouponCategory::FlatReduction], RuleKind::FlatReduction),
    (
        &[CouponCategory::PercentageDiscount],
        RuleKind::PercentageDiscount,
    ),
    (
        &[CouponCategory::ThresholdReduction],
        RuleKind::ThresholdReduction,
    ),
    (
        &[
            CouponCategory::ThresholdReduction,
            CouponCategory::PercentageDiscount,
        ],
        RuleKind::ThresholdPercentage,
    ),
];

/// Settlement rule
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuleKind {
    /// `max(sum − amount, floor)`
    FlatReduction,

    /// `max(sum × points / 100, floor)`
    PercentageDiscount,

    /// `max(sum − amount, floor)` once `sum ≥ threshold`, declined otherwise
    ThresholdReduction,

    /// Threshold reduction (when met) followed by the percentage, if the templates
    /// may be combined; declined otherwise
    ThresholdPercentage,
}

/// Result of running a rule against an eligible cart.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<'a> {
    /// The discount applies.
    Applied {
        /// Payable amount
        cost: Money<'a, Currency>,

        /// Coupons that contributed to the discount
        kept: Vec<ChosenCoupon>,
    },

    /// No coupon applies; the goods sum is payable.
    Declined,
}

impl RuleKind {
    /// Look up the rule for the chosen coupons.
    ///
    /// # Errors
    ///
    /// Returns [`SettlementError::UnsupportedCombination`] when no row of [`RULE_TABLE`]
    /// matches the sorted categories of `chosen`.
    pub fn resolve(chosen: &[ChosenCoupon]) -> Result<Self, SettlementError> {
        let mut signature: Vec<CouponCategory> = chosen
            .iter()
            .map(|coupon| coupon.template.category())
            .collect();

        signature.sort_unstable();

        RULE_TABLE
            .iter()
            .find(|(categories, _)| *categories == signature.as_slice())
            .map(|(_, kind)| *kind)
            .ok_or(SettlementError::UnsupportedCombination(signature))
    }

    /// Run the rule against an eligible cart whose goods sum is `sum`.
    ///
    /// # Errors
    ///
    /// Returns an error if money arithmetic fails, or
    /// [`SettlementError::UnsupportedCombination`] if `chosen` does not match this rule.
    pub fn execute<'a>(
        self,
        sum: Money<'a, Currency>,
        chosen: &[ChosenCoupon],
        floor_minor: i64,
    ) -> Result<Outcome<'a>, SettlementError> {
        let currency = sum.currency();

        match (self, discounts(chosen).as_slice()) {
            (Self::FlatReduction, [(coupon, Discount::FlatReduction { amount })]) => {
                let reduced = sum.sub(Money::from_minor(*amount, currency))?;

                Ok(applied(at_least(reduced, floor_minor), coupon))
            }
            (Self::PercentageDiscount, [(coupon, Discount::PercentageDiscount { points })]) => {
                let discounted = apply_percentage(&sum, *points)?;

                Ok(applied(at_least(discounted, floor_minor), coupon))
            }
            (
                Self::ThresholdReduction,
                [(coupon, Discount::ThresholdReduction { threshold, amount })],
            ) => {
                if sum.to_minor_units() < *threshold {
                    return Ok(Outcome::Declined);
                }

                let reduced = sum.sub(Money::from_minor(*amount, currency))?;

                Ok(applied(at_least(reduced, floor_minor), coupon))
            }
            (Self::ThresholdPercentage, pair) => threshold_percentage(sum, pair, floor_minor),
            _ => Err(SettlementError::UnsupportedCombination(
                chosen
                    .iter()
                    .map(|coupon| coupon.template.category())
                    .collect(),
            )),
        }
    }
}

/// Threshold reduction first (only when the threshold is met), then the percentage.
fn threshold_percentage<'a>(
    sum: Money<'a, Currency>,
    pair: &[(&ChosenCoupon, Discount)],
    floor_minor: i64,
) -> Result<Outcome<'a>, SettlementError> {
    let threshold_coupon = pair
        .iter()
        .find_map(|(coupon, discount)| match discount {
            Discount::ThresholdReduction { threshold, amount } => {
                Some((*coupon, *threshold, *amount))
            }
            _ => None,
        });

    let percentage_coupon = pair
        .iter()
        .find_map(|(coupon, discount)| match discount {
            Discount::PercentageDiscount { points } => Some((*coupon, *points)),
            _ => None,
        });

    let (Some((reduction, threshold, amount)), Some((percentage, points)), 2) =
        (threshold_coupon, percentage_coupon, pair.len())
    else {
        return Err(SettlementError::UnsupportedCombination(
            pair.iter().map(|(_, discount)| discount.category()).collect(),
        ));
    };

    if !can_share(&reduction.template, &percentage.template) {
        return Ok(Outcome::Declined);
    }

    let mut kept = Vec::with_capacity(2);
    let mut mid = sum;

    if sum.to_minor_units() >= threshold {
        mid = sum.sub(Money::from_minor(amount, sum.currency()))?;
        kept.push(reduction.clone());
    }

    let discounted = apply_percentage(&mid, points)?;
    kept.push(percentage.clone());

    Ok(Outcome::Applied {
        cost: at_least(discounted, floor_minor),
        kept,
    })
}

fn discounts(chosen: &[ChosenCoupon]) -> Vec<(&ChosenCoupon, Discount)> {
    chosen
        .iter()
        .map(|coupon| (coupon, coupon.template.rule.discount))
        .collect()
}

fn applied<'a>(cost: Money<'a, Currency>, coupon: &ChosenCoupon) -> Outcome<'a> {
    Outcome::Applied {
        cost,
        kept: vec![coupon.clone()],
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rusty_money::iso::CNY;
    use testresult::TestResult;

    use crate::{
        coupons::CouponId,
        tags::string::StringTagCollection,
        templates::{CouponTemplate, ProductLine, TemplateId, TemplateRule, Usage},
    };

    use super::*;

    fn coupon(id: u32, discount: Discount) -> ChosenCoupon {
        ChosenCoupon {
            coupon_id: CouponId(u64::from(id)),
            template: CouponTemplate {
                id: TemplateId(id),
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
                        goods_types: StringTagCollection::from_strs(&["leisure"]),
                    },
                    deadline: Timestamp::MAX,
                    limitation: 1,
                    sharing_keys: vec![
                        "1001201908010001".to_string(),
                        "1001201908010002".to_string(),
                    ],
                },
            },
        }
    }

    #[test]
    fn resolve_is_order_independent() -> TestResult {
        let percentage = coupon(2, Discount::PercentageDiscount { points: 85 });
        let threshold = coupon(
            1,
            Discount::ThresholdReduction {
                threshold: 199_00,
                amount: 20_00,
            },
        );

        assert_eq!(
            RuleKind::resolve(&[percentage.clone(), threshold.clone()])?,
            RuleKind::ThresholdPercentage
        );
        assert_eq!(
            RuleKind::resolve(&[threshold, percentage])?,
            RuleKind::ThresholdPercentage
        );

        Ok(())
    }

    #[test]
    fn resolve_rejects_unknown_signature() {
        let result = RuleKind::resolve(&[
            coupon(1, Discount::FlatReduction { amount: 1 }),
            coupon(2, Discount::PercentageDiscount { points: 50 }),
        ]);

        assert_eq!(
            result,
            Err(SettlementError::UnsupportedCombination(vec![
                CouponCategory::PercentageDiscount,
                CouponCategory::FlatReduction,
            ]))
        );
    }

    #[test]
    fn flat_reduction_never_goes_below_floor() -> TestResult {
        let chosen = [coupon(1, Discount::FlatReduction { amount: 500_00 })];

        let outcome =
            RuleKind::FlatReduction.execute(Money::from_minor(230_56, CNY), &chosen, 1)?;

        assert_eq!(
            outcome,
            Outcome::Applied {
                cost: Money::from_minor(1, CNY),
                kept: chosen.to_vec(),
            }
        );

        Ok(())
    }

    #[test]
    fn composite_below_threshold_keeps_only_percentage() -> TestResult {
        let threshold = coupon(
            1,
            Discount::ThresholdReduction {
                threshold: 500_00,
                amount: 20_00,
            },
        );
        let percentage = coupon(2, Discount::PercentageDiscount { points: 85 });

        let outcome = RuleKind::ThresholdPercentage.execute(
            Money::from_minor(230_56, CNY),
            &[threshold, percentage.clone()],
            1,
        )?;

        assert_eq!(
            outcome,
            Outcome::Applied {
                cost: Money::from_minor(195_98, CNY),
                kept: vec![percentage],
            }
        );

        Ok(())
    }

    #[test]
    fn executing_with_wrong_coupons_is_unsupported() {
        let chosen = [coupon(1, Discount::FlatReduction { amount: 1 })];

        let result =
            RuleKind::PercentageDiscount.execute(Money::from_minor(100, CNY), &chosen, 1);

        assert!(matches!(
            result,
            Err(SettlementError::UnsupportedCombination(_))
        ));
    }
}
