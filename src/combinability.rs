//! Combinability
//!
//! Two coupons may be redeemed together when either template lists the pair as shareable.
//! One side whitelisting the other is enough; consent does not have to be mutual.

use crate::templates::CouponTemplate;

/// Whether coupons of templates `a` and `b` may be redeemed in the same settlement.
///
/// The pair `{a.own_key(), b.own_key()}` must be contained in `a`'s own key plus its
/// sharing keys, or in `b`'s own key plus its sharing keys.
pub fn can_share(a: &CouponTemplate, b: &CouponTemplate) -> bool {
    let a_key = a.own_key();
    let b_key = b.own_key();

    admits(a, &a_key, &b_key) || admits(b, &b_key, &a_key)
}

/// Whether `template` (whose own key is `own`) covers the pair `{own, other}`.
fn admits(template: &CouponTemplate, own: &str, other: &str) -> bool {
    own == other || template.rule.sharing_keys.iter().any(|key| key == other)
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use crate::{
        tags::string::StringTagCollection,
        templates::{Discount, ProductLine, TemplateId, TemplateRule, Usage},
    };

    use super::*;

    fn template(id: u32, key: &str, discount: Discount, sharing_keys: &[&str]) -> CouponTemplate {
        CouponTemplate {
            id: TemplateId(id),
            name: format!("template {id}"),
            key: key.to_string(),
            product_line: ProductLine::One,
            count: 100,
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
                sharing_keys: sharing_keys.iter().map(ToString::to_string).collect(),
            },
        }
    }

    fn threshold(sharing_keys: &[&str]) -> CouponTemplate {
        template(
            1,
            "100120190801",
            Discount::ThresholdReduction {
                threshold: 199_00,
                amount: 20_00,
            },
            sharing_keys,
        )
    }

    fn percentage(sharing_keys: &[&str]) -> CouponTemplate {
        template(
            2,
            "100220190712",
            Discount::PercentageDiscount { points: 85 },
            sharing_keys,
        )
    }

    #[test]
    fn shareable_when_both_sides_list_each_other() {
        let a = threshold(&["1002201907120002"]);
        let b = percentage(&["1001201908010001"]);

        assert!(can_share(&a, &b));
        assert!(can_share(&b, &a));
    }

    #[test]
    fn not_shareable_when_neither_side_lists_the_other() {
        let a = threshold(&["9999999999999999"]);
        let b = percentage(&[]);

        assert!(!can_share(&a, &b));
        assert!(!can_share(&b, &a));
    }

    // Documented behaviour: a one-sided whitelist is accepted.
    #[test]
    fn shareable_when_only_one_side_lists_the_other() {
        let a = threshold(&["1002201907120002"]);
        let b = percentage(&[]);

        assert!(can_share(&a, &b));
        assert!(can_share(&b, &a));
    }

    #[test]
    fn key_depends_on_template_id() {
        // Lists the percentage template's base key without its id suffix.
        let a = threshold(&["100220190712"]);
        let b = percentage(&[]);

        assert!(!can_share(&a, &b));
    }
}
