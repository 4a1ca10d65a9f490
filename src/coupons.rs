//! Coupons
//!
//! A coupon is a user's copy of a template, identified by a redemption code. It is never
//! deleted; its status moves from [`CouponStatus::Usable`] to either
//! [`CouponStatus::Used`] or [`CouponStatus::Expired`].

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::templates::{CouponTemplate, TemplateId};

/// Coupon identifier, assigned by the durable store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponId(pub u64);

impl fmt::Display for CouponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// User identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Coupon lifecycle status
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    /// Held and redeemable
    Usable,

    /// Redeemed in a confirmed settlement
    Used,

    /// Deadline passed before redemption
    Expired,
}

impl CouponStatus {
    /// All statuses, in partition order.
    pub const ALL: [Self; 3] = [Self::Usable, Self::Used, Self::Expired];

    /// Storage code of the status.
    pub const fn code(self) -> i16 {
        match self {
            Self::Usable => 1,
            Self::Used => 2,
            Self::Expired => 3,
        }
    }

    /// Status for a storage code.
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Usable),
            2 => Some(Self::Used),
            3 => Some(Self::Expired),
            _ => None,
        }
    }

    /// Lower-case name, used in cache keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coupon held by a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponRecord {
    /// Coupon identifier
    pub id: CouponId,

    /// Template the coupon was issued from
    pub template_id: TemplateId,

    /// Holder
    pub user_id: UserId,

    /// Redemption code
    pub code: String,

    /// When the coupon was assigned to the user
    pub assigned_at: Timestamp,

    /// Current status
    pub status: CouponStatus,

    /// Snapshot of the template, attached before the record is cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<CouponTemplate>,
}

impl CouponRecord {
    /// Whether the coupon's template deadline has passed at `now`.
    ///
    /// Records without a template snapshot are never considered expired.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.template
            .as_ref()
            .is_some_and(|template| template.is_past_deadline(now))
    }

    /// Copy of the record with a different status.
    #[must_use]
    pub fn with_status(mut self, status: CouponStatus) -> Self {
        self.status = status;
        self
    }
}

/// A value stored in a cached partition.
///
/// [`CachedEntry::Empty`] marks a partition that has been checked and holds nothing, so
/// that repeated reads do not fall through to the durable store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedEntry {
    /// Partition checked, nothing there
    Empty,

    /// A cached coupon
    Coupon(CouponRecord),
}

impl CachedEntry {
    /// The coupon, unless this is the empty marker.
    pub fn into_coupon(self) -> Option<CouponRecord> {
        match self {
            Self::Empty => None,
            Self::Coupon(record) => Some(record),
        }
    }
}

/// Usable coupons split by whether they have passed their deadline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classified {
    /// Still usable
    pub usable: Vec<CouponRecord>,

    /// Past the template deadline
    pub expired: Vec<CouponRecord>,
}

/// Split coupons into still-usable and expired at `now`.
pub fn classify(coupons: Vec<CouponRecord>, now: Timestamp) -> Classified {
    let (expired, usable) = coupons
        .into_iter()
        .partition(|coupon| coupon.is_expired_at(now));

    Classified { usable, expired }
}

#[cfg(test)]
mod tests {
    use jiff::{SignedDuration, Timestamp};
    use testresult::TestResult;

    use crate::{
        tags::string::StringTagCollection,
        templates::{Discount, ProductLine, TemplateRule, Usage},
    };

    use super::*;

    fn coupon(id: u64, deadline: Option<Timestamp>) -> CouponRecord {
        CouponRecord {
            id: CouponId(id),
            template_id: TemplateId(1),
            user_id: UserId(20_001),
            code: format!("CODE{id}"),
            assigned_at: Timestamp::UNIX_EPOCH,
            status: CouponStatus::Usable,
            template: deadline.map(|deadline| CouponTemplate {
                id: TemplateId(1),
                name: "flat".to_string(),
                key: "100320190801".to_string(),
                product_line: ProductLine::One,
                count: 100,
                available: true,
                expired: false,
                created_at: Timestamp::UNIX_EPOCH,
                rule: TemplateRule {
                    discount: Discount::FlatReduction { amount: 5_00 },
                    usage: Usage {
                        region: "Beijing".to_string(),
                        goods_types: StringTagCollection::from_strs(&["leisure"]),
                    },
                    deadline,
                    limitation: 2,
                    sharing_keys: Vec::new(),
                },
            }),
        }
    }

    #[test]
    fn classify_splits_by_deadline() -> TestResult {
        let now: Timestamp = "2024-06-01T00:00:00Z".parse()?;
        let past = now.checked_sub(SignedDuration::from_secs(1))?;
        let future = now.checked_add(SignedDuration::from_hours(24))?;

        let classified = classify(
            vec![coupon(1, Some(past)), coupon(2, Some(future)), coupon(3, None)],
            now,
        );

        assert_eq!(
            classified.usable.iter().map(|c| c.id).collect::<Vec<_>>(),
            [CouponId(2), CouponId(3)]
        );
        assert_eq!(
            classified.expired.iter().map(|c| c.id).collect::<Vec<_>>(),
            [CouponId(1)]
        );

        Ok(())
    }

    #[test]
    fn status_codes_round_trip() {
        for status in CouponStatus::ALL {
            assert_eq!(CouponStatus::from_code(status.code()), Some(status));
        }

        assert_eq!(CouponStatus::from_code(0), None);
    }

    #[test]
    fn empty_entry_has_no_coupon() {
        assert_eq!(CachedEntry::Empty.into_coupon(), None);
        assert!(CachedEntry::Coupon(coupon(1, None)).into_coupon().is_some());
    }
}
