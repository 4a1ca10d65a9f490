//! Coupon Templates
//!
//! A template is published once and is read-only afterwards. Every coupon a user holds
//! points at one template, which carries the discount rule, the goods types the coupon may
//! be used against, its deadline, the per-user holding limit and the keys of the other
//! templates it may be combined with.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::tags::string::StringTagCollection;

/// Template identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u32);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Product line that issued a template.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductLine {
    /// First product line
    One,

    /// Second product line
    Two,
}

impl ProductLine {
    /// Single-digit code used in template keys and redemption codes.
    pub const fn code(self) -> char {
        match self {
            Self::One => '1',
            Self::Two => '2',
        }
    }
}

/// Coupon Category
///
/// Ordering is significant: the settlement rule table is keyed by the sorted list of
/// categories of the chosen coupons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponCategory {
    /// Spend at least a threshold, get a fixed amount off
    ThresholdReduction,

    /// A percentage of the goods sum is payable
    PercentageDiscount,

    /// A fixed amount off, no threshold
    FlatReduction,
}

impl CouponCategory {
    /// Three-character code used in template keys and redemption codes.
    pub const fn code(self) -> &'static str {
        match self {
            Self::ThresholdReduction => "001",
            Self::PercentageDiscount => "002",
            Self::FlatReduction => "003",
        }
    }
}

/// Discount rule of a template.
///
/// Amounts are minor units of the settlement currency.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum Discount {
    /// `amount` off, no threshold
    FlatReduction {
        /// Reduction in minor units
        amount: i64,
    },

    /// `amount` off once the goods sum reaches `threshold`
    ThresholdReduction {
        /// Minimum goods sum in minor units
        threshold: i64,

        /// Reduction in minor units
        amount: i64,
    },

    /// `points` percent of the goods sum is payable (85 means 15% off)
    PercentageDiscount {
        /// Payable percentage points
        points: u16,
    },
}

impl Discount {
    /// The category this discount belongs to.
    pub const fn category(&self) -> CouponCategory {
        match self {
            Self::FlatReduction { .. } => CouponCategory::FlatReduction,
            Self::ThresholdReduction { .. } => CouponCategory::ThresholdReduction,
            Self::PercentageDiscount { .. } => CouponCategory::PercentageDiscount,
        }
    }
}

/// Where and on what a template may be used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Region the template is valid in
    pub region: String,

    /// Goods types the coupon may be redeemed against
    pub goods_types: StringTagCollection,
}

/// Template rule descriptor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateRule {
    /// Discount applied at settlement
    pub discount: Discount,

    /// Usage restrictions
    pub usage: Usage,

    /// Coupons of this template expire once this instant has passed
    pub deadline: Timestamp,

    /// Maximum number of usable coupons of this template a single user may hold
    pub limitation: u32,

    /// Own keys of the templates this one may be redeemed together with
    #[serde(default)]
    pub sharing_keys: Vec<String>,
}

/// A published coupon template with its catalogue metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouponTemplate {
    /// Template identifier
    pub id: TemplateId,

    /// Display name
    pub name: String,

    /// Base key: product line, category and creation date
    pub key: String,

    /// Issuing product line
    pub product_line: ProductLine,

    /// Number of redemption codes issued for this template
    pub count: u32,

    /// Whether the redemption codes have been generated
    #[serde(default)]
    pub available: bool,

    /// Whether the template has been retired by the expiry sweep
    #[serde(default)]
    pub expired: bool,

    /// Creation time
    pub created_at: Timestamp,

    /// Rule descriptor
    pub rule: TemplateRule,
}

impl CouponTemplate {
    /// The template's category, derived from its discount rule.
    pub const fn category(&self) -> CouponCategory {
        self.rule.discount.category()
    }

    /// Identity key used by combinability checks: the base key followed by the
    /// zero-padded template id.
    pub fn own_key(&self) -> String {
        format!("{}{:04}", self.key, self.id.0)
    }

    /// Whether the template deadline has passed at `now`.
    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        self.rule.deadline < now
    }
}

/// Build a template base key from its product line, category and creation date.
pub fn template_key(product_line: ProductLine, category: CouponCategory, created_at: Timestamp) -> String {
    format!(
        "{}{}{}",
        product_line.code(),
        category.code(),
        created_at.strftime("%Y%m%d")
    )
}

/// Templates that are not yet retired but whose deadline has passed at `now`.
///
/// Driven periodically by an external timer; the caller persists the retirement.
pub fn expire_if_due(templates: &[CouponTemplate], now: Timestamp) -> Vec<&CouponTemplate> {
    templates
        .iter()
        .filter(|template| !template.expired && template.is_past_deadline(now))
        .collect()
}
