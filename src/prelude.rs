//! Coupons prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    codes::{CodeGenerationError, generate_batch},
    combinability::can_share,
    coupons::{CachedEntry, Classified, CouponId, CouponRecord, CouponStatus, UserId, classify},
    goods::GoodsItem,
    pricing::{PriceError, goods_sum, parse_price, round2},
    settlement::{
        ChosenCoupon, Outcome, RuleKind, SettlementConfig, SettlementEngine, SettlementError,
        SettlementRequest,
    },
    tags::string::StringTagCollection,
    templates::{
        CouponCategory, CouponTemplate, Discount, ProductLine, TemplateId, TemplateRule, Usage,
        expire_if_due, template_key,
    },
};
