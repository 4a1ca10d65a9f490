//! Coupons
//!
//! Coupon settlement and lifecycle primitives: templates and the coupons issued from
//! them, goods and prices in minor units, the combinability check, the settlement rule
//! table and redemption-code generation. Everything here is synchronous and free of I/O;
//! caching, persistence and reconciliation live in the `coupons-app` crate.

pub mod codes;
pub mod combinability;
pub mod coupons;
pub mod goods;
pub mod prelude;
pub mod pricing;
pub mod settlement;
pub mod tags;
pub mod templates;
