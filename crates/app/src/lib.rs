//! Coupon services over Redis, `PostgreSQL` and an in-process message channel.

pub mod cache;
pub mod catalogue;
pub mod codes;
pub mod config;
pub mod context;
pub mod database;
pub mod observability;
pub mod reconciliation;
pub mod service;
pub mod state;
pub mod store;
