//! Tags
//!
//! Goods types and template usage restrictions are expressed as tag sets.

pub mod string;
