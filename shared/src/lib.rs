//! Shared types for the storefront platform.
//!
//! 前后端共用的实体模型、订单状态机与工具函数。
//! Kept dependency-light so client crates can embed it; database derives
//! are gated behind the `db` feature.

pub mod models;
pub mod util;

pub use models::order::{OrderStatus, SYSTEM_ACTOR};
