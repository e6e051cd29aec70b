//! Storefront backend server
//!
//! 电商店面后端：订单生命周期、库存台账、支付网关对接、积分累积、
//! 令牌服务与薄 CRUD API。二进制入口在 `main.rs`，测试通过这里的
//! 公开模块直接驱动服务层。

pub mod api;
pub mod auth;
pub mod core;
pub mod db;
pub mod inventory;
pub mod loyalty;
pub mod orders;
pub mod payment;
pub mod settings;
pub mod utils;

pub use crate::core::{AppState, Config, Server};

/// 启动前的环境准备：dotenv + 日志
pub fn setup_environment() {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").ok();
    let log_dir = std::env::var("LOG_DIR").ok();
    utils::logger::init_logger_with_file(log_level.as_deref(), log_dir.as_deref());
}
