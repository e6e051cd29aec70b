//! 服务器配置
//!
//! 所有配置项都可以通过环境变量覆盖：
//!
//! | 环境变量 | 默认值 | 说明 |
//! |----------|--------|------|
//! | WORK_DIR | /var/lib/storefront | 工作目录 |
//! | HTTP_PORT | 3000 | HTTP 服务端口 |
//! | DATABASE_PATH | {WORK_DIR}/store.db | SQLite 路径 |
//! | ENVIRONMENT | development | 运行环境 |
//! | LOG_DIR | (无) | 日志目录，设置后按天滚动 |
//! | SWEEP_INTERVAL_SECS | 3600 | 自动完成清扫间隔 |
//! | STORE_CLEANUP_INTERVAL_SECS | 300 | 过期键清理间隔 |
//!
//! 业务参数（宽限期、积分比例、低库存阈值）不在这里——它们是运行时
//! 可改的 settings，存在数据库里。

use crate::auth::TokenConfig;
use crate::payment::GatewayConfig;

/// 限流规则：窗口内最大尝试次数
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub max_attempts: u64,
    pub window_secs: u64,
}

/// 服务器配置
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录（数据库、日志）
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// SQLite 数据库路径
    pub database_path: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 日志目录 (可选)
    pub log_dir: Option<String>,
    /// 令牌配置
    pub token: TokenConfig,
    /// 支付网关配置
    pub gateway: GatewayConfig,
    /// 自动完成清扫间隔 (秒)
    pub sweep_interval_secs: u64,
    /// 过期键清理间隔 (秒)
    pub store_cleanup_interval_secs: u64,
    /// 登录限流
    pub login_limit: RateLimitRule,
    /// 注册限流
    pub register_limit: RateLimitRule,
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Self {
        let work_dir = std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/storefront".into());
        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| format!("{work_dir}/store.db"));

        Self {
            work_dir,
            http_port: env_parse("HTTP_PORT", 3000),
            database_path,
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
            token: TokenConfig::from_env(),
            gateway: GatewayConfig::from_env(),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 3600),
            store_cleanup_interval_secs: env_parse("STORE_CLEANUP_INTERVAL_SECS", 300),
            login_limit: RateLimitRule {
                max_attempts: env_parse("LOGIN_RATE_LIMIT_MAX", 5),
                window_secs: env_parse("LOGIN_RATE_LIMIT_WINDOW_SECS", 60),
            },
            register_limit: RateLimitRule {
                max_attempts: env_parse("REGISTER_RATE_LIMIT_MAX", 3),
                window_secs: env_parse("REGISTER_RATE_LIMIT_WINDOW_SECS", 60),
            },
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
