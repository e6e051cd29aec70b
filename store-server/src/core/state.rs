//! 服务器状态 - 进程的组合根
//!
//! 所有服务在启动时构造一次，经由 [`AppState`] 注入到请求处理与
//! 后台任务，进程退出时统一回收。没有任何全局单例。

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::{MemoryTtlStore, RateLimiter, TokenService};
use crate::core::Config;
use crate::db::DbService;
use crate::inventory::StockLedger;
use crate::loyalty::LoyaltyEngine;
use crate::orders::{CompletionSweeper, LifecycleManager};
use crate::payment::{GatewayClient, PaymentService};
use crate::settings::SettingsService;
use crate::utils::AppError;

/// Shared application state. Cheap to clone (everything inside is an Arc
/// or a pool handle).
#[derive(Clone)]
pub struct AppState {
    /// 服务器配置 (不可变)
    pub config: Arc<Config>,
    /// SQLite 连接池
    pub pool: SqlitePool,
    /// 运行时设置
    pub settings: SettingsService,
    /// 库存台账
    pub stock: StockLedger,
    /// 积分引擎
    pub loyalty: LoyaltyEngine,
    /// 订单生命周期管理
    pub lifecycle: Arc<LifecycleManager>,
    /// 支付服务
    pub payments: PaymentService,
    /// 令牌服务
    pub tokens: Arc<TokenService>,
    /// 限流器
    pub rate_limiter: RateLimiter,
    /// 过期键存储 (黑名单/水位线/限流计数)
    pub token_store: Arc<MemoryTtlStore>,
}

impl AppState {
    /// Initialize every service against a fresh database connection.
    pub async fn initialize(config: Config) -> Result<Self, AppError> {
        let db = DbService::new(&config.database_path).await?;
        Self::with_pool(config, db.pool)
    }

    /// Build the state on an existing pool (tests use the in-memory one).
    pub fn with_pool(config: Config, pool: SqlitePool) -> Result<Self, AppError> {
        let settings = SettingsService::new(pool.clone());
        let stock = StockLedger::new(pool.clone());
        let loyalty = LoyaltyEngine::new(pool.clone(), settings.clone());
        let lifecycle = Arc::new(LifecycleManager::new(pool.clone(), loyalty.clone()));

        let gateway = Arc::new(
            GatewayClient::new(config.gateway.clone())
                .map_err(|e| AppError::Internal(format!("gateway client init failed: {e}")))?,
        );
        let payments = PaymentService::new(pool.clone(), gateway, lifecycle.clone());

        let token_store = Arc::new(MemoryTtlStore::new());
        let tokens = Arc::new(TokenService::new(config.token.clone(), token_store.clone()));
        let rate_limiter = RateLimiter::new(token_store.clone());

        Ok(Self {
            config: Arc::new(config),
            pool,
            settings,
            stock,
            loyalty,
            lifecycle,
            payments,
            tokens,
            rate_limiter,
            token_store,
        })
    }

    /// Sweeper instance bound to this state's services.
    pub fn completion_sweeper(&self) -> CompletionSweeper {
        CompletionSweeper::new(self.pool.clone(), self.lifecycle.clone(), self.settings.clone())
    }
}
