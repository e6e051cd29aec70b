use store_server::{setup_environment, AppState, Config, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 环境准备 (dotenv, 日志)
    setup_environment();

    tracing::info!("Storefront server starting...");

    // 2. 加载配置
    let config = Config::from_env();

    // 3. 初始化服务 (组合根)
    let state = AppState::initialize(config.clone()).await?;

    // 4. 启动 HTTP 服务与后台任务
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {e}");
        return Err(e.into());
    }

    Ok(())
}
