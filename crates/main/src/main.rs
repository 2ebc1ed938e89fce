//! 主应用程序入口
//!
//! 启动拼车聊天的 Axum Web API 服务。

use std::sync::Arc;

use application::{ChatService, ChatServiceDependencies, RoomBroadcaster, SystemClock};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgMessageRepository, PgRideDirectory};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService, RoomRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();
    if let Err(err) = config.validate() {
        tracing::warn!(error = %err, "configuration failed validation, running with development defaults");
    }

    tracing::info!(
        "connecting database: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );

    let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let message_repository = Arc::new(PgMessageRepository::new(pool.clone()));
    let ride_directory = Arc::new(PgRideDirectory::new(pool));

    // 房间注册表同时承担消息扇出
    let registry = Arc::new(RoomRegistry::new());

    let chat_service = Arc::new(ChatService::new(
        ChatServiceDependencies {
            message_repository,
            ride_directory,
            clock: Arc::new(SystemClock),
            broadcaster: registry.clone() as Arc<dyn RoomBroadcaster>,
        },
        &config.chat,
    ));

    let jwt_service = Arc::new(JwtService::new(&config.jwt));

    let state = AppState::new(chat_service, registry, jwt_service, &config.chat);

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("ride chat server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
