use adspend_recon_rust::{
    api, create_pool, AggregateService, AppConfig, LedgerService, ReconcilerService,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database.url, config.database.max_connections).await?;
    info!("Database pool created");

    // 三个核心服务
    let ledger = Arc::new(LedgerService::new(pool.clone()));
    let reconciler = Arc::new(ReconcilerService::new(pool.clone()));
    let aggregates = Arc::new(AggregateService::new(pool));

    // 分配台账路由
    let ledger_routes = Router::new()
        .route("/api/accounts/link-invoice-entity", post(api::link_invoice_entity))
        .route("/api/accounts/unlink-invoice-entity", post(api::unlink_invoice_entity))
        .route("/api/accounts/assign-customer", post(api::assign_customer))
        .route("/api/accounts/unassign-customer", post(api::unassign_customer))
        .with_state(ledger);

    // 对账路由
    let recon_routes = Router::new()
        .route("/api/spending/snapshot", post(api::record_snapshot))
        .route("/api/spending/recalculate", post(api::recalculate_day))
        .route("/api/spending/import", post(api::import_daily_totals))
        .route("/api/spending/export", post(api::export_day_records))
        .with_state(reconciler);

    // 计数修复路由
    let aggregate_routes = Router::new()
        .route("/api/counters/repair", post(api::repair_counters))
        .with_state(aggregates);

    // 合并路由
    let app = Router::new()
        .route("/health", get(api::health_check))
        .merge(ledger_routes)
        .merge(recon_routes)
        .merge(aggregate_routes)
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/spending/snapshot     - 落累计快照");
    info!("  POST /api/spending/recalculate  - 按日重算 (快照增量模式)");
    info!("  POST /api/spending/import       - 权威日总额导入");
    info!("  POST /api/accounts/*            - 开票主体/客户 挂载与解绑");
    info!("  POST /api/counters/repair       - 冗余计数批量修复");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
