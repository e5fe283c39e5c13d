//! SQLx Postgres 连接池初始化与健康检查
//!
//! 用法：
//! let pool = init_pool(&config.store).await?;
//! health_check(&pool).await?;

use std::time::Duration;

use crate::config::StoreConfig;

pub type PgPool = sqlx::Pool<sqlx::Postgres>;

/// 初始化连接池
///
/// - idle_timeout: 300秒，避免连接泄漏
/// - max_lifetime: 1800秒，定期刷新
pub async fn init_pool(config: &StoreConfig) -> Result<PgPool, sqlx::Error> {
    let max_conns = config.max_connections.clamp(1, 200);
    let min_conns = config.min_connections.min(max_conns);

    let pool_opts = sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_conns)
        .min_connections(min_conns)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(300))
        .max_lifetime(Duration::from_secs(1800))
        // 确保连接在使用前是有效的，避免使用已断开的连接
        .test_before_acquire(true);

    let pool = pool_opts.connect(&config.url).await.map_err(|e| {
        tracing::error!("Failed to connect to Postgres: {}", e);
        e
    })?;

    // 验证连接
    health_check(&pool).await?;

    Ok(pool)
}

/// 健康检查
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let _: (chrono::DateTime<chrono::Utc>,) = sqlx::query_as("SELECT CURRENT_TIMESTAMP")
        .fetch_one(pool)
        .await?;
    Ok(())
}
