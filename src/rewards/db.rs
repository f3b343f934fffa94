//! SQLite 数据库工具：统一创建连接池并执行 sqlx 迁移
//!
//! 约定：本 crate 根目录下存在 `migrations/` 目录，存放所有迁移 SQL 文件。
//! 通过 `sqlx::migrate!()` 自动管理 schema 升级。

use crate::rewards::config::RewardsConfig;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// 创建 SQLite 连接池并执行所有未执行的迁移
///
/// 开启 WAL 与外键约束；写锁竞争时按 `busy_timeout` 等待而不是立即失败。
pub async fn create_sqlite_pool_with_migration(config: &RewardsConfig) -> Result<Pool<Sqlite>> {
    let options = SqliteConnectOptions::from_str(&config.db_url)
        .with_context(|| format!("无效的数据库 URL: {}", config.db_url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout());

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {}", config.db_url))?;

    // 从 `migrations/` 目录读取迁移并执行
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("执行数据库迁移失败")?;

    info!("[DB] SQLite 连接池就绪: {}", config.db_url);
    Ok(pool)
}

/// 当前时间（毫秒时间戳）
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
