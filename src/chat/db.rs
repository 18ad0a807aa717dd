//! SQLite 数据库工具：统一创建连接池并初始化表结构

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// 创建 SQLite 连接池并初始化本地表
pub async fn create_sqlite_pool(db_url: &str) -> Result<Pool<Sqlite>> {
    info!("[DB] 🔗 创建本地数据库连接: {}", db_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context(format!("连接SQLite数据库失败: {}", db_url))?;

    init_db_with_connection(&pool).await?;
    Ok(pool)
}

/// 使用共享连接初始化表结构
pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
    let sql = r#"
        CREATE TABLE IF NOT EXISTS local_kv (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0
        )
    "#;
    sqlx::query(sql)
        .execute(db)
        .await
        .context("创建 local_kv 表失败")?;
    Ok(())
}
