//! 本地持久化的会话标识
//!
//! 首次启动时生成 UUID 并写入本地 `local_kv` 表，之后每次启动复用，
//! 用于识别回访用户。服务端不做校验。

use crate::chat::db::create_sqlite_pool;
use crate::chat::serialization::generate_session_id;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info};

const SESSION_KEY: &str = "session_id";

/// 本地键值存储（基于 sqlx）
#[derive(Clone)]
pub struct SessionStore {
    db: Pool<Sqlite>,
}

impl SessionStore {
    /// 连接数据库并初始化表
    pub async fn open(db_url: &str) -> Result<Self> {
        Ok(Self::new(create_sqlite_pool(db_url).await?))
    }

    /// 使用已初始化的连接池
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_kv WHERE key = ? LIMIT 1")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .context("查询本地键值失败")?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.db)
        .await
        .context("写入本地键值失败")?;
        Ok(())
    }

    /// 读取已保存的会话 ID，不存在时生成并保存
    pub async fn load_or_create_session_id(&self) -> Result<String> {
        if let Some(id) = self.get(SESSION_KEY).await? {
            if !id.trim().is_empty() {
                debug!("[Session] 复用本地会话ID: {}", id);
                return Ok(id);
            }
        }
        let id = generate_session_id();
        self.set(SESSION_KEY, &id).await?;
        info!("[Session] 🆕 生成新的会话ID: {}", id);
        Ok(id)
    }

    /// 清除本地会话 ID，下次启动视为新访客
    pub async fn forget_session_id(&self) -> Result<()> {
        sqlx::query("DELETE FROM local_kv WHERE key = ?")
            .bind(SESSION_KEY)
            .execute(&self.db)
            .await
            .context("删除本地会话ID失败")?;
        Ok(())
    }
}
