//! 核心配置

use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::friends_code::{FriendsCodeAllocator, DEFAULT_CODE_WIDTH};
use crate::rewards::points::PointPolicy;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 积分与好友核心配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewardsConfig {
    /// SQLite 数据库 URL
    ///
    /// 例如：`sqlite://rewards.db?mode=rwc`
    pub db_url: String,
    /// 连接池最大连接数
    pub max_connections: u32,
    /// SQLite 写锁等待时间（毫秒）
    pub busy_timeout_ms: u64,
    /// 好友码宽度
    pub friends_code_width: u32,
    /// 积分写入遇到写锁冲突时的最大重试次数
    pub max_award_retries: u32,
    /// 积分策略
    pub points: PointPolicy,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self::new("sqlite://rewards.db?mode=rwc".to_string())
    }
}

impl RewardsConfig {
    /// 使用默认参数创建配置
    pub fn new(db_url: String) -> Self {
        Self {
            db_url,
            max_connections: 5,
            busy_timeout_ms: 5_000,
            friends_code_width: DEFAULT_CODE_WIDTH,
            max_award_retries: 3,
            points: PointPolicy::default(),
        }
    }

    /// 从 JSON 文件加载配置，缺失字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> RewardsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RewardsError::invalid_argument(format!("解析配置文件 {} 失败: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn validate(&self) -> RewardsResult<()> {
        if self.max_connections == 0 {
            return Err(RewardsError::invalid_argument("maxConnections 必须大于 0"));
        }
        FriendsCodeAllocator::new(self.friends_code_width)?;
        self.points.validate()
    }
}
