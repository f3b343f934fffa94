//! 单元测试公共工具：临时 SQLite 数据库、测试日志、记录型监听器

use crate::rewards::config::RewardsConfig;
use crate::rewards::db::create_sqlite_pool_with_migration;
use crate::rewards::listener::RewardsListener;
use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::sync::{Mutex, Once};
use tempfile::TempDir;

static INIT_LOGGER: Once = Once::new();

pub(crate) fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        // 测试中默认打开当前 crate 的 debug，sqlx 只保留 warn
        let filter_layer = EnvFilter::new("info,rewards_core=debug,sqlx=warn");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true) // 包含文件名
            .with_line_number(true) // 包含行号
            .with_target(false)
            .with_test_writer();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}

/// 测试配置：每个测试独立的临时数据库文件
pub(crate) fn test_config(dir: &TempDir) -> RewardsConfig {
    let db_path = dir.path().join("rewards-test.db");
    RewardsConfig::new(format!("sqlite://{}?mode=rwc", db_path.display()))
}

/// 打开已执行迁移的临时数据库；返回的 `TempDir` 需要在测试期间保持存活
pub(crate) async fn open_test_pool() -> (TempDir, Pool<Sqlite>) {
    init_test_logger();
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let pool = create_sqlite_pool_with_migration(&test_config(&dir))
        .await
        .expect("创建测试数据库失败");
    (dir, pool)
}

/// 记录所有回调的监听器
#[derive(Default)]
pub(crate) struct RecordingListener {
    awards: Mutex<Vec<(i64, i64, i64)>>,
    invited: Mutex<Vec<String>>,
    accepted: Mutex<Vec<String>>,
    removed: Mutex<Vec<(i64, i64)>>,
}

impl RecordingListener {
    pub(crate) fn awards(&self) -> Vec<(i64, i64, i64)> {
        self.awards.lock().unwrap().clone()
    }

    pub(crate) fn invited_count(&self) -> usize {
        self.invited.lock().unwrap().len()
    }

    pub(crate) fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }

    pub(crate) fn removed(&self) -> Vec<(i64, i64)> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewardsListener for RecordingListener {
    async fn on_points_awarded(&self, user_id: i64, delta: i64, total: i64) {
        self.awards.lock().unwrap().push((user_id, delta, total));
    }

    async fn on_friendship_invited(&self, friendship_json: String) {
        self.invited.lock().unwrap().push(friendship_json);
    }

    async fn on_friendship_accepted(&self, friendship_json: String) {
        self.accepted.lock().unwrap().push(friendship_json);
    }

    async fn on_friendship_removed(&self, friendship_id: i64, acting_user_id: i64) {
        self.removed
            .lock()
            .unwrap()
            .push((friendship_id, acting_user_id));
    }
}
