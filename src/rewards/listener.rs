//! 积分与好友事件监听器回调接口
//!
//! 推送通知等外部协作方通过实现该接口接入。回调总是在存储写入完成之后触发，
//! 触发时不持有任何锁。

use async_trait::async_trait;

/// 积分与好友事件监听器
#[async_trait]
pub trait RewardsListener: Send + Sync {
    /// 用户获得积分
    async fn on_points_awarded(&self, user_id: i64, delta: i64, total: i64);

    /// 新的好友邀请，参数为好友关系 JSON 字符串
    async fn on_friendship_invited(&self, friendship_json: String);

    /// 好友邀请被接受，参数为好友关系 JSON 字符串
    async fn on_friendship_accepted(&self, friendship_json: String);

    /// 好友关系被拒绝或解除
    async fn on_friendship_removed(&self, friendship_id: i64, acting_user_id: i64);
}

/// 默认空实现（无操作）
pub struct EmptyRewardsListener;

#[async_trait]
impl RewardsListener for EmptyRewardsListener {
    async fn on_points_awarded(&self, _user_id: i64, _delta: i64, _total: i64) {
        // 默认不做任何处理
    }

    async fn on_friendship_invited(&self, _friendship_json: String) {
        // 默认不做任何处理
    }

    async fn on_friendship_accepted(&self, _friendship_json: String) {
        // 默认不做任何处理
    }

    async fn on_friendship_removed(&self, _friendship_id: i64, _acting_user_id: i64) {
        // 默认不做任何处理
    }
}
