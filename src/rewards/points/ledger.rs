//! 积分账本
//!
//! 账本是 `users.points` 的唯一写入方。每次奖励都是一条原子累加语句，
//! 同一用户的并发奖励不会丢失；不同用户之间不存在任何共享锁。
//! SQLite 写锁竞争（BUSY/LOCKED）在内部有限次重试，调用方感知不到。

use crate::rewards::error::{is_transient_conflict, RewardsError, RewardsResult};
use crate::rewards::listener::{EmptyRewardsListener, RewardsListener};
use crate::rewards::points::policy::{PointPolicy, PointReason};
use crate::rewards::user::dao::UserDao;
use crate::rewards::user::models::PointsIncrement;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 一次待执行的积分奖励
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointAward {
    pub target_user_id: i64,
    pub delta: i64,
    pub reason: Option<PointReason>,
}

impl PointAward {
    /// 按积分策略构造某个行为的奖励
    pub fn for_reason(target_user_id: i64, reason: PointReason, policy: &PointPolicy) -> Self {
        Self {
            target_user_id,
            delta: policy.magnitude(reason),
            reason: Some(reason),
        }
    }
}

/// 奖励回执：本次获得的积分与累加后的总分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAwardReceipt {
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<PointReason>,
    pub delta: i64,
    pub total: i64,
}

/// 积分账本
#[derive(Clone)]
pub struct PointsLedger {
    user_dao: UserDao,
    policy: PointPolicy,
    max_retries: u32,
    listener: Arc<dyn RewardsListener>,
}

impl PointsLedger {
    /// 创建积分账本（使用默认空监听器）
    pub fn new(user_dao: UserDao, policy: PointPolicy, max_retries: u32) -> Self {
        Self::with_listener(user_dao, policy, max_retries, Arc::new(EmptyRewardsListener))
    }

    /// 创建积分账本（带自定义监听器）
    pub fn with_listener(
        user_dao: UserDao,
        policy: PointPolicy,
        max_retries: u32,
        listener: Arc<dyn RewardsListener>,
    ) -> Self {
        Self {
            user_dao,
            policy,
            max_retries,
            listener,
        }
    }

    pub fn policy(&self) -> &PointPolicy {
        &self.policy
    }

    /// 为某个行为发放积分
    pub async fn award(&self, user_id: i64, reason: PointReason) -> RewardsResult<PointAwardReceipt> {
        self.apply_award(PointAward::for_reason(user_id, reason, &self.policy))
            .await
    }

    /// 直接累加指定积分
    pub async fn apply(&self, user_id: i64, delta: i64) -> RewardsResult<PointAwardReceipt> {
        self.apply_award(PointAward {
            target_user_id: user_id,
            delta,
            reason: None,
        })
        .await
    }

    /// 执行一次奖励，返回本次积分与累加后的总分
    pub async fn apply_award(&self, award: PointAward) -> RewardsResult<PointAwardReceipt> {
        Self::check_delta(&award)?;
        let total = self.increment_with_retry(award.target_user_id, award.delta).await?;
        let receipt = Self::log_receipt(award, total);
        self.notify(&receipt).await;
        Ok(receipt)
    }

    /// 在调用方的事务中按行为发放积分
    ///
    /// 事务内不重试；回执在提交后由调用方通过 [`PointsLedger::notify`] 通知监听器。
    pub(crate) async fn award_on(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
        reason: PointReason,
    ) -> RewardsResult<PointAwardReceipt> {
        let award = PointAward::for_reason(user_id, reason, &self.policy);
        Self::check_delta(&award)?;
        let outcome = UserDao::increment_points_on(conn, user_id, award.delta).await?;
        let total = Self::total_of(user_id, award.delta, outcome)?;
        Ok(Self::log_receipt(award, total))
    }

    /// 通知监听器一次已生效的奖励
    pub(crate) async fn notify(&self, receipt: &PointAwardReceipt) {
        self.listener
            .on_points_awarded(receipt.user_id, receipt.delta, receipt.total)
            .await;
    }

    fn check_delta(award: &PointAward) -> RewardsResult<()> {
        if award.delta <= 0 {
            return Err(RewardsError::invalid_argument(format!(
                "积分增量必须为正数，实际为 {}",
                award.delta
            )));
        }
        Ok(())
    }

    fn total_of(user_id: i64, delta: i64, outcome: PointsIncrement) -> RewardsResult<i64> {
        match outcome {
            PointsIncrement::Applied(total) => Ok(total),
            PointsIncrement::UserMissing => {
                Err(RewardsError::not_found(format!("用户 {} 不存在", user_id)))
            }
            PointsIncrement::Overflow => Err(RewardsError::invalid_argument(format!(
                "用户 {} 积分累加 {} 后超出上限",
                user_id, delta
            ))),
        }
    }

    fn log_receipt(award: PointAward, total: i64) -> PointAwardReceipt {
        let receipt = PointAwardReceipt {
            user_id: award.target_user_id,
            reason: award.reason,
            delta: award.delta,
            total,
        };
        info!(
            "[PointsLedger] 🎉 用户 {} 获得 {} 积分（{}），当前总分 {}",
            receipt.user_id,
            receipt.delta,
            receipt
                .reason
                .map(|r| r.as_str())
                .unwrap_or("manual"),
            receipt.total
        );
        receipt
    }

    async fn increment_with_retry(&self, user_id: i64, delta: i64) -> RewardsResult<i64> {
        let mut attempt = 0u32;
        loop {
            match self.user_dao.increment_points(user_id, delta).await {
                Ok(outcome) => return Self::total_of(user_id, delta, outcome),
                Err(e) if is_transient_conflict(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "[PointsLedger] 用户 {} 积分写入遇到写锁冲突，第 {} 次重试: {:#}",
                        user_id, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                }
                Err(e) => {
                    error!(
                        "[PointsLedger] 用户 {} 积分写入失败（已重试 {} 次）: {:#}",
                        user_id, attempt, e
                    );
                    return Err(RewardsError::Internal(e));
                }
            }
            debug!("[PointsLedger] 用户 {} 重新提交积分 +{}", user_id, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::error::ErrorKind;
    use crate::rewards::test_support::{open_test_pool, RecordingListener};
    use crate::rewards::user::models::NewUser;
    use futures_util::future::join_all;

    async fn ledger_with_user() -> (tempfile::TempDir, PointsLedger, UserDao, i64) {
        let (dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);
        let user = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();
        let ledger = PointsLedger::new(dao.clone(), PointPolicy::default(), 3);
        (dir, ledger, dao, user.id)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_awards_are_never_lost() {
        let (_dir, ledger, dao, user_id) = ledger_with_user().await;

        let tasks = (0..100).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.apply(user_id, 10).await })
        });
        for result in join_all(tasks).await {
            let receipt = result.unwrap().unwrap();
            assert_eq!(receipt.delta, 10);
        }

        let user = dao.get_user_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.points, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn awards_to_different_users_proceed_independently() {
        let (_dir, ledger, dao, alice) = ledger_with_user().await;
        let bob = dao
            .create_user(&NewUser::new("uid-b", "bob", "b@example.com"))
            .await
            .unwrap()
            .unwrap()
            .id;

        let tasks = (0..40).map(|i| {
            let ledger = ledger.clone();
            let target = if i % 2 == 0 { alice } else { bob };
            tokio::spawn(async move { ledger.award(target, PointReason::ReactionPosted).await })
        });
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(dao.get_user_by_id(alice).await.unwrap().unwrap().points, 3000);
        assert_eq!(dao.get_user_by_id(bob).await.unwrap().unwrap().points, 3000);
    }

    #[tokio::test]
    async fn receipt_reports_delta_and_total() {
        let (_dir, ledger, _dao, user_id) = ledger_with_user().await;

        let first = ledger.award(user_id, PointReason::FriendshipFormed).await.unwrap();
        assert_eq!((first.delta, first.total), (250, 250));
        assert_eq!(first.reason, Some(PointReason::FriendshipFormed));

        let second = ledger.award(user_id, PointReason::ContentViewed).await.unwrap();
        assert_eq!((second.delta, second.total), (500, 750));
    }

    #[tokio::test]
    async fn non_positive_delta_is_rejected_without_writing() {
        let (_dir, ledger, dao, user_id) = ledger_with_user().await;

        for delta in [0, -5] {
            let err = ledger.apply(user_id, delta).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(dao.get_user_by_id(user_id).await.unwrap().unwrap().points, 0);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_dir, ledger, _dao, _user_id) = ledger_with_user().await;
        let err = ledger.apply(404, 10).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn listener_sees_each_award() {
        let (_dir, ledger, dao, user_id) = ledger_with_user().await;
        let listener = Arc::new(RecordingListener::default());
        let ledger = PointsLedger::with_listener(
            dao,
            ledger.policy().clone(),
            3,
            listener.clone(),
        );

        ledger.award(user_id, PointReason::AudioListened).await.unwrap();
        ledger.award(user_id, PointReason::ProfileEdited).await.unwrap();

        assert_eq!(
            listener.awards(),
            vec![(user_id, 50, 50), (user_id, 50, 100)]
        );
    }

    #[tokio::test]
    async fn award_past_the_point_ceiling_is_invalid_and_leaves_the_total() {
        let (_dir, ledger, dao, user_id) = ledger_with_user().await;

        let full = ledger.apply(user_id, i64::MAX).await.unwrap();
        assert_eq!(full.total, i64::MAX);

        let err = ledger.apply(user_id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            dao.get_user_by_id(user_id).await.unwrap().unwrap().points,
            i64::MAX
        );
    }
}
