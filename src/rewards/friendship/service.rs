//! 好友关系服务层
//!
//! 好友关系状态机：INVITED → ACCEPTED，拒绝或解除时直接删除记录。
//! 接受邀请后为双方各发放一次"成为好友"积分。

use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::friends_code::FriendsCodeAllocator;
use crate::rewards::friendship::dao::FriendshipDao;
use crate::rewards::friendship::models::{
    AcceptedFriendship, Friendship, FriendshipEntry, FriendshipStatus,
};
use crate::rewards::listener::{EmptyRewardsListener, RewardsListener};
use crate::rewards::points::{PointAwardReceipt, PointReason, PointsLedger};
use crate::rewards::user::{User, UserDao};
use anyhow::Context;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 好友关系引擎
#[derive(Clone)]
pub struct FriendshipEngine {
    user_dao: UserDao,
    friendship_dao: FriendshipDao,
    allocator: FriendsCodeAllocator,
    ledger: PointsLedger,
    listener: Arc<dyn RewardsListener>,
}

impl FriendshipEngine {
    /// 创建好友关系引擎（使用默认空监听器）
    pub fn new(
        user_dao: UserDao,
        friendship_dao: FriendshipDao,
        allocator: FriendsCodeAllocator,
        ledger: PointsLedger,
    ) -> Self {
        Self::with_listener(
            user_dao,
            friendship_dao,
            allocator,
            ledger,
            Arc::new(EmptyRewardsListener),
        )
    }

    /// 创建好友关系引擎（带自定义监听器）
    pub fn with_listener(
        user_dao: UserDao,
        friendship_dao: FriendshipDao,
        allocator: FriendsCodeAllocator,
        ledger: PointsLedger,
        listener: Arc<dyn RewardsListener>,
    ) -> Self {
        Self {
            user_dao,
            friendship_dao,
            allocator,
            ledger,
            listener,
        }
    }

    async fn require_user(&self, user_id: i64) -> RewardsResult<User> {
        self.user_dao
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("用户 {} 不存在", user_id)))
    }

    async fn require_friendship(&self, friendship_id: i64) -> RewardsResult<Friendship> {
        self.friendship_dao
            .get_friendship_by_id(friendship_id)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("好友关系 {} 不存在", friendship_id)))
    }

    /// 通过好友码向对方发起好友邀请
    pub async fn invite(&self, invitor_id: i64, invitee_code: &str) -> RewardsResult<Friendship> {
        let operation_id = Uuid::new_v4();
        info!(
            "[FriendshipEngine] 📨 用户 {} 通过好友码 {:?} 发起邀请（操作ID: {}）",
            invitor_id, invitee_code, operation_id
        );

        let code = self.allocator.normalize(invitee_code)?;
        let invitor = self.require_user(invitor_id).await?;
        let invitee = self
            .user_dao
            .get_user_by_code(&code)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("好友码 {} 不存在", code)))?;

        // 以解析后的身份判断是否邀请自己，而不是比较好友码
        if invitor.id == invitee.id {
            warn!(
                "[FriendshipEngine] 用户 {} 尝试邀请自己（操作ID: {}）",
                invitor.id, operation_id
            );
            return Err(RewardsError::forbidden("不能添加自己为好友"));
        }

        // 预检查只为尽早返回；真正的互斥由 (pair_low, pair_high) 唯一约束保证
        if let Some(existing) = self
            .friendship_dao
            .find_friendship_for_pair(invitor.id, invitee.id)
            .await?
        {
            debug!(
                "[FriendshipEngine] 用户对 ({}, {}) 已有好友关系 {}（{}）",
                invitor.id, invitee.id, existing.id, existing.status
            );
            return Err(RewardsError::already_exists(format!(
                "用户 {} 与 {} 已存在好友关系",
                invitor.id, invitee.id
            )));
        }

        let friendship = self
            .friendship_dao
            .create_friendship(invitor.id, invitee.id)
            .await?
            .ok_or_else(|| {
                RewardsError::already_exists(format!(
                    "用户 {} 与 {} 已存在好友关系",
                    invitor.id, invitee.id
                ))
            })?;

        info!(
            "[FriendshipEngine] ✅ 好友邀请已创建 id={}, {} -> {}（操作ID: {}）",
            friendship.id, invitor.id, invitee.id, operation_id
        );
        match serde_json::to_string(&friendship) {
            Ok(json) => self.listener.on_friendship_invited(json).await,
            Err(e) => warn!(
                "[FriendshipEngine] 序列化好友关系 {} 失败，跳过邀请通知: {}",
                friendship.id, e
            ),
        }
        Ok(friendship)
    }

    /// 被邀请人接受好友邀请，双方各获得一次"成为好友"积分
    pub async fn accept(
        &self,
        friendship_id: i64,
        acting_user_id: i64,
    ) -> RewardsResult<AcceptedFriendship> {
        let operation_id = Uuid::new_v4();
        info!(
            "[FriendshipEngine] 🤝 用户 {} 接受好友关系 {}（操作ID: {}）",
            acting_user_id, friendship_id, operation_id
        );

        let friendship = self.require_friendship(friendship_id).await?;
        if friendship.invitee_id != acting_user_id {
            warn!(
                "[FriendshipEngine] 用户 {} 不是好友关系 {} 的被邀请人，拒绝接受",
                acting_user_id, friendship_id
            );
            return Err(RewardsError::forbidden("只有被邀请人可以接受好友邀请"));
        }
        if friendship.status == FriendshipStatus::Accepted {
            return Err(RewardsError::forbidden("好友邀请已被接受"));
        }

        // 状态变更与双方奖励在同一事务中提交，任何一步失败都整体回滚
        let mut tx = self.friendship_dao.begin().await?;

        // 条件更新：并发的重复接受只有一个能成功，其余视为已接受
        let accepted = FriendshipDao::update_friendship_status_on(
            &mut tx,
            friendship_id,
            FriendshipStatus::Invited,
            FriendshipStatus::Accepted,
        )
        .await?;
        let Some(accepted) = accepted else {
            tx.rollback().await.context("回滚接受好友事务失败")?;
            // 已被并发接受，或在检查之后被删除
            return match self.friendship_dao.get_friendship_by_id(friendship_id).await? {
                Some(_) => Err(RewardsError::forbidden("好友邀请已被接受")),
                None => Err(RewardsError::not_found(format!(
                    "好友关系 {} 不存在",
                    friendship_id
                ))),
            };
        };

        let awards = self.award_friendship_formed(&mut tx, &accepted).await;
        let (invitor_award, invitee_award) = match awards {
            Ok(awards) => awards,
            Err(e) => {
                error!(
                    "[FriendshipEngine] ❌ 发放好友积分失败，好友关系 {} 保持待接受（操作ID: {}）: {}",
                    friendship_id, operation_id, e
                );
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        "[FriendshipEngine] 回滚接受好友事务失败（操作ID: {}）: {}",
                        operation_id, rollback_err
                    );
                }
                return Err(e);
            }
        };
        tx.commit().await.context("提交接受好友事务失败")?;

        info!(
            "[FriendshipEngine] ✅ 好友关系 {} 已接受，双方各获得 {} 积分（操作ID: {}）",
            accepted.id, invitee_award.delta, operation_id
        );
        self.ledger.notify(&invitor_award).await;
        self.ledger.notify(&invitee_award).await;
        match serde_json::to_string(&accepted) {
            Ok(json) => self.listener.on_friendship_accepted(json).await,
            Err(e) => warn!(
                "[FriendshipEngine] 序列化好友关系 {} 失败，跳过接受通知: {}",
                accepted.id, e
            ),
        }

        Ok(AcceptedFriendship {
            friendship: accepted,
            invitor_award,
            invitee_award,
        })
    }

    /// 在接受事务中为双方各发放一次"成为好友"积分
    async fn award_friendship_formed(
        &self,
        conn: &mut SqliteConnection,
        friendship: &Friendship,
    ) -> RewardsResult<(PointAwardReceipt, PointAwardReceipt)> {
        let invitor_award = self
            .ledger
            .award_on(conn, friendship.invitor_id, PointReason::FriendshipFormed)
            .await?;
        let invitee_award = self
            .ledger
            .award_on(conn, friendship.invitee_id, PointReason::FriendshipFormed)
            .await?;
        Ok((invitor_award, invitee_award))
    }

    /// 拒绝邀请或解除好友关系（任一方均可），不扣除积分
    pub async fn decline_or_remove(
        &self,
        friendship_id: i64,
        acting_user_id: i64,
    ) -> RewardsResult<()> {
        let operation_id = Uuid::new_v4();
        info!(
            "[FriendshipEngine] 🗑️ 用户 {} 删除好友关系 {}（操作ID: {}）",
            acting_user_id, friendship_id, operation_id
        );

        let friendship = self.require_friendship(friendship_id).await?;
        if !friendship.involves(acting_user_id) {
            warn!(
                "[FriendshipEngine] 用户 {} 不是好友关系 {} 的任何一方，拒绝删除",
                acting_user_id, friendship_id
            );
            return Err(RewardsError::forbidden("只有好友关系双方可以删除该关系"));
        }

        if !self.friendship_dao.delete_friendship(friendship_id).await? {
            // 检查之后被另一方并发删除
            return Err(RewardsError::not_found(format!(
                "好友关系 {} 不存在",
                friendship_id
            )));
        }

        let action = match friendship.status {
            FriendshipStatus::Invited => "拒绝邀请",
            FriendshipStatus::Accepted => "解除好友",
        };
        info!(
            "[FriendshipEngine] ✅ 用户 {} {}，好友关系 {} 已删除（操作ID: {}）",
            acting_user_id, action, friendship_id, operation_id
        );
        self.listener
            .on_friendship_removed(friendship_id, acting_user_id)
            .await;
        Ok(())
    }

    /// 查询用户的全部好友关系，另一方统一放在 `friend` 中
    pub async fn list_for(&self, user_id: i64) -> RewardsResult<Vec<FriendshipEntry>> {
        self.require_user(user_id).await?;
        let entries = self
            .friendship_dao
            .list_friendships_with_friend(user_id)
            .await?
            .into_iter()
            .map(|(friendship, friend)| FriendshipEntry {
                is_invitor: friendship.invitor_id == user_id,
                friendship,
                friend,
            })
            .collect::<Vec<_>>();
        debug!(
            "[FriendshipEngine] 用户 {} 的好友关系共 {} 条",
            user_id,
            entries.len()
        );
        Ok(entries)
    }
}
