//! 积分与好友核心入口
//!
//! 负责组装连接池、DAO、好友码分配器、积分账本与好友关系引擎，
//! 对外提供 HTTP 层映射的全部操作。

use crate::rewards::config::RewardsConfig;
use crate::rewards::db::create_sqlite_pool_with_migration;
use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::friends_code::FriendsCodeAllocator;
use crate::rewards::friendship::{
    AcceptedFriendship, Friendship, FriendshipDao, FriendshipEngine, FriendshipEntry,
};
use crate::rewards::listener::{EmptyRewardsListener, RewardsListener};
use crate::rewards::points::{PointAwardReceipt, PointReason, PointsLedger};
use crate::rewards::user::{NewUser, User, UserDao, UserProvisioner};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tracing::info;

/// 积分与好友核心
#[derive(Clone)]
pub struct RewardsCore {
    config: RewardsConfig,
    db: Pool<Sqlite>,
    user_dao: UserDao,
    allocator: FriendsCodeAllocator,
    provisioner: UserProvisioner,
    ledger: PointsLedger,
    friendships: FriendshipEngine,
}

impl RewardsCore {
    /// 连接数据库并组装核心（使用默认空监听器）
    pub async fn connect(config: RewardsConfig) -> RewardsResult<Self> {
        Self::connect_with_listener(config, Arc::new(EmptyRewardsListener)).await
    }

    /// 连接数据库并组装核心（带自定义监听器）
    pub async fn connect_with_listener(
        config: RewardsConfig,
        listener: Arc<dyn RewardsListener>,
    ) -> RewardsResult<Self> {
        config.validate()?;
        let db = create_sqlite_pool_with_migration(&config).await?;
        Self::with_pool(config, db, listener)
    }

    /// 使用已有连接池组装核心（连接池需已执行迁移）
    pub fn with_pool(
        config: RewardsConfig,
        db: Pool<Sqlite>,
        listener: Arc<dyn RewardsListener>,
    ) -> RewardsResult<Self> {
        let allocator = FriendsCodeAllocator::new(config.friends_code_width)?;
        let user_dao = UserDao::new(db.clone());
        let friendship_dao = FriendshipDao::new(db.clone());
        let ledger = PointsLedger::with_listener(
            user_dao.clone(),
            config.points.clone(),
            config.max_award_retries,
            listener.clone(),
        );
        let friendships = FriendshipEngine::with_listener(
            user_dao.clone(),
            friendship_dao,
            allocator,
            ledger.clone(),
            listener,
        );
        let provisioner = UserProvisioner::new(user_dao.clone(), allocator);

        info!(
            "[RewardsCore] 核心已就绪，好友码宽度 {}（容量 {}）",
            allocator.width(),
            allocator.capacity()
        );
        Ok(Self {
            config,
            db,
            user_dao,
            allocator,
            provisioner,
            ledger,
            friendships,
        })
    }

    pub fn config(&self) -> &RewardsConfig {
        &self.config
    }

    pub fn allocator(&self) -> &FriendsCodeAllocator {
        &self.allocator
    }

    pub fn ledger(&self) -> &PointsLedger {
        &self.ledger
    }

    pub fn friendships(&self) -> &FriendshipEngine {
        &self.friendships
    }

    /// 开通用户并分配好友码
    pub async fn provision_user(&self, new_user: &NewUser) -> RewardsResult<User> {
        self.provisioner.provision(new_user).await
    }

    /// 补发缺失的好友码
    pub async fn backfill_friends_codes(&self) -> RewardsResult<usize> {
        self.provisioner.backfill_missing_codes().await
    }

    pub async fn user_by_id(&self, user_id: i64) -> RewardsResult<User> {
        self.user_dao
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("用户 {} 不存在", user_id)))
    }

    pub async fn user_by_uid(&self, uid: &str) -> RewardsResult<User> {
        self.user_dao
            .get_user_by_uid(uid)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("uid {} 对应的用户不存在", uid)))
    }

    pub async fn user_by_code(&self, code: &str) -> RewardsResult<User> {
        let code = self.allocator.normalize(code)?;
        self.user_dao
            .get_user_by_code(&code)
            .await?
            .ok_or_else(|| RewardsError::not_found(format!("好友码 {} 不存在", code)))
    }

    /// 通过好友码发起好友邀请
    pub async fn create_friendship(
        &self,
        acting_user_id: i64,
        friends_code: &str,
    ) -> RewardsResult<Friendship> {
        self.friendships.invite(acting_user_id, friends_code).await
    }

    /// 接受好友邀请
    pub async fn accept_friendship(
        &self,
        acting_user_id: i64,
        friendship_id: i64,
    ) -> RewardsResult<AcceptedFriendship> {
        self.friendships.accept(friendship_id, acting_user_id).await
    }

    /// 拒绝邀请或解除好友关系
    pub async fn decline_or_remove_friendship(
        &self,
        acting_user_id: i64,
        friendship_id: i64,
    ) -> RewardsResult<()> {
        self.friendships
            .decline_or_remove(friendship_id, acting_user_id)
            .await
    }

    /// 查询好友列表
    pub async fn list_friendships(&self, acting_user_id: i64) -> RewardsResult<Vec<FriendshipEntry>> {
        self.friendships.list_for(acting_user_id).await
    }

    /// 按行为发放积分（供内容发布、浏览、回应等外部处理器调用）
    pub async fn award_points(
        &self,
        target_user_id: i64,
        reason: PointReason,
    ) -> RewardsResult<PointAwardReceipt> {
        self.ledger.award(target_user_id, reason).await
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.db.close().await;
    }
}
