//! 用户开通流程：创建用户后立即分配好友码
//!
//! 好友码由用户 id 推导（`id - 1` 编码为 36 进制），写入采用"仅当为空时写入"，
//! 因此同一个用户的好友码只会被分配一次。

use crate::rewards::error::{RewardsError, RewardsResult};
use crate::rewards::friends_code::FriendsCodeAllocator;
use crate::rewards::user::dao::UserDao;
use crate::rewards::user::models::{NewUser, SetCodeOutcome, User};
use tracing::{error, info, warn};

/// 用户开通器
#[derive(Clone)]
pub struct UserProvisioner {
    user_dao: UserDao,
    allocator: FriendsCodeAllocator,
}

impl UserProvisioner {
    pub fn new(user_dao: UserDao, allocator: FriendsCodeAllocator) -> Self {
        Self {
            user_dao,
            allocator,
        }
    }

    /// 创建用户并分配好友码
    pub async fn provision(&self, new_user: &NewUser) -> RewardsResult<User> {
        if new_user.uid.trim().is_empty()
            || new_user.username.trim().is_empty()
            || new_user.email.trim().is_empty()
        {
            return Err(RewardsError::invalid_argument(
                "uid、username、email 均不能为空",
            ));
        }

        let user = self.user_dao.create_user(new_user).await?.ok_or_else(|| {
            RewardsError::already_exists(format!(
                "uid/username/email 已被占用: {} / {} / {}",
                new_user.uid, new_user.username, new_user.email
            ))
        })?;

        let code = self.assign_code(user.id).await?;
        info!(
            "[Provision] ✅ 用户开通完成 id={}, username={}, 好友码={}",
            user.id, user.username, code
        );
        Ok(User {
            friends_code: Some(code),
            ..user
        })
    }

    /// 为尚未分配好友码的用户补发好友码，返回补发数量
    pub async fn backfill_missing_codes(&self) -> RewardsResult<usize> {
        let ids = self.user_dao.get_user_ids_without_code().await?;
        let mut assigned = 0;
        for id in ids {
            match self.assign_code(id).await {
                Ok(_) => assigned += 1,
                // 其他实例已经并发补发过
                Err(RewardsError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if assigned > 0 {
            info!("[Provision] 补发好友码 {} 个", assigned);
        }
        Ok(assigned)
    }

    async fn assign_code(&self, user_id: i64) -> RewardsResult<String> {
        let code = match self.allocator.code_for_user(user_id) {
            Ok(code) => code,
            Err(e @ RewardsError::CapacityExceeded { .. }) => {
                error!(
                    "[Provision] ❌ 好友码空间已耗尽（容量 {}），用户 {} 无法分配好友码",
                    self.allocator.capacity(),
                    user_id
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let result = match self.user_dao.set_friends_code(user_id, &code).await? {
            SetCodeOutcome::Assigned => Ok(code),
            SetCodeOutcome::AlreadyAssigned => Err(RewardsError::already_exists(format!(
                "用户 {} 已分配好友码",
                user_id
            ))),
            SetCodeOutcome::UserMissing => {
                Err(RewardsError::not_found(format!("用户 {} 不存在", user_id)))
            }
            SetCodeOutcome::CodeTaken => {
                // id 唯一则好友码唯一，走到这里说明身份源被破坏
                error!(
                    "[Provision] ❌ 好友码 {} 已被其他用户占用，用户 {} 的 id 序列可能被重置",
                    code, user_id
                );
                Err(RewardsError::Internal(anyhow::anyhow!(
                    "好友码 {} 冲突（用户 {}）",
                    code,
                    user_id
                )))
            }
        };
        result.inspect_err(|e| warn!("[Provision] 用户 {} 分配好友码失败: {}", user_id, e))
    }
}
