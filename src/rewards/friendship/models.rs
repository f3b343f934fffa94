//! 好友关系模型定义

use crate::rewards::points::PointAwardReceipt;
use crate::rewards::user::User;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 好友关系状态；解除关系直接删除记录，不单独建状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Invited,
    Accepted,
}

impl FriendshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendshipStatus::Invited => "INVITED",
            FriendshipStatus::Accepted => "ACCEPTED",
        }
    }
}

impl fmt::Display for FriendshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INVITED" => Ok(FriendshipStatus::Invited),
            "ACCEPTED" => Ok(FriendshipStatus::Accepted),
            other => Err(format!("未知的好友关系状态: {}", other)),
        }
    }
}

/// 好友关系：方向上区分邀请人与被邀请人，语义上对称
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: i64,
    /// 邀请人用户 id
    pub invitor_id: i64,
    /// 被邀请人用户 id
    pub invitee_id: i64,
    pub status: FriendshipStatus,
    /// 创建时间（毫秒）
    pub created_at: i64,
    /// 更新时间（毫秒）
    pub updated_at: i64,
}

impl Friendship {
    /// 用户是否是这段关系的一方
    pub fn involves(&self, user_id: i64) -> bool {
        self.invitor_id == user_id || self.invitee_id == user_id
    }

    /// 对某一方而言的"另一方"；不是关系一方时返回 `None`
    pub fn other_party(&self, user_id: i64) -> Option<i64> {
        if self.invitor_id == user_id {
            Some(self.invitee_id)
        } else if self.invitee_id == user_id {
            Some(self.invitor_id)
        } else {
            None
        }
    }
}

/// 无序用户对的规范化键 `(min, max)`
pub fn pair_key(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// 好友列表条目：无论当前用户是邀请人还是被邀请人，另一方都放在 `friend` 中
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipEntry {
    pub friendship: Friendship,
    pub friend: User,
    /// 当前用户是否是邀请人
    pub is_invitor: bool,
}

/// 接受好友邀请的结果：关系本身以及双方获得的积分
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedFriendship {
    pub friendship: Friendship,
    pub invitor_award: PointAwardReceipt,
    pub invitee_award: PointAwardReceipt,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Friendship {
        Friendship {
            id: 7,
            invitor_id: 1,
            invitee_id: 2,
            status: FriendshipStatus::Invited,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn other_party_is_symmetric() {
        let f = sample();
        assert_eq!(f.other_party(1), Some(2));
        assert_eq!(f.other_party(2), Some(1));
        assert_eq!(f.other_party(3), None);
        assert!(f.involves(2));
        assert!(!f.involves(3));
    }

    #[test]
    fn pair_key_ignores_direction() {
        assert_eq!(pair_key(5, 3), (3, 5));
        assert_eq!(pair_key(3, 5), (3, 5));
    }

    #[test]
    fn status_uses_storage_names() {
        assert_eq!(
            "ACCEPTED".parse::<FriendshipStatus>().unwrap(),
            FriendshipStatus::Accepted
        );
        assert!("REMOVED".parse::<FriendshipStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&FriendshipStatus::Invited).unwrap(),
            "\"INVITED\""
        );
    }
}
