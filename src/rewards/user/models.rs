//! 用户模型定义

use serde::{Deserialize, Serialize};

/// 用户聚合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// 存储分配的顺序 id，好友码分配的依据
    pub id: i64,
    /// 外部认证系统的 subject
    pub uid: String,
    pub username: String,
    pub email: String,
    /// 好友码，创建后分配一次，此后不变
    pub friends_code: Option<String>,
    /// 累计积分
    pub points: i64,
    /// 创建时间（毫秒）
    pub created_at: i64,
    /// 更新时间（毫秒）
    pub updated_at: i64,
}

/// 新建用户的入参（由外部开通流程提供）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub uid: String,
    pub username: String,
    pub email: String,
}

impl NewUser {
    pub fn new(
        uid: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

/// 写入好友码的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCodeOutcome {
    /// 写入成功
    Assigned,
    /// 该用户已有好友码
    AlreadyAssigned,
    /// 好友码已被其他用户占用
    CodeTaken,
    /// 用户不存在
    UserMissing,
}

/// 积分累加结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsIncrement {
    /// 已写入，携带累加后的总分
    Applied(i64),
    /// 用户不存在
    UserMissing,
    /// 累加后超出 i64 范围，未写入
    Overflow,
}
