//! 积分策略：每种行为对应的固定积分

use crate::rewards::error::{RewardsError, RewardsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 触发积分奖励的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointReason {
    /// 发布内容（足迹）
    ContentCreated,
    /// 浏览内容
    ContentViewed,
    /// 发表回应
    ReactionPosted,
    /// 成为好友
    FriendshipFormed,
    /// 编辑个人资料
    ProfileEdited,
    /// 收听音频
    AudioListened,
}

impl PointReason {
    pub const ALL: [PointReason; 6] = [
        PointReason::ContentCreated,
        PointReason::ContentViewed,
        PointReason::ReactionPosted,
        PointReason::FriendshipFormed,
        PointReason::ProfileEdited,
        PointReason::AudioListened,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PointReason::ContentCreated => "content-created",
            PointReason::ContentViewed => "content-viewed",
            PointReason::ReactionPosted => "reaction-posted",
            PointReason::FriendshipFormed => "friendship-formed",
            PointReason::ProfileEdited => "profile-edited",
            PointReason::AudioListened => "audio-listened",
        }
    }
}

impl fmt::Display for PointReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PointReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = PointReason::ALL.iter().map(|r| r.as_str()).collect();
                format!("未知的积分行为 {:?}，可选: {}", s, names.join(", "))
            })
    }
}

/// 积分策略配置（各行为的积分值，均为正整数）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PointPolicy {
    pub content_created: i64,
    pub content_viewed: i64,
    pub reaction_posted: i64,
    pub friendship_formed: i64,
    pub profile_edited: i64,
    pub audio_listened: i64,
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            content_created: 300,
            content_viewed: 500,
            reaction_posted: 150,
            friendship_formed: 250,
            profile_edited: 50,
            audio_listened: 50,
        }
    }
}

impl PointPolicy {
    /// 查询某个行为对应的积分
    pub fn magnitude(&self, reason: PointReason) -> i64 {
        match reason {
            PointReason::ContentCreated => self.content_created,
            PointReason::ContentViewed => self.content_viewed,
            PointReason::ReactionPosted => self.reaction_posted,
            PointReason::FriendshipFormed => self.friendship_formed,
            PointReason::ProfileEdited => self.profile_edited,
            PointReason::AudioListened => self.audio_listened,
        }
    }

    /// 所有积分值必须为正
    pub fn validate(&self) -> RewardsResult<()> {
        for reason in PointReason::ALL {
            let magnitude = self.magnitude(reason);
            if magnitude <= 0 {
                return Err(RewardsError::invalid_argument(format!(
                    "积分策略 {} 必须为正数，实际为 {}",
                    reason, magnitude
                )));
            }
        }
        Ok(())
    }
}
