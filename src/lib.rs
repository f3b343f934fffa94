pub mod rewards;

// 重新导出常用类型和函数，方便外部使用
pub use rewards::{
    friends_code::FriendsCodeAllocator,
    friendship::{AcceptedFriendship, Friendship, FriendshipEngine, FriendshipEntry, FriendshipStatus},
    listener::{EmptyRewardsListener, RewardsListener},
    points::{PointAwardReceipt, PointPolicy, PointReason, PointsLedger},
    user::{NewUser, User},
    ErrorKind, RewardsConfig, RewardsCore, RewardsError, RewardsResult,
};
