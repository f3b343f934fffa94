//! 好友关系模块
//!
//! 通过好友码邀请、接受、拒绝/解除好友关系，以及查询好友列表

pub mod dao;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use dao::FriendshipDao;
pub use models::{AcceptedFriendship, Friendship, FriendshipEntry, FriendshipStatus};
pub use service::FriendshipEngine;
