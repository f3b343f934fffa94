//! 用户模块
//!
//! 用户聚合的存储访问，以及创建用户时分配好友码的开通流程

pub mod dao;
pub mod models;
pub mod provisioner;

// 重新导出主要类型
pub use dao::UserDao;
pub use models::{NewUser, PointsIncrement, SetCodeOutcome, User};
pub use provisioner::UserProvisioner;
