pub mod config;
pub mod db;
pub mod error;
pub mod friends_code;
pub mod friendship;
pub mod listener;
pub mod points;
pub mod rewards_core;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出核心入口与错误类型
pub use config::RewardsConfig;
pub use error::{ErrorKind, RewardsError, RewardsResult};
pub use rewards_core::RewardsCore;
