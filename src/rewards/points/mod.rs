//! 积分模块
//!
//! 积分策略与积分账本

pub mod ledger;
pub mod policy;

// 重新导出主要类型
pub use ledger::{PointAward, PointAwardReceipt, PointsLedger};
pub use policy::{PointPolicy, PointReason};
