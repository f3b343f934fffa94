//! 好友码分配器
//!
//! 把用户的顺序序号（`user.id - 1`）编码成定长的 36 进制字符串（`0-9A-Z`），
//! 并支持反向解码。映射在 `[0, 36^W)` 上是双射，序号唯一即好友码唯一，
//! 因此分配时无需再查库判重；序号的唯一与单调由 `users.id AUTOINCREMENT` 保证。

use crate::rewards::error::{RewardsError, RewardsResult};

/// 默认好友码宽度
pub const DEFAULT_CODE_WIDTH: u32 = 5;

const RADIX: u64 = 36;
const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 好友码分配器（纯函数，无副作用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendsCodeAllocator {
    width: u32,
    capacity: u64,
}

impl Default for FriendsCodeAllocator {
    fn default() -> Self {
        Self {
            width: DEFAULT_CODE_WIDTH,
            capacity: RADIX.pow(DEFAULT_CODE_WIDTH),
        }
    }
}

impl FriendsCodeAllocator {
    /// 创建指定宽度的分配器，宽度需在 `1..=12` 之间（36^12 仍在 u64 范围内）
    pub fn new(width: u32) -> RewardsResult<Self> {
        if !(1..=12).contains(&width) {
            return Err(RewardsError::invalid_argument(format!(
                "好友码宽度必须在 1..=12 之间，实际为 {}",
                width
            )));
        }
        Ok(Self {
            width,
            capacity: RADIX.pow(width),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// 可分配的好友码总数（36^W）
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// 用户 id 对应的序号（第一个用户 id = 1 → 序号 0）
    pub fn ordinal_for_user(user_id: i64) -> RewardsResult<i64> {
        user_id
            .checked_sub(1)
            .ok_or_else(|| RewardsError::invalid_argument(format!("非法的用户 id: {}", user_id)))
    }

    /// 直接为用户 id 生成好友码
    pub fn code_for_user(&self, user_id: i64) -> RewardsResult<String> {
        self.encode(Self::ordinal_for_user(user_id)?)
    }

    /// 序号 → 好友码
    pub fn encode(&self, ordinal: i64) -> RewardsResult<String> {
        let Ok(mut n) = u64::try_from(ordinal) else {
            return Err(RewardsError::invalid_argument(format!(
                "序号不能为负数: {}",
                ordinal
            )));
        };
        if n >= self.capacity {
            return Err(RewardsError::CapacityExceeded {
                ordinal,
                capacity: self.capacity,
            });
        }

        let width = self.width as usize;
        let mut buf = vec![b'0'; width];
        for slot in buf.iter_mut().rev() {
            // n < 36^width，循环结束时必然归零
            *slot = DIGITS[(n % RADIX) as usize];
            n /= RADIX;
        }
        Ok(buf.into_iter().map(char::from).collect())
    }

    /// 好友码 → 序号；大小写不敏感
    pub fn decode(&self, code: &str) -> RewardsResult<i64> {
        if code.chars().count() != self.width as usize {
            return Err(RewardsError::invalid_argument(format!(
                "好友码长度必须为 {}: {:?}",
                self.width, code
            )));
        }

        let mut value: u64 = 0;
        for c in code.chars() {
            let digit = c.to_digit(RADIX as u32).ok_or_else(|| {
                RewardsError::invalid_argument(format!("好友码包含非法字符 {:?}: {:?}", c, code))
            })?;
            value = value * RADIX + u64::from(digit);
        }

        // width <= 12 时 value < 36^12 < i64::MAX
        i64::try_from(value).map_err(|_| {
            RewardsError::invalid_argument(format!("好友码超出序号范围: {:?}", code))
        })
    }

    /// 规范化用户输入的好友码（去空白、转大写），并校验格式
    pub fn normalize(&self, code: &str) -> RewardsResult<String> {
        let normalized = code.trim().to_ascii_uppercase();
        self.decode(&normalized)?;
        Ok(normalized)
    }
}
