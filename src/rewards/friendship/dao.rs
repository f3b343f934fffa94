//! 好友关系数据访问层（DAO）
//!
//! friendships 表上的 `UNIQUE (pair_low, pair_high)` 保证同一对用户至多一条关系，
//! 并发邀请时后插入的一方在这里被识别为冲突。

use crate::rewards::db::now_millis;
use crate::rewards::error::is_unique_violation;
use crate::rewards::friendship::models::{pair_key, Friendship, FriendshipStatus};
use crate::rewards::user::dao::row_to_user;
use crate::rewards::user::User;
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tracing::{debug, info, warn};

const FRIENDSHIP_COLUMNS: &str = "id, invitor_id, invitee_id, status, created_at, updated_at";

/// 好友关系 DAO（基于 sqlx）
#[derive(Clone)]
pub struct FriendshipDao {
    db: Pool<Sqlite>,
}

fn row_to_friendship(row: &SqliteRow, prefix: &str) -> Result<Friendship> {
    let column = |name: &str| format!("{prefix}{name}");
    let status: String = row.try_get(column("status").as_str())?;
    Ok(Friendship {
        id: row.try_get(column("id").as_str())?,
        invitor_id: row.try_get(column("invitor_id").as_str())?,
        invitee_id: row.try_get(column("invitee_id").as_str())?,
        status: status.parse::<FriendshipStatus>().map_err(|e| anyhow!(e))?,
        created_at: row.try_get(column("created_at").as_str())?,
        updated_at: row.try_get(column("updated_at").as_str())?,
    })
}

impl FriendshipDao {
    /// 创建新的好友关系 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 新建 INVITED 状态的好友关系；该用户对已存在关系时返回 `None`
    pub async fn create_friendship(
        &self,
        invitor_id: i64,
        invitee_id: i64,
    ) -> Result<Option<Friendship>> {
        let (low, high) = pair_key(invitor_id, invitee_id);
        let now = now_millis();
        let sql = format!(
            r#"
            INSERT INTO friendships (
                invitor_id, invitee_id, pair_low, pair_high, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {FRIENDSHIP_COLUMNS}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(invitor_id)
            .bind(invitee_id)
            .bind(low)
            .bind(high)
            .bind(FriendshipStatus::Invited.as_str())
            .bind(now)
            .bind(now)
            .fetch_all(&self.db)
            .await;

        match result {
            Ok(rows) => {
                let row = rows
                    .first()
                    .ok_or_else(|| anyhow!("插入好友关系未返回记录"))?;
                let friendship = row_to_friendship(row, "")?;
                info!(
                    "[FriendshipDAO] 新建好友关系 id={}, {} -> {}",
                    friendship.id, invitor_id, invitee_id
                );
                Ok(Some(friendship))
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(
                    "[FriendshipDAO] 用户对 ({}, {}) 已存在好友关系，插入被唯一约束拒绝",
                    low, high
                );
                Ok(None)
            }
            Err(e) => Err(e).context("插入好友关系失败"),
        }
    }

    /// 按 id 查询好友关系
    pub async fn get_friendship_by_id(&self, id: i64) -> Result<Option<Friendship>> {
        let sql = format!("SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("查询好友关系失败")?;
        row.map(|r| row_to_friendship(&r, "")).transpose()
    }

    /// 查询两个用户之间的好友关系（不区分方向）
    pub async fn find_friendship_for_pair(&self, a: i64, b: i64) -> Result<Option<Friendship>> {
        let (low, high) = pair_key(a, b);
        let sql = format!(
            "SELECT {FRIENDSHIP_COLUMNS} FROM friendships WHERE pair_low = ? AND pair_high = ?"
        );
        let row = sqlx::query(&sql)
            .bind(low)
            .bind(high)
            .fetch_optional(&self.db)
            .await
            .context("按用户对查询好友关系失败")?;
        row.map(|r| row_to_friendship(&r, "")).transpose()
    }

    /// 开启写事务
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.db.begin().await.context("开启数据库事务失败")
    }

    /// 条件更新状态：仅当当前状态为 `from` 时改为 `to`，返回更新后的记录
    ///
    /// 状态已被并发修改或记录不存在时返回 `None`
    pub async fn update_friendship_status(
        &self,
        id: i64,
        from: FriendshipStatus,
        to: FriendshipStatus,
    ) -> Result<Option<Friendship>> {
        let mut conn = self.db.acquire().await.context("获取数据库连接失败")?;
        Self::update_friendship_status_on(&mut conn, id, from, to).await
    }

    /// 在指定连接（或事务）上执行条件状态更新
    pub async fn update_friendship_status_on(
        conn: &mut SqliteConnection,
        id: i64,
        from: FriendshipStatus,
        to: FriendshipStatus,
    ) -> Result<Option<Friendship>> {
        let sql = format!(
            r#"
            UPDATE friendships
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING {FRIENDSHIP_COLUMNS}
            "#
        );
        // RETURNING 语句一次性取完，语句执行完毕即释放写锁
        let rows = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(now_millis())
            .bind(id)
            .bind(from.as_str())
            .fetch_all(&mut *conn)
            .await
            .context("更新好友关系状态失败")?;

        let updated = rows
            .first()
            .map(|r| row_to_friendship(r, ""))
            .transpose()?;
        debug!(
            "[FriendshipDAO] 好友关系 {} 状态 {} -> {}，生效: {}",
            id,
            from,
            to,
            updated.is_some()
        );
        Ok(updated)
    }

    /// 删除好友关系，返回是否删除了记录
    pub async fn delete_friendship(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM friendships WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await
            .context("删除好友关系失败")?;
        Ok(result.rows_affected() > 0)
    }

    /// 查询与某个用户相关的全部好友关系，并带出另一方的用户信息
    pub async fn list_friendships_with_friend(
        &self,
        user_id: i64,
    ) -> Result<Vec<(Friendship, User)>> {
        let rows = sqlx::query(
            r#"
            SELECT
                f.id          AS f_id,
                f.invitor_id  AS f_invitor_id,
                f.invitee_id  AS f_invitee_id,
                f.status      AS f_status,
                f.created_at  AS f_created_at,
                f.updated_at  AS f_updated_at,
                u.id,
                u.uid,
                u.username,
                u.email,
                u.friends_code,
                u.points,
                u.created_at,
                u.updated_at
            FROM friendships f
            JOIN users u
              ON u.id = CASE WHEN f.invitor_id = ? THEN f.invitee_id ELSE f.invitor_id END
            WHERE f.invitor_id = ? OR f.invitee_id = ?
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("查询好友列表失败")?;

        let entries = rows
            .iter()
            .map(|row| {
                let friendship = row_to_friendship(row, "f_")?;
                let friend = row_to_user(row).context("解析好友用户信息失败")?;
                Ok((friendship, friend))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "[FriendshipDAO] 用户 {} 的好友关系共 {} 条",
            user_id,
            entries.len()
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::test_support::open_test_pool;
    use crate::rewards::user::{NewUser, UserDao};

    async fn setup() -> (tempfile::TempDir, FriendshipDao, i64, i64, i64) {
        let (dir, pool) = open_test_pool().await;
        let users = UserDao::new(pool.clone());
        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let user = users
                .create_user(&NewUser::new(
                    format!("uid-{name}"),
                    name,
                    format!("{name}@example.com"),
                ))
                .await
                .unwrap()
                .unwrap();
            ids.push(user.id);
        }
        (dir, FriendshipDao::new(pool), ids[0], ids[1], ids[2])
    }

    #[tokio::test]
    async fn reverse_direction_insert_hits_the_pair_constraint() {
        let (_dir, dao, a, b, _c) = setup().await;

        let created = dao.create_friendship(a, b).await.unwrap().unwrap();
        assert_eq!(created.status, FriendshipStatus::Invited);
        assert!(dao.create_friendship(b, a).await.unwrap().is_none());
        assert!(dao.create_friendship(a, b).await.unwrap().is_none());

        let found = dao.find_friendship_for_pair(b, a).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn self_friendship_is_rejected_by_storage() {
        let (_dir, dao, a, _b, _c) = setup().await;
        assert!(dao.create_friendship(a, a).await.is_err());
    }

    #[tokio::test]
    async fn status_update_is_conditional() {
        let (_dir, dao, a, b, _c) = setup().await;
        let f = dao.create_friendship(a, b).await.unwrap().unwrap();

        let accepted = dao
            .update_friendship_status(f.id, FriendshipStatus::Invited, FriendshipStatus::Accepted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, FriendshipStatus::Accepted);

        let again = dao
            .update_friendship_status(f.id, FriendshipStatus::Invited, FriendshipStatus::Accepted)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn list_exposes_the_other_party() {
        let (_dir, dao, a, b, c) = setup().await;
        dao.create_friendship(a, b).await.unwrap();
        dao.create_friendship(c, a).await.unwrap();

        let entries = dao.list_friendships_with_friend(a).await.unwrap();
        let friends: Vec<i64> = entries.iter().map(|(_, u)| u.id).collect();
        assert_eq!(friends, vec![b, c]);

        let for_b = dao.list_friendships_with_friend(b).await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].1.id, a);
    }

    #[tokio::test]
    async fn delete_reports_whether_a_row_was_removed() {
        let (_dir, dao, a, b, _c) = setup().await;
        let f = dao.create_friendship(a, b).await.unwrap().unwrap();
        assert!(dao.delete_friendship(f.id).await.unwrap());
        assert!(!dao.delete_friendship(f.id).await.unwrap());
        assert!(dao.get_friendship_by_id(f.id).await.unwrap().is_none());
    }
}
