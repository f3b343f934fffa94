//! 用户数据访问层（DAO）
//!
//! 负责 users 表的所有读写。积分只能通过 [`UserDao::increment_points`]
//! 以单条原子 UPDATE 修改，好友码只能通过 [`UserDao::set_friends_code`] 写入一次。

use crate::rewards::db::now_millis;
use crate::rewards::error::is_unique_violation;
use crate::rewards::user::models::{NewUser, PointsIncrement, SetCodeOutcome, User};
use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, warn};

const USER_COLUMNS: &str =
    "id, uid, username, email, friends_code, points, created_at, updated_at";

/// 用户 DAO（基于 sqlx）
#[derive(Clone)]
pub struct UserDao {
    db: Pool<Sqlite>,
}

pub(crate) fn row_to_user(row: &SqliteRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        uid: row.try_get("uid")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        friends_code: row.try_get("friends_code")?,
        points: row.try_get("points")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl UserDao {
    /// 创建新的用户 DAO
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 插入新用户（id 由存储分配，好友码为空，积分为 0）
    ///
    /// uid / username / email 任一重复时返回 `None`
    pub async fn create_user(&self, new_user: &NewUser) -> Result<Option<User>> {
        let now = now_millis();
        let sql = format!(
            r#"
            INSERT INTO users (uid, username, email, points, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(&new_user.uid)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(now)
            .bind(now)
            .fetch_all(&self.db)
            .await;

        match result {
            Ok(rows) => {
                let row = rows.first().ok_or_else(|| anyhow!("插入用户未返回记录"))?;
                let user = row_to_user(row).context("解析用户记录失败")?;
                info!("[UserDAO] 创建用户 id={}, uid={}", user.id, user.uid);
                Ok(Some(user))
            }
            Err(e) if is_unique_violation(&e) => {
                warn!("[UserDAO] 创建用户冲突（uid/username/email 重复）: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("插入用户失败"),
        }
    }

    /// 按 id 查询用户
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("按 id 查询用户失败")?;
        row.as_ref()
            .map(row_to_user)
            .transpose()
            .context("解析用户记录失败")
    }

    /// 按外部认证 uid 查询用户
    pub async fn get_user_by_uid(&self, uid: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?");
        let row = sqlx::query(&sql)
            .bind(uid)
            .fetch_optional(&self.db)
            .await
            .context("按 uid 查询用户失败")?;
        row.as_ref()
            .map(row_to_user)
            .transpose()
            .context("解析用户记录失败")
    }

    /// 按好友码查询用户（调用方负责规范化好友码）
    pub async fn get_user_by_code(&self, code: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE friends_code = ?");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.db)
            .await
            .context("按好友码查询用户失败")?;
        row.as_ref()
            .map(row_to_user)
            .transpose()
            .context("解析用户记录失败")
    }

    /// 写入好友码，仅当该用户尚无好友码时生效
    pub async fn set_friends_code(&self, id: i64, code: &str) -> Result<SetCodeOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET friends_code = ?, updated_at = ?
            WHERE id = ? AND friends_code IS NULL
            "#,
        )
        .bind(code)
        .bind(now_millis())
        .bind(id)
        .execute(&self.db)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(e) if is_unique_violation(&e) => {
                warn!("[UserDAO] 好友码 {} 已被其他用户占用", code);
                return Ok(SetCodeOutcome::CodeTaken);
            }
            Err(e) => return Err(e).context("写入好友码失败"),
        };

        if result.rows_affected() == 1 {
            debug!("[UserDAO] 用户 {} 分配好友码 {}", id, code);
            return Ok(SetCodeOutcome::Assigned);
        }

        // 未更新任何行：要么用户不存在，要么已经有好友码
        match self.get_user_by_id(id).await? {
            Some(_) => Ok(SetCodeOutcome::AlreadyAssigned),
            None => Ok(SetCodeOutcome::UserMissing),
        }
    }

    /// 原子地累加积分
    ///
    /// 单条 `UPDATE ... SET points = points + ?`，并发累加不会互相覆盖。
    pub async fn increment_points(&self, id: i64, delta: i64) -> Result<PointsIncrement> {
        let mut conn = self.db.acquire().await.context("获取数据库连接失败")?;
        Self::increment_points_on(&mut conn, id, delta).await
    }

    /// 在指定连接（或事务）上累加积分
    ///
    /// 累加后会超出 i64 范围时不写入，返回 [`PointsIncrement::Overflow`]。
    pub async fn increment_points_on(
        conn: &mut SqliteConnection,
        id: i64,
        delta: i64,
    ) -> Result<PointsIncrement> {
        // RETURNING 语句一次性取完，语句执行完毕即释放写锁
        let rows = sqlx::query(
            r#"
            UPDATE users
            SET points = points + ?, updated_at = ?
            WHERE id = ? AND points <= 9223372036854775807 - ?
            RETURNING points
            "#,
        )
        .bind(delta)
        .bind(now_millis())
        .bind(id)
        .bind(delta)
        .fetch_all(&mut *conn)
        .await
        .context("累加用户积分失败")?;

        if let Some(row) = rows.first() {
            let total: i64 = row.try_get("points").context("解析累加后的积分失败")?;
            return Ok(PointsIncrement::Applied(total));
        }

        // 没有更新任何行：区分用户不存在与积分溢出
        let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("查询用户是否存在失败")?;
        if exists.is_some() {
            warn!("[UserDAO] 用户 {} 累加 {} 积分会溢出，已拒绝", id, delta);
            Ok(PointsIncrement::Overflow)
        } else {
            Ok(PointsIncrement::UserMissing)
        }
    }

    /// 查询尚未分配好友码的用户 id（按 id 升序）
    pub async fn get_user_ids_without_code(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT id FROM users WHERE friends_code IS NULL ORDER BY id")
            .fetch_all(&self.db)
            .await
            .context("查询未分配好友码的用户失败")?;
        let ids = rows
            .into_iter()
            .map(|r| r.try_get::<i64, _>("id"))
            .collect::<sqlx::Result<Vec<_>>>()
            .context("解析用户 id 失败")?;
        debug!("[UserDAO] 未分配好友码的用户共 {} 个", ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewards::test_support::open_test_pool;

    #[tokio::test]
    async fn create_user_assigns_sequential_ids() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);

        let alice = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();
        let bob = dao
            .create_user(&NewUser::new("uid-b", "bob", "b@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert_eq!(alice.points, 0);
        assert!(alice.friends_code.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_as_none() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);

        dao.create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap();
        let dup = dao
            .create_user(&NewUser::new("uid-x", "alice2", "a@example.com"))
            .await
            .unwrap();
        assert!(dup.is_none());
    }

    #[tokio::test]
    async fn friends_code_is_written_only_once() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);
        let user = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            dao.set_friends_code(user.id, "00000").await.unwrap(),
            SetCodeOutcome::Assigned
        );
        assert_eq!(
            dao.set_friends_code(user.id, "00009").await.unwrap(),
            SetCodeOutcome::AlreadyAssigned
        );
        assert_eq!(
            dao.set_friends_code(42, "00010").await.unwrap(),
            SetCodeOutcome::UserMissing
        );

        let stored = dao.get_user_by_code("00000").await.unwrap().unwrap();
        assert_eq!(stored.id, user.id);
        assert!(dao.get_user_by_code("00009").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn code_owned_by_another_user_is_rejected() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);
        let a = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();
        let b = dao
            .create_user(&NewUser::new("uid-b", "bob", "b@example.com"))
            .await
            .unwrap()
            .unwrap();

        dao.set_friends_code(a.id, "00000").await.unwrap();
        assert_eq!(
            dao.set_friends_code(b.id, "00000").await.unwrap(),
            SetCodeOutcome::CodeTaken
        );
    }

    #[tokio::test]
    async fn increment_points_returns_new_total() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);
        let user = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            dao.increment_points(user.id, 250).await.unwrap(),
            PointsIncrement::Applied(250)
        );
        assert_eq!(
            dao.increment_points(user.id, 50).await.unwrap(),
            PointsIncrement::Applied(300)
        );
        assert_eq!(
            dao.increment_points(999, 50).await.unwrap(),
            PointsIncrement::UserMissing
        );

        let by_uid = dao.get_user_by_uid("uid-a").await.unwrap().unwrap();
        assert_eq!(by_uid.points, 300);
    }

    #[tokio::test]
    async fn increment_past_i64_max_is_refused_without_writing() {
        let (_dir, pool) = open_test_pool().await;
        let dao = UserDao::new(pool);
        let user = dao
            .create_user(&NewUser::new("uid-a", "alice", "a@example.com"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            dao.increment_points(user.id, i64::MAX).await.unwrap(),
            PointsIncrement::Applied(i64::MAX)
        );
        assert_eq!(
            dao.increment_points(user.id, 1).await.unwrap(),
            PointsIncrement::Overflow
        );

        // 行仍然是整数，可以正常读出
        let reloaded = dao.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.points, i64::MAX);
    }
}
