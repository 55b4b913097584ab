use std::collections::{HashMap, HashSet};

use crate::{
    api::error,
    modules::follow::{
        repository::{FollowRepository, StatRepository},
        schema::{FanEntity, FollowEntity, FollowStatus, UserStatEntity},
    },
};

pub type PgTx = sqlx::Transaction<'static, sqlx::Postgres>;

#[derive(Clone)]
pub struct FollowRepositoryPg {
    pool: sqlx::PgPool,
}

impl FollowRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl FollowRepository for FollowRepositoryPg {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, error::SystemError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> Result<(), error::SystemError> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: PgTx) -> Result<(), error::SystemError> {
        tx.rollback().await?;
        Ok(())
    }

    async fn find_follow(
        &self,
        user_id: i64,
        followed_uid: i64,
    ) -> Result<Option<FollowEntity>, error::SystemError> {
        let follow = sqlx::query_as::<_, FollowEntity>(
            "SELECT * FROM user_follow WHERE user_id = $1 AND followed_uid = $2",
        )
        .bind(user_id)
        .bind(followed_uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(follow)
    }

    async fn create_follow(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        followed_uid: i64,
    ) -> Result<bool, error::SystemError> {
        let rows = sqlx::query(
            r#"
            INSERT INTO user_follow (user_id, followed_uid, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, followed_uid) DO UPDATE
                SET status = EXCLUDED.status, updated_at = NOW()
                WHERE user_follow.status <> EXCLUDED.status
            "#,
        )
        .bind(user_id)
        .bind(followed_uid)
        .bind(FollowStatus::Normal)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    async fn create_fan(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        follower_uid: i64,
    ) -> Result<bool, error::SystemError> {
        let rows = sqlx::query(
            r#"
            INSERT INTO user_fans (user_id, follower_uid, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, follower_uid) DO UPDATE
                SET status = EXCLUDED.status, updated_at = NOW()
                WHERE user_fans.status <> EXCLUDED.status
            "#,
        )
        .bind(user_id)
        .bind(follower_uid)
        .bind(FollowStatus::Normal)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    async fn update_follow_status(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        followed_uid: i64,
        status: FollowStatus,
    ) -> Result<bool, error::SystemError> {
        let rows = sqlx::query(
            r#"
            UPDATE user_follow SET status = $3, updated_at = NOW()
            WHERE user_id = $1 AND followed_uid = $2 AND status <> $3
            "#,
        )
        .bind(user_id)
        .bind(followed_uid)
        .bind(status)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    async fn update_fan_status(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        follower_uid: i64,
        status: FollowStatus,
    ) -> Result<bool, error::SystemError> {
        let rows = sqlx::query(
            r#"
            UPDATE user_fans SET status = $3, updated_at = NOW()
            WHERE user_id = $1 AND follower_uid = $2 AND status <> $3
            "#,
        )
        .bind(user_id)
        .bind(follower_uid)
        .bind(status)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    async fn find_followed_ids(
        &self,
        user_id: i64,
        target_ids: &[i64],
    ) -> Result<HashSet<i64>, error::SystemError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT followed_uid FROM user_follow
            WHERE user_id = $1 AND followed_uid = ANY($2) AND status = $3
            "#,
        )
        .bind(user_id)
        .bind(target_ids)
        .bind(FollowStatus::Normal)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn find_fan_ids(
        &self,
        user_id: i64,
        target_ids: &[i64],
    ) -> Result<HashSet<i64>, error::SystemError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT follower_uid FROM user_fans
            WHERE user_id = $1 AND follower_uid = ANY($2) AND status = $3
            "#,
        )
        .bind(user_id)
        .bind(target_ids)
        .bind(FollowStatus::Normal)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn find_following_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FollowEntity>, error::SystemError> {
        let rows = sqlx::query_as::<_, FollowEntity>(
            r#"
            SELECT * FROM user_follow
            WHERE user_id = $1 AND id < $2 AND status = $3
            ORDER BY id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(last_id)
        .bind(FollowStatus::Normal)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_follower_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FanEntity>, error::SystemError> {
        let rows = sqlx::query_as::<_, FanEntity>(
            r#"
            SELECT * FROM user_fans
            WHERE user_id = $1 AND id < $2 AND status = $3
            ORDER BY id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(last_id)
        .bind(FollowStatus::Normal)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[derive(Clone)]
pub struct UserStatRepositoryPg {
    pool: sqlx::PgPool,
}

impl UserStatRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StatRepository for UserStatRepositoryPg {
    type Tx = PgTx;

    async fn incr_following_count(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        delta: i64,
    ) -> Result<(), error::SystemError> {
        sqlx::query(
            r#"
            INSERT INTO user_stat (user_id, following_count) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
                SET following_count = user_stat.following_count + $2, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn incr_follower_count(
        &self,
        tx: &mut PgTx,
        user_id: i64,
        delta: i64,
    ) -> Result<(), error::SystemError> {
        sqlx::query(
            r#"
            INSERT INTO user_stat (user_id, follower_count) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
                SET follower_count = user_stat.follower_count + $2, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn find_stats_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, UserStatEntity>, error::SystemError> {
        let stats = sqlx::query_as::<_, UserStatEntity>(
            "SELECT user_id, following_count, follower_count FROM user_stat WHERE user_id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(stats.into_iter().map(|s| (s.user_id, s)).collect())
    }
}
