use std::collections::{HashMap, HashSet};

use crate::{
    api::error,
    modules::follow::schema::{FanEntity, FollowEntity, FollowStatus, UserStatEntity},
};

/// Follow and fan rows. Owns the transaction handle that the stat
/// repository joins, so a whole follow transition commits as one unit.
///
/// The write methods return whether the row actually changed state; a
/// no-op (already Normal on create, already at `status` on update) returns
/// `false`. Callers rely on this to keep counters idempotent.
#[async_trait::async_trait]
pub trait FollowRepository: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, error::SystemError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), error::SystemError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), error::SystemError>;

    async fn find_follow(
        &self,
        user_id: i64,
        followed_uid: i64,
    ) -> Result<Option<FollowEntity>, error::SystemError>;

    /// Inserts the row as Normal or reactivates a Deleted one.
    async fn create_follow(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        followed_uid: i64,
    ) -> Result<bool, error::SystemError>;

    async fn create_fan(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        follower_uid: i64,
    ) -> Result<bool, error::SystemError>;

    async fn update_follow_status(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        followed_uid: i64,
        status: FollowStatus,
    ) -> Result<bool, error::SystemError>;

    async fn update_fan_status(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        follower_uid: i64,
        status: FollowStatus,
    ) -> Result<bool, error::SystemError>;

    /// Which of `target_ids` `user_id` actively follows.
    async fn find_followed_ids(
        &self,
        user_id: i64,
        target_ids: &[i64],
    ) -> Result<HashSet<i64>, error::SystemError>;

    /// Which of `target_ids` actively follow `user_id`.
    async fn find_fan_ids(
        &self,
        user_id: i64,
        target_ids: &[i64],
    ) -> Result<HashSet<i64>, error::SystemError>;

    /// Active follow rows with `id < last_id`, newest first.
    async fn find_following_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FollowEntity>, error::SystemError>;

    async fn find_follower_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FanEntity>, error::SystemError>;
}

#[async_trait::async_trait]
pub trait StatRepository: Send + Sync {
    type Tx: Send;

    async fn incr_following_count(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        delta: i64,
    ) -> Result<(), error::SystemError>;

    async fn incr_follower_count(
        &self,
        tx: &mut Self::Tx,
        user_id: i64,
        delta: i64,
    ) -> Result<(), error::SystemError>;

    /// Users without a stat row are absent from the map.
    async fn find_stats_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, UserStatEntity>, error::SystemError>;
}
