use std::{any::Any, borrow::Cow, panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use log::{debug, error, info, warn};

use crate::{
    api::error::{self, ResultExt},
    modules::{
        follow::{
            model::{normalize_cursor, normalize_limit},
            repository::{FollowRepository, StatRepository},
            schema::{FanEntity, FollowEntity, FollowStatus},
        },
        user::repository::UserRepository,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Follow,
    Unfollow,
}

impl Transition {
    fn delta(self) -> i64 {
        match self {
            Transition::Follow => 1,
            Transition::Unfollow => -1,
        }
    }
}

/// Applies follow/unfollow as one transaction over the follow row, the fan
/// row and both users' counters.
///
/// Concurrent transitions on the same pair are only serialized by the
/// database's row locks.
pub struct FollowService<U, F, S>
where
    U: UserRepository,
    F: FollowRepository,
    S: StatRepository<Tx = F::Tx>,
{
    user_repo: Arc<U>,
    follow_repo: Arc<F>,
    stat_repo: Arc<S>,
}

impl<U, F, S> Clone for FollowService<U, F, S>
where
    U: UserRepository,
    F: FollowRepository,
    S: StatRepository<Tx = F::Tx>,
{
    fn clone(&self) -> Self {
        FollowService {
            user_repo: self.user_repo.clone(),
            follow_repo: self.follow_repo.clone(),
            stat_repo: self.stat_repo.clone(),
        }
    }
}

impl<U, F, S> FollowService<U, F, S>
where
    U: UserRepository,
    F: FollowRepository,
    S: StatRepository<Tx = F::Tx>,
{
    pub fn with_dependencies(user_repo: Arc<U>, follow_repo: Arc<F>, stat_repo: Arc<S>) -> Self {
        FollowService { user_repo, follow_repo, stat_repo }
    }

    /// Returns whether the relationship changed; following an already
    /// followed user is a no-op and leaves the counters alone.
    pub async fn follow(&self, user_id: i64, followed_uid: i64) -> Result<bool, error::SystemError> {
        if user_id == followed_uid {
            return Err(error::SystemError::bad_request("Cannot follow yourself"));
        }

        if self.user_repo.find_by_id(followed_uid).await.context("get followee")?.is_none() {
            return Err(error::SystemError::not_found("User not found"));
        }

        let changed = self.transition(user_id, followed_uid, Transition::Follow).await?;
        if changed {
            info!("User {} followed user {}", user_id, followed_uid);
        }
        Ok(changed)
    }

    /// Returns whether the relationship changed; unfollowing a user that is
    /// not followed is a no-op.
    pub async fn unfollow(
        &self,
        user_id: i64,
        followed_uid: i64,
    ) -> Result<bool, error::SystemError> {
        if user_id == followed_uid {
            return Err(error::SystemError::bad_request("Cannot unfollow yourself"));
        }

        let changed = self.transition(user_id, followed_uid, Transition::Unfollow).await?;
        if changed {
            info!("User {} unfollowed user {}", user_id, followed_uid);
        }
        Ok(changed)
    }

    /// Lookup failures count as "not followed"; the error is only logged.
    pub async fn is_followed(&self, user_id: i64, followed_uid: i64) -> bool {
        match self.follow_repo.find_follow(user_id, followed_uid).await {
            Ok(Some(follow)) => follow.status == FollowStatus::Normal,
            Ok(None) => false,
            Err(e) => {
                warn!("[follow_service] get user follow err, {}", e);
                false
            }
        }
    }

    pub async fn get_following_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FollowEntity>, error::SystemError> {
        self.follow_repo
            .find_following_list(user_id, normalize_cursor(last_id), normalize_limit(limit))
            .await
            .context("get following list")
    }

    pub async fn get_follower_list(
        &self,
        user_id: i64,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<FanEntity>, error::SystemError> {
        self.follow_repo
            .find_follower_list(user_id, normalize_cursor(last_id), normalize_limit(limit))
            .await
            .context("get follower list")
    }

    async fn transition(
        &self,
        user_id: i64,
        followed_uid: i64,
        transition: Transition,
    ) -> Result<bool, error::SystemError> {
        let mut tx = self.follow_repo.begin().await.context("begin tx")?;

        let outcome = AssertUnwindSafe(self.apply(&mut tx, user_id, followed_uid, transition))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(true)) => {
                self.follow_repo.commit(tx).await.context("tx commit")?;
                Ok(true)
            }
            Ok(Ok(false)) => {
                debug!("{:?} {} -> {} changed nothing", transition, user_id, followed_uid);
                self.rollback(tx).await;
                Ok(false)
            }
            Ok(Err(e)) => {
                self.rollback(tx).await;
                Err(e)
            }
            Err(panic) => {
                self.rollback(tx).await;
                Err(error::SystemError::TransactionFault(panic_message(panic)))
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut F::Tx,
        user_id: i64,
        followed_uid: i64,
        transition: Transition,
    ) -> Result<bool, error::SystemError> {
        let follow_changed = match transition {
            Transition::Follow => self
                .follow_repo
                .create_follow(tx, user_id, followed_uid)
                .await
                .context("insert into user follow")?,
            Transition::Unfollow => self
                .follow_repo
                .update_follow_status(tx, user_id, followed_uid, FollowStatus::Deleted)
                .await
                .context("update user follow status")?,
        };

        if !follow_changed {
            return Ok(false);
        }

        let fan_changed = match transition {
            Transition::Follow => self
                .follow_repo
                .create_fan(tx, followed_uid, user_id)
                .await
                .context("insert into user fans")?,
            Transition::Unfollow => self
                .follow_repo
                .update_fan_status(tx, followed_uid, user_id, FollowStatus::Deleted)
                .await
                .context("update user fans status")?,
        };

        if !fan_changed {
            return Err(error::SystemError::conflict(format!(
                "fan row of {} -> {} out of sync with follow row",
                user_id, followed_uid
            )));
        }

        let delta = transition.delta();
        self.stat_repo
            .incr_following_count(tx, user_id, delta)
            .await
            .context("update user following count")?;
        self.stat_repo
            .incr_follower_count(tx, followed_uid, delta)
            .await
            .context("update user follower count")?;

        Ok(true)
    }

    async fn rollback(&self, tx: F::Tx) {
        if let Err(e) = self.follow_repo.rollback(tx).await {
            error!("[follow_service] tx rollback err, {}", e);
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> Cow<'static, str> {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        Cow::Borrowed(*msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        Cow::Owned(msg.clone())
    } else {
        Cow::Borrowed("panic during follow transaction")
    }
}
