//! Batch assembly of [`UserInfo`] views.
//!
//! A batch call runs five independent lookups concurrently (target users,
//! the requester, who the requester follows, who follows the requester,
//! counters), splits the user rows across worker tasks to build the views,
//! then lays the merged results back out in the caller's order.

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};

use futures_util::FutureExt;
use tokio::task::JoinSet;

use crate::{
    api::error::{self, ResultExt},
    modules::{
        follow::{
            repository::{FollowRepository, StatRepository},
            schema::UserStatEntity,
        },
        user::{
            model::{UserInfo, UserResponse, UserStat},
            repository::UserRepository,
            schema::UserEntity,
        },
    },
};

pub struct UserAggregator<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    user_repo: Arc<U>,
    follow_repo: Arc<F>,
    stat_repo: Arc<S>,
    timeout: Duration,
}

impl<U, F, S> Clone for UserAggregator<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    fn clone(&self) -> Self {
        UserAggregator {
            user_repo: self.user_repo.clone(),
            follow_repo: self.follow_repo.clone(),
            stat_repo: self.stat_repo.clone(),
            timeout: self.timeout,
        }
    }
}

impl<U, F, S> UserAggregator<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    pub fn with_dependencies(
        user_repo: Arc<U>,
        follow_repo: Arc<F>,
        stat_repo: Arc<S>,
        timeout: Duration,
    ) -> Self {
        UserAggregator { user_repo, follow_repo, stat_repo, timeout }
    }

    /// Builds the view of every id in `user_ids` as seen by `user_id`.
    ///
    /// `output[i]` belongs to `user_ids[i]`; duplicated ids repeat the same
    /// view and ids without a user row are `None`. Any failed lookup or
    /// worker fails the whole call.
    pub async fn batch_get_users(
        &self,
        user_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<Option<UserInfo>>, error::SystemError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        match tokio::time::timeout(self.timeout, self.aggregate(user_id, user_ids)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    requester = user_id,
                    targets = user_ids.len(),
                    "[user_aggregator] batch get users timed out"
                );
                Err(error::SystemError::Timeout(
                    format!("batch get users exceeded {}ms", self.timeout.as_millis()).into(),
                ))
            }
        }
    }

    async fn aggregate(
        &self,
        user_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<Option<UserInfo>>, error::SystemError> {
        let mut seen = HashSet::with_capacity(user_ids.len());
        let distinct: Vec<i64> = user_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let (users, requester, followed, fans, stats) = tokio::try_join!(
            self.user_repo.find_by_ids(&distinct).map(|r| r.context("batch get users")),
            self.user_repo.find_by_id(user_id).map(|r| r.context("get requester")),
            self.follow_repo
                .find_followed_ids(user_id, &distinct)
                .map(|r| r.context("get follow status")),
            self.follow_repo.find_fan_ids(user_id, &distinct).map(|r| r.context("get fans status")),
            self.stat_repo.find_stats_by_ids(&distinct).map(|r| r.context("get user stats")),
        )?;

        if requester.is_none() {
            return Err(error::SystemError::not_found("Requester not found"));
        }

        let partitions = partition(users, worker_count());
        tracing::debug!(
            requester = user_id,
            targets = user_ids.len(),
            distinct = distinct.len(),
            workers = partitions.len(),
            "[user_aggregator] assembling user infos"
        );

        let infos: HashMap<i64, UserInfo> = run_partitions(partitions, move |part| {
            assemble(part, &followed, &fans, &stats)
        })
        .await?
        .into_iter()
        .collect();

        Ok(user_ids.iter().map(|id| infos.get(id).cloned()).collect())
    }
}

/// Runs `transform` over every partition on the blocking thread pool and
/// concatenates the results. The first failed or panicked partition fails
/// the whole run; partitions that have not started yet are cancelled when
/// the set is dropped.
async fn run_partitions<T, R, F>(
    partitions: Vec<Vec<T>>,
    transform: F,
) -> Result<Vec<R>, error::SystemError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(Vec<T>) -> Result<Vec<R>, error::SystemError> + Send + Sync + 'static,
{
    let transform = Arc::new(transform);
    let mut workers = JoinSet::new();
    for part in partitions {
        let transform = transform.clone();
        workers.spawn_blocking(move || transform(part));
    }

    let mut merged = Vec::new();
    while let Some(joined) = workers.join_next().await {
        let part = joined.map_err(|e| {
            error::SystemError::TaskFault(format!("user info worker: {e}").into())
        })??;
        merged.extend(part);
    }
    Ok(merged)
}

fn worker_count() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(4)
}

/// Splits `users` into at most `workers` contiguous, non-empty chunks.
fn partition(mut users: Vec<UserEntity>, workers: usize) -> Vec<Vec<UserEntity>> {
    let chunk_size = users.len().div_ceil(workers.max(1)).max(1);
    let mut parts = Vec::with_capacity(workers);
    while !users.is_empty() {
        let rest = users.split_off(chunk_size.min(users.len()));
        parts.push(std::mem::replace(&mut users, rest));
    }
    parts
}

fn assemble(
    users: Vec<UserEntity>,
    followed: &HashSet<i64>,
    fans: &HashSet<i64>,
    stats: &HashMap<i64, UserStatEntity>,
) -> Result<Vec<(i64, UserInfo)>, error::SystemError> {
    users
        .into_iter()
        .map(|user| {
            let id = user.id;
            let stat = stats.get(&id).cloned().map(UserStat::try_from).transpose()?;
            let info = UserInfo {
                user: UserResponse::from(user),
                is_follow: followed.contains(&id),
                is_follower: fans.contains(&id),
                stat,
            };
            Ok((id, info))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::memory::{Fault, MemoryStore};

    fn aggregator(store: &Arc<MemoryStore>) -> UserAggregator<MemoryStore, MemoryStore, MemoryStore> {
        UserAggregator::with_dependencies(
            store.clone(),
            store.clone(),
            store.clone(),
            Duration::from_secs(5),
        )
    }

    fn scenario() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for (id, name) in [(1, "requester"), (2, "bob"), (3, "carol"), (4, "dave")] {
            store.seed_user(id, name);
        }
        store.seed_follow(1, 2);
        store.seed_follow(1, 3);
        store.seed_stat(2, 0, 5);
        store.seed_stat(3, 1, 2);
        store
    }

    #[tokio::test]
    async fn marks_follow_flags_and_tolerates_missing_stats() {
        let store = scenario();
        store.seed_follow(4, 1);

        let infos = aggregator(&store).batch_get_users(1, &[2, 3, 4]).await.unwrap();
        let infos: Vec<UserInfo> = infos.into_iter().map(Option::unwrap).collect();

        assert_eq!(infos.iter().map(|i| i.user.id).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(infos[0].is_follow && infos[1].is_follow);
        assert!(!infos[2].is_follow);
        assert!(!infos[0].is_follower);
        assert!(infos[2].is_follower);
        assert_eq!(infos[0].stat, Some(UserStat { following_count: 0, follower_count: 5 }));
        assert_eq!(infos[2].stat, None);
    }

    #[tokio::test]
    async fn keeps_caller_order_with_duplicates_and_unknown_ids() {
        let store = scenario();
        let ids = [3, 2, 3, 99, 2];

        let infos = aggregator(&store).batch_get_users(1, &ids).await.unwrap();

        assert_eq!(infos.len(), ids.len());
        for (id, info) in ids.iter().zip(&infos) {
            match info {
                Some(info) => assert_eq!(info.user.id, *id),
                None => assert_eq!(*id, 99),
            }
        }
        assert!(infos[3].is_none());
    }

    #[tokio::test]
    async fn empty_request_returns_empty_list() {
        let store = scenario();
        assert!(aggregator(&store).batch_get_users(1, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn large_batches_are_split_across_workers() {
        let store = Arc::new(MemoryStore::default());
        store.seed_user(1, "requester");
        let ids: Vec<i64> = (100..400).collect();
        for id in &ids {
            store.seed_user(*id, &format!("user{id}"));
            if id % 2 == 0 {
                store.seed_follow(1, *id);
            }
        }

        let infos = aggregator(&store).batch_get_users(1, &ids).await.unwrap();

        assert_eq!(infos.len(), ids.len());
        for (id, info) in ids.iter().zip(infos) {
            let info = info.unwrap();
            assert_eq!(info.user.id, *id);
            assert_eq!(info.is_follow, id % 2 == 0);
        }
    }

    #[tokio::test]
    async fn any_failed_lookup_fails_the_whole_batch() {
        for op in [
            "find_by_ids",
            "find_by_id",
            "find_followed_ids",
            "find_fan_ids",
            "find_stats_by_ids",
        ] {
            let store = scenario();
            store.inject(op, Fault::Error);

            let err = aggregator(&store).batch_get_users(1, &[2, 3, 4]).await.unwrap_err();
            assert!(
                matches!(err.root(), error::SystemError::DatabaseError(_)),
                "{op}: unexpected error {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_requester_is_not_found() {
        let store = scenario();
        let err = aggregator(&store).batch_get_users(42, &[2]).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }

    #[tokio::test]
    async fn corrupt_counters_fail_the_batch() {
        let store = scenario();
        store.seed_stat(4, -1, 0);

        let err = aggregator(&store).batch_get_users(1, &[2, 3, 4]).await.unwrap_err();
        assert!(matches!(err, error::SystemError::DatabaseError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_hits_the_deadline() {
        let store = scenario();
        store.inject("find_stats_by_ids", Fault::Delay(Duration::from_secs(60)));
        let aggregator = UserAggregator::with_dependencies(
            store.clone(),
            store.clone(),
            store.clone(),
            Duration::from_millis(200),
        );

        let err = aggregator.batch_get_users(1, &[2, 3]).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Timeout(_)));
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_run_as_task_fault() {
        let parts = vec![vec![1, 2], vec![3], vec![4, 5]];

        let result = run_partitions(parts, |part: Vec<i64>| {
            if part.contains(&3) {
                panic!("malformed partition");
            }
            Ok(part)
        })
        .await;

        assert!(matches!(result, Err(error::SystemError::TaskFault(_))));
    }

    #[tokio::test]
    async fn partitions_run_off_the_calling_thread() {
        let caller = std::thread::current().id();

        let threads = run_partitions(vec![vec![()], vec![()]], |part: Vec<()>| {
            Ok(part.into_iter().map(|_| std::thread::current().id()).collect())
        })
        .await
        .unwrap();

        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != caller));
    }

    #[test]
    fn partition_covers_every_user_once() {
        let users: Vec<UserEntity> =
            (0..10).map(|id| crate::test::memory::user_entity(id, "u")).collect();

        let parts = partition(users, 3);

        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| !p.is_empty()));
        let ids: Vec<i64> = parts.into_iter().flatten().map(|u| u.id).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }
}
