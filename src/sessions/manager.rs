//! Resident session map with per-user locks.

use super::traits::{SessionContext, SessionData, SessionPersistence, SessionSnapshot};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type UserLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive access to one user's session.
///
/// Dropping it releases the lock and forgets the lock entry when nobody else
/// holds or waits on it.
pub struct UserGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: String,
    locks: &'a UserLocks,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Every clone of a lock is taken under this map lock, so a count of
        // one means only the map still refers to it.
        let mut locks = self.locks.lock();
        if locks
            .get(&self.user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.user_id);
        }
    }
}

/// Owns every live [`SessionContext`].
///
/// The resident map is authoritative while the process runs; persistence is
/// consulted only for users not yet resident, and its failures are logged.
pub struct SessionManager {
    contexts: Mutex<HashMap<String, SessionContext>>,
    locks: UserLocks,
    persistence: Arc<dyn SessionPersistence>,
}

impl SessionManager {
    pub fn new(persistence: Arc<dyn SessionPersistence>) -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            persistence,
        }
    }

    pub fn persistence_name(&self) -> &str {
        self.persistence.name()
    }

    /// Serialize all work for `user_id`. Hold the guard for the whole update.
    pub async fn lock_user(&self, user_id: &str) -> UserGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        UserGuard {
            guard: Some(lock.lock_owned().await),
            user_id: user_id.to_string(),
            locks: &self.locks,
        }
    }

    /// Copy of the user's context: resident, else loaded, else fresh `Idle`.
    pub async fn get_context(&self, user_id: &str) -> SessionContext {
        if let Some(context) = self.contexts.lock().get(user_id) {
            return context.clone();
        }

        let context = match self.persistence.load(user_id).await {
            Ok(Some(snapshot)) => {
                tracing::debug!(user_id, state = %snapshot.state, "session restored");
                snapshot.into_context()
            }
            Ok(None) => SessionContext::new(user_id),
            Err(error) => {
                tracing::warn!(user_id, %error, "failed to load session, starting fresh");
                SessionContext::new(user_id)
            }
        };

        self.contexts
            .lock()
            .entry(user_id.to_string())
            .or_insert(context)
            .clone()
    }

    /// Make `context` the resident one and persist its snapshot.
    pub async fn save_context(&self, context: &SessionContext) {
        let mut context = context.clone();
        context.touch();
        let snapshot = SessionSnapshot::from(&context);
        self.contexts.lock().insert(context.user_id.clone(), context);

        if let Err(error) = self.persistence.save(&snapshot).await {
            tracing::warn!(user_id = %snapshot.user_id, %error, "failed to persist session");
        }
    }

    /// Reset the user to `Idle` with no draft and drop the stored snapshot.
    pub async fn clear_context(&self, user_id: &str) {
        if let Some(context) = self.contexts.lock().get_mut(user_id) {
            context.reset();
            context.touch();
        }
        if let Err(error) = self.persistence.delete(user_id).await {
            tracing::warn!(user_id, %error, "failed to delete stored session");
        }
    }

    /// Resident sessions with a draft in progress.
    pub fn active_count(&self) -> usize {
        self.contexts
            .lock()
            .values()
            .filter(|c| matches!(c.data, SessionData::Drafting(_)))
            .count()
    }

    pub fn resident_count(&self) -> usize {
        self.contexts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::StateId;
    use crate::reports::DraftReport;
    use crate::sessions::NoopPersistence;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(NoopPersistence))
    }

    fn drafting(user_id: &str) -> SessionData {
        SessionData::Drafting(DraftReport::new(
            user_id,
            None,
            1,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            vec![],
        ))
    }

    #[tokio::test]
    async fn new_user_starts_idle() {
        let sessions = manager();
        let context = sessions.get_context("1").await;
        assert_eq!(context.state, StateId::Idle);
        assert_eq!(context.data, SessionData::Idle);
        assert_eq!(sessions.resident_count(), 1);
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test]
    async fn unsaved_changes_are_not_visible() {
        let sessions = manager();
        let mut context = sessions.get_context("1").await;
        context.state = StateId::EnteringScore;
        assert_eq!(sessions.get_context("1").await.state, StateId::Idle);

        sessions.save_context(&context).await;
        assert_eq!(sessions.get_context("1").await.state, StateId::EnteringScore);
    }

    #[tokio::test]
    async fn clear_resets_to_idle() {
        let sessions = manager();
        let mut context = sessions.get_context("1").await;
        context.state = StateId::AddingTasks;
        context.data = drafting("1");
        sessions.save_context(&context).await;
        assert_eq!(sessions.active_count(), 1);

        sessions.clear_context("1").await;
        let context = sessions.get_context("1").await;
        assert_eq!(context.state, StateId::Idle);
        assert_eq!(context.data, SessionData::Idle);
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test]
    async fn user_lock_serializes_same_user_only() {
        let sessions = Arc::new(manager());
        let guard = sessions.lock_user("1").await;

        let other = tokio::time::timeout(Duration::from_millis(50), sessions.lock_user("2")).await;
        assert!(other.is_ok(), "different users do not block each other");

        let same = tokio::time::timeout(Duration::from_millis(50), sessions.lock_user("1")).await;
        assert!(same.is_err(), "same user waits for the guard");

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), sessions.lock_user("1")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn released_user_locks_are_pruned() {
        let sessions = manager();
        drop(sessions.lock_user("1").await);
        drop(sessions.lock_user("2").await);
        assert!(sessions.locks.lock().is_empty());

        let guard = sessions.lock_user("1").await;
        let waiting = sessions.lock_user("1");
        tokio::pin!(waiting);
        assert!(tokio::time::timeout(Duration::from_millis(20), &mut waiting)
            .await
            .is_err());

        drop(guard);
        assert_eq!(sessions.locks.lock().len(), 1, "the waiter still needs the entry");

        drop(waiting.await);
        assert!(sessions.locks.lock().is_empty());
    }

    struct BrokenPersistence;

    #[async_trait]
    impl SessionPersistence for BrokenPersistence {
        async fn load(&self, _user_id: &str) -> Result<Option<SessionSnapshot>> {
            bail!("disk unavailable")
        }

        async fn save(&self, _snapshot: &SessionSnapshot) -> Result<()> {
            bail!("disk unavailable")
        }

        async fn delete(&self, _user_id: &str) -> Result<()> {
            bail!("disk unavailable")
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn persistence_failures_do_not_fail_the_session() {
        let sessions = SessionManager::new(Arc::new(BrokenPersistence));
        let mut context = sessions.get_context("1").await;
        context.state = StateId::EnteringComment;
        sessions.save_context(&context).await;
        assert_eq!(sessions.get_context("1").await.state, StateId::EnteringComment);
        sessions.clear_context("1").await;
        assert_eq!(sessions.get_context("1").await.state, StateId::Idle);
    }
}
