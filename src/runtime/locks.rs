//! Per-session locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Handle = Arc<AsyncMutex<()>>;

/// One async mutex per session id. Different sessions never contend.
///
/// Entries live only while someone holds or waits on them; the last guard
/// to drop removes its entry.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, Handle>>,
}

/// Exclusive access to one session, released on drop
pub struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the handle count below only sees other users
        self.guard.take();
        self.locks.prune(&self.session_id);
    }
}

impl SessionLocks {
    fn handle(&self, session_id: &str) -> Handle {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop the entry when the map holds the only handle.
    ///
    /// Handles are cloned under the same map lock, so a count of one means
    /// nobody holds the mutex or is waiting for it.
    fn prune(&self, session_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(session_id)
            .is_some_and(|handle| Arc::strong_count(handle) == 1)
        {
            locks.remove(session_id);
        }
    }

    fn guard(&self, session_id: &str, guard: OwnedMutexGuard<()>) -> SessionGuard<'_> {
        SessionGuard {
            locks: self,
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let handle = self.handle(session_id);
        let guard = handle.lock_owned().await;
        self.guard(session_id, guard)
    }

    /// Exclusive access without waiting; `None` while another holder runs
    pub fn try_acquire(&self, session_id: &str) -> Option<SessionGuard<'_>> {
        let guard = self.handle(session_id).try_lock_owned().ok()?;
        Some(self.guard(session_id, guard))
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
