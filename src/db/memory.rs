//! In-memory checkpoint store

use super::{Conversation, SessionSummary, Snapshot, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Volatile store with the same semantics as [`super::Database`].
///
/// Snapshots are kept encoded so a round trip behaves exactly like the
/// durable backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    snapshots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshots(&self) -> StoreResult<MutexGuard<'_, HashMap<String, String>>> {
        self.snapshots.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        let json = Snapshot::encode(conversation)?;
        self.snapshots()?
            .insert(conversation.session_id.clone(), json);
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        let json = self.snapshots()?.get(session_id).cloned();
        json.map(|json| {
            Snapshot::decode(&json).map_err(|reason| StoreError::Corrupt {
                session_id: session_id.to_string(),
                reason,
            })
        })
        .transpose()
    }

    pub fn delete(&self, session_id: &str) -> StoreResult<bool> {
        Ok(self.snapshots()?.remove(session_id).is_some())
    }

    pub fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let snapshots = self.snapshots()?;
        let mut summaries = snapshots
            .iter()
            .map(|(id, json)| {
                Snapshot::decode(json)
                    .map(|c| c.summary())
                    .map_err(|reason| StoreError::Corrupt {
                        session_id: id.clone(),
                        reason,
                    })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
