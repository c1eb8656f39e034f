//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::db::{Conversation, Database, MemoryStore, SessionSummary, StoreResult};
use crate::oracle::{Oracle, OracleError, OracleResponse, ToolDescriptor};
use crate::state_machine::Message;
use crate::tools::{ToolError, ToolOutput, ToolRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Durable (or not) storage for conversation checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write the full conversation, replacing any previous checkpoint
    async fn save(&self, conversation: &Conversation) -> StoreResult<()>;

    /// `None` when nothing was ever saved under `session_id`
    async fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>>;

    /// Returns whether a checkpoint existed
    async fn delete(&self, session_id: &str) -> StoreResult<bool>;

    async fn list(&self) -> StoreResult<Vec<SessionSummary>>;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Validate arguments and run a tool by name
    async fn dispatch(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError>;

    /// Get tool descriptors for the oracle
    fn descriptors(&self) -> Vec<ToolDescriptor>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        (**self).save(conversation).await
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        (**self).load(session_id).await
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        (**self).delete(session_id).await
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        (**self).list().await
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn dispatch(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        (**self).dispatch(name, args).await
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        (**self).descriptors()
    }
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError> {
        (**self).complete(transcript, tools).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl CheckpointStore for Database {
    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        Database::save(self, conversation)
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        Database::load(self, session_id)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        Database::delete(self, session_id)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        Database::list(self)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        MemoryStore::save(self, conversation)
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        MemoryStore::load(self, session_id)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        MemoryStore::delete(self, session_id)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        MemoryStore::list(self)
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn dispatch(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        ToolRegistry::dispatch(self, name, args).await
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        ToolRegistry::descriptors(self)
    }
}
