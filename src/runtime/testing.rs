//! Mock implementations for testing
//!
//! These mocks enable runtime testing without real I/O.

use super::traits::*;
use super::{AgentRuntime, RuntimeConfig};
use crate::db::{Conversation, MemoryStore, SessionSummary, StoreError, StoreResult};
use crate::oracle::{Oracle, OracleError, OracleReply, OracleResponse, ToolDescriptor};
use crate::state_machine::{Message, ToolCall};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Scripted Oracle
// ============================================================================

/// Oracle that returns queued replies, then a fallback (if any)
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<OracleReply, OracleError>>>,
    fallback: Option<OracleReply>,
    /// Transcript seen by each call
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `reply` once the queue is empty
    pub fn repeating(reply: OracleReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: OracleReply) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn with_error(self, error: OracleError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<Vec<Message>> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(
        &self,
        transcript: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError> {
        self.requests.lock().unwrap().push(transcript.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply.map(OracleResponse::new),
            None => self
                .fallback
                .clone()
                .map(OracleResponse::new)
                .ok_or_else(|| OracleError::network("No scripted reply queued")),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Delayed Oracle
// ============================================================================

/// Oracle that sleeps before answering
pub struct DelayedOracle {
    inner: ScriptedOracle,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedOracle {
    pub fn new(inner: ScriptedOracle, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Oracle for DelayedOracle {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError> {
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.complete(transcript, tools).await
    }

    fn model_id(&self) -> &str {
        "delayed"
    }
}

// ============================================================================
// Recording Tool Executor
// ============================================================================

/// Real registry that records every dispatch
pub struct RecordingToolExecutor {
    inner: ToolRegistry,
    pub executions: Mutex<Vec<(String, Value)>>,
}

impl RecordingToolExecutor {
    pub fn new(inner: ToolRegistry) -> Self {
        Self {
            inner,
            executions: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_names(&self) -> Vec<String> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for RecordingToolExecutor {
    async fn dispatch(
        &self,
        name: &str,
        args: Value,
    ) -> Result<crate::tools::ToolOutput, crate::tools::ToolError> {
        self.executions
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));
        self.inner.dispatch(name, args).await
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.inner.descriptors()
    }
}

// ============================================================================
// Failing Store
// ============================================================================

/// Memory store whose writes can be switched off
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_saves: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckpointStore for FlakyStore {
    async fn save(&self, conversation: &Conversation) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Poisoned);
        }
        self.inner.save(conversation)
    }

    async fn load(&self, session_id: &str) -> StoreResult<Option<Conversation>> {
        self.inner.load(session_id)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<bool> {
        self.inner.delete(session_id)
    }

    async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        self.inner.list()
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn quote_call(id: &str, symbol: &str) -> ToolCall {
    ToolCall::new(id, "quote", json!({ "symbol": symbol }))
}

pub fn purchase_call(id: &str, symbol: &str, quantity: u32, price: f64) -> ToolCall {
    ToolCall::new(
        id,
        "stage_purchase",
        json!({ "symbol": symbol, "quantity": quantity, "price": price }),
    )
}

/// Config that never waits in tests
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        oracle_timeout: Duration::from_secs(5),
        retry_backoff: Duration::from_millis(1),
        ..RuntimeConfig::default()
    }
}

pub type TestRuntime = AgentRuntime<MemoryStore, Arc<ScriptedOracle>, Arc<RecordingToolExecutor>>;

/// Runtime over a memory store, the standard tools and `oracle`
pub fn test_runtime(
    oracle: ScriptedOracle,
) -> (TestRuntime, MemoryStore, Arc<ScriptedOracle>, Arc<RecordingToolExecutor>) {
    let store = MemoryStore::new();
    let oracle = Arc::new(oracle);
    let tools = Arc::new(RecordingToolExecutor::new(ToolRegistry::standard()));
    let runtime = AgentRuntime::new(
        store.clone(),
        Arc::clone(&oracle),
        Arc::clone(&tools),
        fast_config(),
    );
    (runtime, store, oracle, tools)
}
