//! Test context registry.
//!
//! Maps an execution context (by default the calling thread) to the report
//! node of the test it is running. One context per key; starting a new test
//! on the same key replaces the previous context.
//!
//! Backed by a sharded concurrent map so threads touching different keys do
//! not serialize on a global lock.

use crate::reporter::NodeHandle;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::thread::ThreadId;

/// Identity a context is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// An OS thread
    Thread(ThreadId),
    /// An explicit task id, for callers that multiplex tests on one thread
    Task(u64),
}

impl ContextKey {
    /// Key of the calling thread
    #[must_use]
    pub fn current() -> Self {
        Self::Thread(std::thread::current().id())
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread(id) => write!(f, "{id:?}"),
            Self::Task(id) => write!(f, "task-{id}"),
        }
    }
}

/// The live test on one execution context
#[derive(Debug, Clone)]
pub struct TestContext {
    /// Owning key
    pub key: ContextKey,
    /// Report node events are appended to
    pub node: NodeHandle,
    /// When the test started
    pub started_at: DateTime<Utc>,
}

impl TestContext {
    /// Test name from the node
    #[must_use]
    pub fn name(&self) -> &str {
        self.node.name()
    }
}

/// Concurrent key → context map
#[derive(Debug, Default)]
pub struct TestContextRegistry {
    contexts: DashMap<ContextKey, TestContext>,
}

impl TestContextRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `node` to the calling thread, replacing any previous context
    pub fn start(&self, node: NodeHandle) -> TestContext {
        self.start_for(ContextKey::current(), node)
    }

    /// Bind `node` to `key`, replacing any previous context
    pub fn start_for(&self, key: ContextKey, node: NodeHandle) -> TestContext {
        let context = TestContext {
            key: key.clone(),
            node,
            started_at: Utc::now(),
        };
        self.contexts.insert(key, context.clone());
        context
    }

    /// Context of the calling thread, `None` before its first `start`
    #[must_use]
    pub fn current(&self) -> Option<TestContext> {
        self.current_for(&ContextKey::current())
    }

    /// Context bound to `key`
    #[must_use]
    pub fn current_for(&self, key: &ContextKey) -> Option<TestContext> {
        self.contexts.get(key).map(|entry| entry.value().clone())
    }

    /// Drop the calling thread's context
    pub fn end(&self) -> Option<TestContext> {
        self.end_for(&ContextKey::current())
    }

    /// Drop the context bound to `key`
    pub fn end_for(&self, key: &ContextKey) -> Option<TestContext> {
        self.contexts.remove(key).map(|(_, context)| context)
    }

    /// Number of live contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether no context is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
