//! Lock service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{BookingError, Result};

/// Trait for exclusive, token-based resource locks.
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquires the lock on `resource`, returning a token to release it with.
    async fn acquire(&self, resource: &str) -> Result<String>;

    /// Releases a lock previously acquired with `token`.
    async fn release(&self, token: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryLockState {
    /// token -> resource
    held: HashMap<String, String>,
    fail_on_release: bool,
}

/// In-memory lock service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockService {
    state: Arc<RwLock<InMemoryLockState>>,
}

impl InMemoryLockService {
    /// Creates a new in-memory lock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on release calls.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Returns the number of currently held locks.
    pub fn held_count(&self) -> usize {
        self.state.read().unwrap().held.len()
    }

    /// Returns true if `resource` is currently locked.
    pub fn is_locked(&self, resource: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .held
            .values()
            .any(|r| r == resource)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, resource: &str) -> Result<String> {
        let mut state = self.state.write().unwrap();
        if state.held.values().any(|r| r == resource) {
            return Err(BookingError::LockHeld(resource.to_string()));
        }
        let token = format!("LOCK-{}", Uuid::new_v4());
        state.held.insert(token.clone(), resource.to_string());
        Ok(token)
    }

    async fn release(&self, token: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_release {
            return Err(BookingError::UnknownLock(format!(
                "{token} (lock store unavailable)"
            )));
        }
        state
            .held
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| BookingError::UnknownLock(token.to_string()))
    }
}
