//! Replay protection for OAuth authorization codes.
//!
//! A provider accepts each authorization code once. Browsers and single-page
//! apps routinely submit the callback twice, so the first successful exchange
//! is cached and every later submission of the same code gets that result.
//! Only successes are cached: a failed exchange releases the code.

use crate::auth::CallbackResponse;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Outcome of claiming a code.
pub enum CodeClaim {
    /// The code was already exchanged; answer with this response.
    Replay(CallbackResponse),
    /// The caller owns the exchange. Complete the ticket on success; dropping
    /// it releases the code for a later retry.
    Fresh(Box<dyn ExchangeTicket>),
}

impl std::fmt::Debug for CodeClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeClaim::Replay(_) => f.write_str("CodeClaim::Replay"),
            CodeClaim::Fresh(_) => f.write_str("CodeClaim::Fresh"),
        }
    }
}

/// Exclusive right to exchange one code.
pub trait ExchangeTicket: Send {
    /// Caches `response` for every later claim of the same code.
    fn complete(self: Box<Self>, response: CallbackResponse);
}

/// Store of authorization-code outcomes. `claim` must be atomic per code:
/// while one caller holds a `Fresh` ticket, other claims for that code wait.
#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn claim(&self, code: &str) -> CodeClaim;
}

type Slot = Arc<AsyncMutex<Option<CallbackResponse>>>;
type SlotMap = Arc<Mutex<HashMap<String, Slot>>>;

/// Process-lifetime, in-memory [`CodeStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryCodeStore {
    slots: SlotMap,
}

fn lock_map(map: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of codes currently tracked (in flight or exchanged).
    pub fn len(&self) -> usize {
        lock_map(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, code: &str) -> bool {
        lock_map(&self.slots).contains_key(code)
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn claim(&self, code: &str) -> CodeClaim {
        loop {
            let slot = {
                let mut slots = lock_map(&self.slots);
                slots
                    .entry(code.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                    .clone()
            };

            // Waits here while another request exchanges the same code.
            let guard = slot.clone().lock_owned().await;

            if let Some(cached) = (*guard).as_ref() {
                return CodeClaim::Replay(cached.clone());
            }

            // The previous owner may have failed and released the code; if
            // so, start over so there is only ever one live slot per code.
            let still_current = lock_map(&self.slots)
                .get(code)
                .map(|current| Arc::ptr_eq(current, &slot))
                .unwrap_or(false);
            if !still_current {
                debug!("Slot for code was released while waiting, reclaiming");
                continue;
            }

            return CodeClaim::Fresh(Box::new(MemoryTicket {
                code: code.to_string(),
                slots: self.slots.clone(),
                guard: Some(guard),
                completed: false,
            }));
        }
    }
}

struct MemoryTicket {
    code: String,
    slots: SlotMap,
    guard: Option<OwnedMutexGuard<Option<CallbackResponse>>>,
    completed: bool,
}

impl ExchangeTicket for MemoryTicket {
    fn complete(mut self: Box<Self>, response: CallbackResponse) {
        if let Some(guard) = self.guard.as_mut() {
            **guard = Some(response);
        }
        self.completed = true;
    }
}

impl Drop for MemoryTicket {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(guard) = self.guard.as_ref() {
            let slot = OwnedMutexGuard::mutex(guard);
            let mut slots = lock_map(&self.slots);
            let owns_entry = slots
                .get(&self.code)
                .map(|current| Arc::ptr_eq(current, slot))
                .unwrap_or(false);
            if owns_entry {
                slots.remove(&self.code);
            }
        }
        // Waiters wake up once the guard is released below.
        self.guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn response(token: &str) -> CallbackResponse {
        CallbackResponse {
            status: "success".to_string(),
            access_token: token.to_string(),
            refresh_token: None,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            user_info: None,
        }
    }

    #[tokio::test]
    async fn completed_code_is_replayed() {
        let store = MemoryCodeStore::new();

        match store.claim("code-1").await {
            CodeClaim::Fresh(ticket) => ticket.complete(response("tok")),
            other => panic!("expected fresh claim, got {:?}", other),
        }

        match store.claim("code-1").await {
            CodeClaim::Replay(cached) => assert_eq!(cached.access_token, "tok"),
            other => panic!("expected replay, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn dropped_ticket_releases_code() {
        let store = MemoryCodeStore::new();

        match store.claim("code-2").await {
            CodeClaim::Fresh(ticket) => drop(ticket),
            other => panic!("expected fresh claim, got {:?}", other),
        }
        assert!(!store.contains("code-2"));

        assert!(matches!(store.claim("code-2").await, CodeClaim::Fresh(_)));
    }

    #[tokio::test]
    async fn distinct_codes_do_not_block_each_other() {
        let store = MemoryCodeStore::new();
        let first = store.claim("a").await;
        let second = tokio::time::timeout(Duration::from_secs(1), store.claim("b")).await;
        assert!(matches!(first, CodeClaim::Fresh(_)));
        assert!(matches!(second, Ok(CodeClaim::Fresh(_))));
    }

    #[tokio::test]
    async fn concurrent_claims_exchange_once() {
        let store = Arc::new(MemoryCodeStore::new());
        let exchanges = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let exchanges = exchanges.clone();
            handles.push(tokio::spawn(async move {
                match store.claim("shared").await {
                    CodeClaim::Fresh(ticket) => {
                        exchanges.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        ticket.complete(response("only-once"));
                        "only-once".to_string()
                    }
                    CodeClaim::Replay(cached) => cached.access_token,
                }
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "only-once");
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiter_takes_over_after_failed_owner() {
        let store = Arc::new(MemoryCodeStore::new());

        let owner = match store.claim("retry").await {
            CodeClaim::Fresh(ticket) => ticket,
            other => panic!("expected fresh claim, got {:?}", other),
        };

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move { waiter_store.claim("retry").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(owner);

        match waiter.await.unwrap() {
            CodeClaim::Fresh(ticket) => ticket.complete(response("second-try")),
            other => panic!("expected the waiter to own the retry, got {:?}", other),
        }
        assert!(matches!(store.claim("retry").await, CodeClaim::Replay(_)));
    }
}
