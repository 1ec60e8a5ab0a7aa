//! Answer cache: normalized question -> answer, with TTL and a size cap.
//!
//! Expiry is lazy: an entry older than the TTL is removed when it is read.
//! When a new key arrives and the cache is full, the single oldest entry is
//! evicted first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::ports::{Clock, SystemClock};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CAPACITY: usize = 500;

/// Lowercase, collapse whitespace runs to one space, trim.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    answer: String,
    created_at: DateTime<Utc>,
    /// Insertion order, breaks timestamp ties on eviction.
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// In-memory answer cache shared by all workers.
///
/// Every operation takes the lock once and never awaits while holding it.
pub struct AnswerCache {
    state: Mutex<CacheState>,
    ttl: chrono::Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl AnswerCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn get(&self, question: &str) -> Option<String> {
        let key = normalize_question(question);
        let now = self.clock.now();
        let mut state = self.lock();

        let expired = match state.entries.get(&key) {
            None => return None,
            Some(entry) => now - entry.created_at > self.ttl,
        };
        if expired {
            state.entries.remove(&key);
            return None;
        }
        state.entries.get(&key).map(|e| e.answer.clone())
    }

    pub fn set(&self, question: &str, answer: impl Into<String>) {
        let key = normalize_question(question);
        let now = self.clock.now();
        let mut state = self.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.created_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                answer: answer.into(),
                created_at: now,
                seq,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, question: &str) -> bool {
        self.lock()
            .entries
            .contains_key(&normalize_question(question))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AnswerCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}
