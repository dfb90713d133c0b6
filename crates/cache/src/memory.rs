//! In-process [`CacheBackend`] for tests and single-process deployments.
//!
//! Mirrors the Redis semantics the cache relies on: string, list and
//! sorted-set values, per-key expiry, glob key matching, `WRONGTYPE`
//! rejection and all-or-nothing batches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::backend::{CacheBackend, CacheOp, CacheReply};
use crate::CacheError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(Vec<String>),
    ZSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

type Store = HashMap<String, Slot>;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: Mutex<Store>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable server: every call fails until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of backend calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Live keys currently stored.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|slot| slot.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a raw string without going through the cache, e.g. to plant a
    /// corrupt payload.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: None,
            },
        );
    }

    /// Remaining lifetime of `key`, if it exists and expires.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|slot| slot.live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, refuse it when offline, and hand out the store with
    /// expired keys already purged.
    fn enter(&self) -> Result<MutexGuard<'_, Store>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Backend("connection refused".into()));
        }
        let mut store = self.lock();
        let now = Instant::now();
        store.retain(|_, slot| slot.live(now));
        Ok(store)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
    }
}

fn read_str(store: &Store, key: &str) -> Result<Option<String>, CacheError> {
    match store.get(key).map(|slot| &slot.value) {
        None => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(key)),
    }
}

fn incr_in(store: &mut Store, key: &str) -> Result<i64, CacheError> {
    let current = match read_str(store, key)? {
        Some(s) => s.parse::<i64>().map_err(|_| {
            CacheError::Backend(format!("value at {key} is not an integer"))
        })?,
        None => 0,
    };
    let next = current + 1;
    let expires_at = store.get(key).and_then(|slot| slot.expires_at);
    store.insert(
        key.to_string(),
        Slot {
            value: Value::Str(next.to_string()),
            expires_at,
        },
    );
    Ok(next)
}

/// Resolve Redis-style inclusive indices (negative counts from the end)
/// into a half-open range over `len` items.
fn span(len: usize, start: isize, stop: isize) -> std::ops::Range<usize> {
    let len_i = len as isize;
    let resolve = |i: isize| if i < 0 { len_i + i } else { i };
    let start = resolve(start).max(0);
    let stop = resolve(stop).min(len_i - 1);
    if len == 0 || start > stop {
        0..0
    } else {
        start as usize..stop as usize + 1
    }
}

fn apply(store: &mut Store, op: &CacheOp, now: Instant) -> Result<CacheReply, CacheError> {
    match op {
        CacheOp::Get(key) => Ok(read_str(store, key)?.map_or(CacheReply::Nil, CacheReply::Str)),
        CacheOp::Incr(key) => incr_in(store, key).map(CacheReply::Int),
        CacheOp::ZIncrBy { key, member, by } => {
            let slot = store.entry(key.clone()).or_insert_with(|| Slot {
                value: Value::ZSet(HashMap::new()),
                expires_at: None,
            });
            let Value::ZSet(members) = &mut slot.value else {
                return Err(wrong_type(key));
            };
            let score = members.entry(member.clone()).or_insert(0.0);
            *score += by;
            Ok(CacheReply::Float(*score))
        }
        CacheOp::LPush { key, value } => {
            let slot = store.entry(key.clone()).or_insert_with(|| Slot {
                value: Value::List(Vec::new()),
                expires_at: None,
            });
            let Value::List(items) = &mut slot.value else {
                return Err(wrong_type(key));
            };
            items.insert(0, value.clone());
            Ok(CacheReply::Int(items.len() as i64))
        }
        CacheOp::LTrim { key, start, stop } => {
            if let Some(slot) = store.get_mut(key) {
                let Value::List(items) = &mut slot.value else {
                    return Err(wrong_type(key));
                };
                let keep = span(items.len(), *start, *stop);
                *items = items[keep].to_vec();
            }
            Ok(CacheReply::Ok)
        }
        CacheOp::Expire { key, ttl } => match store.get_mut(key) {
            Some(slot) => {
                slot.expires_at = Some(now + *ttl);
                Ok(CacheReply::Int(1))
            }
            None => Ok(CacheReply::Int(0)),
        },
        CacheOp::ZRevRangeWithScores { key, start, stop } => match store.get(key) {
            None => Ok(CacheReply::Scored(Vec::new())),
            Some(Slot {
                value: Value::ZSet(members),
                ..
            }) => {
                let mut ranked: Vec<(String, f64)> =
                    members.iter().map(|(m, s)| (m.clone(), *s)).collect();
                // Redis breaks score ties by reverse lexicographic member order.
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
                let range = span(ranked.len(), *start, *stop);
                Ok(CacheReply::Scored(ranked[range].to_vec()))
            }
            Some(_) => Err(wrong_type(key)),
        },
        CacheOp::LRange { key, start, stop } => match store.get(key) {
            None => Ok(CacheReply::List(Vec::new())),
            Some(Slot {
                value: Value::List(items),
                ..
            }) => Ok(CacheReply::List(
                items[span(items.len(), *start, *stop)].to_vec(),
            )),
            Some(_) => Err(wrong_type(key)),
        },
    }
}

/// Glob match supporting `*` and `?`, as used by `SCAN MATCH`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), CacheError> {
        self.enter().map(|_| ())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let store = self.enter()?;
        read_str(&store, key)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut store = self.enter()?;
        store.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut store = self.enter()?;
        Ok(keys.iter().filter(|k| store.remove(*k).is_some()).count() as u64)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let store = self.enter()?;
        let mut keys: Vec<String> = store
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut store = self.enter()?;
        incr_in(&mut store, key)
    }

    async fn atomic(&self, ops: &[CacheOp]) -> Result<Vec<CacheReply>, CacheError> {
        let mut store = self.enter()?;
        let now = Instant::now();
        let mut staged = store.clone();
        let replies = ops
            .iter()
            .map(|op| apply(&mut staged, op, now))
            .collect::<Result<Vec<_>, _>>()?;
        *store = staged;
        Ok(replies)
    }
}
