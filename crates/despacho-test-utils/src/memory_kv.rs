// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`KvStore`] with TTL semantics, for tests.
//!
//! Expiry is lazy: an expired entry is dropped the first time any operation
//! touches its key. Single process-wide mutex; test workloads are tiny.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use despacho_core::{DespachoError, KvStore};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-memory KV store honoring TTLs, list ops, and conditional set.
#[derive(Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn prune(map: &mut HashMap<String, Entry>, key: &str) {
        if map.get(key).is_some_and(Entry::expired) {
            map.remove(key);
        }
    }

    fn list_mut<'a>(
        map: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Result<&'a mut Vec<String>, DespachoError> {
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(Vec::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => Ok(list),
            Value::Str(_) => Err(DespachoError::kv_msg(format!(
                "wrong type: {key} holds a string"
            ))),
        }
    }

    /// Number of live keys (test assertions).
    pub fn len(&self) -> usize {
        let mut map = self.inner.lock().unwrap();
        map.retain(|_, entry| !entry.expired());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        match map.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(DespachoError::kv_msg(format!(
                "wrong type: {key} holds a list"
            ))),
            None => Ok(None),
        }
    }

    async fn set_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DespachoError> {
        let mut map = self.inner.lock().unwrap();
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl.max(Duration::from_secs(1))),
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl.max(Duration::from_secs(1))),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), DespachoError> {
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        match map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl.max(Duration::from_secs(1)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<i64, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        let list = Self::list_mut(&mut map, key)?;
        list.push(value.to_string());
        Ok(list.len() as i64)
    }

    async fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        let Some(Entry {
            value: Value::List(list),
            ..
        }) = map.get(key)
        else {
            return Ok(Vec::new());
        };

        let len = list.len() as i64;
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
        let from = norm(start) as usize;
        let to = ((norm(stop) + 1).min(len)) as usize;
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(list[from..to].to_vec())
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<i64, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        let Ok(list) = Self::list_mut(&mut map, key) else {
            return Ok(0);
        };

        let mut removed = 0i64;
        if count >= 0 {
            let limit = if count == 0 { i64::MAX } else { count };
            list.retain(|item| {
                if item == value && removed < limit {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        } else {
            let mut limit = -count;
            for idx in (0..list.len()).rev() {
                if limit == 0 {
                    break;
                }
                if list[idx] == value {
                    list.remove(idx);
                    removed += 1;
                    limit -= 1;
                }
            }
        }
        Ok(removed)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        let Ok(list) = Self::list_mut(&mut map, key) else {
            return Ok(None);
        };
        if list.is_empty() {
            Ok(None)
        } else {
            Ok(Some(list.remove(0)))
        }
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<(), DespachoError> {
        let mut map = self.inner.lock().unwrap();
        Self::prune(&mut map, key);
        let Ok(list) = Self::list_mut(&mut map, key) else {
            return Ok(());
        };

        let len = list.len() as i64;
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
        let from = norm(start) as usize;
        let to = ((norm(stop) + 1).min(len)) as usize;
        if from >= to {
            list.clear();
        } else {
            *list = list[from..to].to_vec();
        }
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, DespachoError> {
        let mut map = self.inner.lock().unwrap();
        map.retain(|_, entry| !entry.expired());
        Ok(map
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }
}

/// Minimal glob: `*` matches any run of characters.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}
