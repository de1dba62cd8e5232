//! Instrumented store doubles shared across the integration suite.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use yggdrasil::{KvStore, StoreError, StoreResult};

/// Counts every call that reaches the wrapped store.
pub struct RecordingStore<S> {
    inner: S,
    gets: AtomicUsize,
    get_multis: AtomicUsize,
    sets: AtomicUsize,
    set_multis: AtomicUsize,
    deletes: AtomicUsize,
}

impl<S> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            get_multis: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            set_multis: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn get_multis(&self) -> usize {
        self.get_multis.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn set_multis(&self) -> usize {
        self.set_multis.load(Ordering::SeqCst)
    }

    /// Read round trips of either shape.
    pub fn reads(&self) -> usize {
        self.gets() + self.get_multis()
    }

    pub fn reset(&self) {
        self.gets.store(0, Ordering::SeqCst);
        self.get_multis.store(0, Ordering::SeqCst);
        self.sets.store(0, Ordering::SeqCst);
        self.set_multis.store(0, Ordering::SeqCst);
        self.deletes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: KvStore> KvStore for RecordingStore<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        self.get_multis.fetch_add(1, Ordering::SeqCst);
        self.inner.get_multi(keys).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl_secs).await
    }

    async fn set_multi(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: u64) -> StoreResult<()> {
        self.set_multis.fetch_add(1, Ordering::SeqCst);
        self.inner.set_multi(entries, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// Injects store-unavailable faults on demand.
pub struct FaultyStore<S> {
    inner: S,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read_fault(&self) -> Option<StoreError> {
        self.fail_reads
            .load(Ordering::SeqCst)
            .then(|| StoreError::Unavailable("injected read fault".to_string()))
    }

    fn write_fault(&self) -> Option<StoreError> {
        self.fail_writes
            .load(Ordering::SeqCst)
            .then(|| StoreError::Unavailable("injected write fault".to_string()))
    }
}

#[async_trait]
impl<S: KvStore> KvStore for FaultyStore<S> {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(fault) = self.read_fault() {
            return Err(fault);
        }
        self.inner.get(key).await
    }

    async fn get_multi(&self, keys: &[String]) -> StoreResult<HashMap<String, Vec<u8>>> {
        if let Some(fault) = self.read_fault() {
            return Err(fault);
        }
        self.inner.get_multi(keys).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> StoreResult<()> {
        if let Some(fault) = self.write_fault() {
            return Err(fault);
        }
        self.inner.set(key, value, ttl_secs).await
    }

    async fn set_multi(&self, entries: Vec<(String, Vec<u8>)>, ttl_secs: u64) -> StoreResult<()> {
        if let Some(fault) = self.write_fault() {
            return Err(fault);
        }
        self.inner.set_multi(entries, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        if let Some(fault) = self.write_fault() {
            return Err(fault);
        }
        self.inner.delete(key).await
    }
}
