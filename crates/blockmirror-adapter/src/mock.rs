//! Scripted in-process device client for tests: a fixed introspection
//! result, a queue of changesets to hand out tick by tick, and a record of
//! every write-back. Call counters let tests assert the connect-once
//! contract.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use blockmirror_core::error::Result;
use blockmirror_core::ports::DeviceClient;
use blockmirror_core::schema::IntrospectionResult;

#[derive(Default)]
pub struct MockDeviceClient {
    introspection: IntrospectionResult,
    identification: String,
    changes: Mutex<VecDeque<BTreeMap<String, String>>>,
    sent: Mutex<Vec<(String, String)>>,
    connect_calls: AtomicUsize,
    introspect_calls: AtomicUsize,
}

impl MockDeviceClient {
    pub fn new(introspection: IntrospectionResult) -> Self {
        Self {
            introspection,
            ..Self::default()
        }
    }

    pub fn with_identification(mut self, identification: impl Into<String>) -> Self {
        self.identification = identification.into();
        self
    }

    /// Queue the changeset the next `get_changes` call returns.
    pub fn push_changes(&self, changes: BTreeMap<String, String>) {
        self.changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(changes);
    }

    /// Every (address, value) pair forwarded through `send`, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn introspect_calls(&self) -> usize {
        self.introspect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn introspect(&self) -> Result<IntrospectionResult> {
        self.introspect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.introspection.clone())
    }

    async fn get_changes(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .changes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_default())
    }

    async fn send(&self, address: &str, value: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((address.to_string(), value.to_string()));
        Ok(())
    }

    async fn identify(&self) -> Result<String> {
        Ok(self.identification.clone())
    }
}
