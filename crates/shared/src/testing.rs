//! In-memory collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::judge::SemanticJudge;
use crate::models::SyncedRecord;
use crate::renderer::PageRenderer;
use crate::store::{KeyPage, RecordStore};
use crate::sync::Throttle;

/// Serves canned HTML; unknown URLs fail like an unreachable host
#[derive(Default)]
pub struct FakeRenderer {
    pages: HashMap<String, String>,
}

impl FakeRenderer {
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }
}

/// Answers per title; unknown titles and scripted errors fail the call
#[derive(Default, Clone)]
pub struct ScriptedJudge {
    responses: Arc<Mutex<HashMap<String, Result<String, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedJudge {
    pub fn answer(self, title: &str, raw: &str) -> Self {
        self.script(title, Ok(raw.to_string()))
    }

    pub fn fail(self, title: &str, reason: &str) -> Self {
        self.script(title, Err(reason.to_string()))
    }

    fn script(self, title: &str, response: Result<String, String>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(title.to_string(), response);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticJudge for ScriptedJudge {
    async fn judge(&self, _profile: &str, title: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let responses = self.responses.lock().map_err(|_| anyhow!("poisoned"))?;
        match responses.get(title) {
            Some(Ok(raw)) => Ok(raw.clone()),
            Some(Err(e)) => Err(anyhow!(e.clone())),
            None => Err(anyhow!("unexpected title {}", title)),
        }
    }
}

/// Record store backed by a vector, paging keys `page_size` at a time
#[derive(Default)]
pub struct MemoryStore {
    pub keys: Mutex<Vec<String>>,
    pub page_size: usize,
    pub writes: Mutex<Vec<Vec<SyncedRecord>>>,
    pub fail_batches: Vec<usize>,
    pub fail_reads: bool,
    pub reads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_keys(keys: &[&str], page_size: usize) -> Self {
        Self {
            keys: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
            page_size,
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<SyncedRecord> {
        self.writes
            .lock()
            .map(|w| w.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn write_calls(&self) -> usize {
        self.writes.lock().map(|w| w.len()).unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for Arc<MemoryStore> {
    async fn fetch_keys(&self, cursor: Option<&str>) -> Result<KeyPage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(anyhow!("503 Service Unavailable"));
        }
        let keys = self.keys.lock().map_err(|_| anyhow!("poisoned"))?;
        let start: usize = match cursor {
            Some(c) => c.parse()?,
            None => 0,
        };
        let end = (start + self.page_size.max(1)).min(keys.len());
        Ok(KeyPage {
            keys: keys[start..end].to_vec(),
            next: (end < keys.len()).then(|| end.to_string()),
        })
    }

    async fn create_records(&self, records: &[SyncedRecord]) -> Result<()> {
        let number = {
            let mut writes = self.writes.lock().map_err(|_| anyhow!("poisoned"))?;
            writes.push(records.to_vec());
            writes.len()
        };
        if self.fail_batches.contains(&number) {
            return Err(anyhow!("422 Unprocessable Entity INVALID_VALUE_FOR_COLUMN"));
        }
        self.keys
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .extend(records.iter().map(|r| r.url.clone()));
        Ok(())
    }
}

/// Counts pauses instead of sleeping
#[derive(Default)]
pub struct CountingThrottle(pub AtomicUsize);

#[async_trait]
impl Throttle for Arc<CountingThrottle> {
    async fn pause(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}
