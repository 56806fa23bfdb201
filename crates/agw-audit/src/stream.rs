// SPDX-License-Identifier: MIT OR Apache-2.0
//! The buffered audit stream: append, flush, multi-subscriber fan-out,
//! and filtered query.
//!
//! Append is atomic. Flush detaches the buffer under the lock and emits
//! outside it, so subscribers can never block writers, and a failing
//! subscriber never disturbs the others or the sink.

use agw_config::AuditConfig;
use agw_core::{AuditEntry, AuditEventType, AuditSeverity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// AuditSink
// ---------------------------------------------------------------------------

/// Pluggable persistence for flushed batches. Called off the hot path; it
/// may block.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one flushed batch.
    async fn persist(&self, entries: &[AuditEntry]) -> anyhow::Result<()>;
}

/// In-memory sink for tests and composition.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemorySink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything persisted so far.
    #[must_use]
    pub fn persisted(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("sink lock poisoned").clone()
    }

    /// Number of persisted entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("sink lock poisoned").len()
    }

    /// Whether nothing has been persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn persist(&self, entries: &[AuditEntry]) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("sink lock poisoned")
            .extend_from_slice(entries);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuditFilter
// ---------------------------------------------------------------------------

/// Predicates for [`AuditStream::query`]. Every field is optional; unset
/// fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Earliest timestamp, inclusive.
    pub start_time: Option<DateTime<Utc>>,
    /// Latest timestamp, inclusive.
    pub end_time: Option<DateTime<Utc>>,
    /// Accepted event types.
    pub event_types: Option<Vec<AuditEventType>>,
    /// Accepted severities.
    pub severities: Option<Vec<AuditSeverity>>,
    /// Exact actor.
    pub actor: Option<String>,
    /// Exact trace id.
    pub trace_id: Option<String>,
}

impl AuditFilter {
    /// A filter matching everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter matching one trace.
    #[must_use]
    pub fn for_trace(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            ..Self::default()
        }
    }

    /// Whether an entry passes every set predicate.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(start) = self.start_time
            && entry.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && entry.timestamp > end
        {
            return false;
        }
        if let Some(types) = &self.event_types
            && !types.contains(&entry.event_type)
        {
            return false;
        }
        if let Some(severities) = &self.severities
            && !severities.contains(&entry.severity)
        {
            return false;
        }
        if let Some(actor) = &self.actor
            && &entry.actor != actor
        {
            return false;
        }
        if let Some(trace_id) = &self.trace_id
            && &entry.trace_id != trace_id
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// AuditStream
// ---------------------------------------------------------------------------

type Handler = Arc<dyn Fn(&[AuditEntry]) -> anyhow::Result<()> + Send + Sync>;

struct StreamState {
    buffer: Vec<AuditEntry>,
    subscribers: HashMap<u64, Handler>,
    next_subscriber: u64,
}

struct StreamInner {
    state: Mutex<StreamState>,
    sink: Arc<dyn AuditSink>,
    config: AuditConfig,
    handler_errors: AtomicU64,
    flushes: AtomicU64,
}

/// The buffered, multi-subscriber audit stream.
///
/// Cheap to clone; clones share the buffer, subscribers, and sink.
#[derive(Clone)]
pub struct AuditStream {
    inner: Arc<StreamInner>,
}

impl AuditStream {
    /// A stream flushing to `sink` under the given configuration.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditConfig) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                state: Mutex::new(StreamState {
                    buffer: Vec::with_capacity(config.buffer_size),
                    subscribers: HashMap::new(),
                    next_subscriber: 0,
                }),
                sink,
                config,
                handler_errors: AtomicU64::new(0),
                flushes: AtomicU64::new(0),
            }),
        }
    }

    /// Append one entry.
    ///
    /// When the buffer reaches capacity the batch is flushed synchronously
    /// before this call returns.
    pub async fn write(&self, entry: AuditEntry) {
        let full_batch = {
            let mut state = self.inner.state.lock().expect("stream lock poisoned");
            state.buffer.push(entry);
            if state.buffer.len() >= self.inner.config.buffer_size {
                Some(std::mem::take(&mut state.buffer))
            } else {
                None
            }
        };
        if let Some(batch) = full_batch {
            debug!(len = batch.len(), "audit buffer at capacity, flushing");
            self.deliver(batch).await;
        }
    }

    /// Detach the buffer and deliver it to every subscriber and the sink.
    ///
    /// Returns how many entries were flushed.
    pub async fn flush(&self) -> usize {
        let batch = {
            let mut state = self.inner.state.lock().expect("stream lock poisoned");
            std::mem::take(&mut state.buffer)
        };
        if batch.is_empty() {
            return 0;
        }
        let len = batch.len();
        self.deliver(batch).await;
        len
    }

    async fn deliver(&self, batch: Vec<AuditEntry>) {
        self.inner.flushes.fetch_add(1, Ordering::Relaxed);

        // Snapshot the handlers under the lock, emit outside it.
        let handlers: Vec<Handler> = {
            let state = self.inner.state.lock().expect("stream lock poisoned");
            state.subscribers.values().map(Arc::clone).collect()
        };
        for handler in handlers {
            if let Err(e) = handler(&batch) {
                // Contained: a broken subscriber never stops the stream.
                self.inner.handler_errors.fetch_add(1, Ordering::Relaxed);
                warn!("audit subscriber failed: {e}");
            }
        }

        if let Err(e) = self.inner.sink.persist(&batch).await {
            warn!(len = batch.len(), "audit sink failed to persist batch: {e}");
        }
    }

    /// Register a subscriber; every flushed batch is handed to `handler`
    /// exactly once.
    #[must_use]
    pub fn subscribe<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&[AuditEntry]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().expect("stream lock poisoned");
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.insert(id, Arc::new(handler));
        SubscriberHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Entries in the un-persisted buffer matching the filter.
    #[must_use]
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let state = self.inner.state.lock().expect("stream lock poisoned");
        state
            .buffer
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Entries currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("stream lock poisoned")
            .buffer
            .len()
    }

    /// Active subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .expect("stream lock poisoned")
            .subscribers
            .len()
    }

    /// Handler failures contained so far.
    #[must_use]
    pub fn handler_error_count(&self) -> u64 {
        self.inner.handler_errors.load(Ordering::Relaxed)
    }

    /// Flush passes performed (capacity, explicit, and periodic).
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.load(Ordering::Relaxed)
    }

    /// Spawn the periodic flusher, firing every `flush_interval_ms`. The
    /// returned handle stops it deterministically.
    #[must_use]
    pub fn spawn_flusher(&self) -> FlusherHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let stream = self.clone();
        let period = Duration::from_millis(stream.inner.config.flush_interval_ms);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        stream.flush().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            // Final drain so a stop never strands buffered entries.
            stream.flush().await;
        });

        FlusherHandle {
            stop: stop_tx,
            task,
        }
    }
}

/// Unsubscribe handle returned by [`AuditStream::subscribe`].
pub struct SubscriberHandle {
    id: u64,
    inner: std::sync::Weak<StreamInner>,
}

impl SubscriberHandle {
    /// Remove the subscriber. Safe to call after the stream is gone.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .state
                .lock()
                .expect("stream lock poisoned")
                .subscribers
                .remove(&self.id);
        }
    }
}

/// Stop contract for the periodic flusher.
pub struct FlusherHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl FlusherHandle {
    /// Signal the task to stop, drain the buffer, and wait for it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AuditEntryBuilder;

    fn stream_with(buffer_size: usize) -> (AuditStream, MemorySink) {
        let sink = MemorySink::new();
        let config = AuditConfig {
            buffer_size,
            ..AuditConfig::default()
        };
        (AuditStream::new(Arc::new(sink.clone()), config), sink)
    }

    fn entry(trace: &str) -> AuditEntry {
        AuditEntryBuilder::new(AuditEventType::ToolExecuted)
            .trace_id(trace)
            .actor("gateway")
            .build()
    }

    #[tokio::test]
    async fn flush_delivers_each_entry_to_every_subscriber_once() {
        let (stream, sink) = stream_with(100);
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let a = {
            let seen = Arc::clone(&seen_a);
            stream.subscribe(move |batch| {
                seen.lock().unwrap().extend(batch.iter().map(|e| e.id));
                Ok(())
            })
        };
        let _b = {
            let seen = Arc::clone(&seen_b);
            stream.subscribe(move |batch| {
                seen.lock().unwrap().extend(batch.iter().map(|e| e.id));
                Ok(())
            })
        };

        let e = entry("trc-1");
        let id = e.id;
        stream.write(e).await;
        assert_eq!(stream.flush().await, 1);

        assert_eq!(seen_a.lock().unwrap().as_slice(), &[id]);
        assert_eq!(seen_b.lock().unwrap().as_slice(), &[id]);
        assert_eq!(sink.len(), 1);
        a.unsubscribe();
        assert_eq!(stream.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn buffer_at_capacity_flushes_synchronously() {
        let (stream, sink) = stream_with(3);
        for i in 0..3 {
            stream.write(entry(&format!("trc-{i}"))).await;
        }
        // The third write crossed the capacity threshold.
        assert_eq!(stream.buffered(), 0);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_disturb_others() {
        let (stream, sink) = stream_with(100);
        let _bad = stream.subscribe(|_| anyhow::bail!("subscriber on fire"));
        let seen = Arc::new(Mutex::new(0usize));
        let _good = {
            let seen = Arc::clone(&seen);
            stream.subscribe(move |batch| {
                *seen.lock().unwrap() += batch.len();
                Ok(())
            })
        };

        stream.write(entry("trc-1")).await;
        stream.flush().await;

        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(stream.handler_error_count(), 1);
        assert_eq!(sink.len(), 1);

        // The stream stays live for subsequent writes.
        stream.write(entry("trc-2")).await;
        stream.flush().await;
        assert_eq!(sink.len(), 2);
        assert_eq!(stream.handler_error_count(), 2);
    }

    #[tokio::test]
    async fn query_filters_by_trace() {
        let (stream, _sink) = stream_with(100);
        stream.write(entry("trc-a")).await;
        stream.write(entry("trc-b")).await;
        stream.write(entry("trc-a")).await;

        let hits = stream.query(&AuditFilter::for_trace("trc-a"));
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|e| e.trace_id == "trc-a"));
        assert_eq!(stream.query(&AuditFilter::any()).len(), 3);
    }

    #[tokio::test]
    async fn query_filters_by_type_severity_actor_and_time() {
        let (stream, _sink) = stream_with(100);
        let mut warning = AuditEntryBuilder::new(AuditEventType::SecurityAlert)
            .severity(AuditSeverity::Warning)
            .actor("scanner")
            .build();
        warning.timestamp = Utc::now() - chrono::Duration::hours(2);
        stream.write(warning).await;
        stream.write(entry("trc-now")).await;

        let by_type = stream.query(&AuditFilter {
            event_types: Some(vec![AuditEventType::SecurityAlert]),
            ..AuditFilter::default()
        });
        assert_eq!(by_type.len(), 1);

        let by_severity = stream.query(&AuditFilter {
            severities: Some(vec![AuditSeverity::Warning]),
            ..AuditFilter::default()
        });
        assert_eq!(by_severity.len(), 1);

        let by_actor = stream.query(&AuditFilter {
            actor: Some("scanner".into()),
            ..AuditFilter::default()
        });
        assert_eq!(by_actor.len(), 1);

        let recent = stream.query(&AuditFilter {
            start_time: Some(Utc::now() - chrono::Duration::hours(1)),
            ..AuditFilter::default()
        });
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, AuditEventType::ToolExecuted);
    }

    #[tokio::test]
    async fn flush_of_empty_buffer_is_a_noop() {
        let (stream, sink) = stream_with(100);
        assert_eq!(stream.flush().await, 0);
        assert!(sink.is_empty());
        assert_eq!(stream.flush_count(), 0);
    }

    #[tokio::test]
    async fn periodic_flusher_drains_and_stops() {
        let sink = MemorySink::new();
        let config = AuditConfig {
            buffer_size: 100,
            flush_interval_ms: 20,
            ..AuditConfig::default()
        };
        let stream = AuditStream::new(Arc::new(sink.clone()), config);
        let flusher = stream.spawn_flusher();

        stream.write(entry("trc-periodic")).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(sink.len(), 1);

        // Entries written just before stop are drained by the final flush.
        stream.write(entry("trc-late")).await;
        flusher.stop().await;
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn unsubscribed_handler_stops_receiving() {
        let (stream, _sink) = stream_with(100);
        let seen = Arc::new(Mutex::new(0usize));
        let handle = {
            let seen = Arc::clone(&seen);
            stream.subscribe(move |batch| {
                *seen.lock().unwrap() += batch.len();
                Ok(())
            })
        };

        stream.write(entry("trc-1")).await;
        stream.flush().await;
        assert_eq!(*seen.lock().unwrap(), 1);

        handle.unsubscribe();
        stream.write(entry("trc-2")).await;
        stream.flush().await;
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
