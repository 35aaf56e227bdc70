//! Thread-safe log dispatcher: severity filter, ring storage, sink fan-out.
//!
//! One mutex guards ring insertion together with the fan-out to the callback
//! and observer list, so records reach every consumer in the exact order their
//! producers acquired the lock. Scalar state that readers poll (filter level,
//! valid/lifetime counters) is mirrored in atomics with relaxed ordering, so
//! status queries never block behind a dispatch in progress.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::record::{LogRecord, Severity};
use super::ring::RingBuffer;

/// Default ring capacity for loggers built with [`Logger::default`] and the
/// process-wide instance.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// A log consumer: receives tag, severity, and message for each accepted
/// record.
pub type LogSink = Box<dyn Fn(&str, Severity, &str) + Send + Sync>;

struct Inner {
    ring: RingBuffer,
    callback: Option<LogSink>,
    observers: Vec<LogSink>,
}

/// Buffered, filtering logger with callback/observer fan-out.
///
/// Safe to call from any number of threads. The logging path takes one short
/// critical section and never performs I/O of its own; what the registered
/// sinks do is up to them.
///
/// Sinks are invoked while the logger's lock is held (that is what makes the
/// dispatch order well defined), so a sink must not call back into the same
/// logger.
pub struct Logger {
    inner: Mutex<Inner>,
    filter: AtomicU8,
    valid: AtomicUsize,
    total: AtomicU64,
}

impl Logger {
    /// Create a logger with a ring of `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        Logger {
            inner: Mutex::new(Inner {
                ring: RingBuffer::new(capacity),
                callback: None,
                observers: Vec::new(),
            }),
            filter: AtomicU8::new(Severity::Debug.as_u8()),
            valid: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Set the minimum severity a record needs to be accepted. Effective for
    /// every call that starts after this one.
    pub fn set_filter_level(&self, level: Severity) {
        self.filter.store(level.as_u8(), Ordering::Relaxed);
    }

    pub fn filter_level(&self) -> Severity {
        Severity::from_u8(self.filter.load(Ordering::Relaxed))
    }

    /// Install the single primary callback, replacing any previous one.
    pub fn set_callback(&self, sink: LogSink) {
        self.lock().callback = Some(sink);
    }

    /// Append an observer. Observers run after the callback, in registration
    /// order, and cannot be removed.
    pub fn add_observer(&self, sink: LogSink) {
        self.lock().observers.push(sink);
    }

    /// Record a message. Below the filter level this is a no-op; otherwise the
    /// record lands in the ring (discarding the oldest entry if full) and fans
    /// out to the callback and observers.
    pub fn log(&self, tag: &str, severity: Severity, message: &str) {
        if severity < self.filter_level() {
            return;
        }
        self.dispatch(LogRecord::new(tag, severity, message));
    }

    /// Formatting variant of [`Logger::log`]; rendering is bounded to the
    /// message budget. See also the [`logf!`](crate::logf) macro.
    pub fn log_args(&self, tag: &str, severity: Severity, args: std::fmt::Arguments<'_>) {
        if severity < self.filter_level() {
            return;
        }
        self.dispatch(LogRecord::from_args(tag, severity, args));
    }

    /// Remove and return the oldest buffered record.
    pub fn next(&self) -> Option<LogRecord> {
        let mut inner = self.lock();
        let record = inner.ring.pop();
        self.valid.store(inner.ring.len(), Ordering::Relaxed);
        record
    }

    /// Return a copy of the record `offset` positions past the oldest, without
    /// consuming anything. `None` when `offset >= valid_count()`.
    pub fn peek(&self, offset: usize) -> Option<LogRecord> {
        self.lock().ring.peek(offset).cloned()
    }

    /// [`Logger::next`], JSON-encoded.
    pub fn next_json(&self) -> Option<String> {
        self.next().map(|record| record.to_json())
    }

    /// [`Logger::peek`], JSON-encoded.
    pub fn peek_json(&self, offset: usize) -> Option<String> {
        self.peek(offset).map(|record| record.to_json())
    }

    /// Number of records currently buffered. Lock-free snapshot.
    pub fn valid_count(&self) -> usize {
        self.valid.load(Ordering::Relaxed)
    }

    /// Number of records accepted since construction, including overwritten
    /// ones. Lock-free snapshot.
    pub fn lifetime_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn dispatch(&self, record: LogRecord) {
        let mut inner = self.lock();
        inner.ring.push(record.clone());
        self.valid.store(inner.ring.len(), Ordering::Relaxed);
        self.total.store(inner.ring.total_written(), Ordering::Relaxed);

        // Each sink runs isolated: a panicking consumer must neither skip the
        // remaining observers nor take the logger down with it.
        if let Some(callback) = &inner.callback {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                callback(&record.tag, record.severity, &record.message)
            }));
        }
        for observer in &inner.observers {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| {
                observer(&record.tag, record.severity, &record.message)
            }));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A sink that panicked was already isolated; recover the guard rather
        // than propagate poisoning to every later caller.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
