use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{DeskError, Result};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over the configured filter. Returns `Ok(false)` when a
/// subscriber was already installed, so repeated calls are harmless.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.filter).map_err(|err| {
            DeskError::Config(format!("invalid log filter `{}`: {err}", cfg.filter))
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if cfg.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    Ok(installed)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: String,
    pub timestamp: SystemTime,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub context: String,
    pub error: String,
    pub timestamp: SystemTime,
}

pub const DEFAULT_TELEMETRY_CAPACITY: usize = 256;

/// What `/api/telemetry` returns: the most recent events and failures, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub events: Vec<TelemetryEvent>,
    pub failures: Vec<FailureRecord>,
}

/// In-memory record of submission outcomes.
///
/// Both logs are ring buffers: once `capacity` entries are held, the oldest is dropped.
#[derive(Clone)]
pub struct TelemetryCollector {
    capacity: usize,
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    failures: Arc<Mutex<VecDeque<FailureRecord>>>,
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TELEMETRY_CAPACITY)
    }
}

impl TelemetryCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            failures: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, kind: impl Into<String>, detail: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            push_bounded(
                &mut events,
                self.capacity,
                TelemetryEvent {
                    kind: kind.into(),
                    timestamp: SystemTime::now(),
                    detail,
                },
            );
        }
    }

    pub fn record_failure(&self, context: impl Into<String>, error: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            push_bounded(
                &mut failures,
                self.capacity,
                FailureRecord {
                    context: context.into(),
                    error: error.into(),
                    timestamp: SystemTime::now(),
                },
            );
        }
    }

    /// Copy of the current contents; nothing is removed.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events: self
                .events
                .lock()
                .map(|events| events.iter().cloned().collect())
                .unwrap_or_default(),
            failures: self
                .failures
                .lock()
                .map(|failures| failures.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn drain(&self) -> (Vec<TelemetryEvent>, Vec<FailureRecord>) {
        let events = self
            .events
            .lock()
            .map(|mut events| events.drain(..).collect())
            .unwrap_or_default();
        let failures = self
            .failures
            .lock()
            .map(|mut failures| failures.drain(..).collect())
            .unwrap_or_default();
        (events, failures)
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, capacity: usize, item: T) {
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}
