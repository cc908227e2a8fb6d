//! In-process bus with durable-consumer semantics.
//!
//! Every published message is retained. A durable consumer receives each
//! retained message on its subject that it has not acknowledged yet, so a
//! re-subscription replays pending deliveries the way a JetStream durable does.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::traits::{
    AckHandle, BusConnection, ConsumerSpec, Delivery, DeliveryStream, DurableSubscriber,
    MessagePublisher, PublishReceipt,
};

const STREAM_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct Record {
    seq: u64,
    subject: String,
    payload: Bytes,
}

struct Subscriber {
    durable_name: String,
    pattern: String,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct State {
    records: Vec<Record>,
    acked: HashSet<(String, u64)>,
    subscribers: Vec<Subscriber>,
    failing_subjects: HashSet<String>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory implementation of every bus seam.
pub struct InMemoryBus {
    state: Arc<Mutex<State>>,
    connected: AtomicBool,
    fail_reconnect: AtomicBool,
    reconnect_attempts: AtomicU64,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            connected: AtomicBool::new(true),
            fail_reconnect: AtomicBool::new(false),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Payloads published to `subject`, oldest first.
    pub fn published(&self, subject: &str) -> Vec<Bytes> {
        lock(&self.state)
            .records
            .iter()
            .filter(|r| r.subject == subject)
            .map(|r| r.payload.clone())
            .collect()
    }

    /// Number of deliveries acknowledged by `durable_name`.
    pub fn acked_count(&self, durable_name: &str) -> usize {
        lock(&self.state)
            .acked
            .iter()
            .filter(|(name, _)| name == durable_name)
            .count()
    }

    /// Make every publish to `subject` fail until cleared.
    pub fn fail_publishes_to(&self, subject: &str) {
        lock(&self.state).failing_subjects.insert(subject.to_string());
    }

    pub fn clear_publish_failures(&self) {
        lock(&self.state).failing_subjects.clear();
    }

    /// Simulate a dropped (or restored) connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make reconnect attempts fail while `fail` is set.
    pub fn fail_reconnects(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    fn delivery(&self, durable_name: &str, record: &Record) -> Delivery {
        Delivery::new(
            record.subject.clone(),
            record.payload.clone(),
            Box::new(MemoryAck {
                state: Arc::clone(&self.state),
                durable_name: durable_name.to_string(),
                seq: record.seq,
            }),
        )
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishReceipt, BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let mut state = lock(&self.state);
        if state.failing_subjects.contains(subject) {
            return Err(BusError::Publish {
                subject: subject.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let record = Record {
            seq: state.records.len() as u64 + 1,
            subject: subject.to_string(),
            payload,
        };
        state.records.push(record.clone());
        state.subscribers.retain(|sub| {
            if !subject_matches(&sub.pattern, subject) {
                return true;
            }
            sub.tx.send(self.delivery(&sub.durable_name, &record)).is_ok()
        });

        Ok(PublishReceipt {
            stream: STREAM_NAME.to_string(),
            sequence: record.seq,
        })
    }
}

#[async_trait]
impl DurableSubscriber for InMemoryBus {
    async fn subscribe(&self, spec: &ConsumerSpec) -> Result<DeliveryStream, BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);

        for record in state.records.iter().filter(|r| {
            subject_matches(&spec.subject, &r.subject)
                && !state.acked.contains(&(spec.durable_name.clone(), r.seq))
        }) {
            // The receiver is alive until this function returns.
            let _ = tx.send(self.delivery(&spec.durable_name, record));
        }

        // A durable name has at most one live subscription.
        state.subscribers.retain(|s| s.durable_name != spec.durable_name);
        state.subscribers.push(Subscriber {
            durable_name: spec.durable_name.clone(),
            pattern: spec.subject.clone(),
            tx,
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|delivery| (Ok::<_, BusError>(delivery), rx))
        });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl BusConnection for InMemoryBus {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), BusError> {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(BusError::Connect("injected reconnect failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryAck {
    state: Arc<Mutex<State>>,
    durable_name: String,
    seq: u64,
}

#[async_trait]
impl AckHandle for MemoryAck {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        lock(&self.state).acked.insert((self.durable_name.clone(), self.seq));
        Ok(())
    }
}

/// NATS-style subject matching: `*` matches one token, a trailing `>`
/// matches one or more tokens.
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut sub = subject.split('.');
    loop {
        match (pat.next(), sub.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
