//! Lightweight event fan-out for node and runner diagnostics.
//!
//! Nodes emit progress events through their [`crate::node::NodeContext`]; the
//! bus drains them on a background task and hands them to whichever sinks the
//! runtime was configured with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Origin of an emitted event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventScope {
    Node { node: String, step: u64 },
    Runner { session: String },
    Service,
    Diagnostic,
}

/// A single diagnostic event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub when: DateTime<Utc>,
    pub scope: EventScope,
    pub message: String,
}

impl Event {
    #[must_use]
    pub fn node(node: impl Into<String>, step: u64, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            scope: EventScope::Node {
                node: node.into(),
                step,
            },
            message: message.into(),
        }
    }

    #[must_use]
    pub fn runner(session: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            scope: EventScope::Runner {
                session: session.into(),
            },
            message: message.into(),
        }
    }

    #[must_use]
    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self {
            when: Utc::now(),
            scope: EventScope::Diagnostic,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            EventScope::Node { node, step } => write!(f, "{node}@{step}: {}", self.message),
            EventScope::Runner { session } => write!(f, "runner {session}: {}", self.message),
            EventScope::Service => write!(f, "service: {}", self.message),
            EventScope::Diagnostic => write!(f, "diag: {}", self.message),
        }
    }
}

/// Destination for drained events.
pub trait EventSink: Send {
    fn on_event(&mut self, event: &Event);
}

/// Prints events to stdout, one per line.
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn on_event(&mut self, event: &Event) {
        println!("{event}");
    }
}

/// Collects events in memory; useful in tests and post-run inspection.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything captured so far.
    #[must_use]
    pub fn drained(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn on_event(&mut self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards events into a flume channel owned by the caller.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn on_event(&mut self, event: &Event) {
        let _ = self.sender.send(event.clone());
    }
}

/// Unbounded event channel plus its configured sinks.
pub struct EventBus {
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(vec![Box::new(StdOutSink)])
    }
}

impl EventBus {
    #[must_use]
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            sender,
            receiver,
            sinks: Arc::new(Mutex::new(sinks)),
        }
    }

    /// Sender handed to node contexts.
    #[must_use]
    pub fn sender(&self) -> flume::Sender<Event> {
        self.sender.clone()
    }

    /// Spawn the drain task. Events arriving after the handle is stopped are
    /// dropped with the channel.
    #[must_use]
    pub fn listen(&self) -> EventBusHandle {
        let receiver = self.receiver.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = receiver.recv_async() => match event {
                        Ok(event) => {
                            if let Ok(mut sinks) = sinks.lock() {
                                for sink in sinks.iter_mut() {
                                    sink.on_event(&event);
                                }
                            }
                        }
                        Err(_) => break,
                    },
                    _ = &mut shutdown_rx => break,
                }
            }
        });
        EventBusHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running drain task.
pub struct EventBusHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl EventBusHandle {
    /// Signal shutdown and wait for the drain task to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.task.await;
    }
}
