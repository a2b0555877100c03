//! In-process event fan-out for run observability.
//!
//! Stages and the controller emit [`Event`]s over a flume channel; a
//! background listener broadcasts each event to every registered
//! [`EventSink`]. Durable logging lives in the state's `logs` channel — the
//! event bus is the live view (stdout, test inspection, streaming to a UI).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::oneshot, task};

/// A single observability event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Stage(StageEvent),
    Diagnostic(DiagnosticEvent),
}

/// Event emitted from within a pipeline stage (or the controller on a
/// stage's behalf).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageEvent {
    pub run_id: Option<String>,
    pub stage: Option<String>,
    pub scope: String,
    pub message: String,
    pub when: DateTime<Utc>,
}

/// Engine-level event with no stage context.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
    pub when: DateTime<Utc>,
}

impl Event {
    pub fn stage_message(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::Stage(StageEvent {
            run_id: Some(run_id.into()),
            stage: Some(stage.into()),
            scope: scope.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
            when: Utc::now(),
        })
    }

    pub fn scope(&self) -> &str {
        match self {
            Event::Stage(event) => &event.scope,
            Event::Diagnostic(event) => &event.scope,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Event::Stage(event) => &event.message,
            Event::Diagnostic(event) => &event.message,
        }
    }
}

/// Consumer of broadcast events.
pub trait EventSink: Send + Sync {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError>;
}

/// Sink-side failure; logged by the listener, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink disconnected")]
    Disconnected,
    #[error("sink failure: {0}")]
    Other(String),
}

/// Emits each event as a `tracing` info line.
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        match event {
            Event::Stage(stage_event) => tracing::info!(
                run_id = stage_event.run_id.as_deref().unwrap_or("-"),
                stage = stage_event.stage.as_deref().unwrap_or("-"),
                scope = %stage_event.scope,
                "{}",
                stage_event.message
            ),
            Event::Diagnostic(diag) => {
                tracing::info!(scope = %diag.scope, "{}", diag.message)
            }
        }
        Ok(())
    }
}

/// Collects events into shared memory; intended for tests.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything collected so far.
    pub fn collected(&self) -> Vec<Event> {
        self.events.lock().expect("memory sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Other("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel, e.g. for streaming to a dashboard.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &Event) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Receives events from producers and broadcasts to the registered sinks.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<Event>, flume::Receiver<Event>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink)
    }
}

impl EventBus {
    /// Bus with a single sink.
    pub fn with_sink<T: EventSink + 'static>(sink: T) -> Self {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a sink after construction (per-request streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks
            .lock()
            .expect("sinks poisoned")
            .push(Box::new(sink));
    }

    /// Clone of the sender side for producers.
    pub fn sender(&self) -> flume::Sender<Event> {
        self.event_channel.0.clone()
    }

    /// Spawn the background broadcast task. Idempotent.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.event_channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().expect("sinks poisoned");
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(error = %e, "event sink failure");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the broadcast task, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcasts_to_memory_sink() {
        let sink = MemorySink::new();
        let bus = EventBus::with_sink(sink.clone());
        bus.listen_for_events();

        let sender = bus.sender();
        sender
            .send(Event::diagnostic("test", "hello"))
            .expect("send");

        // The listener runs on its own task; wait for delivery.
        for _ in 0..100 {
            if !sink.collected().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        bus.stop_listener().await;

        let events = sink.collected();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message(), "hello");
    }
}
