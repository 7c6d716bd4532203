//! [`EventSink`] implementations.

use std::sync::Arc;

use pipeline::{EventSink, ExecutionId, PipelineEvent};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// An event tagged with the execution it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionEvent {
    pub execution_id: ExecutionId,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

/// Publishes events on a tokio broadcast channel.
///
/// Slow subscribers lag and lose events; the conductor never waits.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, execution_id: ExecutionId, event: &PipelineEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(ExecutionEvent {
            execution_id,
            event: event.clone(),
        });
    }
}

/// Writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, execution_id: ExecutionId, event: &PipelineEvent) {
        let name = event.name();
        match event {
            PipelineEvent::StageSkipped { stage, error, .. } => {
                warn!(%execution_id, event = name, %stage, %error, "stage skipped");
            }
            PipelineEvent::PipelineFailed { error, .. } => {
                warn!(%execution_id, event = name, %error, "pipeline failed");
            }
            _ => {
                let percentage = event.progress().map(|p| p.percentage);
                info!(%execution_id, event = name, ?percentage, "pipeline event");
            }
        }
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, execution_id: ExecutionId, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.emit(execution_id, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{Timestamp, TokenCost};

    #[tokio::test]
    async fn broadcast_subscribers_receive_tagged_events() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();
        let id = ExecutionId::new_random();
        let event = PipelineEvent::PipelineStarted {
            execution_id: id,
            at: Timestamp::now(),
        };

        sink.emit(id, &event);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.execution_id, id);
        assert_eq!(received.event, event);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let sink = BroadcastEventSink::new(1);
        sink.emit(
            ExecutionId::new_random(),
            &PipelineEvent::PipelineCancelled {
                execution_id: ExecutionId::new_random(),
                duration_ms: 1,
                total_cost: TokenCost::zero(),
            },
        );
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let a = BroadcastEventSink::new(4);
        let b = BroadcastEventSink::new(4);
        let (mut ra, mut rb) = (a.subscribe(), b.subscribe());
        let fanout = FanoutEventSink::new()
            .with(Arc::new(a))
            .with(Arc::new(b))
            .with(Arc::new(TracingEventSink));

        let id = ExecutionId::new_random();
        fanout.emit(
            id,
            &PipelineEvent::PipelineStarted {
                execution_id: id,
                at: Timestamp::now(),
            },
        );
        assert_eq!(ra.recv().await.unwrap().execution_id, id);
        assert_eq!(rb.recv().await.unwrap().execution_id, id);
    }
}
