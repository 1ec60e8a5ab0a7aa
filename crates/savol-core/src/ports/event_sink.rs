//! EventSink port - outbound pipeline events.
//!
//! `emit` is synchronous and must not block: the pipeline publishes and moves
//! on. Whatever consumes the events (metrics, analytics) lives elsewhere.

use tokio::sync::mpsc;

use crate::domain::PipelineEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: PipelineEvent) {
        // receiver may be gone; events are advisory
        let _ = self.tx.send(event);
    }
}
