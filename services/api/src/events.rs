//! Agent Log Relay
//!
//! Fans tool-call notifications from the custom LLM service out to every open
//! browser tab. New subscribers first receive the most recent events so a tab
//! opened mid-call still shows what the agent has done.

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::warn;
use workky_core::agent_log::{AgentLogEvent, AgentLogPayload};

/// Number of past events replayed to a new subscriber.
pub const HISTORY_CAPACITY: usize = 50;

const LIVE_CAPACITY: usize = 256;

struct RelayInner {
    history: VecDeque<AgentLogEvent>,
    sender: broadcast::Sender<AgentLogEvent>,
}

pub struct EventRelay {
    inner: Mutex<RelayInner>,
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRelay {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            inner: Mutex::new(RelayInner {
                history: VecDeque::with_capacity(HISTORY_CAPACITY),
                sender,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, RelayInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Timestamps `payload`, records it and sends it to every subscriber.
    pub fn publish(&self, payload: AgentLogPayload) -> AgentLogEvent {
        let event = AgentLogEvent::stamped(payload, Utc::now());
        let mut inner = self.inner();
        if inner.history.len() == HISTORY_CAPACITY {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());
        // No receivers is fine; the event stays in history.
        let _ = inner.sender.send(event.clone());
        event
    }

    /// Returns the buffered history and a receiver for everything published
    /// after it.
    pub fn subscribe(&self) -> (Vec<AgentLogEvent>, broadcast::Receiver<AgentLogEvent>) {
        let inner = self.inner();
        (inner.history.iter().cloned().collect(), inner.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner().sender.receiver_count()
    }

    /// History followed by live events. Subscribers that fall behind skip the
    /// events they missed.
    pub fn stream(&self) -> impl Stream<Item = AgentLogEvent> + Send + 'static + use<> {
        let (history, receiver) = self.subscribe();
        let live = BroadcastStream::new(receiver).filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Agent event subscriber lagged behind");
                    None
                }
            }
        });
        stream::iter(history).chain(live)
    }
}

/// Wraps the relay stream as a Server-Sent Events response.
pub fn sse_response(
    relay: &EventRelay,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + Send + 'static + use<>> {
    let events = relay
        .stream()
        .map(|event| Event::default().json_data(event));
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use workky_core::agent_log::TOOL_START;

    fn payload(i: usize) -> AgentLogPayload {
        AgentLogPayload::new(TOOL_START, "check_availability", format!("event {i}"))
    }

    #[test]
    fn test_history_keeps_last_fifty_in_order() {
        let relay = EventRelay::new();
        for i in 0..60 {
            relay.publish(payload(i));
        }

        let (history, _) = relay.subscribe();
        let labels: Vec<_> = history.iter().map(|e| e.payload.label.clone()).collect();
        let expected: Vec<_> = (10..60).map(|i| format!("event {i}")).collect();
        assert_eq!(labels, expected);
    }

    #[tokio::test]
    async fn test_stream_replays_history_then_live_events() {
        let relay = EventRelay::new();
        relay.publish(payload(0));
        relay.publish(payload(1));

        let mut events = Box::pin(relay.stream());
        relay.publish(payload(2));

        let mut labels = Vec::new();
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.next())
                .await
                .unwrap()
                .unwrap();
            labels.push(event.payload.label);
        }
        assert_eq!(labels, vec!["event 0", "event 1", "event 2"]);
    }

    #[tokio::test]
    async fn test_dropped_stream_unsubscribes() {
        let relay = EventRelay::new();
        let events = relay.stream();
        assert_eq!(relay.subscriber_count(), 1);
        drop(events);
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_recorded() {
        let relay = EventRelay::new();
        let event = relay.publish(payload(7));
        assert_eq!(event.payload.label, "event 7");
        assert_eq!(relay.subscribe().0.len(), 1);
    }
}
