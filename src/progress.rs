// Progress event bus: the pipeline publishes, any number of observers subscribe

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};

/// Default channel capacity; slow observers lag rather than block the pipeline
const DEFAULT_CAPACITY: usize = 256;

/// Pipeline stage a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Scrape,
    Enrichment,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Discovery => "discovery",
            Stage::Scrape => "scrape",
            Stage::Enrichment => "enrichment",
            Stage::Done => "done",
        }
    }
}

/// Observational progress update (percent is 0-100)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
}

/// Broadcast channel for progress events
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new observer
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no observers is not an error
    pub fn publish(&self, stage: Stage, percent: u8, message: impl Into<String>) {
        let event = ProgressEvent {
            stage,
            percent: percent.min(100),
            message: message.into(),
        };
        tracing::debug!(stage = ?event.stage, percent = event.percent, "{}", event.message);
        let _ = self.tx.send(event);
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand every event to `on_event` until `stop` fires or the bus closes
///
/// Events already queued when `stop` fires are still delivered.
pub async fn forward_events<F>(
    mut events: broadcast::Receiver<ProgressEvent>,
    mut stop: oneshot::Receiver<()>,
    mut on_event: F,
) where
    F: FnMut(ProgressEvent),
{
    loop {
        tokio::select! {
            biased;
            received = events.recv() => match received {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress observer lagged");
                }
                Err(RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }

    loop {
        match events.try_recv() {
            Ok(event) => on_event(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_observers() {
        let bus = ProgressBus::new();
        bus.publish(Stage::Discovery, 10, "Starting search");
    }

    #[tokio::test]
    async fn test_multiple_observers() {
        let bus = ProgressBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(Stage::Scrape, 150, "overflow is clamped");

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.percent, 100);
    }

    #[tokio::test]
    async fn test_forwarding_delivers_queued_events_after_stop() {
        let bus = ProgressBus::new();
        let events = bus.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();

        bus.publish(Stage::Enrichment, 99, "AI analysis complete");
        bus.publish(Stage::Done, 100, "Done");
        stop_tx.send(()).unwrap();

        let mut seen = Vec::new();
        forward_events(events, stop_rx, |event| seen.push((event.stage, event.percent))).await;
        assert_eq!(seen, vec![(Stage::Enrichment, 99), (Stage::Done, 100)]);
    }

    #[tokio::test]
    async fn test_forwarding_ends_when_bus_closes() {
        let bus = ProgressBus::new();
        let events = bus.subscribe();
        let (_stop_tx, stop_rx) = oneshot::channel();

        bus.publish(Stage::Scrape, 40, "Scrape in progress...");
        drop(bus);

        let mut count = 0;
        forward_events(events, stop_rx, |_| count += 1).await;
        assert_eq!(count, 1);
    }
}
